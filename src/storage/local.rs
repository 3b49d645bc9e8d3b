use super::{EntryKind, RemoteEntry, RemoteFs};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 以本机目录作为部署目标
///
/// 远端路径都解析到 `base_path` 之下，`/site` 对应 `<base_path>/site`。
pub struct LocalFs {
    base_path: PathBuf,
    name: String,
}

impl LocalFs {
    pub fn new(path: &str) -> Self {
        let base_path = PathBuf::from(path);
        let name = format!("local:{}", path);
        Self { base_path, name }
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() || path == "." {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    /// 临时文件名，写完后原子重命名
    fn temp_path(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        target.with_file_name(name)
    }
}

#[async_trait]
impl RemoteFs for LocalFs {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(fs::try_exists(self.resolve_path(path)).await?)
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        let full_path = self.resolve_path(path);
        if recursive {
            fs::create_dir_all(&full_path).await?;
        } else {
            fs::create_dir(&full_path).await?;
        }
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let full_path = self.resolve_path(path);
        let mut reader = fs::read_dir(&full_path).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "." || name == ".." {
                continue;
            }
            let kind = if entry.file_type().await?.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.push(RemoteEntry { name, kind });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        if fs::metadata(&full_path).await?.is_dir() {
            bail!("{} 是目录", full_path.display());
        }
        fs::remove_file(&full_path).await?;
        Ok(())
    }

    async fn rmdir(&self, path: &str, recursive: bool) -> Result<()> {
        let full_path = self.resolve_path(path);
        if recursive {
            fs::remove_dir_all(&full_path).await?;
        } else {
            fs::remove_dir(&full_path).await?;
        }
        Ok(())
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<u64> {
        let full_path = self.resolve_path(remote);
        let data = fs::read(local).await?;
        let size = data.len() as u64;

        // 使用临时文件写入，然后原子重命名
        let temp_path = Self::temp_path(&full_path);
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &full_path).await?;

        Ok(size)
    }

    async fn fast_put(&self, local: &Path, remote: &str) -> Result<u64> {
        Ok(fs::copy(local, self.resolve_path(remote)).await?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
