use super::{ConnectOptions, EntryKind, RemoteEntry, RemoteFs, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;

pub const DEFAULT_PORT: u16 = 22;

/// fastPut 每块大小
const FAST_PUT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

pub struct SftpFs {
    operator: Operator,
    name: String,
    parallel: usize,
}

impl SftpFs {
    pub async fn connect(options: &ConnectOptions) -> Result<Self> {
        use opendal::services::Sftp;

        let port = options.port.unwrap_or(DEFAULT_PORT);
        let endpoint = format!("ssh://{}:{}", options.host, port);

        let mut builder = Sftp::default()
            .endpoint(&endpoint)
            .user(&options.username)
            .root("/");

        match (&options.private_key, &options.password) {
            (Some(key), _) => builder = builder.key(key),
            (None, Some(_)) => {
                // 该后端基于 openssh，不支持密码认证
                tracing::warn!(
                    "SFTP 后端不支持密码认证，将使用 ssh-agent 或默认密钥: {}",
                    options.host
                );
            }
            (None, None) => {}
        }

        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        // opendal 延迟建立连接，这里主动探测一次
        operator.check().await?;

        let name = format!("sftp://{}@{}:{}", options.username, options.host, port);

        Ok(Self {
            operator,
            name,
            parallel: options.parallel.max(1),
        })
    }

    fn dir_path(path: &str) -> String {
        if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        }
    }
}

#[async_trait]
impl RemoteFs for SftpFs {
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.operator.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        let dir_path = Self::dir_path(path);
        if !recursive {
            // opendal 总是递归创建，非递归时先确认父目录存在
            let parent = Path::new(path.trim_end_matches('/'))
                .parent()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            if !parent.is_empty() && !self.exists(&Self::dir_path(&parent)).await? {
                anyhow::bail!("父目录不存在: {}", parent);
            }
        }
        self.operator.create_dir(&dir_path).await?;
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let dir_path = Self::dir_path(path);
        let mut lister = self
            .operator
            .lister_with(&dir_path)
            .metakey(Metakey::Mode)
            .await?;

        let mut entries = Vec::new();
        while let Some(entry) = lister.try_next().await? {
            // 跳过目录本身
            let entry_path = entry.path().trim_start_matches('/');
            if entry_path.is_empty() || entry_path == dir_path.trim_start_matches('/') {
                continue;
            }

            let name = entry.name().trim_end_matches('/').to_string();
            if name.is_empty() || name == "." || name == ".." {
                continue;
            }

            let kind = if entry.metadata().is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.push(RemoteEntry { name, kind });
        }

        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.operator.delete(path).await?;
        Ok(())
    }

    async fn rmdir(&self, path: &str, recursive: bool) -> Result<()> {
        let dir_path = Self::dir_path(path);
        if recursive {
            self.operator.remove_all(&dir_path).await?;
        } else {
            self.operator.delete(&dir_path).await?;
        }
        Ok(())
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<u64> {
        let data = tokio::fs::read(local).await?;
        let size = data.len() as u64;
        self.operator.write(remote, data).await?;
        Ok(size)
    }

    async fn fast_put(&self, local: &Path, remote: &str) -> Result<u64> {
        let mut file = tokio::fs::File::open(local).await?;
        let mut writer = self
            .operator
            .writer_with(remote)
            .chunk(FAST_PUT_CHUNK_SIZE)
            .concurrent(self.parallel)
            .await?;

        let mut total = 0u64;
        loop {
            let mut buffer = vec![0u8; FAST_PUT_CHUNK_SIZE];
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            buffer.truncate(n);
            total += n as u64;
            writer.write(buffer).await?;
        }
        writer.close().await?;

        Ok(total)
    }

    async fn end(&self) -> Result<()> {
        // 连接随 Operator 一起释放
        tracing::debug!("关闭连接: {}", self.name);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
