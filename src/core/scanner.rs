use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// 目录收集配置
#[derive(Debug, Clone, Copy)]
pub struct CollectOptions {
    /// 是否包含 `.` 开头的文件和目录
    pub include_dot_files: bool,
    /// 是否输出目录列表
    pub include_folders: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            include_dot_files: true,
            include_folders: false,
        }
    }
}

/// 收集结果，均为绝对路径
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
}

impl Collected {
    /// 相对 `root` 的文件路径
    pub fn relative_files(&self, root: &Path) -> Vec<String> {
        relativize(root, &self.files)
    }

    /// 相对 `root` 的目录路径（根目录本身被丢弃）
    pub fn relative_dirs(&self, root: &Path) -> Vec<String> {
        relativize(root, &self.dirs)
    }
}

/// 去掉根目录前缀并统一使用 `/`，空路径被丢弃
pub fn relativize(root: &Path, paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.strip_prefix(root).ok())
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .filter(|p| !p.is_empty())
        .collect()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// 同步遍历目录
pub fn collect_blocking(root: &Path, options: CollectOptions) -> io::Result<Collected> {
    let mut collected = Collected::default();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        // 根目录本身不参与点文件过滤；被过滤的目录不会再进入
        .filter_entry(|e| e.depth() == 0 || options.include_dot_files || !is_hidden(e));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            if options.include_folders {
                collected.dirs.push(entry.into_path());
            }
        } else {
            collected.files.push(entry.into_path());
        }
    }

    debug!(
        "遍历完成: {:?}, {} 个文件, {} 个目录",
        root,
        collected.files.len(),
        collected.dirs.len()
    );
    Ok(collected)
}

/// 递归收集 `root` 下的文件和目录
pub async fn collect(root: &Path, options: CollectOptions) -> io::Result<Collected> {
    info!("开始收集文件: {:?}", root);
    let root = root.to_path_buf();

    // 使用 spawn_blocking 避免阻塞 async runtime
    tokio::task::spawn_blocking(move || collect_blocking(&root, options))
        .await
        .map_err(io::Error::other)?
}
