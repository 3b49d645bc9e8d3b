pub mod local;
pub mod sftp;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use local::LocalFs;
pub use sftp::SftpFs;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 传输协议
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Sftp,
    /// 目标是本机目录
    Local,
}

/// 目录项类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// 远端目录中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// 连接参数
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub protocol: Protocol,
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<String>,
    /// 同一连接上的最大并发操作数
    pub parallel: usize,
}

/// 远端文件系统抽象接口
///
/// 同一连接会被多个并发操作共享，实现必须能容忍交错调用。
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// 检查路径是否存在
    async fn exists(&self, path: &str) -> Result<bool>;

    /// 创建目录
    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()>;

    /// 列出目录的直接子项
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// 删除文件
    async fn delete(&self, path: &str) -> Result<()>;

    /// 删除目录
    async fn rmdir(&self, path: &str, recursive: bool) -> Result<()>;

    /// 上传本地文件，返回写入的字节数
    async fn put(&self, local: &Path, remote: &str) -> Result<u64>;

    /// 快速上传，传输策略不同，语义与 `put` 相同
    async fn fast_put(&self, local: &Path, remote: &str) -> Result<u64> {
        self.put(local, remote).await
    }

    /// 关闭连接
    async fn end(&self) -> Result<()> {
        Ok(())
    }

    /// 获取名称（用于日志）
    fn name(&self) -> &str;
}

/// 建立远端连接
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn RemoteFs>>;
}

/// 按协议选择实现
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn RemoteFs>> {
        match options.protocol {
            Protocol::Sftp => {
                tracing::info!(
                    "连接 SFTP: {}@{}:{}",
                    options.username,
                    options.host,
                    options.port.unwrap_or(sftp::DEFAULT_PORT)
                );
                Ok(Arc::new(SftpFs::connect(options).await?) as Arc<dyn RemoteFs>)
            }
            Protocol::Local => {
                tracing::info!("使用本地目标: {}", options.host);
                Ok(Arc::new(LocalFs::new(&options.host)) as Arc<dyn RemoteFs>)
            }
        }
    }
}

/// 拼接远端路径（始终使用 `/`）
pub fn join_remote(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return base.to_string();
    }
    if base.ends_with('/') {
        format!("{}{}", base, relative)
    } else {
        format!("{}/{}", base, relative)
    }
}

/// 规范化远端根目录：统一分隔符并去掉末尾的 `/`
pub fn normalize_remote_root(path: &str) -> String {
    let path = path.replace('\\', "/");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        if path.starts_with('/') {
            "/".to_string()
        } else {
            ".".to_string()
        }
    } else {
        trimmed.to_string()
    }
}
