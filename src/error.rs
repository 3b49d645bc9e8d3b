//! 错误类型

use crate::core::filter::FilterError;
use crate::core::DeployPhase;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// 配置加载/校验错误，出现时整个运行直接中止
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件 {0} 不存在")]
    NotFound(PathBuf),

    #[error("配置路径 {0} 不是文件")]
    NotAFile(PathBuf),

    #[error("读取配置文件 {path} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("配置文件 {path} 不是合法的 JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// 旧版字段名，单独报出以便提示用户修改
    #[error("配置字段 `{found}` 已更名为 `{expected}`，请更新配置文件")]
    RenamedField {
        found: &'static str,
        expected: &'static str,
    },

    #[error("配置校验失败: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// 部署错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// ID 引用无法解析
    Reference,
    /// 本地源目录问题
    Filesystem,
    /// 过滤规则无效
    Config,
    /// 连接远端失败
    Connection,
    /// 单个远端操作失败
    RemoteIo,
}

/// 单个部署内的错误，只会中止当前部署
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("主机配置 {0} 不存在")]
    MissingHost(String),

    #[error("凭据配置 {0} 不存在")]
    MissingCredentials(String),

    #[error("源目录配置 {0} 不存在")]
    MissingSource(String),

    #[error("部署 {0} 不存在")]
    MissingDeployment(usize),

    #[error(transparent)]
    InvalidFilter(#[from] FilterError),

    #[error("源目录 {0} 不存在或不是目录")]
    SourceNotDirectory(PathBuf),

    #[error("收集文件失败 {root}: {source}")]
    Collect {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法连接到 {host}: {message}")]
    Connect { host: String, message: String },

    #[error("无法创建目录 {path}: {message}")]
    CreateRoot { path: String, message: String },

    #[error("无法列出目录 {path}: {message}")]
    List { path: String, message: String },

    #[error("无法创建目录 {path}: {message}")]
    Mkdir { path: String, message: String },

    #[error("{phase} 阶段有操作失败，部署中止")]
    BatchFailed { phase: DeployPhase },
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::MissingHost(_)
            | DeployError::MissingCredentials(_)
            | DeployError::MissingSource(_)
            | DeployError::MissingDeployment(_) => ErrorKind::Reference,
            DeployError::InvalidFilter(_) => ErrorKind::Config,
            DeployError::SourceNotDirectory(_) | DeployError::Collect { .. } => {
                ErrorKind::Filesystem
            }
            DeployError::Connect { .. } => ErrorKind::Connection,
            DeployError::CreateRoot { .. }
            | DeployError::List { .. }
            | DeployError::Mkdir { .. }
            | DeployError::BatchFailed { .. } => ErrorKind::RemoteIo,
        }
    }
}
