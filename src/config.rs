//! 部署配置模块
//!
//! 配置由凭据、主机、源目录三张 ID 表和一个有序的部署列表组成。
//! 引用在部署开始时才解析，一个错误的引用只会让对应的部署失败。

use crate::error::{ConfigError, DeployError};
use crate::storage::{ConnectOptions, Protocol};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// 旧版配置中的字段名
const LEGACY_SOURCE_FOLDERS_KEY: &str = "sourcefolders";

/// 登录凭据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CredentialConfig {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// 私钥文件路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

/// 远端主机
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostConfig {
    pub host: String,
    #[serde(rename = "credentialsID")]
    pub credentials_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// 最大并发操作数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_fast_put: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

/// 本地源目录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SourceConfig {
    pub folder: String,
    /// glob 规则，`!` 开头表示排除
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_dot_files: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_all_folders: Option<bool>,
}

/// 单个部署任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(rename = "hostID")]
    pub host_id: String,
    #[serde(rename = "srcID")]
    pub src_id: String,
    pub dst_folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

/// 根配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RootConfig {
    pub credentials: HashMap<String, CredentialConfig>,
    pub hosts: HashMap<String, HostConfig>,
    pub source_folders: HashMap<String, SourceConfig>,
    pub deployments: Vec<DeployConfig>,
}

/// 填充默认值后的部署选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    pub overwrite: bool,
    pub clear: bool,
    pub dry_run: bool,
    pub include_dot_files: bool,
    pub include_all_folders: bool,
    pub parallel: usize,
    pub use_fast_put: bool,
}

/// 引用已解析的部署
#[derive(Debug, Clone)]
pub struct ResolvedDeployment<'a> {
    pub index: usize,
    pub deployment: &'a DeployConfig,
    pub host: &'a HostConfig,
    pub credentials: &'a CredentialConfig,
    pub source: &'a SourceConfig,
    pub options: DeployOptions,
}

impl ResolvedDeployment<'_> {
    /// 过滤规则（未配置时为空）
    pub fn filters(&self) -> &[String] {
        self.source.filters.as_deref().unwrap_or_default()
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            protocol: self.host.protocol.unwrap_or_default(),
            host: self.host.host.clone(),
            port: self.host.port,
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
            private_key: self.credentials.private_key.clone(),
            parallel: self.options.parallel,
        }
    }
}

impl RootConfig {
    /// 校验未类型化的输入
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        if let Some(obj) = value.as_object() {
            if obj.contains_key(LEGACY_SOURCE_FOLDERS_KEY) {
                return Err(ConfigError::RenamedField {
                    found: LEGACY_SOURCE_FOLDERS_KEY,
                    expected: "sourceFolders",
                });
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    /// 从文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()))
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        if !metadata.is_file() {
            return Err(ConfigError::NotAFile(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::Json {
                path: path.to_path_buf(),
                source: e,
            })?;

        tracing::debug!("已加载配置文件: {:?}", path);
        Self::from_value(value)
    }

    /// 返回一份所有部署都强制试运行的副本
    pub fn with_dry_run(&self) -> Self {
        let mut config = self.clone();
        for deployment in &mut config.deployments {
            deployment.dry_run = Some(true);
        }
        config
    }

    /// 解析第 `index` 个部署的引用并填充默认值
    pub fn resolve(&self, index: usize) -> Result<ResolvedDeployment<'_>, DeployError> {
        let deployment = self
            .deployments
            .get(index)
            .ok_or(DeployError::MissingDeployment(index + 1))?;

        let host = self
            .hosts
            .get(&deployment.host_id)
            .ok_or_else(|| DeployError::MissingHost(deployment.host_id.clone()))?;
        let credentials = self
            .credentials
            .get(&host.credentials_id)
            .ok_or_else(|| DeployError::MissingCredentials(host.credentials_id.clone()))?;
        let source = self
            .source_folders
            .get(&deployment.src_id)
            .ok_or_else(|| DeployError::MissingSource(deployment.src_id.clone()))?;

        let options = DeployOptions {
            overwrite: deployment.overwrite.unwrap_or(false),
            clear: deployment.clear.unwrap_or(false),
            dry_run: deployment.dry_run.unwrap_or(false),
            include_dot_files: source.include_dot_files.unwrap_or(true),
            include_all_folders: source.include_all_folders.unwrap_or(false),
            parallel: host.parallel.unwrap_or(1).max(1),
            use_fast_put: host.use_fast_put.unwrap_or(false),
        };

        Ok(ResolvedDeployment {
            index,
            deployment,
            host,
            credentials,
            source,
            options,
        })
    }
}
