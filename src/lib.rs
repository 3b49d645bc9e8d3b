use std::path::Path;
use std::sync::Arc;

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

#[cfg(test)]
mod testing;

pub use config::{DeployOptions, RootConfig};
pub use core::{DeployPhase, DeployPlan, DeployReport, Deployer};
pub use error::{ConfigError, DeployError, ErrorKind};
pub use logging::{ConsoleLogger, DeployLogger, LogColor, LogOptions};
pub use storage::{Connector, DefaultConnector, RemoteFs};

/// 使用默认连接器执行全部部署
pub async fn deploy(config: &RootConfig, logger: Arc<dyn DeployLogger>) -> bool {
    deploy_with(config, Arc::new(DefaultConnector), logger).await
}

/// 使用指定连接器执行全部部署
pub async fn deploy_with(
    config: &RootConfig,
    connector: Arc<dyn Connector>,
    logger: Arc<dyn DeployLogger>,
) -> bool {
    Deployer::new(connector, logger).deploy_all(config).await
}

/// 校验未类型化的配置后执行部署，配置无效时不会执行任何部署
pub async fn deploy_value(value: serde_json::Value, logger: Arc<dyn DeployLogger>) -> bool {
    match RootConfig::from_value(value) {
        Ok(config) => deploy(&config, logger).await,
        Err(e) => {
            report_config_error(&e, logger.as_ref());
            false
        }
    }
}

/// 从配置文件加载并执行部署
pub async fn deploy_from_file(path: impl AsRef<Path>, logger: Arc<dyn DeployLogger>) -> bool {
    match RootConfig::load(path) {
        Ok(config) => deploy(&config, logger).await,
        Err(e) => {
            report_config_error(&e, logger.as_ref());
            false
        }
    }
}

/// 输出配置错误，旧字段名错误用黄色提示
pub fn report_config_error(error: &ConfigError, logger: &dyn DeployLogger) {
    tracing::error!("配置无效: {}", error);
    match error {
        ConfigError::RenamedField { .. } => logger.log(
            &error.to_string(),
            LogOptions {
                color: Some(LogColor::Yellow),
                ..LogOptions::error()
            },
        ),
        _ => logger.error(&error.to_string()),
    }
}
