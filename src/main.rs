use clap::Parser;
use deploytools_lib::logging::{init_logging, ConsoleLogger, LogConfig};
use deploytools_lib::{deploy, report_config_error, DeployLogger, RootConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// 按配置文件把本地目录部署到远端
#[derive(Debug, Parser)]
#[command(name = "deploytools", version, about)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "./sftp.deploy.json")]
    config: PathBuf,

    /// 只打印部署计划，不连接远端
    #[arg(long)]
    dry_run: bool,

    /// 禁用彩色输出
    #[arg(long)]
    no_color: bool,

    /// 诊断日志级别
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// 诊断日志目录
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = init_logging(&LogConfig {
        enabled: true,
        level: cli.log_level.clone(),
        dir: cli.log_dir.clone(),
    });

    let colored = !cli.no_color && std::env::var_os("NO_COLOR").is_none();
    let logger: Arc<dyn DeployLogger> = Arc::new(ConsoleLogger::new(colored));

    let config = match RootConfig::load(&cli.config) {
        Ok(config) if cli.dry_run => config.with_dry_run(),
        Ok(config) => config,
        Err(e) => {
            report_config_error(&e, logger.as_ref());
            return ExitCode::FAILURE;
        }
    };

    if deploy(&config, logger).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
