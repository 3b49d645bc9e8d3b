//! 日志模块
//!
//! 面向用户的部署进度通过 [`DeployLogger`] 输出；
//! 内部诊断信息走 tracing，由 [`init_logging`] 初始化。

use crossterm::style::{Attribute, Color, Stylize};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

/// 日志颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    Gray,
}

impl From<LogColor> for Color {
    fn from(color: LogColor) -> Self {
        match color {
            LogColor::Black => Color::Black,
            LogColor::Red => Color::DarkRed,
            LogColor::Green => Color::DarkGreen,
            LogColor::Yellow => Color::DarkYellow,
            LogColor::Blue => Color::DarkBlue,
            LogColor::Magenta => Color::DarkMagenta,
            LogColor::Cyan => Color::DarkCyan,
            LogColor::White => Color::Grey,
            LogColor::Gray => Color::DarkGrey,
        }
    }
}

/// 日志样式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    Reset,
    Bold,
    Dim,
    Italic,
    Underline,
    Inverse,
    Hidden,
    Strikethrough,
}

impl From<LogStyle> for Attribute {
    fn from(style: LogStyle) -> Self {
        match style {
            LogStyle::Reset => Attribute::Reset,
            LogStyle::Bold => Attribute::Bold,
            LogStyle::Dim => Attribute::Dim,
            LogStyle::Italic => Attribute::Italic,
            LogStyle::Underline => Attribute::Underlined,
            LogStyle::Inverse => Attribute::Reverse,
            LogStyle::Hidden => Attribute::Hidden,
            LogStyle::Strikethrough => Attribute::CrossedOut,
        }
    }
}

/// 日志类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogKind {
    #[default]
    Info,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub color: Option<LogColor>,
    pub style: Option<LogStyle>,
    pub kind: LogKind,
}

impl LogOptions {
    pub fn color(color: LogColor) -> Self {
        Self {
            color: Some(color),
            ..Default::default()
        }
    }

    pub fn styled(color: LogColor, style: LogStyle) -> Self {
        Self {
            color: Some(color),
            style: Some(style),
            ..Default::default()
        }
    }

    pub fn error() -> Self {
        Self {
            kind: LogKind::Error,
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == LogKind::Error
    }
}

/// 部署进度输出
///
/// 会在并发完成的操作中被调用，实现必须线程安全且不能失败。
pub trait DeployLogger: Send + Sync {
    fn log(&self, message: &str, options: LogOptions);

    fn info(&self, message: &str) {
        self.log(message, LogOptions::default());
    }

    fn error(&self, message: &str) {
        self.log(message, LogOptions::error());
    }
}

/// 控制台输出，错误写到 stderr
#[derive(Debug, Clone, Copy)]
pub struct ConsoleLogger {
    colored: bool,
}

impl ConsoleLogger {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    fn render(&self, message: &str, options: LogOptions) -> String {
        if !self.colored {
            return message.to_string();
        }

        // 错误信息未指定颜色时默认红色
        let color = options
            .color
            .or_else(|| options.is_error().then_some(LogColor::Red));

        let mut styled = message.stylize();
        if let Some(color) = color {
            styled = styled.with(color.into());
        }
        if let Some(style) = options.style {
            styled = styled.attribute(style.into());
        }
        styled.to_string()
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DeployLogger for ConsoleLogger {
    fn log(&self, message: &str, options: LogOptions) {
        let line = self.render(message, options);
        if options.is_error() {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

/// 转发到 tracing
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl DeployLogger for TracingLogger {
    fn log(&self, message: &str, options: LogOptions) {
        match options.kind {
            LogKind::Error => tracing::error!("{}", message),
            LogKind::Info => tracing::info!("{}", message),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用诊断日志
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 日志文件目录，为空时只输出到控制台
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            level: default_level(),
            dir: None,
        }
    }
}

impl LogConfig {
    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 初始化诊断日志
///
/// 返回的 guard 需要保持到进程退出，否则文件日志可能丢失尾部内容。
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return None;
    }

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(config.tracing_level().into())
        .add_directive("opendal=warn".parse().expect("valid directive"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let (file_layer, guard) = match &config.dir {
        Some(dir) => match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::never(dir, "deploytools.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("无法创建日志目录 {:?}: {}", dir, e);
                (None, None)
            }
        },
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_level() {
        let mut config = LogConfig::default();
        assert_eq!(config.tracing_level(), tracing::Level::WARN);
        config.level = "DEBUG".into();
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
        config.level = "bogus".into();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_tracing_logger_without_subscriber() {
        let logger = TracingLogger;
        logger.info("部署开始");
        logger.error("部署失败");
    }

    #[test]
    fn test_log_options() {
        assert!(LogOptions::error().is_error());
        assert!(!LogOptions::color(LogColor::Red).is_error());
        assert_eq!(
            LogOptions::styled(LogColor::Cyan, LogStyle::Bold).style,
            Some(LogStyle::Bold)
        );
    }

    #[test]
    fn test_plain_render() {
        let logger = ConsoleLogger::new(false);
        assert_eq!(
            logger.render("hello", LogOptions::styled(LogColor::Green, LogStyle::Bold)),
            "hello"
        );
    }
}
