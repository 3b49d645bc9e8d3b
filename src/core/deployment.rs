//! 部署执行器
//!
//! 每个部署按 校验 -> 收集 -> 连接 -> 清空 -> 创建目录 -> 上传 -> 关闭 的顺序执行，
//! 部署之间严格串行，一个部署失败不影响后续部署。

use crate::config::{ResolvedDeployment, RootConfig};
use crate::core::filter::{derive_folders, PathFilter};
use crate::core::parallel::Parallelizor;
use crate::core::scanner::{collect, CollectOptions};
use crate::error::{DeployError, ErrorKind};
use crate::logging::{DeployLogger, LogColor, LogOptions, LogStyle};
use crate::storage::{join_remote, normalize_remote_root, Connector, EntryKind, RemoteFs};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 部署阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeployPhase {
    Validating,
    Collecting,
    DryRun,
    Connecting,
    Clearing,
    CreatingFolders,
    Uploading,
    Closing,
    Done,
    Failed,
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeployPhase::Validating => "校验",
            DeployPhase::Collecting => "收集",
            DeployPhase::DryRun => "试运行",
            DeployPhase::Connecting => "连接",
            DeployPhase::Clearing => "清空",
            DeployPhase::CreatingFolders => "创建目录",
            DeployPhase::Uploading => "上传",
            DeployPhase::Closing => "关闭",
            DeployPhase::Done => "完成",
            DeployPhase::Failed => "失败",
        };
        f.write_str(label)
    }
}

/// 一条本地到远端的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// 相对源目录的路径，使用 `/` 分隔
    pub relative: String,
    pub source: PathBuf,
    pub destination: String,
}

/// 部署计划
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub source_root: PathBuf,
    pub destination_root: String,
    pub files: Vec<PlanEntry>,
    pub folders: Vec<PlanEntry>,
}

/// 部署报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    /// 部署序号，从 1 开始
    pub deployment: usize,
    pub status: DeployPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<DeployPhase>,
    pub dry_run: bool,
    pub files_planned: u64,
    pub folders_planned: u64,
    pub files_uploaded: u64,
    pub files_skipped: u64,
    pub entries_deleted: u64,
    pub folders_created: u64,
    pub bytes_transferred: u64,
    pub start_time: i64,
    pub end_time: i64,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl DeployReport {
    fn new(deployment: usize) -> Self {
        Self {
            deployment,
            status: DeployPhase::Validating,
            failed_phase: None,
            dry_run: false,
            files_planned: 0,
            folders_planned: 0,
            files_uploaded: 0,
            files_skipped: 0,
            entries_deleted: 0,
            folders_created: 0,
            bytes_transferred: 0,
            start_time: chrono::Utc::now().timestamp(),
            end_time: 0,
            error: None,
            error_kind: None,
        }
    }

    fn enter(&mut self, phase: DeployPhase) {
        debug!("部署 {} 进入阶段: {}", self.deployment, phase);
        self.status = phase;
    }

    pub fn success(&self) -> bool {
        self.status == DeployPhase::Done
    }
}

/// 并发操作共享的计数
#[derive(Debug, Default)]
struct DeployStats {
    files_uploaded: AtomicU64,
    files_skipped: AtomicU64,
    entries_deleted: AtomicU64,
    folders_created: AtomicU64,
    bytes_transferred: AtomicU64,
}

impl DeployStats {
    fn apply(&self, report: &mut DeployReport) {
        report.files_uploaded = self.files_uploaded.load(Ordering::Relaxed);
        report.files_skipped = self.files_skipped.load(Ordering::Relaxed);
        report.entries_deleted = self.entries_deleted.load(Ordering::Relaxed);
        report.folders_created = self.folders_created.load(Ordering::Relaxed);
        report.bytes_transferred = self.bytes_transferred.load(Ordering::Relaxed);
    }
}

/// 部署执行器
pub struct Deployer {
    connector: Arc<dyn Connector>,
    logger: Arc<dyn DeployLogger>,
}

impl Deployer {
    pub fn new(connector: Arc<dyn Connector>, logger: Arc<dyn DeployLogger>) -> Self {
        Self { connector, logger }
    }

    /// 依次执行全部部署，全部成功时返回 true
    pub async fn deploy_all(&self, config: &RootConfig) -> bool {
        let reports = self.run_all(config).await;
        let failed = reports.iter().filter(|r| !r.success()).count();
        if failed > 0 {
            self.logger
                .error(&format!("{}/{} 个部署失败", failed, reports.len()));
        } else if !reports.is_empty() {
            self.logger.log(
                &format!("全部 {} 个部署完成", reports.len()),
                LogOptions::styled(LogColor::Green, LogStyle::Bold),
            );
        }
        failed == 0
    }

    /// 依次执行全部部署并返回每个部署的报告
    pub async fn run_all(&self, config: &RootConfig) -> Vec<DeployReport> {
        let mut reports = Vec::with_capacity(config.deployments.len());
        for index in 0..config.deployments.len() {
            reports.push(self.run_deployment(config, index).await);
        }

        let failed = reports.iter().filter(|r| !r.success()).count();
        info!(
            "全部部署结束: 成功 {}, 失败 {}",
            reports.len() - failed,
            failed
        );
        reports
    }

    /// 执行第 `index` 个部署，错误不会向外传播
    pub async fn run_deployment(&self, config: &RootConfig, index: usize) -> DeployReport {
        let number = index + 1;
        let mut report = DeployReport::new(number);
        self.logger.log(
            &format!("开始部署 {}", number),
            LogOptions::styled(LogColor::Green, LogStyle::Bold),
        );

        let result = self.execute(config, index, &mut report).await;
        report.end_time = chrono::Utc::now().timestamp();

        match result {
            Ok(()) => {
                report.enter(DeployPhase::Done);
                self.logger.log(
                    &format!("部署 {} 完成", number),
                    LogOptions::styled(LogColor::Green, LogStyle::Bold),
                );
            }
            Err(e) => {
                warn!("部署 {} 失败: {}", number, e);
                report.failed_phase.get_or_insert(report.status);
                report.error = Some(e.to_string());
                report.error_kind = Some(e.kind());
                report.enter(DeployPhase::Failed);
                self.logger.error(&e.to_string());
                self.logger.error(&format!("部署 {} 失败", number));
            }
        }
        report
    }

    /// 只计算部署计划，不连接远端
    pub async fn plan(&self, config: &RootConfig, index: usize) -> Result<DeployPlan, DeployError> {
        let resolved = config.resolve(index)?;
        build_plan(&resolved).await
    }

    async fn execute(
        &self,
        config: &RootConfig,
        index: usize,
        report: &mut DeployReport,
    ) -> Result<(), DeployError> {
        report.enter(DeployPhase::Validating);
        let resolved = config.resolve(index)?;
        let options = resolved.options;
        report.dry_run = options.dry_run;

        report.enter(DeployPhase::Collecting);
        self.logger.log(
            &format!("正在收集文件 {}", resolved.source.folder),
            LogOptions::color(LogColor::Cyan),
        );
        let plan = build_plan(&resolved).await?;
        report.files_planned = plan.files.len() as u64;
        report.folders_planned = plan.folders.len() as u64;

        if options.dry_run {
            report.enter(DeployPhase::DryRun);
            self.log_dry_run(&plan);
            return Ok(());
        }

        report.enter(DeployPhase::Connecting);
        let host = &resolved.host.host;
        self.logger.log(
            &format!("正在连接 {}", host),
            LogOptions::color(LogColor::Blue),
        );
        let fs = self
            .connector
            .connect(&resolved.connect_options())
            .await
            .map_err(|e| DeployError::Connect {
                host: host.clone(),
                message: format!("{:#}", e),
            })?;
        debug!("已连接: {}", fs.name());

        let stats = Arc::new(DeployStats::default());
        let result = self.transfer(&fs, &plan, &resolved, &stats, report).await;
        stats.apply(report);
        if result.is_err() {
            report.failed_phase = Some(report.status);
        }

        // 连接建立后无论成败都要关闭
        report.enter(DeployPhase::Closing);
        self.logger
            .log("正在关闭连接", LogOptions::color(LogColor::Blue));
        if let Err(e) = fs.end().await {
            warn!("关闭连接失败 {}: {:#}", host, e);
            self.logger.log(
                &format!("关闭连接失败 {}: {:#}", host, e),
                LogOptions::color(LogColor::Yellow),
            );
        }

        result
    }

    async fn transfer(
        &self,
        fs: &Arc<dyn RemoteFs>,
        plan: &DeployPlan,
        resolved: &ResolvedDeployment<'_>,
        stats: &Arc<DeployStats>,
        report: &mut DeployReport,
    ) -> Result<(), DeployError> {
        let options = resolved.options;
        let root = &plan.destination_root;

        let root_exists = fs.exists(root).await.map_err(|e| DeployError::CreateRoot {
            path: root.clone(),
            message: format!("{:#}", e),
        })?;
        if !root_exists {
            self.logger.log(
                &format!("创建目标目录 {}", root),
                LogOptions::color(LogColor::Cyan),
            );
            fs.mkdir(root, true)
                .await
                .map_err(|e| DeployError::CreateRoot {
                    path: root.clone(),
                    message: format!("{:#}", e),
                })?;
        }

        if options.clear {
            report.enter(DeployPhase::Clearing);
            self.clear(fs, root, options.parallel, stats).await?;
        }

        report.enter(DeployPhase::CreatingFolders);
        self.create_folders(fs.as_ref(), root, &plan.folders, stats)
            .await?;

        report.enter(DeployPhase::Uploading);
        self.upload(fs, root, &plan.files, resolved, stats).await
    }

    /// 删除目标目录的全部直接子项
    async fn clear(
        &self,
        fs: &Arc<dyn RemoteFs>,
        root: &str,
        parallel: usize,
        stats: &Arc<DeployStats>,
    ) -> Result<(), DeployError> {
        self.logger.log(
            &format!("正在清空 {}", root),
            LogOptions::color(LogColor::Cyan),
        );
        let entries = fs.list(root).await.map_err(|e| DeployError::List {
            path: root.to_string(),
            message: format!("{:#}", e),
        })?;

        let mut parallelizor = Parallelizor::new(parallel);
        let last = entries.len().saturating_sub(1);
        for (i, entry) in entries.into_iter().enumerate() {
            let path = join_remote(root, &entry.name);
            self.logger
                .log(&format!("删除 {}", path), LogOptions::color(LogColor::Yellow));

            let fs = fs.clone();
            let logger = self.logger.clone();
            let stats = stats.clone();
            let results = parallelizor
                .run(
                    async move {
                        let result = match entry.kind {
                            EntryKind::Dir => fs.rmdir(&path, true).await,
                            EntryKind::File => fs.delete(&path).await,
                        };
                        match result {
                            Ok(()) => {
                                stats.entries_deleted.fetch_add(1, Ordering::Relaxed);
                                true
                            }
                            Err(e) => {
                                logger.error(&format!("无法删除 {}: {:#}", path, e));
                                false
                            }
                        }
                    },
                    i == last,
                )
                .await;
            check_batch(&results, DeployPhase::Clearing)?;
        }
        Ok(())
    }

    /// 按顺序逐个创建目录
    async fn create_folders(
        &self,
        fs: &dyn RemoteFs,
        root: &str,
        folders: &[PlanEntry],
        stats: &DeployStats,
    ) -> Result<(), DeployError> {
        if folders.is_empty() {
            return Ok(());
        }
        self.logger.log(
            &format!("正在创建目录 {}", root),
            LogOptions::color(LogColor::Cyan),
        );

        let total = folders.len();
        for (i, folder) in folders.iter().enumerate() {
            self.logger.log(
                &format!("({}/{}) {}", i + 1, total, folder.destination),
                LogOptions::color(LogColor::Yellow),
            );
            fs.mkdir(&folder.destination, true)
                .await
                .map_err(|e| DeployError::Mkdir {
                    path: folder.destination.clone(),
                    message: format!("{:#}", e),
                })?;
            stats.folders_created.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn upload(
        &self,
        fs: &Arc<dyn RemoteFs>,
        root: &str,
        files: &[PlanEntry],
        resolved: &ResolvedDeployment<'_>,
        stats: &Arc<DeployStats>,
    ) -> Result<(), DeployError> {
        let options = resolved.options;
        self.logger.log(
            &format!("正在上传文件到 {}", root),
            LogOptions::color(LogColor::Cyan),
        );
        if options.parallel > 1 {
            self.logger
                .info(&format!("  - 并行数: {}", options.parallel));
        }
        if options.use_fast_put {
            self.logger.info("  - 使用 fastPut");
        }

        let mut parallelizor = Parallelizor::new(options.parallel);
        let total = files.len();
        for (i, file) in files.iter().enumerate() {
            self.logger.log(
                &format!("({}/{}) {}", i + 1, total, file.destination),
                LogOptions::color(LogColor::Yellow),
            );

            let fs = fs.clone();
            let logger = self.logger.clone();
            let stats = stats.clone();
            let file = file.clone();
            let results = parallelizor
                .run(
                    async move {
                        upload_file(
                            fs.as_ref(),
                            logger.as_ref(),
                            &stats,
                            &file,
                            options.overwrite,
                            options.use_fast_put,
                        )
                        .await
                    },
                    i + 1 == total,
                )
                .await;
            check_batch(&results, DeployPhase::Uploading)?;
        }
        Ok(())
    }

    fn log_dry_run(&self, plan: &DeployPlan) {
        self.logger.log(
            "[试运行] 不会连接远端",
            LogOptions::styled(LogColor::Magenta, LogStyle::Bold),
        );
        self.logger.log(
            &format!("将上传 {} 个文件:", plan.files.len()),
            LogOptions::color(LogColor::Cyan),
        );
        for file in &plan.files {
            self.logger
                .info(&format!("  {} -> {}", file.source.display(), file.destination));
        }
        self.logger.log(
            &format!("将创建 {} 个目录:", plan.folders.len()),
            LogOptions::color(LogColor::Cyan),
        );
        for folder in &plan.folders {
            self.logger.info(&format!(
                "  {} -> {}",
                folder.source.display(),
                folder.destination
            ));
        }
    }
}

/// 收集、过滤源目录并计算远端路径
async fn build_plan(resolved: &ResolvedDeployment<'_>) -> Result<DeployPlan, DeployError> {
    let options = resolved.options;
    let folder = PathBuf::from(&resolved.source.folder);
    let source_root = std::path::absolute(&folder).unwrap_or(folder);

    let is_dir = tokio::fs::metadata(&source_root)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(DeployError::SourceNotDirectory(source_root));
    }

    let filter = PathFilter::new(resolved.filters())?;
    let collect_options = CollectOptions {
        include_dot_files: options.include_dot_files,
        include_folders: options.include_all_folders,
    };
    let collected = collect(&source_root, collect_options)
        .await
        .map_err(|e| DeployError::Collect {
            root: source_root.clone(),
            source: e,
        })?;

    let files = filter.filter(&collected.relative_files(&source_root));
    let folders = if options.include_all_folders {
        filter.filter(&collected.relative_dirs(&source_root))
    } else {
        derive_folders(&files)
    };

    let destination_root = normalize_remote_root(&resolved.deployment.dst_folder);
    let files = to_entries(&source_root, &destination_root, files);
    let folders = to_entries(&source_root, &destination_root, folders);
    debug!(
        "部署计划: {} 个文件, {} 个目录 -> {}",
        files.len(),
        folders.len(),
        destination_root
    );

    Ok(DeployPlan {
        source_root,
        destination_root,
        files,
        folders,
    })
}

fn to_entries(source_root: &Path, destination_root: &str, relative: Vec<String>) -> Vec<PlanEntry> {
    relative
        .into_iter()
        .map(|relative| PlanEntry {
            source: source_root.join(&relative),
            destination: join_remote(destination_root, &relative),
            relative,
        })
        .collect()
}

/// 批次中任一操作失败或异常退出即视为失败
fn check_batch(results: &[Option<bool>], phase: DeployPhase) -> Result<(), DeployError> {
    if results.iter().all(|r| *r == Some(true)) {
        Ok(())
    } else {
        Err(DeployError::BatchFailed { phase })
    }
}

/// 上传单个文件，返回是否成功（跳过也算成功）
async fn upload_file(
    fs: &dyn RemoteFs,
    logger: &dyn DeployLogger,
    stats: &DeployStats,
    file: &PlanEntry,
    overwrite: bool,
    fast: bool,
) -> bool {
    match try_upload(fs, file, overwrite, fast).await {
        Ok(Some(bytes)) => {
            stats.files_uploaded.fetch_add(1, Ordering::Relaxed);
            stats.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
            debug!("已上传: {} ({} bytes)", file.destination, bytes);
            true
        }
        Ok(None) => {
            stats.files_skipped.fetch_add(1, Ordering::Relaxed);
            logger.log(
                &format!("跳过 {}，目标已存在", file.source.display()),
                LogOptions::color(LogColor::Yellow),
            );
            true
        }
        Err(e) => {
            logger.error(&format!("无法上传 {}: {:#}", file.source.display(), e));
            false
        }
    }
}

/// 目标已存在且不允许覆盖时返回 `None`
async fn try_upload(
    fs: &dyn RemoteFs,
    file: &PlanEntry,
    overwrite: bool,
    fast: bool,
) -> anyhow::Result<Option<u64>> {
    if fs.exists(&file.destination).await? && !overwrite {
        return Ok(None);
    }
    let bytes = if fast {
        fs.fast_put(&file.source, &file.destination).await?
    } else {
        fs.put(&file.source, &file.destination).await?
    };
    Ok(Some(bytes))
}
