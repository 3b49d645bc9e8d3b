//! 测试用的内存远端、连接器和日志

use crate::logging::{DeployLogger, LogOptions};
use crate::storage::{ConnectOptions, Connector, EntryKind, RemoteEntry, RemoteFs};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 远端调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(String),
    Mkdir(String, bool),
    List(String),
    Delete(String),
    Rmdir(String, bool),
    Put(String),
    FastPut(String),
    End,
}

impl Call {
    fn is_mutation(&self) -> bool {
        !matches!(self, Call::Exists(_) | Call::List(_) | Call::End)
    }
}

#[derive(Default)]
struct MockState {
    files: BTreeSet<String>,
    dirs: BTreeSet<String>,
    calls: Vec<Call>,
}

/// 记录所有调用的内存文件系统
#[derive(Default)]
pub struct MockFs {
    state: Mutex<MockState>,
    failures: HashSet<(&'static str, String)>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置远端文件（自动创建父目录）
    pub fn with_file(self, path: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.files.insert(path.to_string());
            insert_ancestors(&mut state.dirs, path);
        }
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.dirs.insert(path.to_string());
            insert_ancestors(&mut state.dirs, path);
        }
        self
    }

    /// 让指定操作在指定路径上失败
    pub fn fail(mut self, op: &'static str, path: &str) -> Self {
        self.failures.insert((op, path.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// 只保留会修改远端的调用
    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.state.lock().unwrap().files.contains(path)
    }

    fn record(&self, op: &'static str, path: &str, call: Call) -> Result<()> {
        self.state.lock().unwrap().calls.push(call);
        if self.failures.contains(&(op, path.to_string())) {
            bail!("模拟 {} 失败: {}", op, path);
        }
        Ok(())
    }
}

fn insert_ancestors(dirs: &mut BTreeSet<String>, path: &str) {
    let mut current = path;
    while let Some((parent, _)) = current.rsplit_once('/') {
        if parent.is_empty() {
            break;
        }
        dirs.insert(parent.to_string());
        current = parent;
    }
}

#[async_trait]
impl RemoteFs for MockFs {
    async fn exists(&self, path: &str) -> Result<bool> {
        self.record("exists", path, Call::Exists(path.to_string()))?;
        let state = self.state.lock().unwrap();
        Ok(state.files.contains(path) || state.dirs.contains(path))
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        self.record("mkdir", path, Call::Mkdir(path.to_string(), recursive))?;
        let mut state = self.state.lock().unwrap();
        state.dirs.insert(path.to_string());
        if recursive {
            insert_ancestors(&mut state.dirs, path);
        }
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.record("list", path, Call::List(path.to_string()))?;
        let state = self.state.lock().unwrap();
        let prefix = format!("{}/", path.trim_end_matches('/'));

        let child = |p: &String| {
            p.strip_prefix(&prefix)
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                .map(str::to_string)
        };
        let mut entries: Vec<RemoteEntry> = state
            .dirs
            .iter()
            .filter_map(child)
            .map(|name| RemoteEntry {
                name,
                kind: EntryKind::Dir,
            })
            .chain(state.files.iter().filter_map(child).map(|name| RemoteEntry {
                name,
                kind: EntryKind::File,
            }))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.record("delete", path, Call::Delete(path.to_string()))?;
        let mut state = self.state.lock().unwrap();
        if !state.files.remove(path) {
            return Err(anyhow!("文件不存在: {}", path));
        }
        Ok(())
    }

    async fn rmdir(&self, path: &str, recursive: bool) -> Result<()> {
        self.record("rmdir", path, Call::Rmdir(path.to_string(), recursive))?;
        let mut state = self.state.lock().unwrap();
        let prefix = format!("{}/", path);
        state.dirs.retain(|d| d != path && !d.starts_with(&prefix));
        state.files.retain(|f| !f.starts_with(&prefix));
        Ok(())
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<u64> {
        self.record("put", remote, Call::Put(remote.to_string()))?;
        let size = std::fs::metadata(local)?.len();
        self.state.lock().unwrap().files.insert(remote.to_string());
        Ok(size)
    }

    async fn fast_put(&self, local: &Path, remote: &str) -> Result<u64> {
        self.record("put", remote, Call::FastPut(remote.to_string()))?;
        let size = std::fs::metadata(local)?.len();
        self.state.lock().unwrap().files.insert(remote.to_string());
        Ok(size)
    }

    async fn end(&self) -> Result<()> {
        self.record("end", "", Call::End)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 返回同一个 [`MockFs`] 的连接器
pub struct MockConnector {
    fs: Arc<MockFs>,
    refuse: bool,
    connects: AtomicUsize,
    last: Mutex<Option<ConnectOptions>>,
}

impl MockConnector {
    pub fn new(fs: Arc<MockFs>) -> Self {
        Self {
            fs,
            refuse: false,
            connects: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    /// 每次连接都失败
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(Arc::new(MockFs::new()))
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<ConnectOptions> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn RemoteFs>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(options.clone());
        if self.refuse {
            bail!("connection refused");
        }
        Ok(self.fs.clone() as Arc<dyn RemoteFs>)
    }
}

/// 把日志保存在内存中
#[derive(Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<(String, LogOptions)>>,
}

impl MemoryLogger {
    pub fn messages(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, o)| o.is_error())
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl DeployLogger for MemoryLogger {
    fn log(&self, message: &str, options: LogOptions) {
        self.lines.lock().unwrap().push((message.to_string(), options));
    }
}
