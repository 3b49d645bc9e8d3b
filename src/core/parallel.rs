//! 有界并发执行器
//!
//! 每次 `run` 立即启动一个操作并放入队列；队列满或显式 flush 时
//! 等待队列中的全部操作完成并按提交顺序返回结果。
//! 结果只能在 flush 时观察到，调用方需要在批次最后一项传入 `flush = true`。

use futures::future::join_all;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::warn;

pub struct Parallelizor<T> {
    concurrency: usize,
    queue: Vec<JoinHandle<T>>,
}

impl<T: Send + 'static> Parallelizor<T> {
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            concurrency,
            queue: Vec::with_capacity(concurrency),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 尚未 flush 的操作数
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// 启动操作；未触发 flush 时返回空列表
    ///
    /// 返回值中 `None` 表示该操作 panic 或被取消。
    pub async fn run<F>(&mut self, operation: F, flush: bool) -> Vec<Option<T>>
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.queue.push(tokio::spawn(operation));

        if self.queue.len() >= self.concurrency || flush {
            self.flush().await
        } else {
            Vec::new()
        }
    }

    /// 等待队列中全部操作完成
    pub async fn flush(&mut self) -> Vec<Option<T>> {
        let pending = std::mem::take(&mut self.queue);
        join_all(pending)
            .await
            .into_iter()
            .map(|result| match result {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("并发任务异常退出: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_returns_empty_until_full() {
        let mut parallel = Parallelizor::new(3);
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..2 {
            let tx = tx.clone();
            let result = parallel
                .run(
                    async move {
                        tx.send(i).unwrap();
                        i
                    },
                    false,
                )
                .await;
            assert!(result.is_empty());
        }
        assert_eq!(parallel.pending(), 2);

        // 未 flush 的操作已经开始执行
        let mut started = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        started.sort();
        assert_eq!(started, vec![0, 1]);

        let result = parallel.run(async { 2 }, false).await;
        assert_eq!(result, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(parallel.pending(), 0);
    }

    #[tokio::test]
    async fn test_flush_preserves_issue_order() {
        let mut parallel = Parallelizor::new(10);
        let delays = [30u64, 10, 20, 0];

        let mut results = Vec::new();
        for (i, delay) in delays.iter().copied().enumerate() {
            let flush = i == delays.len() - 1;
            results = parallel
                .run(
                    async move {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        i
                    },
                    flush,
                )
                .await;
        }

        assert_eq!(results, vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_flush_waits_for_every_operation() {
        let mut parallel = Parallelizor::new(2);
        let done = Arc::new(AtomicUsize::new(0));

        let slow = done.clone();
        let first = parallel
            .run(
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    slow.fetch_add(1, Ordering::SeqCst);
                    true
                },
                false,
            )
            .await;
        assert!(first.is_empty());

        let fast = done.clone();
        let batch = parallel
            .run(
                async move {
                    fast.fetch_add(1, Ordering::SeqCst);
                    false
                },
                false,
            )
            .await;

        assert_eq!(batch, vec![Some(true), Some(false)]);
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicked_operation_yields_none() {
        let mut parallel = Parallelizor::<bool>::new(4);
        parallel.run(async { true }, false).await;
        let fail = true;
        let results = parallel
            .run(
                async move {
                    if fail {
                        panic!("boom");
                    }
                    false
                },
                true,
            )
            .await;
        assert_eq!(results, vec![Some(true), None]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_issue_order_on_worker_threads() {
        let mut parallel = Parallelizor::new(8);
        let mut results = Vec::new();
        for i in 0..8u64 {
            results = parallel
                .run(
                    async move {
                        tokio::time::sleep(Duration::from_millis(40 - i * 5)).await;
                        i
                    },
                    i == 7,
                )
                .await;
        }
        assert_eq!(results, (0..8).map(Some).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_zero_concurrency_treated_as_one() {
        let mut parallel = Parallelizor::new(0);
        assert_eq!(parallel.concurrency(), 1);
        assert_eq!(parallel.run(async { 7 }, false).await, vec![Some(7)]);
    }

    #[tokio::test]
    async fn test_explicit_flush_on_empty_queue() {
        let mut parallel = Parallelizor::<u8>::new(2);
        assert!(parallel.flush().await.is_empty());
    }
}
