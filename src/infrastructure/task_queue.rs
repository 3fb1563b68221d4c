//! 有界工作队列 - 基础设施层
//!
//! 提交无界、执行有界：任务先进入无界通道，再由固定数量的工作者按
//! 到达顺序取出执行；跨工作者的完成顺序不做任何保证。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

use crate::error::Result;

/// 阶段工作者：处理队列中的单个任务
///
/// 返回 Err 表示该任务被丢弃；队列会记录日志并继续处理后续任务，
/// 失败永远不会影响队列本身或其他任务。
#[async_trait]
pub trait StageWorker<T>: Send + Sync {
    async fn process(&self, task: T) -> Result<()>;
}

/// 有界工作队列
///
/// `pending` 统计「排队中 + 执行中」的任务数，每次归零都会向控制器的
/// 事件通道发送一次排空事件。排空事件只是提示：发送瞬间可能已有新任务
/// 被并发推入，消费方必须用 [`TaskQueue::is_idle`] 复核。
pub struct TaskQueue<T> {
    name: &'static str,
    tx: mpsc::UnboundedSender<T>,
    pending: Arc<AtomicUsize>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<T: Send + 'static> TaskQueue<T> {
    /// 启动一个工作队列
    ///
    /// # 参数
    /// - `name`: 日志中显示的队列名
    /// - `concurrency`: 同时执行的任务上限
    /// - `worker`: 任务处理逻辑
    /// - `events`: 控制器事件通道
    /// - `drained`: 排空时发送的事件值
    pub fn spawn<W, E>(
        name: &'static str,
        concurrency: usize,
        worker: Arc<W>,
        events: mpsc::UnboundedSender<E>,
        drained: E,
    ) -> Self
    where
        W: StageWorker<T> + 'static,
        E: Copy + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let pending = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

        {
            let pending = pending.clone();
            tokio::spawn(async move {
                while let Some(task) = rx.recv().await {
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        // 信号量只随队列一起销毁，关闭即整体退出
                        Err(_) => break,
                    };

                    let worker = worker.clone();
                    let pending = pending.clone();
                    let events = events.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = worker.process(task).await {
                            warn!("[{}] 任务处理失败，已丢弃: {}", name, e);
                        }
                        if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                            let _ = events.send(drained);
                        }
                    });
                }
            });
        }

        Self { name, tx, pending }
    }

    /// 推入一个任务
    ///
    /// 从生产者视角是非阻塞的：任务进入通道即返回，不等待消费方接收。
    pub fn push(&self, task: T) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            warn!("[{}] 队列已关闭，任务被丢弃", self.name);
        }
    }

    /// 队列是否处于空闲状态（没有排队中也没有执行中的任务）
    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }

    /// 排队中 + 执行中的任务数
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}
