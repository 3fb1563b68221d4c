//! 阶段工作者 - 流程层
//!
//! 定义「一个帖子」在三个阶段里各自的完整处理动作：
//!
//! 1. [`FetchStage`] 下载帖子资源，向识别队列转发
//! 2. [`RecognizeStage`] 把图像交给引擎池识别，向更新队列转发
//! 3. [`UpdateStage`] 按提取策略组装补丁，必要时调用远端更新
//!
//! 任务失败一律记录日志后丢弃，不做重试；失败只影响当前帖子，
//! 不影响队列和其他任务。本层不持有任何队列之外的资源。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::clients::CatalogClient;
use crate::error::{Result, UpdateError};
use crate::infrastructure::{OcrPool, StageWorker, TaskQueue};
use crate::models::{Post, RecognizeResult};
use crate::services::AnnotationExtractor;

/// 下载任务
pub struct FetchTask {
    pub post: Post,
}

/// 识别任务
///
/// `image` 归任务独占，提交识别时整体移交给引擎池。
pub struct RecognizeTask {
    pub post: Post,
    pub image: Vec<u8>,
}

/// 更新任务
pub struct UpdateTask {
    pub post: Post,
    pub result: RecognizeResult,
}

/// 整次运行的计数器
///
/// 各阶段工作者并发累加，只增不减；控制器在终态把它汇总成报告。
#[derive(Debug, Default)]
pub struct RunStats {
    pub discovered: AtomicUsize,
    pub skipped_ineligible: AtomicUsize,
    pub fetched: AtomicUsize,
    pub fetch_failed: AtomicUsize,
    pub recognized: AtomicUsize,
    pub recognize_failed: AtomicUsize,
    pub updated: AtomicUsize,
    pub update_skipped: AtomicUsize,
    pub update_failed: AtomicUsize,
    pub conflicts: AtomicUsize,
}

/// 下载阶段
pub struct FetchStage {
    client: Arc<dyn CatalogClient>,
    downstream: TaskQueue<RecognizeTask>,
    stats: Arc<RunStats>,
}

impl FetchStage {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        downstream: TaskQueue<RecognizeTask>,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            client,
            downstream,
            stats,
        }
    }
}

#[async_trait]
impl StageWorker<FetchTask> for FetchStage {
    async fn process(&self, task: FetchTask) -> Result<()> {
        let post = task.post;
        debug!("[帖子 {}] 正在下载资源 {}", post.id, post.content_url);

        match self.client.fetch_resource(&post.content_url).await {
            Ok(image) => {
                self.stats.fetched.fetch_add(1, Ordering::Relaxed);
                self.downstream.push(RecognizeTask { post, image });
            }
            Err(e) => {
                // 不重试，本次运行跳过该帖子
                warn!("[帖子 {}] ⚠️ 资源下载失败，跳过: {}", post.id, e);
                self.stats.fetch_failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }
}

/// 识别阶段
///
/// 队列并发数可以大于引擎池大小，多出的工作者会挂起在池内等待空闲
/// 引擎，并发识别数始终以池大小为准。
pub struct RecognizeStage {
    pool: Arc<OcrPool>,
    downstream: TaskQueue<UpdateTask>,
    stats: Arc<RunStats>,
}

impl RecognizeStage {
    pub fn new(
        pool: Arc<OcrPool>,
        downstream: TaskQueue<UpdateTask>,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            pool,
            downstream,
            stats,
        }
    }
}

#[async_trait]
impl StageWorker<RecognizeTask> for RecognizeStage {
    async fn process(&self, task: RecognizeTask) -> Result<()> {
        let post = task.post;
        debug!("[帖子 {}] 正在识别图像内容", post.id);

        match self.pool.submit(task.image).await {
            Ok(result) => {
                self.stats.recognized.fetch_add(1, Ordering::Relaxed);
                self.downstream.push(UpdateTask { post, result });
            }
            Err(e) => {
                warn!("[帖子 {}] ⚠️ 识别失败，跳过: {}", post.id, e);
                self.stats.recognize_failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }
}

/// 更新阶段
pub struct UpdateStage {
    client: Arc<dyn CatalogClient>,
    extractor: Arc<AnnotationExtractor>,
    stats: Arc<RunStats>,
}

impl UpdateStage {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        extractor: Arc<AnnotationExtractor>,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            client,
            extractor,
            stats,
        }
    }
}

#[async_trait]
impl StageWorker<UpdateTask> for UpdateStage {
    async fn process(&self, task: UpdateTask) -> Result<()> {
        let UpdateTask { post, result } = task;

        // 没有产生任何新内容的任务不允许触碰远端
        let Some(patch) = self.extractor.build_patch(&post, &result) else {
            debug!("[帖子 {}] 没有新的注释或 Tag，无需更新", post.id);
            self.stats.update_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        info!("[帖子 {}] 📤 正在更新帖子", post.id);
        match self.client.update_post(post.id, post.version, &patch).await {
            Ok(()) => {
                info!("[帖子 {}] ✓ 更新成功", post.id);
                self.stats.updated.fetch_add(1, Ordering::Relaxed);
            }
            Err(UpdateError::Conflict { .. }) => {
                // 每个帖子每次运行只处理一次，冲突即放弃
                warn!("[帖子 {}] ⚠️ 版本冲突，放弃本次更新", post.id);
                self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("[帖子 {}] ⚠️ 更新失败: {}", post.id, e);
                self.stats.update_failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }
}
