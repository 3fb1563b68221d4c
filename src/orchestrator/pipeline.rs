//! 流水线控制器 - 编排层
//!
//! 驱动分页发现、把符合条件的帖子推入下载队列、消费各阶段的排空事件，
//! 并在三项完成条件（分页耗尽、识别侧排空、更新侧排空）同时成立后写入
//! 检查点。控制器状态只在本模块的事件处理路径上被修改，阶段工作者只能
//! 通过任务提交和排空事件与控制器交互。

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clients::{CatalogClient, SzuruClient};
use crate::config::{CheckpointStore, Config, TomlCheckpointStore};
use crate::error::{AppError, Result};
use crate::infrastructure::{OcrPool, RecognitionEngine, TaskQueue, TesseractEngine};
use crate::services::{AnnotationExtractor, TagIndex};
use crate::utils::logging::{log_startup, print_final_stats};
use crate::workflow::{
    FetchStage, FetchTask, RecognizeStage, RecognizeTask, RunStats, UpdateStage, UpdateTask,
};

/// 阶段发给控制器的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// 下载队列排空
    FetchDrained,
    /// 识别队列排空
    RecognizeDrained,
    /// 更新队列排空
    UpdateDrained,
}

/// 控制器所处的阶段：发现 → 排空 → 收尾 → 完成
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovering,
    Draining,
    Finalizing,
    Done,
}

/// 控制器状态
///
/// 单一所有者：只在控制器自己的事件处理路径上被修改，阶段工作者不得
/// 触碰。三个排空标志只会从 false 变为 true，绝不回退。
#[derive(Debug)]
pub struct RunState {
    offset: usize,
    total: usize,
    newest_id: Option<u64>,
    found_checkpoint: bool,
    end_of_list: bool,
    recognition_drained: bool,
    updates_drained: bool,
}

impl RunState {
    pub fn new(total: usize) -> Self {
        Self {
            offset: 0,
            total,
            newest_id: None,
            found_checkpoint: false,
            end_of_list: false,
            recognition_drained: false,
            updates_drained: false,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// 分页过程中见到的最大帖子 ID，终态时作为检查点写入
    pub fn newest_id(&self) -> Option<u64> {
        self.newest_id
    }

    pub fn set_total(&mut self, total: usize) {
        self.total = total;
    }

    pub fn advance_offset(&mut self, limit: usize) {
        self.offset += limit;
    }

    pub fn observe_id(&mut self, id: u64) {
        self.newest_id = Some(self.newest_id.map_or(id, |n| n.max(id)));
    }

    pub fn mark_found_checkpoint(&mut self) {
        self.found_checkpoint = true;
    }

    pub fn mark_end_of_list(&mut self) {
        self.end_of_list = true;
    }

    pub fn mark_recognition_drained(&mut self) {
        self.recognition_drained = true;
    }

    pub fn mark_updates_drained(&mut self) {
        self.updates_drained = true;
    }

    /// 分页是否结束（到达检查点优先于翻完整个目录）
    pub fn pagination_exhausted(&self) -> bool {
        self.found_checkpoint || self.end_of_list
    }

    pub fn recognition_drained(&self) -> bool {
        self.recognition_drained
    }

    pub fn updates_drained(&self) -> bool {
        self.updates_drained
    }

    /// 三项完成条件是否同时成立
    pub fn is_terminal(&self) -> bool {
        self.pagination_exhausted() && self.recognition_drained && self.updates_drained
    }

    pub fn phase(&self) -> Phase {
        if self.is_terminal() {
            Phase::Done
        } else if self.recognition_drained {
            Phase::Finalizing
        } else if self.pagination_exhausted() {
            Phase::Draining
        } else {
            Phase::Discovering
        }
    }
}

/// 整次运行的汇总报告
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub total_posts: usize,
    pub discovered: usize,
    pub skipped_ineligible: usize,
    pub fetched: usize,
    pub fetch_failed: usize,
    pub recognized: usize,
    pub recognize_failed: usize,
    pub updated: usize,
    pub update_skipped: usize,
    pub update_failed: usize,
    pub conflicts: usize,
    /// 本次写入的检查点（没有写入时为 None）
    pub checkpoint: Option<u64>,
}

fn build_report(stats: &RunStats, total_posts: usize, checkpoint: Option<u64>) -> PipelineReport {
    PipelineReport {
        total_posts,
        discovered: stats.discovered.load(Ordering::Relaxed),
        skipped_ineligible: stats.skipped_ineligible.load(Ordering::Relaxed),
        fetched: stats.fetched.load(Ordering::Relaxed),
        fetch_failed: stats.fetch_failed.load(Ordering::Relaxed),
        recognized: stats.recognized.load(Ordering::Relaxed),
        recognize_failed: stats.recognize_failed.load(Ordering::Relaxed),
        updated: stats.updated.load(Ordering::Relaxed),
        update_skipped: stats.update_skipped.load(Ordering::Relaxed),
        update_failed: stats.update_failed.load(Ordering::Relaxed),
        conflicts: stats.conflicts.load(Ordering::Relaxed),
        checkpoint,
    }
}

/// 流水线控制器
pub struct Pipeline {
    config: Config,
    client: Arc<dyn CatalogClient>,
    pool: Arc<OcrPool>,
    store: Arc<dyn CheckpointStore>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        client: Arc<dyn CatalogClient>,
        pool: Arc<OcrPool>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            config,
            client,
            pool,
            store,
        }
    }

    /// 执行一次完整运行，返回汇总报告
    pub async fn run(&self) -> Result<PipelineReport> {
        let policy = self.config.extract.policy();

        if !policy.tags.enable && !policy.notes.enable {
            warn!("⚠️ 注释与 Tag 提取均被禁用，没有可执行的工作");
            return Ok(PipelineReport::default());
        }

        // Tag 索引只构建一次，此后整次运行只读
        let tag_index = if policy.tags.enable {
            info!("Tag 提取已启用，开始缓存 Tag 索引...");
            let tags = self.client.list_all_tags().await?;
            let index = TagIndex::from_tags(tags);
            info!("✓ 已缓存 {} 个 Tag 名称", index.len());
            Arc::new(index)
        } else {
            Arc::new(TagIndex::new())
        };

        let extractor = Arc::new(AnnotationExtractor::new(
            policy,
            self.config.confidence_threshold,
            tag_index,
        ));

        // 发现探测：确认总量并记下最新帖子
        let probe = self.client.list_posts(0, 1).await?;
        if probe.total == 0 {
            // 目录为空：直接完成，不触碰任何队列，检查点保持原样
            info!("没有找到符合条件的帖子");
            return Ok(PipelineReport::default());
        }

        let mut state = RunState::new(probe.total);
        for post in &probe.results {
            state.observe_id(post.id);
        }
        info!("共找到 {} 个帖子", probe.total);

        let last_checked = self.store.read_last_checkpoint().await?;
        match last_checked {
            None => info!("没有检查点记录，将处理所有帖子"),
            Some(id) => info!("将处理到帖子 {} 为止", id),
        }

        // 队列从下游到上游建立，排空事件统一汇入控制器通道
        let stats = Arc::new(RunStats::default());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let update_queue = TaskQueue::spawn(
            "更新",
            self.config.update_workers(),
            Arc::new(UpdateStage::new(
                self.client.clone(),
                extractor.clone(),
                stats.clone(),
            )),
            events_tx.clone(),
            StageEvent::UpdateDrained,
        );
        let recognize_queue = TaskQueue::spawn(
            "OCR",
            self.config.ocr_workers(),
            Arc::new(RecognizeStage::new(
                self.pool.clone(),
                update_queue.clone(),
                stats.clone(),
            )),
            events_tx.clone(),
            StageEvent::RecognizeDrained,
        );
        let fetch_queue = TaskQueue::spawn(
            "下载",
            self.config.http_workers(),
            Arc::new(FetchStage::new(
                self.client.clone(),
                recognize_queue.clone(),
                stats.clone(),
            )),
            events_tx,
            StageEvent::FetchDrained,
        );

        // 派发第一页；派发不出任务的页会继续向后翻
        self.dispatch_pages(&mut state, &fetch_queue, &extractor, last_checked, &stats)
            .await?;
        self.settle(&mut state, &fetch_queue, &recognize_queue, &update_queue);

        while !state.is_terminal() {
            let Some(event) = events_rx.recv().await else {
                break;
            };
            debug!("收到事件 {:?}（当前阶段 {:?}）", event, state.phase());

            match event {
                StageEvent::FetchDrained | StageEvent::RecognizeDrained => {
                    // 在途的下载还会产出识别任务，识别侧排空必须等两个
                    // 队列同时空闲才算数；被忽略的事件会在后续任务完成
                    // 时重新出现
                    if fetch_queue.is_idle() && recognize_queue.is_idle() {
                        if !state.pagination_exhausted() {
                            self.dispatch_pages(
                                &mut state,
                                &fetch_queue,
                                &extractor,
                                last_checked,
                                &stats,
                            )
                            .await?;
                        }
                        self.settle(&mut state, &fetch_queue, &recognize_queue, &update_queue);
                    }
                }
                StageEvent::UpdateDrained => {
                    if state.recognition_drained() && update_queue.is_idle() {
                        state.mark_updates_drained();
                        info!("✓ 更新队列已排空");
                    }
                }
            }
        }

        info!("✅ 所有帖子处理完毕");

        let checkpoint = state.newest_id();
        if let Some(id) = checkpoint {
            info!("写入检查点: {}", id);
            self.store.write_checkpoint(id).await?;
        }

        Ok(build_report(&stats, state.total(), checkpoint))
    }

    /// 连续翻页，直到派发出至少一个任务或分页耗尽
    ///
    /// 一页帖子可能全部不符合提取条件（或者开头就命中检查点），这种页
    /// 不会产生任何队列活动，也就等不来下一个排空事件，必须就地继续翻。
    async fn dispatch_pages(
        &self,
        state: &mut RunState,
        fetch_queue: &TaskQueue<FetchTask>,
        extractor: &AnnotationExtractor,
        last_checked: Option<u64>,
        stats: &RunStats,
    ) -> Result<()> {
        while !state.pagination_exhausted() {
            let pushed = self
                .dispatch_page(state, fetch_queue, extractor, last_checked, stats)
                .await?;
            if pushed > 0 {
                break;
            }
        }
        Ok(())
    }

    /// 拉取并派发一页帖子，返回派发的任务数
    async fn dispatch_page(
        &self,
        state: &mut RunState,
        fetch_queue: &TaskQueue<FetchTask>,
        extractor: &AnnotationExtractor,
        last_checked: Option<u64>,
        stats: &RunStats,
    ) -> Result<usize> {
        let limit = self.config.page_limit.max(1);
        debug!("正在拉取帖子（offset={}，limit={}）...", state.offset(), limit);

        let page = self.client.list_posts(state.offset(), limit).await?;
        state.set_total(page.total);

        let empty_page = page.results.is_empty();
        let mut pushed = 0;

        for post in page.results {
            if last_checked == Some(post.id) {
                info!("🔖 已到达上次检查点（帖子 {}），不再排队更多帖子", post.id);
                state.mark_found_checkpoint();
                break;
            }

            state.observe_id(post.id);

            if extractor.allowance(&post).any {
                stats.discovered.fetch_add(1, Ordering::Relaxed);
                pushed += 1;
                fetch_queue.push(FetchTask { post });
            } else {
                debug!("[帖子 {}] 不满足提取条件，跳过", post.id);
                stats.skipped_ineligible.fetch_add(1, Ordering::Relaxed);
            }
        }

        state.advance_offset(limit);
        if state.offset() >= state.total() || empty_page {
            state.mark_end_of_list();
            info!("已到达帖子分页末尾");
        }

        Ok(pushed)
    }

    /// 分页结束后复核排空状态
    ///
    /// 下载工作者总是先向识别队列计数、再结束自己的任务，因此
    /// 「下载空闲 ∧ 识别空闲」成立后不会再有新的识别任务出现；
    /// 更新队列可能早已安静且不会再发事件，在同一步里一并判定。
    fn settle(
        &self,
        state: &mut RunState,
        fetch_queue: &TaskQueue<FetchTask>,
        recognize_queue: &TaskQueue<RecognizeTask>,
        update_queue: &TaskQueue<UpdateTask>,
    ) {
        if !state.pagination_exhausted() || !fetch_queue.is_idle() || !recognize_queue.is_idle() {
            return;
        }

        if !state.recognition_drained() {
            state.mark_recognition_drained();
            info!("✓ 识别队列已排空");
        }
        if update_queue.is_idle() && !state.updates_drained() {
            state.mark_updates_drained();
            info!("✓ 更新队列已排空");
        }
    }
}

/// 应用主结构
pub struct App {
    pipeline: Pipeline,
}

impl App {
    /// 初始化应用：构建客户端、引擎池和检查点存储
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let Some(path) = config.path.clone() else {
            return Err(AppError::config_invalid(
                "配置缺少来源文件路径，无法写回检查点",
            ));
        };

        let client = Arc::new(SzuruClient::new(&config));

        info!("正在初始化 {} 个 OCR 引擎...", config.ocr_workers());
        let engines: Vec<Box<dyn RecognitionEngine>> = (0..config.ocr_workers())
            .map(|_| {
                Box::new(TesseractEngine::new(config.ocr_language.clone()))
                    as Box<dyn RecognitionEngine>
            })
            .collect();
        let pool = Arc::new(OcrPool::new(engines));
        info!("✓ OCR 引擎就绪");

        let store = Arc::new(TomlCheckpointStore::new(path));

        Ok(Self {
            pipeline: Pipeline::new(config, client, pool, store),
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let report = self.pipeline.run().await?;
        print_final_stats(&report);
        Ok(())
    }
}
