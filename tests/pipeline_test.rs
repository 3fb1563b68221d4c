//! 流水线端到端测试
//!
//! 用内存实现的目录客户端 / 识别引擎 / 检查点存储驱动完整的控制器，
//! 验证发现、排空与检查点行为。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use szuru_ocr::config::{
    CheckpointStore, Config, ExtractBehavior, ExtractOptionsRaw, ExtractSetting,
};
use szuru_ocr::error::{CheckpointError, DiscoveryError, EngineError, FetchError, UpdateError};
use szuru_ocr::models::{
    Bbox, Block, MicroTag, Note, PagedSearchResult, Post, PostPatch, RecognizeResult, Tag, Word,
};
use szuru_ocr::utils::logging;
use szuru_ocr::{CatalogClient, OcrPool, Pipeline, RecognitionEngine};

// ========== 内存实现 ==========

/// 内存目录：按 Vec 顺序分页返回帖子，记录所有下载和更新调用
struct FakeCatalog {
    posts: Vec<Post>,
    tags: Vec<Tag>,
    conflict: bool,
    fetched: Mutex<Vec<u64>>,
    updates: Mutex<Vec<(u64, u32, PostPatch)>>,
}

impl FakeCatalog {
    fn new(posts: Vec<Post>, tags: Vec<Tag>) -> Self {
        Self {
            posts,
            tags,
            conflict: false,
            fetched: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        }
    }

    fn with_conflict(mut self) -> Self {
        self.conflict = true;
        self
    }

    fn fetched_ids(&self) -> Vec<u64> {
        let mut ids = self.fetched.lock().unwrap().clone();
        ids.sort_unstable();
        ids
    }

    fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn list_posts(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<PagedSearchResult<Post>, DiscoveryError> {
        let results: Vec<Post> = self.posts.iter().skip(offset).take(limit).cloned().collect();
        Ok(PagedSearchResult {
            query: String::new(),
            offset,
            limit,
            total: self.posts.len(),
            results,
        })
    }

    async fn fetch_resource(&self, content_url: &str) -> Result<Vec<u8>, FetchError> {
        // content_url 形如 posts/<id>.png
        let id = content_url
            .trim_start_matches("posts/")
            .trim_end_matches(".png")
            .parse()
            .unwrap_or(0);
        self.fetched.lock().unwrap().push(id);
        Ok(vec![1, 2, 3])
    }

    async fn update_post(
        &self,
        post_id: u64,
        version: u32,
        patch: &PostPatch,
    ) -> Result<(), UpdateError> {
        self.updates
            .lock()
            .unwrap()
            .push((post_id, version, patch.clone()));
        if self.conflict {
            return Err(UpdateError::Conflict { post_id, version });
        }
        Ok(())
    }

    async fn list_all_tags(&self) -> Result<Vec<Tag>, DiscoveryError> {
        Ok(self.tags.clone())
    }
}

/// 内存引擎：返回固定结果，并记录并发识别的峰值
struct FakeEngine {
    result: RecognizeResult,
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl RecognitionEngine for FakeEngine {
    fn recognize(&mut self, _image: &[u8]) -> Result<RecognizeResult, EngineError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// 内存检查点存储
#[derive(Default)]
struct MemoryStore {
    value: Mutex<Option<u64>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    fn with(value: Option<u64>) -> Self {
        Self {
            value: Mutex::new(value),
            writes: AtomicUsize::new(0),
        }
    }

    fn current(&self) -> Option<u64> {
        *self.value.lock().unwrap()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn read_last_checkpoint(&self) -> Result<Option<u64>, CheckpointError> {
        Ok(*self.value.lock().unwrap())
    }

    async fn write_checkpoint(&self, id: u64) -> Result<(), CheckpointError> {
        *self.value.lock().unwrap() = Some(id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ========== 测试辅助 ==========

fn make_post(id: u64) -> Post {
    Post {
        id,
        version: 1,
        safety: "safe".to_string(),
        kind: "image".to_string(),
        mime_type: "image/png".to_string(),
        canvas_width: 200,
        canvas_height: 100,
        content_url: format!("posts/{}.png", id),
        thumbnail_url: String::new(),
        creation_time: String::new(),
        tags: Vec::new(),
        notes: Vec::new(),
    }
}

fn make_tag(name: &str) -> Tag {
    Tag {
        names: vec![name.to_string()],
        category: "default".to_string(),
        usages: 1,
        version: 1,
        implications: Vec::new(),
        suggestions: Vec::new(),
        description: None,
    }
}

fn make_result(text: &str, block_conf: f32, overall_conf: f32) -> RecognizeResult {
    RecognizeResult {
        blocks: vec![Block {
            text: text.to_string(),
            confidence: block_conf,
            words: text
                .split_whitespace()
                .map(|w| Word {
                    text: w.to_string(),
                })
                .collect(),
            polygon: None,
            bbox: Some(Bbox {
                x0: 0.0,
                y0: 0.0,
                x1: 100.0,
                y1: 50.0,
            }),
        }],
        confidence: overall_conf,
    }
}

fn good_result() -> RecognizeResult {
    make_result("hello world", 90.0, 90.0)
}

fn engine_pool(size: usize, result: RecognizeResult) -> (Arc<OcrPool>, Arc<AtomicUsize>) {
    let current = Arc::new(AtomicUsize::new(0));
    let max = Arc::new(AtomicUsize::new(0));
    let engines = (0..size)
        .map(|_| {
            Box::new(FakeEngine {
                result: result.clone(),
                current: current.clone(),
                max: max.clone(),
            }) as Box<dyn RecognitionEngine>
        })
        .collect();
    (Arc::new(OcrPool::new(engines)), max)
}

fn test_config(page_limit: usize, workers: usize) -> Config {
    let mut config = Config::default();
    config.page_limit = page_limit;
    config.workers.ocr = workers;
    config
}

// ========== 用例 ==========

#[tokio::test]
async fn test_zero_posts_reaches_done_without_work() {
    logging::init();

    let catalog = Arc::new(FakeCatalog::new(Vec::new(), Vec::new()));
    let store = Arc::new(MemoryStore::default());
    let (pool, _) = engine_pool(1, good_result());

    let pipeline = Pipeline::new(test_config(2, 2), catalog.clone(), pool, store.clone());
    let report = pipeline.run().await.expect("运行应当成功");

    assert_eq!(report.total_posts, 0);
    assert!(catalog.fetched_ids().is_empty());
    assert_eq!(catalog.update_count(), 0);
    // 目录为空：检查点保持原样
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(store.current(), None);
}

#[tokio::test]
async fn test_three_posts_flow_through_all_stages() {
    logging::init();

    // 3 个帖子、每页 2 个、池大小 1、各阶段并发 2
    let posts = vec![make_post(30), make_post(20), make_post(10)];
    let catalog = Arc::new(FakeCatalog::new(posts, vec![make_tag("hello")]));
    let store = Arc::new(MemoryStore::default());
    let (pool, max_passes) = engine_pool(1, good_result());

    let pipeline = Pipeline::new(test_config(2, 2), catalog.clone(), pool, store.clone());
    let report = pipeline.run().await.expect("运行应当成功");

    assert_eq!(report.total_posts, 3);
    assert_eq!(report.discovered, 3);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.recognized, 3);
    assert_eq!(report.updated, 3);
    assert_eq!(catalog.fetched_ids(), vec![10, 20, 30]);
    assert_eq!(catalog.update_count(), 3);

    // 检查点 = 发现过程中见到的最新帖子
    assert_eq!(report.checkpoint, Some(30));
    assert_eq!(store.current(), Some(30));
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);

    // 队列并发 2，但池大小 1 是并发识别的硬上限
    assert_eq!(max_passes.load(Ordering::SeqCst), 1);

    // 补丁里带上了匹配到的 Tag 和新注释
    let updates = catalog.updates.lock().unwrap();
    for (_, version, patch) in updates.iter() {
        assert_eq!(*version, 1);
        assert_eq!(patch.tags, Some(vec!["hello".to_string()]));
        assert_eq!(patch.notes.as_ref().map(Vec::len), Some(1));
    }
}

#[tokio::test]
async fn test_checkpoint_stops_pagination() {
    logging::init();

    let posts = vec![
        make_post(50),
        make_post(40),
        make_post(30),
        make_post(20),
        make_post(10),
    ];
    let catalog = Arc::new(FakeCatalog::new(posts, vec![make_tag("hello")]));
    let store = Arc::new(MemoryStore::with(Some(30)));
    let (pool, _) = engine_pool(1, good_result());

    let pipeline = Pipeline::new(test_config(2, 2), catalog.clone(), pool, store.clone());
    let report = pipeline.run().await.expect("运行应当成功");

    // 检查点在第 2 页开头命中：30 之后的帖子一个都不进入下载队列
    assert_eq!(report.discovered, 2);
    assert_eq!(catalog.fetched_ids(), vec![40, 50]);
    assert_eq!(store.current(), Some(50));
}

#[tokio::test]
async fn test_rerun_with_newest_checkpoint_is_idempotent() {
    logging::init();

    let posts = vec![make_post(30), make_post(20), make_post(10)];
    let catalog = Arc::new(FakeCatalog::new(posts, vec![make_tag("hello")]));
    let store = Arc::new(MemoryStore::with(Some(30)));
    let (pool, _) = engine_pool(1, good_result());

    let pipeline = Pipeline::new(test_config(2, 2), catalog.clone(), pool, store.clone());
    let report = pipeline.run().await.expect("运行应当成功");

    // 目录没变、检查点就是最新帖子：一个可处理帖子都发现不了
    assert_eq!(report.discovered, 0);
    assert!(catalog.fetched_ids().is_empty());
    assert_eq!(catalog.update_count(), 0);
    assert_eq!(store.current(), Some(30));
}

#[tokio::test]
async fn test_empty_delta_never_calls_update() {
    logging::init();

    // 块置信度 70 低于阈值 80：不产生任何注释或 Tag
    let posts = vec![make_post(30), make_post(20), make_post(10)];
    let catalog = Arc::new(FakeCatalog::new(posts, vec![make_tag("hello")]));
    let store = Arc::new(MemoryStore::default());
    let (pool, _) = engine_pool(2, make_result("hello world", 70.0, 70.0));

    let pipeline = Pipeline::new(test_config(2, 2), catalog.clone(), pool, store.clone());
    let report = pipeline.run().await.expect("运行应当成功");

    assert_eq!(report.recognized, 3);
    assert_eq!(report.update_skipped, 3);
    assert_eq!(report.updated, 0);
    // 空补丁永远不触碰远端
    assert_eq!(catalog.update_count(), 0);
    // 运行本身正常走到终态并写检查点
    assert_eq!(store.current(), Some(30));
}

#[tokio::test]
async fn test_version_conflict_is_dropped_without_retry() {
    logging::init();

    let posts = vec![make_post(30), make_post(20), make_post(10)];
    let catalog = Arc::new(FakeCatalog::new(posts, vec![make_tag("hello")]).with_conflict());
    let store = Arc::new(MemoryStore::default());
    let (pool, _) = engine_pool(1, good_result());

    let pipeline = Pipeline::new(test_config(2, 2), catalog.clone(), pool, store.clone());
    let report = pipeline.run().await.expect("运行应当成功");

    assert_eq!(report.conflicts, 3);
    assert_eq!(report.updated, 0);
    // 每个帖子只更新一次，冲突后没有重试
    assert_eq!(catalog.update_count(), 3);
    // 冲突只丢弃任务，不影响运行走到终态
    assert_eq!(store.current(), Some(30));
}

#[tokio::test]
async fn test_ineligible_pages_keep_pagination_alive() {
    logging::init();

    // 所有帖子都已带 Tag 和注释，两个类别都是 skip-if-present：
    // 每一页都派发不出任务，分页必须自己推进到末尾
    let posts: Vec<Post> = (1..=5)
        .map(|id| {
            let mut post = make_post(id);
            post.tags.push(MicroTag {
                names: vec!["existing".to_string()],
                category: "default".to_string(),
                usages: 1,
            });
            post.notes.push(Note {
                polygon: vec![[0.0, 0.0]],
                text: "old".to_string(),
            });
            post
        })
        .collect();

    let catalog = Arc::new(FakeCatalog::new(posts, vec![make_tag("hello")]));
    let store = Arc::new(MemoryStore::default());
    let (pool, max_passes) = engine_pool(1, good_result());

    let mut config = test_config(2, 2);
    config.extract.tags = ExtractSetting::Options(ExtractOptionsRaw {
        enable: Some(true),
        behavior: Some(ExtractBehavior::SkipIfPresent),
    });

    let pipeline = Pipeline::new(config, catalog.clone(), pool, store.clone());
    let report = pipeline.run().await.expect("运行应当成功");

    assert_eq!(report.discovered, 0);
    assert_eq!(report.skipped_ineligible, 5);
    assert!(catalog.fetched_ids().is_empty());
    assert_eq!(catalog.update_count(), 0);
    assert_eq!(max_passes.load(Ordering::SeqCst), 0);
    // 扫描照常完成，检查点照常写入
    assert_eq!(store.current(), Some(5));
}
