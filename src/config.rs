use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{CheckpointError, ConfigError};

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 上次扫描到的帖子 ID（检查点），运行结束时写回
    pub last_checked_id: Option<u64>,
    /// 文本块置信度阈值
    pub confidence_threshold: f32,
    /// 每页拉取的帖子数量
    pub page_limit: usize,
    /// OCR 识别语言
    pub ocr_language: String,
    /// 各阶段并发数
    pub workers: WorkerConfig,
    /// 提取策略
    pub extract: ExtractConfig,
    /// Szurubooru 连接配置
    pub szuru: SzuruConfig,
    /// 配置文件自身的路径（加载时记录，检查点写回需要）
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            last_checked_id: None,
            confidence_threshold: 80.0,
            page_limit: 100,
            ocr_language: "eng".to_string(),
            workers: WorkerConfig::default(),
            extract: ExtractConfig::default(),
            szuru: SzuruConfig::default(),
            path: None,
        }
    }
}

impl Config {
    /// 从 TOML 文件加载配置
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::read_failed(path.display().to_string(), e))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::parse_failed(path.display().to_string(), e))?;
        config.path = Some(path.to_path_buf());

        Ok(config)
    }

    /// 用环境变量覆盖部分配置项
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("OCR_WORKERS") {
            self.workers.ocr = v;
        }
        if let Some(v) = env_parse("HTTP_WORKERS") {
            self.workers.http = Some(v);
        }
        if let Some(v) = env_parse("UPDATE_WORKERS") {
            self.workers.update = Some(v);
        }
        if let Some(v) = env_parse("CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = v;
        }
        if let Some(v) = env_parse("PAGE_LIMIT") {
            self.page_limit = v;
        }
        if let Ok(v) = std::env::var("OCR_LANGUAGE") {
            self.ocr_language = v;
        }
        if let Ok(v) = std::env::var("SZURU_USER") {
            self.szuru.user = v;
        }
        if let Ok(v) = std::env::var("SZURU_TOKEN") {
            self.szuru.token = v;
        }
        if let Ok(v) = std::env::var("SZURU_FRONT_URL") {
            self.szuru.endpoints.front = v;
        }
        if let Ok(v) = std::env::var("SZURU_BACK_URL") {
            self.szuru.endpoints.back = v;
        }
    }

    /// OCR 阶段并发数（也是引擎池大小）
    pub fn ocr_workers(&self) -> usize {
        self.workers.ocr.max(1)
    }

    /// 下载阶段并发数，未配置时与 OCR 并发数一致
    pub fn http_workers(&self) -> usize {
        self.workers.http.unwrap_or(self.workers.ocr).max(1)
    }

    /// 更新阶段并发数，未配置时与下载并发数一致
    pub fn update_workers(&self) -> usize {
        self.workers.update.unwrap_or_else(|| self.http_workers()).max(1)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// 各阶段并发数配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub ocr: usize,
    pub http: Option<usize>,
    pub update: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ocr: 3,
            http: None,
            update: None,
        }
    }
}

/// Szurubooru 连接配置
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SzuruConfig {
    pub user: String,
    pub token: String,
    pub endpoints: SzuruEndpoints,
    /// 附加在帖子搜索上的查询串（例如 "type:image"）
    pub query: Option<String>,
}

/// Szurubooru 前后端地址
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SzuruEndpoints {
    /// 前端地址，帖子资源从这里下载
    pub front: String,
    /// 后端 API 地址
    pub back: String,
}

// ========== 提取策略 ==========

/// 单个类别的提取配置，允许写成布尔或完整表
///
/// ```toml
/// [extract]
/// notes = true
/// tags = { enable = true, behavior = "add" }
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ExtractSetting {
    Enabled(bool),
    Options(ExtractOptionsRaw),
}

impl Default for ExtractSetting {
    fn default() -> Self {
        ExtractSetting::Enabled(true)
    }
}

/// 表形式的提取配置，缺省项按类别默认值补齐
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExtractOptionsRaw {
    pub enable: Option<bool>,
    pub behavior: Option<ExtractBehavior>,
}

/// 已有注释/Tag 时的合并行为
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractBehavior {
    /// 在已有集合上追加
    Add,
    /// 丢弃已有集合，重新生成
    Overwrite,
    /// 帖子已有该类别内容时整体跳过
    SkipIfPresent,
}

/// 解析完成的单类别提取选项
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractOptions {
    pub enable: bool,
    pub behavior: ExtractBehavior,
}

impl ExtractSetting {
    /// 把布尔/表两种写法解析为完整选项
    pub fn resolve(&self, defaults: ExtractOptions) -> ExtractOptions {
        match self {
            ExtractSetting::Enabled(enable) => ExtractOptions {
                enable: *enable,
                ..defaults
            },
            ExtractSetting::Options(raw) => ExtractOptions {
                enable: raw.enable.unwrap_or(defaults.enable),
                behavior: raw.behavior.unwrap_or(defaults.behavior),
            },
        }
    }
}

/// 两个类别的提取配置
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub tags: ExtractSetting,
    pub notes: ExtractSetting,
}

/// 本次运行生效的提取策略（运行期间不可变）
#[derive(Clone, Copy, Debug)]
pub struct ExtractPolicy {
    pub tags: ExtractOptions,
    pub notes: ExtractOptions,
}

impl ExtractConfig {
    /// 解析出本次运行的提取策略
    ///
    /// 默认值沿用历史行为：tags 追加，notes 仅在帖子还没有注释时生成。
    pub fn policy(&self) -> ExtractPolicy {
        ExtractPolicy {
            tags: self.tags.resolve(ExtractOptions {
                enable: true,
                behavior: ExtractBehavior::Add,
            }),
            notes: self.notes.resolve(ExtractOptions {
                enable: true,
                behavior: ExtractBehavior::SkipIfPresent,
            }),
        }
    }
}

// ========== 检查点存储 ==========

/// 检查点存储
///
/// `write_checkpoint` 只会在流水线到达终态后被调用一次。
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 读取上次运行写入的检查点
    async fn read_last_checkpoint(&self) -> Result<Option<u64>, CheckpointError>;
    /// 写入本次运行的检查点
    async fn write_checkpoint(&self, id: u64) -> Result<(), CheckpointError>;
}

/// 把检查点写回配置 TOML 文件的存储实现
///
/// 只改写 `last_checked_id` 一个键，文件中其余配置原样保留。
pub struct TomlCheckpointStore {
    path: PathBuf,
}

impl TomlCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_document(&self) -> Result<toml::Table, CheckpointError> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            CheckpointError::ReadFailed {
                path: self.path.display().to_string(),
                source: Box::new(e),
            }
        })?;

        toml::from_str(&content).map_err(|e| CheckpointError::ParseFailed {
            path: self.path.display().to_string(),
            source: Box::new(e),
        })
    }
}

#[async_trait]
impl CheckpointStore for TomlCheckpointStore {
    async fn read_last_checkpoint(&self) -> Result<Option<u64>, CheckpointError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let doc = self.read_document().await?;
        let id = doc
            .get("last_checked_id")
            .and_then(toml::Value::as_integer)
            .and_then(|v| u64::try_from(v).ok());
        Ok(id)
    }

    async fn write_checkpoint(&self, id: u64) -> Result<(), CheckpointError> {
        let mut doc = if self.path.exists() {
            self.read_document().await?
        } else {
            toml::Table::new()
        };

        doc.insert(
            "last_checked_id".to_string(),
            toml::Value::Integer(id as i64),
        );

        let content = toml::to_string(&doc).map_err(|e| CheckpointError::WriteFailed {
            path: self.path.display().to_string(),
            source: Box::new(e),
        })?;

        fs::write(&self.path, content)
            .await
            .map_err(|e| CheckpointError::WriteFailed {
                path: self.path.display().to_string(),
                source: Box::new(e),
            })
    }
}
