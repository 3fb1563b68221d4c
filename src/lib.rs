//! # Szuru OCR
//!
//! 一个为 Szurubooru 帖子自动提取 OCR 注释与 Tag 的流水线工具
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `TaskQueue` - 有界工作队列，向控制器上报排空事件
//! - `OcrPool` - 固定大小的识别引擎池，唯一的引擎 owner
//! - `TesseractEngine` - tesseract 命令行适配器
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个帖子
//! - `AnnotationExtractor` - 提取策略判定与补丁组装能力
//! - `TagIndex` - 只读的 Tag 名称索引
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个帖子"在各阶段的完整处理动作
//! - `FetchStage` / `RecognizeStage` / `UpdateStage` - 三个阶段工作者
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 流水线控制器，驱动分页发现、
//!   消费排空事件、判定三项完成条件并写入检查点
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{CatalogClient, SzuruClient};
pub use config::{CheckpointStore, Config, ExtractBehavior, TomlCheckpointStore};
pub use error::{AppError, Result};
pub use infrastructure::{OcrPool, RecognitionEngine, TaskQueue, TesseractEngine};
pub use models::{Post, PostPatch, RecognizeResult};
pub use orchestrator::{App, Pipeline, PipelineReport};
pub use services::{AnnotationExtractor, TagIndex};
pub use workflow::{FetchTask, RecognizeTask, UpdateTask};
