//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责流程调度和完成判定，是整个系统的"指挥中心"。
//!
//! ### `pipeline` - 流水线控制器
//! - 管理应用生命周期（初始化、运行、收尾）
//! - 驱动分页发现并按提取条件筛选帖子
//! - 建立三级工作队列（下载 → 识别 → 更新）并消费它们的排空事件
//! - 维护单一所有者的运行状态（RunState）
//! - 终态写入检查点，输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::Pipeline (分页发现 + 完成判定)
//!     ↓
//! workflow (下载 / 识别 / 更新各阶段的单任务处理)
//!     ↓
//! services (提取策略、Tag 索引)
//!     ↓
//! clients (Szurubooru API)
//!     ↓
//! infrastructure (工作队列、引擎池)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一所有者**：RunState 只在控制器的事件处理路径上被修改
//! 2. **消息传递**：阶段只通过任务提交和排空事件与控制器交互
//! 3. **资源隔离**：只有编排层持有客户端、引擎池和检查点存储
//! 4. **无业务逻辑**：只做调度和统计，提取规则全部在 services

pub mod pipeline;

// 重新导出主要类型
pub use pipeline::{App, Phase, Pipeline, PipelineReport, RunState, StageEvent};
