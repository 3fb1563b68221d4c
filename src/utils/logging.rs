/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::PipelineReport;

/// 初始化日志
///
/// 默认 info 级别，可通过 RUST_LOG 环境变量调整；重复调用是安全的
/// （测试里每个用例都会调用一次）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - Szurubooru OCR 注释流水线");
    info!(
        "📊 并发数: 下载 {} / OCR {} / 更新 {}",
        config.http_workers(),
        config.ocr_workers(),
        config.update_workers()
    );
    info!("📋 置信度阈值: {}", config.confidence_threshold);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(report: &PipelineReport) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!(
        "📄 发现: {}/{} (跳过 {})",
        report.discovered, report.total_posts, report.skipped_ineligible
    );
    info!("📥 下载: 成功 {} / 失败 {}", report.fetched, report.fetch_failed);
    info!(
        "🔍 识别: 成功 {} / 失败 {}",
        report.recognized, report.recognize_failed
    );
    info!(
        "✅ 更新: 成功 {} / 无变化 {} / 冲突 {} / 失败 {}",
        report.updated, report.update_skipped, report.conflicts, report.update_failed
    );
    match report.checkpoint {
        Some(id) => info!("🔖 检查点: {}", id),
        None => info!("🔖 检查点未变化"),
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
