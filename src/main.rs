use std::path::Path;

use anyhow::Result;
use szuru_ocr::utils::logging;
use szuru_ocr::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置（第一个参数为配置文件路径，默认 config.toml）
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let mut config = Config::load(Path::new(&config_path)).await?;
    config.apply_env();

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
