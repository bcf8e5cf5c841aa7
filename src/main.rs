//! recibot - main entry point.

use anyhow::Result;
use recibot::logging::init_logging;
use recibot::BotConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = BotConfig::load()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("recibot v{}", env!("CARGO_PKG_VERSION"));

    recibot::run(config).await
}
