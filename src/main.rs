use anyhow::Context;

use chat_relay::inference::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment and defaults still apply.
    dotenvy::dotenv().ok();

    let config = RelayConfig::load().context("failed to load configuration")?;
    chat_relay::init_tracing(&config)?;

    chat_relay::serve(config).await
}
