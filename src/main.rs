use anyhow::Context;

use courier::app;
use courier::settings::Settings;
use courier::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init("info")?;

    let settings = Settings::load().context("Failed to load settings")?;

    app::run(settings)
        .await
        .context("Failed to submit newsletter queue")
}
