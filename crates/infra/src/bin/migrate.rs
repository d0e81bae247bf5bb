//! Apply the embedded schema migrations to the configured database.

use anyhow::Context;

use stockflow_infra::AppConfig;
use stockflow_infra::db::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    stockflow_observability::init_with(config.log_format);

    let store = PgStore::connect(
        &config.database.url,
        config.database.min_connections,
        config.database.max_connections,
    )
    .await
    .context("connecting to the database")?;

    store.migrate().await.context("running migrations")?;
    tracing::info!("migrations applied");
    Ok(())
}
