use std::sync::Arc;

use sqlx::PgPool;

use crate::client::EmailClient;
use crate::engine::DeliveryEngine;
use crate::repo::PgStore;
use crate::settings::Settings;
use crate::template::TemplateStore;

/// Assemble the delivery engine from settings and run one queue pass.
///
/// This is the whole job of the binary: an external scheduler (cron or
/// similar) invokes it periodically and every due submission gets
/// delivered.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let pool = PgPool::connect_with(settings.database.with_db()).await?;

    let store = Arc::new(PgStore::new(pool));

    let transport = Arc::new(EmailClient::new(
        settings.email.api_timeout(),
        settings.email.api_base_url(),
        settings.email.api_auth_token(),
    )?);

    let engine = DeliveryEngine::new(
        store.clone(),
        store.clone(),
        store,
        transport,
        TemplateStore::builtin(),
        settings.site.site(),
        settings.delivery.delivery_config(),
    );

    engine.submit_queue().await?;
    Ok(())
}
