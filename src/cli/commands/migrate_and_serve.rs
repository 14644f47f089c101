use anyhow::Result;
use tracing::info;

use super::{init_database, serve};
use crate::config::Settings;

pub async fn migrate_and_serve(settings: Settings) -> Result<()> {
    info!("Applying database migrations and starting server");
    init_database(&settings.database_url).await?;
    serve(settings).await
}
