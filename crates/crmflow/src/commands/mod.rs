pub mod run;
pub mod schema;
pub mod status;

use anyhow::{Context, Result};
use crmflow_core::db::{self, DbPool};

pub(crate) async fn connect_source() -> Result<DbPool> {
    let url = std::env::var("CRM_DATABASE_URL").context("CRM_DATABASE_URL is not set")?;
    Ok(db::connect(&url).await?)
}

pub(crate) async fn connect_analytics() -> Result<DbPool> {
    let url =
        std::env::var("ANALYTICS_DATABASE_URL").context("ANALYTICS_DATABASE_URL is not set")?;
    Ok(db::connect(&url).await?)
}
