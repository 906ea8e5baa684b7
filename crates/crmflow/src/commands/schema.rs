use anyhow::Result;
use crmflow_core::load::ensure_schema;

use super::connect_analytics;

pub async fn handle_init_schema() -> Result<()> {
    let pool = connect_analytics().await?;
    ensure_schema(&pool).await?;
    println!("Analytical schema is in place.");
    Ok(())
}
