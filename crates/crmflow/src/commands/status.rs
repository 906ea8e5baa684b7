use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};
use crmflow_core::load::read_metadata;

use super::connect_analytics;

pub async fn handle_status() -> Result<()> {
    let pool = connect_analytics().await?;
    let rows = read_metadata(&pool).await?;

    if rows.is_empty() {
        println!("No ETL runs recorded yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "table", "status", "last updated", "processed", "inserted", "updated", "deleted",
        "watermark", "error",
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.table_name),
            Cell::new(&row.status),
            Cell::new(row.last_updated.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(row.records_processed),
            Cell::new(row.records_inserted),
            Cell::new(row.records_updated),
            Cell::new(row.records_deleted),
            Cell::new(
                row.watermark
                    .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".into()),
            ),
            Cell::new(row.error_message.as_deref().unwrap_or("-")),
        ]);
    }

    println!("{table}");
    Ok(())
}
