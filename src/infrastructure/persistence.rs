//! JSON summary persistence.
//!
//! Every completed run leaves one timestamped artifact under the orders
//! directory, e.g. `ITC_gtt_orders_20260830_101500.json`. Writes go
//! through a temp file and an atomic rename so a crash never leaves a
//! half-written summary behind.

use crate::domain::ports::SummarySink;
use crate::domain::types::{DeletionSummary, LadderSummary, SellSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

pub struct JsonSummarySink {
    orders_dir: PathBuf,
}

impl JsonSummarySink {
    pub fn new(orders_dir: PathBuf) -> Self {
        Self { orders_dir }
    }

    fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.orders_dir).with_context(|| {
            format!("Failed to create orders directory {}", self.orders_dir.display())
        })?;
        let path = self.orders_dir.join(file_name);
        let json = serde_json::to_string_pretty(value).context("Failed to serialize summary")?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &json)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to move summary into place at {}", path.display()))?;
        Ok(path)
    }
}

fn timestamped(symbol: &str, kind: &str) -> String {
    format!("{symbol}_{kind}_{}.json", Utc::now().format("%Y%m%d_%H%M%S"))
}

#[async_trait]
impl SummarySink for JsonSummarySink {
    async fn write_schedule_summary(&self, summary: &LadderSummary) -> Result<()> {
        let path = self.write_json(&timestamped(&summary.symbol, "gtt_orders"), summary)?;
        info!("Order summary saved to {}", path.display());
        Ok(())
    }

    async fn write_deletion_summary(&self, summary: &DeletionSummary) -> Result<()> {
        let path = self.write_json(&timestamped(&summary.symbol, "gtt_deletion"), summary)?;
        info!("Deletion summary saved to {}", path.display());
        Ok(())
    }

    async fn write_sell_summary(&self, summary: &SellSummary) -> Result<()> {
        let path = self.write_json(&timestamped(&summary.symbol, "gtt_sell"), summary)?;
        info!("Sell summary saved to {}", path.display());
        Ok(())
    }
}
