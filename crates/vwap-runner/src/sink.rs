//! Standard-output sink: one `"<product>: <vwap>"` line per update.

use std::io::Write;

use anyhow::Result;
use async_trait::async_trait;
use vwap_feed::VwapSink;

pub struct StdoutSink;

#[async_trait]
impl VwapSink for StdoutSink {
    async fn emit(&self, product_id: &str, vwap: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", format_line(product_id, vwap))?;
        Ok(())
    }
}

fn format_line(product_id: &str, vwap: &str) -> String {
    format!("{product_id}: {vwap}")
}
