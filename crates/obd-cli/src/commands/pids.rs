//! PIDs command - supported PID discovery

use anyhow::Result;

use super::Client;
use crate::output::{OutputContext, SupportedPidRow};

/// Walk the supported-PID bitmaps and name what the registry knows
pub async fn pids(client: &mut Client, ctx: &OutputContext) -> Result<()> {
    let supported = client.read_supported_pids().await?;

    let rows: Vec<SupportedPidRow> = supported
        .iter()
        .map(|&pid| SupportedPidRow {
            pid: format!("0x{:02X}", pid),
            name: client
                .registry()
                .by_code(pid)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}
