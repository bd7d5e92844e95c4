//! VIN command

use anyhow::{Context, Result};

use super::Client;
use crate::output::OutputContext;

/// Read the vehicle identification number
pub async fn vin(client: &mut Client, ctx: &OutputContext) -> Result<()> {
    let vin = client.read_vin().await.context("Failed to read VIN")?;

    let text = vin.to_string();
    let raw = vin.as_bytes().iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ");
    if vin.as_str().is_none() {
        ctx.warn("VIN contains non-printable bytes");
    }
    ctx.print_kv(&[("VIN", text), ("Raw", raw)]);
    Ok(())
}
