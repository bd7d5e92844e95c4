//! Read and list commands - named PIDs

use anyhow::Result;
use obd_can::{DecodeRule, PidRegistry};

use super::Client;
use crate::output::{OutputContext, RegistryRow, ValueRow};

/// Read named PIDs, live or from the freeze frame
pub async fn read(
    client: &mut Client,
    names: &[String],
    freeze_frame: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let mut rows = Vec::with_capacity(names.len());
    let mut failures = 0usize;

    for name in names {
        let unit = client
            .registry()
            .get(name)
            .map(|e| e.unit.clone())
            .unwrap_or_default();

        let value = match client.read_pid(name, freeze_frame).await {
            Ok(value) => value.to_string(),
            Err(e) => {
                failures += 1;
                ctx.warn(&format!("{}: {}", name, e));
                "-".to_string()
            }
        };

        rows.push(ValueRow {
            parameter: name.clone(),
            value,
            unit,
        });
    }

    ctx.print(&rows);
    if failures == names.len() && !names.is_empty() {
        anyhow::bail!("No PID could be read");
    }
    Ok(())
}

fn describe(rule: &DecodeRule) -> String {
    match *rule {
        DecodeRule::Raw => "raw".to_string(),
        DecodeRule::Linear {
            width,
            multiplier,
            divisor,
            offset,
        } => {
            let input = if width >= 2 { "AB" } else { "A" };
            let mut expr = input.to_string();
            if multiplier != 1.0 {
                expr = format!("{}*{}", expr, multiplier);
            }
            if divisor != 1.0 {
                expr = format!("{}/{}", expr, divisor);
            }
            if offset > 0.0 {
                expr = format!("{}+{}", expr, offset);
            } else if offset < 0.0 {
                expr = format!("{}-{}", expr, -offset);
            }
            expr
        }
        DecodeRule::VoltageTrim => "A/200, B*100/128-100".to_string(),
    }
}

/// List the PID registry (no bus traffic)
pub fn list(registry: &PidRegistry, ctx: &OutputContext) {
    let rows: Vec<RegistryRow> = registry
        .entries()
        .into_iter()
        .map(|e| RegistryRow {
            name: e.name.clone(),
            pid: format!("0x{:02X}", e.code),
            rule: describe(&e.rule),
            unit: e.unit.clone(),
        })
        .collect();

    ctx.print(&rows);
}
