//! DTCs command - stored trouble codes

use anyhow::{Context, Result};

use super::Client;
use crate::output::{DtcRow, OutputContext};

fn system(category: char) -> &'static str {
    match category {
        'P' => "Powertrain",
        'C' => "Chassis",
        'B' => "Body",
        _ => "Network",
    }
}

/// List stored trouble codes
pub async fn dtcs(client: &mut Client, ctx: &OutputContext) -> Result<()> {
    let codes = client.read_dtcs().await.context("Failed to read DTCs")?;

    if codes.is_empty() {
        ctx.info("No trouble codes stored");
        return Ok(());
    }

    let rows: Vec<DtcRow> = codes
        .iter()
        .map(|code| {
            let [a, b] = code.bytes();
            DtcRow {
                code: code.to_string(),
                system: system(code.category()).to_string(),
                raw: format!("{:02X} {:02X}", a, b),
            }
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_names() {
        assert_eq!(system('P'), "Powertrain");
        assert_eq!(system('U'), "Network");
    }
}
