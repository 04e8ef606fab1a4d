use anyhow::Result;

use bodytrend_core::entries::{MAX_VERIFIED_PERCENT, VerifyMethod};
use bodytrend_core::service::{MetricsProvider, TrendService, VerifiedScan};

pub(crate) fn cmd_verify(
    service: &TrendService,
    provider: &dyn MetricsProvider,
    fat: f64,
    muscle: f64,
    method: &str,
    json: bool,
) -> Result<()> {
    let method: VerifyMethod = method.parse()?;
    let scan = service.verify_latest(provider, fat, muscle, method)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scan)?);
    } else {
        for line in verify_lines(&scan) {
            println!("{line}");
        }
    }
    Ok(())
}

fn verify_lines(scan: &VerifiedScan) -> Vec<String> {
    let mut lines = Vec::with_capacity(3);
    if scan.clamped {
        lines.push(format!(
            "Note: values were limited to 0-{MAX_VERIFIED_PERCENT:.0}%"
        ));
    }
    lines.push(format!(
        "Verified scan {} ({})",
        scan.entry_id,
        scan.values.verify_method.label()
    ));
    lines.push(format!(
        "  Fat {:.1}%  Muscle {:.1}%",
        scan.values.fat_percent, scan.values.skeletal_muscle_percent
    ));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use bodytrend_core::entries::Verification;

    #[test]
    fn lines_mention_clamping() {
        let scan = VerifiedScan {
            entry_id: 8,
            values: Verification::new(85.0, 30.0, VerifyMethod::Calipers).unwrap(),
            clamped: true,
        };
        let lines = verify_lines(&scan);
        assert_eq!(lines[0], "Note: values were limited to 0-80%");
        assert_eq!(lines[1], "Verified scan 8 (Calipers)");
        assert_eq!(lines[2], "  Fat 80.0%  Muscle 30.0%");
    }

    #[test]
    fn lines_without_clamping() {
        let scan = VerifiedScan {
            entry_id: 8,
            values: Verification::new(21.0, 39.5, VerifyMethod::Dexa).unwrap(),
            clamped: false,
        };
        let lines = verify_lines(&scan);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Verified scan 8 (DEXA)");
    }
}
