//! CVSS v3 vector adjustment for narrowed vulnerabilities.
//!
//! Downgrading does not touch the base metrics; it forces the temporal
//! metrics Exploit Code Maturity to Unproven and Report Confidence to
//! Unknown, which is how "the patched code is never called" reads in CVSS
//! terms.

use crate::error::Error;

/// Canonical metric ordering for CVSS v3.x vectors, base through
/// environmental.
const METRIC_ORDER: &[&str] = &[
    "AV", "AC", "PR", "UI", "S", "C", "I", "A", // base
    "E", "RL", "RC", // temporal
    "CR", "IR", "AR", "MAV", "MAC", "MPR", "MUI", "MS", "MC", "MI", "MA", // environmental
];

/// Rewrites a CVSS v3.x vector with `E:U` and `RC:U`, preserving every other
/// metric and emitting metrics in canonical order.
pub fn drop_severity(vector: &str) -> Result<String, Error> {
    let mut parts = vector.split('/');
    let prefix = parts.next().unwrap_or("");
    if !prefix.starts_with("CVSS:3") {
        return Err(Error::InvalidCvssVector(vector.to_owned()));
    }

    let mut metrics: Vec<(String, String)> = Vec::new();
    for part in parts {
        let Some((metric, value)) = part.split_once(':') else {
            return Err(Error::InvalidCvssVector(vector.to_owned()));
        };
        if metric.is_empty() || value.is_empty() {
            return Err(Error::InvalidCvssVector(vector.to_owned()));
        }
        upsert(&mut metrics, metric, value);
    }

    upsert(&mut metrics, "E", "U");
    upsert(&mut metrics, "RC", "U");

    let mut out = String::from(prefix);
    for metric in METRIC_ORDER {
        if let Some((_, value)) = metrics.iter().find(|(m, _)| m == metric) {
            out.push('/');
            out.push_str(metric);
            out.push(':');
            out.push_str(value);
        }
    }
    // Metrics outside the canonical table keep their original order.
    for (metric, value) in &metrics {
        if !METRIC_ORDER.contains(&metric.as_str()) {
            out.push('/');
            out.push_str(metric);
            out.push(':');
            out.push_str(value);
        }
    }
    Ok(out)
}

fn upsert(metrics: &mut Vec<(String, String)>, metric: &str, value: &str) {
    if let Some(existing) = metrics.iter_mut().find(|(m, _)| m == metric) {
        existing.1 = value.to_owned();
    } else {
        metrics.push((metric.to_owned(), value.to_owned()));
    }
}
