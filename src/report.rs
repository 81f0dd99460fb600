use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};

use crate::models::{GuidanceRecord, RiskLevel, RiskLevelSummary};

pub fn cutoff(since_days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(since_days.max(1))
}

/// Count guidance by risk level, most severe level first.
pub fn summarize_by_level(history: &[GuidanceRecord]) -> Vec<RiskLevelSummary> {
    let mut map: BTreeMap<RiskLevel, (usize, f64)> = BTreeMap::new();

    for record in history {
        let entry = map.entry(record.risk_level).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.severity_score;
    }

    map.into_iter()
        .rev()
        .map(|(risk_level, (count, total_score))| RiskLevelSummary {
            risk_level,
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                total_score / count as f64
            },
        })
        .collect()
}

/// Highest score per user, highest first. Ties keep email order.
pub fn highest_risk_users(history: &[GuidanceRecord]) -> Vec<&GuidanceRecord> {
    let mut worst: BTreeMap<&str, &GuidanceRecord> = BTreeMap::new();
    for record in history {
        worst
            .entry(record.user_email.as_str())
            .and_modify(|current| {
                if record.severity_score > current.severity_score {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    let mut values: Vec<&GuidanceRecord> = worst.into_values().collect();
    values.sort_by(|a, b| b.severity_score.total_cmp(&a.severity_score));
    values
}

pub fn build_report(
    postcode: Option<&str>,
    cutoff: DateTime<Utc>,
    history: &[GuidanceRecord],
) -> String {
    let summaries = summarize_by_level(history);
    let users = highest_risk_users(history);

    let mut output = String::new();
    let scope_label = postcode.unwrap_or("all postcodes");

    let _ = writeln!(output, "# Asthma Risk Report");
    let _ = writeln!(
        output,
        "Generated for {} (guidance since {})",
        scope_label,
        cutoff.format("%Y-%m-%d")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Level Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No guidance recorded for this window.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} assessments (avg score {:.2})",
                summary.risk_level, summary.count, summary.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Users");

    if users.is_empty() {
        let _ = writeln!(output, "No users assessed in this window.");
    } else {
        for record in users.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) peak score {:.2} ({})",
                record.user_name,
                record.user_email,
                record.postcode,
                record.severity_score,
                record.risk_level
            );
        }
    }

    let mut recent = history.to_vec();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Guidance");

    if recent.is_empty() {
        let _ = writeln!(output, "No guidance recorded for this window.");
    } else {
        for record in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} on {}: {}",
                record.user_name,
                record.created_at.format("%Y-%m-%d %H:%M"),
                record.explanation
            );
        }
    }

    output
}
