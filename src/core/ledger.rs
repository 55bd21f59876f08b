use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

use crate::core::{Finding, Severity, SeverityParseError};

pub const NO_ISSUES_LINE: &str = "✅ No issues found";

/// Append-only, insertion-ordered record of everything a run found.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    findings: Vec<Finding>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub info: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl fmt::Display for SeverityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "critical={} high={} medium={} low={} info={}",
            self.critical, self.high, self.medium, self.low, self.info
        )
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        severity: Severity,
        service: impl Into<String>,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.findings.push(Finding {
            timestamp: OffsetDateTime::now_utc(),
            severity,
            service: service.into(),
            resource: resource.into(),
            message: message.into(),
        });
    }

    /// Like [`Ledger::add`], for callers holding a textual severity. Nothing is
    /// appended when the level is not one of the five known values.
    pub fn add_raw(
        &mut self,
        severity: &str,
        service: impl Into<String>,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), SeverityParseError> {
        let severity = severity.parse::<Severity>()?;
        self.add(severity, service, resource, message);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter()
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for f in &self.findings {
            let slot = match f.severity {
                Severity::Info => &mut counts.info,
                Severity::Low => &mut counts.low,
                Severity::Medium => &mut counts.medium,
                Severity::High => &mut counts.high,
                Severity::Critical => &mut counts.critical,
            };
            *slot += 1;
        }
        counts
    }

    pub fn render_summary(&self) -> String {
        if self.findings.is_empty() {
            return NO_ISSUES_LINE.to_string();
        }
        self.findings
            .iter()
            .map(Finding::summary_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// One JSON object per finding, in append order.
    pub fn render_structured(&self) -> serde_json::Result<Vec<String>> {
        self.findings.iter().map(serde_json::to_string).collect()
    }

    pub fn render_ndjson(&self) -> serde_json::Result<String> {
        Ok(self.render_structured()?.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.add(Severity::High, "AWS:S3", "b1", "S3 bucket 'b1' appears PUBLIC");
        ledger.add(Severity::Medium, "AWS:IAM", "-", "IAM check error: denied");
        ledger.add(Severity::Low, "SSL", "example.com", "SSL certificate OK, 90 days left");
        ledger
    }

    #[test]
    fn empty_ledger_renders_single_no_issues_line() {
        let ledger = Ledger::new();
        assert_eq!(ledger.render_summary(), NO_ISSUES_LINE);
        assert_eq!(ledger.render_summary().lines().count(), 1);
        assert!(ledger.render_structured().expect("render").is_empty());
    }

    #[test]
    fn summary_has_one_line_per_finding_in_append_order() {
        let ledger = sample();
        let summary = ledger.render_summary();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), ledger.len());
        assert_eq!(lines[0], "❗ [AWS:S3] S3 bucket 'b1' appears PUBLIC (b1)");
        assert_eq!(lines[1], "⚠️ [AWS:IAM] IAM check error: denied (-)");
        assert_eq!(
            lines[2],
            "✅ [SSL] SSL certificate OK, 90 days left (example.com)"
        );
        assert!(!summary.contains(NO_ISSUES_LINE));
    }

    #[test]
    fn add_raw_normalizes_and_validates() {
        let mut ledger = Ledger::new();
        ledger
            .add_raw("critical", "SSL", "h", "expired")
            .expect("known level");
        assert_eq!(ledger.findings()[0].severity, Severity::Critical);

        assert!(ledger.add_raw("urgent", "SSL", "h", "x").is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn structured_records_carry_all_fields() {
        let ledger = sample();
        let records = ledger.render_structured().expect("render");
        assert_eq!(records.len(), 3);

        let v: serde_json::Value = serde_json::from_str(&records[0]).expect("parse");
        assert_eq!(v["severity"], "HIGH");
        assert_eq!(v["service"], "AWS:S3");
        assert_eq!(v["resource"], "b1");
        assert_eq!(v["message"], "S3 bucket 'b1' appears PUBLIC");
        let time = v["time"].as_str().expect("time string");
        assert!(time.ends_with('Z'), "time={time}");

        for record in &records {
            assert!(!record.contains('\n'));
        }
    }

    #[test]
    fn rendering_is_idempotent() {
        let ledger = sample();
        assert_eq!(ledger.render_summary(), ledger.render_summary());
        assert_eq!(
            ledger.render_ndjson().expect("render"),
            ledger.render_ndjson().expect("render")
        );
    }

    #[test]
    fn counts_tally_by_severity() {
        let counts = sample().counts();
        assert_eq!(counts.high, 1);
        assert_eq!(counts.medium, 1);
        assert_eq!(counts.low, 1);
        assert_eq!(counts.critical, 0);
        assert_eq!(counts.info, 0);
        assert_eq!(counts.to_string(), "critical=0 high=1 medium=1 low=1 info=0");
    }
}
