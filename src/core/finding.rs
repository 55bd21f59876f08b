use crate::core::Severity;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Resource placeholder for findings that concern a whole check.
pub const NO_RESOURCE: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "time", with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub severity: Severity,
    pub service: String,
    pub resource: String,
    pub message: String,
}

impl Finding {
    pub fn summary_line(&self) -> String {
        format!(
            "{} [{}] {} ({})",
            self.severity.icon(),
            self.service,
            self.message,
            self.resource
        )
    }
}
