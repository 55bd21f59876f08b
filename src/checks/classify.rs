//! Signal → severity policies shared by the check domains.

use crate::checks::Detection;
use crate::core::Severity;

/// Certificates expiring within this many days (inclusive) are HIGH.
pub const EXPIRY_WARNING_DAYS: i64 = 15;

/// A binary exposure observation: a bucket, instance or identity that either
/// has the risky property or does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exposure {
    pub resource: String,
    pub exposed: bool,
}

impl Exposure {
    pub fn new(resource: impl Into<String>, exposed: bool) -> Self {
        Self {
            resource: resource.into(),
            exposed,
        }
    }
}

/// Exposed → HIGH with `message`; not exposed → no finding at all.
pub fn exposure(signal: &Exposure, message: impl FnOnce(&str) -> String) -> Option<Detection> {
    if !signal.exposed {
        return None;
    }
    Some(Detection::new(
        Severity::High,
        signal.resource.clone(),
        message(&signal.resource),
    ))
}

/// `days_left` is `None` when the expiry could not be observed.
pub fn certificate_expiry(host: &str, days_left: Option<i64>) -> Detection {
    let (severity, message) = match days_left {
        None => (Severity::Medium, "Could not check SSL certificate".to_string()),
        Some(days) if days < 0 => (
            Severity::Critical,
            format!("SSL certificate EXPIRED {} days ago", days.unsigned_abs()),
        ),
        Some(days) if days <= EXPIRY_WARNING_DAYS => (
            Severity::High,
            format!("SSL certificate expires in {days} days"),
        ),
        Some(days) => (
            Severity::Low,
            format!("SSL certificate OK, {days} days left"),
        ),
    };
    Detection::new(severity, host, message)
}
