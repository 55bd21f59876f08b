mod finding;
mod ledger;
mod severity;

pub use finding::{Finding, NO_RESOURCE};
pub use ledger::{Ledger, NO_ISSUES_LINE, SeverityCounts};
pub use severity::{Severity, SeverityParseError};
