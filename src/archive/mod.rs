//! Uploads the structured form of a run to the configured S3 log bucket.

use std::time::Duration;

use anyhow::{Result, bail};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::info;

use crate::checks::aws::{self, AWS_BIN};
use crate::config::AwsConfig;
use crate::platform::{self, CommandRunOptions};

/// `<prefix>incident_2026_10_19T120000Z.ndjson`
pub fn object_key(prefix: &str, at: OffsetDateTime) -> String {
    let format = format_description!("[year]_[month]_[day]T[hour][minute][second]Z");
    let stamp = at
        .format(&format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    format!("{prefix}incident_{stamp}.ndjson")
}

/// Returns the `s3://` URI of the stored object, or `None` when no log bucket
/// is configured.
pub fn upload_ndjson(cfg: &AwsConfig, payload: &str, timeout: Duration) -> Result<Option<String>> {
    let bucket = cfg.log_bucket.trim();
    if bucket.is_empty() {
        return Ok(None);
    }

    let key = object_key(&cfg.log_prefix, OffsetDateTime::now_utc());
    let uri = format!("s3://{bucket}/{key}");

    let out = platform::run_command_with_options(
        AWS_BIN,
        &[
            "s3",
            "cp",
            "-",
            uri.as_str(),
            "--content-type",
            "application/x-ndjson",
            "--profile",
            cfg.profile.as_str(),
            "--region",
            cfg.region.as_str(),
        ],
        timeout,
        &CommandRunOptions {
            stdin: Some(payload.as_bytes().to_vec()),
            ..aws::aws_options()
        },
    )?;
    if !out.success() {
        bail!("aws s3 cp: {}", out.failure_reason());
    }

    info!(uri = %uri, bytes = payload.len(), "archived findings");
    Ok(Some(uri))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectiveConfig;
    use time::macros::datetime;

    #[test]
    fn key_embeds_utc_timestamp() {
        let at = datetime!(2026-10-19 07:05:09 UTC);
        assert_eq!(
            object_key("shadoweye/logs/", at),
            "shadoweye/logs/incident_2026_10_19T070509Z.ndjson"
        );
        assert_eq!(object_key("", at), "incident_2026_10_19T070509Z.ndjson");
    }

    #[test]
    fn empty_bucket_disables_upload() {
        let cfg = EffectiveConfig::default();
        let uri = upload_ndjson(&cfg.aws, "{}", Duration::from_secs(1)).expect("no-op");
        assert_eq!(uri, None);
    }
}
