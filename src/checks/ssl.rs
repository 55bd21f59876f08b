use anyhow::{Context, Result, anyhow, bail};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::debug;

use crate::checks::classify;
use crate::checks::{CheckContext, Detection, Probe};
use crate::platform::{self, CommandRunOptions};

pub const OPENSSL_BIN: &str = "openssl";

const DEFAULT_TLS_PORT: u16 = 443;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSignal {
    pub host: String,
    /// `None` when the certificate could not be fetched or read.
    pub days_left: Option<i64>,
}

/// Certificate validity for a fixed list of hosts. A host that cannot be
/// reached is a classified observation, not a failure of the whole check.
/// Running out of the time budget is a failure of the whole check.
#[derive(Debug, Clone)]
pub struct CertificateExpiry {
    hosts: Vec<String>,
}

impl CertificateExpiry {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

impl Probe for CertificateExpiry {
    type Signal = CertificateSignal;

    fn service(&self) -> &str {
        "SSL"
    }

    fn label(&self) -> &str {
        "SSL"
    }

    fn probe(&self, ctx: &CheckContext) -> Result<Vec<CertificateSignal>> {
        let now = OffsetDateTime::now_utc();
        let mut out = Vec::with_capacity(self.hosts.len());
        for host in &self.hosts {
            if ctx.is_spent() {
                bail!(
                    "time budget of {:?} exhausted before checking {host}",
                    ctx.timeout
                );
            }
            let days_left = match fetch_not_after(ctx, host) {
                Ok(not_after) => Some(days_until(not_after, now)),
                Err(err) if platform::is_timeout(&err) => {
                    return Err(err.context(format!("checking {host}")));
                }
                Err(err) => {
                    debug!(host = %host, error = %err, "certificate expiry unavailable");
                    None
                }
            };
            out.push(CertificateSignal {
                host: host.clone(),
                days_left,
            });
        }
        Ok(out)
    }

    fn classify(&self, signal: &CertificateSignal) -> Option<Detection> {
        Some(classify::certificate_expiry(&signal.host, signal.days_left))
    }
}

/// Splits `host[:port]`; anything that does not end in a valid port is all host.
pub fn split_host_port(target: &str) -> (&str, u16) {
    let target = target.trim();
    if let Some((host, port)) = target.rsplit_once(':') {
        if !host.contains(':') {
            if let Ok(port) = port.parse::<u16>() {
                return (host, port);
            }
        }
    }
    (target, DEFAULT_TLS_PORT)
}

fn fetch_not_after(ctx: &CheckContext, target: &str) -> Result<OffsetDateTime> {
    let (host, port) = split_host_port(target);
    let connect = format!("{host}:{port}");

    let hello = platform::run_command(
        OPENSSL_BIN,
        &["s_client", "-connect", connect.as_str(), "-servername", host],
        ctx.command_timeout(),
    )?;
    if !hello.stdout.contains("-----BEGIN CERTIFICATE-----") {
        bail!("no certificate presented by {connect}: {}", hello.failure_reason());
    }

    let x509 = platform::run_command_with_options(
        OPENSSL_BIN,
        &["x509", "-noout", "-enddate"],
        ctx.command_timeout(),
        &CommandRunOptions {
            stdin: Some(hello.stdout.into_bytes()),
            ..Default::default()
        },
    )?;
    if !x509.success() {
        bail!("openssl x509: {}", x509.failure_reason());
    }

    let line = x509
        .stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("notAfter="))
        .ok_or_else(|| anyhow!("openssl x509 printed no notAfter"))?;
    parse_not_after(line)
}

/// Parses openssl's `Mar  1 12:00:00 2027 GMT`.
pub fn parse_not_after(s: &str) -> Result<OffsetDateTime> {
    let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let format = format_description!(
        "[month repr:short] [day padding:none] [hour]:[minute]:[second] [year] GMT"
    );
    let dt = PrimitiveDateTime::parse(&normalized, &format)
        .with_context(|| format!("unrecognised certificate date: {s}"))?;
    Ok(dt.assume_utc())
}

/// Whole days from `now` to `not_after`, rounded toward negative infinity so a
/// certificate that lapsed an hour ago is already one day expired.
pub fn days_until(not_after: OffsetDateTime, now: OffsetDateTime) -> i64 {
    (not_after - now).whole_seconds().div_euclid(SECONDS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;
    use time::macros::datetime;

    #[test]
    fn host_port_splitting() {
        assert_eq!(split_host_port("example.com"), ("example.com", 443));
        assert_eq!(split_host_port("example.com:8443"), ("example.com", 8443));
        assert_eq!(split_host_port(" example.com "), ("example.com", 443));
        assert_eq!(split_host_port("example.com:https"), ("example.com:https", 443));
        assert_eq!(split_host_port("::1"), ("::1", 443));
    }

    #[test]
    fn parses_openssl_dates() {
        let dt = parse_not_after("Mar  1 12:00:00 2027 GMT").expect("parse");
        assert_eq!(dt, datetime!(2027-03-01 12:00:00 UTC));

        let dt = parse_not_after("Dec 25 08:30:05 2030 GMT").expect("parse");
        assert_eq!(dt, datetime!(2030-12-25 08:30:05 UTC));

        assert!(parse_not_after("not a date").is_err());
    }

    #[test]
    fn day_arithmetic_floors() {
        let now = datetime!(2026-10-19 12:00:00 UTC);
        assert_eq!(days_until(datetime!(2026-11-03 12:00:00 UTC), now), 15);
        assert_eq!(days_until(datetime!(2026-11-03 11:59:59 UTC), now), 14);
        assert_eq!(days_until(datetime!(2026-10-19 11:00:00 UTC), now), -1);
        assert_eq!(days_until(datetime!(2026-10-18 12:00:00 UTC), now), -1);
        assert_eq!(days_until(datetime!(2026-10-18 11:59:59 UTC), now), -2);
    }

    #[test]
    fn spent_budget_fails_the_whole_check() {
        let probe = CertificateExpiry::new(vec!["a.example".to_string(), "b.example".to_string()]);
        let ctx = CheckContext {
            timeout: std::time::Duration::from_secs(1),
            deadline: Some(std::time::Instant::now()),
        };
        let err = probe.probe(&ctx).expect_err("no budget left");
        assert!(err.to_string().contains("a.example"), "err={err}");
        assert!(err.to_string().contains("exhausted"), "err={err}");
    }

    #[test]
    fn every_signal_becomes_a_finding() {
        let probe = CertificateExpiry::new(vec![]);
        let unknown = CertificateSignal {
            host: "down.example".to_string(),
            days_left: None,
        };
        let hit = probe.classify(&unknown).expect("always classified");
        assert_eq!(hit.severity, Severity::Medium);

        let healthy = CertificateSignal {
            host: "example.com".to_string(),
            days_left: Some(200),
        };
        assert_eq!(probe.classify(&healthy).map(|d| d.severity), Some(Severity::Low));
    }
}
