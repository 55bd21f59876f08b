use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_AWS_PROFILE: &str = "default";
pub const DEFAULT_AWS_REGION: &str = "ap-south-1";
pub const DEFAULT_LOG_PREFIX: &str = "shadoweye/logs/";
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    pub aws: AwsConfig,
    pub gcp: GcpConfig,
    pub ssl: SslConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct AwsConfig {
    pub profile: String,
    pub region: String,
    pub log_bucket: String,
    pub log_prefix: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GcpConfig {
    pub project: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SslConfig {
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub to: Vec<String>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            aws: AwsConfig {
                profile: DEFAULT_AWS_PROFILE.to_string(),
                region: DEFAULT_AWS_REGION.to_string(),
                log_bucket: String::new(),
                log_prefix: DEFAULT_LOG_PREFIX.to_string(),
            },
            gcp: GcpConfig::default(),
            ssl: SslConfig::default(),
            email: EmailConfig {
                enabled: false,
                smtp_host: String::new(),
                smtp_port: DEFAULT_SMTP_PORT,
                username: String::new(),
                password: String::new(),
                to: Vec::new(),
            },
        }
    }
}

impl EffectiveConfig {
    /// Copy safe to print: the SMTP password is replaced when set.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        if !out.email.password.is_empty() {
            out.email.password = "********".to_string();
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    aws: Option<RawAwsConfig>,
    gcp: Option<RawGcpConfig>,
    ssl: Option<RawSslConfig>,
    email: Option<RawEmailConfig>,
}

#[derive(Debug, Deserialize)]
struct RawAwsConfig {
    profile: Option<String>,
    region: Option<String>,
    log_bucket: Option<String>,
    log_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGcpConfig {
    project: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSslConfig {
    hosts: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawEmailConfig {
    enabled: Option<bool>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    to: Option<Vec<String>>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Builds the effective configuration. The file is mandatory: a missing or
/// malformed file is an error the caller should treat as fatal.
pub fn load(config_path: Option<&Path>) -> Result<EffectiveConfig> {
    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(default_config_path);

    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut cfg = from_toml_str(&s)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    cfg.config_path = Some(path.display().to_string());

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

/// Parses a config document on top of the defaults, without consulting
/// `SHADOWEYE_*` overrides.
pub fn from_toml_str(s: &str) -> Result<EffectiveConfig> {
    let raw: RawConfig = toml::from_str(s).context("invalid TOML")?;
    let mut cfg = EffectiveConfig::default();
    apply_aws_env_defaults(&mut cfg);
    apply_raw_config(&mut cfg, raw);
    Ok(cfg)
}

fn apply_aws_env_defaults(cfg: &mut EffectiveConfig) {
    if let Some(profile) = non_empty_env("AWS_PROFILE") {
        cfg.aws.profile = profile;
    }
    if let Some(region) = non_empty_env("AWS_REGION") {
        cfg.aws.region = region;
    }
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(aws) = raw.aws {
        if let Some(profile) = aws.profile {
            cfg.aws.profile = profile;
        }
        if let Some(region) = aws.region {
            cfg.aws.region = region;
        }
        if let Some(log_bucket) = aws.log_bucket {
            cfg.aws.log_bucket = log_bucket;
        }
        if let Some(log_prefix) = aws.log_prefix {
            cfg.aws.log_prefix = log_prefix;
        }
    }

    if let Some(gcp) = raw.gcp {
        if let Some(project) = gcp.project {
            cfg.gcp.project = project;
        }
    }

    if let Some(ssl) = raw.ssl {
        if let Some(hosts) = ssl.hosts {
            cfg.ssl.hosts = clean_list(hosts);
        }
    }

    if let Some(email) = raw.email {
        if let Some(enabled) = email.enabled {
            cfg.email.enabled = enabled;
        }
        if let Some(smtp_host) = email.smtp_host {
            cfg.email.smtp_host = smtp_host;
        }
        if let Some(smtp_port) = email.smtp_port {
            cfg.email.smtp_port = smtp_port;
        }
        if let Some(username) = email.username {
            cfg.email.username = username;
        }
        if let Some(password) = email.password {
            cfg.email.password = password;
        }
        if let Some(to) = email.to {
            cfg.email.to = clean_list(to);
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("SHADOWEYE_SSL_HOSTS") {
        let hosts = clean_list(v.split(',').map(ToOwned::to_owned));
        if !hosts.is_empty() {
            cfg.ssl.hosts = hosts;
        }
    }
    if let Some(v) = non_empty_env("SHADOWEYE_AWS_LOG_BUCKET") {
        cfg.aws.log_bucket = v;
    }
    if let Ok(v) = std::env::var("SHADOWEYE_EMAIL_ENABLED") {
        cfg.email.enabled = parse_bool(&v).with_context(|| "SHADOWEYE_EMAIL_ENABLED")?;
    }
    if let Ok(v) = std::env::var("SHADOWEYE_EMAIL_PASSWORD") {
        cfg.email.password = v;
    }

    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_list(items: impl IntoIterator<Item = String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "invalid boolean: {s} (expected true|false|1|0|yes|no|on|off)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_document_overrides_defaults() {
        let cfg = from_toml_str(
            r#"
[aws]
profile = "audit"
region = "eu-west-1"
log_bucket = "sec-logs"
log_prefix = "runs/"

[gcp]
project = "prod-123"

[ssl]
hosts = ["example.com", " api.example.com:8443 ", ""]

[email]
enabled = true
smtp_host = "smtp.example.com"
smtp_port = 465
username = "bot"
password = "s3cret"
to = ["sec@example.com"]
"#,
        )
        .expect("parse");

        assert_eq!(cfg.aws.profile, "audit");
        assert_eq!(cfg.aws.region, "eu-west-1");
        assert_eq!(cfg.aws.log_bucket, "sec-logs");
        assert_eq!(cfg.aws.log_prefix, "runs/");
        assert_eq!(cfg.gcp.project, "prod-123");
        assert_eq!(cfg.ssl.hosts, vec!["example.com", "api.example.com:8443"]);
        assert!(cfg.email.enabled);
        assert_eq!(cfg.email.smtp_port, 465);
        assert_eq!(cfg.email.to, vec!["sec@example.com"]);
    }

    #[test]
    fn sparse_document_keeps_defaults() {
        let cfg = from_toml_str("[ssl]\nhosts = []\n").expect("parse");
        assert_eq!(cfg.aws.log_prefix, DEFAULT_LOG_PREFIX);
        assert_eq!(cfg.email.smtp_port, DEFAULT_SMTP_PORT);
        assert!(!cfg.email.enabled);
        assert!(cfg.ssl.hosts.is_empty());
        assert!(cfg.aws.log_bucket.is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(from_toml_str("[aws\nprofile = ").is_err());
        assert!(from_toml_str("[email]\nsmtp_port = \"x\"\n").is_err());
    }

    #[test]
    fn redaction_hides_password_only() {
        let mut cfg = EffectiveConfig::default();
        cfg.email.password = "hunter2".to_string();
        cfg.email.username = "bot".to_string();
        let shown = cfg.redacted();
        assert_eq!(shown.email.password, "********");
        assert_eq!(shown.email.username, "bot");

        let empty = EffectiveConfig::default().redacted();
        assert!(empty.email.password.is_empty());
    }

    #[test]
    fn bool_spellings() {
        for v in ["1", "true", "YES", " on "] {
            assert!(parse_bool(v).expect("bool"));
        }
        for v in ["0", "false", "No", "off"] {
            assert!(!parse_bool(v).expect("bool"));
        }
        assert!(parse_bool("maybe").is_err());
    }
}
