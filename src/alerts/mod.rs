//! Mails the run summary through `curl`'s SMTP support.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;
use tracing::info;

use crate::config::EmailConfig;
use crate::platform::{self, CommandRunOptions};

pub const CURL_BIN: &str = "curl";
pub const SUBJECT: &str = "[ShadowEye] Cloud Misconfig Report";

const SMTPS_PORT: u16 = 465;

pub fn compose_message(from: &str, to: &[String], subject: &str, body: &str, date: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("From: {from}\r\n"));
    out.push_str(&format!("To: {}\r\n", to.join(", ")));
    out.push_str(&format!("Subject: {subject}\r\n"));
    out.push_str(&format!("Date: {date}\r\n"));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    out.push_str("Content-Transfer-Encoding: 8bit\r\n");
    out.push_str("\r\n");
    for line in body.lines() {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

pub fn smtp_url(host: &str, port: u16) -> String {
    let scheme = if port == SMTPS_PORT { "smtps" } else { "smtp" };
    format!("{scheme}://{host}:{port}")
}

/// Quotes a value for a curl config file.
fn curl_quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Private curl config holding the SMTP credentials; removed on drop.
struct CredentialsFile {
    path: PathBuf,
}

impl CredentialsFile {
    fn create(username: &str, password: &str) -> Result<Self> {
        let path = std::env::temp_dir().join(format!(
            "shadoweye-smtp-{}-{}.conf",
            std::process::id(),
            OffsetDateTime::now_utc().unix_timestamp_nanos()
        ));

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let guard = Self { path };
        writeln!(file, "user = {}", curl_quote(&format!("{username}:{password}")))
            .with_context(|| format!("failed to write {}", guard.path.display()))?;
        Ok(guard)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CredentialsFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn send_summary(cfg: &EmailConfig, body: &str, timeout: Duration) -> Result<()> {
    if cfg.smtp_host.trim().is_empty() {
        bail!("email.smtp_host is not configured");
    }
    if cfg.to.is_empty() {
        bail!("email.to has no recipients");
    }

    let date = OffsetDateTime::now_utc()
        .format(&Rfc2822)
        .unwrap_or_else(|_| "unknown".to_string());
    let message = compose_message(&cfg.username, &cfg.to, SUBJECT, body, &date);

    let url = smtp_url(cfg.smtp_host.trim(), cfg.smtp_port);
    let mut args: Vec<String> = vec![
        "--silent".to_string(),
        "--show-error".to_string(),
        "--url".to_string(),
        url,
        "--ssl-reqd".to_string(),
        "--upload-file".to_string(),
        "-".to_string(),
    ];
    if !cfg.username.is_empty() {
        args.push("--mail-from".to_string());
        args.push(cfg.username.clone());
    }
    for rcpt in &cfg.to {
        args.push("--mail-rcpt".to_string());
        args.push(rcpt.clone());
    }

    let credentials = if cfg.username.is_empty() {
        None
    } else {
        Some(CredentialsFile::create(&cfg.username, &cfg.password)?)
    };
    if let Some(file) = &credentials {
        args.push("--config".to_string());
        args.push(file.path().display().to_string());
    }

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let out = platform::run_command_with_options(
        CURL_BIN,
        &args,
        timeout,
        &CommandRunOptions {
            stdin: Some(message.into_bytes()),
            ..Default::default()
        },
    )?;
    if !out.success() {
        bail!("curl smtp: {}", out.failure_reason());
    }

    info!(recipients = cfg.to.len(), "summary mailed");
    Ok(())
}
