//! Check functions and the registry that decides which of them run.
//!
//! Each security domain implements [`Probe`]: it gathers raw signals of a
//! domain-specific type and classifies each one into at most one
//! [`Detection`]. The blanket [`Check`] impl erases the signal type so the
//! engine can hold every domain in one `Vec<Box<dyn Check>>`.

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::config::EffectiveConfig;
use crate::core::Severity;

pub mod aws;
pub mod classify;
pub mod gcp;
pub mod ssl;

#[derive(Debug, Clone)]
pub struct CheckContext {
    pub timeout: Duration,
    pub deadline: Option<Instant>,
}

impl CheckContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Context for a single check attempt: every command it spawns shares one budget.
    pub fn for_attempt(&self) -> Self {
        Self {
            timeout: self.timeout,
            deadline: Some(Instant::now() + self.timeout),
        }
    }

    /// True once the attempt's deadline has passed.
    pub fn is_spent(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn command_timeout(&self) -> Duration {
        let Some(deadline) = self.deadline else {
            return self.timeout;
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        std::cmp::min(self.timeout, remaining)
    }
}

/// A classified observation, ready to become one finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub severity: Severity,
    pub resource: String,
    pub message: String,
}

impl Detection {
    pub fn new(severity: Severity, resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            resource: resource.into(),
            message: message.into(),
        }
    }
}

pub trait Probe {
    type Signal;

    /// Category tag written into every finding, e.g. `AWS:S3`.
    fn service(&self) -> &str;

    /// Short name used in failure messages, e.g. `S3`.
    fn label(&self) -> &str;

    fn probe(&self, ctx: &CheckContext) -> Result<Vec<Self::Signal>>;

    /// `None` means the signal is healthy and produces no finding.
    fn classify(&self, signal: &Self::Signal) -> Option<Detection>;
}

pub trait Check {
    fn service(&self) -> &str;
    fn label(&self) -> &str;
    fn run(&self, ctx: &CheckContext) -> Result<Vec<Detection>>;
}

impl<P: Probe> Check for P {
    fn service(&self) -> &str {
        Probe::service(self)
    }

    fn label(&self) -> &str {
        Probe::label(self)
    }

    fn run(&self, ctx: &CheckContext) -> Result<Vec<Detection>> {
        let signals = self.probe(ctx)?;
        Ok(signals.iter().filter_map(|s| self.classify(s)).collect())
    }
}

/// Which check categories a run covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub aws: bool,
    pub gcp: bool,
    pub ssl: bool,
}

impl Selection {
    /// Without any selection flag only the TLS checks run. `--ssl-only`
    /// combines with the other flags rather than excluding them.
    pub fn from_flags(all: bool, aws: bool, gcp: bool, ssl_only: bool) -> Self {
        Self {
            aws: all || aws,
            gcp: all || gcp,
            ssl: all || ssl_only || (!aws && !gcp && !all),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.aws {
            out.push("aws");
        }
        if self.gcp {
            out.push("gcp");
        }
        if self.ssl {
            out.push("ssl");
        }
        out
    }
}

pub fn registry(selection: Selection, cfg: &EffectiveConfig) -> Vec<Box<dyn Check>> {
    let mut checks: Vec<Box<dyn Check>> = Vec::new();

    if selection.aws {
        let target = aws::AwsTarget::from_config(&cfg.aws);
        checks.push(Box::new(aws::S3PublicBuckets::new(target.clone())));
        checks.push(Box::new(aws::Ec2WorldSsh::new(target.clone())));
        checks.push(Box::new(aws::IamAdminWithoutMfa::new(target)));
    }

    if selection.gcp {
        checks.push(Box::new(gcp::GcsPublicBuckets::new(cfg.gcp.project.clone())));
    }

    if selection.ssl && !cfg.ssl.hosts.is_empty() {
        checks.push(Box::new(ssl::CertificateExpiry::new(cfg.ssl.hosts.clone())));
    }

    checks
}
