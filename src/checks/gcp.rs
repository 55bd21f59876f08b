use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use crate::checks::classify::{self, Exposure};
use crate::checks::{CheckContext, Detection, Probe};
use crate::platform;

pub const GCLOUD_BIN: &str = "gcloud";

const PUBLIC_MEMBERS: [&str; 2] = ["allUsers", "allAuthenticatedUsers"];

#[derive(Debug, Deserialize)]
struct GcsBucket {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct IamPolicy {
    #[serde(default)]
    bindings: Vec<Binding>,
}

#[derive(Debug, Deserialize)]
struct Binding {
    #[serde(default)]
    members: Vec<String>,
}

fn policy_is_public(policy: &IamPolicy) -> bool {
    policy
        .bindings
        .iter()
        .flat_map(|b| b.members.iter())
        .any(|m| PUBLIC_MEMBERS.contains(&m.as_str()))
}

/// Storage exposure for Cloud Storage buckets of one project.
#[derive(Debug, Clone)]
pub struct GcsPublicBuckets {
    project: String,
}

impl GcsPublicBuckets {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    fn gcloud(&self, ctx: &CheckContext, args: &[&str]) -> Result<String> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["--project", self.project.as_str(), "--format=json"]);
        debug!(command = %args.join(" "), project = %self.project, "gcloud");
        let out = platform::run_command(GCLOUD_BIN, &full, ctx.command_timeout())?;
        if !out.success() {
            bail!("gcloud {}: {}", args.join(" "), out.failure_reason());
        }
        Ok(out.stdout)
    }
}

impl Probe for GcsPublicBuckets {
    type Signal = Exposure;

    fn service(&self) -> &str {
        "GCP:GCS"
    }

    fn label(&self) -> &str {
        "GCS"
    }

    fn probe(&self, ctx: &CheckContext) -> Result<Vec<Exposure>> {
        if self.project.trim().is_empty() {
            bail!("gcp.project is not configured");
        }

        let listing = self.gcloud(ctx, &["storage", "buckets", "list"])?;
        let listing = if listing.trim().is_empty() { "[]" } else { listing.trim() };
        let buckets: Vec<GcsBucket> =
            serde_json::from_str(listing).context("unexpected JSON from gcloud")?;

        let mut out = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let url = format!("gs://{}", bucket.name);
            let policy = self.gcloud(ctx, &["storage", "buckets", "get-iam-policy", url.as_str()])?;
            let policy: IamPolicy = serde_json::from_str(&policy)
                .with_context(|| format!("unexpected IAM policy JSON for {url}"))?;
            out.push(Exposure::new(bucket.name, policy_is_public(&policy)));
        }
        Ok(out)
    }

    fn classify(&self, signal: &Exposure) -> Option<Detection> {
        classify::exposure(signal, |b| format!("GCS bucket '{b}' appears PUBLIC"))
    }
}
