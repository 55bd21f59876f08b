//! AWS probes, driven through the `aws` CLI so credentials and profiles resolve
//! exactly the way the operator's shell does.

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::checks::classify::{self, Exposure};
use crate::checks::{CheckContext, Detection, Probe};
use crate::config::AwsConfig;
use crate::platform::{self, CommandOutput, CommandRunOptions};

pub const AWS_BIN: &str = "aws";

const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
const AUTHENTICATED_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";
const SSH_PORT: i64 = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsTarget {
    pub profile: String,
    pub region: String,
}

impl AwsTarget {
    pub fn from_config(cfg: &AwsConfig) -> Self {
        Self {
            profile: cfg.profile.clone(),
            region: cfg.region.clone(),
        }
    }

    fn run(&self, ctx: &CheckContext, args: &[&str]) -> Result<CommandOutput> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend([
            "--profile",
            self.profile.as_str(),
            "--region",
            self.region.as_str(),
            "--output",
            "json",
        ]);
        debug!(command = %args.join(" "), profile = %self.profile, region = %self.region, "aws");
        platform::run_command_with_options(AWS_BIN, &full, ctx.command_timeout(), &aws_options())
    }

    fn json<T: DeserializeOwned>(&self, ctx: &CheckContext, args: &[&str]) -> Result<T> {
        let out = self.run(ctx, args)?;
        if !out.success() {
            bail!("aws {}: {}", command_name(args), out.failure_reason());
        }
        parse_json(&out.stdout).with_context(|| format!("aws {}", command_name(args)))
    }
}

/// AWS CLI v2 pipes output through a pager unless `AWS_PAGER` is empty.
pub(crate) fn aws_options() -> CommandRunOptions {
    CommandRunOptions {
        env: vec![("AWS_PAGER".to_string(), String::new())],
        ..Default::default()
    }
}

fn command_name(args: &[&str]) -> String {
    args.iter().take(2).copied().collect::<Vec<_>>().join(" ")
}

fn parse_json<T: DeserializeOwned>(s: &str) -> Result<T> {
    let s = s.trim();
    let s = if s.is_empty() { "{}" } else { s };
    serde_json::from_str(s).context("unexpected JSON from aws CLI")
}

// ---------------------------------------------------------------------------
// S3

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBuckets {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Bucket {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyStatusResponse {
    policy_status: Option<PolicyStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyStatus {
    #[serde(default)]
    is_public: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketAcl {
    #[serde(default)]
    grants: Vec<Grant>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Grant {
    grantee: Option<Grantee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Grantee {
    #[serde(rename = "URI")]
    uri: Option<String>,
}

fn acl_is_public(acl: &BucketAcl) -> bool {
    acl.grants.iter().any(|g| {
        g.grantee
            .as_ref()
            .and_then(|g| g.uri.as_deref())
            .is_some_and(|uri| uri == ALL_USERS_URI || uri == AUTHENTICATED_USERS_URI)
    })
}

/// Storage exposure: buckets readable by anyone through policy or ACL.
#[derive(Debug, Clone)]
pub struct S3PublicBuckets {
    target: AwsTarget,
}

impl S3PublicBuckets {
    pub fn new(target: AwsTarget) -> Self {
        Self { target }
    }

    fn policy_is_public(&self, ctx: &CheckContext, bucket: &str) -> Result<bool> {
        let out = self
            .target
            .run(ctx, &["s3api", "get-bucket-policy-status", "--bucket", bucket])?;
        if !out.success() {
            if out.stderr.contains("NoSuchBucketPolicy") {
                return Ok(false);
            }
            bail!(
                "aws s3api get-bucket-policy-status ({bucket}): {}",
                out.failure_reason()
            );
        }
        let status: PolicyStatusResponse = parse_json(&out.stdout)?;
        Ok(status.policy_status.is_some_and(|p| p.is_public))
    }

    fn acl_is_public(&self, ctx: &CheckContext, bucket: &str) -> Result<bool> {
        let acl: BucketAcl = self
            .target
            .json(ctx, &["s3api", "get-bucket-acl", "--bucket", bucket])?;
        Ok(acl_is_public(&acl))
    }
}

impl Probe for S3PublicBuckets {
    type Signal = Exposure;

    fn service(&self) -> &str {
        "AWS:S3"
    }

    fn label(&self) -> &str {
        "S3"
    }

    fn probe(&self, ctx: &CheckContext) -> Result<Vec<Exposure>> {
        let listing: ListBuckets = self.target.json(ctx, &["s3api", "list-buckets"])?;
        let mut out = Vec::with_capacity(listing.buckets.len());
        for bucket in listing.buckets {
            let public = self.policy_is_public(ctx, &bucket.name)?
                || self.acl_is_public(ctx, &bucket.name)?;
            out.push(Exposure::new(bucket.name, public));
        }
        Ok(out)
    }

    fn classify(&self, signal: &Exposure) -> Option<Detection> {
        classify::exposure(signal, |b| format!("S3 bucket '{b}' appears PUBLIC"))
    }
}

// ---------------------------------------------------------------------------
// EC2

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    #[serde(default)]
    security_groups: Vec<GroupRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupRef {
    group_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroups {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroup {
    group_id: String,
    #[serde(default)]
    ip_permissions: Vec<IpPermission>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpPermission {
    ip_protocol: String,
    from_port: Option<i64>,
    to_port: Option<i64>,
    #[serde(default)]
    ip_ranges: Vec<IpRange>,
    #[serde(default)]
    ipv6_ranges: Vec<Ipv6Range>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpRange {
    cidr_ip: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ipv6Range {
    cidr_ipv6: String,
}

fn permission_opens_world_ssh(p: &IpPermission) -> bool {
    let covers_ssh = match p.ip_protocol.as_str() {
        "-1" | "all" => true,
        "tcp" | "6" => {
            let from = p.from_port.unwrap_or(0);
            let to = p.to_port.unwrap_or(65535);
            from <= SSH_PORT && SSH_PORT <= to
        }
        _ => false,
    };
    let from_world = p.ip_ranges.iter().any(|r| r.cidr_ip == "0.0.0.0/0")
        || p.ipv6_ranges.iter().any(|r| r.cidr_ipv6 == "::/0");
    covers_ssh && from_world
}

fn world_ssh_groups(groups: &[SecurityGroup]) -> HashSet<&str> {
    groups
        .iter()
        .filter(|g| g.ip_permissions.iter().any(permission_opens_world_ssh))
        .map(|g| g.group_id.as_str())
        .collect()
}

/// Network exposure: instances whose security groups admit SSH from anywhere.
#[derive(Debug, Clone)]
pub struct Ec2WorldSsh {
    target: AwsTarget,
}

impl Ec2WorldSsh {
    pub fn new(target: AwsTarget) -> Self {
        Self { target }
    }
}

impl Probe for Ec2WorldSsh {
    type Signal = Exposure;

    fn service(&self) -> &str {
        "AWS:EC2"
    }

    fn label(&self) -> &str {
        "EC2"
    }

    fn probe(&self, ctx: &CheckContext) -> Result<Vec<Exposure>> {
        let groups: DescribeSecurityGroups =
            self.target.json(ctx, &["ec2", "describe-security-groups"])?;
        let open = world_ssh_groups(&groups.security_groups);

        let instances: DescribeInstances = self.target.json(ctx, &["ec2", "describe-instances"])?;
        Ok(instances
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .map(|i| {
                let exposed = i
                    .security_groups
                    .iter()
                    .any(|g| open.contains(g.group_id.as_str()));
                Exposure::new(i.instance_id, exposed)
            })
            .collect())
    }

    fn classify(&self, signal: &Exposure) -> Option<Detection> {
        classify::exposure(signal, |i| {
            format!("EC2 {i} has SSH open to world (0.0.0.0/0 or ::/0)")
        })
    }
}

// ---------------------------------------------------------------------------
// IAM

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListUsers {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct User {
    user_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AttachedPolicies {
    #[serde(default)]
    attached_policies: Vec<AttachedPolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AttachedPolicy {
    policy_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct MfaDevices {
    #[serde(rename = "MFADevices", default)]
    devices: Vec<serde_json::Value>,
}

fn is_admin_policy(name: &str) -> bool {
    name == "AdministratorAccess" || name.ends_with("FullAccess")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPosture {
    pub user_name: String,
    pub admin_policies: Vec<String>,
    /// Only looked up for users holding an admin policy.
    pub has_mfa: Option<bool>,
}

/// Identity hygiene: users with broad managed policies and no second factor.
#[derive(Debug, Clone)]
pub struct IamAdminWithoutMfa {
    target: AwsTarget,
}

impl IamAdminWithoutMfa {
    pub fn new(target: AwsTarget) -> Self {
        Self { target }
    }
}

impl Probe for IamAdminWithoutMfa {
    type Signal = UserPosture;

    fn service(&self) -> &str {
        "AWS:IAM"
    }

    fn label(&self) -> &str {
        "IAM"
    }

    fn probe(&self, ctx: &CheckContext) -> Result<Vec<UserPosture>> {
        let users: ListUsers = self.target.json(ctx, &["iam", "list-users"])?;
        let mut out = Vec::with_capacity(users.users.len());
        for user in users.users {
            let name = user.user_name;
            let policies: AttachedPolicies = self.target.json(
                ctx,
                &["iam", "list-attached-user-policies", "--user-name", name.as_str()],
            )?;
            let admin_policies: Vec<String> = policies
                .attached_policies
                .into_iter()
                .map(|p| p.policy_name)
                .filter(|p| is_admin_policy(p))
                .collect();

            let has_mfa = if admin_policies.is_empty() {
                None
            } else {
                let mfa: MfaDevices =
                    self.target
                        .json(ctx, &["iam", "list-mfa-devices", "--user-name", name.as_str()])?;
                Some(!mfa.devices.is_empty())
            };

            out.push(UserPosture {
                user_name: name,
                admin_policies,
                has_mfa,
            });
        }
        Ok(out)
    }

    fn classify(&self, signal: &UserPosture) -> Option<Detection> {
        let exposed = !signal.admin_policies.is_empty() && signal.has_mfa == Some(false);
        classify::exposure(&Exposure::new(signal.user_name.clone(), exposed), |u| {
            format!("IAM user '{u}' has Admin/FullAccess and NO MFA")
        })
    }
}
