use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use crate::checks::{self, Selection};
use crate::config::EffectiveConfig;
use crate::core::Ledger;
use crate::engine::{Engine, EngineOptions};
use crate::logging::{self, LogConfig, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "shadoweye",
    version,
    about = "ShadowEye: cloud misconfiguration detective"
)]
pub struct Cli {
    /// Run all available checks
    #[arg(long)]
    pub all: bool,
    /// Run AWS checks (S3, EC2, IAM)
    #[arg(long)]
    pub aws: bool,
    /// Run GCP checks (Cloud Storage)
    #[arg(long)]
    pub gcp: bool,
    /// Run SSL certificate checks
    #[arg(long = "ssl-only")]
    pub ssl_only: bool,
    /// Path to config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Per-check time budget in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
    /// Print findings as NDJSON instead of the summary
    #[arg(long)]
    pub json: bool,
    #[arg(long = "no-email")]
    pub no_email: bool,
    #[arg(long = "no-archive")]
    pub no_archive: bool,
    /// Print the effective configuration and exit
    #[arg(long = "show-config")]
    pub show_config: bool,
    #[arg(long, conflicts_with = "quiet")]
    pub verbose: bool,
    #[arg(long)]
    pub quiet: bool,
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn selection(&self) -> Selection {
        Selection::from_flags(self.all, self.aws, self.gcp, self.ssl_only)
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogConfig::from_verbosity(
        cli.verbose,
        cli.quiet,
        cli.log_format,
    ));

    if cli.timeout == 0 {
        return Err(crate::exit::invalid_args("--timeout must be at least 1 second"));
    }

    let env_config_path = std::env::var_os("SHADOWEYE_CONFIG").map(PathBuf::from);
    let cfg = crate::config::load(cli.config.as_deref().or(env_config_path.as_deref()))
        .map_err(crate::exit::invalid_args_err)?;

    if cli.show_config {
        return crate::ui::print_config(&cfg);
    }

    let selection = cli.selection();
    let registry = checks::registry(selection, &cfg);
    info!(
        categories = ?selection.names(),
        checks = registry.len(),
        config = cfg.config_path.as_deref().unwrap_or("-"),
        "configuration loaded"
    );

    let engine = Engine::new(EngineOptions {
        timeout: Duration::from_secs(cli.timeout),
        show_progress: io::stderr().is_terminal() && !cli.quiet && !cli.json,
    });
    let report = engine.run(&registry);

    deliver_console(&report.ledger, cli.json);
    if !cli.no_email {
        deliver_email(&cfg, &report.ledger, engine.timeout());
    }
    if !cli.no_archive {
        deliver_archive(&cfg, &report.ledger, engine.timeout());
    }

    Ok(())
}

fn deliver_console(ledger: &Ledger, json: bool) {
    let result = if json {
        crate::ui::print_ndjson(ledger)
    } else {
        crate::ui::print_summary(ledger)
    };
    if let Err(err) = result {
        warn!(error = %format!("{err:#}"), "console output failed");
        crate::ui::notice(&format!("Console output failed: {err:#}"));
    }
}

fn deliver_email(cfg: &EffectiveConfig, ledger: &Ledger, timeout: Duration) {
    if !cfg.email.enabled {
        return;
    }
    match crate::alerts::send_summary(&cfg.email, &ledger.render_summary(), timeout) {
        Ok(()) => crate::ui::notice(&format!(
            "📩 Email alert sent to {}",
            cfg.email.to.join(", ")
        )),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "email delivery failed");
            crate::ui::notice(&format!("Email failed: {err:#}"));
        }
    }
}

fn deliver_archive(cfg: &EffectiveConfig, ledger: &Ledger, timeout: Duration) {
    let result = ledger
        .render_ndjson()
        .map_err(anyhow::Error::from)
        .and_then(|ndjson| crate::archive::upload_ndjson(&cfg.aws, &ndjson, timeout));
    match result {
        Ok(Some(uri)) => crate::ui::notice(&format!("📝 Log stored at {uri}")),
        Ok(None) => {}
        Err(err) => {
            warn!(error = %format!("{err:#}"), "log upload failed");
            crate::ui::notice(&format!("Log upload failed: {err:#}"));
        }
    }
}
