use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::checks::{Check, CheckContext};
use crate::core::{Ledger, NO_RESOURCE, Severity};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub timeout: Duration,
    pub show_progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckState {
    Pending,
    Running,
    Completed { findings: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct CheckRun {
    pub service: String,
    pub label: String,
    pub state: CheckState,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub ledger: Ledger,
    pub checks: Vec<CheckRun>,
}

impl RunReport {
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckRun> {
        self.checks
            .iter()
            .filter(|c| matches!(c.state, CheckState::Failed { .. }))
    }
}

#[derive(Clone)]
pub struct Engine {
    opts: EngineOptions,
}

impl Engine {
    pub fn new(opts: EngineOptions) -> Self {
        Self { opts }
    }

    pub fn timeout(&self) -> Duration {
        self.opts.timeout
    }

    /// Runs every check once, in order. A failing check never stops the run:
    /// it is recorded as a single MEDIUM finding under its own service tag.
    pub fn run(&self, checks: &[Box<dyn Check>]) -> RunReport {
        let base = CheckContext::new(self.opts.timeout);
        let mut report = RunReport {
            ledger: Ledger::new(),
            checks: checks
                .iter()
                .map(|c| CheckRun {
                    service: c.service().to_string(),
                    label: c.label().to_string(),
                    state: CheckState::Pending,
                    elapsed: Duration::ZERO,
                })
                .collect(),
        };

        info!(checks = checks.len(), "starting run");

        use std::io::IsTerminal;
        let progress_enabled = self.opts.show_progress && std::io::stderr().is_terminal();
        let pb = if progress_enabled {
            let pb = indicatif::ProgressBar::new_spinner();
            pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        for (check, slot) in checks.iter().zip(report.checks.iter_mut()) {
            if let Some(pb) = &pb {
                pb.set_message(format!("Checking {}...", check.service()));
            }
            slot.state = CheckState::Running;
            debug!(service = %check.service(), "check started");

            let started = Instant::now();
            let ctx = base.for_attempt();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| check.run(&ctx)))
                .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(&*payload))));
            slot.elapsed = started.elapsed();

            match outcome {
                Ok(detections) => {
                    info!(
                        service = %check.service(),
                        detections = detections.len(),
                        elapsed_ms = slot.elapsed.as_millis() as u64,
                        "check completed"
                    );
                    slot.state = CheckState::Completed {
                        findings: detections.len(),
                    };
                    for d in detections {
                        report
                            .ledger
                            .add(d.severity, check.service(), d.resource, d.message);
                    }
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    warn!(service = %check.service(), error = %reason, "check failed");
                    report.ledger.add(
                        Severity::Medium,
                        check.service(),
                        NO_RESOURCE,
                        format!("{} check error: {reason}", check.label()),
                    );
                    slot.state = CheckState::Failed { reason };
                }
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        info!(
            findings = report.ledger.len(),
            failed = report.failed_checks().count(),
            counts = %report.ledger.counts(),
            "run finished"
        );

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
