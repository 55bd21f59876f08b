use anyhow::{Error, Result};
use std::io::{self, Write};

use crate::config::EffectiveConfig;
use crate::core::Ledger;
use crate::exit::ExitCode;

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = write_error(&mut stderr, err);
}

fn write_error(out: &mut impl Write, err: &Error) -> io::Result<()> {
    writeln!(out, "error:")?;
    writeln!(out, "  {err}")?;

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        writeln!(out, "caused by:")?;
        for cause in causes {
            writeln!(out, "  - {cause}")?;
        }
    }

    writeln!(out, "next:")?;
    if crate::exit::exit_code(err) == ExitCode::InvalidArgs.as_i32() {
        writeln!(
            out,
            "  - pass --config <path> or set SHADOWEYE_CONFIG to point at a valid config.toml"
        )?;
    }
    writeln!(out, "  - see `shadoweye --help` for the available flags")
}

/// Operator-facing status line for sinks (email, archive). Always stderr so
/// stdout stays a clean report.
pub fn notice(line: &str) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "{line}");
}

pub fn print_summary(ledger: &Ledger) -> Result<()> {
    write_stdout(&ledger.render_summary())
}

pub fn print_ndjson(ledger: &Ledger) -> Result<()> {
    let ndjson = ledger.render_ndjson()?;
    if ndjson.is_empty() {
        return Ok(());
    }
    write_stdout(&ndjson)
}

pub fn print_config(cfg: &EffectiveConfig) -> Result<()> {
    let s = toml::to_string_pretty(&cfg.redacted())?;
    write_stdout(s.trim_end())
}

fn write_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.write_all(b"\n"))
        .and_then(|()| stdout.flush())
    {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}
