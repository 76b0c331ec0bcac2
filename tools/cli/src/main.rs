//! GDBot CLI
//!
//! Scripts a single debugger session from the command line. Steps run in a
//! fixed order: breakpoints, run, wait-break, writes, reads, evals, raw
//! commands, resume, finish.
//!
//! # Configuration
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`GDBOT_GDB_PATH`, `GDBOT_DEBUG_ECHO`)
//! 3. Config file given with `--config`
//! 4. Default values
//!
//! Log filtering follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use gdbot_core::{Evaluation, GdbSession, SessionConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Drive GDB through its machine interface
#[derive(Parser, Debug)]
#[command(name = "gdbot")]
#[command(version, about, long_about = None)]
struct Args {
    /// Program to debug
    executable: PathBuf,

    /// TOML session config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debugger executable (overrides config and GDBOT_GDB_PATH)
    #[arg(long, value_name = "PATH")]
    gdb: Option<String>,

    /// Working directory for the debugger
    #[arg(short = 'C', long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Mirror protocol traffic to the log
    #[arg(long)]
    echo: bool,

    /// Set a breakpoint (repeatable)
    #[arg(short = 'b', long = "break", value_name = "LOC")]
    breakpoints: Vec<String>,

    /// Run the debuggee after setting breakpoints
    #[arg(long)]
    run: bool,

    /// Set a breakpoint and wait until it is hit
    #[arg(short, long, value_name = "LOC")]
    wait_break: Option<String>,

    /// Wait and command timeout in milliseconds
    #[arg(short, long, value_name = "MS", default_value_t = 20_000)]
    timeout: u64,

    /// Assign a variable (repeatable)
    #[arg(long = "write", value_name = "VAR=VALUE", value_parser = parse_assignment)]
    writes: Vec<(String, String)>,

    /// Read a variable (repeatable)
    #[arg(short, long = "read", value_name = "VAR")]
    reads: Vec<String>,

    /// Evaluate an expression (repeatable)
    #[arg(short, long = "eval", value_name = "EXPR")]
    evals: Vec<String>,

    /// Run a raw debugger command (repeatable)
    #[arg(long = "command", value_name = "RAW")]
    commands: Vec<String>,

    /// Resume the debuggee before finishing
    #[arg(long)]
    resume: bool,
}

fn parse_assignment(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected VAR=VALUE, got '{}'", raw)),
    }
}

impl Args {
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SessionConfig::default(),
        }
        .with_env_overrides();

        if let Some(gdb) = &self.gdb {
            config.gdb_path = gdb.clone();
        }
        if let Some(dir) = &self.directory {
            config.working_dir = Some(dir.clone());
        }
        if self.echo {
            config.debug_echo = true;
        }
        Ok(config)
    }
}

fn run_script(session: &mut GdbSession, args: &Args) -> Result<()> {
    let timeout = Duration::from_millis(args.timeout);

    for location in &args.breakpoints {
        info!("Setting breakpoint at {}", location);
        session.set_breakpoint(location);
    }
    if args.run {
        info!("Starting debuggee");
        session.run();
    }
    if let Some(location) = &args.wait_break {
        session
            .set_and_wait_break(location, timeout)
            .with_context(|| format!("Breakpoint {} was not reached", location))?;
        println!("stopped at {}", location);
    }

    for (name, value) in &args.writes {
        let new_value = session
            .write_var(name, value)
            .with_context(|| format!("Failed to assign {}", name))?;
        println!("{} = {}", name, new_value);
    }
    for name in &args.reads {
        let value = session
            .read_var(name)
            .with_context(|| format!("Failed to read {}", name))?;
        println!("{} = {}", name, value);
    }
    for expression in &args.evals {
        match session.evaluate(expression)? {
            Evaluation::Value(value) => println!("{} => {}", expression, value),
            Evaluation::NoValue => bail!("No value for '{}'", expression),
            Evaluation::Rejected(message) => bail!("'{}' rejected: {}", expression, message),
        }
    }
    for command in &args.commands {
        let output = session.run_command(command, timeout)?;
        print!("{}", output.text);
        if output.truncated {
            warn!("Output of '{}' was truncated", command);
        }
        if !output.completed {
            bail!("'{}' did not complete within {} ms", command, args.timeout);
        }
    }

    if args.resume {
        info!("Resuming debuggee");
        session.resume();
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.session_config()?;

    let mut session = GdbSession::start_with_config(&args.executable, config)
        .with_context(|| format!("Failed to start debugger for {}", args.executable.display()))?;

    let outcome = run_script(&mut session, &args);
    conclude(outcome, session.finish())
}

/// The script's own error wins over a failure to stop the debugger
fn conclude(outcome: Result<()>, finished: gdbot_core::Result<Option<i32>>) -> Result<()> {
    match finished {
        Ok(exit_code) => info!("Debugger exited with code {:?}", exit_code),
        Err(e) if outcome.is_err() => warn!("Failed to stop debugger: {}", e),
        Err(e) => return Err(e).context("Failed to stop debugger"),
    }
    outcome
}
