//! Runtime for the `nanowifi` operator tool.
//!
//! Parses arguments, loads layered configuration, installs telemetry and
//! drives a [`WifiSession`]. Configuration loading and session construction
//! sit behind traits so the runtime can be exercised without touching the
//! platform.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use nanowifi::telemetry::{self, TelemetryError};
use nanowifi::{
    AndroidProperties, CommandError, DriverStatus, SessionError, TERMINATING_EVENT, WifiSession,
};
use nanowifi_config::Config;
use thiserror::Error;

mod cli;
mod config;

use cli::{Cli, CliCommand, DaemonAction};
use config::{ConfigArgumentSplit, split_config_arguments};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: keep in sync with the fields of `nanowifi_config::Config`
/// that operators are expected to override per invocation.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--interface",
    "--log-filter",
    "--log-format",
];

/// Builds the session an invocation operates on.
pub(crate) trait SessionFactory {
    fn build(&self, config: Config) -> WifiSession;
}

/// Session factory backed by the platform property tools and init.
pub(crate) struct PlatformSessionFactory;

impl SessionFactory for PlatformSessionFactory {
    fn build(&self, config: Config) -> WifiSession {
        WifiSession::builder(config, Arc::new(AndroidProperties::default())).build()
    }
}

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("driver is not loaded on {interface}; run 'nanowifi load' first")]
    DriverNotLoaded { interface: String },
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with(
        args,
        stdout,
        stderr,
        &OrthoConfigLoader,
        &PlatformSessionFactory,
    )
}

pub(crate) fn run_with<I, W, E, L, F>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
    factory: &F,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
    F: SessionFactory,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let cli_arguments = prepare_cli_arguments(&args, &split);

    let result = Cli::try_parse_from(cli_arguments)
        .map_err(AppError::CliUsage)
        .and_then(|cli| {
            loader
                .load(&split.config_arguments)
                .map(|config| (cli, config))
        })
        .and_then(|(cli, config)| {
            telemetry::initialise(&config)?;
            let mut session = factory.build(config);
            execute(cli.command, &mut session, stdout)
        });

    match result {
        Ok(exit_code) => exit_code,
        Err(AppError::CliUsage(error)) if !error.use_stderr() => {
            // Help and version output belong on stdout and are not failures.
            if write!(stdout, "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            if writeln!(stderr, "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    let program = args.first().cloned().into_iter();
    let rest = args.iter().skip(split.command_start).cloned();
    program.chain(rest).collect()
}

fn execute<W: Write>(
    command: CliCommand,
    session: &mut WifiSession,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    match command {
        CliCommand::Status => {
            let status = session.status();
            emit(stdout, &status.to_string())?;
            if status == DriverStatus::Error && !session.last_error().is_empty() {
                emit(stdout, session.last_error())?;
            }
        }
        CliCommand::Load => {
            session.load_driver()?;
            emit(stdout, "driver loaded")?;
        }
        CliCommand::Unload => {
            session.unload_driver()?;
            emit(stdout, "driver unloaded")?;
        }
        CliCommand::Daemon { action } => match action {
            DaemonAction::Start => {
                session.start_daemon()?;
                emit(stdout, "supplicant running")?;
            }
            DaemonAction::Stop => {
                session.stop_daemon()?;
                emit(stdout, "supplicant stopped")?;
            }
        },
        CliCommand::Provision => {
            session.ensure_config()?;
            session.ensure_entropy_file()?;
            emit(stdout, "supplicant files provisioned")?;
        }
        CliCommand::Firmware { mode } => {
            let path = session.firmware_path(mode).map(str::to_owned);
            session.apply_firmware_path(path.as_deref())?;
            match path {
                Some(path) => emit(stdout, &format!("firmware path set to {path}"))?,
                None => emit(stdout, &format!("no firmware override for {mode}"))?,
            }
        }
        CliCommand::Send { words } => {
            connect_to_loaded_driver(session)?;
            let reply = session.command(&words.join(" "))?;
            emit(stdout, reply.trim_end_matches('\n'))?;
        }
        CliCommand::Events { count } => {
            connect_to_loaded_driver(session)?;
            for _ in 0..count {
                let event = session.next_event();
                emit(stdout, &event)?;
                if event.starts_with(TERMINATING_EVENT) {
                    break;
                }
            }
        }
        CliCommand::Up => {
            session.bring_up()?;
            emit(stdout, "wireless up")?;
        }
        CliCommand::Down => {
            session.tear_down()?;
            emit(stdout, "wireless down")?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Records the interface of an already-running driver and connects to the
/// supplicant, refusing to load the driver implicitly.
fn connect_to_loaded_driver(session: &mut WifiSession) -> Result<(), AppError> {
    if !session.is_driver_loaded() {
        return Err(AppError::DriverNotLoaded {
            interface: session.config().interface().to_owned(),
        });
    }
    session.load_driver()?;
    session.connect()?;
    Ok(())
}

fn emit<W: Write>(stdout: &mut W, line: &str) -> Result<(), AppError> {
    writeln!(stdout, "{line}").map_err(AppError::Output)
}

#[cfg(test)]
mod tests;
