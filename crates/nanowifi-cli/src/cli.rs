//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use nanowifi_config::FirmwareMode;

/// Operator tool for the wireless driver and supplicant.
#[derive(Parser, Debug)]
#[command(name = "nanowifi", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Top-level operations.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Prints the driver status label.
    Status,
    /// Loads the driver for the configured interface.
    Load,
    /// Unloads the driver.
    Unload,
    /// Starts or stops the supplicant.
    Daemon {
        /// The lifecycle action to perform.
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Creates the supplicant configuration and entropy files when missing.
    Provision,
    /// Publishes the firmware path configured for a radio role.
    Firmware {
        /// Radio role: `sta`, `ap` or `p2p`.
        #[arg(value_parser = parse_firmware_mode)]
        mode: FirmwareMode,
    },
    /// Sends a control command to the supplicant and prints the reply.
    Send {
        /// Command words, joined with single spaces.
        #[arg(
            value_name = "COMMAND",
            required = true,
            num_args = 1..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        words: Vec<String>,
    },
    /// Prints supplicant events as they arrive.
    Events {
        /// Number of events to print before exiting.
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Loads the driver, starts the supplicant and connects to it.
    Up,
    /// Stops the supplicant and unloads the driver.
    Down,
}

/// Supplicant lifecycle actions.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DaemonAction {
    /// Starts the supplicant and waits for it to report running.
    Start,
    /// Stops the supplicant and waits for it to report stopped.
    Stop,
}

fn parse_firmware_mode(value: &str) -> Result<FirmwareMode, String> {
    value
        .parse()
        .map_err(|_| format!("unknown firmware mode '{value}' (expected sta, ap or p2p)"))
}
