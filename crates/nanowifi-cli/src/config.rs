//! Configuration loading helpers for the CLI.
//!
//! Configuration flags are peeled off the front of the argument list and
//! handed to `ortho_config`; the remaining tokens are parsed by clap.

use std::ffi::{OsStr, OsString};

use nanowifi_config::Config;
use ortho_config::OrthoConfig;

use crate::AppError;

pub(crate) trait ConfigLoader {
    /// Loads configuration from the filtered configuration arguments.
    ///
    /// Configuration flags (listed in `CONFIG_CLI_FLAGS`) must appear before
    /// the subcommand; later occurrences are treated as command arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

#[derive(Debug, Clone, Copy)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

fn classify_flag(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Skip;
    }
    let (flag, has_inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if super::CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_start: usize,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some(program) = args.first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_start: 0,
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut command_start = 1;
    let mut expecting_value = false;

    for argument in args.iter().skip(1) {
        if expecting_value {
            config_arguments.push(argument.clone());
            expecting_value = false;
            command_start += 1;
            continue;
        }
        match classify_flag(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                expecting_value = needs_value;
                command_start += 1;
            }
            FlagAction::Skip => break,
        }
    }

    ConfigArgumentSplit {
        config_arguments,
        command_start,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case("--log-filter=debug", Some(false))]
    #[case("--log-filter", Some(true))]
    #[case("--interface", Some(true))]
    #[case("--unknown", None)]
    #[case("status", None)]
    fn flags_are_classified(#[case] argument: &str, #[case] expected: Option<bool>) {
        let actual = match classify_flag(OsStr::new(argument)) {
            FlagAction::Include { needs_value } => Some(needs_value),
            FlagAction::Skip => None,
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn leading_config_flags_are_split_off() {
        let args = os(&[
            "nanowifi",
            "--interface",
            "wlan1",
            "--log-format=compact",
            "send",
            "--log-filter",
            "debug",
        ]);

        let split = split_config_arguments(&args);

        assert_eq!(
            split.config_arguments,
            os(&["nanowifi", "--interface", "wlan1", "--log-format=compact"])
        );
        assert_eq!(split.command_start, 4);
    }

    #[test]
    fn empty_arguments_split_to_nothing() {
        let split = split_config_arguments(&[]);
        assert!(split.config_arguments.is_empty());
        assert_eq!(split.command_start, 0);
    }
}
