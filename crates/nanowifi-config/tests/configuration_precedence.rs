use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use nanowifi_config::{Config, default_interface, default_log_filter, default_log_format};

/// Scenarios mutate process environment, so they run one at a time.
static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    _env_guard: MutexGuard<'static, ()>,
    temp_dir: TempDir,
    cli_args: std::cell::RefCell<Vec<OsString>>,
    env_overrides: std::cell::RefCell<Vec<(String, Option<OsString>)>>,
    loaded: std::cell::RefCell<Option<Config>>,
    error: std::cell::RefCell<Option<String>>,
}

impl Harness {
    fn new() -> Self {
        let env_guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        Self {
            _env_guard: env_guard,
            temp_dir,
            cli_args: std::cell::RefCell::new(vec![OsString::from("nanowifi")]),
            env_overrides: std::cell::RefCell::new(Vec::new()),
            loaded: std::cell::RefCell::new(None),
            error: std::cell::RefCell::new(None),
        }
    }

    fn write_config(&self, interface: &str) {
        let path = self.temp_dir.path().join("nanowifi.toml");
        let toml = format!("interface = \"{interface}\"\nunload_timeout_ms = 2500\n");

        if let Err(error) = fs::write(&path, toml) {
            panic!("failed to write configuration: {error}");
        }

        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // The nightly toolchain marks environment mutation as `unsafe` while the
        // API stabilises. The harness restores overrides in `Drop` to keep the
        // wider process environment unchanged.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_string(), previous));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }

        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => {
                *self.loaded.borrow_mut() = Some(config);
            }
            Err(error) => {
                *self.error.borrow_mut() = Some(error.to_string());
            }
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            if let Some(os_value) = value {
                unsafe { std::env::set_var(&key, os_value) };
            } else {
                unsafe { std::env::remove_var(&key) };
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the interface to \"{interface}\"")]
fn given_configuration_file(harness: &Harness, interface: String) {
    harness.write_config(&interface);
}

#[given("the environment overrides the interface to \"{interface}\"")]
fn given_environment_override(harness: &Harness, interface: String) {
    harness.set_env("NANOWIFI_INTERFACE", &interface);
}

#[when("the CLI sets the interface to \"{interface}\"")]
fn when_cli_override(harness: &Harness, interface: String) {
    harness.push_cli_arg("--interface");
    harness.push_cli_arg(OsString::from(&interface));
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

fn loaded_config(harness: &Harness) -> Config {
    harness.load();

    if let Some(error) = harness.error.borrow().as_ref() {
        panic!("configuration failed to load: {error}");
    }

    match harness.loaded.borrow().as_ref() {
        Some(config) => config.clone(),
        None => panic!("configuration was not loaded"),
    }
}

#[then("loading the configuration resolves the interface to \"{interface}\"")]
fn then_resolved_interface(harness: &Harness, interface: String) {
    let config = loaded_config(harness);
    assert_eq!(config.interface(), interface);
}

#[then("the file-provided unload timeout is retained")]
fn then_file_timeout_retained(harness: &Harness) {
    let config = loaded_config(harness);
    assert_eq!(config.unload_timeout_ms, 2500);
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = loaded_config(harness);
    assert_eq!(config.interface(), default_interface());
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Built-in defaults apply without overrides"
)]
fn defaults_apply(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Configuration file overrides the defaults"
)]
fn file_overrides_defaults(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Environment overrides the configuration file"
)]
fn environment_overrides_file(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Command-line flags take precedence"
)]
fn cli_flags_take_precedence(#[from(harness)] harness: Harness) {
    let _ = harness;
}
