//! In-process tests for the CLI runtime.

use std::ffi::OsString;
use std::fs;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use nanowifi::{MemoryProperties, PlatformError, ServiceManager, Sleeper, WifiSession};
use nanowifi_config::Config;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

struct StaticLoader {
    config: Config,
}

impl ConfigLoader for StaticLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

struct IdleServices;

impl ServiceManager for IdleServices {
    fn request_start(&self, _name: &str) -> Result<(), PlatformError> {
        Ok(())
    }

    fn request_stop(&self, _name: &str) -> Result<(), PlatformError> {
        Ok(())
    }
}

struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) {}

    fn yield_now(&self) {}
}

struct MemoryFactory;

impl SessionFactory for MemoryFactory {
    fn build(&self, config: Config) -> WifiSession {
        let properties = Arc::new(MemoryProperties::new());
        WifiSession::builder(config, properties.clone())
            .with_serials(properties)
            .with_services(Arc::new(IdleServices))
            .with_sleeper(Arc::new(InstantSleeper))
            .build()
    }
}

struct Fixture {
    _dir: TempDir,
    config: Config,
}

impl Fixture {
    fn write_status(&self, contents: &str) {
        fs::write(&self.config.status_path, contents).expect("write status file");
    }

    fn run(&self, args: &[&str]) -> (ExitCode, String, String) {
        let loader = StaticLoader {
            config: self.config.clone(),
        };
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let args = std::iter::once("nanowifi")
            .chain(args.iter().copied())
            .map(OsString::from);
        let code = run_with(args, &mut stdout, &mut stderr, &loader, &MemoryFactory);
        (
            code,
            String::from_utf8(stdout).expect("utf8 stdout"),
            String::from_utf8(stderr).expect("utf8 stderr"),
        )
    }
}

#[fixture]
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
    let config = Config {
        status_path: root.join("driver_status"),
        liveness_root: root.join("proc"),
        ctrl_iface_dir: root.join("ctrl"),
        reserved_socket_dir: root.join("reserved"),
        client_socket_dir: root.join("sockets"),
        config_template: root.join("template.conf"),
        config_file: root.join("wpa_supplicant.conf"),
        entropy_file: root.join("entropy.bin"),
        fw_path_param: root.join("fwpath"),
        fw_path_ap: String::from("/vendor/firmware/fw_ap.bin"),
        load_timeout_ms: 0,
        wake_timeout_ms: 0,
        supplicant_timeout_ms: 0,
        log_filter: String::from("off"),
        ..Config::default()
    };
    Fixture { _dir: dir, config }
}

#[rstest]
fn status_prints_driver_label(fixture: Fixture) {
    fixture.write_status("sleeping\n");

    let (code, stdout, stderr) = fixture.run(&["status"]);

    assert_eq!(code, ExitCode::SUCCESS, "stderr: {stderr}");
    assert_eq!(stdout, "sleeping\n");
}

#[rstest]
fn status_prints_error_detail(fixture: Fixture) {
    fixture.write_status("error\nfirmware download failed\n");

    let (code, stdout, _) = fixture.run(&["status"]);

    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(stdout, "error\nfirmware download failed\n");
}

#[rstest]
fn status_without_file_reports_unknown(fixture: Fixture) {
    let (code, stdout, _) = fixture.run(&["status"]);

    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(stdout, "unknown\n");
}

#[rstest]
fn load_fails_when_driver_never_comes_up(fixture: Fixture) {
    fixture.write_status("unloaded\n");

    let (code, _, stderr) = fixture.run(&["load"]);

    assert_eq!(code, ExitCode::FAILURE);
    assert!(!stderr.is_empty());
}

#[rstest]
fn send_refuses_to_load_the_driver(fixture: Fixture) {
    fixture.write_status("unloaded\n");

    let (code, stdout, stderr) = fixture.run(&["send", "PING"]);

    assert_eq!(code, ExitCode::FAILURE);
    assert!(stdout.is_empty());
    assert!(stderr.contains("driver is not loaded on wlan0"), "stderr: {stderr}");
}

#[rstest]
fn firmware_writes_configured_path(fixture: Fixture) {
    fs::write(&fixture.config.fw_path_param, b"").expect("create parameter");

    let (code, stdout, stderr) = fixture.run(&["firmware", "ap"]);

    assert_eq!(code, ExitCode::SUCCESS, "stderr: {stderr}");
    assert_eq!(stdout, "firmware path set to /vendor/firmware/fw_ap.bin\n");
    let written = fs::read(&fixture.config.fw_path_param).expect("read parameter");
    assert_eq!(written, b"/vendor/firmware/fw_ap.bin\0");
}

#[rstest]
fn firmware_without_override_is_reported(fixture: Fixture) {
    let (code, stdout, _) = fixture.run(&["firmware", "p2p"]);

    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(stdout, "no firmware override for p2p\n");
}

#[rstest]
fn unknown_firmware_mode_is_a_usage_error(fixture: Fixture) {
    let (code, stdout, stderr) = fixture.run(&["firmware", "mesh"]);

    assert_eq!(code, ExitCode::FAILURE);
    assert!(stdout.is_empty());
    assert!(stderr.contains("unknown firmware mode 'mesh'"), "stderr: {stderr}");
}

#[rstest]
fn help_goes_to_stdout(fixture: Fixture) {
    let (code, stdout, stderr) = fixture.run(&["--help"]);

    assert_eq!(code, ExitCode::SUCCESS);
    assert!(stdout.contains("Usage: nanowifi"), "stdout: {stdout}");
    assert!(stderr.is_empty());
}

#[test]
fn prepared_arguments_drop_config_flags() {
    let args: Vec<OsString> = ["nanowifi", "--interface", "wlan1", "status"]
        .into_iter()
        .map(OsString::from)
        .collect();
    let split = split_config_arguments(&args);

    let prepared = prepare_cli_arguments(&args, &split);

    assert_eq!(
        prepared,
        vec![OsString::from("nanowifi"), OsString::from("status")]
    );
}

#[test]
fn malformed_config_file_fails_before_running_the_command() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("nanowifi.toml");
    fs::write(&path, "log_format = \"verbose\"\n").expect("write configuration");
    let args = vec![
        OsString::from("nanowifi"),
        OsString::from("--config-path"),
        path.into_os_string(),
        OsString::from("status"),
    ];
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let code = run_with(
        args,
        &mut stdout,
        &mut stderr,
        &OrthoConfigLoader,
        &MemoryFactory,
    );

    assert_eq!(code, ExitCode::FAILURE);
    assert!(stdout.is_empty());
    let stderr = String::from_utf8(stderr).expect("utf8 stderr");
    assert!(
        stderr.contains("failed to load configuration"),
        "stderr: {stderr}"
    );
}
