//! Provisioning of the files the supplicant needs before it can start.

use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use camino::{Utf8Path, Utf8PathBuf};
use nanowifi_config::Config;
use nix::errno::Errno;
use nix::unistd::{AccessFlags, Gid, Uid, access, chown};
use thiserror::Error;
use tracing::{debug, error, info};

const PROVISION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::provision");

/// Fixed seed written to a freshly created entropy file.
pub const ENTROPY_SEED: [u8; 21] = [
    0x02, 0x11, 0xbe, 0x33, 0x43, 0x35, 0x68, 0x47, 0x84, 0x99, 0xa9, 0x2b, 0x1c, 0xd3, 0xee,
    0xff, 0xf1, 0xe2, 0xf3, 0xf4, 0xf5,
];

/// Mode applied to an existing entropy file the process cannot access.
const ENTROPY_REPAIR_MODE: u32 = 0o660;

/// Errors raised while provisioning supplicant files.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The file exists but cannot be read and written.
    #[error("cannot access '{path}': {source}")]
    Access {
        /// File that was probed.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The template could not be opened.
    #[error("cannot open template '{path}': {source}")]
    OpenTemplate {
        /// Template path.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The destination could not be created.
    #[error("cannot create '{path}': {source}")]
    Create {
        /// Destination path.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Copying or writing contents failed.
    #[error("cannot write '{path}': {source}")]
    Write {
        /// Destination path.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Fewer bytes than expected were written.
    #[error("short write to '{path}': {written} of {expected} bytes")]
    ShortWrite {
        /// Destination path.
        path: Utf8PathBuf,
        /// Bytes accepted.
        written: usize,
        /// Bytes offered.
        expected: usize,
    },
    /// Permission bits could not be applied.
    #[error("cannot change mode of '{path}' to {mode:o}: {source}")]
    Permissions {
        /// Destination path.
        path: Utf8PathBuf,
        /// Requested mode.
        mode: u32,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Ownership could not be applied.
    #[error("cannot change owner of '{path}' to {uid}:{gid}: {source}")]
    Ownership {
        /// Destination path.
        path: Utf8PathBuf,
        /// Requested owner.
        uid: u32,
        /// Requested group.
        gid: u32,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

/// Owner, group and mode applied to provisioned files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOwnership {
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Permission bits.
    pub mode: u32,
}

/// Creates the supplicant configuration and entropy files on demand.
#[derive(Debug, Clone)]
pub struct Provisioner {
    config_file: Utf8PathBuf,
    template: Utf8PathBuf,
    entropy_file: Utf8PathBuf,
    ownership: FileOwnership,
}

impl Provisioner {
    /// Builds a provisioner from the configured paths and ownership.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            config_file: config.config_file.clone(),
            template: config.config_template.clone(),
            entropy_file: config.entropy_file.clone(),
            ownership: FileOwnership {
                uid: config.file_uid,
                gid: config.file_gid,
                mode: config.file_mode,
            },
        }
    }

    /// Ensures the supplicant configuration file exists and is accessible.
    ///
    /// A missing file is created from the template with the configured mode
    /// and ownership. An existing file is never modified.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the file exists but is inaccessible,
    /// or when creating it fails. A partially created file is removed.
    pub fn ensure_config(&self) -> Result<(), ProvisionError> {
        let path = &self.config_file;
        match access(path.as_std_path(), AccessFlags::R_OK | AccessFlags::W_OK) {
            Ok(()) => return Ok(()),
            Err(Errno::ENOENT) => {}
            Err(errno) => {
                error!(
                    target: PROVISION_TARGET,
                    path = %path,
                    error = %errno,
                    "cannot access supplicant configuration"
                );
                return Err(ProvisionError::Access {
                    path: path.clone(),
                    source: errno.into(),
                });
            }
        }

        let mut template =
            File::open(&self.template).map_err(|source| ProvisionError::OpenTemplate {
                path: self.template.clone(),
                source,
            })?;
        let mut destination = self.create(path)?;
        let guard = PartialFile::new(path);
        io::copy(&mut template, &mut destination).map_err(|source| ProvisionError::Write {
            path: path.clone(),
            source,
        })?;
        drop(destination);
        self.apply_ownership(path)?;
        guard.keep();
        info!(
            target: PROVISION_TARGET,
            path = %path,
            template = %self.template,
            "created supplicant configuration from template"
        );
        Ok(())
    }

    /// Ensures the entropy seed file exists.
    ///
    /// An existing but inaccessible file has its mode repaired instead of
    /// being rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the file cannot be created, written or
    /// repaired. A partially created file is removed.
    pub fn ensure_entropy_file(&self) -> Result<(), ProvisionError> {
        let path = &self.entropy_file;
        match access(path.as_std_path(), AccessFlags::R_OK | AccessFlags::W_OK) {
            Ok(()) => return Ok(()),
            Err(Errno::EACCES) => {
                debug!(target: PROVISION_TARGET, path = %path, "repairing entropy file mode");
                return set_mode(path, ENTROPY_REPAIR_MODE);
            }
            Err(_) => {}
        }

        let mut file = self.create(path)?;
        let guard = PartialFile::new(path);
        let written = file
            .write(&ENTROPY_SEED)
            .map_err(|source| ProvisionError::Write {
                path: path.clone(),
                source,
            })?;
        if written != ENTROPY_SEED.len() {
            return Err(ProvisionError::ShortWrite {
                path: path.clone(),
                written,
                expected: ENTROPY_SEED.len(),
            });
        }
        drop(file);
        self.apply_ownership(path)?;
        guard.keep();
        info!(target: PROVISION_TARGET, path = %path, "created entropy file");
        Ok(())
    }

    fn create(&self, path: &Utf8Path) -> Result<File, ProvisionError> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(self.ownership.mode)
            .open(path)
            .map_err(|source| {
                error!(
                    target: PROVISION_TARGET,
                    path = %path,
                    error = %source,
                    "cannot create file"
                );
                ProvisionError::Create {
                    path: path.to_path_buf(),
                    source,
                }
            })
    }

    fn apply_ownership(&self, path: &Utf8Path) -> Result<(), ProvisionError> {
        let FileOwnership { uid, gid, mode } = self.ownership;
        set_mode(path, mode)?;
        chown(
            path.as_std_path(),
            Some(Uid::from_raw(uid)),
            Some(Gid::from_raw(gid)),
        )
        .map_err(|errno| ProvisionError::Ownership {
            path: path.to_path_buf(),
            uid,
            gid,
            source: errno.into(),
        })
    }
}

fn set_mode(path: &Utf8Path, mode: u32) -> Result<(), ProvisionError> {
    fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|source| {
        ProvisionError::Permissions {
            path: path.to_path_buf(),
            mode,
            source,
        }
    })
}

/// Removes a newly created file unless provisioning completes.
struct PartialFile<'a> {
    path: &'a Utf8Path,
    armed: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Utf8Path) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Err(error) = fs::remove_file(self.path)
        {
            debug!(
                target: PROVISION_TARGET,
                path = %self.path,
                error = %error,
                "failed to remove partial file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::tests::support::Rig;

    const TEMPLATE: &str = "ctrl_interface=wlan0\nupdate_config=1\n";

    #[fixture]
    fn rig() -> Rig {
        Rig::new()
    }

    fn mode_of(path: &Utf8Path) -> u32 {
        fs::metadata(path).expect("metadata").permissions().mode() & 0o777
    }

    #[rstest]
    fn config_is_copied_from_template(rig: Rig) {
        fs::write(&rig.config.config_template, TEMPLATE).expect("write template");
        let provisioner = Provisioner::from_config(&rig.config);

        provisioner.ensure_config().expect("config provisioned");

        let contents = fs::read_to_string(&rig.config.config_file).expect("read config");
        assert_eq!(contents, TEMPLATE);
        assert_eq!(mode_of(&rig.config.config_file), 0o660);
    }

    #[rstest]
    fn existing_config_is_left_untouched(rig: Rig) {
        fs::write(&rig.config.config_template, TEMPLATE).expect("write template");
        fs::write(&rig.config.config_file, "network={}\n").expect("write config");
        let provisioner = Provisioner::from_config(&rig.config);

        provisioner.ensure_config().expect("config accepted");

        let contents = fs::read_to_string(&rig.config.config_file).expect("read config");
        assert_eq!(contents, "network={}\n");
    }

    #[rstest]
    fn missing_template_fails_without_creating_config(rig: Rig) {
        let provisioner = Provisioner::from_config(&rig.config);

        let error = provisioner.ensure_config().expect_err("template missing");

        assert!(matches!(error, ProvisionError::OpenTemplate { .. }));
        assert!(!rig.config.config_file.as_std_path().exists());
    }

    #[rstest]
    fn ownership_failure_removes_partial_config(mut rig: Rig) {
        fs::write(&rig.config.config_template, TEMPLATE).expect("write template");
        // An unprivileged process cannot give files away to root. A
        // privileged one can, so only assert cleanup when chown fails.
        rig.config.file_uid = 0;
        rig.config.file_gid = 0;
        let provisioner = Provisioner::from_config(&rig.config);

        match provisioner.ensure_config() {
            Ok(()) => assert!(rig.config.config_file.as_std_path().exists()),
            Err(error) => {
                assert!(matches!(error, ProvisionError::Ownership { .. }));
                assert!(!rig.config.config_file.as_std_path().exists());
            }
        }
    }

    #[rstest]
    fn missing_config_directory_reports_create_failure(mut rig: Rig) {
        fs::write(&rig.config.config_template, TEMPLATE).expect("write template");
        rig.config.config_file = rig.root().join("absent").join("wpa_supplicant.conf");
        let provisioner = Provisioner::from_config(&rig.config);

        let error = provisioner.ensure_config().expect_err("directory missing");

        assert!(matches!(error, ProvisionError::Create { .. }));
    }

    #[rstest]
    fn entropy_file_is_seeded(rig: Rig) {
        let provisioner = Provisioner::from_config(&rig.config);

        provisioner.ensure_entropy_file().expect("entropy provisioned");

        let contents = fs::read(&rig.config.entropy_file).expect("read entropy");
        assert_eq!(contents, ENTROPY_SEED);
        assert_eq!(mode_of(&rig.config.entropy_file), 0o660);
    }

    #[rstest]
    fn existing_entropy_file_is_kept(rig: Rig) {
        fs::write(&rig.config.entropy_file, b"seed").expect("write entropy");
        let provisioner = Provisioner::from_config(&rig.config);

        provisioner.ensure_entropy_file().expect("entropy accepted");

        assert_eq!(fs::read(&rig.config.entropy_file).expect("read"), b"seed");
    }
}
