//! Test doubles for the platform collaborators.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use nanowifi_config::{Config, ControlEndpoint};
use tempfile::TempDir;

use crate::control::{ControlConnection, ControlTransport, TransportError};
use crate::platform::{PlatformError, ServiceManager, Sleeper};

type SleepHook = Box<dyn FnMut(usize) + Send>;
type Reaction = Box<dyn Fn() + Send + Sync>;

/// Sleeper that records requested delays instead of blocking.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    yields: AtomicUsize,
    hook: Mutex<Option<SleepHook>>,
}

impl RecordingSleeper {
    /// Installs a callback run after each sleep with the running sleep count.
    pub fn on_sleep(&self, hook: impl FnMut(usize) + Send + 'static) {
        *self.hook.lock().expect("hook lock") = Some(Box::new(hook));
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("sleeps lock").clone()
    }

    pub fn yields(&self) -> usize {
        self.yields.load(Ordering::SeqCst)
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        let count = {
            let mut sleeps = self.sleeps.lock().expect("sleeps lock");
            sleeps.push(duration);
            sleeps.len()
        };
        if let Some(hook) = self.hook.lock().expect("hook lock").as_mut() {
            hook(count);
        }
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
    }
}

/// Service request captured by [`RecordingServices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceRequest {
    Start(String),
    Stop(String),
}

/// Service manager that records requests and runs scripted reactions.
#[derive(Default)]
pub struct RecordingServices {
    requests: Mutex<Vec<ServiceRequest>>,
    on_start: Mutex<HashMap<String, Reaction>>,
    on_stop: Mutex<HashMap<String, Reaction>>,
}

impl RecordingServices {
    pub fn on_start(&self, service: &str, reaction: impl Fn() + Send + Sync + 'static) {
        self.on_start
            .lock()
            .expect("reaction lock")
            .insert(service.to_owned(), Box::new(reaction));
    }

    pub fn on_stop(&self, service: &str, reaction: impl Fn() + Send + Sync + 'static) {
        self.on_stop
            .lock()
            .expect("reaction lock")
            .insert(service.to_owned(), Box::new(reaction));
    }

    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                ServiceRequest::Start(name) => Some(name),
                ServiceRequest::Stop(_) => None,
            })
            .collect()
    }
}

impl ServiceManager for RecordingServices {
    fn request_start(&self, name: &str) -> Result<(), PlatformError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(ServiceRequest::Start(name.to_owned()));
        if let Some(reaction) = self.on_start.lock().expect("reaction lock").get(name) {
            reaction();
        }
        Ok(())
    }

    fn request_stop(&self, name: &str) -> Result<(), PlatformError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(ServiceRequest::Stop(name.to_owned()));
        if let Some(reaction) = self.on_stop.lock().expect("reaction lock").get(name) {
            reaction();
        }
        Ok(())
    }
}

/// Temporary filesystem layout with a configuration pointing into it.
pub struct Rig {
    _dir: TempDir,
    root: Utf8PathBuf,
    pub config: Config,
}

impl Rig {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let config = Config {
            status_path: root.join("nano_driver_status"),
            liveness_root: root.join("proc"),
            ctrl_iface_dir: root.join("ctrl"),
            reserved_socket_dir: root.join("reserved"),
            client_socket_dir: root.join("sockets"),
            config_template: root.join("template.conf"),
            config_file: root.join("wpa_supplicant.conf"),
            entropy_file: root.join("entropy.bin"),
            fw_path_param: root.join("fwpath"),
            file_uid: nix::unistd::getuid().as_raw(),
            file_gid: nix::unistd::getgid().as_raw(),
            ..Config::default()
        };
        Self {
            _dir: dir,
            root,
            config,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn shared_config(&self) -> Arc<Config> {
        Arc::new(self.config.clone())
    }

    pub fn write_status(&self, contents: &str) {
        write_status_at(&self.config.status_path, contents);
    }

    pub fn status_path(&self) -> Utf8PathBuf {
        self.config.status_path.clone()
    }

    pub fn liveness_path(&self) -> Utf8PathBuf {
        self.config.liveness_path(&self.config.interface)
    }

    pub fn create_liveness(&self) {
        create_liveness_at(&self.liveness_path());
    }
}

pub fn write_status_at(path: &Utf8Path, contents: &str) {
    fs::write(path, contents).expect("write status file");
}

pub fn create_liveness_at(path: &Utf8Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create liveness directory");
    }
    fs::write(path, "up\n").expect("write liveness indicator");
}

/// Shared script and capture state for [`FakeTransport`] connections.
#[derive(Default)]
pub struct FakeWire {
    pub replies: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
    pub events: Mutex<VecDeque<io::Result<Vec<u8>>>>,
    pub sent: Mutex<Vec<String>>,
    pub attach_reply: Mutex<Option<Vec<u8>>>,
    pub closed: AtomicUsize,
}

impl FakeWire {
    pub fn push_reply(&self, reply: &str) {
        self.replies
            .lock()
            .expect("replies lock")
            .push_back(Ok(reply.as_bytes().to_vec()));
    }

    pub fn push_failure(&self, error: TransportError) {
        self.replies.lock().expect("replies lock").push_back(Err(error));
    }

    pub fn push_event(&self, event: &[u8]) {
        self.events
            .lock()
            .expect("events lock")
            .push_back(Ok(event.to_vec()));
    }

    pub fn push_event_error(&self) {
        self.events
            .lock()
            .expect("events lock")
            .push_back(Err(io::Error::from(io::ErrorKind::ConnectionReset)));
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Transport handing out scripted in-memory connections.
#[derive(Default)]
pub struct FakeTransport {
    pub wire: Arc<FakeWire>,
    pub refuse_opens: AtomicUsize,
    pub opens: Mutex<Vec<ControlEndpoint>>,
    pub cleanups: AtomicUsize,
}

impl FakeTransport {
    /// Makes the next `count` open attempts fail.
    pub fn refuse_next(&self, count: usize) {
        self.refuse_opens.store(count, Ordering::SeqCst);
    }

    pub fn opens(&self) -> Vec<ControlEndpoint> {
        self.opens.lock().expect("opens lock").clone()
    }
}

impl ControlTransport for FakeTransport {
    fn open(&self, endpoint: &ControlEndpoint) -> io::Result<Box<dyn ControlConnection>> {
        self.opens.lock().expect("opens lock").push(endpoint.clone());
        let refused = self
            .refuse_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        Ok(Box::new(FakeConnection {
            wire: Arc::clone(&self.wire),
        }))
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeConnection {
    wire: Arc<FakeWire>,
}

impl ControlConnection for FakeConnection {
    fn request(&mut self, command: &[u8], reply: &mut [u8]) -> Result<usize, TransportError> {
        self.wire
            .sent
            .lock()
            .expect("sent lock")
            .push(String::from_utf8_lossy(command).into_owned());
        let scripted = self
            .wire
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Ok(b"OK\n".to_vec()))?;
        Ok(copy_into(&scripted, reply))
    }

    fn attach(&mut self) -> Result<(), TransportError> {
        let reply = self
            .wire
            .attach_reply
            .lock()
            .expect("attach lock")
            .clone()
            .unwrap_or_else(|| b"OK\n".to_vec());
        if reply == b"OK\n" {
            Ok(())
        } else {
            Err(TransportError::Refused {
                reply: String::from_utf8_lossy(&reply).into_owned(),
            })
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let next = self
            .wire
            .events
            .lock()
            .expect("events lock")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))?;
        Ok(copy_into(&next, buf))
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.wire.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn copy_into(source: &[u8], target: &mut [u8]) -> usize {
    let len = source.len().min(target.len());
    target[..len].copy_from_slice(&source[..len]);
    len
}
