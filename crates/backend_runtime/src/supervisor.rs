use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::artifacts::ArtifactStore;
use crate::error::{ExtractError, SupervisorError};
use crate::extract::RuntimeExtractor;

/// Local port the backend binds its streaming endpoint to.
pub const DEFAULT_BACKEND_PORT: u16 = 8000;

#[cfg(unix)]
const INTERPRETER_RELATIVE: &str = "python/bin/python3";
#[cfg(not(unix))]
const INTERPRETER_RELATIVE: &str = "python/python.exe";

const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(100);
const GRACEFUL_STOP_WINDOW: Duration = Duration::from_secs(5);

/// Resolved launch triple for the backend process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Human-readable provenance shown in diagnostics.
    pub description: String,
}

/// Yields the command/args/cwd triple the supervisor should spawn.
///
/// The supervisor is agnostic to how the triple was produced; development
/// and packaged profiles are just different resolvers.
pub trait LaunchResolver: Send + Sync + 'static {
    fn resolve(&self) -> Result<LaunchPlan, SupervisorError>;
}

/// Development profile: a fixed local interpreter and source tree.
#[derive(Debug, Clone)]
pub struct DevRuntimeResolver {
    pub interpreter: PathBuf,
    pub source_root: PathBuf,
    pub port: u16,
}

impl DevRuntimeResolver {
    pub fn new(interpreter: impl Into<PathBuf>, source_root: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            source_root: source_root.into(),
            port: DEFAULT_BACKEND_PORT,
        }
    }
}

impl LaunchResolver for DevRuntimeResolver {
    fn resolve(&self) -> Result<LaunchPlan, SupervisorError> {
        Ok(LaunchPlan {
            command: self.interpreter.clone(),
            args: backend_args(self.port),
            cwd: self.source_root.clone(),
            description: "development runtime".to_string(),
        })
    }
}

/// Packaged profile: extract the bundled archive, then launch the
/// interpreter inside the extracted tree.
pub struct PackagedRuntimeResolver {
    store: ArtifactStore,
    extractor: Arc<RuntimeExtractor>,
    target_version: String,
    port: u16,
}

impl PackagedRuntimeResolver {
    pub fn new(
        store: ArtifactStore,
        extractor: Arc<RuntimeExtractor>,
        target_version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            extractor,
            target_version: target_version.into(),
            port: DEFAULT_BACKEND_PORT,
        }
    }
}

impl LaunchResolver for PackagedRuntimeResolver {
    fn resolve(&self) -> Result<LaunchPlan, SupervisorError> {
        let archive = self
            .store
            .locate_archive()
            .ok_or(ExtractError::ArchiveNotBundled)?;
        let runtime_root = self.store.runtime_root();
        let extracted =
            self.extractor
                .ensure_extracted(&archive, &runtime_root, &self.target_version)?;

        Ok(LaunchPlan {
            command: extracted.join(INTERPRETER_RELATIVE),
            args: backend_args(self.port),
            cwd: extracted,
            description: "packaged runtime".to_string(),
        })
    }
}

fn backend_args(port: u16) -> Vec<String> {
    vec![
        "-m".to_string(),
        "uvicorn".to_string(),
        "app.app:app".to_string(),
        "--host".to_string(),
        "127.0.0.1".to_string(),
        "--port".to_string(),
        port.to_string(),
    ]
}

/// Observable lifecycle of the supervised backend process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running {
        pid: u32,
    },
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
        /// True when the supervisor itself asked the child to terminate.
        requested: bool,
    },
    Failed {
        reason: String,
    },
}

impl ProcessState {
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Maps an unrequested abnormal exit to the crash error, if any.
    ///
    /// Crashes are reported, never auto-restarted; a fresh `start()` is a
    /// deliberate caller decision.
    #[must_use]
    pub fn crash(&self) -> Option<SupervisorError> {
        match self {
            Self::Exited {
                code,
                signal,
                requested: false,
            } if *code != Some(0) => Some(SupervisorError::BackendCrashed {
                code: *code,
                signal: *signal,
            }),
            _ => None,
        }
    }
}

/// Identity of a successfully started backend process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHandle {
    pub pid: u32,
    pub description: String,
}

#[derive(Debug)]
struct SupervisorInner {
    child: Option<Child>,
    state: ProcessState,
    description: String,
    stop_requested: bool,
}

/// Exclusive owner of the backend child process.
///
/// At most one child is alive per supervisor; `start()` calls are
/// coalesced and `stop()` is idempotent. Dropping the supervisor
/// terminates a running child, and [`crate::install_shutdown_guard`]
/// extends the same guarantee to SIGINT/SIGTERM delivery.
pub struct ProcessSupervisor {
    resolver: Box<dyn LaunchResolver>,
    inner: Arc<Mutex<SupervisorInner>>,
    start_gate: Mutex<()>,
}

impl ProcessSupervisor {
    pub fn new(resolver: impl LaunchResolver) -> Self {
        Self {
            resolver: Box::new(resolver),
            inner: Arc::new(Mutex::new(SupervisorInner {
                child: None,
                state: ProcessState::NotStarted,
                description: String::new(),
                stop_requested: false,
            })),
            start_gate: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn state(&self) -> ProcessState {
        lock_unpoisoned(&self.inner).state.clone()
    }

    /// Starts the backend, or returns the existing handle when already
    /// running. Concurrent callers are serialized so exactly one child is
    /// ever spawned.
    pub fn start(&self) -> Result<BackendHandle, SupervisorError> {
        let _gate = lock_unpoisoned(&self.start_gate);

        {
            let inner = lock_unpoisoned(&self.inner);
            if let ProcessState::Running { pid } = inner.state {
                if inner.child.is_some() {
                    return Ok(BackendHandle {
                        pid,
                        description: inner.description.clone(),
                    });
                }
            }
        }

        let plan = self.resolver.resolve()?;
        if !plan.command.is_file() {
            return Err(SupervisorError::BackendUnavailable { path: plan.command });
        }

        log::info!(
            "starting backend ({}): {} {:?}",
            plan.description,
            plan.command.display(),
            plan.args
        );

        let child = match Command::new(&plan.command)
            .args(&plan.args)
            .current_dir(&plan.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                let error = SupervisorError::Spawn {
                    command: plan.command,
                    source,
                };
                lock_unpoisoned(&self.inner).state = ProcessState::Failed {
                    reason: error.to_string(),
                };
                return Err(error);
            }
        };

        let pid = child.id();
        {
            let mut inner = lock_unpoisoned(&self.inner);
            inner.child = Some(child);
            inner.state = ProcessState::Running { pid };
            inner.description = plan.description.clone();
            inner.stop_requested = false;
        }
        self.spawn_monitor(pid);

        Ok(BackendHandle {
            pid,
            description: plan.description,
        })
    }

    /// Terminates a running child: SIGTERM, a bounded graceful window,
    /// then SIGKILL. Safe to call at any time, from any state.
    pub fn stop(&self) {
        let mut inner = lock_unpoisoned(&self.inner);
        let Some(mut child) = inner.child.take() else {
            return;
        };
        inner.stop_requested = true;

        let pid = child.id();
        log::info!("stopping backend (pid={pid})");
        terminate(&mut child);

        let status = match child.wait_timeout(GRACEFUL_STOP_WINDOW) {
            Ok(Some(status)) => Some(status),
            Ok(None) => {
                log::warn!("backend did not exit within the graceful window; killing pid={pid}");
                let _ = child.kill();
                child.wait().ok()
            }
            Err(_) => {
                let _ = child.kill();
                child.wait().ok()
            }
        };

        inner.state = match status {
            Some(status) => ProcessState::Exited {
                code: status.code(),
                signal: exit_signal(&status),
                requested: true,
            },
            None => ProcessState::Exited {
                code: None,
                signal: None,
                requested: true,
            },
        };
    }

    fn spawn_monitor(&self, pid: u32) {
        let inner = Arc::clone(&self.inner);
        let _ = thread::Builder::new()
            .name(format!("backend-monitor-{pid}"))
            .spawn(move || monitor_child(&inner, pid));
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_child(inner: &Arc<Mutex<SupervisorInner>>, pid: u32) {
    loop {
        {
            let mut guard = lock_unpoisoned(inner);
            let Some(child) = guard.child.as_mut() else {
                // stop() reaped the child first.
                return;
            };
            if child.id() != pid {
                return;
            }
            match child.try_wait() {
                Ok(Some(status)) => {
                    let requested = guard.stop_requested;
                    finalize_exit(&mut guard, status, requested);
                    return;
                }
                Ok(None) => {}
                Err(error) => {
                    log::error!("failed to poll backend process {pid}: {error}");
                    guard.state = ProcessState::Failed {
                        reason: format!("failed to poll backend process: {error}"),
                    };
                    guard.child = None;
                    return;
                }
            }
        }
        thread::sleep(MONITOR_POLL_INTERVAL);
    }
}

fn finalize_exit(guard: &mut MutexGuard<'_, SupervisorInner>, status: ExitStatus, requested: bool) {
    let code = status.code();
    let signal = exit_signal(&status);
    if requested || code == Some(0) {
        log::info!("backend exited (code: {code:?}, signal: {signal:?})");
    } else {
        log::warn!("backend crashed (code: {code:?}, signal: {signal:?})");
    }
    guard.state = ProcessState::Exited {
        code,
        signal,
        requested,
    };
    guard.child = None;
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let result = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    if result != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
