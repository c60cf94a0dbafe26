//! Process liveness probes and signal delivery.
//!
//! [`ProcessControl`] is the seam between the kill executor and the operating
//! system. [`SystemProcessControl`] talks to the real process table, while
//! [`StubProcessControl`] keeps a scripted table in memory for tests and for
//! deployments that want the kill path wired up without touching real
//! processes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::error::KillError;

// ---------------------------------------------------------------------------
// ProcessControl
// ---------------------------------------------------------------------------

/// Low-level process operations needed by the kill executor.
pub trait ProcessControl: Send + Sync {
    /// Returns true when the process exists.
    ///
    /// A process the caller is not allowed to signal still counts as alive.
    fn is_alive(&self, pid: u32) -> bool;

    /// Sends the graceful termination request (SIGTERM on Unix).
    fn send_graceful(&self, pid: u32) -> Result<(), KillError>;

    /// Sends the non-ignorable kill (SIGKILL on Unix).
    fn send_forceful(&self, pid: u32) -> Result<(), KillError>;

    /// Lists every descendant of `pid` in depth-first discovery order.
    fn list_children(&self, pid: u32) -> Vec<u32>;
}

// ---------------------------------------------------------------------------
// System-backed control
// ---------------------------------------------------------------------------

/// [`ProcessControl`] backed by the host operating system.
///
/// Signals go through `kill(2)` on Unix and `taskkill` elsewhere. The
/// descendant walk reads the full process table through `sysinfo`, so it
/// works the same on every platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessControl;

impl SystemProcessControl {
    /// Creates a system-backed control.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ProcessControl for SystemProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        probe_alive(pid)
    }

    fn send_graceful(&self, pid: u32) -> Result<(), KillError> {
        send_graceful_signal(pid)
    }

    fn send_forceful(&self, pid: u32) -> Result<(), KillError> {
        send_forceful_signal(pid)
    }

    fn list_children(&self, pid: u32) -> Vec<u32> {
        let by_parent = snapshot_process_tree();
        let mut found = Vec::new();
        let mut seen = BTreeSet::from([pid]);
        collect_descendants(&by_parent, pid, &mut found, &mut seen);
        found
    }
}

#[cfg(unix)]
fn probe_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    #[allow(clippy::cast_possible_wrap)]
    let target = Pid::from_raw(pid as i32);
    match kill(target, None) {
        // EPERM means the process exists but belongs to someone else.
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<(), KillError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    #[allow(clippy::cast_possible_wrap)]
    let target = Pid::from_raw(pid as i32);
    match kill(target, signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(KillError::Vanished { pid }),
        Err(Errno::EPERM) => Err(KillError::PermissionDenied { pid }),
        Err(errno) => Err(KillError::Signal {
            pid,
            message: errno.to_string(),
        }),
    }
}

#[cfg(unix)]
fn send_graceful_signal(pid: u32) -> Result<(), KillError> {
    send_signal(pid, nix::sys::signal::Signal::SIGTERM)
}

#[cfg(unix)]
fn send_forceful_signal(pid: u32) -> Result<(), KillError> {
    send_signal(pid, nix::sys::signal::Signal::SIGKILL)
}

#[cfg(not(unix))]
fn probe_alive(pid: u32) -> bool {
    use std::process::Command;

    let filter = format!("PID eq {pid}");
    Command::new("tasklist")
        .args(["/FI", &filter, "/NH"])
        .output()
        .is_ok_and(|output| String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()))
}

#[cfg(not(unix))]
fn send_taskkill(pid: u32, force: bool) -> Result<(), KillError> {
    use std::process::Command;

    let pid_text = pid.to_string();
    let mut args = vec!["/PID", pid_text.as_str()];
    if force {
        args.push("/F");
    }
    let output = Command::new("taskkill")
        .args(&args)
        .output()
        .map_err(|err| KillError::Signal {
            pid,
            message: err.to_string(),
        })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
    if stderr.contains("not found") {
        return Err(KillError::Vanished { pid });
    }
    if stderr.contains("denied") {
        return Err(KillError::PermissionDenied { pid });
    }
    Err(KillError::Signal {
        pid,
        message: stderr.trim().to_owned(),
    })
}

#[cfg(not(unix))]
fn send_graceful_signal(pid: u32) -> Result<(), KillError> {
    send_taskkill(pid, false)
}

#[cfg(not(unix))]
fn send_forceful_signal(pid: u32) -> Result<(), KillError> {
    send_taskkill(pid, true)
}

/// Reads the process table and maps each parent pid to its direct children.
fn snapshot_process_tree() -> BTreeMap<u32, Vec<u32>> {
    use sysinfo::System;

    let mut system = System::new_all();
    system.refresh_all();
    let mut by_parent: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            by_parent.entry(parent.as_u32()).or_default().push(pid.as_u32());
        }
    }
    for children in by_parent.values_mut() {
        children.sort_unstable();
    }
    by_parent
}

/// Walks the child map depth-first, recording descendants in discovery order.
///
/// The `seen` set guards against pid-reuse cycles in a stale snapshot.
fn collect_descendants(
    by_parent: &BTreeMap<u32, Vec<u32>>,
    pid: u32,
    found: &mut Vec<u32>,
    seen: &mut BTreeSet<u32>,
) {
    let Some(children) = by_parent.get(&pid) else {
        return;
    };
    for &child in children {
        if seen.insert(child) {
            found.push(child);
            collect_descendants(by_parent, child, found, seen);
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted control
// ---------------------------------------------------------------------------

/// [`ProcessControl`] over a scripted in-memory process table.
///
/// Processes exit on the graceful signal unless marked stubborn, and die to
/// the forceful one unless marked unkillable. Every signal sent is logged in
/// order so callers can assert on the exact escalation.
#[derive(Debug, Default)]
pub struct StubProcessControl {
    inner: Mutex<StubState>,
}

#[derive(Debug, Default)]
struct StubState {
    alive: BTreeSet<u32>,
    ignores_graceful: BTreeSet<u32>,
    survives_forceful: BTreeSet<u32>,
    denied: BTreeSet<u32>,
    vanishes_on_signal: BTreeSet<u32>,
    children: BTreeMap<u32, Vec<u32>>,
    graceful_log: Vec<u32>,
    forceful_log: Vec<u32>,
}

impl StubProcessControl {
    /// Creates an empty scripted process table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a live process that exits when asked gracefully.
    pub fn spawn(&self, pid: u32) {
        self.with(|state| {
            state.alive.insert(pid);
        });
    }

    /// Adds a live process that ignores the graceful signal but dies to the
    /// forceful one.
    pub fn spawn_stubborn(&self, pid: u32) {
        self.with(|state| {
            state.alive.insert(pid);
            state.ignores_graceful.insert(pid);
        });
    }

    /// Adds a live process that survives every signal.
    pub fn spawn_unkillable(&self, pid: u32) {
        self.with(|state| {
            state.alive.insert(pid);
            state.ignores_graceful.insert(pid);
            state.survives_forceful.insert(pid);
        });
    }

    /// Marks a pid as off-limits to the caller.
    pub fn deny(&self, pid: u32) {
        self.with(|state| {
            state.denied.insert(pid);
        });
    }

    /// Makes the process disappear the moment any signal is aimed at it.
    pub fn vanish_on_signal(&self, pid: u32) {
        self.with(|state| {
            state.vanishes_on_signal.insert(pid);
        });
    }

    /// Declares the direct children of a process.
    pub fn set_children(&self, pid: u32, children: Vec<u32>) {
        self.with(|state| {
            state.children.insert(pid, children);
        });
    }

    /// Pids that received the graceful signal, in send order.
    #[must_use]
    pub fn graceful_log(&self) -> Vec<u32> {
        self.with(|state| state.graceful_log.clone())
    }

    /// Pids that received the forceful signal, in send order.
    #[must_use]
    pub fn forceful_log(&self) -> Vec<u32> {
        self.with(|state| state.forceful_log.clone())
    }

    fn with<T>(&self, apply: impl FnOnce(&mut StubState) -> T) -> T {
        match self.inner.lock() {
            Ok(mut state) => apply(&mut state),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

impl ProcessControl for StubProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        self.with(|state| state.alive.contains(&pid))
    }

    fn send_graceful(&self, pid: u32) -> Result<(), KillError> {
        self.with(|state| {
            if state.denied.contains(&pid) {
                return Err(KillError::PermissionDenied { pid });
            }
            if !state.alive.contains(&pid) {
                return Err(KillError::Vanished { pid });
            }
            state.graceful_log.push(pid);
            if state.vanishes_on_signal.contains(&pid) {
                state.alive.remove(&pid);
                return Err(KillError::Vanished { pid });
            }
            if !state.ignores_graceful.contains(&pid) {
                state.alive.remove(&pid);
            }
            Ok(())
        })
    }

    fn send_forceful(&self, pid: u32) -> Result<(), KillError> {
        self.with(|state| {
            if state.denied.contains(&pid) {
                return Err(KillError::PermissionDenied { pid });
            }
            if !state.alive.contains(&pid) {
                return Err(KillError::Vanished { pid });
            }
            state.forceful_log.push(pid);
            if !state.survives_forceful.contains(&pid) {
                state.alive.remove(&pid);
            }
            Ok(())
        })
    }

    fn list_children(&self, pid: u32) -> Vec<u32> {
        self.with(|state| {
            let mut found = Vec::new();
            let mut seen = BTreeSet::from([pid]);
            collect_descendants(&state.children, pid, &mut found, &mut seen);
            found
        })
    }
}
