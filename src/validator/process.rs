//! Scoped ownership of a child process group.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Kills the process group led by `pid` when dropped.
///
/// The child must have been spawned as the leader of a new process group
/// (`Command::process_group(0)`), so the group id equals its pid. Signal the
/// group only while the leader is unreaped: once it has been waited on, the
/// id may belong to an unrelated group.
#[derive(Debug)]
pub struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    pub fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    /// Ask the whole group to exit with SIGTERM. The guard stays armed.
    pub fn terminate(&self) {
        if let Some(pgid) = self.pgid {
            signal_group(pgid, GroupSignal::Terminate);
        }
    }

    /// SIGKILL the whole group. Later calls and the drop are no-ops.
    pub fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            signal_group(pgid, GroupSignal::Kill);
        }
    }

    /// Give up ownership without signalling.
    pub fn release(&mut self) {
        self.pgid = None;
    }

    pub fn pgid(&self) -> Option<u32> {
        self.pgid
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: GroupSignal) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    let signal = match signal {
        GroupSignal::Terminate => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    // ESRCH just means every member already exited.
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => debug!(pgid, signal = ?signal, "Signalled process group"),
        Err(e) => debug!(pgid, signal = ?signal, error = %e, "killpg returned an error"),
    }
}

#[cfg(not(unix))]
fn signal_group(pgid: u32, signal: GroupSignal) {
    debug!(pgid, ?signal, "Process groups are not supported on this platform");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_drop_kills_running_group() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; sleep 30")
            .process_group(0)
            .spawn()
            .unwrap();

        {
            let _guard = ProcessGroupGuard::new(child.id());
        }

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("child should exit after SIGKILL")
            .unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_terminate_keeps_guard_armed() {
        let mut child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();

        let mut guard = ProcessGroupGuard::new(child.id());
        guard.terminate();
        assert!(guard.pgid().is_some());
        guard.release();

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("child should exit after SIGTERM")
            .unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_kill_and_release_disarm() {
        let mut guard = ProcessGroupGuard::new(None);
        guard.kill();
        guard.kill();
        assert!(guard.pgid().is_none());

        let mut guard = ProcessGroupGuard::new(Some(u32::MAX));
        guard.release();
        assert!(guard.pgid().is_none());
    }
}
