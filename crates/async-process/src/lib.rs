pub use std::process::Command;

#[cfg(unix)]
use std::os::fd::OwnedFd as OwnedImpl;
#[cfg(windows)]
use std::os::fd::OwnedHandle as OwnedImpl;

pub struct Child {
    inner: std::process::Child,
    kill_on_drop: bool,

    pub stdin: Option<ChildStdio>,
    pub stdout: Option<ChildStdio>,
    pub stderr: Option<ChildStdio>,
}

pub type ChildStdio = tokio::fs::File;

impl From<std::process::Child> for Child {
    fn from(mut inner: std::process::Child) -> Self {
        let stdin = map_stdio(inner.stdin.take());
        let stdout = map_stdio(inner.stdout.take());
        let stderr = map_stdio(inner.stderr.take());

        Self {
            inner,
            kill_on_drop: false,
            stdin,
            stdout,
            stderr,
        }
    }
}

/// Spawns `cmd` with piped stdout/stderr (and stdin, if `cmd` requested it),
/// off of the blocking thread pool so that `fork`/`exec` never blocks the
/// tokio reactor.
pub async fn spawn(mut cmd: Command) -> std::io::Result<Child> {
    let handle = tokio::runtime::Handle::current().spawn_blocking(move || cmd.spawn());
    handle.await.expect("spawn does not panic").map(Child::from)
}

impl Child {
    pub fn kill_on_drop(&mut self, v: bool) {
        self.kill_on_drop = v;
    }

    pub fn id(&self) -> u32 {
        self.inner.id()
    }

    /// Sends SIGTERM (Unix) or terminates (Windows). Use `wait` with a
    /// timeout to observe whether the process actually exited; escalate to
    /// `kill` if it doesn't.
    #[cfg(unix)]
    pub fn terminate(&self) -> std::io::Result<()> {
        let pid = self.inner.id() as libc::pid_t;
        if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    pub fn terminate(&mut self) -> std::io::Result<()> {
        self.inner.kill()
    }

    pub fn kill(&mut self) -> std::io::Result<()> {
        self.inner.kill()
    }

    pub async fn wait(mut self) -> std::io::Result<std::process::ExitStatus> {
        let handle = tokio::runtime::Handle::current().spawn_blocking(move || self.inner.wait());
        handle.await.expect("wait does not panic")
    }

    pub fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        self.inner.try_wait()
    }
}

impl Drop for Child {
    fn drop(&mut self) {
        if self.kill_on_drop {
            _ = self.inner.kill()
        }
    }
}

fn map_stdio<F>(f: Option<F>) -> Option<ChildStdio>
where
    F: Into<OwnedImpl>,
{
    let f: Option<OwnedImpl> = f.map(Into::into);
    let f: Option<std::fs::File> = f.map(Into::into);
    f.map(Into::into)
}
