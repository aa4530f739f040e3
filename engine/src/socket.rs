//! Socket activation.
//!
//! The activator binds each declared socket at registration time and
//! watches it for readability without accepting. When a connection
//! arrives it emits an activation event carrying the listening fd; the
//! engine starts the owning process with that fd handed down, and the
//! child calls accept() itself. A connection arriving while the
//! process is already running is left for the process to accept.

use std::collections::HashMap;
use std::net::TcpListener as StdTcpListener;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixListener as StdUnixListener;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::domain::{DomainError, Result, SocketProtocol, SocketSpec};

/// A connection is waiting on a bound socket.
#[derive(Debug, Clone)]
pub struct ActivationEvent {
    /// Name of the process the socket belongs to.
    pub process: String,
    /// The listening descriptor to hand to the child.
    pub fd: RawFd,
}

#[derive(Default)]
pub struct SocketActivator {
    /// process name -> bound listening fd
    bound: Mutex<HashMap<String, RawFd>>,
}

impl SocketActivator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the socket for `process` and spawn its watcher thread.
    /// Binding happens once, when the definition is registered.
    pub fn bind(
        &self,
        process: &str,
        spec: &SocketSpec,
        event_tx: mpsc::UnboundedSender<ActivationEvent>,
    ) -> Result<RawFd> {
        let fd = create_listener(spec)?;
        info!(
            process = %process,
            address = %spec.address,
            protocol = ?spec.protocol,
            fd = fd,
            "socket bound for activation"
        );
        self.lock().insert(process.to_string(), fd);
        spawn_watcher(process.to_string(), fd, event_tx);
        Ok(fd)
    }

    /// The fd bound for a process, if it has an activation socket.
    pub fn fd_for(&self, process: &str) -> Option<RawFd> {
        self.lock().get(process).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RawFd>> {
        match self.bound.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Bind the listener, keep it blocking, and leak it so the fd stays
/// open for the lifetime of the supervisor.
fn create_listener(spec: &SocketSpec) -> Result<RawFd> {
    match spec.protocol {
        SocketProtocol::Tcp => {
            let listener = StdTcpListener::bind(&spec.address).map_err(|e| {
                DomainError::SpawnError(format!(
                    "failed to bind tcp socket {}: {e}",
                    spec.address
                ))
            })?;
            listener.set_nonblocking(false).map_err(|e| {
                DomainError::SpawnError(format!("failed to set blocking mode: {e}"))
            })?;
            let fd = listener.as_raw_fd();
            std::mem::forget(listener);
            Ok(fd)
        }
        SocketProtocol::Unix => {
            // A stale socket file from a previous run blocks the bind.
            let _ = std::fs::remove_file(&spec.address);
            let listener = StdUnixListener::bind(&spec.address).map_err(|e| {
                DomainError::SpawnError(format!(
                    "failed to bind unix socket {}: {e}",
                    spec.address
                ))
            })?;
            listener.set_nonblocking(false).map_err(|e| {
                DomainError::SpawnError(format!("failed to set blocking mode: {e}"))
            })?;
            let fd = listener.as_raw_fd();
            std::mem::forget(listener);
            Ok(fd)
        }
    }
}

/// Watch the fd for readability with select() and report each pending
/// connection. accept() is never called here; the activated child owns
/// the backlog.
fn spawn_watcher(process: String, fd: RawFd, event_tx: mpsc::UnboundedSender<ActivationEvent>) {
    std::thread::spawn(move || {
        use std::mem::MaybeUninit;
        loop {
            unsafe {
                let mut readfds: libc::fd_set = MaybeUninit::zeroed().assume_init();
                libc::FD_ZERO(&mut readfds);
                libc::FD_SET(fd, &mut readfds);

                let result = libc::select(
                    fd + 1,
                    &mut readfds,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                );

                if result > 0 && libc::FD_ISSET(fd, &readfds) {
                    debug!(process = %process, fd = fd, "connection waiting, requesting activation");
                    if event_tx
                        .send(ActivationEvent {
                            process: process.clone(),
                            fd,
                        })
                        .is_err()
                    {
                        return;
                    }
                    // Give the activated child time to call accept()
                    // before the fd reads as ready again.
                    std::thread::sleep(std::time::Duration::from_millis(100));
                } else if result == -1 {
                    let err = std::io::Error::last_os_error();
                    error!(process = %process, fd = fd, error = %err, "select() failed");
                    return;
                }
            }
        }
    });
}
