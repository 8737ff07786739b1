//! Thread-per-connection dispatcher
//!
//! The accept loop waits in `poll(2)` on the listener and the shutdown pipe.
//! Every accepted socket is moved to its own worker thread, which runs the
//! handshake and the exchange on blocking I/O and then closes it.

use super::connection::Accepted;
use super::shutdown::Shutdown;
use super::Shared;
use crate::net::Listener;
use std::io;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Serve until shutdown is triggered, then join every worker
pub(crate) fn run(listener: Listener, shutdown: &Shutdown, shared: Arc<Shared>) -> io::Result<()> {
    listener.set_nonblocking(true)?;
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown.is_triggered() {
        let mut fds = [
            libc::pollfd {
                fd: listener.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: shutdown.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        let result = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        if fds[1].revents != 0 {
            shutdown.drain();
            continue;
        }

        if fds[0].revents != 0 {
            accept_all(&listener, &shared, &mut workers);
        }
        workers.retain(|worker| !worker.is_finished());
    }

    tracing::info!(
        address = %listener.local_addr(),
        in_flight = workers.len(),
        "Stopped accepting"
    );
    drop(listener);

    for worker in workers {
        if worker.join().is_err() {
            tracing::error!("Connection worker panicked");
        }
    }

    tracing::info!("Workers joined");
    Ok(())
}

fn accept_all(listener: &Listener, shared: &Arc<Shared>, workers: &mut Vec<JoinHandle<()>>) {
    loop {
        let (stream, endpoint) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) => match e.kind() {
                io::ErrorKind::WouldBlock => return,
                io::ErrorKind::Interrupted
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionReset => continue,
                _ => {
                    tracing::error!(error = %e, "Error accepting connection");
                    return;
                }
            },
        };

        let accepted = Accepted::new(stream, endpoint, shared.stats.clone());
        let id = accepted.id();
        let shared = shared.clone();

        // If spawning fails the closure, and the socket with it, is dropped.
        match thread::Builder::new()
            .name(format!("conn-{}", id))
            .spawn(move || serve(accepted, &shared))
        {
            Ok(worker) => workers.push(worker),
            Err(e) => tracing::error!(id, error = %e, "Failed to spawn connection worker"),
        }
    }
}

fn serve(accepted: Accepted, shared: &Shared) {
    let Ok(mut conn) = accepted.handshake(&shared.context, shared.deadline) else {
        return;
    };
    let result = conn.run_blocking(shared.observer.as_ref());
    conn.close(result);
}
