//! Shutdown signalling
//!
//! A connected socket pair acts as a self-pipe: triggering writes one byte to
//! the writer end, which wakes whichever loop is waiting on the reader end
//! (the mio registry or `poll(2)`). The same path serves SIGINT/SIGTERM.

use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Receiving end, owned by the server
#[derive(Debug)]
pub struct Shutdown {
    reader: UnixStream,
    handle: ShutdownHandle,
}

/// Cloneable trigger for a [`Shutdown`]
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    writer: Arc<UnixStream>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;

        Ok(Shutdown {
            reader,
            handle: ShutdownHandle {
                writer: Arc::new(writer),
                triggered: Arc::new(AtomicBool::new(false)),
            },
        })
    }

    pub fn handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.handle.is_triggered()
    }

    /// Consume pending wake-up bytes
    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

impl AsRawFd for Shutdown {
    fn as_raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}

impl ShutdownHandle {
    /// Ask the server to stop accepting and drain
    pub fn trigger(&self) {
        self.wake();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    // Only an atomic store and write(2): safe to call from a signal handler.
    fn wake(&self) {
        self.triggered.store(true, Ordering::Release);
        let byte = 1u8;
        // A full socket buffer already guarantees a pending wake-up.
        unsafe {
            libc::write(
                self.writer.as_raw_fd(),
                &byte as *const u8 as *const libc::c_void,
                1,
            );
        }
    }
}

static INTERRUPT_TARGET: OnceLock<ShutdownHandle> = OnceLock::new();

extern "C" fn on_interrupt(_signal: libc::c_int) {
    if let Some(handle) = INTERRUPT_TARGET.get() {
        handle.wake();
    }
}

/// Route SIGINT and SIGTERM to `handle`
///
/// Only one handle per process can be installed.
pub fn install_interrupt_handler(handle: &ShutdownHandle) -> io::Result<()> {
    INTERRUPT_TARGET.set(handle.clone()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "interrupt handler already installed",
        )
    })?;

    for signal in [libc::SIGINT, libc::SIGTERM] {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&mut action.sa_mask);

            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }

    tracing::debug!("Installed SIGINT/SIGTERM handler");
    Ok(())
}
