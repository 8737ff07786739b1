//! Local host name lookup

use std::ffi::{CStr, CString};
use std::io;

/// Fully qualified name of this host
///
/// Asks the resolver for the canonical name of `gethostname(2)`; when that
/// fails or yields nothing better, the bare host name is returned.
pub fn local_fqdn() -> io::Result<String> {
    let name = local_hostname()?;
    match canonical_name(&name) {
        Some(canonical) if canonical.contains('.') => Ok(canonical),
        _ => Ok(name),
    }
}

/// Host name as configured on this machine
pub fn local_hostname() -> io::Result<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..len].to_vec())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn canonical_name(host: &str) -> Option<String> {
    let host = CString::new(host).ok()?;

    let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
    hints.ai_family = libc::AF_UNSPEC;
    hints.ai_socktype = libc::SOCK_STREAM;
    hints.ai_flags = libc::AI_CANONNAME;

    let mut res: *mut libc::addrinfo = std::ptr::null_mut();
    let rc = unsafe { libc::getaddrinfo(host.as_ptr(), std::ptr::null(), &hints, &mut res) };
    if rc != 0 || res.is_null() {
        tracing::debug!(rc, "getaddrinfo found no canonical name");
        return None;
    }

    // Only the first entry carries ai_canonname.
    let canonical = unsafe {
        let name = (*res).ai_canonname;
        let owned = if name.is_null() {
            None
        } else {
            CStr::from_ptr(name).to_str().ok().map(str::to_owned)
        };
        libc::freeaddrinfo(res);
        owned
    };

    canonical.filter(|name| !name.is_empty())
}
