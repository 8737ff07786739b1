//! TLS rendezvous
//!
//! A small mutually-authenticatable TLS service: a client connects, proves
//! (optionally) who it is with a certificate, sends its hostname, and learns
//! the address the server observed for it.
//!
//! - [`tls`]: trust configuration, context construction, sessions
//! - [`net`]: listening socket and peer endpoints
//! - [`server`]: exchange protocol and the two dispatch strategies
//! - [`client`]: the matching client session
//! - [`config`], [`logging`], [`hostname`]: support for the binaries

pub mod client;
pub mod config;
pub mod hostname;
pub mod logging;
pub mod net;
pub mod server;
pub mod tls;
