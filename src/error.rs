//! Error types.

use crate::dns::Transport;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Error enumerates the possible selfdns error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a key authorization isn't of the form `token.thumbprint` for the token
    /// it was presented with.
    #[error("key authorization does not match token \"{0}\"")]
    InvalidKeyAuthorization(String),

    /// Returned by [`Config::from_env`][crate::config::Config::from_env] when a required
    /// variable is unset or empty.
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    /// Returned when the configured DNS listen address isn't an IPv4 or IPv6 literal.
    #[error("invalid listen address \"{0}\"")]
    InvalidListenAddress(String),

    /// Returned when the [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`] is
    /// not a loopback address, or an address within a private network space. The
    /// [HTTP API][crate::api] can publish arbitrary TXT records and must never be exposed
    /// publicly.
    #[error("API bind address ({0}) must be a loopback or private IP")]
    InsecureAPIBind(IpAddr),

    /// Returned when no server hostname is configured and the machine hostname can't be read.
    #[error("unable to determine server hostname")]
    Hostname(#[source] std::io::Error),

    /// Returned when a DNS listener can't be bound, e.g. port 53 is taken or the process lacks
    /// the privilege to bind it.
    #[error("unable to bind DNS {transport} listener on {addr}")]
    Bind {
        transport: Transport,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Returned when stopping the DNS listeners fails. Every transport is always shut down;
    /// this carries one entry per transport that failed.
    #[error("DNS shutdown failed: {}", ShutdownErrors(.0))]
    Shutdown(Vec<TransportError>),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when loading a [`Config`][crate::config::Config] fails due to invalid JSON.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),
}

/// A failure of a single transport while its listener was running or shutting down.
#[derive(thiserror::Error, Debug)]
#[error("{transport}: {message}")]
pub struct TransportError {
    pub transport: Transport,
    pub message: String,
}

struct ShutdownErrors<'a>(&'a [TransportError]);

impl fmt::Display for ShutdownErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}
