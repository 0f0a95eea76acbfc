//! Parsing engine socket strings into dialable endpoints.

use std::fmt;
use std::path::PathBuf;

use crate::engine::connection::SocketType;
use crate::error::TransportError;

/// Port used for `tcp://host` endpoints without an explicit port.
const DEFAULT_TCP_PORT: u16 = 2375;

/// A daemon endpoint the stream transport can dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket at a filesystem path.
    Unix(PathBuf),
    /// Plain TCP at `host:port`.
    Tcp {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
}

impl Endpoint {
    /// Parse a socket string as accepted by `--engine-socket`.
    ///
    /// Accepts `unix://` URIs, bare Unix paths, and `tcp://` or `http://`
    /// addresses. Named pipes and TLS endpoints are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnsupportedEndpoint`] for schemes the stream
    /// transport cannot serve or for malformed addresses.
    pub fn parse(socket: &str) -> Result<Self, TransportError> {
        match SocketType::classify(socket) {
            SocketType::Socket => socket.strip_prefix("unix://").map_or_else(
                || Err(unsupported(socket, "named pipes are not supported")),
                |path| Ok(Self::Unix(PathBuf::from(path))),
            ),
            SocketType::Http => Self::parse_tcp(socket),
            SocketType::BarePath if is_pipe_path(socket) => {
                Err(unsupported(socket, "named pipes are not supported"))
            }
            SocketType::BarePath => Ok(Self::Unix(PathBuf::from(socket))),
        }
    }

    fn parse_tcp(socket: &str) -> Result<Self, TransportError> {
        if socket.starts_with("https://") {
            return Err(unsupported(socket, "TLS endpoints are not supported"));
        }
        let authority = socket
            .strip_prefix("tcp://")
            .or_else(|| socket.strip_prefix("http://"))
            .unwrap_or(socket)
            .trim_end_matches('/');
        if authority.is_empty() || authority.contains('/') {
            return Err(unsupported(socket, "expected host[:port]"));
        }

        match authority.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let parsed = port
                    .parse::<u16>()
                    .map_err(|_| unsupported(socket, "invalid port"))?;
                Ok(Self::Tcp {
                    host: String::from(host),
                    port: parsed,
                })
            }
            Some(_) => Err(unsupported(socket, "expected host[:port]")),
            None => Ok(Self::Tcp {
                host: String::from(authority),
                port: DEFAULT_TCP_PORT,
            }),
        }
    }

    /// Value sent in the `Host` request header.
    #[must_use]
    pub fn host_header(&self) -> String {
        match self {
            Self::Unix(_) => String::from("localhost"),
            Self::Tcp { host, port } => format!("{host}:{port}"),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

fn is_pipe_path(path: &str) -> bool {
    path.starts_with("\\\\") || path.starts_with("//")
}

fn unsupported(socket: &str, reason: &str) -> TransportError {
    TransportError::UnsupportedEndpoint {
        endpoint: String::from(socket),
        reason: String::from(reason),
    }
}
