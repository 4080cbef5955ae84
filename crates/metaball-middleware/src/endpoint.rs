//! `tcp://host:port` transport addresses.

use std::fmt;
use std::str::FromStr;

use metaball_types::MetaballError;

const SCHEME: &str = "tcp://";

/// A parsed transport address.  A host of `*` binds every interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address to hand to a listener.
    pub fn bind_addr(&self) -> String {
        let host: &str = if self.host == "*" { "0.0.0.0" } else { &self.host };
        join_host_port(host, self.port)
    }

    /// Address to dial.  `*` dials the local machine.
    pub fn connect_addr(&self) -> String {
        let host: &str = if self.host == "*" { "127.0.0.1" } else { &self.host };
        join_host_port(host, self.port)
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

impl FromStr for Endpoint {
    type Err = MetaballError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(SCHEME).ok_or_else(|| {
            MetaballError::Configuration(format!(
                "unsupported transport address '{s}' (expected tcp://host:port)"
            ))
        })?;

        let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
            MetaballError::Configuration(format!("missing port in address '{s}'"))
        })?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(MetaballError::Configuration(format!(
                "missing host in address '{s}'"
            )));
        }
        let port = port.parse::<u16>().map_err(|e| {
            MetaballError::Configuration(format!("invalid port in address '{s}': {e}"))
        })?;

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}", join_host_port(&self.host, self.port))
    }
}
