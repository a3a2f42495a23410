//! Online/offline detection.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait NetworkConnection {
    async fn is_online(&self) -> bool;
}

/// Treats the LMS as reachable when a TCP connection to its host succeeds.
pub struct HostProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl HostProbe {
    pub fn new(api_host_url: &Url, timeout: Duration) -> Self {
        Self {
            host: api_host_url.host_str().unwrap_or("localhost").to_string(),
            port: api_host_url.port_or_known_default().unwrap_or(80),
            timeout,
        }
    }
}

#[async_trait]
impl NetworkConnection for HostProbe {
    async fn is_online(&self) -> bool {
        let addr = format!("{}:{}", self.host, self.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("{} unreachable: {}", addr, e);
                false
            }
            Err(_) => {
                debug!("{} timed out", addr);
                false
            }
        }
    }
}

/// A connection state decided up front, e.g. by `--offline`.
pub struct FixedConnection(pub bool);

#[async_trait]
impl NetworkConnection for FixedConnection {
    async fn is_online(&self) -> bool {
        self.0
    }
}
