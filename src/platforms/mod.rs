// src/platforms/mod.rs - Collaborator interfaces: chat network client and reachability check

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

pub mod helix;
pub mod poller;
pub mod twitch;

/// Why a connection attempt failed
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The server rejected the credentials. Not worth retrying.
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Wire-level chat client. Implementations push inbound events into the
/// `EventSender` they were built with, from their own task.
#[async_trait]
pub trait ChatClient: Send {
    /// Open a session and authenticate
    async fn connect(&mut self, channel: &str, username: &str, token: &str) -> Result<(), ConnectError>;

    async fn join(&mut self, channel: &str) -> Result<()>;

    /// Tear the session down; safe to call when not connected
    async fn disconnect(&mut self);

    async fn send_message(&mut self, text: &str) -> Result<()>;

    async fn timeout(&mut self, user: &str, seconds: u64) -> Result<()>;

    async fn ban(&mut self, user: &str) -> Result<()>;

    /// Keepalive; a reply should arrive as an inbound event
    async fn heartbeat(&mut self) -> Result<()>;

    /// Get the platform identifier (e.g., "twitch")
    fn platform_name(&self) -> &str;
}

/// Basic network reachability check used before connecting
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Reachable if a TCP connection to `address` opens within the timeout
pub struct TcpReachability {
    address: String,
    timeout: Duration,
}

impl TcpReachability {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl Reachability for TcpReachability {
    async fn is_reachable(&self) -> bool {
        match timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(target: "core", "{} unreachable: {}", self.address, e);
                false
            }
            Err(_) => {
                debug!(target: "core", "{} reachability check timed out", self.address);
                false
            }
        }
    }
}

/// For hosts where a reachability check is meaningless
pub struct AlwaysReachable;

#[async_trait]
impl Reachability for AlwaysReachable {
    async fn is_reachable(&self) -> bool {
        true
    }
}
