//! Server configuration.

use std::{net::SocketAddr, time::Duration};

use pushgate_core::{FailoverPolicy, NodeAddress, QueueSettings};
use pushgate_proto::codec::MAX_PAYLOAD_SIZE;

use crate::error::{Result, ServerError};

/// Runtime configuration for [`crate::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket to listen on.
    pub bind_addr: SocketAddr,

    /// Address other nodes use to reach this one. Defaults to the bound
    /// address when unset.
    pub public_addr: Option<NodeAddress>,

    /// Largest accepted payload.
    pub max_frame_size: usize,

    /// Queue provider name.
    pub queue_provider: String,

    /// Queue client instances to build.
    pub queue_instances: usize,

    /// Settings passed to each queue instance.
    pub queue_settings: QueueSettings,

    /// Publish retry policy.
    pub failover: FailoverPolicy,

    /// Lifetime of remote route records. `None` keeps them until removed,
    /// offline records included.
    pub route_ttl: Option<Duration>,

    /// How often expired records are swept from the in-process cache.
    pub cache_purge_interval: Duration,

    /// Frames buffered per connection before senders wait.
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            public_addr: None,
            max_frame_size: MAX_PAYLOAD_SIZE,
            queue_provider: "memory".to_owned(),
            queue_instances: 2,
            queue_settings: QueueSettings::default(),
            failover: FailoverPolicy::with_attempts(3),
            route_ttl: Some(Duration::from_secs(600)),
            cache_purge_interval: Duration::from_secs(60),
            outbound_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_size == 0 || self.max_frame_size > i32::MAX as usize {
            return Err(ServerError::Config(format!(
                "max frame size must be between 1 and {}, got {}",
                i32::MAX,
                self.max_frame_size
            )));
        }
        if self.queue_provider.trim().is_empty() {
            return Err(ServerError::Config("queue provider name is empty".to_owned()));
        }
        if self.queue_instances == 0 {
            return Err(ServerError::Config("queue instances must be at least 1".to_owned()));
        }
        if self.failover.max_attempts == 0 {
            return Err(ServerError::Config("publish attempts must be at least 1".to_owned()));
        }
        if self.route_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ServerError::Config("route TTL must be positive".to_owned()));
        }
        if self.cache_purge_interval.is_zero() {
            return Err(ServerError::Config("cache purge interval must be positive".to_owned()));
        }
        if self.outbound_capacity == 0 {
            return Err(ServerError::Config("outbound capacity must be at least 1".to_owned()));
        }
        if let Some(public) = &self.public_addr
            && public.host.trim().is_empty()
        {
            return Err(ServerError::Config("public host is empty".to_owned()));
        }
        Ok(())
    }

    /// Public address, given the socket actually bound.
    pub fn public_node(&self, bound: SocketAddr) -> NodeAddress {
        self.public_addr
            .clone()
            .unwrap_or_else(|| NodeAddress::new(bound.ip().to_string(), bound.port()))
    }
}
