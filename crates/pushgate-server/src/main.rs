//! Pushgate gateway server binary.

use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use pushgate_core::{FailoverPolicy, NodeAddress, QueueSettings};
use pushgate_proto::codec::MAX_PAYLOAD_SIZE;
use pushgate_server::{Server, ServerConfig, ServerError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Pushgate long-connection gateway
#[derive(Parser, Debug)]
#[command(name = "pushgate-server")]
#[command(about = "Long-connection push gateway", long_about = None)]
struct Args {
    /// Address to bind the TCP listener
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// Host other nodes use to reach this one
    #[arg(long)]
    public_host: Option<String>,

    /// Port other nodes use to reach this one (defaults to the bound port)
    #[arg(long, requires = "public_host")]
    public_port: Option<u16>,

    /// Largest accepted frame payload in bytes
    #[arg(long, default_value_t = MAX_PAYLOAD_SIZE)]
    max_frame_size: usize,

    /// Queue provider for dispatched messages
    #[arg(long, default_value = "memory")]
    queue_provider: String,

    /// Queue client instances to rotate across
    #[arg(long, default_value_t = 2)]
    queue_instances: usize,

    /// Messages each queue instance buffers
    #[arg(long, default_value_t = 4096)]
    queue_capacity: usize,

    /// Publish attempts before a message is dropped
    #[arg(long, default_value_t = 3)]
    publish_attempts: u32,

    /// Lifetime of cluster route records in seconds (0 disables expiry)
    #[arg(long, default_value_t = 600)]
    route_ttl_secs: u64,

    /// Seconds between sweeps of expired cache records
    #[arg(long, default_value_t = 60)]
    cache_purge_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let public_addr = self.public_host.map(|host| {
            NodeAddress::new(host, self.public_port.unwrap_or_else(|| self.bind.port()))
        });
        ServerConfig {
            bind_addr: self.bind,
            public_addr,
            max_frame_size: self.max_frame_size,
            queue_provider: self.queue_provider,
            queue_instances: self.queue_instances,
            queue_settings: QueueSettings { capacity: self.queue_capacity },
            failover: FailoverPolicy::with_attempts(self.publish_attempts),
            route_ttl: (self.route_ttl_secs > 0).then(|| Duration::from_secs(self.route_ttl_secs)),
            cache_purge_interval: Duration::from_secs(self.cache_purge_secs),
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    info!("Starting Pushgate server");

    let server = Server::bind(args.into_config()).await.inspect_err(|e| {
        error!(error = %e, "startup failed");
    })?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        shutdown.cancel();
    });

    server.run().await
}
