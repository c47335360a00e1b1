use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use gt06_frame::FrameConfig;
use gt06_message::TimestampEncoding;

use crate::queue::QueueConfig;

/// Port the gateway listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 9117;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address. Default: `0.0.0.0:9117`.
    pub bind: SocketAddr,
    /// Inbound checksum policy.
    pub frame: FrameConfig,
    /// How device clocks are read.
    pub timestamps: TimestampEncoding,
    pub queue: QueueConfig,
    /// Period of the ack-timeout sweep. Default: 5s.
    pub sweep_interval: Duration,
    /// Close a connection after this long without traffic. Default: never.
    pub idle_timeout: Option<Duration>,
    /// Frames that may wait for a session's writer. Default: 32.
    pub outbound_capacity: usize,
    /// Enqueue the command script for each IMEI the first time it logs in.
    pub auto_script: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            frame: FrameConfig::default(),
            timestamps: TimestampEncoding::default(),
            queue: QueueConfig::default(),
            sweep_interval: Duration::from_secs(5),
            idle_timeout: None,
            outbound_capacity: 32,
            auto_script: false,
        }
    }
}
