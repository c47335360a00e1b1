//! Gateway for GT06-family GPS trackers.
//!
//! Devices connect over TCP and speak a marker-delimited binary protocol.
//! This crate bundles the layers:
//!
//! - [`frame`]: markers, length byte, XOR and CRC-ITU checksums, streaming decode
//! - [`message`]: protocol decoders, the [`message::Event`] model, acks and command frames
//! - [`server`]: sessions, the connection registry and the per-IMEI command queue
//!   (behind the default `server` feature)
//!
//! The `gt06` binary (feature `cli`) serves devices and decodes captured frames.

/// Re-export frame types.
pub mod frame {
    pub use gt06_frame::*;
}

/// Re-export message types.
pub mod message {
    pub use gt06_message::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use gt06_server::*;
}
