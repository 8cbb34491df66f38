//! Tunnel Manager: exposes the local webhook receiver on a public URL.
//!
//! The coordinator only sees [`TunnelProvider`]; the ngrok agent is one
//! implementation, tests use in-memory fakes.

pub mod ngrok;

use async_trait::async_trait;

use crate::utilities::errors::TunnelError;

pub use ngrok::NgrokTunnel;

/// An open tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelHandle {
    /// Public URL forwarding to `local_port`.
    pub public_url: String,
    pub local_port: u16,
}

#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Allocate a public URL forwarding to `local_port`.
    ///
    /// Fails with [`TunnelError::Unavailable`] when no credential is
    /// configured or the provider cannot allocate an endpoint.
    async fn open(&self, local_port: u16) -> Result<TunnelHandle, TunnelError>;

    /// Release the tunnel. Closing an already-closed handle succeeds.
    async fn close(&self, handle: &TunnelHandle) -> Result<(), TunnelError>;
}
