//! Proxy capability.
//!
//! A proxy is an established hop (an SSH session today) that can open
//! byte streams to targets on the far side. Backends never see the proxy
//! directly: the [`ProxyTunnel`] wrapper publishes it in the
//! [`DialerRegistry`] under a generated transport name, and tunnel-capable
//! backends dial through that name.

mod dialer;
mod forward;
mod registry;
mod ssh;
mod tunnel;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use common::errors::AppResult;
use common::models::ProxyConfig;

pub use dialer::DialerRegistry;
pub use forward::LocalForwarder;
pub use registry::ProxyRegistry;
pub use ssh::{SshProxy, SshProxyFactory};
pub use tunnel::ProxyTunnel;

/// Bidirectional byte stream opened through a proxy.
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ProxyStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed [`ProxyStream`].
pub type BoxedStream = Box<dyn ProxyStream>;

/// An established proxy hop.
#[async_trait]
pub trait Proxy: Send + Sync {
    /// Opens a stream to `address` (`host:port`) on the far side.
    async fn dial(&self, network: &str, address: &str) -> AppResult<BoxedStream>;

    /// Tears the hop down. Calling it again is a no-op.
    async fn close(&self) -> AppResult<()>;
}

/// Builds proxies of one kind. `create` performs the handshake eagerly, so a
/// returned proxy is ready to dial.
#[async_trait]
pub trait ProxyFactory: Send + Sync {
    async fn create(&self, config: &ProxyConfig) -> AppResult<Arc<dyn Proxy>>;
}

/// Splits `host:port`, accepting bracketed IPv6 hosts.
pub(crate) fn split_address(address: &str) -> Option<(String, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}
