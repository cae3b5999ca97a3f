//! Loopback forwarder in front of a proxy.
//!
//! Drivers that only know how to dial TCP addresses connect to the
//! forwarder's local port; every accepted socket is piped to the target
//! through the proxy.
//!
//! The port is bound to loopback only, with no peer authentication: any
//! process on this host that finds the port can reach the target through the
//! tunnel for as long as the forwarder lives. The forwarder lives exactly as
//! long as the backend pool that uses it, and stops accepting as soon as the
//! session's handle is closed. The database's own login still applies to
//! every forwarded connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use common::errors::{AppError, AppResult};

use super::Proxy;

/// Pause after a failed `accept`, so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept loop bound to `127.0.0.1`. Stops when closed or dropped.
pub struct LocalForwarder {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl LocalForwarder {
    /// Binds an ephemeral loopback port forwarding to `target`.
    pub async fn start(proxy: Arc<dyn Proxy>, target: String) -> AppResult<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AppError::ProxyEstablishFailed(format!("forwarder bind: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AppError::ProxyEstablishFailed(format!("forwarder bind: {}", e)))?;

        let task = tokio::spawn(accept_loop(listener, proxy, target));
        Ok(Self { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn close(self) {
        self.task.abort();
    }
}

impl Drop for LocalForwarder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, proxy: Arc<dyn Proxy>, target: String) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "Forwarder accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        let proxy = proxy.clone();
        let target = target.clone();
        tokio::spawn(async move {
            if let Err(e) = pipe(socket, proxy, &target).await {
                tracing::warn!(peer = %peer, target = %target, error = %e, "Forwarded stream ended with error");
            }
        });
    }
}

async fn pipe(mut socket: TcpStream, proxy: Arc<dyn Proxy>, target: &str) -> AppResult<()> {
    let mut remote = proxy.dial("tcp", target).await?;
    tokio::io::copy_bidirectional(&mut socket, &mut remote)
        .await
        .map_err(|e| AppError::ProxyEstablishFailed(format!("forward {}: {}", target, e)))?;
    Ok(())
}
