//! SSH proxy built on `russh`.
//!
//! One SSH session per proxy; every dial opens a `direct-tcpip` channel on
//! it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use russh_keys::key;
use tokio::sync::Mutex;

use common::errors::{AppError, AppResult};
use common::models::ProxyConfig;

use super::{split_address, BoxedStream, Proxy, ProxyFactory};

/// Client-side session handler. Verifies the host key when pinned.
struct SshClient {
    expected_fingerprint: Option<String>,
}

#[async_trait]
impl client::Handler for SshClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let Some(expected) = &self.expected_fingerprint else {
            return Ok(true);
        };
        let actual = server_public_key.fingerprint();
        let matches = normalize_fingerprint(expected) == normalize_fingerprint(&actual);
        if !matches {
            tracing::warn!(expected = %expected, actual = %actual, "SSH host key mismatch");
        }
        Ok(matches)
    }
}

fn normalize_fingerprint(fp: &str) -> &str {
    let fp = fp.trim();
    let fp = fp.strip_prefix("SHA256:").unwrap_or(fp);
    fp.trim_end_matches('=')
}

/// Established SSH hop.
pub struct SshProxy {
    address: String,
    session: Mutex<Option<Handle<SshClient>>>,
}

impl SshProxy {
    /// Connects and authenticates against the configured bastion.
    pub async fn connect(config: &ProxyConfig, timeout: Duration) -> AppResult<Self> {
        let address = config.address();
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let handler = SshClient {
            expected_fingerprint: config.host_key_fingerprint.clone(),
        };

        let connecting = client::connect(ssh_config, (config.host.as_str(), config.port), handler);
        let mut session = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| AppError::ProxyEstablishFailed(format!("ssh {}: connect timed out", address)))?
            .map_err(|e| AppError::ProxyEstablishFailed(format!("ssh {}: {}", address, e)))?;

        let auth = match (config.private_key.as_deref(), config.password.as_deref()) {
            (Some(pem), _) => {
                let key_pair = russh_keys::decode_secret_key(pem, config.passphrase.as_deref())
                    .map_err(|e| AppError::ProxyEstablishFailed(format!("ssh private key: {}", e)))?;
                session
                    .authenticate_publickey(config.username.clone(), Arc::new(key_pair))
                    .await
            }
            (None, Some(password)) => {
                session
                    .authenticate_password(config.username.clone(), password)
                    .await
            }
            (None, None) => {
                return Err(AppError::ProxyEstablishFailed(
                    "ssh requires a password or private_key".into(),
                ))
            }
        };
        let authenticated =
            auth.map_err(|e| AppError::ProxyEstablishFailed(format!("ssh {}: {}", address, e)))?;

        if !authenticated {
            let _ = session
                .disconnect(Disconnect::ByApplication, "", "en")
                .await;
            return Err(AppError::ProxyEstablishFailed(format!(
                "ssh {}: authentication rejected for {}",
                address, config.username
            )));
        }

        tracing::info!(proxy = %address, user = %config.username, "SSH tunnel established");
        Ok(Self {
            address,
            session: Mutex::new(Some(session)),
        })
    }
}

#[async_trait]
impl Proxy for SshProxy {
    async fn dial(&self, network: &str, address: &str) -> AppResult<BoxedStream> {
        if network != "tcp" {
            return Err(AppError::ProxyEstablishFailed(format!(
                "ssh cannot dial network {}",
                network
            )));
        }
        let (host, port) = split_address(address)
            .ok_or_else(|| AppError::ProxyEstablishFailed(format!("invalid address {}", address)))?;

        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| AppError::ProxyEstablishFailed(format!("ssh {} is closed", self.address)))?;
        let channel = session
            .channel_open_direct_tcpip(host, u32::from(port), "127.0.0.1", 0)
            .await
            .map_err(|e| AppError::ProxyEstablishFailed(format!("ssh dial {}: {}", address, e)))?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn close(&self) -> AppResult<()> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        tracing::info!(proxy = %self.address, "SSH tunnel closed");
        session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| AppError::CloseFailed(format!("ssh {}: {}", self.address, e)))
    }
}

/// Built-in `ssh` proxy factory.
pub struct SshProxyFactory {
    timeout: Duration,
}

impl SshProxyFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SshProxyFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ProxyFactory for SshProxyFactory {
    async fn create(&self, config: &ProxyConfig) -> AppResult<Arc<dyn Proxy>> {
        Ok(Arc::new(SshProxy::connect(config, self.timeout).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fingerprint() {
        assert_eq!(normalize_fingerprint("SHA256:abc="), "abc");
        assert_eq!(normalize_fingerprint(" abc "), "abc");
    }

    #[tokio::test]
    async fn test_unreachable_bastion() {
        let config: ProxyConfig =
            serde_json::from_str(r#"{"type":"ssh","host":"127.0.0.1","port":1,"username":"ops"}"#)
                .unwrap();
        let err = SshProxy::connect(&config, Duration::from_millis(200))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::ProxyEstablishFailed(_)));
    }
}
