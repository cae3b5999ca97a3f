//! Name-keyed proxy factory registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use common::errors::{AppError, AppResult};

use super::{ProxyFactory, SshProxyFactory};

/// Resolves proxy factories by type tag. Custom registrations shadow the
/// built-in `ssh` factory.
pub struct ProxyRegistry {
    custom: RwLock<HashMap<String, Arc<dyn ProxyFactory>>>,
    builtin: HashMap<String, Arc<dyn ProxyFactory>>,
}

impl ProxyRegistry {
    pub fn empty() -> Self {
        Self {
            custom: RwLock::new(HashMap::new()),
            builtin: HashMap::new(),
        }
    }

    /// Registry with the built-in SSH factory.
    pub fn with_builtins(connect_timeout: Duration) -> Self {
        let mut builtin: HashMap<String, Arc<dyn ProxyFactory>> = HashMap::new();
        builtin.insert("ssh".to_string(), Arc::new(SshProxyFactory::new(connect_timeout)));
        Self {
            custom: RwLock::new(HashMap::new()),
            builtin,
        }
    }

    pub fn register(&self, proxy_type: &str, factory: Arc<dyn ProxyFactory>) {
        let tag = proxy_type.trim().to_lowercase();
        tracing::info!(proxy_type = %tag, "Proxy factory registered");
        self.custom.write().insert(tag, factory);
    }

    pub fn unregister(&self, proxy_type: &str) -> bool {
        self.custom
            .write()
            .remove(&proxy_type.trim().to_lowercase())
            .is_some()
    }

    pub fn resolve(&self, proxy_type: &str) -> AppResult<Arc<dyn ProxyFactory>> {
        let tag = proxy_type.trim().to_lowercase();
        if let Some(factory) = self.custom.read().get(&tag) {
            return Ok(factory.clone());
        }
        self.builtin
            .get(&tag)
            .cloned()
            .ok_or(AppError::UnsupportedProxyType(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Proxy;
    use async_trait::async_trait;
    use common::models::ProxyConfig;

    struct Refusing;

    #[async_trait]
    impl ProxyFactory for Refusing {
        async fn create(&self, config: &ProxyConfig) -> AppResult<Arc<dyn Proxy>> {
            Err(AppError::ProxyEstablishFailed(config.address()))
        }
    }

    #[test]
    fn test_resolve() {
        let reg = ProxyRegistry::with_builtins(Duration::from_secs(1));
        assert!(reg.resolve("SSH").is_ok());
        assert!(matches!(
            reg.resolve("socks5"),
            Err(AppError::UnsupportedProxyType(t)) if t == "socks5"
        ));

        reg.register("socks5", Arc::new(Refusing));
        assert!(reg.resolve("socks5").is_ok());
        assert!(reg.unregister("socks5"));
        assert!(reg.resolve("socks5").is_err());
        assert!(ProxyRegistry::empty().resolve("ssh").is_err());
    }
}
