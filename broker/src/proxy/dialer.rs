//! Named dial transports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::Proxy;

/// Maps generated transport names to live proxies.
///
/// Names are unique for the lifetime of the registry and never reused.
#[derive(Default)]
pub struct DialerRegistry {
    seq: AtomicU64,
    dialers: RwLock<HashMap<String, Arc<dyn Proxy>>>,
}

impl DialerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a proxy and returns its transport name.
    pub fn register(&self, proxy: Arc<dyn Proxy>) -> String {
        let name = format!("tun{}", self.seq.fetch_add(1, Ordering::Relaxed) + 1);
        self.dialers.write().insert(name.clone(), proxy);
        tracing::debug!(transport = %name, "Dialer registered");
        name
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Proxy>> {
        self.dialers.read().get(name).cloned()
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.dialers.write().remove(name).is_some();
        if removed {
            tracing::debug!(transport = %name, "Dialer unregistered");
        }
        removed
    }

    /// Number of live transports.
    pub fn len(&self) -> usize {
        self.dialers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::BoxedStream;
    use async_trait::async_trait;
    use common::errors::{AppError, AppResult};

    struct Noop;

    #[async_trait]
    impl Proxy for Noop {
        async fn dial(&self, _network: &str, address: &str) -> AppResult<BoxedStream> {
            Err(AppError::ProxyEstablishFailed(address.to_string()))
        }

        async fn close(&self) -> AppResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_names_are_unique() {
        let reg = DialerRegistry::new();
        let a = reg.register(Arc::new(Noop));
        let b = reg.register(Arc::new(Noop));
        assert_eq!(a, "tun1");
        assert_eq!(b, "tun2");
        assert_eq!(reg.len(), 2);

        assert!(reg.unregister(&a));
        assert!(!reg.unregister(&a));
        assert!(reg.resolve(&a).is_none());
        assert!(reg.resolve(&b).is_some());

        let c = reg.register(Arc::new(Noop));
        assert_eq!(c, "tun3");
    }
}
