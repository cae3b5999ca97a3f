//! Builds live database handles from connection records.

use std::sync::Arc;

use common::config::AppConfig;
use common::errors::AppResult;
use common::models::{ProxyConfig, SessionData};

use crate::database::{BackendOptions, Database, DatabaseFactory, DatabaseRegistry};
use crate::dsn::Dsn;
use crate::proxy::{DialerRegistry, Proxy, ProxyFactory, ProxyRegistry, ProxyTunnel};

/// A connected handle plus the proxy it dials through, if any.
pub struct Connection {
    pub db: Arc<dyn Database>,
    proxy: Option<Arc<dyn Proxy>>,
}

impl Connection {
    /// Whether the handle is tunneled.
    pub fn proxied(&self) -> bool {
        self.proxy.is_some()
    }

    /// Releases a handle that never made it into service: proxy first, then
    /// the backend. Failures are logged.
    pub(crate) async fn discard(self) {
        if let Some(proxy) = &self.proxy {
            if let Err(e) = proxy.close().await {
                tracing::warn!(error = %e, "Failed to close proxy");
            }
        }
        if let Err(e) = self.db.close().await {
            tracing::warn!(error = %e, "Failed to close database handle");
        }
    }
}

/// Resolves backends and proxies and assembles connected handles.
pub struct ConnectionBroker {
    databases: DatabaseRegistry,
    proxies: ProxyRegistry,
    dialers: Arc<DialerRegistry>,
}

impl ConnectionBroker {
    /// Broker with the built-in backends and the SSH proxy.
    pub fn new(config: &AppConfig) -> Self {
        let dialers = Arc::new(DialerRegistry::new());
        Self {
            databases: DatabaseRegistry::with_builtins(dialers.clone(), BackendOptions::from(config)),
            proxies: ProxyRegistry::with_builtins(config.connect_timeout()),
            dialers,
        }
    }

    /// Broker over caller supplied registries.
    pub fn with_registries(
        databases: DatabaseRegistry,
        proxies: ProxyRegistry,
        dialers: Arc<DialerRegistry>,
    ) -> Self {
        Self {
            databases,
            proxies,
            dialers,
        }
    }

    pub fn register_database_factory(&self, db_type: &str, factory: Arc<dyn DatabaseFactory>) {
        self.databases.register(db_type, factory);
    }

    pub fn register_proxy_factory(&self, proxy_type: &str, factory: Arc<dyn ProxyFactory>) {
        self.proxies.register(proxy_type, factory);
    }

    pub fn database_types(&self) -> Vec<String> {
        self.databases.types()
    }

    /// Live transport names.
    pub fn dialers(&self) -> &Arc<DialerRegistry> {
        &self.dialers
    }

    /// Opens a connected handle for `dsn`, tunneled when `proxy` is set and
    /// the backend supports it.
    pub async fn open(
        &self,
        db_type: &str,
        dsn: &str,
        proxy: Option<&ProxyConfig>,
    ) -> AppResult<Connection> {
        let factory = self.databases.resolve(db_type)?;
        let backend = factory.create();

        let Some(proxy_config) = proxy else {
            return connect_direct(backend, dsn).await;
        };

        let proxy = self
            .proxies
            .resolve(&proxy_config.type_tag())?
            .create(proxy_config)
            .await?;

        if !factory.supports_proxy_tunnel() {
            tracing::warn!(
                db_type = %db_type,
                proxy = %proxy_config.address(),
                "Backend cannot dial through a proxy, connecting directly"
            );
            if let Err(e) = proxy.close().await {
                tracing::warn!(error = %e, "Failed to close unused proxy");
            }
            return connect_direct(backend, dsn).await;
        }

        let tunnel = Arc::new(ProxyTunnel::new(backend, proxy.clone(), self.dialers.clone()));
        let connection = Connection {
            db: tunnel.clone(),
            proxy: Some(proxy),
        };
        if let Err(e) = tunnel.connect(dsn).await {
            connection.discard().await;
            return Err(e);
        }
        tracing::info!(db_type = %db_type, transport = %tunnel.transport(), "Tunneled connection opened");
        Ok(connection)
    }

    /// Rebuilds the handle described by a persisted record, re-selecting the
    /// record's current database when it differs from the DSN's.
    pub async fn reconnect(&self, data: &SessionData) -> AppResult<Connection> {
        let connection = self
            .open(&data.db_type, &data.dsn, data.connection_info.proxy.as_ref())
            .await?;

        let Some(target) = data.current_database.as_deref() else {
            return Ok(connection);
        };
        let initial = Dsn::parse(&data.dsn).ok().and_then(|dsn| dsn.database());
        if initial.as_deref() == Some(target) {
            return Ok(connection);
        }

        if let Err(e) = connection.db.switch_database(target).await {
            connection.discard().await;
            return Err(e);
        }
        Ok(connection)
    }
}

async fn connect_direct(backend: Box<dyn Database>, dsn: &str) -> AppResult<Connection> {
    if let Err(e) = backend.connect(dsn).await {
        if let Err(close_err) = backend.close().await {
            tracing::warn!(error = %close_err, "Failed to close database handle");
        }
        return Err(e);
    }
    Ok(Connection {
        db: Arc::from(backend),
        proxy: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::errors::AppError;
    use common::models::ConnectionInfo;

    #[tokio::test]
    async fn test_open_sqlite_direct() {
        let broker = ConnectionBroker::new(&AppConfig::default());
        let conn = broker.open("sqlite", "sqlite::memory:", None).await.unwrap();
        assert!(!conn.proxied());
        assert_eq!(conn.db.type_name(), "sqlite");
        conn.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_types() {
        let broker = ConnectionBroker::new(&AppConfig::default());
        assert!(matches!(
            broker.open("oracle", "oracle://db:1521/x", None).await,
            Err(AppError::UnsupportedDatabaseType(_))
        ));

        let proxy: ProxyConfig =
            serde_json::from_str(r#"{"type":"carrier-pigeon","host":"coop"}"#).unwrap();
        assert!(matches!(
            broker.open("sqlite", "sqlite::memory:", Some(&proxy)).await,
            Err(AppError::UnsupportedProxyType(_))
        ));
    }

    #[tokio::test]
    async fn test_reconnect_reselects_main() {
        let broker = ConnectionBroker::new(&AppConfig::default());
        let mut info = ConnectionInfo::new("sqlite");
        info.file_path = Some(":memory:".into());
        let mut data = SessionData::new(info, "sqlite::memory:".into());
        data.current_database = Some("main".into());
        assert!(broker.reconnect(&data).await.is_ok());

        data.current_database = Some("attached".into());
        assert!(matches!(
            broker.reconnect(&data).await,
            Err(AppError::SwitchDatabaseFailed(_))
        ));
    }
}
