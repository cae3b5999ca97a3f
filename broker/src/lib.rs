//! Connection session broker.
//!
//! Keeps one live database handle per logical session, reconciles that
//! in-process cache against the authoritative persisted session record,
//! rebuilds handles on demand (optionally through a proxy tunnel) and plans
//! keyset or offset pagination for table browsing.

pub mod cache;
pub mod connector;
pub mod database;
pub mod dsn;
pub mod manager;
pub mod pagination;
pub mod proxy;
pub mod store;

pub use cache::{SessionCache, SessionHandle, SessionLock};
pub use connector::{Connection, ConnectionBroker};
pub use database::{BackendOptions, Database, DatabaseFactory, DatabaseRegistry};
pub use manager::SessionManager;
pub use proxy::{DialerRegistry, Proxy, ProxyFactory, ProxyRegistry, ProxyTunnel};
pub use store::{build_session_store, MemorySessionStore, SessionStore};
