//! Registry of open connections, keyed by remote address.
//!
//! At most one live connection exists per address. Concurrent opens for the
//! same address share a single connect attempt.

use crate::config::Config;
use crate::connection::{SerialConnection, DEFAULT_READ_BUFFER_CAPACITY};
use crate::encoding::Encoding;
use crate::error::ConnectError;
use crate::executor::{CallbackExecutor, InlineExecutor};
use crate::listener::ListenerAdapter;
use crate::transport::{
    DeviceEnumerator, PairedDevice, StaticDeviceList, TransportConnector, TransportError,
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Something that identifies a registered connection.
pub trait ConnectionTarget {
    fn target_address(&self) -> &str;

    /// The concrete connection, when the target carries one.
    fn target_connection(&self) -> Option<SerialConnection> {
        None
    }

    /// Whether `registered` is the connection this target stands for.
    /// `None` when the target only names an address.
    fn refers_to(&self, _registered: &SerialConnection) -> Option<bool> {
        None
    }
}

impl ConnectionTarget for str {
    fn target_address(&self) -> &str {
        self
    }
}

impl ConnectionTarget for String {
    fn target_address(&self) -> &str {
        self
    }
}

impl ConnectionTarget for SerialConnection {
    fn target_address(&self) -> &str {
        self.address()
    }

    fn target_connection(&self) -> Option<SerialConnection> {
        Some(self.clone())
    }

    fn refers_to(&self, registered: &SerialConnection) -> Option<bool> {
        Some(self.same_as(registered))
    }
}

impl ConnectionTarget for ListenerAdapter {
    fn target_address(&self) -> &str {
        self.address()
    }

    fn target_connection(&self) -> Option<SerialConnection> {
        self.connection()
    }

    fn refers_to(&self, registered: &SerialConnection) -> Option<bool> {
        Some(self.wraps(registered))
    }
}

impl<T: ConnectionTarget + ?Sized> ConnectionTarget for Arc<T> {
    fn target_address(&self) -> &str {
        (**self).target_address()
    }

    fn target_connection(&self) -> Option<SerialConnection> {
        (**self).target_connection()
    }

    fn refers_to(&self, registered: &SerialConnection) -> Option<bool> {
        (**self).refers_to(registered)
    }
}

/// Opens, shares and closes connections.
///
/// Dropping the registry closes every connection it still holds.
pub struct ConnectionRegistry {
    connector: Arc<dyn TransportConnector>,
    enumerator: Option<Arc<dyn DeviceEnumerator>>,
    executor: Arc<dyn CallbackExecutor>,
    default_encoding: Encoding,
    read_buffer_capacity: usize,
    aliases: HashMap<String, String>,
    connections: Mutex<HashMap<String, SerialConnection>>,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn TransportConnector>) -> Self {
        Self {
            connector,
            enumerator: None,
            executor: Arc::new(InlineExecutor),
            default_encoding: Encoding::default(),
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
            aliases: HashMap::new(),
            connections: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Build a registry from the `[link]` and `[devices]` sections.
    ///
    /// Known devices become the enumerator unless the list is empty.
    pub fn from_config(config: &Config, connector: Arc<dyn TransportConnector>) -> Self {
        let registry = Self::new(connector)
            .with_default_encoding(config.link.encoding)
            .with_read_buffer_capacity(config.link.read_buffer_capacity)
            .with_aliases(config.devices.aliases.clone());

        if config.devices.known.is_empty() {
            registry
        } else {
            registry.with_enumerator(Arc::new(StaticDeviceList::new(
                config.devices.known.clone(),
            )))
        }
    }

    pub fn with_enumerator(mut self, enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    /// Executor for listener callbacks of connections opened from now on.
    pub fn with_callback_executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_default_encoding(mut self, encoding: Encoding) -> Self {
        self.default_encoding = encoding;
        self
    }

    pub fn with_aliases(mut self, aliases: HashMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.read_buffer_capacity = capacity.max(1);
        self
    }

    pub fn default_encoding(&self) -> Encoding {
        self.default_encoding
    }

    fn resolve<'a>(&'a self, address: &'a str) -> &'a str {
        self.aliases.get(address).map(String::as_str).unwrap_or(address)
    }

    /// Open `address` with the default encoding, or return the live
    /// connection already registered for it.
    pub async fn open(&self, address: &str) -> Result<SerialConnection, ConnectError> {
        self.open_with_encoding(address, self.default_encoding).await
    }

    /// Like [`open`](Self::open) with an explicit encoding. A connection that
    /// is already live keeps the encoding it was opened with.
    pub async fn open_with_encoding(
        &self,
        address: &str,
        encoding: Encoding,
    ) -> Result<SerialConnection, ConnectError> {
        let address = self.resolve(address);

        if let Some(connection) = self.live(address) {
            return Ok(reuse(connection, encoding));
        }

        let gate = InFlight::enter(self, address);
        let _permit = gate.lock.lock().await;

        if let Some(connection) = self.live(address) {
            return Ok(reuse(connection, encoding));
        }

        debug!(%address, "connecting");
        let transport = self.connector.connect(address).await.map_err(|e| {
            warn!(%address, error = %e, "connect failed");
            ConnectError::new(address, e)
        })?;

        let connection = SerialConnection::with_options(
            address,
            transport,
            encoding,
            self.read_buffer_capacity,
            Arc::clone(&self.executor),
        );
        info!(%address, %encoding, "connection opened");

        Ok(self.register(connection))
    }

    /// Registered, not yet closed connection for `address`. Closed entries
    /// are pruned on the way.
    fn live(&self, address: &str) -> Option<SerialConnection> {
        let mut connections = self.connections.lock();
        let stale = match connections.get(address) {
            Some(connection) if !connection.is_closed() => return Some(connection.clone()),
            Some(_) => true,
            None => false,
        };
        if stale {
            connections.remove(address);
        }
        None
    }

    /// Insert `connection` unless a live entry exists. The loser is closed.
    fn register(&self, connection: SerialConnection) -> SerialConnection {
        let mut connections = self.connections.lock();
        if let Some(existing) = connections.get(connection.address()) {
            if !existing.is_closed() {
                warn!(address = %connection.address(), "duplicate connection, keeping the first");
                let existing = existing.clone();
                drop(connections);
                connection.close_detached();
                return existing;
            }
        }
        connections.insert(connection.address().to_string(), connection.clone());
        connection
    }

    /// Remove the target's entry and close it. No-op when nothing matches;
    /// teardown failures are only logged.
    ///
    /// A connection or adapter target only removes the entry it was created
    /// for, never a newer connection registered under the same address.
    pub async fn close<T: ConnectionTarget + ?Sized>(&self, target: &T) {
        let address = self.resolve(target.target_address());
        let removed = {
            let mut connections = self.connections.lock();
            let matches = connections
                .get(address)
                .is_some_and(|registered| target.refers_to(registered).unwrap_or(true));
            if matches {
                connections.remove(address)
            } else {
                None
            }
        };

        if let Some(connection) = removed.or_else(|| target.target_connection()) {
            connection.close().await;
        }
    }

    /// Close every registered connection.
    pub async fn close_all(&self) {
        let drained: Vec<SerialConnection> = {
            let mut connections = self.connections.lock();
            connections.drain().map(|(_, connection)| connection).collect()
        };

        if !drained.is_empty() {
            info!(count = drained.len(), "closing all connections");
        }
        join_all(drained.iter().map(|connection| connection.close())).await;
    }

    /// Devices paired with this host, as reported by the enumerator.
    pub fn paired_devices(&self) -> Result<Vec<PairedDevice>, TransportError> {
        match &self.enumerator {
            Some(enumerator) => enumerator.paired_devices(),
            None => Ok(Vec::new()),
        }
    }

    /// Live connection for `address`, without opening one.
    pub fn get(&self, address: &str) -> Option<SerialConnection> {
        self.live(self.resolve(address))
    }

    pub fn addresses(&self) -> Vec<String> {
        let connections = self.connections.lock();
        let mut addresses: Vec<String> = connections
            .iter()
            .filter(|(_, connection)| !connection.is_closed())
            .map(|(address, _)| address.clone())
            .collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.connections
            .lock()
            .values()
            .filter(|connection| !connection.is_closed())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn reuse(connection: SerialConnection, requested: Encoding) -> SerialConnection {
    if connection.encoding() != requested {
        debug!(
            address = %connection.address(),
            open = %connection.encoding(),
            %requested,
            "reusing connection with its original encoding"
        );
    }
    connection
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        let drained: Vec<SerialConnection> = self
            .connections
            .get_mut()
            .drain()
            .map(|(_, connection)| connection)
            .collect();
        for connection in drained {
            connection.close_detached();
        }
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connector", &self.connector.name())
            .field("default_encoding", &self.default_encoding)
            .field("connections", &self.addresses())
            .finish_non_exhaustive()
    }
}

/// Per-address connect gate. The map entry is removed by the last holder.
struct InFlight<'a> {
    registry: &'a ConnectionRegistry,
    address: &'a str,
    lock: Arc<AsyncMutex<()>>,
}

impl<'a> InFlight<'a> {
    fn enter(registry: &'a ConnectionRegistry, address: &'a str) -> Self {
        let lock = Arc::clone(
            registry
                .in_flight
                .lock()
                .entry(address.to_string())
                .or_default(),
        );
        Self {
            registry,
            address,
            lock,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.registry.in_flight.lock();
        // One reference in the map, one here.
        if Arc::strong_count(&self.lock) <= 2 {
            in_flight.remove(self.address);
        }
    }
}
