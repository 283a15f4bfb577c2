//! Tunnel registry
//!
//! Maps tunnel IDs to an expiry deadline and, while an agent is attached,
//! the live connection serving that tunnel. Expired entries are purged
//! lazily on lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use apix_core::error::RegistryError;
use apix_core::{Connection, ConnectionId, TunnelId};

/// Names that collide with broker endpoints
pub const RESERVED_TUNNEL_IDS: &[&str] = &["register", "random", "ws", "health", "tunnels"];

/// Longest accepted tunnel ID
pub const MAX_TUNNEL_ID_LEN: usize = 64;

/// Check that a tunnel ID can be used as the first URL path segment
pub fn validate_tunnel_id(id: &TunnelId) -> Result<(), RegistryError> {
    let raw = id.as_str();
    if raw.is_empty() {
        return Err(RegistryError::InvalidArgument(
            "tunnel ID must not be empty".to_string(),
        ));
    }
    if raw.len() > MAX_TUNNEL_ID_LEN {
        return Err(RegistryError::InvalidArgument(format!(
            "tunnel ID longer than {} characters",
            MAX_TUNNEL_ID_LEN
        )));
    }
    if !raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(RegistryError::InvalidArgument(format!(
            "tunnel ID {:?} may only contain letters, digits, '-' and '_'",
            raw
        )));
    }
    if is_reserved(raw) {
        return Err(RegistryError::InvalidArgument(format!(
            "tunnel ID {:?} is reserved",
            raw
        )));
    }
    Ok(())
}

fn is_reserved(raw: &str) -> bool {
    RESERVED_TUNNEL_IDS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(raw))
}

struct TunnelEntry {
    expires_at: Instant,
    connection: Option<Arc<dyn Connection>>,
}

impl TunnelEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Point-in-time view of one registry entry
#[derive(Debug, Clone)]
pub struct TunnelInfo {
    /// Tunnel ID
    pub tunnel_id: TunnelId,
    /// Whether an agent is attached
    pub connected: bool,
    /// Time left before the entry expires
    pub expires_in: Duration,
}

/// Registry of tunnels known to the broker
pub struct TunnelRegistry {
    tunnels: Mutex<HashMap<TunnelId, TunnelEntry>>,
    /// TTL for entries created by a handshake without prior registration
    default_ttl: Duration,
}

impl TunnelRegistry {
    /// Create an empty registry
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            tunnels: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TunnelId, TunnelEntry>> {
        self.tunnels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a tunnel, generating an ID when none is requested.
    ///
    /// Re-registering an existing ID refreshes its expiry and keeps any
    /// attached connection.
    pub fn register(
        &self,
        requested: Option<TunnelId>,
        ttl_seconds: i64,
    ) -> Result<TunnelId, RegistryError> {
        if ttl_seconds <= 0 {
            return Err(RegistryError::InvalidArgument(format!(
                "ttl_seconds must be positive, got {}",
                ttl_seconds
            )));
        }
        if let Some(id) = &requested {
            validate_tunnel_id(id)?;
        }

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(ttl_seconds as u64))
            .ok_or_else(|| {
                RegistryError::InvalidArgument(format!("ttl_seconds too large: {}", ttl_seconds))
            })?;

        let mut tunnels = self.lock();
        let tunnel_id = match requested {
            Some(id) => id,
            None => loop {
                let candidate = TunnelId::generate();
                if !tunnels.contains_key(&candidate) && !is_reserved(candidate.as_str()) {
                    break candidate;
                }
            },
        };

        tunnels
            .entry(tunnel_id.clone())
            .and_modify(|entry| entry.expires_at = expires_at)
            .or_insert(TunnelEntry {
                expires_at,
                connection: None,
            });

        tracing::info!("Registered tunnel {} (ttl {}s)", tunnel_id, ttl_seconds);
        Ok(tunnel_id)
    }

    /// Bind a live connection to a tunnel.
    ///
    /// Creates the entry with the default TTL if it is missing or already
    /// expired. Returns the connection that was previously bound, if any.
    pub fn attach(
        &self,
        tunnel_id: TunnelId,
        connection: Arc<dyn Connection>,
    ) -> Option<Arc<dyn Connection>> {
        let now = Instant::now();
        let fresh_expiry = now + self.default_ttl;
        let connection_id = connection.id();

        let mut tunnels = self.lock();
        let entry = tunnels
            .entry(tunnel_id.clone())
            .or_insert_with(|| TunnelEntry {
                expires_at: fresh_expiry,
                connection: None,
            });
        if entry.is_expired(now) {
            entry.expires_at = fresh_expiry;
        }
        let previous = entry.connection.replace(connection);

        match &previous {
            Some(old) => tracing::info!(
                "Tunnel {} attached to {} (replacing {})",
                tunnel_id,
                connection_id,
                old.id()
            ),
            None => tracing::info!("Tunnel {} attached to {}", tunnel_id, connection_id),
        }
        previous
    }

    /// Live connection for a tunnel.
    ///
    /// Returns `None` for unknown, expired, or registered-but-unattached
    /// tunnels. Expired entries are removed.
    pub fn lookup(&self, tunnel_id: &TunnelId) -> Option<Arc<dyn Connection>> {
        let mut tunnels = self.lock();
        let expired = tunnels.get(tunnel_id)?.is_expired(Instant::now());
        if expired {
            tunnels.remove(tunnel_id);
            tracing::info!("Tunnel {} expired", tunnel_id);
            return None;
        }
        tunnels
            .get(tunnel_id)
            .and_then(|entry| entry.connection.clone())
    }

    /// Unbind a connection from every tunnel it currently serves.
    ///
    /// Entries stay registered. A connection that was already superseded
    /// is no longer bound anywhere, so detaching it leaves its successor
    /// in place.
    pub fn detach(&self, connection_id: ConnectionId) -> Vec<TunnelId> {
        let mut detached = Vec::new();
        let mut tunnels = self.lock();
        for (tunnel_id, entry) in tunnels.iter_mut() {
            let bound = entry
                .connection
                .as_ref()
                .is_some_and(|c| c.id() == connection_id);
            if bound {
                entry.connection = None;
                detached.push(tunnel_id.clone());
            }
        }
        for tunnel_id in &detached {
            tracing::info!("Tunnel {} detached from {}", tunnel_id, connection_id);
        }
        detached
    }

    /// Number of registered entries, including ones not yet purged
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of unexpired entries with an attached connection
    pub fn connected_count(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|entry| entry.connection.is_some() && !entry.is_expired(now))
            .count()
    }

    /// Snapshot of all unexpired entries, sorted by tunnel ID
    pub fn snapshot(&self) -> Vec<TunnelInfo> {
        let now = Instant::now();
        let mut infos: Vec<TunnelInfo> = self
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(tunnel_id, entry)| TunnelInfo {
                tunnel_id: tunnel_id.clone(),
                connected: entry.connection.is_some(),
                expires_in: entry.expires_at.saturating_duration_since(now),
            })
            .collect();
        infos.sort_by(|a, b| a.tunnel_id.cmp(&b.tunnel_id));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apix_core::memory;

    const TTL: Duration = Duration::from_secs(600);

    fn connection() -> Arc<dyn Connection> {
        let (a, _b) = memory::pair();
        Arc::new(a)
    }

    #[test]
    fn test_register_generates_url_safe_id() {
        let registry = TunnelRegistry::new(TTL);
        let id = registry.register(None, 3600).unwrap();
        assert_eq!(id.as_str().len(), 8);
        assert!(validate_tunnel_id(&id).is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_requested_id() {
        let registry = TunnelRegistry::new(TTL);
        let id = registry
            .register(Some(TunnelId::new("demo")), 3600)
            .unwrap();
        assert_eq!(id.as_str(), "demo");
    }

    #[test]
    fn test_register_rejects_bad_ttl() {
        let registry = TunnelRegistry::new(TTL);
        assert!(matches!(
            registry.register(None, 0),
            Err(RegistryError::InvalidArgument(_))
        ));
        assert!(registry.register(None, -5).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_reserved_and_invalid_ids() {
        let registry = TunnelRegistry::new(TTL);
        assert!(registry.register(Some(TunnelId::new("ws")), 60).is_err());
        assert!(registry.register(Some(TunnelId::new("Health")), 60).is_err());
        assert!(registry.register(Some(TunnelId::new("a/b")), 60).is_err());
        assert!(registry
            .register(Some(TunnelId::new("x".repeat(65))), 60)
            .is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_registered_but_unattached_lookup_is_none() {
        let registry = TunnelRegistry::new(TTL);
        let id = registry.register(None, 60).unwrap();
        assert!(registry.lookup(&id).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_and_lookup() {
        let registry = TunnelRegistry::new(TTL);
        let id = registry.register(Some(TunnelId::new("demo")), 60).unwrap();
        let conn = connection();
        let conn_id = conn.id();

        assert!(registry.attach(id.clone(), conn).is_none());
        assert_eq!(registry.lookup(&id).unwrap().id(), conn_id);
        assert_eq!(registry.connected_count(), 1);
    }

    #[tokio::test]
    async fn test_attach_creates_unregistered_entry() {
        let registry = TunnelRegistry::new(TTL);
        let id = TunnelId::new("adhoc");
        registry.attach(id.clone(), connection());

        assert!(registry.lookup(&id).is_some());
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].expires_in <= TTL);
    }

    #[tokio::test]
    async fn test_attach_supersedes_previous_connection() {
        let registry = TunnelRegistry::new(TTL);
        let id = TunnelId::new("demo");
        let first = connection();
        let second = connection();
        let first_id = first.id();
        let second_id = second.id();

        registry.attach(id.clone(), first);
        let previous = registry.attach(id.clone(), second).unwrap();
        assert_eq!(previous.id(), first_id);

        // The superseded connection no longer owns the binding
        assert!(registry.detach(first_id).is_empty());
        assert_eq!(registry.lookup(&id).unwrap().id(), second_id);
    }

    #[tokio::test]
    async fn test_detach_keeps_registration() {
        let registry = TunnelRegistry::new(TTL);
        let id = registry.register(Some(TunnelId::new("demo")), 60).unwrap();
        let conn = connection();
        let conn_id = conn.id();
        registry.attach(id.clone(), conn);

        assert_eq!(registry.detach(conn_id), vec![id.clone()]);
        assert!(registry.lookup(&id).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.connected_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_purged_on_lookup() {
        let registry = TunnelRegistry::new(TTL);
        let id = registry.register(Some(TunnelId::new("short")), 1).unwrap();
        registry.attach(id.clone(), connection());
        assert!(registry.lookup(&id).is_some());

        tokio::time::advance(Duration::from_millis(1500)).await;

        assert!(registry.snapshot().is_empty());
        assert_eq!(registry.connected_count(), 0);
        assert!(registry.lookup(&id).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregister_refreshes_expiry() {
        let registry = TunnelRegistry::new(TTL);
        let id = TunnelId::new("demo");
        registry.register(Some(id.clone()), 2).unwrap();
        registry.attach(id.clone(), connection());

        tokio::time::advance(Duration::from_secs(1)).await;
        registry.register(Some(id.clone()), 2).unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;

        assert!(registry.lookup(&id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_revives_expired_entry() {
        let registry = TunnelRegistry::new(TTL);
        let id = registry.register(Some(TunnelId::new("demo")), 1).unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        registry.attach(id.clone(), connection());
        assert!(registry.lookup(&id).is_some());
    }
}
