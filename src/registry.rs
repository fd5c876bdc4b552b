use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::error::RelayError;
use crate::matchmaker::QueueKind;

/// Opaque id the transport assigns to each socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Default)]
struct Identity {
    name: Option<String>,
    last_queue: Option<QueueKind>,
}

/// Live connections and the display name each one declared.
pub struct ConnectionRegistry {
    identities: HashMap<ConnectionId, Identity>,
    default_name: String,
}

impl ConnectionRegistry {
    pub fn new(default_name: impl Into<String>) -> Self {
        ConnectionRegistry {
            identities: HashMap::new(),
            default_name: default_name.into(),
        }
    }

    pub fn register(&mut self, id: ConnectionId) {
        self.identities.entry(id).or_default();
    }

    /// Stores the display name, substituting the placeholder for a missing
    /// or blank one, and returns the name now in effect.
    pub fn set_identity(
        &mut self,
        id: ConnectionId,
        name: Option<&str>,
    ) -> Result<String, RelayError> {
        let identity = self
            .identities
            .get_mut(&id)
            .ok_or(RelayError::NotRegistered(id))?;
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.default_name.as_str())
            .to_string();
        identity.name = Some(name.clone());
        Ok(name)
    }

    pub fn identity_of(&self, id: ConnectionId) -> Result<&str, RelayError> {
        let identity = self
            .identities
            .get(&id)
            .ok_or(RelayError::NotRegistered(id))?;
        Ok(identity.name.as_deref().unwrap_or(self.default_name.as_str()))
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.identities.contains_key(&id)
    }

    pub fn remember_queue(&mut self, id: ConnectionId, kind: QueueKind) {
        if let Some(identity) = self.identities.get_mut(&id) {
            identity.last_queue = Some(kind);
        }
    }

    pub fn last_queue(&self, id: ConnectionId) -> Option<QueueKind> {
        self.identities.get(&id).and_then(|identity| identity.last_queue)
    }

    pub fn forget(&mut self, id: ConnectionId) {
        self.identities.remove(&id);
    }
}
