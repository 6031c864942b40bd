use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single chat message, exactly as stored and as pushed on the wire.
///
/// Immutable once created. Both `id` and `created_at` are assigned by the
/// store: ids are strictly increasing per store, timestamps are unix-epoch
/// milliseconds and never decrease even if the wall clock steps backwards.
/// Ordering by `(created_at, id)` is total and stable.
///
/// The channel a message belongs to is the key it is stored and delivered
/// under, not a field of the record — wire shape stays
/// `{id, author, body, created_at}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub author: String,
    pub body: String,
    pub created_at: i64,
}

/// Per-connection identifier (random UUID, not persisted).
///
/// Issued by the connection manager on registration and echoed to the client
/// in the `hello` event, so HTTP submissions can name their originating
/// socket via the `X-Connection-Id` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_ids_are_unique() {
        assert_ne!(ConnId::new(), ConnId::new());
    }

    #[test]
    fn message_wire_shape() {
        let msg = Message {
            id: 7,
            author: "alice".into(),
            body: "hi".into(),
            created_at: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&msg).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["author", "body", "created_at", "id"]);
        assert_eq!(json["created_at"], 1_700_000_000_000_i64);
    }
}
