//! Resolves an `event_type` string to a schema.
//!
//! The strict registry fails on an unregistered name; `LenientEventRegistry`
//! wraps it and swallows that failure into an open-schema `Unknown` value,
//! the way `LenientEventRegistry` in the original source falls back to an
//! `extra="allow"` model instead of raising `KeyError`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("event_type '{0}' is not registered")]
pub struct UnregisteredType(pub String);

/// A decoded event: either a value the registry recognized, or the raw
/// payload for a type name nobody registered a schema for.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisteredEvent {
    Known { event_type: String, payload: Value },
    Unknown { event_type: String, payload: Value },
}

impl RegisteredEvent {
    pub fn payload(&self) -> &Value {
        match self {
            RegisteredEvent::Known { payload, .. } => payload,
            RegisteredEvent::Unknown { payload, .. } => payload,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            RegisteredEvent::Known { event_type, .. } => event_type,
            RegisteredEvent::Unknown { event_type, .. } => event_type,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, RegisteredEvent::Known { .. })
    }
}

/// A schema validation/normalization hook, registered per `event_type`.
/// Most registrations just pass the payload through unchanged; the hook
/// exists for registries that want to validate shape at resolve time.
pub type SchemaFn = Arc<dyn Fn(&Value) -> Result<Value, UnregisteredType> + Send + Sync>;

/// Strict event-type registry: `type_for_name` fails for anything that was
/// never registered.
#[derive(Clone, Default)]
pub struct EventRegistry {
    schemas: HashMap<String, SchemaFn>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event_type: impl Into<String>, schema: SchemaFn) -> &mut Self {
        self.schemas.insert(event_type.into(), schema);
        self
    }

    /// Registers `event_type` with an identity schema (payload passes
    /// through verbatim). Covers the common case where the caller only
    /// wants to know the name was declared.
    pub fn register_open(&mut self, event_type: impl Into<String>) -> &mut Self {
        self.register(event_type, Arc::new(|v: &Value| Ok(v.clone())))
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.schemas.contains_key(event_type)
    }

    pub fn decode(&self, event_type: &str, payload: &Value) -> Result<RegisteredEvent, UnregisteredType> {
        let schema = self
            .schemas
            .get(event_type)
            .ok_or_else(|| UnregisteredType(event_type.to_string()))?;
        let decoded = schema(payload)?;
        Ok(RegisteredEvent::Known {
            event_type: event_type.to_string(),
            payload: decoded,
        })
    }
}

/// Decorator over any `EventRegistry` that never fails: an unregistered
/// `event_type` yields `RegisteredEvent::Unknown` instead of an error, so
/// consumers that only want raw payloads can still iterate every event.
pub struct LenientEventRegistry {
    inner: EventRegistry,
}

impl LenientEventRegistry {
    pub fn new(inner: EventRegistry) -> Self {
        Self { inner }
    }

    pub fn decode(&self, event_type: &str, payload: &Value) -> RegisteredEvent {
        match self.inner.decode(event_type, payload) {
            Ok(event) => event,
            Err(_) => RegisteredEvent::Unknown {
                event_type: event_type.to_string(),
                payload: payload.clone(),
            },
        }
    }
}
