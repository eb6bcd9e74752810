//! Translates between domain event values and the
//! `{event_type, json_payload}` pair the store persists.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode event payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode event payload as {target}: {source}")]
    Decode {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A domain event type with a stable, registered name.
pub trait Encodable: serde::Serialize {
    fn event_type() -> &'static str;
}

/// The inverse of `Encodable`: reconstructs a value from its payload.
pub trait Decodable: serde::de::DeserializeOwned {
    fn event_type() -> &'static str;
}

/// Stateless translation between typed events and `(event_type, json)`.
pub struct Codec;

impl Codec {
    pub fn encode<E: Encodable>(event: &E) -> Result<(String, Value), CodecError> {
        let json = serde_json::to_value(event).map_err(CodecError::Encode)?;
        Ok((E::event_type().to_string(), json))
    }

    pub fn decode<E: Decodable>(payload: &Value) -> Result<E, CodecError> {
        serde_json::from_value(payload.clone()).map_err(|source| CodecError::Decode {
            target: E::event_type(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct CatCreated {
        cat_name: String,
    }

    impl Encodable for CatCreated {
        fn event_type() -> &'static str {
            "CatCreated"
        }
    }

    impl Decodable for CatCreated {
        fn event_type() -> &'static str {
            "CatCreated"
        }
    }

    #[test]
    fn round_trips_through_json() {
        let original = CatCreated {
            cat_name: "Mittens".into(),
        };
        let (event_type, json) = Codec::encode(&original).expect("encode");
        assert_eq!(event_type, "CatCreated");
        let decoded: CatCreated = Codec::decode(&json).expect("decode");
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_rejects_mismatched_shape() {
        let json = serde_json::json!({ "not_cat_name": 1 });
        let result: Result<CatCreated, _> = Codec::decode(&json);
        assert!(result.is_err());
    }
}
