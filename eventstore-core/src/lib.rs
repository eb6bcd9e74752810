pub mod backoff;
pub mod codec;
pub mod errors;
pub mod event_store;
pub mod registry;
pub mod types;

pub use backoff::Backoff;
pub use codec::{Codec, CodecError, Decodable, Encodable};
pub use errors::StoreError;
pub use event_store::{EventHandler, EventStore};
pub use registry::{EventRegistry, LenientEventRegistry, RegisteredEvent, UnregisteredType};
pub use types::{
    expected_stored_version, Aggregate, LoadAllOptions, LoadStreamOptions, NewEvent,
    RecordedEvent, SubCheckpoint, EMPTY_STREAM_VERSION,
};
