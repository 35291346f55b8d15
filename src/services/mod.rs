pub mod data_sources;
pub mod narrative_client;
pub mod protocol_validator;
pub mod result_cache;
pub mod session_store;

pub use data_sources::{subject_slug, DataSourceClient, HttpDataSource};
pub use narrative_client::{NarrativeClient, NarrativeGenerator, StaticNarrator};
pub use protocol_validator::{ProtocolInfo, ProtocolValidator, DEFAULT_PROTOCOLS};
pub use result_cache::AssessmentCache;
pub use session_store::{SessionStore, SessionSummary};
