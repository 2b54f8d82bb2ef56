pub mod client;
pub mod config;
pub mod encode;
pub mod gemini;
pub mod schema;
pub mod transport;

pub use client::{
    parse_transactions, ApiKeySource, ExtractionClient, ExtractionError, Extractor, ResponseError,
    EXTRACTION_FAILED_MESSAGE, MISSING_CREDENTIAL_MESSAGE,
};
pub use config::{ConfigError, ExtractionConfig};
pub use encode::{media_type_for_path, ImagePayload};
pub use gemini::GeminiTransport;
pub use schema::{response_schema, GenerateRequest};
pub use transport::{MockReply, MockTransport, Transport, TransportError};
