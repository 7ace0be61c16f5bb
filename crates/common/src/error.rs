//! Engine error types (thiserror-based).

use thiserror::Error;

use crate::types::RequestId;

/// Errors surfaced at the codec boundary or routed to the provider log.
///
/// Pipeline-internal failures never cross runner boundaries as errors;
/// they are delivered to the UI runtime as null frames or empty info
/// lists. These variants carry the diagnostic detail for those paths
/// and the real error values for the synchronous binding surface.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid image descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("failed to fetch platform image (request {request_id}, url {url})")]
    Fetch { request_id: RequestId, url: String },

    #[error("no platform image retained (request {request_id}, url {url})")]
    MissingImage { request_id: RequestId, url: String },

    #[error("failed to decode bitmap (request {request_id}, url {url})")]
    Decode { request_id: RequestId, url: String },

    #[error("failed to upload texture (request {request_id}, url {url})")]
    Upload { request_id: RequestId, url: String },

    #[error("codec manager is not installed")]
    ManagerNotInstalled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
