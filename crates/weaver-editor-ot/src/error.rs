//! Error types for OT documents and the editor bridge.

use thiserror::Error;

/// Errors reported by an OT document client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OtError {
    /// The server or client refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The document is not subscribed.
    #[error("document is not subscribed")]
    NotSubscribed,

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation could not be applied to the document.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The document no longer exists.
    #[error("document has been deleted")]
    Deleted,
}

/// Errors surfaced by the bridge through attach callbacks and the error handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BridgeError {
    /// Subscribing to the document failed; the bridge stays detached.
    #[error("failed to subscribe to document: {0}")]
    Subscribe(#[source] OtError),

    /// Creating the missing document failed; the bridge stays detached.
    #[error("failed to create document: {0}")]
    Create(#[source] OtError),

    /// A local operation was not accepted.
    #[error("failed to submit operation: {0}")]
    Submit(#[source] OtError),

    /// The document reported an error while attached.
    #[error("document error: {0}")]
    Document(#[source] OtError),

    /// The attach was overtaken by a later attach or detach.
    #[error("attach superseded by a later attach or detach")]
    Superseded,
}
