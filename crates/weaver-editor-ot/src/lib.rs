//! Editor ⇄ OT document synchronization.
//!
//! This crate provides:
//! - `Operation` / `TextFragment`: text operations in the document's wire format
//! - `OtDocumentClient`: what the bridge needs from a document client
//! - `MemoryDocument`: in-process document for hosts without a server, and for tests
//! - `OtBridge`: keeps an `EditorSurface` and one document field convergent
//!
//! The bridge translates in both directions and never re-translates its own
//! writes: remote replays and divergence repairs run under an
//! `EchoSuppressor` guard that every listener checks first.

mod bridge;
mod client;
mod config;
mod error;
mod memory;
mod ops;
mod suppress;

pub use bridge::{AttachCallback, BridgeState, DELETED_SENTINEL, OtBridge, SUBMIT_SOURCE};
pub use client::{Callback, DeleteListener, ErrorListener, OpListener, OtDocumentClient};
pub use config::{BridgeOptions, DEFAULT_TRACKED_FIELD, ErrorHandler};
pub use error::{BridgeError, OtError};
pub use memory::MemoryDocument;
pub use ops::{
    FragmentShape, OpPart, Operation, TEXT_OP_KIND, TextFragment, apply_fragments,
    compact_fragments,
};
pub use suppress::{EchoSuppressor, SuppressionGuard};

// Re-export editor types consumers need alongside the bridge
pub use weaver_editor_core::{EditorContent, EditorSurface, Position, RopeSurface};
