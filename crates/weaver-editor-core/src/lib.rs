//! weaver-editor-core: Pure Rust editor logic without framework dependencies.
//!
//! This crate provides:
//! - `TextBuffer` trait for text storage and line/column conversion
//! - `EditorRope` - ropey-backed implementation
//! - `EditorSurface` trait - what a sync layer needs from an editor
//! - `RopeSurface` - transactional in-process surface with change listeners

pub mod surface;
pub mod text;
pub mod types;

pub use smol_str::SmolStr;
pub use surface::{
    BeforeChangeListener, ChangesAppliedListener, EditorContent, EditorSurface, RopeSurface,
};
pub use text::{EditorRope, TextBuffer};
pub use types::{ListenerId, Position, TextChange};
