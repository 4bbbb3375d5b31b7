//! The capabilities the bridge needs from an OT document client.
//!
//! Transport, subscription bookkeeping and the transform algorithm all live
//! behind this trait. Acknowledgments arrive through callbacks, possibly long
//! after the call returned.

use std::rc::Rc;

use serde_json::Value;
use smol_str::SmolStr;
use weaver_editor_core::ListenerId;

use crate::OtError;
use crate::ops::Operation;

/// Completion callback for subscribe, create and submit.
pub type Callback = Box<dyn FnOnce(Result<(), OtError>)>;

/// Receives every applied operation with its origin tag.
///
/// Operations submitted through this client carry the submitter's tag;
/// operations from other clients carry none.
pub type OpListener = Rc<dyn Fn(&Operation, Option<&str>)>;

/// Receives the data the document held before deletion, with its origin tag.
pub type DeleteListener = Rc<dyn Fn(Option<&Value>, Option<&str>)>;

/// Receives runtime errors reported by the document.
pub type ErrorListener = Rc<dyn Fn(&OtError)>;

/// A replicated JSON document that accepts text operations.
pub trait OtDocumentClient {
    /// Identifier used in diagnostics and snapshot caching.
    fn name(&self) -> SmolStr;

    /// Whether the document has been created.
    fn exists(&self) -> bool;

    /// Current document data, if it exists.
    fn data(&self) -> Option<Value>;

    /// Version counter, bumped by every applied operation.
    fn version(&self) -> u64;

    /// Start receiving updates. The callback runs once the current state is loaded.
    fn subscribe(&self, callback: Callback);

    /// Create the document with `data`.
    fn create(&self, data: Value, callback: Callback);

    /// Submit an operation tagged with `source`. The callback runs on acknowledgment.
    fn submit_op(&self, op: Operation, source: &str, callback: Callback);

    fn on_op(&self, listener: OpListener) -> ListenerId;

    fn on_delete(&self, listener: DeleteListener) -> ListenerId;

    fn on_error(&self, listener: ErrorListener) -> ListenerId;

    /// Unregister a listener of any kind. Returns false if it was unknown.
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// String value of a top-level field.
    fn field_text(&self, field: &str) -> Option<String> {
        self.data()?
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}
