//! In-process OT document.
//!
//! `MemoryDocument` behaves like a client whose server always accepts
//! operations in submission order: submitted operations apply immediately and
//! emit an `op` event tagged with their source, while the acknowledgment waits
//! in a queue until [`MemoryDocument::flush_acks`] delivers it. Traffic from
//! other clients is injected with [`MemoryDocument::apply_remote`] and friends.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use serde_json::{Map, Value};
use smol_str::SmolStr;
use weaver_editor_core::ListenerId;

use crate::client::{Callback, DeleteListener, ErrorListener, OpListener, OtDocumentClient};
use crate::ops::{Operation, TEXT_OP_KIND, apply_fragments};
use crate::OtError;

#[derive(Default)]
struct DocState {
    data: Option<Value>,
    version: u64,
    subscribed: bool,
}

#[derive(Default)]
struct Listeners {
    op: Vec<(ListenerId, OpListener)>,
    delete: Vec<(ListenerId, DeleteListener)>,
    error: Vec<(ListenerId, ErrorListener)>,
}

#[derive(Default)]
struct Faults {
    subscribe: Option<OtError>,
    create: Option<OtError>,
    submit: Option<OtError>,
}

/// In-process [`OtDocumentClient`] with controllable timing and failures.
#[derive(Default)]
pub struct MemoryDocument {
    name: SmolStr,
    state: RefCell<DocState>,
    listeners: RefCell<Listeners>,
    next_listener: Cell<u64>,
    faults: RefCell<Faults>,
    defer_subscribe: Cell<bool>,
    pending_subscribe: RefCell<Option<Callback>>,
    pending_acks: RefCell<VecDeque<(Callback, Result<(), OtError>)>>,
    submitted: RefCell<Vec<Operation>>,
}

impl MemoryDocument {
    /// A document that does not exist yet.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// An existing document holding `data`, at version 1.
    pub fn with_data(name: impl Into<SmolStr>, data: Value) -> Self {
        let doc = Self::new(name);
        {
            let mut state = doc.state.borrow_mut();
            state.data = Some(data);
            state.version = 1;
        }
        doc
    }

    /// An existing document with a single string field.
    pub fn with_text(name: impl Into<SmolStr>, field: &str, text: &str) -> Self {
        let mut data = Map::new();
        data.insert(field.to_owned(), Value::String(text.to_owned()));
        Self::with_data(name, Value::Object(data))
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.borrow().subscribed
    }

    /// Hold subscribe callbacks until [`complete_subscribe`](Self::complete_subscribe).
    pub fn defer_subscribe(&self) {
        self.defer_subscribe.set(true);
    }

    /// Deliver a deferred subscribe callback. Returns false if none was waiting.
    pub fn complete_subscribe(&self) -> bool {
        let Some(callback) = self.pending_subscribe.borrow_mut().take() else {
            return false;
        };
        self.state.borrow_mut().subscribed = true;
        callback(Ok(()));
        true
    }

    /// Fail the next subscribe with `err`.
    pub fn fail_next_subscribe(&self, err: OtError) {
        self.faults.borrow_mut().subscribe = Some(err);
    }

    /// Fail the next create with `err`.
    pub fn fail_next_create(&self, err: OtError) {
        self.faults.borrow_mut().create = Some(err);
    }

    /// Reject the next submitted operation with `err`. The operation is not applied.
    pub fn fail_next_submit(&self, err: OtError) {
        self.faults.borrow_mut().submit = Some(err);
    }

    /// Deliver every queued acknowledgment. Returns how many were delivered.
    pub fn flush_acks(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.pending_acks.borrow_mut().pop_front();
            let Some((callback, result)) = next else {
                break;
            };
            callback(result);
            delivered += 1;
        }
        delivered
    }

    pub fn pending_acks(&self) -> usize {
        self.pending_acks.borrow().len()
    }

    /// Operations accepted from local submitters, in order.
    pub fn submitted_ops(&self) -> Vec<Operation> {
        self.submitted.borrow().clone()
    }

    /// Number of registered listeners of all kinds.
    pub fn listener_count(&self) -> usize {
        let listeners = self.listeners.borrow();
        listeners.op.len() + listeners.delete.len() + listeners.error.len()
    }

    /// Apply an operation from another client and notify listeners without an origin tag.
    pub fn apply_remote(&self, op: &Operation) -> Result<(), OtError> {
        self.apply(op)?;
        self.emit_op(op, None);
        Ok(())
    }

    /// Delete the document on behalf of another client.
    pub fn delete_remote(&self) {
        let previous = {
            let mut state = self.state.borrow_mut();
            state.version += 1;
            state.data.take()
        };
        let listeners: Vec<_> = self
            .listeners
            .borrow()
            .delete
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(previous.as_ref(), None);
        }
    }

    /// Report a runtime error to error listeners.
    pub fn emit_error(&self, err: OtError) {
        let listeners: Vec<_> = self
            .listeners
            .borrow()
            .error
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&err);
        }
    }

    fn allocate_listener(&self) -> ListenerId {
        let raw = self.next_listener.get() + 1;
        self.next_listener.set(raw);
        ListenerId::new(raw)
    }

    /// Apply every part of `op` to the data, all or nothing.
    fn apply(&self, op: &Operation) -> Result<(), OtError> {
        let mut state = self.state.borrow_mut();
        let Some(Value::Object(fields)) = state.data.as_ref() else {
            return Err(OtError::Rejected(format!(
                "document {} does not exist",
                self.name
            )));
        };
        let mut fields = fields.clone();
        for part in op.parts() {
            if part.kind != TEXT_OP_KIND {
                return Err(OtError::InvalidOperation(format!(
                    "unsupported operation type {}",
                    part.kind
                )));
            }
            let [field] = part.path.as_slice() else {
                return Err(OtError::InvalidOperation(format!(
                    "unsupported path {:?}",
                    part.path
                )));
            };
            let current = fields
                .get(field.as_str())
                .and_then(Value::as_str)
                .ok_or_else(|| OtError::InvalidOperation(format!("field {field} is not text")))?;
            let updated = apply_fragments(current, &part.fragments)?;
            fields.insert(field.to_string(), Value::String(updated));
        }
        state.data = Some(Value::Object(fields));
        state.version += 1;
        Ok(())
    }

    fn emit_op(&self, op: &Operation, source: Option<&str>) {
        let listeners: Vec<_> = self
            .listeners
            .borrow()
            .op
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(op, source);
        }
    }
}

impl OtDocumentClient for MemoryDocument {
    fn name(&self) -> SmolStr {
        self.name.clone()
    }

    fn exists(&self) -> bool {
        self.state.borrow().data.is_some()
    }

    fn data(&self) -> Option<Value> {
        self.state.borrow().data.clone()
    }

    fn version(&self) -> u64 {
        self.state.borrow().version
    }

    fn subscribe(&self, callback: Callback) {
        if let Some(err) = self.faults.borrow_mut().subscribe.take() {
            callback(Err(err));
            return;
        }
        if self.defer_subscribe.get() {
            self.pending_subscribe.replace(Some(callback));
            return;
        }
        self.state.borrow_mut().subscribed = true;
        callback(Ok(()));
    }

    fn create(&self, data: Value, callback: Callback) {
        if let Some(err) = self.faults.borrow_mut().create.take() {
            callback(Err(err));
            return;
        }
        {
            let mut state = self.state.borrow_mut();
            if state.data.is_some() {
                drop(state);
                callback(Err(OtError::Rejected(format!(
                    "document {} already exists",
                    self.name
                ))));
                return;
            }
            state.data = Some(data);
            state.version += 1;
        }
        callback(Ok(()));
    }

    fn submit_op(&self, op: Operation, source: &str, callback: Callback) {
        if !self.is_subscribed() {
            self.pending_acks
                .borrow_mut()
                .push_back((callback, Err(OtError::NotSubscribed)));
            return;
        }
        let fault = self.faults.borrow_mut().submit.take();
        let result = match fault {
            Some(err) => Err(err),
            None => self.apply(&op),
        };
        if result.is_ok() {
            self.submitted.borrow_mut().push(op.clone());
            self.emit_op(&op, Some(source));
        }
        self.pending_acks.borrow_mut().push_back((callback, result));
    }

    fn on_op(&self, listener: OpListener) -> ListenerId {
        let id = self.allocate_listener();
        self.listeners.borrow_mut().op.push((id, listener));
        id
    }

    fn on_delete(&self, listener: DeleteListener) -> ListenerId {
        let id = self.allocate_listener();
        self.listeners.borrow_mut().delete.push((id, listener));
        id
    }

    fn on_error(&self, listener: ErrorListener) -> ListenerId {
        let id = self.allocate_listener();
        self.listeners.borrow_mut().error.push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.op.len() + listeners.delete.len() + listeners.error.len();
        listeners.op.retain(|(existing, _)| *existing != id);
        listeners.delete.retain(|(existing, _)| *existing != id);
        listeners.error.retain(|(existing, _)| *existing != id);
        before != listeners.op.len() + listeners.delete.len() + listeners.error.len()
    }
}
