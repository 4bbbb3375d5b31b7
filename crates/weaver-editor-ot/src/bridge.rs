//! Two-way sync between an editor surface and one field of an OT document.
//!
//! Local edits are collected from before-change notifications as offset
//! based fragments and submitted as one operation per editor transaction.
//! Remote operations addressed at the tracked field are replayed onto the
//! editor with echo suppression engaged. After every submission and every
//! replay the editor text is compared with the field and forcibly repaired on
//! mismatch.
//!
//! All listener closures hold a `Weak` reference to the bridge internals, so
//! the editor and document never keep a dropped bridge alive.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use smol_str::SmolStr;
use weaver_editor_core::{EditorContent, EditorSurface, ListenerId, TextChange};

use crate::client::OtDocumentClient;
use crate::config::{BridgeOptions, ErrorHandler};
use crate::ops::{FragmentShape, Operation, TextFragment, compact_fragments};
use crate::suppress::EchoSuppressor;
use crate::{BridgeError, OtError};

/// Text shown in the editor once the attached document is deleted.
pub const DELETED_SENTINEL: &str = "This document has been deleted.";

/// Origin tag on operations this bridge submits.
pub const SUBMIT_SOURCE: &str = "weaver-editor-ot";

/// Completion callback for [`OtBridge::attach`].
pub type AttachCallback = Box<dyn FnOnce(Result<(), BridgeError>)>;

/// Lifecycle of a bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    /// Nothing attached; no listeners registered.
    Detached,
    /// Subscription requested, waiting for the document.
    Attaching,
    /// Listeners registered, operations flow both ways.
    Attached,
}

enum Link<D> {
    Detached,
    Attaching { doc: Rc<D>, generation: u64 },
    Attached(Attachment<D>),
}

struct Attachment<D> {
    doc: Rc<D>,
    editor_listeners: Vec<ListenerId>,
    doc_listeners: Vec<ListenerId>,
}

/// Keeps one editor surface in sync with one OT document at a time.
pub struct OtBridge<E, D>
where
    E: EditorSurface + 'static,
    D: OtDocumentClient + 'static,
{
    inner: Rc<BridgeInner<E, D>>,
}

struct BridgeInner<E, D> {
    editor: Rc<E>,
    field: SmolStr,
    verbose: bool,
    error_handler: ErrorHandler,
    suppressor: EchoSuppressor,
    link: RefCell<Link<D>>,
    generation: Cell<u64>,
    /// Fragments of the editor transaction in progress, created on first use.
    batch: RefCell<Option<Vec<TextFragment>>>,
    /// Editor content per document name, reused on reattach while current.
    snapshots: RefCell<HashMap<SmolStr, EditorContent>>,
}

impl<E, D> OtBridge<E, D>
where
    E: EditorSurface + 'static,
    D: OtDocumentClient + 'static,
{
    pub fn new(editor: Rc<E>, options: BridgeOptions) -> Self {
        let error_handler = options.resolved_error_handler();
        Self {
            inner: Rc::new(BridgeInner {
                editor,
                field: options.tracked_field,
                verbose: options.verbose,
                error_handler,
                suppressor: EchoSuppressor::new(),
                link: RefCell::new(Link::Detached),
                generation: Cell::new(0),
                batch: RefCell::new(None),
                snapshots: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Attach to `doc`, detaching whatever was attached before.
    ///
    /// The callback (or, without one, the error handler) learns whether the
    /// subscription succeeded. It may run before `attach` returns.
    pub fn attach(&self, doc: Rc<D>, callback: Option<AttachCallback>) {
        self.inner.detach();
        let generation = self.inner.next_generation();
        *self.inner.link.borrow_mut() = Link::Attaching {
            doc: doc.clone(),
            generation,
        };
        tracing::info!(doc = %doc.name(), "subscribing to document");

        let weak = Rc::downgrade(&self.inner);
        let subscribed = doc.clone();
        doc.subscribe(Box::new(move |result| match weak.upgrade() {
            Some(inner) => inner.subscribed(subscribed, generation, result, callback),
            None => {
                if let Some(callback) = callback {
                    callback(Err(BridgeError::Superseded));
                }
            }
        }));
    }

    /// Detach from the current document. No-op when already detached.
    pub fn detach(&self) {
        self.inner.detach();
    }

    pub fn state(&self) -> BridgeState {
        match &*self.inner.link.borrow() {
            Link::Detached => BridgeState::Detached,
            Link::Attaching { .. } => BridgeState::Attaching,
            Link::Attached(_) => BridgeState::Attached,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.state() == BridgeState::Attached
    }

    /// The attached document, if any.
    pub fn document(&self) -> Option<Rc<D>> {
        self.inner.attached_document()
    }

    pub fn editor(&self) -> &Rc<E> {
        &self.inner.editor
    }

    pub fn tracked_field(&self) -> &str {
        &self.inner.field
    }

    /// Compare editor and document now, repairing the editor on mismatch.
    ///
    /// Returns true if the two already matched (or nothing is attached).
    pub fn audit(&self) -> bool {
        match self.inner.attached_document() {
            Some(doc) => self.inner.audit(&*doc),
            None => true,
        }
    }
}

impl<E, D> Drop for OtBridge<E, D>
where
    E: EditorSurface + 'static,
    D: OtDocumentClient + 'static,
{
    fn drop(&mut self) {
        self.inner.detach();
    }
}

impl<E, D> BridgeInner<E, D>
where
    E: EditorSurface + 'static,
    D: OtDocumentClient + 'static,
{
    fn next_generation(&self) -> u64 {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(&*self.link.borrow(), Link::Attaching { generation: g, .. } if *g == generation)
    }

    fn attached_document(&self) -> Option<Rc<D>> {
        match &*self.link.borrow() {
            Link::Attached(attachment) => Some(attachment.doc.clone()),
            _ => None,
        }
    }

    fn fail_attach(&self, callback: Option<AttachCallback>, err: BridgeError) {
        *self.link.borrow_mut() = Link::Detached;
        match callback {
            Some(callback) => callback(Err(err)),
            None => (self.error_handler)(&err),
        }
    }

    fn subscribed(
        self: Rc<Self>,
        doc: Rc<D>,
        generation: u64,
        result: Result<(), OtError>,
        callback: Option<AttachCallback>,
    ) {
        if !self.is_current(generation) {
            tracing::warn!(doc = %doc.name(), "ignoring subscription for superseded attach");
            if let Some(callback) = callback {
                callback(Err(BridgeError::Superseded));
            }
            return;
        }
        if let Err(err) = result {
            tracing::warn!(doc = %doc.name(), error = %err, "subscription failed");
            self.fail_attach(callback, BridgeError::Subscribe(err));
            return;
        }
        if doc.exists() {
            self.finish_attach(doc, callback);
            return;
        }

        tracing::info!(doc = %doc.name(), field = %self.field, "creating missing document");
        let mut initial = Map::new();
        initial.insert(self.field.to_string(), Value::String(String::new()));
        let weak = Rc::downgrade(&self);
        let created = doc.clone();
        doc.create(
            Value::Object(initial),
            Box::new(move |result| {
                let Some(inner) = weak.upgrade() else {
                    if let Some(callback) = callback {
                        callback(Err(BridgeError::Superseded));
                    }
                    return;
                };
                if !inner.is_current(generation) {
                    if let Some(callback) = callback {
                        callback(Err(BridgeError::Superseded));
                    }
                    return;
                }
                match result {
                    Ok(()) => inner.finish_attach(created, callback),
                    Err(err) => inner.fail_attach(callback, BridgeError::Create(err)),
                }
            }),
        );
    }

    fn finish_attach(self: Rc<Self>, doc: Rc<D>, callback: Option<AttachCallback>) {
        let name = doc.name();
        let version = doc.version();
        let content = {
            let mut snapshots = self.snapshots.borrow_mut();
            match snapshots.get(&name) {
                Some(cached) if cached.synced_version().is_some_and(|v| v >= version) => {
                    tracing::debug!(doc = %name, version, "reusing cached editor content");
                    cached.clone()
                }
                _ => {
                    let fresh = EditorContent::new(&self.document_text(&*doc));
                    snapshots.insert(name.clone(), fresh.clone());
                    fresh
                }
            }
        };
        self.editor.swap_content(content);

        let weak = Rc::downgrade(&self);
        let editor_listeners = vec![
            self.editor.on_before_change(Rc::new({
                let weak = weak.clone();
                move |change: &TextChange| {
                    if let Some(inner) = weak.upgrade() {
                        inner.collect_change(change);
                    }
                }
            })),
            self.editor.on_changes_applied(Rc::new({
                let weak = weak.clone();
                move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.flush_batch();
                    }
                }
            })),
        ];
        let doc_listeners = vec![
            doc.on_op(Rc::new({
                let weak = weak.clone();
                move |op: &Operation, source: Option<&str>| {
                    if let Some(inner) = weak.upgrade() {
                        inner.apply_remote(op, source);
                    }
                }
            })),
            doc.on_delete(Rc::new({
                let weak = weak.clone();
                move |_data: Option<&Value>, _source: Option<&str>| {
                    if let Some(inner) = weak.upgrade() {
                        inner.document_deleted();
                    }
                }
            })),
            doc.on_error(Rc::new({
                let weak = weak.clone();
                move |err: &OtError| {
                    if let Some(inner) = weak.upgrade() {
                        (inner.error_handler)(&BridgeError::Document(err.clone()));
                    }
                }
            })),
        ];

        *self.link.borrow_mut() = Link::Attached(Attachment {
            doc,
            editor_listeners,
            doc_listeners,
        });
        tracing::info!(doc = %name, version, "attached");
        if let Some(callback) = callback {
            callback(Ok(()));
        }
    }

    fn detach(&self) {
        let previous = std::mem::replace(&mut *self.link.borrow_mut(), Link::Detached);
        match previous {
            Link::Detached => {}
            Link::Attaching { doc, .. } => {
                self.next_generation();
                tracing::info!(doc = %doc.name(), "attach cancelled");
            }
            Link::Attached(attachment) => {
                self.next_generation();
                let version = attachment.doc.version();
                self.editor.content().set_synced_version(version);
                for id in attachment.editor_listeners {
                    self.editor.remove_listener(id);
                }
                for id in attachment.doc_listeners {
                    attachment.doc.remove_listener(id);
                }
                self.batch.borrow_mut().take();
                tracing::info!(doc = %attachment.doc.name(), version, "detached");
            }
        }
    }

    fn document_text(&self, doc: &D) -> String {
        doc.field_text(&self.field).unwrap_or_default()
    }

    /// Record one primitive edit, before it reaches the buffer.
    fn collect_change(&self, change: &TextChange) {
        if self.suppressor.is_engaged() {
            return;
        }
        let offset = self.editor.offset_from_position(change.from);
        let mut fragments = Vec::with_capacity(2);
        if change.removes() {
            let removed = self.editor.get_range(change.from, change.to);
            if !removed.is_empty() {
                fragments.push(TextFragment::delete(offset, removed));
            }
        }
        if change.inserts() {
            fragments.push(TextFragment::insert(offset, change.inserted_text()));
        }
        tracing::trace!(offset, ?fragments, "collected local change");
        self.batch
            .borrow_mut()
            .get_or_insert_with(Vec::new)
            .extend(fragments);
    }

    /// Submit the finished transaction as one operation.
    fn flush_batch(&self) {
        if self.suppressor.is_engaged() {
            return;
        }
        let Some(fragments) = self.batch.borrow_mut().take() else {
            return;
        };
        if fragments.is_empty() {
            return;
        }
        let Some(doc) = self.attached_document() else {
            return;
        };

        let fragments = compact_fragments(fragments);
        let replace = matches!(FragmentShape::of(&fragments), FragmentShape::Replace { .. });
        let op = Operation::text(self.field.clone(), fragments);
        if self.verbose {
            tracing::info!(doc = %doc.name(), replace, op = ?op, "submitting local operation");
        } else {
            tracing::debug!(
                doc = %doc.name(),
                replace,
                fragments = op.fragment_count(),
                "submitting local operation"
            );
        }

        // The acknowledgment may arrive after detach; it only ever reaches the handler.
        let handler = self.error_handler.clone();
        doc.submit_op(
            op,
            SUBMIT_SOURCE,
            Box::new(move |result| {
                if let Err(err) = result {
                    handler(&BridgeError::Submit(err));
                }
            }),
        );
        self.audit(&*doc);
    }

    /// Replay an incoming operation onto the editor.
    fn apply_remote(&self, op: &Operation, source: Option<&str>) {
        if self.suppressor.is_engaged() {
            return;
        }
        if source.is_some_and(|tag| !tag.is_empty()) {
            tracing::trace!(source, "skipping echo of own operation");
            return;
        }
        let Some(doc) = self.attached_document() else {
            return;
        };
        if self.verbose {
            tracing::info!(doc = %doc.name(), op = ?op, "applying remote operation");
        } else {
            tracing::debug!(
                doc = %doc.name(),
                fragments = op.fragment_count(),
                "applying remote operation"
            );
        }

        {
            let _guard = self.suppressor.engage();
            for part in op.parts() {
                if !part.targets(&self.field) {
                    tracing::trace!(path = ?part.path, kind = %part.kind, "skipping untracked part");
                    continue;
                }
                self.replay(&part.fragments);
            }
        }
        self.audit(&*doc);
    }

    /// Fragments are applied by char offset; positions cannot address the
    /// gap inside a `\r\n` pair.
    fn replay(&self, fragments: &[TextFragment]) {
        let editor = &self.editor;
        match FragmentShape::of(fragments) {
            FragmentShape::Replace {
                offset,
                deleted,
                inserted,
            } => {
                let end = offset.saturating_add(deleted.chars().count());
                editor.replace_offsets(inserted, offset, end);
            }
            FragmentShape::Sequence => {
                for fragment in fragments {
                    let offset = fragment.offset();
                    match fragment {
                        TextFragment::Insert { text, .. } => {
                            editor.replace_offsets(text, offset, offset)
                        }
                        TextFragment::Delete { .. } => {
                            let end = offset.saturating_add(fragment.char_len());
                            editor.replace_offsets("", offset, end);
                        }
                    }
                }
            }
        }
    }

    /// Returns true if editor and document matched.
    fn audit(&self, doc: &D) -> bool {
        let expected = self.document_text(doc);
        let actual = self.editor.full_text();
        if expected == actual {
            return true;
        }
        tracing::warn!(
            doc = %doc.name(),
            %expected,
            %actual,
            "editor diverged from document, resetting editor"
        );
        let _guard = self.suppressor.engage();
        self.editor.set_full_text(&expected);
        false
    }

    fn document_deleted(&self) {
        let name = self.attached_document().map(|doc| doc.name());
        self.detach();
        if let Some(name) = &name {
            self.snapshots.borrow_mut().remove(name);
            tracing::info!(doc = %name, "document deleted");
        }
        let _guard = self.suppressor.engage();
        self.editor.set_full_text(DELETED_SENTINEL);
    }
}
