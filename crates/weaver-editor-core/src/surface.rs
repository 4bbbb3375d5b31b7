//! Editor surfaces: the mutable, listener-bearing side of a synced document.
//!
//! `EditorSurface` is the narrow capability set a sync layer needs from an
//! editor: position conversion, range reads and writes, change listeners and
//! content swapping. `RopeSurface` is the in-process implementation backed by
//! `EditorRope`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::text::{EditorRope, TextBuffer};
use crate::types::{ListenerId, Position, TextChange};

/// Called before each primitive edit, while the buffer still holds the old text.
pub type BeforeChangeListener = Rc<dyn Fn(&TextChange)>;

/// Called once per transaction after all of its edits have been applied.
pub type ChangesAppliedListener = Rc<dyn Fn()>;

/// Content object an editor surface displays.
///
/// Cloning yields another handle to the same content, so a sync layer can
/// keep a handle around after swapping it out and swap it back in later.
/// The synced version records which remote document version the content
/// last matched.
#[derive(Clone, Default)]
pub struct EditorContent {
    inner: Rc<ContentInner>,
}

#[derive(Default)]
struct ContentInner {
    rope: RefCell<EditorRope>,
    synced_version: Cell<Option<u64>>,
}

impl EditorContent {
    /// Create content holding `text`.
    pub fn new(text: &str) -> Self {
        Self {
            inner: Rc::new(ContentInner {
                rope: RefCell::new(EditorRope::from_str(text)),
                synced_version: Cell::new(None),
            }),
        }
    }

    /// Full text of the content.
    pub fn text(&self) -> String {
        self.inner.rope.borrow().to_string()
    }

    /// Version this content was last known to match, if recorded.
    pub fn synced_version(&self) -> Option<u64> {
        self.inner.synced_version.get()
    }

    /// Record the version this content matches.
    pub fn set_synced_version(&self, version: u64) {
        self.inner.synced_version.set(Some(version));
    }

    /// Whether both handles refer to the same content.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` with read access to the underlying buffer.
    pub fn with_buffer<R>(&self, f: impl FnOnce(&EditorRope) -> R) -> R {
        f(&self.inner.rope.borrow())
    }

    fn with_buffer_mut<R>(&self, f: impl FnOnce(&mut EditorRope) -> R) -> R {
        f(&mut self.inner.rope.borrow_mut())
    }
}

impl std::fmt::Debug for EditorContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorContent")
            .field("len_chars", &self.with_buffer(|b| b.len_chars()))
            .field("synced_version", &self.synced_version())
            .finish()
    }
}

/// Capabilities a sync layer needs from an editor.
///
/// All methods take `&self`: surfaces are shared between the host and the
/// listeners they call back into, so mutation goes through interior
/// mutability. Mutating methods notify before-change listeners for every
/// primitive edit and changes-applied listeners once per transaction.
pub trait EditorSurface {
    /// Char offset of a position in the current text (clamped).
    fn offset_from_position(&self, pos: Position) -> usize;

    /// Position of a char offset in the current text (clamped).
    fn position_from_offset(&self, offset: usize) -> Position;

    /// Text between two positions.
    fn get_range(&self, from: Position, to: Position) -> String;

    /// Replace `from..to` with `text`. A missing `to` inserts at `from`.
    fn replace_range(&self, text: &str, from: Position, to: Option<Position>);

    /// Replace the chars `from..to` with `text`. Offsets are clamped.
    ///
    /// Unlike positions, offsets address every gap in the text, including
    /// the one inside a `\r\n` pair.
    fn replace_offsets(&self, text: &str, from: usize, to: usize);

    /// The whole text.
    fn full_text(&self) -> String;

    /// Replace the whole text.
    fn set_full_text(&self, text: &str);

    /// Handle to the content currently displayed.
    fn content(&self) -> EditorContent;

    /// Display `content` instead, returning the previous content.
    ///
    /// Swapping is not an edit and notifies no listeners.
    fn swap_content(&self, content: EditorContent) -> EditorContent;

    /// Register a before-change listener.
    fn on_before_change(&self, listener: BeforeChangeListener) -> ListenerId;

    /// Register a changes-applied listener.
    fn on_changes_applied(&self, listener: ChangesAppliedListener) -> ListenerId;

    /// Unregister a listener of either kind. Returns false if it was unknown.
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// In-process editor surface over an `EditorRope`.
///
/// Edits are grouped into transactions. Outside an explicit
/// [`transaction`](RopeSurface::transaction) every mutation is its own
/// transaction.
#[derive(Default)]
pub struct RopeSurface {
    content: RefCell<EditorContent>,
    before_change: RefCell<Vec<(ListenerId, BeforeChangeListener)>>,
    changes_applied: RefCell<Vec<(ListenerId, ChangesAppliedListener)>>,
    next_listener: Cell<u64>,
    txn_depth: Cell<usize>,
    txn_dirty: Cell<bool>,
}

impl RopeSurface {
    /// Create an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a surface displaying `text`.
    pub fn with_text(text: &str) -> Self {
        Self {
            content: RefCell::new(EditorContent::new(text)),
            ..Self::default()
        }
    }

    /// Group every edit made inside `f` into one transaction.
    ///
    /// Changes-applied listeners fire once when the outermost transaction
    /// ends, and only if something was edited.
    pub fn transaction<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.txn_depth.set(self.txn_depth.get() + 1);
        let result = f(self);
        let depth = self.txn_depth.get() - 1;
        self.txn_depth.set(depth);
        if depth == 0 && self.txn_dirty.replace(false) {
            self.notify_applied();
        }
        result
    }

    /// Number of registered listeners of both kinds.
    pub fn listener_count(&self) -> usize {
        self.before_change.borrow().len() + self.changes_applied.borrow().len()
    }

    fn allocate_listener(&self) -> ListenerId {
        let raw = self.next_listener.get() + 1;
        self.next_listener.set(raw);
        ListenerId::new(raw)
    }

    fn current(&self) -> EditorContent {
        self.content.borrow().clone()
    }

    /// Apply one primitive edit over chars `start..end`. Must run inside a transaction.
    fn apply_edit(&self, start: usize, end: usize, text: &str) {
        let content = self.current();
        let (start, end, change) = content.with_buffer(|b| {
            let len = b.len_chars();
            let (start, end) = (start.min(len), end.min(len));
            let (start, end) = if end < start { (end, start) } else { (start, end) };
            let change = TextChange::new(b.offset_to_position(start), b.offset_to_position(end), text);
            (start, end, change)
        });
        if start == end && text.is_empty() {
            return;
        }

        // Listeners may read the surface, so no borrow is held while they run.
        let listeners: Vec<_> = self
            .before_change
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&change);
        }

        let content = self.current();
        content.with_buffer_mut(|b| b.replace(start..end, text));
        tracing::trace!(from = ?change.from, to = ?change.to, inserted = text.len(), "surface edit");
        self.txn_dirty.set(true);
    }

    fn notify_applied(&self) {
        let listeners: Vec<_> = self
            .changes_applied
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl EditorSurface for RopeSurface {
    fn offset_from_position(&self, pos: Position) -> usize {
        self.current().with_buffer(|b| b.position_to_offset(pos))
    }

    fn position_from_offset(&self, offset: usize) -> Position {
        self.current().with_buffer(|b| b.offset_to_position(offset))
    }

    fn get_range(&self, from: Position, to: Position) -> String {
        self.current().with_buffer(|b| {
            let start = b.position_to_offset(from);
            let end = b.position_to_offset(to);
            let (start, end) = if end < start { (end, start) } else { (start, end) };
            b.slice(start..end).map(|s| s.to_string()).unwrap_or_default()
        })
    }

    fn replace_range(&self, text: &str, from: Position, to: Option<Position>) {
        let (start, end) = self.current().with_buffer(|b| {
            (b.position_to_offset(from), b.position_to_offset(to.unwrap_or(from)))
        });
        self.replace_offsets(text, start, end);
    }

    fn replace_offsets(&self, text: &str, from: usize, to: usize) {
        self.transaction(|surface| surface.apply_edit(from, to, text));
    }

    fn full_text(&self) -> String {
        self.current().text()
    }

    fn set_full_text(&self, text: &str) {
        let end = self.current().with_buffer(|b| b.len_chars());
        self.replace_offsets(text, 0, end);
    }

    fn content(&self) -> EditorContent {
        self.current()
    }

    fn swap_content(&self, content: EditorContent) -> EditorContent {
        self.content.replace(content)
    }

    fn on_before_change(&self, listener: BeforeChangeListener) -> ListenerId {
        let id = self.allocate_listener();
        self.before_change.borrow_mut().push((id, listener));
        id
    }

    fn on_changes_applied(&self, listener: ChangesAppliedListener) -> ListenerId {
        let id = self.allocate_listener();
        self.changes_applied.borrow_mut().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut removed = false;
        self.before_change.borrow_mut().retain(|(existing, _)| {
            let keep = *existing != id;
            removed |= !keep;
            keep
        });
        self.changes_applied.borrow_mut().retain(|(existing, _)| {
            let keep = *existing != id;
            removed |= !keep;
            keep
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(surface: &RopeSurface) -> (Rc<RefCell<Vec<(TextChange, String)>>>, Rc<Cell<usize>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let applied = Rc::new(Cell::new(0));
        let content = surface.content();
        let seen_in = seen.clone();
        surface.on_before_change(Rc::new(move |change: &TextChange| {
            seen_in.borrow_mut().push((change.clone(), content.text()));
        }));
        let applied_in = applied.clone();
        surface.on_changes_applied(Rc::new(move || applied_in.set(applied_in.get() + 1)));
        (seen, applied)
    }

    #[test]
    fn test_before_change_sees_old_text() {
        let surface = RopeSurface::with_text("hello world");
        let (seen, applied) = recording(&surface);

        surface.replace_range("there", Position::new(0, 6), Some(Position::new(0, 11)));

        assert_eq!(surface.full_text(), "hello there");
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, "hello world");
        assert_eq!(seen[0].0.from, Position::new(0, 6));
        assert_eq!(applied.get(), 1);
    }

    #[test]
    fn test_transaction_fires_applied_once() {
        let surface = RopeSurface::with_text("abc");
        let (seen, applied) = recording(&surface);

        surface.transaction(|s| {
            s.replace_range("X", Position::new(0, 0), None);
            s.replace_range("Y", Position::new(0, 4), None);
        });

        assert_eq!(surface.full_text(), "XabcY");
        assert_eq!(seen.borrow().len(), 2);
        // second edit observed the first one already applied
        assert_eq!(seen.borrow()[1].1, "Xabc");
        assert_eq!(applied.get(), 1);
    }

    #[test]
    fn test_noop_edit_is_silent() {
        let surface = RopeSurface::with_text("abc");
        let (seen, applied) = recording(&surface);
        surface.replace_range("", Position::new(0, 1), None);
        assert!(seen.borrow().is_empty());
        assert_eq!(applied.get(), 0);
    }

    #[test]
    fn test_set_full_text_multiline() {
        let surface = RopeSurface::with_text("one\ntwo");
        surface.set_full_text("three\nfour\nfive");
        insta::assert_snapshot!(surface.full_text(), @r"
        three
        four
        five
        ");
        assert_eq!(surface.position_from_offset(8), Position::new(1, 2));
        assert_eq!(surface.offset_from_position(Position::new(2, 1)), 12);
    }

    #[test]
    fn test_replace_offsets_inside_crlf() {
        let surface = RopeSurface::with_text("ab\r\ncd");
        let (seen, applied) = recording(&surface);

        // Offset 3 sits between \r and \n and has no position of its own.
        surface.replace_offsets("X", 3, 3);

        assert_eq!(surface.full_text(), "ab\rX\ncd");
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(applied.get(), 1);

        surface.replace_offsets("", 4, 2);
        assert_eq!(surface.full_text(), "ab\ncd");
        surface.replace_offsets("!", 99, 99);
        assert_eq!(surface.full_text(), "ab\ncd!");
    }

    #[test]
    fn test_get_range_across_lines() {
        let surface = RopeSurface::with_text("one\ntwo\nthree");
        assert_eq!(surface.get_range(Position::new(0, 2), Position::new(2, 1)), "e\ntwo\nt");
        assert_eq!(surface.get_range(Position::new(2, 1), Position::new(0, 2)), "e\ntwo\nt");
    }

    #[test]
    fn test_swap_content_is_silent() {
        let surface = RopeSurface::with_text("first");
        let (seen, applied) = recording(&surface);

        let other = EditorContent::new("second");
        let previous = surface.swap_content(other.clone());

        assert_eq!(previous.text(), "first");
        assert_eq!(surface.full_text(), "second");
        assert!(surface.content().ptr_eq(&other));
        assert!(seen.borrow().is_empty());
        assert_eq!(applied.get(), 0);

        surface.replace_range("!", Position::new(0, 6), None);
        assert_eq!(other.text(), "second!");
    }

    #[test]
    fn test_remove_listener() {
        let surface = RopeSurface::new();
        let hits = Rc::new(Cell::new(0));
        let hits_in = hits.clone();
        let id = surface.on_changes_applied(Rc::new(move || hits_in.set(hits_in.get() + 1)));
        assert_eq!(surface.listener_count(), 1);

        surface.replace_range("a", Position::origin(), None);
        assert!(surface.remove_listener(id));
        assert!(!surface.remove_listener(id));
        surface.replace_range("b", Position::origin(), None);

        assert_eq!(hits.get(), 1);
        assert_eq!(surface.listener_count(), 0);
    }
}
