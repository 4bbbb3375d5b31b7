//! Core editor types: line/column positions, change notifications, listener handles.
//!
//! These types are framework-agnostic and can be used with any text buffer implementation.

use smol_str::SmolStr;

/// A location in the buffer as a line index and a column.
///
/// Both are zero-based. The column counts chars (Unicode scalar values)
/// from the start of the line, NOT bytes or UTF-16 units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Zero-based line index.
    pub line: usize,
    /// Char column within the line.
    pub ch: usize,
}

impl Position {
    /// Create a new position.
    pub fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }

    /// The first position of any buffer.
    pub fn origin() -> Self {
        Self::default()
    }
}

impl From<(usize, usize)> for Position {
    fn from((line, ch): (usize, usize)) -> Self {
        Self { line, ch }
    }
}

/// A primitive edit about to be applied to an editor surface.
///
/// Delivered to before-change listeners while the buffer still holds the
/// pre-edit text, so `from`/`to` and any text read through them describe
/// what is being replaced. `text` holds the replacement split into lines;
/// an empty replacement is a single empty line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChange {
    /// Start of the replaced range.
    pub from: Position,
    /// End of the replaced range (equal to `from` for pure insertions).
    pub to: Position,
    /// Replacement text, one entry per line.
    pub text: Vec<SmolStr>,
}

impl TextChange {
    /// Create a change replacing `from..to` with `text`.
    ///
    /// The positions are reordered if given backwards.
    pub fn new(from: Position, to: Position, text: &str) -> Self {
        let (from, to) = if to < from { (to, from) } else { (from, to) };
        Self {
            from,
            to,
            text: text.split('\n').map(SmolStr::from).collect(),
        }
    }

    /// The replacement text with line breaks restored.
    pub fn inserted_text(&self) -> String {
        self.text.join("\n")
    }

    /// Whether the change inserts any content.
    pub fn inserts(&self) -> bool {
        self.text.len() > 1 || self.text.first().is_some_and(|line| !line.is_empty())
    }

    /// Whether the change removes a non-empty range.
    pub fn removes(&self) -> bool {
        self.from != self.to
    }

    /// True when the change neither inserts nor removes anything.
    pub fn is_noop(&self) -> bool {
        !self.inserts() && !self.removes()
    }
}

/// Handle returned when registering a listener, used to unregister it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wrap a raw listener number.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw listener number.
    pub fn get(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_ordering() {
        assert!(Position::new(0, 9) < Position::new(1, 0));
        assert!(Position::new(2, 1) > Position::new(2, 0));
        assert_eq!(Position::origin(), Position::new(0, 0));
    }

    #[test]
    fn test_change_splits_lines() {
        let change = TextChange::new(Position::new(0, 0), Position::new(0, 0), "ab\ncd");
        assert_eq!(change.text, vec![SmolStr::new("ab"), SmolStr::new("cd")]);
        assert_eq!(change.inserted_text(), "ab\ncd");
        assert!(change.inserts());
        assert!(!change.removes());
    }

    #[test]
    fn test_bare_newline_is_content() {
        // ["", ""] joins to "\n"
        let change = TextChange::new(Position::new(1, 2), Position::new(1, 2), "\n");
        assert!(change.inserts());
        assert_eq!(change.inserted_text(), "\n");
    }

    #[test]
    fn test_empty_replacement() {
        let change = TextChange::new(Position::new(0, 4), Position::new(0, 1), "");
        assert_eq!(change.from, Position::new(0, 1));
        assert_eq!(change.to, Position::new(0, 4));
        assert_eq!(change.text, vec![SmolStr::default()]);
        assert!(!change.inserts());
        assert!(change.removes());
        assert!(!change.is_noop());

        let nothing = TextChange::new(Position::new(3, 3), Position::new(3, 3), "");
        assert!(nothing.is_noop());
    }
}
