//! Text buffer abstraction for editor storage.
//!
//! The `TextBuffer` trait provides a common interface for text storage and
//! for converting between linear char offsets and line/column positions.
//! `EditorRope` is the ropey-backed implementation used by editor surfaces.

use smol_str::{SmolStr, ToSmolStr};
use std::ops::Range;

use crate::types::Position;

/// A text buffer that supports efficient editing and offset conversion.
///
/// All offsets are in Unicode scalar values (chars), not bytes or UTF-16.
pub trait TextBuffer {
    /// Total length in chars (Unicode scalar values).
    fn len_chars(&self) -> usize;

    /// Check if empty.
    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    /// Insert text at char offset.
    fn insert(&mut self, char_offset: usize, text: &str);

    /// Delete char range.
    fn delete(&mut self, char_range: Range<usize>);

    /// Replace char range with text.
    fn replace(&mut self, char_range: Range<usize>, text: &str) {
        if !char_range.is_empty() {
            self.delete(char_range.clone());
        }
        if !text.is_empty() {
            self.insert(char_range.start, text);
        }
    }

    /// Get a slice as SmolStr. Returns None if range is invalid.
    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr>;

    /// Get character at offset. Returns None if out of bounds.
    fn char_at(&self, char_offset: usize) -> Option<char>;

    /// Convert entire buffer to String.
    fn to_string(&self) -> String;

    /// Number of lines. An empty buffer has one (empty) line.
    fn len_lines(&self) -> usize;

    /// Char offset of the first char of `line`.
    fn line_to_char(&self, line: usize) -> usize;

    /// Line index containing `char_offset`.
    fn char_to_line(&self, char_offset: usize) -> usize;

    /// Length of `line` in chars, not counting its line break.
    fn line_len(&self, line: usize) -> usize;

    /// Convert a char offset to a line/column position.
    ///
    /// Offsets past the end are clamped to the end of the buffer.
    fn offset_to_position(&self, char_offset: usize) -> Position {
        let offset = char_offset.min(self.len_chars());
        let line = self.char_to_line(offset);
        Position::new(line, offset - self.line_to_char(line))
    }

    /// Convert a line/column position to a char offset.
    ///
    /// A line past the last one maps to the end of the buffer, a column past
    /// the end of its line maps to the end of that line.
    fn position_to_offset(&self, pos: Position) -> usize {
        if pos.line >= self.len_lines() {
            return self.len_chars();
        }
        self.line_to_char(pos.line) + pos.ch.min(self.line_len(pos.line))
    }

    /// Clamp a position to a location that exists in the buffer.
    fn clip_position(&self, pos: Position) -> Position {
        self.offset_to_position(self.position_to_offset(pos))
    }
}

/// Chars ropey treats as ending a line on their own.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
}

/// Ropey-backed text buffer for local editing.
///
/// Provides O(log n) editing operations and offset conversions.
#[derive(Clone, Default)]
pub struct EditorRope {
    rope: ropey::Rope,
}

impl EditorRope {
    /// Create a new empty rope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from string.
    pub fn from_str(s: &str) -> Self {
        Self {
            rope: ropey::Rope::from_str(s),
        }
    }
}

impl TextBuffer for EditorRope {
    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn insert(&mut self, char_offset: usize, text: &str) {
        self.rope.insert(char_offset, text);
    }

    fn delete(&mut self, char_range: Range<usize>) {
        self.rope.remove(char_range);
    }

    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr> {
        if char_range.start > char_range.end || char_range.end > self.len_chars() {
            return None;
        }
        Some(self.rope.slice(char_range).to_smolstr())
    }

    fn char_at(&self, char_offset: usize) -> Option<char> {
        if char_offset >= self.len_chars() {
            return None;
        }
        Some(self.rope.char(char_offset))
    }

    fn to_string(&self) -> String {
        self.rope.to_string()
    }

    fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }

    fn line_to_char(&self, line: usize) -> usize {
        self.rope.line_to_char(line)
    }

    fn char_to_line(&self, char_offset: usize) -> usize {
        self.rope.char_to_line(char_offset)
    }

    fn line_len(&self, line: usize) -> usize {
        let slice = self.rope.line(line);
        let mut len = slice.len_chars();
        if len == 0 {
            return 0;
        }
        match slice.char(len - 1) {
            '\n' => {
                len -= 1;
                if len > 0 && slice.char(len - 1) == '\r' {
                    len -= 1;
                }
            }
            c if is_line_break(c) => len -= 1,
            _ => {}
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut rope = EditorRope::from_str("hello world");
        assert_eq!(rope.len_chars(), 11);
        assert_eq!(rope.to_string(), "hello world");

        rope.insert(5, " beautiful");
        assert_eq!(rope.to_string(), "hello beautiful world");

        // " beautiful" is 10 chars at positions 5..15
        rope.delete(5..15);
        assert_eq!(rope.to_string(), "hello world");
    }

    #[test]
    fn test_slice() {
        let rope = EditorRope::from_str("hello world");
        assert_eq!(rope.slice(0..5).as_deref(), Some("hello"));
        assert_eq!(rope.slice(6..11).as_deref(), Some("world"));
        assert_eq!(rope.slice(0..100), None);
    }

    #[test]
    fn test_replace() {
        let mut rope = EditorRope::from_str("hello world");
        rope.replace(6..11, "rust");
        assert_eq!(rope.to_string(), "hello rust");
    }

    #[test]
    fn test_line_lengths() {
        let rope = EditorRope::from_str("ab\r\ncde\n\nf");
        assert_eq!(rope.len_lines(), 4);
        assert_eq!(rope.line_len(0), 2);
        assert_eq!(rope.line_len(1), 3);
        assert_eq!(rope.line_len(2), 0);
        assert_eq!(rope.line_len(3), 1);
    }

    #[test]
    fn test_offset_to_position() {
        let rope = EditorRope::from_str("one\ntwo\nthree");
        assert_eq!(rope.offset_to_position(0), Position::new(0, 0));
        assert_eq!(rope.offset_to_position(3), Position::new(0, 3));
        assert_eq!(rope.offset_to_position(4), Position::new(1, 0));
        assert_eq!(rope.offset_to_position(9), Position::new(2, 1));
        // clamped
        assert_eq!(rope.offset_to_position(500), Position::new(2, 5));
    }

    #[test]
    fn test_position_to_offset_clamps() {
        let rope = EditorRope::from_str("one\ntwo\nthree");
        assert_eq!(rope.position_to_offset(Position::new(1, 2)), 6);
        assert_eq!(rope.position_to_offset(Position::new(1, 40)), 7);
        assert_eq!(rope.position_to_offset(Position::new(9, 0)), 13);
        assert_eq!(rope.clip_position(Position::new(0, 99)), Position::new(0, 3));
    }

    #[test]
    fn test_position_codec_inverse() {
        let rope = EditorRope::from_str("héllo 🌍\r\nsecond line\n\nlast");
        let mut offset = 0;
        while offset <= rope.len_chars() {
            // the gap inside a CRLF pair is not an addressable location
            let inside_crlf = rope.char_at(offset) == Some('\n')
                && offset > 0
                && rope.char_at(offset - 1) == Some('\r');
            if !inside_crlf {
                let pos = rope.offset_to_position(offset);
                assert_eq!(rope.position_to_offset(pos), offset, "offset {offset} via {pos:?}");
            }
            offset += 1;
        }
    }

    #[test]
    fn test_empty_buffer_positions() {
        let rope = EditorRope::new();
        assert_eq!(rope.len_lines(), 1);
        assert_eq!(rope.offset_to_position(0), Position::origin());
        assert_eq!(rope.position_to_offset(Position::new(3, 3)), 0);
    }
}
