//! Text operations in the OT document's wire format.
//!
//! An [`Operation`] is a list of [`OpPart`]s, each addressing one field of the
//! document by path and carrying an ordered list of [`TextFragment`]s. Every
//! fragment offset is relative to the text left by the fragments before it in
//! the same part.
//!
//! On the wire a part looks like `{"p": ["content"], "t": "text0", "o": [...]}`
//! and fragments like `{"p": 3, "i": "abc"}` or `{"p": 3, "d": "abc"}`.
//! Offsets count chars (Unicode scalar values).

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use weaver_editor_core::{EditorRope, TextBuffer};

use crate::OtError;

/// Type tag of plain-text operation parts.
pub const TEXT_OP_KIND: &str = "text0";

/// One insert or delete within a text operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextFragment {
    /// Insert `text` at `offset`.
    Insert {
        #[serde(rename = "p")]
        offset: usize,
        #[serde(rename = "i")]
        text: SmolStr,
    },
    /// Delete `text`, which must be present at `offset`.
    Delete {
        #[serde(rename = "p")]
        offset: usize,
        #[serde(rename = "d")]
        text: SmolStr,
    },
}

impl TextFragment {
    /// Insert `text` at char `offset`.
    pub fn insert(offset: usize, text: impl Into<SmolStr>) -> Self {
        Self::Insert {
            offset,
            text: text.into(),
        }
    }

    /// Delete `text`, expected at char `offset`.
    pub fn delete(offset: usize, text: impl Into<SmolStr>) -> Self {
        Self::Delete {
            offset,
            text: text.into(),
        }
    }

    /// Char offset the fragment applies at.
    pub fn offset(&self) -> usize {
        match self {
            Self::Insert { offset, .. } | Self::Delete { offset, .. } => *offset,
        }
    }

    /// Inserted or deleted text.
    pub fn text(&self) -> &str {
        match self {
            Self::Insert { text, .. } | Self::Delete { text, .. } => text,
        }
    }

    /// Length of the inserted or deleted text in chars.
    pub fn char_len(&self) -> usize {
        self.text().chars().count()
    }

    /// True for inserts.
    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert { .. })
    }

    /// True for deletes.
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Shape of a fragment list, for picking a replay strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentShape<'a> {
    /// Exactly a delete followed by an insert at the same offset.
    Replace {
        offset: usize,
        deleted: &'a str,
        inserted: &'a str,
    },
    /// Anything else; replay fragment by fragment.
    Sequence,
}

impl<'a> FragmentShape<'a> {
    /// Classify `fragments`.
    pub fn of(fragments: &'a [TextFragment]) -> Self {
        match fragments {
            [
                TextFragment::Delete {
                    offset: at,
                    text: deleted,
                },
                TextFragment::Insert {
                    offset,
                    text: inserted,
                },
            ] if at == offset => Self::Replace {
                offset: *offset,
                deleted,
                inserted,
            },
            _ => Self::Sequence,
        }
    }
}

/// Merge directly adjacent fragments that can be expressed as one.
///
/// Contiguous inserts (typing) and deletes that touch (forward delete or
/// backspace runs) collapse. A delete followed by an insert is left alone so
/// the replace shape survives.
pub fn compact_fragments(fragments: Vec<TextFragment>) -> Vec<TextFragment> {
    let mut out: Vec<TextFragment> = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let merged = match (out.last_mut(), &fragment) {
            (
                Some(TextFragment::Insert { offset, text }),
                TextFragment::Insert {
                    offset: next,
                    text: more,
                },
            ) if *next == *offset + text.chars().count() => {
                *text = SmolStr::from(format!("{text}{more}"));
                true
            }
            (
                Some(TextFragment::Delete { offset, text }),
                TextFragment::Delete {
                    offset: next,
                    text: more,
                },
            ) if *next == *offset => {
                *text = SmolStr::from(format!("{text}{more}"));
                true
            }
            (
                Some(TextFragment::Delete { offset, text }),
                TextFragment::Delete {
                    offset: next,
                    text: more,
                },
            ) if *next + more.chars().count() == *offset => {
                *offset = *next;
                *text = SmolStr::from(format!("{more}{text}"));
                true
            }
            _ => false,
        };
        if !merged {
            out.push(fragment);
        }
    }
    out
}

/// Apply fragments to `base` strictly in order.
///
/// Fails if an offset is past the end of the text at that point, or a delete
/// names text that is not there.
pub fn apply_fragments(base: &str, fragments: &[TextFragment]) -> Result<String, OtError> {
    let mut rope = EditorRope::from_str(base);
    for fragment in fragments {
        let len = rope.len_chars();
        match fragment {
            TextFragment::Insert { offset, text } => {
                if *offset > len {
                    return Err(OtError::InvalidOperation(format!(
                        "insert at {offset} past end of text ({len} chars)"
                    )));
                }
                rope.insert(*offset, text);
            }
            TextFragment::Delete { offset, text } => {
                let Some(end) = offset.checked_add(fragment.char_len()) else {
                    return Err(OtError::InvalidOperation(format!(
                        "delete at {offset} overflows the offset range"
                    )));
                };
                match rope.slice(*offset..end) {
                    Some(found) if found == *text => rope.delete(*offset..end),
                    Some(found) => {
                        return Err(OtError::InvalidOperation(format!(
                            "delete at {offset} expected {text:?}, found {found:?}"
                        )));
                    }
                    None => {
                        return Err(OtError::InvalidOperation(format!(
                            "delete {offset}..{end} past end of text ({len} chars)"
                        )));
                    }
                }
            }
        }
    }
    Ok(rope.to_string())
}

/// One field-addressed component of an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpPart {
    /// Path of the field the fragments apply to.
    #[serde(rename = "p")]
    pub path: Vec<SmolStr>,
    /// Operation type tag, [`TEXT_OP_KIND`] for text.
    #[serde(rename = "t")]
    pub kind: SmolStr,
    /// Fragments in application order.
    #[serde(rename = "o")]
    pub fragments: Vec<TextFragment>,
}

impl OpPart {
    /// A text part for a top-level field.
    pub fn text(field: impl Into<SmolStr>, fragments: Vec<TextFragment>) -> Self {
        Self {
            path: vec![field.into()],
            kind: SmolStr::new_static(TEXT_OP_KIND),
            fragments,
        }
    }

    /// Whether this is a text part addressed exactly at `field`.
    pub fn targets(&self, field: &str) -> bool {
        self.kind == TEXT_OP_KIND && matches!(self.path.as_slice(), [only] if only == field)
    }
}

/// An operation as submitted to or received from the document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation {
    parts: Vec<OpPart>,
}

impl Operation {
    /// An operation made of `parts`, applied in order.
    pub fn new(parts: Vec<OpPart>) -> Self {
        Self { parts }
    }

    /// A single text part addressed at `field`.
    pub fn text(field: impl Into<SmolStr>, fragments: Vec<TextFragment>) -> Self {
        Self::new(vec![OpPart::text(field, fragments)])
    }

    /// The field-addressed parts, in order.
    pub fn parts(&self) -> &[OpPart] {
        &self.parts
    }

    /// True when no part carries a fragment.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|part| part.fragments.is_empty())
    }

    /// Total number of fragments across all parts.
    pub fn fragment_count(&self) -> usize {
        self.parts.iter().map(|part| part.fragments.len()).sum()
    }
}

impl From<Vec<OpPart>> for Operation {
    fn from(parts: Vec<OpPart>) -> Self {
        Self::new(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let op = Operation::text(
            "content",
            vec![TextFragment::delete(3, "abc"), TextFragment::insert(3, "xy")],
        );
        let json = serde_json::to_string(&op).unwrap();
        insta::assert_snapshot!(json, @r#"[{"p":["content"],"t":"text0","o":[{"p":3,"d":"abc"},{"p":3,"i":"xy"}]}]"#);

        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_fragment_parse_distinguishes_kind() {
        let fragments: Vec<TextFragment> =
            serde_json::from_str(r#"[{"p":1,"d":"x"},{"p":0,"i":"y"}]"#).unwrap();
        assert!(fragments[0].is_delete());
        assert!(fragments[1].is_insert());
        assert_eq!(fragments[0].offset(), 1);
    }

    #[test]
    fn test_sequential_apply() {
        // Canonical ordering case: the delete's offset is read against the
        // text left by the insert, not the original base.
        let fragments = vec![TextFragment::insert(5, "ab"), TextFragment::delete(2, "2")];
        assert_eq!(apply_fragments("0123456789", &fragments).unwrap(), "0134ab56789");
    }

    #[test]
    fn test_apply_rejects_bad_fragments() {
        assert!(matches!(
            apply_fragments("abc", &[TextFragment::insert(4, "x")]),
            Err(OtError::InvalidOperation(_))
        ));
        assert!(matches!(
            apply_fragments("abc", &[TextFragment::delete(1, "c")]),
            Err(OtError::InvalidOperation(_))
        ));
        assert!(matches!(
            apply_fragments("abc", &[TextFragment::delete(2, "cd")]),
            Err(OtError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_apply_rejects_overflowing_offset() {
        let fragments: Vec<TextFragment> =
            serde_json::from_str(r#"[{"p":18446744073709551615,"d":"x"}]"#).unwrap();
        assert!(matches!(
            apply_fragments("abc", &fragments),
            Err(OtError::InvalidOperation(_))
        ));
        assert!(matches!(
            apply_fragments("abc", &[TextFragment::insert(usize::MAX, "x")]),
            Err(OtError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_apply_multibyte() {
        let fragments = vec![TextFragment::delete(1, "é"), TextFragment::insert(1, "🌍")];
        assert_eq!(apply_fragments("héllo", &fragments).unwrap(), "h🌍llo");
    }

    #[test]
    fn test_replace_shape() {
        let replace = vec![TextFragment::delete(4, "old"), TextFragment::insert(4, "new")];
        assert_eq!(
            FragmentShape::of(&replace),
            FragmentShape::Replace {
                offset: 4,
                deleted: "old",
                inserted: "new"
            }
        );

        let shifted = vec![TextFragment::delete(4, "old"), TextFragment::insert(5, "new")];
        assert_eq!(FragmentShape::of(&shifted), FragmentShape::Sequence);

        let reversed = vec![TextFragment::insert(4, "new"), TextFragment::delete(4, "old")];
        assert_eq!(FragmentShape::of(&reversed), FragmentShape::Sequence);

        assert_eq!(FragmentShape::of(&[]), FragmentShape::Sequence);
    }

    #[test]
    fn test_compact_typing_run() {
        let typed = vec![
            TextFragment::insert(0, "h"),
            TextFragment::insert(1, "é"),
            TextFragment::insert(2, "y"),
        ];
        assert_eq!(compact_fragments(typed), vec![TextFragment::insert(0, "héy")]);
    }

    #[test]
    fn test_compact_deletes() {
        let forward = vec![TextFragment::delete(2, "a"), TextFragment::delete(2, "b")];
        assert_eq!(compact_fragments(forward), vec![TextFragment::delete(2, "ab")]);

        let backspace = vec![TextFragment::delete(5, "c"), TextFragment::delete(4, "b")];
        assert_eq!(compact_fragments(backspace), vec![TextFragment::delete(4, "bc")]);
    }

    #[test]
    fn test_compact_preserves_semantics() {
        let base = "the quick brown fox";
        let fragments = vec![
            TextFragment::delete(4, "q"),
            TextFragment::delete(4, "uick"),
            TextFragment::insert(4, "s"),
            TextFragment::insert(5, "low"),
            TextFragment::delete(10, "r"),
            TextFragment::delete(9, "b"),
        ];
        let compacted = compact_fragments(fragments.clone());
        assert_eq!(compacted.len(), 3);
        assert_eq!(apply_fragments(base, &compacted).unwrap(), "the slow own fox");
        assert_eq!(
            apply_fragments(base, &compacted).unwrap(),
            apply_fragments(base, &fragments).unwrap()
        );
    }

    #[test]
    fn test_part_targets() {
        let part = OpPart::text("content", vec![]);
        assert!(part.targets("content"));
        assert!(!part.targets("title"));

        let nested = OpPart {
            path: vec!["content".into(), "inner".into()],
            kind: TEXT_OP_KIND.into(),
            fragments: vec![],
        };
        assert!(!nested.targets("content"));

        let other_kind = OpPart {
            path: vec!["content".into()],
            kind: "json0".into(),
            fragments: vec![],
        };
        assert!(!other_kind.targets("content"));
    }
}
