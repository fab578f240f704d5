//! Canonical position strings.
//!
//! A position is a structural, presentation-independent address:
//! `epubcfi(/6/4[ch01]!/4/10/1:42)` — package spine step, spine item step
//! (even, `(index+1)*2`, optionally asserted with the item's id), an
//! indirection into the content document, element steps (even) interleaved
//! with text-node steps (odd), and an optional character offset. Because no
//! page number is encoded, the string survives font, theme, and column
//! changes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::{NodeStep, TextBox};

/// A single path step with an optional `[id]` assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub id: Option<String>,
}

impl Step {
    pub fn element(index: usize) -> Self {
        Self { index, id: None }
    }
}

/// A parsed or built canonical position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cfi {
    /// The spine item step (`/6/N` in the serialized form).
    pub spine: Step,
    /// Path within the content document, element steps even, text steps odd.
    pub path: Vec<Step>,
    /// Character offset within the final text node.
    pub offset: Option<u32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CfiParseError {
    #[error("missing epubcfi( prefix")]
    MissingPrefix,
    #[error("missing closing parenthesis")]
    MissingClosingParen,
    #[error("expected package spine step /6")]
    MissingSpineRoot,
    #[error("expected number at position {0}")]
    ExpectedNumber(usize),
    #[error("unclosed bracket at position {0}")]
    UnclosedBracket(usize),
    #[error("unexpected character at position {0}")]
    UnexpectedChar(usize),
}

impl Cfi {
    /// Build a position for a spine index, optionally anchored at a rendered
    /// text node. With no anchor the position degrades to the spine item
    /// itself — the last resolvable container-level address.
    pub fn from_anchor(spine_index: usize, spine_id: Option<&str>, anchor: Option<&TextBox>) -> Self {
        let spine = Step {
            index: (spine_index + 1) * 2,
            id: spine_id.map(str::to_string),
        };

        let (path, offset) = match anchor {
            Some(text_box) => {
                let mut steps = Vec::with_capacity(text_box.path.0.len());
                let mut last_element: Option<usize> = None;
                for node in &text_box.path.0 {
                    match node {
                        NodeStep::Element(i) => {
                            steps.push(Step::element((i + 1) * 2));
                            last_element = Some(steps.len() - 1);
                        }
                        NodeStep::Text(i) => steps.push(Step::element(i * 2 + 1)),
                    }
                }
                if let (Some(id), Some(at)) = (&text_box.element_id, last_element) {
                    steps[at].id = Some(id.clone());
                }
                (steps, text_box.char_offset)
            }
            None => (Vec::new(), None),
        };

        Self { spine, path, offset }
    }

    /// Recover the 0-based spine index from the spine step.
    pub fn spine_index(&self) -> Option<usize> {
        if self.spine.index >= 2 && self.spine.index % 2 == 0 {
            Some(self.spine.index / 2 - 1)
        } else {
            None
        }
    }

    /// The spine item id assertion, if one was embedded.
    pub fn spine_id(&self) -> Option<&str> {
        self.spine.id.as_deref()
    }

    /// The deepest element id assertion in the inner path, if any.
    pub fn element_id(&self) -> Option<&str> {
        self.path.iter().rev().find_map(|step| step.id.as_deref())
    }

    /// Best-effort page estimate from the path's step count, for positions
    /// carrying no element id. A heuristic: reflow can invalidate it, so
    /// callers clamp the result against the real page count.
    pub fn page_hint(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Parse, mapping any malformed input to `None`.
    pub fn try_parse(input: &str) -> Option<Self> {
        Self::parse(input).ok()
    }

    /// Parse a serialized position string.
    pub fn parse(input: &str) -> Result<Self, CfiParseError> {
        let input = input.trim();
        let inner = input
            .strip_prefix("epubcfi(")
            .ok_or(CfiParseError::MissingPrefix)?
            .strip_suffix(')')
            .ok_or(CfiParseError::MissingClosingParen)?;

        let mut cursor = Cursor { input: inner, pos: 0 };

        // Package spine element is always /6
        let root = cursor.parse_step()?;
        if root.index != 6 || root.id.is_some() {
            return Err(CfiParseError::MissingSpineRoot);
        }
        let spine = cursor.parse_step()?;

        let mut path = Vec::new();
        let mut offset = None;
        if cursor.skip_if('!') {
            while cursor.peek() == Some('/') {
                path.push(cursor.parse_step()?);
            }
            if cursor.skip_if(':') {
                offset = Some(cursor.parse_number()? as u32);
            }
        }

        if !cursor.at_end() {
            return Err(CfiParseError::UnexpectedChar(cursor.pos));
        }

        Ok(Self { spine, path, offset })
    }
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epubcfi(/6")?;
        write_step(f, &self.spine)?;
        if !self.path.is_empty() || self.offset.is_some() {
            write!(f, "!")?;
            for step in &self.path {
                write_step(f, step)?;
            }
            if let Some(offset) = self.offset {
                write!(f, ":{offset}")?;
            }
        }
        write!(f, ")")
    }
}

fn write_step(f: &mut fmt::Formatter<'_>, step: &Step) -> fmt::Result {
    write!(f, "/{}", step.index)?;
    if let Some(id) = &step.id {
        write!(f, "[{}]", escape(id))?;
    }
    Ok(())
}

/// Escape `[`, `]`, and `^` inside bracketed assertions.
fn escape(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for ch in id.chars() {
        if matches!(ch, '[' | ']' | '^') {
            out.push('^');
        }
        out.push(ch);
    }
    out
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn parse_number(&mut self) -> Result<usize, CfiParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.pos == start {
            return Err(CfiParseError::ExpectedNumber(start));
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| CfiParseError::ExpectedNumber(start))
    }

    fn parse_step(&mut self) -> Result<Step, CfiParseError> {
        if !self.skip_if('/') {
            return Err(CfiParseError::UnexpectedChar(self.pos));
        }
        let index = self.parse_number()?;
        let id = if self.skip_if('[') {
            Some(self.parse_bracket_content()?)
        } else {
            None
        };
        Ok(Step { index, id })
    }

    fn parse_bracket_content(&mut self) -> Result<String, CfiParseError> {
        let start = self.pos;
        let mut out = String::new();
        let mut escaped = false;
        while let Some(ch) = self.peek() {
            if escaped {
                out.push(ch);
                escaped = false;
                self.advance();
            } else if ch == '^' {
                escaped = true;
                self.advance();
            } else if ch == ']' {
                self.advance();
                return Ok(out);
            } else if ch == '[' {
                return Err(CfiParseError::UnexpectedChar(self.pos));
            } else {
                out.push(ch);
                self.advance();
            }
        }
        Err(CfiParseError::UnclosedBracket(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{NodePath, Rect};

    fn anchor() -> TextBox {
        TextBox {
            rect: Rect::default(),
            path: NodePath(vec![
                NodeStep::Element(0), // body
                NodeStep::Element(4),
                NodeStep::Text(0),
            ]),
            element_id: Some("para-5".into()),
            char_offset: Some(42),
        }
    }

    #[test]
    fn test_build_with_anchor() {
        let cfi = Cfi::from_anchor(1, Some("ch02"), Some(&anchor()));
        assert_eq!(cfi.to_string(), "epubcfi(/6/4[ch02]!/2/10[para-5]/1:42)");
    }

    #[test]
    fn test_build_without_anchor_degrades_to_spine() {
        let cfi = Cfi::from_anchor(0, Some("ch01"), None);
        assert_eq!(cfi.to_string(), "epubcfi(/6/2[ch01])");
    }

    #[test]
    fn test_roundtrip() {
        let original = Cfi::from_anchor(1, Some("ch02"), Some(&anchor()));
        let parsed = Cfi::parse(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_spine_index_recovery() {
        assert_eq!(Cfi::try_parse("epubcfi(/6/2)").unwrap().spine_index(), Some(0));
        assert_eq!(Cfi::try_parse("epubcfi(/6/10)").unwrap().spine_index(), Some(4));
        // Odd spine step cannot be an element step
        assert_eq!(Cfi::try_parse("epubcfi(/6/3)").unwrap().spine_index(), None);
    }

    #[test]
    fn test_element_id_prefers_deepest() {
        let cfi = Cfi::try_parse("epubcfi(/6/4!/2[outer]/6[inner]/1:3)").unwrap();
        assert_eq!(cfi.element_id(), Some("inner"));
        assert_eq!(cfi.offset, Some(3));
    }

    #[test]
    fn test_escaped_brackets() {
        let cfi = Cfi::from_anchor(
            0,
            Some("odd[id]"),
            None,
        );
        let serialized = cfi.to_string();
        assert_eq!(serialized, "epubcfi(/6/2[odd^[id^]])");
        assert_eq!(Cfi::parse(&serialized).unwrap().spine_id(), Some("odd[id]"));
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(Cfi::try_parse("").is_none());
        assert!(Cfi::try_parse("not a cfi").is_none());
        assert!(Cfi::try_parse("epubcfi(/6/4").is_none());
        assert!(Cfi::try_parse("epubcfi(/4/2)").is_none());
        assert!(Cfi::try_parse("epubcfi(/6/4!bogus)").is_none());
        assert!(Cfi::try_parse("epubcfi(/6/4[unclosed)").is_none());
    }

    #[test]
    fn test_page_hint_counts_steps() {
        let cfi = Cfi::try_parse("epubcfi(/6/4!/2/6/1:0)").unwrap();
        assert_eq!(cfi.page_hint(), 2);
        let bare = Cfi::try_parse("epubcfi(/6/4)").unwrap();
        assert_eq!(bare.page_hint(), 0);
    }
}
