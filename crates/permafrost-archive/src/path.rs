//! Hierarchical names: path elements and paths.
//!
//! A [`PathElement`] is one segment of a container name: non-empty UTF-8
//! with NUL forbidden. Rendering is reversible: an element made entirely
//! of characters at or above `0x20`, with no `"` and no `.`, renders
//! bare; anything else renders double-quoted with internal `"` doubled.
//! A [`Path`] is an immutable ordered sequence of elements, displayed by
//! joining rendered elements with `/`.

use std::fmt;

use crate::error::{ArchiveError, Result};

/// One segment of a hierarchical container name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathElement(String);

impl PathElement {
    /// Validate and wrap a name segment.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::InvalidPath`] when the text is empty or contains
    /// NUL. All other valid UTF-8 is allowed.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(ArchiveError::InvalidPath(
                "path element must not be empty".to_string(),
            ));
        }
        if text.contains('\0') {
            return Err(ArchiveError::InvalidPath(
                "path element must not contain NUL".to_string(),
            ));
        }
        Ok(Self(text))
    }

    /// The raw text of this element.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn needs_quoting(&self) -> bool {
        self.0.chars().any(|c| c < ' ' || c == '"' || c == '.')
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.needs_quoting() {
            return f.write_str(&self.0);
        }
        f.write_str("\"")?;
        for c in self.0.chars() {
            if c == '"' {
                f.write_str("\"\"")?;
            } else {
                write!(f, "{c}")?;
            }
        }
        f.write_str("\"")
    }
}

/// An immutable ordered sequence of [`PathElement`]s.
///
/// Built by concatenating a parent path with a child element; never
/// mutated after construction. The empty path is the container root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<PathElement>);

impl Path {
    /// The empty (root) path.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// A single-element path.
    #[must_use]
    pub fn from_element(element: PathElement) -> Self {
        Self(vec![element])
    }

    /// This path extended by one child element.
    #[must_use]
    pub fn child(&self, element: PathElement) -> Self {
        let mut elements = self.0.clone();
        elements.push(element);
        Self(elements)
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The elements as a slice.
    #[must_use]
    pub fn elements(&self) -> &[PathElement] {
        &self.0
    }

    /// Split off the final element, if any.
    #[must_use]
    pub fn split_last(&self) -> Option<(&PathElement, &[PathElement])> {
        self.0.split_last()
    }

    /// Parse the rendered form: `/`-separated elements, quoting inverted.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::InvalidPath`] on empty segments, NUL, or an
    /// unterminated quote.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Self::root());
        }
        let mut elements = Vec::new();
        let mut chars = text.chars().peekable();
        loop {
            let element = if chars.peek() == Some(&'"') {
                chars.next();
                let mut out = String::new();
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            out.push('"');
                        }
                        Some('"') => break,
                        Some(c) => out.push(c),
                        None => {
                            return Err(ArchiveError::InvalidPath(format!(
                                "unterminated quote in `{text}`"
                            )))
                        }
                    }
                }
                out
            } else {
                let mut out = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '/' {
                        break;
                    }
                    out.push(c);
                    chars.next();
                }
                out
            };
            elements.push(PathElement::new(element)?);
            match chars.next() {
                None => break,
                Some('/') => {}
                Some(c) => {
                    return Err(ArchiveError::InvalidPath(format!(
                        "unexpected `{c}` after quoted element in `{text}`"
                    )))
                }
            }
        }
        Ok(Self(elements))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

impl From<PathElement> for Path {
    fn from(element: PathElement) -> Self {
        Self::from_element(element)
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<I: IntoIterator<Item = PathElement>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
