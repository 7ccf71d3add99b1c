use std::{fmt, sync::Arc};

use crate::token::Span;

/// One named unit of input, kept alive alongside its AST so that spans can be
/// turned into `file:line:column` positions and source snippets.
#[derive(Clone)]
pub struct SourceFile {
    name: Arc<str>,
    text: Arc<[u8]>,
    /// Byte offset at which each line starts. Never empty.
    line_starts: Arc<[usize]>,
}

impl SourceFile {
    pub fn new(name: &str, text: &[u8]) -> SourceFile {
        let line_starts = std::iter::once(0)
            .chain(
                text.iter()
                    .enumerate()
                    .filter(|&(_, &b)| b == b'\n')
                    .map(|(i, _)| i + 1),
            )
            .collect();
        SourceFile {
            name: Arc::from(name),
            text: Arc::from(text),
            line_starts,
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn text(&self) -> &[u8] {
        &self.text
    }

    /// Returns the 1-based line and column of the given byte offset.
    pub fn locate(&self, offset: usize) -> Location {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        let column = offset - self.line_starts[line];
        Location {
            file: Arc::clone(&self.name),
            line: u32::try_from(line + 1).unwrap_or(u32::MAX),
            column: u32::try_from(column + 1).unwrap_or(u32::MAX),
        }
    }

    /// Returns the source text covered by `span`, lossily decoded.
    pub fn snippet(&self, span: Span) -> String {
        let hi = (span.lo + span.len as usize).min(self.text.len());
        let lo = span.lo.min(hi);
        String::from_utf8_lossy(&self.text[lo..hi]).into_owned()
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceFile({:?}, {} bytes)", self.name, self.text.len())
    }
}

impl PartialEq for SourceFile {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.text == other.text
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate() {
        let src = SourceFile::new("a.ward", b"ab\ncd\n\nef");
        let at = |offset| {
            let l = src.locate(offset);
            (l.line, l.column)
        };
        assert_eq!(at(0), (1, 1));
        assert_eq!(at(1), (1, 2));
        assert_eq!(at(2), (1, 3));
        assert_eq!(at(3), (2, 1));
        assert_eq!(at(6), (3, 1));
        assert_eq!(at(8), (4, 2));
        assert_eq!(src.locate(4).to_string(), "a.ward:2:2");
    }

    #[test]
    fn snippet() {
        let src = SourceFile::new("a.ward", b"var x: u8 = y + 1");
        assert_eq!(src.snippet(Span::new_of_bounds(12..17)), "y + 1");
    }
}
