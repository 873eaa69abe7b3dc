use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }

    pub fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Ordering by (line, column); offsets are byte positions and follow it.
    pub fn is_before(&self, line: u32, column: u32) -> bool {
        self.line < line || (self.line == line && self.column < column)
    }

    pub fn is_after(&self, line: u32, column: u32) -> bool {
        self.line > line || (self.line == line && self.column > column)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn single(pos: Position) -> Self {
        Self { start: pos, end: pos }
    }

    pub fn empty() -> Self {
        Self::single(Position::start())
    }

    /// Inclusive on both edges so a cursor sitting on the last character of a
    /// token still hits it.
    pub fn contains(&self, line: u32, column: u32) -> bool {
        !self.start.is_after(line, column) && !self.end.is_before(line, column)
    }

    pub fn contains_span(&self, other: &Span) -> bool {
        !self.start.is_after(other.start.line, other.start.column)
            && !self.end.is_before(other.end.line, other.end.column)
    }

    /// Smallest span covering both inputs.
    pub fn merge(a: Span, b: Span) -> Span {
        let start = if b.start.is_before(a.start.line, a.start.column) {
            b.start
        } else {
            a.start
        };
        let end = if a.end.is_before(b.end.line, b.end.column) {
            b.end
        } else {
            a.end
        };
        Span { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(f, "{}:{}-{}", self.start.line, self.start.column, self.end.column)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Parser-internal error carrier. Parse failures are converted into
/// diagnostics at the recovery boundary; this type only travels through `?`
/// between the grammar methods.
#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    pub fn new(message: String) -> Self {
        Self { message, span: None }
    }

    pub fn with_span(message: String, span: Span) -> Self {
        Self {
            message,
            span: Some(span),
        }
    }

    pub fn with_position(message: String, position: Position) -> Self {
        Self {
            message,
            span: Some(Span::single(position)),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(span) = &self.span {
            write!(f, "{} at {}", self.message, span)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ParseError {}

/// Helper to convert a byte offset to a line/column position.
pub fn offset_to_position(text: &str, offset: usize) -> Position {
    let mut line = 1;
    let mut column = 1;

    for (i, b) in text.bytes().enumerate() {
        if i >= offset {
            break;
        }
        if b == b'\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    Position::new(line, column, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_to_position() {
        let text = "line1\nline2\nline3";

        assert_eq!(offset_to_position(text, 0), Position::new(1, 1, 0));
        assert_eq!(offset_to_position(text, 5), Position::new(1, 6, 5)); // at '\n'
        assert_eq!(offset_to_position(text, 6), Position::new(2, 1, 6)); // start of line2
        assert_eq!(offset_to_position(text, 12), Position::new(3, 1, 12)); // start of line3
    }

    #[test]
    fn test_span_contains() {
        let span = Span::new(Position::new(2, 5, 10), Position::new(2, 9, 14));
        assert!(span.contains(2, 5));
        assert!(span.contains(2, 7));
        assert!(span.contains(2, 9));
        assert!(!span.contains(2, 4));
        assert!(!span.contains(2, 10));
        assert!(!span.contains(1, 7));
        assert!(!span.contains(3, 7));
    }

    #[test]
    fn test_span_merge() {
        let a = Span::new(Position::new(1, 1, 0), Position::new(1, 2, 1));
        let b = Span::new(Position::new(1, 6, 5), Position::new(1, 7, 6));
        let merged = Span::merge(a, b);
        assert_eq!(merged.start, Position::new(1, 1, 0));
        assert_eq!(merged.end, Position::new(1, 7, 6));
    }

    #[test]
    fn test_span_display() {
        let span1 = Span::new(Position::new(1, 5, 4), Position::new(1, 10, 9));
        assert_eq!(span1.to_string(), "1:5-10");

        let span2 = Span::new(Position::new(1, 5, 4), Position::new(3, 2, 20));
        assert_eq!(span2.to_string(), "1:5-3:2");
    }

    #[test]
    fn test_parse_error_display() {
        let err1 = ParseError::new("expected expression".to_string());
        assert_eq!(err1.to_string(), "expected expression");

        let pos = Position::new(2, 10, 15);
        let err2 = ParseError::with_position("expected ';'".to_string(), pos);
        assert_eq!(err2.to_string(), "expected ';' at 2:10-10");
    }
}
