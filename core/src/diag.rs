use std::fmt;

use serde::Serialize;

use crate::token::Span;

/// Which stage produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagKind {
    Lexical,
    Parse,
    Semantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Hint,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Hint => "hint",
            Severity::Info => "info",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagKind,
    pub severity: Severity,
    pub script: String,
    pub message: String,
    pub span: Span,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.script, self.span.start, self.severity, self.message
        )
    }
}

/// Append-only sink for the diagnostics of one script. Severity counters are
/// maintained on push so validity checks never rescan the records.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            _ => {}
        }
        tracing::debug!(target: "lore::diag", "{diag}");
        self.records.push(diag);
    }

    pub fn lexical(&mut self, script: &str, message: impl Into<String>, warning: bool, span: Span) {
        self.push(Diagnostic {
            kind: DiagKind::Lexical,
            severity: if warning { Severity::Warning } else { Severity::Error },
            script: script.to_string(),
            message: message.into(),
            span,
        });
    }

    pub fn parse(&mut self, script: &str, message: impl Into<String>, warning: bool, span: Span) {
        self.push(Diagnostic {
            kind: DiagKind::Parse,
            severity: if warning { Severity::Warning } else { Severity::Error },
            script: script.to_string(),
            message: message.into(),
            span,
        });
    }

    pub fn semantic(&mut self, script: &str, message: impl Into<String>, warning: bool, span: Span) {
        self.push(Diagnostic {
            kind: DiagKind::Semantic,
            severity: if warning { Severity::Warning } else { Severity::Error },
            script: script.to_string(),
            message: message.into(),
            span,
        });
    }

    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.records)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diag in &self.records {
            writeln!(f, "{diag}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Position, Span};

    fn span() -> Span {
        Span::new(Position::new(1, 1, 0), Position::new(1, 2, 1))
    }

    #[test]
    fn test_counters() {
        let mut sink = Diagnostics::new();
        sink.semantic("demo", "bad thing", false, span());
        sink.semantic("demo", "odd thing", true, span());
        sink.lexical("demo", "stray byte", true, span());
        assert_eq!(sink.errors(), 1);
        assert_eq!(sink.warnings(), 2);
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn test_display() {
        let mut sink = Diagnostics::new();
        sink.parse("demo", "expected ';'", false, span());
        assert_eq!(sink.records()[0].to_string(), "demo:1:1: error: expected ';'");
    }

    #[test]
    fn test_to_json() {
        let mut sink = Diagnostics::new();
        sink.parse("demo", "expected ';'", false, span());
        let json = sink.to_json().unwrap();
        assert!(json.contains("\"parse\""));
        assert!(json.contains("\"error\""));
        assert!(json.contains("expected ';'"));
    }
}
