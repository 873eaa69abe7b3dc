//! One script and its compilation state.
//!
//! A [`Script`] owns the source text, the arena [`Ast`] the parser builds
//! from it, the diagnostics of every stage and, once [`Script::resolve`]
//! has run, a [`Resolution`] with bindings, types and export tables. The
//! stages are explicit and re-invocable; each one is a no-op when its work
//! is already done, so a script can be driven by hand or through
//! [`Context::get`](crate::context::Context::get).

use std::collections::VecDeque;
use std::path::Path;

use anyhow::Context as _;

use crate::ast::{Ast, Parser};
use crate::context::{Context, FetchError};
use crate::diag::Diagnostics;
use crate::resolve::{DepView, Resolution, Resolver};
use crate::token::Span;

pub struct Script {
    name: String,
    text: String,
    /// Cleared when the primary source could not be obtained; every stage
    /// and query then short circuits.
    valid: bool,
    parsed: bool,
    includes_processed: bool,
    ast: Ast,
    diags: Diagnostics,
    resolution: Option<Resolution>,
}

impl Script {
    pub fn from_source(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            valid: true,
            parsed: false,
            includes_processed: false,
            ast: Ast::new(),
            diags: Diagnostics::new(),
            resolution: None,
        }
    }

    /// Reads a script from disk; the file stem becomes the script name.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading script '{}'", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Self::from_source(name, text))
    }

    /// Looks the script up through the context's source provider. A name
    /// the provider cannot supply yields an invalid script.
    pub fn from_provider(name: &str, ctx: &Context) -> Self {
        match ctx.source(name) {
            Some(text) => Self::from_source(name, text),
            None => {
                tracing::warn!(target: "lore::script", script = name, "source unavailable");
                Self {
                    name: name.to_string(),
                    text: String::new(),
                    valid: false,
                    parsed: false,
                    includes_processed: false,
                    ast: Ast::new(),
                    diags: Diagnostics::new(),
                    resolution: None,
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    pub(crate) fn diags_mut(&mut self) -> &mut Diagnostics {
        &mut self.diags
    }

    pub fn errors(&self) -> usize {
        self.diags.errors()
    }

    pub fn warnings(&self) -> usize {
        self.diags.warnings()
    }

    /// Lexes and parses the source. Safe to call again; the tree is built
    /// once.
    pub fn parse(&mut self) {
        self.parse_impl(None);
    }

    fn parse_impl(&mut self, ctx: Option<&Context>) {
        if self.parsed || !self.valid {
            return;
        }
        let mut parser = Parser::new(&self.name, &self.text, &mut self.diags);
        if let Some(ctx) = ctx {
            parser = parser.with_cancel(ctx.cancel_flag());
        }
        if let Some(ast) = parser.parse_cancellable() {
            self.ast = ast;
            self.parsed = true;
        }
    }

    /// Requests every included script from the context, which builds them
    /// on miss. A missing include and an include cycle are diagnostics on
    /// this script, not failures; the include's symbols simply stay
    /// unavailable.
    pub fn process_includes(&mut self, ctx: &Context) {
        if self.includes_processed || !self.valid {
            return;
        }
        self.parse_impl(Some(ctx));
        if !self.parsed {
            return;
        }
        let _claim = ctx.claim_builds();
        let _entry = ctx.push_build(&self.name);
        let pending: Vec<(String, Span)> = self
            .ast
            .includes
            .iter()
            .filter(|include| !include.resolved)
            .map(|include| (include.name.clone(), include.span))
            .collect();
        for (include, span) in pending {
            match ctx.request(&include) {
                Ok(_) => {
                    if let Some(entry) = self.ast.includes.iter_mut().find(|i| i.name == include) {
                        entry.resolved = true;
                    }
                    tracing::trace!(
                        target: "lore::script",
                        script = %self.name,
                        include = %include,
                        "include resolved"
                    );
                }
                Err(FetchError::Missing) => {
                    self.diags.parse(
                        &self.name,
                        format!("unable to locate include file '{include}'"),
                        false,
                        span,
                    );
                }
                Err(FetchError::Cycle(path)) => {
                    self.diags.parse(
                        &self.name,
                        format!("recursive includes: {}", path.join(", ")),
                        false,
                        span,
                    );
                }
                Err(FetchError::Cancelled) => return,
            }
        }
        self.includes_processed = true;
    }

    /// Binds and type checks the tree against the resolved includes and
    /// the command script. No-op once a resolution exists.
    pub fn resolve(&mut self, ctx: &Context) {
        if self.resolution.is_some() || !self.valid {
            return;
        }
        self.parse_impl(Some(ctx));
        if !self.parsed {
            return;
        }

        let mut deps = Vec::new();
        for include in &self.ast.includes {
            if !include.resolved {
                continue;
            }
            if let Some(dep) = ctx.cached(&include.name) {
                deps.push(dep);
            }
        }
        let command = if self.name == ctx.command_name() {
            None
        } else {
            ctx.command_script()
        };

        let views: Vec<DepView<'_>> = deps.iter().filter_map(|dep| dep.dep_view()).collect();
        let mut types = ctx.lock_types();
        let mut resolver = Resolver::new(&self.name, &self.ast, &mut types, &mut self.diags)
            .with_deps(&views)
            .with_cancel(ctx.cancel_flag());
        if let Some(view) = command.as_ref().and_then(|cmd| cmd.dep_view()) {
            resolver = resolver.with_command(view);
        }
        self.resolution = resolver.resolve();
    }

    /// What the resolver may see of this script once resolved.
    pub(crate) fn dep_view(&self) -> Option<DepView<'_>> {
        Some(DepView {
            name: &self.name,
            ast: &self.ast,
            resolution: self.resolution.as_ref()?,
        })
    }

    /// Names of every script reachable through includes, in breadth first
    /// order. Cycles and unresolved includes terminate the walk at the
    /// names already seen.
    pub fn dependencies(&self, ctx: &Context) -> Vec<String> {
        let mut seen = crate::util::fast_hash_set_new();
        let mut queue: VecDeque<String> =
            self.ast.includes.iter().map(|i| i.name.clone()).collect();
        let mut out = Vec::new();
        while let Some(name) = queue.pop_front() {
            if name == self.name || !seen.insert(name.clone()) {
                continue;
            }
            if let Some(dep) = ctx.cached(&name) {
                queue.extend(dep.ast().includes.iter().map(|i| i.name.clone()));
            }
            out.push(name);
        }
        out
    }

    /// Source slice under a span; used for symbol previews.
    pub(crate) fn view_of(&self, span: Span) -> &str {
        let start = span.start.offset.min(self.text.len());
        let end = span.end.offset.min(self.text.len());
        if start >= end {
            return "";
        }
        &self.text[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MemorySource;

    fn context_with(scripts: &[(&str, &str)]) -> Context {
        let mut provider = MemorySource::new();
        for (name, text) in scripts {
            provider.insert(*name, *text);
        }
        Context::new(provider)
    }

    #[test]
    fn test_parse_is_idempotent() {
        let mut script = Script::from_source("demo", "int a = 1;");
        script.parse();
        let nodes = script.ast().len();
        let diags = script.diagnostics().len();
        script.parse();
        assert_eq!(script.ast().len(), nodes);
        assert_eq!(script.diagnostics().len(), diags);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let ctx = context_with(&[]);
        let mut script = Script::from_source("demo", "int a = 1; int b = a;");
        script.resolve(&ctx);
        assert!(script.is_resolved());
        let diags = script.diagnostics().len();
        script.resolve(&ctx);
        assert_eq!(script.diagnostics().len(), diags);
    }

    #[test]
    fn test_missing_source_is_invalid() {
        let ctx = context_with(&[]);
        let mut script = Script::from_provider("ghost", &ctx);
        assert!(!script.is_valid());
        script.parse();
        script.resolve(&ctx);
        assert!(!script.is_parsed());
        assert!(!script.is_resolved());
        assert_eq!(script.diagnostics().len(), 0);
    }

    #[test]
    fn test_counters_track_severity() {
        let ctx = context_with(&[]);
        let mut script = Script::from_source("demo", ";\nvoid main() { x; }");
        script.resolve(&ctx);
        // The stray semicolon warns, the unresolved identifier errors.
        assert_eq!(script.warnings(), 1);
        assert_eq!(script.errors(), 1);
    }

    #[test]
    fn test_set_name() {
        let mut script = Script::from_source("one", "");
        script.set_name("two");
        assert_eq!(script.name(), "two");
    }

    #[test]
    fn test_dependencies_are_transitive() {
        let ctx = context_with(&[
            ("a", "#include \"b\"\nint A = 1;"),
            ("b", "#include \"c\"\nint B = 1;"),
            ("c", "int C = 1;"),
        ]);
        let a = ctx.get("a").expect("a builds");
        let deps = a.dependencies(&ctx);
        assert_eq!(deps, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hello.lore");
        std::fs::write(&path, "int GREETING = 1;").expect("write");
        let mut script = Script::from_path(&path).expect("readable");
        assert_eq!(script.name(), "hello");
        script.parse();
        assert_eq!(script.errors(), 0);
        assert!(Script::from_path(&dir.path().join("absent.lore")).is_err());
    }
}
