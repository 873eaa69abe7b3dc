//! Script cache and compilation driver.
//!
//! A [`Context`] owns the source provider, the shared [`TypeTable`] and a
//! cache of fully built [`Script`]s. [`Context::get`] hands out the cached
//! script or parses, include-processes and resolves it exactly once, no
//! matter how many threads ask at the same time. Recursive builds stay on
//! one thread through the build gate, which also carries the include path
//! used to detect cycles.
//!
//! The command script is the implicitly included API surface every script
//! resolves against. It loads lazily on first use and may carry
//! `ENGINE_NUM_STRUCTURES` / `ENGINE_STRUCTURE_<i>` defines that bind
//! engine handle types to numbered slots.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::script::Script;
use crate::types::{TypeId, TypeTable};
use crate::util::FastHashMap;

/// Script name resolved when no other command script name is configured.
pub const DEFAULT_COMMAND_SCRIPT: &str = "loreapi";

const MAX_ENGINE_STRUCTURES: usize = 16;

const ENGINE_HANDLES: [TypeId; 4] = [
    TypeId::EFFECT,
    TypeId::EVENT,
    TypeId::LOCATION,
    TypeId::TALENT,
];

/// Where script text comes from, keyed by bare script name.
pub trait ScriptSource: Send + Sync {
    fn source(&self, name: &str) -> Option<String>;

    /// On-disk location, for providers that have one.
    fn path(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

/// In-memory provider, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySource {
    scripts: FastHashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.scripts.insert(name.into(), text.into());
    }
}

impl ScriptSource for MemorySource {
    fn source(&self, name: &str) -> Option<String> {
        self.scripts.get(name).cloned()
    }
}

/// Reads `<name>.lore` from a list of search roots, first hit wins. Names
/// that leave the roots, via an absolute path or a parent component, are
/// refused.
#[derive(Debug)]
pub struct DirSource {
    search_paths: Vec<PathBuf>,
    extension: String,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            search_paths: vec![root.into()],
            extension: "lore".to_string(),
        }
    }

    pub fn add_search_path(&mut self, root: impl Into<PathBuf>) {
        self.search_paths.push(root.into());
    }

    fn candidate(&self, name: &str) -> Option<PathBuf> {
        let base = Path::new(name);
        if base.is_absolute() {
            tracing::warn!(target: "lore::context", script = name, "absolute script names are refused");
            return None;
        }
        if base.components().any(|c| matches!(c, Component::ParentDir)) {
            tracing::warn!(target: "lore::context", script = name, "parent components in script names are refused");
            return None;
        }
        for root in &self.search_paths {
            let candidate = root.join(base).with_extension(&self.extension);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

impl ScriptSource for DirSource {
    fn source(&self, name: &str) -> Option<String> {
        let path = self.candidate(name)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(err) => {
                tracing::warn!(
                    target: "lore::context",
                    script = name,
                    path = %path.display(),
                    %err,
                    "script read failed"
                );
                None
            }
        }
    }

    fn path(&self, name: &str) -> Option<PathBuf> {
        self.candidate(name)
    }
}

/// Why a requested script could not be handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FetchError {
    /// The provider has no source under that name.
    Missing,
    /// The request closed an include cycle; the payload is the include
    /// path from the first repeated name back to itself.
    Cycle(Vec<String>),
    Cancelled,
}

#[derive(Default)]
struct GateState {
    owner: Option<ThreadId>,
    depth: u32,
    path: Vec<String>,
}

/// Serializes builds across threads while letting the owning thread
/// re-enter, so recursive include processing never deadlocks. The include
/// path of the build in flight lives here too.
struct BuildGate {
    state: Mutex<GateState>,
    ready: Condvar,
}

impl BuildGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            ready: Condvar::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits out a build running on another thread, then claims the gate.
    /// Claims nest on the owning thread.
    fn claim(&self) -> GateClaim<'_> {
        let me = thread::current().id();
        let mut state = self.lock_state();
        while state.owner.is_some_and(|owner| owner != me) {
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.owner = Some(me);
        state.depth += 1;
        GateClaim { gate: self }
    }

    /// Marks `name` as building; the entry pops when the guard drops.
    /// Callers must hold a claim.
    fn push(&self, name: &str) -> GatePath<'_> {
        self.lock_state().path.push(name.to_string());
        GatePath { gate: self }
    }

    /// The include path from the first occurrence of `name` through the
    /// build in flight, closed with `name` again. `None` when `name` is
    /// not building.
    fn cycle_from(&self, name: &str) -> Option<Vec<String>> {
        let state = self.lock_state();
        let at = state.path.iter().position(|entry| entry == name)?;
        let mut cycle = state.path[at..].to_vec();
        cycle.push(name.to_string());
        Some(cycle)
    }

    fn on_path(&self, name: &str) -> bool {
        self.lock_state().path.iter().any(|entry| entry == name)
    }
}

pub(crate) struct GateClaim<'a> {
    gate: &'a BuildGate,
}

impl Drop for GateClaim<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock_state();
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            state.path.clear();
            self.gate.ready.notify_all();
        }
    }
}

pub(crate) struct GatePath<'a> {
    gate: &'a BuildGate,
}

impl Drop for GatePath<'_> {
    fn drop(&mut self) {
        self.gate.lock_state().path.pop();
    }
}

#[derive(Default)]
struct CommandData {
    script: Option<Arc<Script>>,
    /// Engine structure slots, `ENGINE_STRUCTURE_0` first. Unusable slots
    /// hold [`TypeId::INVALID`].
    engine_types: Vec<TypeId>,
}

pub struct Context {
    provider: Box<dyn ScriptSource>,
    command_name: String,
    types: Mutex<TypeTable>,
    cache: DashMap<String, Arc<Script>>,
    builds: BuildGate,
    command: OnceCell<CommandData>,
    cancel: AtomicBool,
}

impl Context {
    pub fn new(provider: impl ScriptSource + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            command_name: DEFAULT_COMMAND_SCRIPT.to_string(),
            types: Mutex::new(TypeTable::new()),
            cache: DashMap::new(),
            builds: BuildGate::new(),
            command: OnceCell::new(),
            cancel: AtomicBool::new(false),
        }
    }

    /// Overrides the command script name. Must run before anything is
    /// built; the name is baked into every resolution.
    pub fn with_command_name(mut self, name: impl Into<String>) -> Self {
        self.command_name = name.into();
        self
    }

    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    /// Raw source lookup through the provider, without building anything.
    pub fn source(&self, name: &str) -> Option<String> {
        self.provider.source(name)
    }

    pub fn source_path(&self, name: &str) -> Option<PathBuf> {
        self.provider.path(name)
    }

    /// The script under `name`, fully parsed, include-processed and
    /// resolved. Concurrent calls for the same script coalesce into one
    /// build; later calls hit the cache.
    pub fn get(&self, name: &str) -> Option<Arc<Script>> {
        self.request(name).ok()
    }

    pub(crate) fn request(&self, name: &str) -> Result<Arc<Script>, FetchError> {
        if let Some(hit) = self.cached(name) {
            tracing::trace!(target: "lore::context", script = name, "cache hit");
            return Ok(hit);
        }
        let _claim = self.builds.claim();
        // The build this call waited out may have published the script.
        if let Some(hit) = self.cached(name) {
            return Ok(hit);
        }
        if let Some(cycle) = self.builds.cycle_from(name) {
            return Err(FetchError::Cycle(cycle));
        }
        if self.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let Some(text) = self.provider.source(name) else {
            tracing::debug!(target: "lore::context", script = name, "no source");
            return Err(FetchError::Missing);
        };
        tracing::debug!(target: "lore::context", script = name, bytes = text.len(), "building");
        let mut script = Script::from_source(name, text);
        script.process_includes(self);
        script.resolve(self);
        if self.is_cancelled() {
            tracing::debug!(target: "lore::context", script = name, "build cancelled");
            return Err(FetchError::Cancelled);
        }
        let script = Arc::new(script);
        self.cache.insert(name.to_string(), Arc::clone(&script));
        Ok(script)
    }

    /// Cache lookup without building.
    pub fn cached(&self, name: &str) -> Option<Arc<Script>> {
        self.cache.get(name).map(|entry| entry.value().clone())
    }

    /// The cached script under `name`, or the command script when the
    /// name matches it.
    pub(crate) fn script_by_name(&self, name: &str) -> Option<Arc<Script>> {
        if name == self.command_name {
            self.command_script()
        } else {
            self.cached(name)
        }
    }

    /// The resolved command script. `None` when the provider has no
    /// source for it, and inside the command script's own build.
    pub fn command_script(&self) -> Option<Arc<Script>> {
        self.command_data()?.script.clone()
    }

    /// Engine handle type registered for structure slot `slot`.
    pub fn engine_structure(&self, slot: usize) -> Option<TypeId> {
        self.command_data()?
            .engine_types
            .get(slot)
            .copied()
            .filter(|id| id.is_valid())
    }

    fn command_data(&self) -> Option<&CommandData> {
        if let Some(data) = self.command.get() {
            return Some(data);
        }
        let _claim = self.builds.claim();
        // Re-entered while the command script itself is loading; its
        // dependencies resolve without the command scope.
        if self.builds.on_path(&self.command_name) {
            return None;
        }
        Some(self.command.get_or_init(|| self.load_command()))
    }

    fn load_command(&self) -> CommandData {
        let Some(text) = self.provider.source(&self.command_name) else {
            tracing::warn!(
                target: "lore::context",
                script = %self.command_name,
                "command script unavailable"
            );
            return CommandData::default();
        };
        tracing::debug!(
            target: "lore::context",
            script = %self.command_name,
            bytes = text.len(),
            "loading command script"
        );
        let mut script = Script::from_source(self.command_name.clone(), text);
        script.parse();
        // Engine structures must register before the command script
        // resolves, its own declarations may use them.
        let engine_types = self.register_engine_types(&mut script);
        script.process_includes(self);
        script.resolve(self);
        CommandData {
            script: Some(Arc::new(script)),
            engine_types,
        }
    }

    fn register_engine_types(&self, script: &mut Script) -> Vec<TypeId> {
        let name = script.name().to_string();
        let header = match script
            .ast()
            .defines
            .iter()
            .find(|d| d.name == "ENGINE_NUM_STRUCTURES")
        {
            Some(d) => (d.value.clone(), d.span),
            None => return Vec::new(),
        };
        let count = match header.0.parse::<usize>() {
            Ok(count) if count <= MAX_ENGINE_STRUCTURES => count,
            _ => {
                script.diags_mut().semantic(
                    &name,
                    format!("ENGINE_NUM_STRUCTURES is not a usable count, '{}'", header.0),
                    true,
                    header.1,
                );
                return Vec::new();
            }
        };
        let mut slots = Vec::with_capacity(count);
        for i in 0..count {
            let lookup = format!("ENGINE_STRUCTURE_{i}");
            let define = script
                .ast()
                .defines
                .iter()
                .find(|d| d.name == lookup)
                .map(|d| (d.value.clone(), d.span));
            let Some((value, span)) = define else {
                script.diags_mut().semantic(
                    &name,
                    format!("missing engine structure define '{lookup}'"),
                    true,
                    header.1,
                );
                slots.push(TypeId::INVALID);
                continue;
            };
            match self.lock_types().id_of(&value) {
                Some(id) if ENGINE_HANDLES.contains(&id) => slots.push(id),
                _ => {
                    script.diags_mut().semantic(
                        &name,
                        format!("'{value}' does not name an engine handle type"),
                        true,
                        span,
                    );
                    slots.push(TypeId::INVALID);
                }
            }
        }
        tracing::debug!(
            target: "lore::context",
            script = %name,
            slots = slots.len(),
            "engine structures registered"
        );
        slots
    }

    /// Display name of a type, shared across every script in the context.
    pub fn type_name(&self, id: TypeId) -> String {
        self.lock_types().name_of(id).to_string()
    }

    pub(crate) fn lock_types(&self) -> MutexGuard<'_, TypeTable> {
        self.types.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn claim_builds(&self) -> GateClaim<'_> {
        self.builds.claim()
    }

    pub(crate) fn push_build(&self, name: &str) -> GatePath<'_> {
        self.builds.push(name)
    }

    /// Asks every stage checking the flag to abandon its run. Cancelled
    /// builds are never published to the cache.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn clear_cancel(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub(crate) fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn context_with(scripts: &[(&str, &str)]) -> Context {
        let mut provider = MemorySource::new();
        for (name, text) in scripts {
            provider.insert(*name, *text);
        }
        Context::new(provider)
    }

    #[test]
    fn test_get_builds_and_resolves() {
        let ctx = context_with(&[("main", "int VALUE = 40 + 2;\nvoid main() { VALUE = 0; }")]);
        let script = ctx.get("main").expect("builds");
        assert!(script.is_parsed());
        assert!(script.is_resolved());
        assert_eq!(script.errors(), 0);
        let res = script.resolution().expect("resolved");
        assert!(res.exports.contains_key("VALUE"));
        assert!(res.exports.contains_key("main"));
    }

    #[test]
    fn test_get_unknown_is_none() {
        let ctx = context_with(&[]);
        assert!(ctx.get("nowhere").is_none());
    }

    #[test]
    fn test_cache_returns_same_script() {
        let ctx = context_with(&[("main", "int A = 1;")]);
        let first = ctx.get("main").expect("builds");
        let second = ctx.get("main").expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
    }

    struct CountingSource {
        inner: MemorySource,
        counted: &'static str,
        hits: Arc<AtomicUsize>,
    }

    impl ScriptSource for CountingSource {
        fn source(&self, name: &str) -> Option<String> {
            if name == self.counted {
                self.hits.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.source(name)
        }
    }

    #[test]
    fn test_concurrent_gets_build_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut inner = MemorySource::new();
        inner.insert("main", "int VALUE = 40 + 2;");
        let ctx = Context::new(CountingSource {
            inner,
            counted: "main",
            hits: Arc::clone(&hits),
        });
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| ctx.get("main"));
            }
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(ctx.get("main").is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_include_is_diagnosed() {
        let ctx = context_with(&[("main", "#include \"nope\"\nint A = 1;")]);
        let script = ctx.get("main").expect("still builds");
        assert_eq!(script.errors(), 1);
        let report = script.diagnostics().to_string();
        assert!(report.contains("unable to locate include file 'nope'"), "{report}");
    }

    #[test]
    fn test_include_cycle_is_diagnosed() {
        let ctx = context_with(&[
            ("a", "#include \"b\"\nint A = 1;"),
            ("b", "#include \"a\"\nint B = 1;"),
        ]);
        let a = ctx.get("a").expect("a builds");
        // The cycle closes inside b, which is where it is reported.
        assert_eq!(a.errors(), 0);
        let b = ctx.cached("b").expect("b was built for a");
        let report = b.diagnostics().to_string();
        assert!(report.contains("recursive includes: a, b, a"), "{report}");
    }

    #[test]
    fn test_self_include_is_diagnosed() {
        let ctx = context_with(&[("a", "#include \"a\"\nint A = 1;")]);
        let a = ctx.get("a").expect("a builds");
        let report = a.diagnostics().to_string();
        assert!(report.contains("recursive includes: a, a"), "{report}");
    }

    #[test]
    fn test_command_exports_reach_scripts() {
        let ctx = context_with(&[
            (DEFAULT_COMMAND_SCRIPT, "const int TRUE = 1;\nint Abs(int value);"),
            ("main", "int A = Abs(TRUE);"),
        ]);
        let script = ctx.get("main").expect("builds");
        assert_eq!(script.errors(), 0, "{}", script.diagnostics());
    }

    #[test]
    fn test_command_script_resolves_itself() {
        let ctx = context_with(&[(DEFAULT_COMMAND_SCRIPT, "const int TRUE = 1;")]);
        let command = ctx.command_script().expect("loads");
        assert_eq!(command.name(), DEFAULT_COMMAND_SCRIPT);
        assert!(command.is_resolved());
        assert_eq!(command.errors(), 0);
    }

    #[test]
    fn test_custom_command_name() {
        let mut provider = MemorySource::new();
        provider.insert("engineapi", "const int TRUE = 1;");
        provider.insert("main", "int A = TRUE;");
        let ctx = Context::new(provider).with_command_name("engineapi");
        let script = ctx.get("main").expect("builds");
        assert_eq!(script.errors(), 0, "{}", script.diagnostics());
    }

    #[test]
    fn test_engine_structures_register() {
        let ctx = context_with(&[(
            DEFAULT_COMMAND_SCRIPT,
            "#define ENGINE_NUM_STRUCTURES 4\n\
             #define ENGINE_STRUCTURE_0 effect\n\
             #define ENGINE_STRUCTURE_1 event\n\
             #define ENGINE_STRUCTURE_2 location\n\
             #define ENGINE_STRUCTURE_3 talent\n\
             const int TRUE = 1;",
        )]);
        assert_eq!(ctx.engine_structure(0), Some(TypeId::EFFECT));
        assert_eq!(ctx.engine_structure(1), Some(TypeId::EVENT));
        assert_eq!(ctx.engine_structure(2), Some(TypeId::LOCATION));
        assert_eq!(ctx.engine_structure(3), Some(TypeId::TALENT));
        assert_eq!(ctx.engine_structure(4), None);
        let command = ctx.command_script().expect("loads");
        assert_eq!(command.warnings(), 0);
    }

    #[test]
    fn test_engine_structure_bad_value_warns() {
        let ctx = context_with(&[(
            DEFAULT_COMMAND_SCRIPT,
            "#define ENGINE_NUM_STRUCTURES 1\n#define ENGINE_STRUCTURE_0 int\n",
        )]);
        assert_eq!(ctx.engine_structure(0), None);
        let command = ctx.command_script().expect("loads");
        assert_eq!(command.warnings(), 1);
    }

    #[test]
    fn test_missing_engine_slot_warns() {
        let ctx = context_with(&[(
            DEFAULT_COMMAND_SCRIPT,
            "#define ENGINE_NUM_STRUCTURES 2\n#define ENGINE_STRUCTURE_0 effect\n",
        )]);
        assert_eq!(ctx.engine_structure(0), Some(TypeId::EFFECT));
        assert_eq!(ctx.engine_structure(1), None);
        let command = ctx.command_script().expect("loads");
        assert_eq!(command.warnings(), 1);
    }

    #[test]
    fn test_cancel_blocks_builds() {
        let ctx = context_with(&[("main", "int A = 1;")]);
        ctx.request_cancel();
        assert!(ctx.get("main").is_none());
        assert!(ctx.cached("main").is_none());
        ctx.clear_cancel();
        let script = ctx.get("main").expect("builds after clear");
        assert!(script.is_resolved());
    }

    #[test]
    fn test_dir_source_resolves_and_refuses_escapes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("util.lore"), "int HELPER = 1;").expect("write");
        std::fs::write(dir.path().join("main.lore"), "#include \"util\"\nint A = HELPER;")
            .expect("write");
        let source = DirSource::new(dir.path());
        assert!(source.path("main").is_some());
        assert!(source.source("../main").is_none());
        assert!(source.source("/etc/passwd").is_none());
        let ctx = Context::new(source);
        let script = ctx.get("main").expect("builds");
        assert_eq!(script.errors(), 0, "{}", script.diagnostics());
        assert!(ctx.source_path("util").is_some());
        assert!(ctx.get("missing").is_none());
    }
}
