//! Process-wide configuration: include paths, atom interning, environment
//! gating, and the diagnostics sink. Spec §4.1.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bitflags::bitflags;

use crate::atom::{Atom, AtomTable};
use crate::diag::{LogFn, LogLevel, MessageId};

bitflags! {
    /// Flags for context creation, spec §4.1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ContextFlags: u32 {
        /// Create this context with an empty include path.
        const NO_DEFAULT_INCLUDES = 1 << 0;
        /// Don't take RMLVO names from the environment.
        const NO_ENVIRONMENT_NAMES = 1 << 1;
        /// Don't use `secure_getenv` semantics (this crate always reads
        /// plain `std::env::var`; this bit is accepted for API parity and
        /// otherwise has no effect).
        const NO_SECURE_GETENV = 1 << 2;
    }
}

/// The compiled-in system root used when no override is configured. Real
/// installs mount libxkbcommon's data under this path; this crate does not
/// ship that data, so include resolution against it will simply fail to
/// find files unless the caller appends their own paths.
pub const SYSTEM_XKB_CONFIG_ROOT: &str = "/usr/share/X11/xkb";

struct Inner {
    flags: ContextFlags,
    include_paths: Vec<PathBuf>,
    failed_includes: Vec<PathBuf>,
    atoms: AtomTable,
    log_level: LogLevel,
    log_verbosity: i32,
    log_sink: Option<Box<LogFn>>,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("flags", &self.flags)
            .field("include_paths", &self.include_paths)
            .field("failed_includes", &self.failed_includes)
            .field("log_level", &self.log_level)
            .field("log_verbosity", &self.log_verbosity)
            .finish()
    }
}

/// Top-level library context object, per spec §4.1 and §5.
///
/// Cheaply `Clone`-able (an `Arc` handle over shared state). Per §5, the
/// client is responsible for serializing concurrent mutation of a single
/// context;
/// the `Mutex` here only protects against accidental aliasing bugs, not
/// against genuine concurrent use.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.lock().unwrap().fmt(f)
    }
}

fn dir_is_usable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_dir() && (meta.permissions().mode() & 0o500) == 0o500,
        Err(_) => false,
    }
}

impl Context {
    /// Create a new context. Default include paths are populated unless
    /// `NO_DEFAULT_INCLUDES` is set.
    pub fn new(flags: ContextFlags) -> Context {
        let mut inner = Inner {
            flags,
            include_paths: Vec::new(),
            failed_includes: Vec::new(),
            atoms: AtomTable::new(),
            log_level: LogLevel::default(),
            log_verbosity: 0,
            log_sink: None,
        };
        if !flags.contains(ContextFlags::NO_DEFAULT_INCLUDES) {
            push_default_include_paths(&mut inner);
        }
        Context {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn flags(&self) -> ContextFlags {
        self.inner.lock().unwrap().flags
    }

    /// Append a new entry to the include path. Returns `true` on success;
    /// an unusable directory is recorded in `failed_include_paths()` and
    /// this returns `false`.
    pub fn include_path_append(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let mut inner = self.inner.lock().unwrap();
        if dir_is_usable(&path) {
            inner.include_paths.push(path);
            true
        } else {
            inner.failed_includes.push(path);
            false
        }
    }

    /// Append the default include paths again (e.g. after a `clear`).
    pub fn include_path_append_default(&self) {
        let mut inner = self.inner.lock().unwrap();
        push_default_include_paths(&mut inner);
    }

    /// Remove all entries from the include path, then reinsert the
    /// defaults.
    pub fn include_path_reset_defaults(&self) {
        self.include_path_clear();
        self.include_path_append_default();
    }

    pub fn include_path_clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.include_paths.clear();
        inner.failed_includes.clear();
    }

    pub fn include_paths(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().include_paths.clone()
    }

    pub fn failed_include_paths(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().failed_includes.clone()
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.inner.lock().unwrap().log_level = level;
    }

    pub fn log_level(&self) -> LogLevel {
        self.inner.lock().unwrap().log_level
    }

    pub fn set_log_verbosity(&self, verbosity: i32) {
        self.inner.lock().unwrap().log_verbosity = verbosity;
    }

    pub fn log_verbosity(&self) -> i32 {
        self.inner.lock().unwrap().log_verbosity
    }

    /// Install a sink that receives every diagnostic at or above the
    /// context's current log level.
    pub fn set_log_fn<F>(&self, f: F)
    where
        F: FnMut(LogLevel, MessageId, &str) + 'static,
    {
        self.inner.lock().unwrap().log_sink = Some(Box::new(f));
    }

    /// Emit a diagnostic through the installed sink, if the level clears
    /// the configured threshold. Compilation passes call this; nothing
    /// here ever fails.
    pub fn log(&self, level: LogLevel, id: MessageId, text: impl AsRef<str>) {
        let mut inner = self.inner.lock().unwrap();
        if level > inner.log_level {
            return;
        }
        if let Some(sink) = inner.log_sink.as_mut() {
            sink(level, id, text.as_ref());
        }
    }

    /// Intern a string into this context's atom table.
    pub fn intern_atom(&self, s: &str) -> Atom {
        self.inner.lock().unwrap().atoms.intern(s)
    }

    /// Look up a string without interning it.
    pub fn lookup_atom(&self, s: &str) -> Atom {
        self.inner.lock().unwrap().atoms.lookup(s)
    }

    /// Resolve an atom back to its string.
    pub fn atom_text(&self, atom: Atom) -> Option<String> {
        self.inner.lock().unwrap().atoms.text(atom).map(str::to_owned)
    }

    /// Reads an RMLVO-relevant environment variable, honoring
    /// `NO_ENVIRONMENT_NAMES`.
    pub fn getenv(&self, name: &str) -> Option<String> {
        if self.flags().contains(ContextFlags::NO_ENVIRONMENT_NAMES) {
            return None;
        }
        env::var(name).ok()
    }
}

fn push_default_include_paths(inner: &mut Inner) {
    let mut candidates: Vec<PathBuf> = Vec::new();

    let xdg_config = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")));
    if let Some(xdg) = xdg_config {
        candidates.push(xdg.join("xkb"));
    }
    if let Some(home) = env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(".xkb"));
    }
    if let Some(extra) = env::var_os("XKB_CONFIG_EXTRA_PATH") {
        candidates.push(PathBuf::from(extra));
    }
    let root = env::var_os("XKB_CONFIG_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(SYSTEM_XKB_CONFIG_ROOT));
    candidates.push(root);

    for path in candidates {
        if dir_is_usable(&path) {
            inner.include_paths.push(path);
        } else {
            inner.failed_includes.push(path);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new(ContextFlags::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_default_includes_yields_empty_path() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        assert!(ctx.include_paths().is_empty());
    }

    #[test]
    fn append_nonexistent_dir_fails_and_is_recorded() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let ok = ctx.include_path_append("/definitely/not/a/real/xkb/path");
        assert!(!ok);
        assert_eq!(ctx.failed_include_paths().len(), 1);
    }

    #[test]
    fn append_existing_dir_succeeds() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let dir = std::env::temp_dir();
        assert!(ctx.include_path_append(dir));
        assert_eq!(ctx.include_paths().len(), 1);
    }

    #[test]
    fn atom_interning_round_trips() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let atom = ctx.intern_atom("Shift");
        assert_eq!(ctx.atom_text(atom).as_deref(), Some("Shift"));
        assert_eq!(ctx.lookup_atom("Shift"), atom);
    }

    #[test]
    fn environment_names_can_be_disabled() {
        std::env::set_var("XKB_DEFAULT_MODEL_TEST_PROBE", "pc104");
        let ctx = Context::new(ContextFlags::NO_ENVIRONMENT_NAMES);
        assert_eq!(ctx.getenv("XKB_DEFAULT_MODEL_TEST_PROBE"), None);
        std::env::remove_var("XKB_DEFAULT_MODEL_TEST_PROBE");
    }

    #[test]
    fn log_sink_receives_messages_at_or_above_threshold() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        ctx.set_log_level(LogLevel::Warning);
        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = received.clone();
        ctx.set_log_fn(move |level, _id, text| {
            received2.lock().unwrap().push((level, text.to_owned()));
        });
        ctx.log(LogLevel::Debug, MessageId::NoId, "too quiet to show");
        ctx.log(LogLevel::Error, MessageId::NoId, "should show");
        let got = received.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].1, "should show");
    }
}
