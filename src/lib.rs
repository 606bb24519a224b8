//! A pure-Rust XKB keymap compiler and keyboard state machine.
//!
//! This crate implements the XKB text format end to end: parsing keymap
//! source and RMLVO rule files, compiling them into an immutable [`Keymap`],
//! driving a [`State`] machine from key press/release events, and
//! serializing a compiled keymap back to source text. It does not bind to
//! `libxkbcommon` — every pass here is native Rust.
//!
//! The pieces, roughly in pipeline order:
//!
//! - [`context`] — process-wide config: include paths, atom interning,
//!   diagnostics sink.
//! - [`rules`] — resolves an RMLVO tuple against a rules file into
//!   `xkb_keycodes`/`xkb_types`/`xkb_compatibility`/`xkb_symbols` component
//!   names.
//! - [`parser`] — turns keymap source text into an uncompiled section tree.
//! - [`compiler`] — the four-pass compiler (keycodes, types, compat,
//!   symbols) that turns a parsed tree into a [`Keymap`].
//! - [`keymap`] and [`actions`] — the compiled data model.
//! - [`state`] — the runtime state machine: modifier/layout tracking,
//!   action dispatch, consumed-modifiers queries, LED state.
//! - [`serializer`] — the inverse of the parser/compiler: `Keymap` -> text.
//! - [`compose`] — the interface a `State` would consult for Compose key
//!   sequences (no tree builder; see the module docs).

pub mod actions;
pub mod atom;
pub mod compiler;
pub mod compose;
pub mod context;
pub mod diag;
pub mod error;
pub mod keymap;
pub mod keysym;
pub mod parser;
pub mod rules;
pub mod serializer;
pub mod state;

pub use actions::{Action, ControlMask, GroupAction, GroupActionFlags, ModAction, ModActionFlags};
pub use atom::{Atom, AtomTable};
pub use compose::{ComposeState, ComposeTable, FeedResult, NullComposeState, Status};
pub use context::{Context, ContextFlags};
pub use diag::{LogLevel, MessageId};
pub use error::{Error, Location, Result};
pub use keymap::{Key, KeyType, Keymap, KeymapFormat};
pub use keysym::{Keysym, NO_SYMBOL};
pub use rules::{KcCgst, Rmlvo};
pub use state::{ConsumedMode, KeyDirection, State, StateComponent};

/// Parses and compiles keymap source text in one step, the common case for
/// a caller that already has a concrete `xkb_keymap { ... };` string (e.g.
/// produced by [`rules::resolve`] and assembled into a full keymap
/// document, or read from a cache).
pub fn compile_keymap_str(
    ctx: &Context,
    source: &str,
    format: KeymapFormat,
) -> error::Result<Keymap> {
    let file = parser::parse_str(source)?;
    compiler::compile(ctx, &file, format)
}
