//! Compose lookup, interface only (spec §4.7): a `State` can consult a
//! compose table to turn a sequence of keysyms into one composed result,
//! but building or parsing a real Compose file tree is out of scope here.
//! This module defines the trait boundary and a no-op implementation so
//! code that accepts a compose backend stays usable without one.

/// Result of feeding one keysym to a `ComposeState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No compose sequence is in progress.
    Nothing,
    /// A sequence is in progress; more keysyms may complete or cancel it.
    Composing,
    /// A sequence completed; `get_one_sym`/`get_utf8` return its result.
    Composed,
    /// The fed keysym doesn't continue any known sequence; the in-progress
    /// sequence (if any) is abandoned.
    Cancelled,
}

/// Outcome of `ComposeState::feed`, spec §4.7.
pub type FeedResult = Status;

/// A table of compose sequences, spec §4.7. Opaque from this crate's
/// perspective: real implementations would parse a `Compose` file (XCompose
/// grammar) and build a trie keyed by keysym sequence, but that tree
/// builder is explicitly out of scope (spec §1/§9).
pub trait ComposeTable {
    /// Starts a fresh `ComposeState` over this table.
    fn new_state(&self) -> Box<dyn ComposeState>;
}

/// Per-keyboard compose sequence progress, spec §4.7. A `State`'s
/// "effective keysym" for a key press is this object's composed result
/// when `status()` is `Composed`, otherwise the key's own single sym.
pub trait ComposeState {
    /// Feeds one keysym into the sequence, returning the new status.
    fn feed(&mut self, sym: crate::keysym::Keysym) -> FeedResult;

    /// Resets to `Status::Nothing`, abandoning any sequence in progress.
    fn reset(&mut self);

    fn status(&self) -> Status;

    /// The composed keysym, if `status()` is `Composed`.
    fn get_one_sym(&self) -> Option<crate::keysym::Keysym>;

    /// The composed sequence's UTF-8 text, if `status()` is `Composed`.
    fn get_utf8(&self) -> Option<String>;
}

/// A `ComposeState` that never composes anything: every `feed` call
/// reports `Cancelled`. Used as the default backend so `State` doesn't
/// need an `Option<Box<dyn ComposeState>>` at every call site.
#[derive(Debug, Default)]
pub struct NullComposeState;

impl ComposeState for NullComposeState {
    fn feed(&mut self, _sym: crate::keysym::Keysym) -> FeedResult {
        Status::Cancelled
    }

    fn reset(&mut self) {}

    fn status(&self) -> Status {
        Status::Nothing
    }

    fn get_one_sym(&self) -> Option<crate::keysym::Keysym> {
        None
    }

    fn get_utf8(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keysym::Keysym;

    #[test]
    fn null_compose_state_never_composes() {
        let mut state = NullComposeState;
        assert_eq!(state.status(), Status::Nothing);
        assert_eq!(state.feed(Keysym::from_name("a")), Status::Cancelled);
        assert_eq!(state.get_one_sym(), None);
        assert_eq!(state.get_utf8(), None);
    }
}
