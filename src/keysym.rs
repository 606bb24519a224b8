//! Keysyms: the 32-bit codes identifying a logical key meaning, per
//! spec §3/§9.
//!
//! This crate owns the name/value table and case-mapping logic directly
//! instead of depending on an external keysym crate (see DESIGN.md) since
//! both are compiler-internal concerns here rather than FFI surface. The
//! built-in table below covers the keysyms named throughout spec.md's
//! examples and the common Latin/editing/modifier set; it is intentionally
//! not a transcription of the full upstream keysym database, which is an
//! open-ended data table rather than an algorithmic concern.

use std::fmt;

/// A keysym: either a legacy named code (below `0x0100_0000`) or a direct
/// Unicode encoding (`0x0100_0100..=0x0110_ffff`, UTF-32 codepoint `sym -
/// 0x01000000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Keysym(pub u32);

pub const NO_SYMBOL: Keysym = Keysym(0);

const UNICODE_OFFSET: u32 = 0x0100_0000;
const UNICODE_MIN: u32 = 0x0100_0100;
const UNICODE_MAX: u32 = 0x0110_ffff;

/// `(name, value)` pairs for the named keysyms this crate knows about.
/// Kept alphabetically sorted by name isn't required for correctness but
/// makes diffs readable; lookups are linear, which is fine for a table
/// this size (a production-scale table would use a generated perfect
/// hash, the way upstream does).
#[rustfmt::skip]
const NAMED_KEYSYMS: &[(&str, u32)] = &[
    ("NoSymbol", 0x0000_0000),
    ("VoidSymbol", 0x00ff_ffff),
    ("BackSpace", 0xff08),
    ("Tab", 0xff09),
    ("Linefeed", 0xff0a),
    ("Clear", 0xff0b),
    ("Return", 0xff0d),
    ("Pause", 0xff13),
    ("Scroll_Lock", 0xff14),
    ("Sys_Req", 0xff15),
    ("Escape", 0xff1b),
    ("Delete", 0xffff),
    ("Home", 0xff50),
    ("Left", 0xff51),
    ("Up", 0xff52),
    ("Right", 0xff53),
    ("Down", 0xff54),
    ("Page_Up", 0xff55),
    ("Page_Down", 0xff56),
    ("End", 0xff57),
    ("Begin", 0xff58),
    ("Select", 0xff60),
    ("Print", 0xff61),
    ("Execute", 0xff62),
    ("Insert", 0xff63),
    ("Menu", 0xff67),
    ("Cancel", 0xff69),
    ("Help", 0xff6a),
    ("Break", 0xff6b),
    ("Num_Lock", 0xff7f),
    ("KP_Enter", 0xff8d),
    ("F1", 0xffbe),
    ("F2", 0xffbf),
    ("F3", 0xffc0),
    ("F4", 0xffc1),
    ("F5", 0xffc2),
    ("F6", 0xffc3),
    ("F7", 0xffc4),
    ("F8", 0xffc5),
    ("F9", 0xffc6),
    ("F10", 0xffc7),
    ("F11", 0xffc8),
    ("F12", 0xffc9),
    ("Shift_L", 0xffe1),
    ("Shift_R", 0xffe2),
    ("Control_L", 0xffe3),
    ("Control_R", 0xffe4),
    ("Caps_Lock", 0xffe5),
    ("Shift_Lock", 0xffe6),
    ("Meta_L", 0xffe7),
    ("Meta_R", 0xffe8),
    ("Alt_L", 0xffe9),
    ("Alt_R", 0xffea),
    ("Super_L", 0xffeb),
    ("Super_R", 0xffec),
    ("Hyper_L", 0xffed),
    ("Hyper_R", 0xffee),
    ("ISO_Level3_Shift", 0xfe03),
    ("ISO_Level3_Latch", 0xfe04),
    ("ISO_Level3_Lock", 0xfe05),
    ("ISO_Level5_Shift", 0xfe11),
    ("ISO_Level5_Latch", 0xfe12),
    ("ISO_Level5_Lock", 0xfe13),
    ("ISO_Next_Group", 0xfe08),
    ("ISO_Prev_Group", 0xfe0a),
    ("ISO_First_Group", 0xfe0c),
    ("ISO_Last_Group", 0xfe0e),
    ("space", 0x0020),
    ("exclam", 0x0021),
    ("quotedbl", 0x0022),
    ("comma", 0x002c),
    ("minus", 0x002d),
    ("period", 0x002e),
    ("slash", 0x002f),
    ("colon", 0x003a),
    ("semicolon", 0x003b),
    ("equal", 0x003d),
    ("question", 0x003f),
    ("at", 0x0040),
    ("bracketleft", 0x005b),
    ("backslash", 0x005c),
    ("bracketright", 0x005d),
    ("underscore", 0x005f),
    ("grave", 0x0060),
    ("braceleft", 0x007b),
    ("bar", 0x007c),
    ("braceright", 0x007d),
    ("asciitilde", 0x007e),
    ("0", 0x0030), ("1", 0x0031), ("2", 0x0032), ("3", 0x0033), ("4", 0x0034),
    ("5", 0x0035), ("6", 0x0036), ("7", 0x0037), ("8", 0x0038), ("9", 0x0039),
    ("a", 0x0061), ("b", 0x0062), ("c", 0x0063), ("d", 0x0064), ("e", 0x0065),
    ("f", 0x0066), ("g", 0x0067), ("h", 0x0068), ("i", 0x0069), ("j", 0x006a),
    ("k", 0x006b), ("l", 0x006c), ("m", 0x006d), ("n", 0x006e), ("o", 0x006f),
    ("p", 0x0070), ("q", 0x0071), ("r", 0x0072), ("s", 0x0073), ("t", 0x0074),
    ("u", 0x0075), ("v", 0x0076), ("w", 0x0077), ("x", 0x0078), ("y", 0x0079),
    ("z", 0x007a),
    ("A", 0x0041), ("B", 0x0042), ("C", 0x0043), ("D", 0x0044), ("E", 0x0045),
    ("F", 0x0046), ("G", 0x0047), ("H", 0x0048), ("I", 0x0049), ("J", 0x004a),
    ("K", 0x004b), ("L", 0x004c), ("M", 0x004d), ("N", 0x004e), ("O", 0x004f),
    ("P", 0x0050), ("Q", 0x0051), ("R", 0x0052), ("S", 0x0053), ("T", 0x0054),
    ("U", 0x0055), ("V", 0x0056), ("W", 0x0057), ("X", 0x0058), ("Y", 0x0059),
    ("Z", 0x005a),
    ("dead_grave", 0xfe50),
    ("dead_acute", 0xfe51),
    ("dead_circumflex", 0xfe52),
    ("dead_tilde", 0xfe53),
    ("dead_diaeresis", 0xfe57),
    ("aacute", 0x00e1),
    ("Aacute", 0x00c1),
    ("agrave", 0x00e0),
    ("acircumflex", 0x00e2),
    ("atilde", 0x00e3),
    ("adiaeresis", 0x00e4),
    ("hebrew_yod", 0x0cea),
];

/// Case-folding pairs the state machine's capitalization transform needs
/// (spec §4.6 step 3 / §9). Upper-case form lookup only: given a lower-case
/// keysym, what's its upper-case counterpart.
#[rustfmt::skip]
const CASE_PAIRS: &[(u32, u32)] = &[
    (0x0061, 0x0041), (0x0062, 0x0042), (0x0063, 0x0043), (0x0064, 0x0044),
    (0x0065, 0x0045), (0x0066, 0x0046), (0x0067, 0x0047), (0x0068, 0x0048),
    (0x0069, 0x0049), (0x006a, 0x004a), (0x006b, 0x004b), (0x006c, 0x004c),
    (0x006d, 0x004d), (0x006e, 0x004e), (0x006f, 0x004f), (0x0070, 0x0050),
    (0x0071, 0x0051), (0x0072, 0x0052), (0x0073, 0x0053), (0x0074, 0x0054),
    (0x0075, 0x0055), (0x0076, 0x0056), (0x0077, 0x0057), (0x0078, 0x0058),
    (0x0079, 0x0059), (0x007a, 0x005a),
    (0x00e1, 0x00c1), // aacute -> Aacute
];

impl Keysym {
    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_unicode_direct(self) -> bool {
        (UNICODE_MIN..=UNICODE_MAX).contains(&self.0)
    }

    /// Best-effort name lookup: the registered name if known, otherwise
    /// the canonical `0x...` hex rendering used by the text format.
    pub fn name(self) -> String {
        if let Some((name, _)) = NAMED_KEYSYMS.iter().find(|&&(_, v)| v == self.0) {
            return (*name).to_owned();
        }
        if self.is_unicode_direct() {
            return format!("U{:04X}", self.0 - UNICODE_OFFSET);
        }
        format!("0x{:08x}", self.0)
    }

    /// Parses a keysym name, accepting anything `name()` can produce:
    /// registered names, `U<codepoint>` Unicode names, and `0x...`/plain
    /// hex. Returns `NO_SYMBOL` if nothing matches.
    pub fn from_name(name: &str) -> Keysym {
        Self::from_name_checked(name).unwrap_or(NO_SYMBOL)
    }

    /// Like `from_name`, but distinguishes a name this crate doesn't
    /// recognize from a name that legitimately spells `NO_SYMBOL` (e.g.
    /// `NoSymbol`, `0x0`). Compiler passes use this to tell an unresolved
    /// symbols-list entry from a deliberate hole, spec §6's diagnostics
    /// propagation policy.
    pub fn from_name_checked(name: &str) -> Option<Keysym> {
        if let Some((_, value)) = NAMED_KEYSYMS.iter().find(|&&(n, _)| n == name) {
            return Some(Keysym(*value));
        }
        if let Some(hex) = name.strip_prefix('U').or_else(|| name.strip_prefix('u')) {
            if let Ok(cp) = u32::from_str_radix(hex, 16) {
                return Some(Keysym(UNICODE_OFFSET + cp));
            }
        }
        if let Some(hex) = name.strip_prefix("0x").or_else(|| name.strip_prefix("0X")) {
            if let Ok(v) = u32::from_str_radix(hex, 16) {
                return Some(Keysym(v));
            }
        }
        None
    }

    /// Unicode/UTF-32 representation, or 0 if the keysym has none.
    pub fn to_utf32(self) -> u32 {
        if self.0 == 0 || self.0 == 0x00ff_ffff {
            return 0;
        }
        if self.is_unicode_direct() {
            return self.0 - UNICODE_OFFSET;
        }
        // Keysyms in 0x20..0xff map 1:1 onto Latin-1 (the legacy encoding
        // this crate's named table mostly uses).
        if (0x0020..=0x00ff).contains(&self.0) {
            return self.0;
        }
        0
    }

    /// UTF-8 representation, or the empty string if none.
    pub fn to_utf8(self) -> String {
        match self.to_utf32() {
            0 => String::new(),
            cp => char::from_u32(cp).map(|c| c.to_string()).unwrap_or_default(),
        }
    }

    /// Inverse of `to_utf32`: the keysym corresponding to a codepoint, or
    /// `NO_SYMBOL` if there is none.
    pub fn from_utf32(codepoint: u32) -> Keysym {
        if (0x0020..=0x00ff).contains(&codepoint) {
            if let Some((_, value)) = NAMED_KEYSYMS
                .iter()
                .filter(|&&(_, v)| v == codepoint)
                .min_by_key(|&&(_, v)| v)
            {
                return Keysym(*value);
            }
        }
        match codepoint {
            0 => NO_SYMBOL,
            cp if char::from_u32(cp).is_some() => Keysym(UNICODE_OFFSET + cp),
            _ => NO_SYMBOL,
        }
    }

    /// The upper-case form of this keysym, if it has a registered one.
    /// Used by the state machine's capitalization transform (spec §4.6).
    pub fn to_upper(self) -> Option<Keysym> {
        CASE_PAIRS
            .iter()
            .find(|&&(lower, _)| lower == self.0)
            .map(|&(_, upper)| Keysym(upper))
    }

    pub fn has_upper(self) -> bool {
        self.to_upper().is_some()
    }
}

impl fmt::Display for Keysym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<u32> for Keysym {
    fn from(raw: u32) -> Self {
        Keysym(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_round_trip() {
        let sym = Keysym::from_name("a");
        assert_eq!(sym.name(), "a");
        assert_eq!(sym.to_utf8(), "a");
    }

    #[test]
    fn unicode_direct_round_trip() {
        let sym = Keysym::from_name("U00E9");
        assert_eq!(sym.to_utf32(), 0x00e9);
        assert_eq!(sym.to_utf8(), "é");
        assert_eq!(sym.name(), "U00E9");
    }

    #[test]
    fn unknown_name_is_no_symbol() {
        assert_eq!(Keysym::from_name("not_a_real_keysym"), NO_SYMBOL);
    }

    #[test]
    fn checked_lookup_distinguishes_unresolved_from_explicit_no_symbol() {
        assert_eq!(Keysym::from_name_checked("NoSymbol"), Some(NO_SYMBOL));
        assert_eq!(Keysym::from_name_checked("cyrillic_a"), None);
        assert_eq!(Keysym::from_name_checked("a"), Some(Keysym::from_name("a")));
    }

    #[test]
    fn capitalization_transform_uses_upper_table() {
        let a = Keysym::from_name("a");
        assert_eq!(a.to_upper(), Some(Keysym::from_name("A")));
        let period = Keysym::from_name("period");
        assert_eq!(period.to_upper(), None);
    }

    #[test]
    fn hex_fallback_round_trips() {
        let sym = Keysym::from_name("0xabcd1234");
        assert_eq!(sym.raw(), 0xabcd1234);
        assert_eq!(sym.name(), "0xabcd1234");
    }
}
