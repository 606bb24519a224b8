//! The in-memory keymap data model, spec §3: keys, groups, levels, key
//! types, interpretations, LEDs, and the modifier set. A `Keymap` is
//! reference-counted and immutable once built (spec §5); groups refer to
//! key types by index rather than by pointer, so growing the type table
//! during compilation never invalidates an earlier reference (spec §9).

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;

use crate::actions::{Action, ControlMask, GroupsWrapPolicy};
use crate::atom::Atom;
use crate::error::{Error, Result};
use crate::keysym::Keysym;

pub const MAX_KEYCODE: u32 = 0x0fff;
pub const MAX_REAL_MODS: usize = 8;
pub const MAX_VIRTUAL_MODS: usize = 24;
pub const MAX_MODS: usize = MAX_REAL_MODS + MAX_VIRTUAL_MODS;
pub const MAX_GROUPS_V1: u32 = 4;
pub const MAX_GROUPS_V2: u32 = 32;

pub const REAL_MOD_NAMES: [&str; MAX_REAL_MODS] = [
    "Shift", "Lock", "Control", "Mod1", "Mod2", "Mod3", "Mod4", "Mod5",
];

/// The text format a keymap was (or will be) expressed in, spec §4.5/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeymapFormat {
    /// Legacy X11-compatible format: up to 4 groups, latch encoded via
    /// legacy actions.
    #[default]
    TextV1,
    /// Adds multiple keysyms/actions per level, `lockOnPress`/
    /// `lockOnRelease`/`latchOnPress`/`unlockOnPress`, up to 32 groups.
    TextV2,
}

impl KeymapFormat {
    pub fn max_groups(self) -> u32 {
        match self {
            KeymapFormat::TextV1 => MAX_GROUPS_V1,
            KeymapFormat::TextV2 => MAX_GROUPS_V2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    Real,
    Virtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifierDef {
    pub name: Atom,
    pub kind: ModifierKind,
    pub mapping: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTypeEntry {
    pub mods: u32,
    pub preserve: u32,
    pub level: u32,
}

#[derive(Debug, Clone)]
pub struct KeyType {
    pub name: Atom,
    pub mods: u32,
    pub num_levels: u32,
    pub level_names: Vec<Atom>,
    pub entries: Vec<KeyTypeEntry>,
}

impl KeyType {
    /// Finds the entry whose `mods` exactly match `active_mods & self.mods`,
    /// per spec §4.6 step 2. Falls back to level 0 if nothing matches.
    pub fn level_for_mods(&self, active_mods: u32) -> u32 {
        let relevant = active_mods & self.mods;
        self.entries
            .iter()
            .find(|e| e.mods == relevant)
            .map(|e| e.level)
            .unwrap_or(0)
    }

    pub fn preserved_mods(&self, active_mods: u32) -> u32 {
        let relevant = active_mods & self.mods;
        self.entries
            .iter()
            .find(|e| e.mods == relevant)
            .map(|e| e.preserve)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Level {
    pub syms: Vec<Keysym>,
    pub actions: Vec<Action>,
}

impl Level {
    pub fn first_sym(&self) -> Option<Keysym> {
        self.syms.first().copied()
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub type_index: usize,
    pub levels: Vec<Level>,
    pub explicit_type: bool,
    pub explicit_actions: bool,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExplicitComponents: u8 {
        const SYMBOLS = 1 << 0;
        const INTERP = 1 << 1;
        const TYPES = 1 << 2;
        const VMODMAP = 1 << 3;
        const REPEAT = 1 << 4;
    }
}

#[derive(Debug, Clone)]
pub struct Key {
    pub keycode: u32,
    pub name: Atom,
    pub modmap: u32,
    pub vmodmap: u32,
    pub repeats: bool,
    pub out_of_range_group_action: GroupsWrapPolicy,
    pub out_of_range_group_number: u32,
    pub groups: Vec<Group>,
    pub explicit: ExplicitComponents,
}

impl Key {
    pub fn num_groups(&self) -> u32 {
        self.groups.len() as u32
    }

    /// Resolves a (possibly out-of-range) requested group index against
    /// this key's actual group count, per spec §4.4/§4.6 step 1.
    pub fn resolve_group(&self, requested: u32) -> Option<u32> {
        let n = self.num_groups();
        if n == 0 {
            return None;
        }
        if requested < n {
            return Some(requested);
        }
        match self.out_of_range_group_action {
            GroupsWrapPolicy::Wrap => Some(requested % n),
            GroupsWrapPolicy::Saturate => Some(n - 1),
            GroupsWrapPolicy::Redirect => {
                if self.out_of_range_group_number < n {
                    Some(self.out_of_range_group_number)
                } else {
                    Some(0)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    None,
    AnyOrNone,
    Any,
    All,
    Exactly,
}

impl MatchOp {
    /// Whether `mods` satisfies this match operator against `type_mods`,
    /// spec §4.4 symbols pass.
    pub fn matches(self, mods: u32, type_mods: u32) -> bool {
        match self {
            MatchOp::None => mods == 0,
            MatchOp::AnyOrNone => mods == 0 || (mods & type_mods) != 0,
            MatchOp::Any => (mods & type_mods) != 0,
            MatchOp::All => (mods & type_mods) == mods,
            MatchOp::Exactly => mods == type_mods,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Interpretation {
    /// `None` represents the `ANY` sym wildcard.
    pub sym: Option<Keysym>,
    pub match_op: MatchOp,
    pub mods: u32,
    pub virtual_mod: Option<usize>,
    pub level_one_only: bool,
    pub repeat: bool,
    pub actions: Vec<Action>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LedWhich: u8 {
        const DEPRESSED = 1 << 0;
        const LATCHED = 1 << 1;
        const LOCKED = 1 << 2;
        const EFFECTIVE = 1 << 3;
    }
}

#[derive(Debug, Clone)]
pub struct Led {
    pub name: Atom,
    pub which_groups: LedWhich,
    pub groups: u32,
    pub which_mods: LedWhich,
    pub mods: u32,
    pub ctrls: ControlMask,
}

#[derive(Debug)]
struct KeymapInner {
    format: KeymapFormat,
    min_key_code: u32,
    max_key_code: u32,
    num_groups: u32,
    mods: Vec<ModifierDef>,
    canonical_state_mask: u32,
    types: Vec<KeyType>,
    keys: Vec<Key>,
    keys_by_name: HashMap<Atom, u32>,
    aliases: HashMap<Atom, Atom>,
    interpretations: Vec<Interpretation>,
    leds: Vec<Led>,
}

/// An immutable, reference-counted compiled keymap, spec §3/§5. Cloning is
/// cheap (an `Arc` bump).
#[derive(Debug, Clone)]
pub struct Keymap {
    inner: Arc<KeymapInner>,
}

impl Keymap {
    /// Assembles and validates a keymap, enforcing the invariants of
    /// spec §8: `min_key_code <= max_key_code`, `num_mods <= 32` with a
    /// fixed real-modifier prefix, every type entry's level/mods in
    /// range, every group's level count matching its type, and
    /// `canonical_state_mask == 0xff | (all virtual mappings)`.
    pub fn build(
        format: KeymapFormat,
        min_key_code: u32,
        max_key_code: u32,
        mods: Vec<ModifierDef>,
        types: Vec<KeyType>,
        keys: Vec<Key>,
        interpretations: Vec<Interpretation>,
        leds: Vec<Led>,
        aliases: HashMap<Atom, Atom>,
    ) -> Result<Keymap> {
        if min_key_code > max_key_code {
            return Err(Error::semantic("min_key_code > max_key_code"));
        }
        if max_key_code > MAX_KEYCODE {
            return Err(Error::limit(format!(
                "max_key_code {max_key_code:#x} exceeds cap {MAX_KEYCODE:#x}"
            )));
        }
        if mods.len() > MAX_MODS {
            return Err(Error::limit(format!("{} modifiers exceeds 32", mods.len())));
        }
        for (i, name) in REAL_MOD_NAMES.iter().enumerate() {
            let m = mods.get(i).ok_or_else(|| {
                Error::internal(format!("missing real modifier {name} at index {i}"))
            })?;
            if m.kind != ModifierKind::Real || m.mapping != 1 << i {
                return Err(Error::internal(format!(
                    "real modifier {i} must have mapping 1<<{i}"
                )));
            }
        }

        let mut num_groups = 0u32;
        for key in &keys {
            num_groups = num_groups.max(key.num_groups());
            for group in &key.groups {
                let ty = types
                    .get(group.type_index)
                    .ok_or_else(|| Error::semantic("group references unknown key type"))?;
                if group.levels.len() as u32 != ty.num_levels {
                    return Err(Error::semantic(format!(
                        "group has {} levels but type {} declares {}",
                        group.levels.len(),
                        ty.name.raw(),
                        ty.num_levels
                    )));
                }
            }
        }
        num_groups = num_groups.min(format.max_groups());

        for ty in &types {
            for entry in &ty.entries {
                if entry.level >= ty.num_levels {
                    return Err(Error::semantic(format!(
                        "type {} entry level {} out of range (num_levels={})",
                        ty.name.raw(),
                        entry.level,
                        ty.num_levels
                    )));
                }
                if entry.mods & !ty.mods != 0 {
                    return Err(Error::semantic(format!(
                        "type {} entry mods not a subset of type mods",
                        ty.name.raw()
                    )));
                }
            }
        }

        let virtual_mapping_union: u32 = mods
            .iter()
            .filter(|m| m.kind == ModifierKind::Virtual)
            .fold(0u32, |acc, m| acc | m.mapping);
        let canonical_state_mask = 0xff | virtual_mapping_union;

        let mut keys_by_name = HashMap::new();
        for key in &keys {
            if !key.name.is_none() {
                keys_by_name.insert(key.name, key.keycode);
            }
        }

        Ok(Keymap {
            inner: Arc::new(KeymapInner {
                format,
                min_key_code,
                max_key_code,
                num_groups,
                mods,
                canonical_state_mask,
                types,
                keys,
                keys_by_name,
                aliases,
                interpretations,
                leds,
            }),
        })
    }

    pub fn format(&self) -> KeymapFormat {
        self.inner.format
    }

    pub fn min_key_code(&self) -> u32 {
        self.inner.min_key_code
    }

    pub fn max_key_code(&self) -> u32 {
        self.inner.max_key_code
    }

    pub fn num_groups(&self) -> u32 {
        self.inner.num_groups
    }

    pub fn mods(&self) -> &[ModifierDef] {
        &self.inner.mods
    }

    pub fn num_mods(&self) -> u32 {
        self.inner.mods.len() as u32
    }

    pub fn mod_get_index(&self, name: Atom) -> Option<u32> {
        self.inner
            .mods
            .iter()
            .position(|m| m.name == name)
            .map(|i| i as u32)
    }

    pub fn canonical_state_mask(&self) -> u32 {
        self.inner.canonical_state_mask
    }

    pub fn types(&self) -> &[KeyType] {
        &self.inner.types
    }

    pub fn keys(&self) -> &[Key] {
        &self.inner.keys
    }

    pub fn interpretations(&self) -> &[Interpretation] {
        &self.inner.interpretations
    }

    pub fn leds(&self) -> &[Led] {
        &self.inner.leds
    }

    pub fn key(&self, keycode: u32) -> Option<&Key> {
        self.inner
            .keys
            .iter()
            .find(|k| k.keycode == keycode)
    }

    pub fn key_by_name(&self, name: Atom) -> Option<u32> {
        self.inner.keys_by_name.get(&name).copied()
    }

    /// Resolves an `alias <X> = <Y>;` name to the real key name it points
    /// at, spec §4.4 keycodes pass. Returns `None` for a name that isn't a
    /// registered alias.
    pub fn key_name_for_alias(&self, alias: Atom) -> Option<Atom> {
        self.inner.aliases.get(&alias).copied()
    }

    /// Reduces a runtime modifier mask to its "effective" real-bit
    /// expansion, per spec §4.4: AND with `canonical_state_mask`, then
    /// iteratively replace virtual-modifier bits with their mapping until
    /// fixpoint or only real bits remain.
    pub fn mod_mask_get_effective(&self, mask: u32) -> u32 {
        let mut current = mask & self.canonical_state_mask();
        for _ in 0..MAX_MODS {
            let mut next = current & 0xff;
            for (index, m) in self.inner.mods.iter().enumerate() {
                if m.kind == ModifierKind::Virtual && current & (1u32 << index) != 0 {
                    next |= m.mapping;
                }
            }
            if next == current {
                return next;
            }
            current = next;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomTable;

    fn base_mods(atoms: &mut AtomTable) -> Vec<ModifierDef> {
        REAL_MOD_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| ModifierDef {
                name: atoms.intern(name),
                kind: ModifierKind::Real,
                mapping: 1 << i,
            })
            .collect()
    }

    #[test]
    fn rejects_min_above_max() {
        let mut atoms = AtomTable::new();
        let err = Keymap::build(
            KeymapFormat::TextV1,
            10,
            5,
            base_mods(&mut atoms),
            vec![],
            vec![],
            vec![],
            vec![],
            HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Semantic(_)));
    }

    #[test]
    fn canonical_state_mask_includes_virtual_mappings() {
        let mut atoms = AtomTable::new();
        let mut mods = base_mods(&mut atoms);
        mods.push(ModifierDef {
            name: atoms.intern("LevelThree"),
            kind: ModifierKind::Virtual,
            mapping: 0x100,
        });
        let keymap = Keymap::build(
            KeymapFormat::TextV1,
            8,
            255,
            mods,
            vec![],
            vec![],
            vec![],
            vec![],
            HashMap::new(),
        )
        .unwrap();
        assert_eq!(keymap.canonical_state_mask(), 0xff | 0x100);
    }

    #[test]
    fn virtual_modifier_swap_resolves_via_effective_mask() {
        let mut atoms = AtomTable::new();
        let mut mods = base_mods(&mut atoms);
        let m1 = atoms.intern("M1");
        let m2 = atoms.intern("M2");
        mods.push(ModifierDef {
            name: m1,
            kind: ModifierKind::Virtual,
            mapping: 0x200,
        });
        mods.push(ModifierDef {
            name: m2,
            kind: ModifierKind::Virtual,
            mapping: 0x100,
        });
        let keymap = Keymap::build(
            KeymapFormat::TextV1,
            8,
            255,
            mods,
            vec![],
            vec![],
            vec![],
            vec![],
            HashMap::new(),
        )
        .unwrap();
        let m1_index = keymap.mod_get_index(m1).unwrap();
        let m2_index = keymap.mod_get_index(m2).unwrap();
        assert_eq!(keymap.mod_mask_get_effective(1 << m1_index), 0x100);
        assert_eq!(keymap.mod_mask_get_effective(1 << m2_index), 0x200);
    }

    #[test]
    fn type_level_lookup_falls_back_to_zero() {
        let ty = KeyType {
            name: Atom::NONE,
            mods: 0x1,
            num_levels: 2,
            level_names: vec![],
            entries: vec![KeyTypeEntry {
                mods: 0x1,
                preserve: 0,
                level: 1,
            }],
        };
        assert_eq!(ty.level_for_mods(0x1), 1);
        assert_eq!(ty.level_for_mods(0x0), 0);
    }

    #[test]
    fn out_of_range_group_policies() {
        let key = Key {
            keycode: 38,
            name: Atom::NONE,
            modmap: 0,
            vmodmap: 0,
            repeats: true,
            out_of_range_group_action: GroupsWrapPolicy::Saturate,
            out_of_range_group_number: 0,
            groups: vec![
                Group {
                    type_index: 0,
                    levels: vec![Level::default()],
                    explicit_type: false,
                    explicit_actions: false,
                },
                Group {
                    type_index: 0,
                    levels: vec![Level::default()],
                    explicit_type: false,
                    explicit_actions: false,
                },
            ],
            explicit: ExplicitComponents::empty(),
        };
        assert_eq!(key.resolve_group(5), Some(1));

        let mut redirect_key = key.clone();
        redirect_key.out_of_range_group_action = GroupsWrapPolicy::Redirect;
        redirect_key.out_of_range_group_number = 0;
        assert_eq!(redirect_key.resolve_group(5), Some(0));

        let mut wrap_key = key;
        wrap_key.out_of_range_group_action = GroupsWrapPolicy::Wrap;
        assert_eq!(wrap_key.resolve_group(5), Some(1));
    }
}
