//! Runtime keyboard state, spec §4.6: tracks depressed/latched/locked
//! modifiers and layout (group), dispatches each pressed key's actions,
//! and recomputes LEDs. A `State` borrows nothing from its `Keymap`
//! beyond a cheap `Arc` clone, so it can outlive the call that created it
//! (spec §5).

use bitflags::bitflags;

use crate::actions::{ControlMask, GroupsWrapPolicy};
use crate::atom::Atom;
use crate::keymap::{Key, Keymap, Led, LedWhich, Level};
use crate::keysym::Keysym;

/// Whether a key press or release is being reported, spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

bitflags! {
    /// Which parts of `State` changed as a result of an update call, spec
    /// §4.6. Callers use this to decide what to re-query/redraw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateComponent: u32 {
        const DEPRESSED_MODS = 1 << 0;
        const LATCHED_MODS = 1 << 1;
        const LOCKED_MODS = 1 << 2;
        const EFFECTIVE_MODS = 1 << 3;
        const DEPRESSED_LAYOUT = 1 << 4;
        const LATCHED_LAYOUT = 1 << 5;
        const LOCKED_LAYOUT = 1 << 6;
        const EFFECTIVE_LAYOUT = 1 << 7;
        const LEDS = 1 << 8;
    }
}

/// Which consumed-modifier accounting rule to use, spec §4.6. Both modes
/// report the modifiers a key type "used up" in picking a level, so
/// callers (typically accelerator matching) can mask them out of a raw
/// event's modifier state; they differ in how a type's `preserve` entries
/// are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumedMode {
    /// Subtracts the active entry's preserved bits from the type's mods.
    Xkb,
    /// Reports the type's full mod set regardless of preservation, matching
    /// GTK's historically looser definition of "consumed".
    Gtk,
}

#[derive(Debug, Clone, Copy)]
enum Filter {
    /// A `SetMods` is active while its key is held; its bits are cleared
    /// from `base_mods` on release.
    Mods { keycode: u32, bits: u32 },
    /// A `SetGroup` is active while its key is held; `delta` is subtracted
    /// from `base_group` on release.
    Group { keycode: u32, delta: i32 },
}

/// Runtime modifier/layout state for one keyboard, spec §3/§4.6. Cheap to
/// clone (an `Arc` bump on the keymap plus a handful of scalars).
#[derive(Clone)]
pub struct State {
    keymap: Keymap,
    base_mods: u32,
    latched_mods: u32,
    locked_mods: u32,
    base_group: i32,
    latched_group: i32,
    locked_group: i32,
    controls: ControlMask,
    filters: Vec<Filter>,
    active_leds: Vec<Atom>,
}

impl State {
    pub fn new(keymap: Keymap) -> State {
        State {
            keymap,
            base_mods: 0,
            latched_mods: 0,
            locked_mods: 0,
            base_group: 0,
            latched_group: 0,
            locked_group: 0,
            controls: ControlMask::empty(),
            filters: Vec::new(),
            active_leds: Vec::new(),
        }
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    fn effective_mods_raw(&self) -> u32 {
        self.base_mods | self.latched_mods | self.locked_mods
    }

    /// The modifier mask after virtual-modifier expansion, spec §4.4/§4.6.
    pub fn effective_mods(&self) -> u32 {
        self.keymap.mod_mask_get_effective(self.effective_mods_raw())
    }

    fn global_group_raw(&self) -> i32 {
        self.base_group + self.latched_group + self.locked_group
    }

    /// Resolves a (possibly negative or overflowing) group sum against a
    /// specific key's group count and out-of-range policy, spec §4.6
    /// step 1. Kept local to `State` rather than reusing `Key::resolve_group`
    /// since that helper only handles positive overflow, not negative
    /// latch/lock deltas.
    fn effective_group_for_key(key: &Key, raw: i32) -> u32 {
        let n = key.num_groups() as i32;
        if n <= 0 {
            return 0;
        }
        if (0..n).contains(&raw) {
            return raw as u32;
        }
        match key.out_of_range_group_action {
            GroupsWrapPolicy::Wrap => raw.rem_euclid(n) as u32,
            GroupsWrapPolicy::Saturate => {
                if raw < 0 {
                    0
                } else {
                    (n - 1) as u32
                }
            }
            GroupsWrapPolicy::Redirect => {
                if key.out_of_range_group_number < n as u32 {
                    key.out_of_range_group_number
                } else {
                    0
                }
            }
        }
    }

    /// The effective group index for `keycode`, clamped/wrapped per that
    /// key's own policy; `None` if the key is unknown.
    pub fn key_get_layout(&self, keycode: u32) -> Option<u32> {
        let key = self.keymap.key(keycode)?;
        Some(Self::effective_group_for_key(key, self.global_group_raw()))
    }

    /// The level index a key's active group resolves to right now.
    pub fn key_get_level(&self, keycode: u32) -> Option<u32> {
        let key = self.keymap.key(keycode)?;
        let group_idx = Self::effective_group_for_key(key, self.global_group_raw());
        let group = key.groups.get(group_idx as usize)?;
        let ty = &self.keymap.types()[group.type_index];
        Some(ty.level_for_mods(self.effective_mods()))
    }

    fn resolve_level<'k>(&self, key: &'k Key) -> Option<&'k Level> {
        let group_idx = Self::effective_group_for_key(key, self.global_group_raw());
        let group = key.groups.get(group_idx as usize)?;
        let ty = &self.keymap.types()[group.type_index];
        let level_idx = ty.level_for_mods(self.effective_mods());
        group.levels.get(level_idx as usize)
    }

    /// The keysyms a key produces at its current effective group/level,
    /// spec §4.6 steps 1-2. Empty if the key is unknown or out of range.
    pub fn key_get_syms(&self, keycode: u32) -> &[Keysym] {
        match self.keymap.key(keycode).and_then(|k| self.resolve_level(k)) {
            Some(level) => &level.syms,
            None => &[],
        }
    }

    pub fn key_get_one_sym(&self, keycode: u32) -> Option<Keysym> {
        self.key_get_syms(keycode).first().copied()
    }

    /// Modifiers `key`'s type consumed in picking its current level, spec
    /// §4.6. Used to mask a raw event's mods before accelerator matching.
    pub fn key_get_consumed_mods(&self, keycode: u32, mode: ConsumedMode) -> u32 {
        let Some(key) = self.keymap.key(keycode) else {
            return 0;
        };
        let group_idx = Self::effective_group_for_key(key, self.global_group_raw());
        let Some(group) = key.groups.get(group_idx as usize) else {
            return 0;
        };
        let ty = &self.keymap.types()[group.type_index];
        match mode {
            ConsumedMode::Xkb => ty.mods & !ty.preserved_mods(self.effective_mods()),
            ConsumedMode::Gtk => ty.mods,
        }
    }

    pub fn mod_is_consumed(&self, keycode: u32, mod_index: u32, mode: ConsumedMode) -> bool {
        self.key_get_consumed_mods(keycode, mode) & (1 << mod_index) != 0
    }

    pub fn mod_index_is_active(&self, mod_index: u32) -> bool {
        self.effective_mods() & (1 << mod_index) != 0
    }

    pub fn led_is_active(&self, name: Atom) -> bool {
        self.active_leds.contains(&name)
    }

    pub fn active_led_names(&self) -> &[Atom] {
        &self.active_leds
    }

    /// Directly assigns the depressed/latched/locked mod and layout
    /// components, spec §4.6: used to restore state shared over a wire
    /// protocol rather than derived from key events. Clears all pending
    /// key-release filters, since there is no longer a key context to
    /// reverse them against.
    pub fn update_mask(
        &mut self,
        depressed_mods: u32,
        latched_mods: u32,
        locked_mods: u32,
        depressed_layout: u32,
        latched_layout: u32,
        locked_layout: u32,
    ) -> StateComponent {
        let before = self.snapshot();
        self.base_mods = depressed_mods;
        self.latched_mods = latched_mods;
        self.locked_mods = locked_mods;
        self.base_group = depressed_layout as i32;
        self.latched_group = latched_layout as i32;
        self.locked_group = locked_layout as i32;
        self.filters.clear();
        self.recompute_leds();
        self.diff(before)
    }

    fn snapshot(&self) -> (u32, u32, u32, i32, i32, i32, Vec<Atom>) {
        (
            self.base_mods,
            self.latched_mods,
            self.locked_mods,
            self.base_group,
            self.latched_group,
            self.locked_group,
            self.active_leds.clone(),
        )
    }

    fn diff(&self, before: (u32, u32, u32, i32, i32, i32, Vec<Atom>)) -> StateComponent {
        let mut changed = StateComponent::empty();
        let (b_mods, l_mods, lk_mods, b_grp, l_grp, lk_grp, leds) = before;
        if b_mods != self.base_mods {
            changed |= StateComponent::DEPRESSED_MODS;
        }
        if l_mods != self.latched_mods {
            changed |= StateComponent::LATCHED_MODS;
        }
        if lk_mods != self.locked_mods {
            changed |= StateComponent::LOCKED_MODS;
        }
        if b_mods != self.base_mods || l_mods != self.latched_mods || lk_mods != self.locked_mods {
            changed |= StateComponent::EFFECTIVE_MODS;
        }
        if b_grp != self.base_group {
            changed |= StateComponent::DEPRESSED_LAYOUT;
        }
        if l_grp != self.latched_group {
            changed |= StateComponent::LATCHED_LAYOUT;
        }
        if lk_grp != self.locked_group {
            changed |= StateComponent::LOCKED_LAYOUT;
        }
        if b_grp != self.base_group || l_grp != self.latched_group || lk_grp != self.locked_group {
            changed |= StateComponent::EFFECTIVE_LAYOUT;
        }
        if leds != self.active_leds {
            changed |= StateComponent::LEDS;
        }
        changed
    }

    /// Feeds one key press or release through the action dispatch rules of
    /// spec §4.6, returning which components changed.
    pub fn update_key(&mut self, keycode: u32, direction: KeyDirection) -> StateComponent {
        let before = self.snapshot();
        match direction {
            KeyDirection::Down => self.key_down(keycode),
            KeyDirection::Up => self.key_up(keycode),
        }
        self.recompute_leds();
        self.diff(before)
    }

    fn key_down(&mut self, keycode: u32) {
        let Some(key) = self.keymap.key(keycode).cloned() else {
            return;
        };
        let Some(level) = self.resolve_level(&key).cloned() else {
            return;
        };

        let pre_latched_mods = self.latched_mods;
        let pre_latched_group = self.latched_group;
        let breaks_latch = level.actions.is_empty() || level.actions.iter().any(|a| a.breaks_latch());

        for action in &level.actions {
            self.dispatch_action(keycode, action);
        }

        if breaks_latch {
            self.latched_mods &= !pre_latched_mods;
            if self.latched_group != 0 && pre_latched_group != 0 {
                self.latched_group = 0;
            }
        }
    }

    fn dispatch_action(&mut self, keycode: u32, action: &crate::actions::Action) {
        use crate::actions::Action;
        use crate::actions::{GroupActionFlags, ModActionFlags};
        match action {
            Action::SetMods(a) => {
                self.base_mods |= a.mods;
                self.filters.push(Filter::Mods { keycode, bits: a.mods });
                if a.flags.contains(ModActionFlags::CLEAR_LOCK) {
                    self.locked_mods &= !a.mods;
                }
            }
            Action::LatchMods(a) => {
                let already_latched = a.mods != 0 && (self.latched_mods & a.mods) == a.mods;
                if a.flags.contains(ModActionFlags::LATCH_TO_LOCK) && already_latched {
                    self.locked_mods |= a.mods;
                    self.latched_mods &= !a.mods;
                } else {
                    self.latched_mods |= a.mods;
                }
                if a.flags.contains(ModActionFlags::CLEAR_LOCK) {
                    self.locked_mods &= !a.mods;
                }
            }
            Action::LockMods(a) => {
                self.locked_mods ^= a.mods;
            }
            Action::SetGroup(a) => {
                let delta = self.apply_group_delta(a.group, a.flags.contains(GroupActionFlags::ABSOLUTE));
                self.base_group += delta;
                self.filters.push(Filter::Group { keycode, delta });
                if a.flags.contains(GroupActionFlags::CLEAR_LOCK) {
                    self.locked_group = 0;
                }
            }
            Action::LatchGroup(a) => {
                let delta = self.apply_group_delta(a.group, a.flags.contains(GroupActionFlags::ABSOLUTE));
                let already_latched = self.latched_group != 0 && self.latched_group == delta;
                if a.flags.contains(GroupActionFlags::LATCH_TO_LOCK) && already_latched {
                    self.locked_group += delta;
                    self.latched_group = 0;
                } else {
                    self.latched_group += delta;
                }
                if a.flags.contains(GroupActionFlags::CLEAR_LOCK) {
                    self.locked_group = 0;
                }
            }
            Action::LockGroup(a) => {
                if a.flags.contains(GroupActionFlags::ABSOLUTE) {
                    self.locked_group = a.group - 1;
                } else {
                    self.locked_group += a.group;
                }
            }
            // Pointer/screen/control/private actions have no effect on
            // mods or group and are otherwise out of this crate's runtime
            // scope (no pointer device, no screen list); dispatching them
            // is a no-op beyond the latch-breaking already handled by the
            // caller.
            Action::Terminate
            | Action::SwitchScreen(_)
            | Action::PtrMove(_)
            | Action::PtrButton(_)
            | Action::PtrLock(_)
            | Action::PtrDefault
            | Action::CtrlSet(_)
            | Action::CtrlLock(_)
            | Action::Private(_)
            | Action::Void => {}
        }
    }

    /// Turns a compiled action's `group` field into a delta to add to
    /// `base_group`/`latched_group`. Absolute group numbers are written
    /// 1-based in source (`SetGroup(group=2)` means "the second group"),
    /// so they're converted to the internal 0-based index here rather
    /// than at compile time.
    fn apply_group_delta(&self, group: i32, absolute: bool) -> i32 {
        if absolute {
            (group - 1) - self.base_group
        } else {
            group
        }
    }

    fn key_up(&mut self, keycode: u32) {
        let mut remaining = Vec::with_capacity(self.filters.len());
        for filter in self.filters.drain(..) {
            match filter {
                Filter::Mods { keycode: kc, bits } if kc == keycode => {
                    self.base_mods &= !bits;
                }
                Filter::Group { keycode: kc, delta } if kc == keycode => {
                    self.base_group -= delta;
                }
                other => remaining.push(other),
            }
        }
        self.filters = remaining;
    }

    fn mods_for_which(&self, which: LedWhich) -> u32 {
        let mut m = 0;
        if which.contains(LedWhich::DEPRESSED) {
            m |= self.base_mods;
        }
        if which.contains(LedWhich::LATCHED) {
            m |= self.latched_mods;
        }
        if which.contains(LedWhich::LOCKED) {
            m |= self.locked_mods;
        }
        if which.contains(LedWhich::EFFECTIVE) {
            m |= self.effective_mods();
        }
        m
    }

    fn group_bit_for_which(&self, which: LedWhich) -> u32 {
        let n = self.keymap.num_groups().max(1) as i32;
        let mut bits = 0u32;
        let mut pick = |raw: i32| {
            let idx = raw.rem_euclid(n) as u32;
            bits |= 1 << idx;
        };
        if which.contains(LedWhich::DEPRESSED) {
            pick(self.base_group);
        }
        if which.contains(LedWhich::LATCHED) {
            pick(self.latched_group);
        }
        if which.contains(LedWhich::LOCKED) {
            pick(self.locked_group);
        }
        if which.contains(LedWhich::EFFECTIVE) {
            pick(self.global_group_raw());
        }
        bits
    }

    fn led_active(&self, led: &Led) -> bool {
        if led.mods != 0 && led.which_mods != LedWhich::empty() {
            let relevant = self.mods_for_which(led.which_mods);
            if relevant & led.mods == led.mods {
                return true;
            }
        }
        if led.groups != 0 && led.which_groups != LedWhich::empty() {
            let relevant = self.group_bit_for_which(led.which_groups);
            if relevant & led.groups == led.groups {
                return true;
            }
        }
        if !(led.ctrls & self.controls).is_empty() {
            return true;
        }
        false
    }

    fn recompute_leds(&mut self) {
        self.active_leds = self
            .keymap
            .leds()
            .iter()
            .filter(|led| self.led_active(led))
            .map(|led| led.name)
            .collect();
    }

    pub fn controls(&self) -> ControlMask {
        self.controls
    }

    pub fn set_controls(&mut self, ctrls: ControlMask) -> StateComponent {
        let before = self.snapshot();
        self.controls = ctrls;
        self.recompute_leds();
        self.diff(before)
    }

    pub fn serialize_mods(&self) -> (u32, u32, u32) {
        (self.base_mods, self.latched_mods, self.locked_mods)
    }

    pub fn serialize_layout(&self) -> (u32, u32, u32) {
        (
            self.base_group.max(0) as u32,
            self.latched_group.max(0) as u32,
            self.locked_group.max(0) as u32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::context::{Context, ContextFlags};
    use crate::keymap::KeymapFormat;

    fn build(src: &str) -> (Context, Keymap) {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let file = crate::parser::parse_str(src).unwrap();
        let keymap = compile(&ctx, &file, KeymapFormat::TextV1).unwrap();
        (ctx, keymap)
    }

    const BASIC_SRC: &str = r#"xkb_keymap {
        xkb_keycodes "t" {
            <AC01> = 38;
            <LFSH> = 50;
        };
        xkb_types "t" {
            type "TWO_LEVEL" {
                modifiers = Shift;
                map[Shift] = 1;
            };
        };
        xkb_compatibility "t" {
            interpret Shift_L {
                action = SetMods(modifiers=Shift);
            };
        };
        xkb_symbols "t" {
            key <AC01> { symbols[Group1] = [ a, A ] };
            key <LFSH> { symbols[Group1] = [ Shift_L ] };
        };
    };"#;

    #[test]
    fn holding_shift_selects_the_upper_level() {
        let (_ctx, keymap) = build(BASIC_SRC);
        let mut state = State::new(keymap);

        assert_eq!(state.key_get_one_sym(38).unwrap().name(), "a");

        state.update_key(50, KeyDirection::Down);
        assert_eq!(state.key_get_one_sym(38).unwrap().name(), "A");

        state.update_key(38, KeyDirection::Down);
        state.update_key(38, KeyDirection::Up);

        state.update_key(50, KeyDirection::Up);
        assert_eq!(state.key_get_one_sym(38).unwrap().name(), "a");
    }

    const GROUP_LATCH_SRC: &str = r#"xkb_keymap {
        xkb_keycodes "t" {
            <AC01> = 38;
            <MENU> = 135;
        };
        xkb_types "t" {
            type "ONE_LEVEL" {
                modifiers = None;
                map[None] = 1;
            };
        };
        xkb_compatibility "t" {
            interpret Menu {
                action = LatchGroup(group=2);
            };
        };
        xkb_symbols "t" {
            key <AC01> {
                symbols[Group1] = [ a ],
                symbols[Group2] = [ b ]
            };
            key <MENU> { symbols[Group1] = [ Menu ] };
        };
    };"#;

    #[test]
    fn latched_group_applies_to_the_next_key_then_clears() {
        let (_ctx, keymap) = build(GROUP_LATCH_SRC);
        let mut state = State::new(keymap);

        assert_eq!(state.key_get_one_sym(38).unwrap().name(), "a");

        state.update_key(135, KeyDirection::Down);
        state.update_key(135, KeyDirection::Up);

        assert_eq!(state.key_get_one_sym(38).unwrap().name(), "b");

        state.update_key(38, KeyDirection::Down);
        state.update_key(38, KeyDirection::Up);

        assert_eq!(state.key_get_one_sym(38).unwrap().name(), "a");
    }

    const CAPS_LOCK_SRC: &str = r#"xkb_keymap {
        xkb_keycodes "t" {
            <AC01> = 38;
            <CAPS> = 58;
        };
        xkb_types "t" {
            type "TWO_LEVEL" {
                modifiers = Lock;
                map[Lock] = 1;
            };
        };
        xkb_compatibility "t" {
            interpret Caps_Lock {
                action = LockMods(modifiers=Lock);
            };
        };
        xkb_symbols "t" {
            key <AC01> { symbols[Group1] = [ a, A ] };
            key <CAPS> { symbols[Group1] = [ Caps_Lock ] };
        };
    };"#;

    #[test]
    fn caps_lock_toggles_and_persists_across_key_release() {
        let (_ctx, keymap) = build(CAPS_LOCK_SRC);
        let mut state = State::new(keymap);

        assert_eq!(state.key_get_one_sym(38).unwrap().name(), "a");

        state.update_key(58, KeyDirection::Down);
        state.update_key(58, KeyDirection::Up);
        assert_eq!(state.key_get_one_sym(38).unwrap().name(), "A");

        state.update_key(38, KeyDirection::Down);
        state.update_key(38, KeyDirection::Up);
        assert_eq!(state.key_get_one_sym(38).unwrap().name(), "A");

        state.update_key(58, KeyDirection::Down);
        state.update_key(58, KeyDirection::Up);
        assert_eq!(state.key_get_one_sym(38).unwrap().name(), "a");
    }

    #[test]
    fn update_mask_overrides_state_directly_and_clears_filters() {
        let (_ctx, keymap) = build(BASIC_SRC);
        let mut state = State::new(keymap);
        state.update_key(50, KeyDirection::Down);
        let changed = state.update_mask(0, 0, 1, 0, 0, 0);
        assert!(changed.contains(StateComponent::LOCKED_MODS));
        assert_eq!(state.serialize_mods(), (0, 0, 1));
        // the stale SetMods filter from <LFSH> must not fire on a later
        // unrelated key-up for the same keycode.
        state.update_key(50, KeyDirection::Up);
        assert_eq!(state.serialize_mods(), (0, 0, 1));
    }
}
