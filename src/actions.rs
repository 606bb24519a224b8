//! Keyboard actions: the union-tagged action type from spec §3/§4.6,
//! re-expressed as a Rust sum type per spec §9 ("union-tagged actions
//! become a sum type whose variants carry only the fields they need").

use bitflags::bitflags;

bitflags! {
    /// Flags on `SetMods`/`LatchMods`/`LockMods`, spec §4.6.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModActionFlags: u8 {
        const CLEAR_LOCK = 1 << 0;
        const LATCH_TO_LOCK = 1 << 1;
        const LOOKUP_MODMAP = 1 << 2;
        const LOCK_NO_LOCK = 1 << 3;
        const LOCK_NO_UNLOCK = 1 << 4;
    }
}

bitflags! {
    /// Flags on `SetGroup`/`LatchGroup`/`LockGroup`, spec §4.6.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GroupActionFlags: u8 {
        const ABSOLUTE = 1 << 0;
        const CLEAR_LOCK = 1 << 1;
        const LATCH_TO_LOCK = 1 << 2;
    }
}

bitflags! {
    /// Keyboard-control flags carried on `State`, spec §4.6.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ControlMask: u32 {
        const REPEAT = 1 << 0;
        const SLOW = 1 << 1;
        const STICKY = 1 << 2;
        const MOUSEKEYS = 1 << 3;
        const MOUSEKEYS_ACCEL = 1 << 4;
        const BELL = 1 << 5;
        const IGNORE_GROUP_LOCK = 1 << 6;
    }
}

/// Out-of-range group access policy, spec §3/§4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupsWrapPolicy {
    #[default]
    Wrap,
    Saturate,
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModAction {
    pub mods: u32,
    pub flags: ModActionFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAction {
    pub group: i32,
    pub flags: GroupActionFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PtrMoveAction {
    pub dx: i32,
    pub dy: i32,
    pub accel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PtrButtonAction {
    pub button: u8,
    pub count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtrlAction {
    pub ctrls: ControlMask,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrivateAction {
    pub ty: u8,
    pub data: Vec<u8>,
}

/// A single keyboard action attached to a key press, spec §3/§4.6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetMods(ModAction),
    LatchMods(ModAction),
    LockMods(ModAction),
    SetGroup(GroupAction),
    LatchGroup(GroupAction),
    LockGroup(GroupAction),
    Terminate,
    SwitchScreen(i32),
    PtrMove(PtrMoveAction),
    PtrButton(PtrButtonAction),
    PtrLock(PtrButtonAction),
    PtrDefault,
    CtrlSet(CtrlAction),
    CtrlLock(CtrlAction),
    Private(PrivateAction),
    /// The explicit latch-breaker, spec §4.6/§9.
    Void,
}

impl Action {
    /// Whether dispatching this action breaks a pending latch, per the
    /// fixed contract in spec §4.6/§9: non-modifier, non-group, non-void
    /// actions break a latch; `Void` is the canonical *explicit* break.
    pub fn breaks_latch(&self) -> bool {
        !matches!(
            self,
            Action::SetMods(_)
                | Action::LatchMods(_)
                | Action::LockMods(_)
                | Action::SetGroup(_)
                | Action::LatchGroup(_)
                | Action::LockGroup(_)
        )
    }

    pub fn is_mod_action(&self) -> bool {
        matches!(
            self,
            Action::SetMods(_) | Action::LatchMods(_) | Action::LockMods(_)
        )
    }

    pub fn is_group_action(&self) -> bool {
        matches!(
            self,
            Action::SetGroup(_) | Action::LatchGroup(_) | Action::LockGroup(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mod_and_group_actions_do_not_break_latch() {
        let set_mods = Action::SetMods(ModAction {
            mods: 1,
            flags: ModActionFlags::empty(),
        });
        assert!(!set_mods.breaks_latch());
        let set_group = Action::SetGroup(GroupAction {
            group: 1,
            flags: GroupActionFlags::ABSOLUTE,
        });
        assert!(!set_group.breaks_latch());
    }

    #[test]
    fn void_and_other_actions_break_latch() {
        assert!(Action::Void.breaks_latch());
        assert!(Action::Terminate.breaks_latch());
        assert!(Action::PtrDefault.breaks_latch());
    }
}
