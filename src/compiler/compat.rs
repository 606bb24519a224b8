//! Compat pass, spec §4.4: builds the interpretation table keyed by
//! `(sym, match_op, mods)` and the LED specifications. `modifier_map`
//! statements feed key modmaps directly.

use crate::actions::{
    Action, ControlMask, CtrlAction, GroupAction, GroupActionFlags, ModAction, ModActionFlags,
};
use crate::atom::Atom;
use crate::diag::MessageId;
use crate::error::{Error, Result};
use crate::keymap::{Interpretation, Led, LedWhich, MatchOp};
use crate::parser::ast::{
    ActionArgValue, ActionDef, InterpretDef, LedDef, MaskExpr, MaskTerm, MatchOpKind, Section,
    Statement,
};

use super::Builder;

pub(crate) fn compile_compat(builder: &mut Builder, section: &Section) -> Result<()> {
    for stmt in &section.statements {
        match stmt {
            Statement::Interpret(def) => compile_interpret(builder, def)?,
            Statement::Led(def) => compile_led(builder, def)?,
            Statement::ModMap { mod_name, keys } => {
                let idx = *builder
                    .mod_name_index
                    .get(mod_name)
                    .ok_or_else(|| Error::semantic(format!("modifier_map of unknown modifier {mod_name}")))?;
                let bit = 1u32 << idx;
                for key_name in keys {
                    let resolved = builder.resolve_key_name(key_name);
                    builder.key_builder(&resolved).modmap |= bit;
                }
            }
            Statement::VarSet { .. } => {}
            other => {
                return Err(Error::semantic(format!(
                    "unexpected statement in xkb_compatibility: {other:?}"
                )))
            }
        }
    }
    Ok(())
}

fn match_op(kind: &MatchOpKind) -> MatchOp {
    match kind {
        MatchOpKind::None => MatchOp::None,
        MatchOpKind::AnyOrNone => MatchOp::AnyOrNone,
        MatchOpKind::Any => MatchOp::Any,
        MatchOpKind::All => MatchOp::All,
        MatchOpKind::Exactly => MatchOp::Exactly,
    }
}

fn compile_interpret(builder: &mut Builder, def: &InterpretDef) -> Result<()> {
    let sym = def.sym.as_ref().map(|s| crate::keysym::Keysym::from_name(s));
    let mods = builder.resolve_mask(&def.mods);
    let virtual_mod = def
        .virtual_mod
        .as_ref()
        .map(|name| builder.declare_virtual_mod(name, 0));
    let actions = def
        .actions
        .iter()
        .map(|a| compile_action(builder, a))
        .collect::<Result<Vec<_>>>()?;

    builder.interpretations.push(Interpretation {
        sym,
        match_op: match_op(&def.match_op),
        mods,
        virtual_mod,
        level_one_only: def.level_one_only,
        repeat: def.repeat.unwrap_or(false),
        actions,
    });
    Ok(())
}

fn mask_arg(builder: &mut Builder, args: &[crate::parser::ast::ActionArg], name: &str) -> u32 {
    args.iter()
        .find(|a| a.name.eq_ignore_ascii_case(name))
        .and_then(|a| match &a.value {
            ActionArgValue::Mask(expr) => Some(builder.resolve_mask(expr)),
            ActionArgValue::Number(n) => Some(*n as u32),
            _ => None,
        })
        .unwrap_or(0)
}

fn bool_arg(args: &[crate::parser::ast::ActionArg], name: &str, default: bool) -> bool {
    args.iter()
        .find(|a| a.name.eq_ignore_ascii_case(name))
        .map(|a| match &a.value {
            ActionArgValue::Bool(b) => *b,
            ActionArgValue::Ident(s) => s.eq_ignore_ascii_case("true"),
            _ => default,
        })
        .unwrap_or(default)
}

fn int_arg(args: &[crate::parser::ast::ActionArg], name: &str, default: i64) -> i64 {
    args.iter()
        .find(|a| a.name.eq_ignore_ascii_case(name))
        .and_then(|a| match &a.value {
            ActionArgValue::Number(n) => Some(*n),
            _ => None,
        })
        .unwrap_or(default)
}

pub(crate) fn compile_action(builder: &mut Builder, def: &ActionDef) -> Result<Action> {
    let name = def.name.to_ascii_lowercase();
    let action = match name.as_str() {
        "setmods" => Action::SetMods(mod_action(builder, def)),
        "latchmods" => Action::LatchMods(mod_action(builder, def)),
        "lockmods" => Action::LockMods(mod_action(builder, def)),
        "setgroup" => Action::SetGroup(group_action(def, GroupActionFlags::ABSOLUTE)),
        "latchgroup" => Action::LatchGroup(group_action(def, GroupActionFlags::ABSOLUTE)),
        "lockgroup" => Action::LockGroup(group_action(def, GroupActionFlags::ABSOLUTE)),
        "terminateserver" => Action::Terminate,
        "switchscreen" => Action::SwitchScreen(int_arg(&def.args, "screen", 0) as i32),
        "setcontrols" => Action::CtrlSet(CtrlAction {
            ctrls: controls_from_args(builder, &def.args),
        }),
        "lockcontrols" => Action::CtrlLock(CtrlAction {
            ctrls: controls_from_args(builder, &def.args),
        }),
        "nosuch" | "none" | "voidaction" => Action::Void,
        other => {
            builder.warn(
                MessageId::UnknownActionType,
                format!("unknown action type {other}, treating as no-op"),
            );
            Action::Void
        }
    };
    Ok(action)
}

fn mod_action(builder: &mut Builder, def: &ActionDef) -> ModAction {
    let mut flags = ModActionFlags::empty();
    if bool_arg(&def.args, "clearLocks", false) {
        flags |= ModActionFlags::CLEAR_LOCK;
    }
    if bool_arg(&def.args, "latchToLock", false) {
        flags |= ModActionFlags::LATCH_TO_LOCK;
    }
    ModAction {
        mods: mask_arg(builder, &def.args, "modifiers"),
        flags,
    }
}

fn group_action(def: &ActionDef, default_flags: GroupActionFlags) -> GroupAction {
    let raw = int_arg(&def.args, "group", 1);
    let mut flags = default_flags;
    if raw >= 0 {
        flags |= GroupActionFlags::ABSOLUTE;
    } else {
        flags.remove(GroupActionFlags::ABSOLUTE);
    }
    if bool_arg(&def.args, "clearLocks", false) {
        flags |= GroupActionFlags::CLEAR_LOCK;
    }
    GroupAction {
        group: raw as i32,
        flags,
    }
}

fn controls_from_args(builder: &mut Builder, args: &[crate::parser::ast::ActionArg]) -> ControlMask {
    let mask = mask_arg(builder, args, "controls");
    ControlMask::from_bits_truncate(mask)
}

/// Translates a `whichModState`/`whichGroupState` mask expression into the
/// `LedWhich` bits it names (`base`/`latched`/`locked`/`effective`/`any`),
/// spec §4.4. Omitted entirely, a LED's state source defaults to
/// `Effective`, matching the common `indicator "X" { modifiers = ...; }`
/// idiom that never mentions `whichModState` at all.
fn which_from_mask(expr: Option<&MaskExpr>) -> LedWhich {
    let Some(expr) = expr else {
        return LedWhich::EFFECTIVE;
    };
    let mut which = LedWhich::empty();
    for term in expr {
        match term {
            MaskTerm::Name(name) => {
                let lower = name.to_ascii_lowercase();
                match lower.as_str() {
                    "base" => which |= LedWhich::DEPRESSED,
                    "latched" => which |= LedWhich::LATCHED,
                    "locked" => which |= LedWhich::LOCKED,
                    "effective" => which |= LedWhich::EFFECTIVE,
                    "any" => which |= LedWhich::all(),
                    "none" => {}
                    _ => {}
                }
            }
            MaskTerm::Number(n) => which |= LedWhich::from_bits_truncate(*n as u8),
        }
    }
    which
}

fn compile_led(builder: &mut Builder, def: &LedDef) -> Result<()> {
    let which_groups = which_from_mask(def.which_groups.as_ref());
    let groups = def
        .groups
        .as_ref()
        .map(|e| builder.resolve_mask(e))
        .unwrap_or(0);
    let which_mods = which_from_mask(def.which_mods.as_ref());
    let mods = def
        .mods
        .as_ref()
        .map(|e| builder.resolve_mask(e))
        .unwrap_or(0);
    let ctrls = def
        .controls
        .as_ref()
        .map(|e| ControlMask::from_bits_truncate(builder.resolve_mask(e)))
        .unwrap_or(ControlMask::empty());

    let name: Atom = builder.intern(&def.name);
    if let Some(existing) = builder.leds.iter_mut().find(|l| l.name == name) {
        existing.which_groups = which_groups;
        existing.groups = groups;
        existing.which_mods = which_mods;
        existing.mods = mods;
        existing.ctrls = ctrls;
    } else {
        builder.leds.push(Led {
            name,
            which_groups,
            groups,
            which_mods,
            mods,
            ctrls,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, ContextFlags};
    use crate::keymap::KeymapFormat;

    #[test]
    fn compiles_interpret_with_set_mods_action() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        let file = crate::parser::parse_str(
            r#"xkb_compatibility "t" {
                interpret Shift_L {
                    action = SetMods(modifiers=Shift);
                };
            };"#,
        )
        .unwrap();
        compile_compat(&mut builder, &file.sections[0]).unwrap();
        assert_eq!(builder.interpretations.len(), 1);
        let interp = &builder.interpretations[0];
        assert_eq!(interp.sym.unwrap().name(), "Shift_L");
        assert!(matches!(interp.actions[0], Action::SetMods(_)));
    }

    #[test]
    fn compiles_interpret_with_match_operator_and_level_one_only() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        let file = crate::parser::parse_str(
            r#"xkb_compatibility "t" {
                interpret Num_Lock+AnyOf(all) {
                    action = LockMods(modifiers=Mod2);
                };
            };"#,
        )
        .unwrap();
        compile_compat(&mut builder, &file.sections[0]).unwrap();
        let interp = &builder.interpretations[0];
        assert_eq!(interp.match_op, MatchOp::Any);
    }

    #[test]
    fn led_which_mod_state_is_parsed_not_defaulted_to_effective() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        let file = crate::parser::parse_str(
            r#"xkb_compatibility "t" {
                indicator "Caps Lock" {
                    whichModState = Locked;
                    modifiers = Lock;
                };
            };"#,
        )
        .unwrap();
        compile_compat(&mut builder, &file.sections[0]).unwrap();
        let led = &builder.leds[0];
        assert_eq!(led.which_mods, LedWhich::LOCKED);
        assert_eq!(led.mods, 1 << builder.mod_name_index["Lock"]);
    }

    #[test]
    fn led_without_which_mod_state_defaults_to_effective() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        let file = crate::parser::parse_str(
            r#"xkb_compatibility "t" {
                indicator "Caps Lock" {
                    modifiers = Lock;
                };
            };"#,
        )
        .unwrap();
        compile_compat(&mut builder, &file.sections[0]).unwrap();
        assert_eq!(builder.leds[0].which_mods, LedWhich::EFFECTIVE);
    }

    #[test]
    fn rejects_modifier_map_of_unknown_modifier() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        let file = crate::parser::parse_str(
            r#"xkb_compatibility "t" { modifier_map Bogus { <LFSH> }; };"#,
        )
        .unwrap();
        let err = compile_compat(&mut builder, &file.sections[0]).unwrap_err();
        assert!(matches!(err, Error::Semantic(_)));
    }
}
