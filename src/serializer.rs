//! Canonical text emission, spec §4.5: turns a compiled `Keymap` back into
//! source text that `parser::parse_str` + `compiler::compile` can consume.
//! Only groups/types marked `explicit_*` by the compiler are re-emitted
//! explicitly; everything else is left for the symbols pass to re-infer on
//! the next compile, which is what makes `parse(serialize(k))` observationally
//! equal to `k` (spec §8) without requiring byte-for-byte text equality.

use std::fmt::Write as _;

use crate::actions::Action;
use crate::context::Context;
use crate::keymap::{Key, Keymap, KeyType, LedWhich, MatchOp};

fn atom_text(ctx: &Context, atom: crate::atom::Atom) -> String {
    ctx.atom_text(atom).unwrap_or_default()
}

/// Renders a modifier mask as `+`-joined names of the bits the keymap
/// knows, with any remaining unknown bits appended as raw hex, spec §4.5.
fn mod_mask_to_string(ctx: &Context, keymap: &Keymap, mask: u32) -> String {
    if mask == 0 {
        return "None".to_owned();
    }
    let mut parts = Vec::new();
    let mut remaining = mask;
    for (i, m) in keymap.mods().iter().enumerate() {
        let bit = 1u32 << i;
        if mask & bit != 0 {
            parts.push(atom_text(ctx, m.name));
            remaining &= !bit;
        }
    }
    if remaining != 0 {
        parts.push(format!("0x{remaining:x}"));
    }
    parts.join("+")
}

fn match_op_word(op: MatchOp) -> &'static str {
    match op {
        MatchOp::None => "NoneOf",
        MatchOp::AnyOrNone => "AnyOfOrNone",
        MatchOp::Any => "AnyOf",
        MatchOp::All => "AllOf",
        MatchOp::Exactly => "Exactly",
    }
}

fn serialize_action(ctx: &Context, keymap: &Keymap, action: &Action) -> String {
    match action {
        Action::SetMods(a) => format!(
            "SetMods(modifiers={}{})",
            mod_mask_to_string(ctx, keymap, a.mods),
            clear_locks_suffix(a.flags.contains(crate::actions::ModActionFlags::CLEAR_LOCK))
        ),
        Action::LatchMods(a) => format!(
            "LatchMods(modifiers={}{})",
            mod_mask_to_string(ctx, keymap, a.mods),
            latch_to_lock_suffix(a.flags.contains(crate::actions::ModActionFlags::LATCH_TO_LOCK))
        ),
        Action::LockMods(a) => format!(
            "LockMods(modifiers={})",
            mod_mask_to_string(ctx, keymap, a.mods)
        ),
        Action::SetGroup(a) => format!("SetGroup(group={})", a.group),
        Action::LatchGroup(a) => format!("LatchGroup(group={})", a.group),
        Action::LockGroup(a) => format!("LockGroup(group={})", a.group),
        Action::Terminate => "Terminate()".to_owned(),
        Action::SwitchScreen(n) => format!("SwitchScreen(screen={n})"),
        Action::PtrMove(a) => format!("MovePtr(x={},y={})", a.dx, a.dy),
        Action::PtrButton(a) => format!("PtrBtn(button={})", a.button),
        Action::PtrLock(a) => format!("LockPtrBtn(button={})", a.button),
        Action::PtrDefault => "SetPtrDflt()".to_owned(),
        Action::CtrlSet(a) => format!("SetControls(controls={})", a.ctrls.bits()),
        Action::CtrlLock(a) => format!("LockControls(controls={})", a.ctrls.bits()),
        Action::Private(_) => "Private()".to_owned(),
        Action::Void => "NoAction()".to_owned(),
    }
}

fn clear_locks_suffix(set: bool) -> &'static str {
    if set {
        ",clearLocks=True"
    } else {
        ""
    }
}

fn latch_to_lock_suffix(set: bool) -> &'static str {
    if set {
        ",latchToLock=True"
    } else {
        ""
    }
}

fn serialize_keycodes(ctx: &Context, keymap: &Keymap) -> String {
    let mut out = String::new();
    writeln!(out, "    xkb_keycodes \"generated\" {{").unwrap();
    writeln!(out, "        minimum = {};", keymap.min_key_code()).unwrap();
    writeln!(out, "        maximum = {};", keymap.max_key_code()).unwrap();
    let mut keys: Vec<&Key> = keymap.keys().iter().collect();
    keys.sort_by_key(|k| k.keycode);
    for key in keys {
        if key.name.is_none() {
            continue;
        }
        writeln!(out, "        <{}> = {};", atom_text(ctx, key.name), key.keycode).unwrap();
    }
    writeln!(out, "    }};").unwrap();
    out
}

fn serialize_type(ctx: &Context, keymap: &Keymap, ty: &KeyType) -> String {
    let mut out = String::new();
    writeln!(out, "        type \"{}\" {{", atom_text(ctx, ty.name)).unwrap();
    writeln!(
        out,
        "            modifiers = {};",
        mod_mask_to_string(ctx, keymap, ty.mods)
    )
    .unwrap();
    for entry in &ty.entries {
        writeln!(
            out,
            "            map[{}] = {};",
            mod_mask_to_string(ctx, keymap, entry.mods),
            entry.level + 1
        )
        .unwrap();
        if entry.preserve != 0 {
            writeln!(
                out,
                "            preserve[{}] = {};",
                mod_mask_to_string(ctx, keymap, entry.mods),
                mod_mask_to_string(ctx, keymap, entry.preserve)
            )
            .unwrap();
        }
    }
    for (i, name) in ty.level_names.iter().enumerate() {
        if name.is_none() {
            continue;
        }
        writeln!(
            out,
            "            level_name[{}] = \"{}\";",
            i + 1,
            atom_text(ctx, *name)
        )
        .unwrap();
    }
    writeln!(out, "        }};").unwrap();
    out
}

fn serialize_types(ctx: &Context, keymap: &Keymap) -> String {
    let mut out = String::new();
    writeln!(out, "    xkb_types \"generated\" {{").unwrap();
    for ty in keymap.types() {
        out.push_str(&serialize_type(ctx, keymap, ty));
    }
    writeln!(out, "    }};").unwrap();
    out
}

fn serialize_compat(ctx: &Context, keymap: &Keymap) -> String {
    let mut out = String::new();
    writeln!(out, "    xkb_compatibility \"generated\" {{").unwrap();
    for interp in keymap.interpretations() {
        let sym_name = interp.sym.map(|s| s.name()).unwrap_or_else(|| "Any".to_owned());
        let suffix = if interp.mods != 0 {
            format!(
                "+{}({})",
                match_op_word(interp.match_op),
                mod_mask_to_string(ctx, keymap, interp.mods)
            )
        } else {
            String::new()
        };
        writeln!(out, "        interpret {sym_name}{suffix} {{").unwrap();
        for action in &interp.actions {
            writeln!(out, "            action = {};", serialize_action(ctx, keymap, action)).unwrap();
        }
        if interp.repeat {
            writeln!(out, "            repeat = True;").unwrap();
        }
        if let Some(vm_index) = interp.virtual_mod {
            if let Some(m) = keymap.mods().get(vm_index) {
                writeln!(out, "            virtualModifier = {};", atom_text(ctx, m.name)).unwrap();
            }
        }
        if interp.level_one_only {
            writeln!(out, "            useModMapMods = level1;").unwrap();
        }
        writeln!(out, "        }};").unwrap();
    }
    for led in keymap.leds() {
        out.push_str(&serialize_led(ctx, keymap, led));
    }
    out.push_str(&serialize_modifier_maps(ctx, keymap));
    writeln!(out, "    }};").unwrap();
    out
}

fn serialize_led(ctx: &Context, keymap: &Keymap, led: &crate::keymap::Led) -> String {
    let mut out = String::new();
    writeln!(out, "        indicator \"{}\" {{", atom_text(ctx, led.name)).unwrap();
    if led.which_groups != LedWhich::empty() || led.groups != 0 {
        writeln!(out, "            whichGroupState = {};", led.which_groups.bits()).unwrap();
        writeln!(out, "            groups = {};", mod_mask_to_string(ctx, keymap, led.groups)).unwrap();
    }
    if led.which_mods != LedWhich::empty() || led.mods != 0 {
        writeln!(out, "            whichModState = {};", led.which_mods.bits()).unwrap();
        writeln!(out, "            modifiers = {};", mod_mask_to_string(ctx, keymap, led.mods)).unwrap();
    }
    if !led.ctrls.is_empty() {
        writeln!(out, "            controls = {};", led.ctrls.bits()).unwrap();
    }
    writeln!(out, "        }};").unwrap();
    out
}

fn serialize_modifier_maps(ctx: &Context, keymap: &Keymap) -> String {
    let mut out = String::new();
    for (i, m) in keymap.mods().iter().enumerate() {
        let bit = 1u32 << i;
        let keys: Vec<&Key> = keymap.keys().iter().filter(|k| k.modmap & bit != 0).collect();
        if keys.is_empty() {
            continue;
        }
        let names: Vec<String> = keys.iter().map(|k| format!("<{}>", atom_text(ctx, k.name))).collect();
        writeln!(
            out,
            "        modifier_map {} {{ {} }};",
            atom_text(ctx, m.name),
            names.join(", ")
        )
        .unwrap();
    }
    out
}

fn serialize_symbols(ctx: &Context, keymap: &Keymap) -> String {
    let mut out = String::new();
    writeln!(out, "    xkb_symbols \"generated\" {{").unwrap();
    let mut keys: Vec<&Key> = keymap.keys().iter().collect();
    keys.sort_by_key(|k| k.keycode);
    for key in keys {
        if key.name.is_none() || key.groups.is_empty() {
            continue;
        }
        writeln!(out, "        key <{}> {{", atom_text(ctx, key.name)).unwrap();
        let mut fields = Vec::new();
        for (i, group) in key.groups.iter().enumerate() {
            if group.explicit_type {
                let ty_name = atom_text(ctx, keymap.types()[group.type_index].name);
                fields.push(format!("type[Group{}] = \"{}\"", i + 1, ty_name));
            }
            let syms: Vec<String> = group
                .levels
                .iter()
                .map(|level| serialize_level_syms(level))
                .collect();
            fields.push(format!("symbols[Group{}] = [ {} ]", i + 1, syms.join(", ")));
            if group.explicit_actions {
                let actions: Vec<String> = group
                    .levels
                    .iter()
                    .map(|level| {
                        level
                            .actions
                            .first()
                            .map(|a| serialize_action(ctx, keymap, a))
                            .unwrap_or_else(|| "NoAction()".to_owned())
                    })
                    .collect();
                fields.push(format!("actions[Group{}] = [ {} ]", i + 1, actions.join(", ")));
            }
        }
        if key.vmodmap != 0 {
            fields.push(format!(
                "virtualMods = {}",
                mod_mask_to_string(ctx, keymap, key.vmodmap)
            ));
        }
        if key.explicit.contains(crate::keymap::ExplicitComponents::REPEAT) {
            fields.push(format!("repeat = {}", if key.repeats { "True" } else { "False" }));
        }
        for (i, field) in fields.iter().enumerate() {
            let sep = if i + 1 < fields.len() { "," } else { "" };
            writeln!(out, "            {field}{sep}").unwrap();
        }
        writeln!(out, "        }};").unwrap();
    }
    writeln!(out, "    }};").unwrap();
    out
}

fn serialize_level_syms(level: &crate::keymap::Level) -> String {
    if level.syms.is_empty() {
        return "NoSymbol".to_owned();
    }
    if level.syms.len() == 1 {
        return level.syms[0].name();
    }
    let names: Vec<String> = level.syms.iter().map(|s| s.name()).collect();
    format!("{{{}}}", names.join(", "))
}

/// Serializes `keymap` to canonical `xkb_keymap { ... }` text, spec §4.5.
/// `format()` on the keymap selects V1/V2 grammar; both currently share one
/// textual idiom (see DESIGN.md), so the output is identical either way.
pub fn serialize(ctx: &Context, keymap: &Keymap) -> String {
    let mut out = String::new();
    out.push_str("xkb_keymap {\n");
    out.push_str(&serialize_keycodes(ctx, keymap));
    out.push_str(&serialize_types(ctx, keymap));
    out.push_str(&serialize_compat(ctx, keymap));
    out.push_str(&serialize_symbols(ctx, keymap));
    out.push_str("};\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::context::{Context, ContextFlags};
    use crate::keymap::KeymapFormat;

    const SRC: &str = r#"xkb_keymap {
        xkb_keycodes "t" {
            <AC01> = 38;
            <LFSH> = 50;
        };
        xkb_types "t" {
            type "TWO_LEVEL" {
                modifiers = Shift;
                map[Shift] = 1;
                level_name[1] = "Base";
                level_name[2] = "Shift";
            };
        };
        xkb_compatibility "t" {
            interpret Shift_L {
                action = SetMods(modifiers=Shift);
            };
        };
        xkb_symbols "t" {
            key <AC01> {
                type = "TWO_LEVEL",
                symbols[Group1] = [ a, A ]
            };
            key <LFSH> {
                symbols[Group1] = [ Shift_L ]
            };
        };
    };"#;

    #[test]
    fn serialized_text_reparses_to_an_equivalent_keymap() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let file = crate::parser::parse_str(SRC).unwrap();
        let keymap = compile(&ctx, &file, KeymapFormat::TextV1).unwrap();

        let text = serialize(&ctx, &keymap);
        let reparsed_file = crate::parser::parse_str(&text).unwrap();
        let reparsed = compile(&ctx, &reparsed_file, KeymapFormat::TextV1).unwrap();

        assert_eq!(reparsed.min_key_code(), keymap.min_key_code());
        assert_eq!(reparsed.max_key_code(), keymap.max_key_code());
        assert_eq!(reparsed.num_mods(), keymap.num_mods());
        let orig_key = keymap.key(38).unwrap();
        let new_key = reparsed.key(38).unwrap();
        assert_eq!(orig_key.groups[0].levels.len(), new_key.groups[0].levels.len());
        assert_eq!(
            orig_key.groups[0].levels[1].syms[0].name(),
            new_key.groups[0].levels[1].syms[0].name()
        );
    }

    #[test]
    fn mod_mask_renders_known_names_and_unknown_hex_tail() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let file = crate::parser::parse_str(SRC).unwrap();
        let keymap = compile(&ctx, &file, KeymapFormat::TextV1).unwrap();
        assert_eq!(mod_mask_to_string(&ctx, &keymap, 0), "None");
        assert_eq!(mod_mask_to_string(&ctx, &keymap, 1), "Shift");
    }
}
