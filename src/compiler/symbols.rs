//! Symbols pass, spec §4.4: populates each key's groups, inferring a type
//! when none was given and consulting the interpretation table built by
//! the compat pass to assign implicit actions to levels the source didn't
//! give explicit actions for.

use crate::diag::MessageId;
use crate::error::{Error, Result};
use crate::keymap::{ExplicitComponents, Group, Level};
use crate::keysym::Keysym;
use crate::parser::ast::{GroupSpec, KeyDef, Section, Statement};

use super::Builder;

pub(crate) fn compile_symbols(builder: &mut Builder, section: &Section) -> Result<()> {
    for stmt in &section.statements {
        match stmt {
            Statement::Key(def) => compile_key(builder, def)?,
            Statement::VirtualMods(mods) => {
                for (name, mask_expr) in mods {
                    let mask = mask_expr
                        .as_ref()
                        .map(|e| builder.resolve_mask(e))
                        .unwrap_or(0);
                    builder.declare_virtual_mod(name, mask);
                }
            }
            Statement::ModMap { mod_name, keys } => {
                let idx = *builder.mod_name_index.get(mod_name).ok_or_else(|| {
                    Error::semantic(format!("modifier_map of unknown modifier {mod_name}"))
                })?;
                let bit = 1u32 << idx;
                for key_name in keys {
                    let resolved = builder.resolve_key_name(key_name);
                    builder.key_builder(&resolved).modmap |= bit;
                }
            }
            Statement::VarSet { .. } => {}
            other => {
                return Err(Error::semantic(format!(
                    "unexpected statement in xkb_symbols: {other:?}"
                )))
            }
        }
    }
    Ok(())
}

fn compile_key(builder: &mut Builder, def: &KeyDef) -> Result<()> {
    let name = builder.resolve_key_name(&def.name);

    if let Some(expr) = &def.vmodmap {
        let mask = builder.resolve_mask(expr);
        let kb = builder.key_builder(&name);
        kb.vmodmap |= mask;
        kb.explicit |= ExplicitComponents::VMODMAP;
    }
    if let Some(repeats) = def.repeats {
        let kb = builder.key_builder(&name);
        kb.repeats = Some(repeats);
        kb.explicit |= ExplicitComponents::REPEAT;
    }

    let num_groups_hint = def
        .groups
        .iter()
        .filter_map(|g| g.group_index)
        .max()
        .unwrap_or(0)
        .max(def.groups.iter().filter(|g| g.group_index.is_none()).count() as u32)
        .max(1);
    ensure_group_count(builder, &name, num_groups_hint);

    let mut next_implicit = 1u32;
    for group_spec in &def.groups {
        let group_index = group_spec.group_index.unwrap_or_else(|| {
            let idx = next_implicit;
            next_implicit += 1;
            idx
        });
        compile_group(builder, &name, group_index, group_spec)?;
    }

    for (group_index, type_name) in &def.type_override {
        let idx = builder
            .type_name_index
            .get(type_name)
            .copied()
            .ok_or_else(|| Error::semantic(format!("unknown key type {type_name}")))?;
        let group_index = group_index.unwrap_or(1);
        ensure_group_count(builder, &name, group_index);
        let num_levels = builder_type_levels(builder, idx);
        let kb = builder.key_builder(&name);
        if let Some(group) = kb.groups.get_mut((group_index - 1) as usize) {
            resize_group_levels(group, num_levels);
            group.type_index = idx;
            group.explicit_type = true;
        }
        builder.key_builder(&name).explicit |= ExplicitComponents::TYPES;
    }

    infer_missing_types(builder, &name);
    assign_implicit_actions(builder, &name);
    Ok(())
}

fn builder_type_levels(builder: &Builder, type_index: usize) -> u32 {
    builder.types[type_index].num_levels
}

fn ensure_group_count(builder: &mut Builder, key_name: &str, count: u32) {
    let kb = builder.key_builder(key_name);
    while (kb.groups.len() as u32) < count {
        kb.groups.push(Group {
            type_index: 0,
            levels: vec![Level::default()],
            explicit_type: false,
            explicit_actions: false,
        });
    }
}

fn resize_group_levels(group: &mut Group, num_levels: u32) {
    group.levels.resize_with(num_levels as usize, Level::default);
}

fn compile_group(
    builder: &mut Builder,
    key_name: &str,
    group_index: u32,
    spec: &GroupSpec,
) -> Result<()> {
    ensure_group_count(builder, key_name, group_index);

    if !spec.syms.is_empty() {
        let mut syms: Vec<Keysym> = Vec::with_capacity(spec.syms.len());
        for name in &spec.syms {
            match Keysym::from_name_checked(name) {
                Some(sym) => syms.push(sym),
                None => builder.warn(
                    MessageId::UnrecognizedKeysym,
                    format!(
                        "unrecognized keysym name {name:?} on key {key_name}, skipping entry"
                    ),
                ),
            }
        }
        let kb = builder.key_builder(key_name);
        let group = &mut kb.groups[(group_index - 1) as usize];
        group.levels = syms
            .into_iter()
            .map(|sym| Level {
                syms: vec![sym],
                actions: Vec::new(),
            })
            .collect();
        if group.levels.is_empty() {
            group.levels.push(Level::default());
        }
    }

    if let Some(action_defs) = &spec.actions {
        let mut compiled = Vec::with_capacity(action_defs.len());
        for a in action_defs {
            compiled.push(super::compat::compile_action(builder, a)?);
        }
        let kb = builder.key_builder(key_name);
        let group = &mut kb.groups[(group_index - 1) as usize];
        if group.levels.len() < compiled.len() {
            group.levels.resize_with(compiled.len(), Level::default);
        }
        for (level, action) in group.levels.iter_mut().zip(compiled) {
            level.actions = vec![action];
        }
        group.explicit_actions = true;
        kb.explicit |= ExplicitComponents::INTERP;
    }
    Ok(())
}

/// Falls back to a built-in type keyed by level count when a group has no
/// explicit type, spec §4.4: single level -> `ONE_LEVEL`, two levels where
/// both syms of level 0/1 case-pair -> `ALPHABETIC`, otherwise `TWO_LEVEL`
/// or `FOUR_LEVEL`.
fn infer_missing_types(builder: &mut Builder, key_name: &str) {
    let one_level = builder.type_name_index.get("ONE_LEVEL").copied();
    let two_level = builder.type_name_index.get("TWO_LEVEL").copied();
    let alphabetic = builder.type_name_index.get("ALPHABETIC").copied();
    let four_level = builder.type_name_index.get("FOUR_LEVEL").copied();

    let kb = builder.keys.get_mut(key_name).expect("key builder exists");
    for group in &mut kb.groups {
        if group.explicit_type {
            continue;
        }
        let inferred = match group.levels.len() {
            0 | 1 => one_level,
            2 => {
                let is_alphabetic = group.levels[0]
                    .first_sym()
                    .zip(group.levels[1].first_sym())
                    .map(|(lower, upper)| lower.to_upper() == Some(upper))
                    .unwrap_or(false);
                if is_alphabetic {
                    alphabetic.or(two_level)
                } else {
                    two_level
                }
            }
            4 => four_level.or(two_level),
            _ => two_level,
        };
        if let Some(idx) = inferred {
            group.type_index = idx;
        }
    }
}

/// For levels with no explicit action, consults the interpretation table
/// in declaration order and applies the first match against this key's
/// modifier map, per spec §4.4.
fn assign_implicit_actions(builder: &mut Builder, key_name: &str) {
    let key_modmap = builder
        .keys
        .get(key_name)
        .map(|kb| kb.modmap)
        .unwrap_or(0);
    let interpretations = builder.interpretations.clone();

    let kb = builder.keys.get_mut(key_name).expect("key builder exists");
    for group in &mut kb.groups {
        if group.explicit_actions {
            continue;
        }
        let mut any_assigned = false;
        for (level_index, level) in group.levels.iter_mut().enumerate() {
            let Some(sym) = level.first_sym() else {
                continue;
            };
            for interp in &interpretations {
                if interp.level_one_only && level_index != 0 {
                    continue;
                }
                let sym_matches = interp.sym.is_none() || interp.sym == Some(sym);
                if !sym_matches {
                    continue;
                }
                if !interp.match_op.matches(key_modmap, interp.mods) {
                    continue;
                }
                level.actions = interp.actions.clone();
                any_assigned = true;
                break;
            }
        }
        if any_assigned {
            group.explicit_actions = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compat::compile_compat;
    use crate::compiler::types::compile_types;
    use crate::context::{Context, ContextFlags};
    use crate::keymap::KeymapFormat;

    fn setup(builder: &mut Builder) {
        let types_file = crate::parser::parse_str(
            r#"xkb_types "t" {
                type "TWO_LEVEL" {
                    modifiers = Shift;
                    map[Shift] = 1;
                };
            };"#,
        )
        .unwrap();
        compile_types(builder, &types_file.sections[0]).unwrap();
        crate::compiler::types::seed_builtin_types(builder);

        let compat_file = crate::parser::parse_str(
            r#"xkb_compatibility "t" {
                interpret Shift_L {
                    action = SetMods(modifiers=Shift);
                };
            };"#,
        )
        .unwrap();
        compile_compat(builder, &compat_file.sections[0]).unwrap();
    }

    #[test]
    fn infers_two_level_type_and_implicit_shift_action() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        setup(&mut builder);
        let file = crate::parser::parse_str(
            r#"xkb_symbols "t" {
                key <AC01> { symbols[Group1] = [ a, A ] };
                key <LFSH> { symbols[Group1] = [ Shift_L ] };
            };"#,
        )
        .unwrap();
        compile_symbols(&mut builder, &file.sections[0]).unwrap();

        let a_key = &builder.keys["AC01"];
        assert_eq!(a_key.groups[0].levels.len(), 2);
        let two_level = builder.type_name_index["TWO_LEVEL"];
        assert_eq!(a_key.groups[0].type_index, two_level);

        let shift_key = &builder.keys["LFSH"];
        assert!(!shift_key.groups[0].levels[0].actions.is_empty());
    }

    #[test]
    fn explicit_actions_are_not_overridden() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        setup(&mut builder);
        let file = crate::parser::parse_str(
            r#"xkb_symbols "t" {
                key <AC01> {
                    symbols[Group1] = [ a, A ],
                    actions[Group1] = [ NoAction(), NoAction() ]
                };
            };"#,
        )
        .unwrap();
        compile_symbols(&mut builder, &file.sections[0]).unwrap();
        let key = &builder.keys["AC01"];
        assert!(key.groups[0].explicit_actions);
        assert!(matches!(key.groups[0].levels[0].actions[0], crate::actions::Action::Void));
    }

    #[test]
    fn unrecognized_keysym_is_warned_and_skipped() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        ctx.set_log_level(crate::diag::LogLevel::Warning);
        let warnings = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let warnings2 = warnings.clone();
        ctx.set_log_fn(move |_level, id, text| {
            warnings2.lock().unwrap().push((id, text.to_owned()));
        });
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        setup(&mut builder);
        let file = crate::parser::parse_str(
            r#"xkb_symbols "t" {
                key <AC01> { symbols[Group1] = [ a, cyrillic_a ] };
            };"#,
        )
        .unwrap();
        compile_symbols(&mut builder, &file.sections[0]).unwrap();

        let key = &builder.keys["AC01"];
        assert_eq!(key.groups[0].levels.len(), 1);
        assert_eq!(key.groups[0].levels[0].syms[0].name(), "a");

        let got = warnings.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, crate::diag::MessageId::UnrecognizedKeysym);
    }

    #[test]
    fn rejects_unknown_explicit_type() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        setup(&mut builder);
        let file = crate::parser::parse_str(
            r#"xkb_symbols "t" {
                key <AC01> {
                    type = "NO_SUCH_TYPE",
                    symbols[Group1] = [ a ]
                };
            };"#,
        )
        .unwrap();
        let err = compile_symbols(&mut builder, &file.sections[0]).unwrap_err();
        assert!(matches!(err, Error::Semantic(_)));
    }
}
