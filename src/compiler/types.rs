//! Types pass, spec §4.4: builds the type table. The eight real
//! modifiers are pre-seeded by `Builder::new`; this pass appends declared
//! virtual modifiers and compiles `type { ... }` blocks.

use crate::atom::Atom;
use crate::error::{Error, Result};
use crate::keymap::{KeyType, KeyTypeEntry};
use crate::parser::ast::{Section, Statement, TypeDef};

use super::Builder;

pub(crate) fn compile_types(builder: &mut Builder, section: &Section) -> Result<()> {
    for stmt in &section.statements {
        match stmt {
            Statement::VirtualMods(mods) => {
                for (name, mask_expr) in mods {
                    let mask = mask_expr
                        .as_ref()
                        .map(|e| builder.resolve_mask(e))
                        .unwrap_or(0);
                    builder.declare_virtual_mod(name, mask);
                }
            }
            Statement::Type(def) => compile_type(builder, def)?,
            Statement::VarSet { .. } => {}
            other => {
                return Err(Error::semantic(format!(
                    "unexpected statement in xkb_types: {other:?}"
                )))
            }
        }
    }
    Ok(())
}

fn compile_type(builder: &mut Builder, def: &TypeDef) -> Result<()> {
    let mods = builder.resolve_mask(&def.mods);
    let mut num_levels = def
        .entries
        .iter()
        .map(|e| e.level + 1)
        .max()
        .unwrap_or(1)
        .max(1);
    for (idx, _) in &def.level_names {
        num_levels = num_levels.max(*idx);
    }

    let mut entries = Vec::new();
    for entry in &def.entries {
        let entry_mods = builder.resolve_mask(&entry.mods);
        if entry_mods & !mods != 0 {
            return Err(Error::semantic(format!(
                "type {} entry mods are not a subset of the type's modifiers",
                def.name
            )));
        }
        if entry.level >= num_levels {
            return Err(Error::semantic(format!(
                "type {} entry level {} out of range",
                def.name, entry.level
            )));
        }
        let preserve = def
            .preserve
            .iter()
            .find(|(m, _)| builder.resolve_mask(m) == entry_mods)
            .map(|(_, p)| builder.resolve_mask(p))
            .unwrap_or(0);
        if let Some(existing) = entries
            .iter_mut()
            .find(|e: &&mut KeyTypeEntry| e.mods == entry_mods)
        {
            existing.level = entry.level;
            existing.preserve = preserve;
        } else {
            entries.push(KeyTypeEntry {
                mods: entry_mods,
                preserve,
                level: entry.level,
            });
        }
    }

    let mut level_names = vec![Atom::NONE; num_levels as usize];
    for (idx, name) in &def.level_names {
        if *idx >= 1 && (*idx as usize) <= level_names.len() {
            level_names[(*idx - 1) as usize] = builder.intern(name);
        }
    }

    let ty = KeyType {
        name: builder.intern(&def.name),
        mods,
        num_levels,
        level_names,
        entries,
    };
    upsert_type(builder, def.name.clone(), ty);
    Ok(())
}

fn upsert_type(builder: &mut Builder, name: String, ty: KeyType) {
    if let Some(&idx) = builder.type_name_index.get(&name) {
        builder.types[idx] = ty;
    } else {
        let idx = builder.types.len();
        builder.types.push(ty);
        builder.type_name_index.insert(name, idx);
    }
}

/// Ensures the built-in fallback types spec §4.4's symbols pass relies on
/// for type inference (`ONE_LEVEL`, `TWO_LEVEL`, `ALPHABETIC`,
/// `KEYPAD`, `FOUR_LEVEL`) exist, without overriding any the source
/// explicitly declared.
pub(crate) fn seed_builtin_types(builder: &mut Builder) {
    let shift = 1u32 << builder.mod_name_index["Shift"];
    let lock = 1u32 << builder.mod_name_index["Lock"];

    let wanted: Vec<(&str, u32, Vec<(u32, u32)>)> = vec![
        ("ONE_LEVEL", 0, vec![]),
        ("TWO_LEVEL", shift, vec![(shift, 1)]),
        ("ALPHABETIC", shift | lock, vec![(shift, 1), (lock, 1)]),
        ("KEYPAD", shift, vec![(shift, 1)]),
        (
            "FOUR_LEVEL",
            shift | 0x2000,
            vec![(shift, 1), (0x2000, 2), (shift | 0x2000, 3)],
        ),
    ];
    for (name, mods, maps) in wanted {
        if builder.type_name_index.contains_key(name) {
            continue;
        }
        let num_levels = maps.iter().map(|(_, l)| l + 1).max().unwrap_or(1).max(1);
        let entries = maps
            .into_iter()
            .map(|(m, l)| KeyTypeEntry {
                mods: m,
                preserve: 0,
                level: l,
            })
            .collect();
        let ty = KeyType {
            name: builder.intern(name),
            mods,
            num_levels,
            level_names: vec![Atom::NONE; num_levels as usize],
            entries,
        };
        upsert_type(builder, name.to_owned(), ty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, ContextFlags};
    use crate::keymap::KeymapFormat;

    #[test]
    fn declares_virtual_modifier_with_swapped_mapping() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        let file = crate::parser::parse_str(
            r#"xkb_types "t" { virtual_modifiers M1 = 0x200, M2 = 0x100; };"#,
        )
        .unwrap();
        compile_types(&mut builder, &file.sections[0]).unwrap();
        let m1 = builder.mod_name_index["M1"];
        let m2 = builder.mod_name_index["M2"];
        assert_eq!(builder.mods[m1].mapping, 0x200);
        assert_eq!(builder.mods[m2].mapping, 0x100);
    }

    #[test]
    fn compiles_type_with_entries_and_level_names() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        let file = crate::parser::parse_str(
            r#"xkb_types "t" {
                type "TWO_LEVEL" {
                    modifiers = Shift;
                    map[Shift] = 1;
                    level_name[1] = "Base";
                    level_name[2] = "Shift";
                };
            };"#,
        )
        .unwrap();
        compile_types(&mut builder, &file.sections[0]).unwrap();
        let idx = builder.type_name_index["TWO_LEVEL"];
        let ty = &builder.types[idx];
        assert_eq!(ty.num_levels, 2);
        assert_eq!(ty.entries.len(), 1);
        assert_eq!(ty.entries[0].level, 1);
    }

    #[test]
    fn rejects_entry_mods_outside_type_mods() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, KeymapFormat::TextV1);
        let file = crate::parser::parse_str(
            r#"xkb_types "t" {
                type "BAD" {
                    modifiers = Shift;
                    map[Control] = 1;
                };
            };"#,
        )
        .unwrap();
        let err = compile_types(&mut builder, &file.sections[0]).unwrap_err();
        assert!(matches!(err, Error::Semantic(_)));
    }
}
