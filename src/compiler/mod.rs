//! The four semantic passes that fold a parsed `XkbFile` into a
//! `Keymap`, spec §4.4. Passes share a `Builder` that becomes an
//! immutable, `Arc`-backed `Keymap` on success; any failure aborts the
//! whole compile and discards partial state, per spec §7.

mod compat;
mod keycodes;
mod symbols;
mod types;

use std::collections::HashMap;

use crate::actions::GroupsWrapPolicy;
use crate::atom::Atom;
use crate::context::Context;
use crate::diag::{LogLevel, MessageId};
use crate::error::{Error, Result};
use crate::keymap::{Interpretation, Key, KeyType, Keymap, KeymapFormat, Led, ModifierDef, ModifierKind};
use crate::parser::ast::{MaskExpr, MaskTerm, SectionKind, XkbFile};

/// Accumulates state across passes. Not itself exposed; `compile()` is
/// the only public entry point.
pub(crate) struct Builder<'a> {
    pub ctx: &'a Context,
    pub format: KeymapFormat,

    pub keycode_values: HashMap<String, u32>,
    pub aliases: HashMap<String, String>,
    pub led_names: HashMap<u32, String>,
    pub min_key_code: u32,
    pub max_key_code: u32,

    pub mods: Vec<ModifierDef>,
    pub mod_name_index: HashMap<String, usize>,

    pub types: Vec<KeyType>,
    pub type_name_index: HashMap<String, usize>,

    pub interpretations: Vec<Interpretation>,
    pub leds: Vec<Led>,

    pub keys: HashMap<String, KeyBuilder>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct KeyBuilder {
    pub modmap: u32,
    pub vmodmap: u32,
    pub repeats: Option<bool>,
    pub out_of_range_group_action: GroupsWrapPolicy,
    pub out_of_range_group_number: u32,
    pub groups: Vec<crate::keymap::Group>,
    pub explicit: crate::keymap::ExplicitComponents,
}

impl<'a> Builder<'a> {
    fn new(ctx: &'a Context, format: KeymapFormat) -> Self {
        let mut mods = Vec::new();
        let mut mod_name_index = HashMap::new();
        for (i, name) in crate::keymap::REAL_MOD_NAMES.iter().enumerate() {
            let atom = ctx.intern_atom(name);
            mods.push(ModifierDef {
                name: atom,
                kind: ModifierKind::Real,
                mapping: 1 << i,
            });
            mod_name_index.insert((*name).to_owned(), i);
        }
        Builder {
            ctx,
            format,
            keycode_values: HashMap::new(),
            aliases: HashMap::new(),
            led_names: HashMap::new(),
            min_key_code: u32::MAX,
            max_key_code: 0,
            mods,
            mod_name_index,
            types: Vec::new(),
            type_name_index: HashMap::new(),
            interpretations: Vec::new(),
            leds: Vec::new(),
            keys: HashMap::new(),
        }
    }

    pub fn intern(&self, s: &str) -> Atom {
        self.ctx.intern_atom(s)
    }

    pub fn warn(&self, id: MessageId, text: impl AsRef<str>) {
        self.ctx.log(LogLevel::Warning, id, text);
    }

    /// Declares a virtual modifier if not already present, returning its
    /// index. `mask` is the raw real-bit mask it was declared with, if
    /// any (spec §4.4 types pass).
    pub fn declare_virtual_mod(&mut self, name: &str, mask: u32) -> usize {
        if let Some(&idx) = self.mod_name_index.get(name) {
            return idx;
        }
        let idx = self.mods.len();
        self.mods.push(ModifierDef {
            name: self.intern(name),
            kind: ModifierKind::Virtual,
            mapping: mask,
        });
        self.mod_name_index.insert(name.to_owned(), idx);
        idx
    }

    /// Resolves a modifier-mask expression into a runtime mask: each term
    /// is either a known modifier name (real or virtual) contributing its
    /// bit, or a bare number contributing its literal value, all OR'd
    /// together.
    pub fn resolve_mask(&mut self, expr: &MaskExpr) -> u32 {
        let mut mask = 0u32;
        for term in expr {
            match term {
                MaskTerm::Number(n) => mask |= n,
                MaskTerm::Name(name) => {
                    if name.eq_ignore_ascii_case("none") {
                        continue;
                    }
                    if name.eq_ignore_ascii_case("all") {
                        mask |= 0xffff_ffff;
                        continue;
                    }
                    if let Some(&idx) = self.mod_name_index.get(name) {
                        mask |= 1 << idx;
                    } else {
                        let idx = self.declare_virtual_mod(name, 0);
                        mask |= 1 << idx;
                    }
                }
            }
        }
        mask
    }

    fn key_builder(&mut self, name: &str) -> &mut KeyBuilder {
        self.keys.entry(name.to_owned()).or_default()
    }

    fn resolve_key_name(&self, name: &str) -> String {
        let mut current = name.to_owned();
        let mut hops = 0;
        while let Some(real) = self.aliases.get(&current) {
            current = real.clone();
            hops += 1;
            if hops > 16 {
                break;
            }
        }
        current
    }

    fn finish(mut self) -> Result<Keymap> {
        if self.min_key_code > self.max_key_code {
            return Err(Error::semantic("no keycodes were declared"));
        }

        let mut keys = Vec::new();
        let mut keycode_names: Vec<(&String, &u32)> = self.keycode_values.iter().collect();
        keycode_names.sort_by_key(|(_, v)| **v);
        for (name, &keycode) in keycode_names {
            let builder = self.keys.remove(name).unwrap_or_default();
            keys.push(Key {
                keycode,
                name: self.intern(name),
                modmap: builder.modmap,
                vmodmap: builder.vmodmap,
                repeats: builder.repeats.unwrap_or(true),
                out_of_range_group_action: builder.out_of_range_group_action,
                out_of_range_group_number: builder.out_of_range_group_number,
                groups: builder.groups,
                explicit: builder.explicit,
            });
        }

        let aliases: HashMap<Atom, Atom> = self
            .aliases
            .iter()
            .map(|(alias, real)| (self.intern(alias), self.intern(real)))
            .collect();

        Keymap::build(
            self.format,
            self.min_key_code,
            self.max_key_code,
            self.mods,
            self.types,
            keys,
            self.interpretations,
            self.leds,
            aliases,
        )
    }
}

fn find_section(file: &XkbFile, kind: SectionKind) -> Option<&crate::parser::ast::Section> {
    file.sections.iter().find(|s| s.kind == kind)
}

/// Compiles a fully include-resolved `XkbFile` (see
/// `parser::parse_and_resolve`) into a `Keymap`, running the four passes
/// in spec §4.4's order: keycodes, types, compat, symbols.
pub fn compile(ctx: &Context, file: &XkbFile, format: KeymapFormat) -> Result<Keymap> {
    let mut builder = Builder::new(ctx, format);

    let keycodes_section = find_section(file, SectionKind::Keycodes)
        .ok_or_else(|| Error::semantic("missing xkb_keycodes section"))?;
    keycodes::compile_keycodes(&mut builder, keycodes_section)?;

    let types_section = find_section(file, SectionKind::Types)
        .ok_or_else(|| Error::semantic("missing xkb_types section"))?;
    types::compile_types(&mut builder, types_section)?;
    types::seed_builtin_types(&mut builder);

    let compat_section = find_section(file, SectionKind::Compat)
        .ok_or_else(|| Error::semantic("missing xkb_compatibility section"))?;
    compat::compile_compat(&mut builder, compat_section)?;

    let symbols_section = find_section(file, SectionKind::Symbols)
        .ok_or_else(|| Error::semantic("missing xkb_symbols section"))?;
    symbols::compile_symbols(&mut builder, symbols_section)?;

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, ContextFlags};

    const MINIMAL_SRC: &str = r#"xkb_keymap {
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
    fn compiles_minimal_keymap() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let file = crate::parser::parse_str(MINIMAL_SRC).unwrap();
        let keymap = compile(&ctx, &file, KeymapFormat::TextV1).unwrap();
        assert_eq!(keymap.min_key_code(), 38);
        assert_eq!(keymap.max_key_code(), 50);
        let key = keymap.key(38).unwrap();
        assert_eq!(key.groups.len(), 1);
        assert_eq!(key.groups[0].levels.len(), 2);
        assert_eq!(key.groups[0].levels[0].syms[0].name(), "a");
        assert_eq!(key.groups[0].levels[1].syms[0].name(), "A");
    }

    #[test]
    fn compiled_keymap_exposes_alias_table() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let file = crate::parser::parse_str(
            r#"xkb_keymap {
                xkb_keycodes "t" {
                    <AC01> = 38;
                    alias <LFSH> = <AC01>;
                };
                xkb_types "t" {
                    type "ONE_LEVEL" {
                        modifiers = none;
                        level_name[1] = "Any";
                    };
                };
                xkb_compatibility "t" { };
                xkb_symbols "t" {
                    key <AC01> { symbols[Group1] = [ a ] };
                };
            };"#,
        )
        .unwrap();
        let keymap = compile(&ctx, &file, KeymapFormat::TextV1).unwrap();
        let lfsh = ctx.intern_atom("LFSH");
        let ac01 = ctx.intern_atom("AC01");
        assert_eq!(keymap.key_name_for_alias(lfsh), Some(ac01));
        assert_eq!(keymap.key_name_for_alias(ctx.intern_atom("RALT")), None);
    }

    #[test]
    fn missing_section_is_semantic_error() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let file = crate::parser::parse_str(r#"xkb_keymap { xkb_keycodes "t" { <A> = 1; }; };"#).unwrap();
        let err = compile(&ctx, &file, KeymapFormat::TextV1).unwrap_err();
        assert!(matches!(err, Error::Semantic(_)));
    }
}
