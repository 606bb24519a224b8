//! Keycodes pass, spec §4.4: collects name↔value bindings, aliases, and
//! LED name slots; produces the min/max keycode range.

use crate::diag::MessageId;
use crate::error::{Error, Result};
use crate::keymap::MAX_KEYCODE;
use crate::parser::ast::{Section, Statement};

use super::Builder;

pub(crate) fn compile_keycodes(builder: &mut Builder, section: &Section) -> Result<()> {
    for stmt in &section.statements {
        match stmt {
            Statement::KeycodeDef { name, value } => {
                if *value > MAX_KEYCODE {
                    return Err(Error::limit(format!(
                        "keycode {value:#x} for {name} exceeds cap {MAX_KEYCODE:#x}"
                    )));
                }
                if let Some(&existing) = builder.keycode_values.get(name) {
                    if existing != *value {
                        builder.warn(
                            MessageId::DuplicateEntry,
                            format!("duplicate keycode definition for {name}, keeping {existing}"),
                        );
                    }
                    continue;
                }
                builder.keycode_values.insert(name.clone(), *value);
                builder.min_key_code = builder.min_key_code.min(*value);
                builder.max_key_code = builder.max_key_code.max(*value);
            }
            Statement::Alias { alias, real } => {
                builder.aliases.insert(alias.clone(), real.clone());
            }
            Statement::IndicatorName { index, name } => {
                builder.led_names.insert(*index, name.clone());
            }
            Statement::VarSet { .. } => {
                // Unrecognized hints (e.g. `minimum`/`maximum`) are
                // advisory only; the real range is derived from the
                // declared keycodes themselves.
            }
            other => {
                return Err(Error::semantic(format!(
                    "unexpected statement in xkb_keycodes: {other:?}"
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, ContextFlags};

    fn parse(src: &str) -> crate::parser::ast::XkbFile {
        crate::parser::parse_str(src).unwrap()
    }

    #[test]
    fn collects_keycodes_and_aliases() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, crate::keymap::KeymapFormat::TextV1);
        let file = parse(
            r#"xkb_keycodes "t" {
                <AC01> = 38;
                <LFSH> = 50;
                alias <SHIFT> = <LFSH>;
                indicator 1 = "Caps Lock";
            };"#,
        );
        compile_keycodes(&mut builder, &file.sections[0]).unwrap();
        assert_eq!(builder.keycode_values.get("AC01"), Some(&38));
        assert_eq!(builder.aliases.get("SHIFT"), Some(&"LFSH".to_owned()));
        assert_eq!(builder.led_names.get(&1), Some(&"Caps Lock".to_owned()));
        assert_eq!(builder.min_key_code, 38);
        assert_eq!(builder.max_key_code, 50);
    }

    #[test]
    fn rejects_keycode_above_cap() {
        let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
        let mut builder = Builder::new(&ctx, crate::keymap::KeymapFormat::TextV1);
        let file = parse(r#"xkb_keycodes "t" { <HUGE> = 0x10000; };"#);
        let err = compile_keycodes(&mut builder, &file.sections[0]).unwrap_err();
        assert!(matches!(err, Error::Limit(_)));
    }
}
