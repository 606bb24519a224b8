//! A Menu-style key latches to the second layout group for exactly the
//! next key press, then reverts — the group-latch scenario from spec §1's
//! worked examples.

use xkbforge::compiler::compile;
use xkbforge::context::{Context, ContextFlags};
use xkbforge::keymap::KeymapFormat;
use xkbforge::state::{KeyDirection, State};

const SOURCE: &str = r#"xkb_keymap {
    xkb_keycodes "group-latch" {
        <AC01> = 38;
        <AC02> = 39;
        <MENU> = 135;
    };
    xkb_types "group-latch" {
        type "ONE_LEVEL" {
            modifiers = None;
            map[None] = 1;
        };
    };
    xkb_compatibility "group-latch" {
        interpret Menu {
            action = LatchGroup(group=2);
        };
    };
    xkb_symbols "group-latch" {
        key <AC01> {
            symbols[Group1] = [ a ],
            symbols[Group2] = [ cyrillic_a ]
        };
        key <AC02> {
            symbols[Group1] = [ b ],
            symbols[Group2] = [ cyrillic_be ]
        };
        key <MENU> { symbols[Group1] = [ Menu ] };
    };
};"#;

#[test]
fn group_latch_applies_once_then_reverts() {
    let ctx = Context::new(ContextFlags::NO_DEFAULT_INCLUDES);
    let file = xkbforge::parser::parse_str(SOURCE).unwrap();
    let keymap = compile(&ctx, &file, KeymapFormat::TextV1).unwrap();
    let mut state = State::new(keymap);

    assert_eq!(state.key_get_layout(38), Some(0));
    assert_eq!(state.key_get_one_sym(38).unwrap().name(), "a");

    state.update_key(135, KeyDirection::Down);
    state.update_key(135, KeyDirection::Up);

    assert_eq!(state.key_get_layout(38), Some(1));

    state.update_key(38, KeyDirection::Down);
    state.update_key(38, KeyDirection::Up);

    assert_eq!(state.key_get_layout(39), Some(0));
    assert_eq!(state.key_get_one_sym(39).unwrap().name(), "b");
}
