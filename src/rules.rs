//! RMLVO → KcCGST resolution, spec §4.3: reads a rules file and maps
//! `{rules, model, layout[1..N], variant[1..N], options[*]}` to four
//! component names by walking declaration blocks top to bottom, first
//! match wins per layout position.

use std::collections::HashMap;

use crate::context::Context;
use crate::error::{Error, Result};

const MAX_LAYOUTS: usize = 32;

/// The resolved selection, after defaulting from environment/built-ins,
/// spec §4.3.
#[derive(Debug, Clone, Default)]
pub struct Rmlvo {
    pub rules: String,
    pub model: String,
    pub layouts: Vec<String>,
    pub variants: Vec<String>,
    pub options: Vec<String>,
}

impl Rmlvo {
    /// Fills in any of the five fields left `None` from environment
    /// variables (unless `NO_ENVIRONMENT_NAMES`), then built-in defaults.
    /// A variant at a layout position with no corresponding layout is
    /// rejected; more than 32 layouts is rejected.
    pub fn resolve(
        ctx: &Context,
        rules: Option<&str>,
        model: Option<&str>,
        layout: Option<&str>,
        variant: Option<&str>,
        options: Option<&str>,
    ) -> Result<Rmlvo> {
        let rules = rules
            .map(str::to_owned)
            .or_else(|| ctx.getenv("XKB_DEFAULT_RULES"))
            .unwrap_or_else(|| "evdev".to_owned());
        let model = model
            .map(str::to_owned)
            .or_else(|| ctx.getenv("XKB_DEFAULT_MODEL"))
            .unwrap_or_else(|| "pc105".to_owned());
        let layout_csv = layout
            .map(str::to_owned)
            .or_else(|| ctx.getenv("XKB_DEFAULT_LAYOUT"))
            .unwrap_or_else(|| "us".to_owned());
        let variant_csv = variant
            .map(str::to_owned)
            .or_else(|| ctx.getenv("XKB_DEFAULT_VARIANT"))
            .unwrap_or_default();
        let options_csv = options
            .map(str::to_owned)
            .or_else(|| ctx.getenv("XKB_DEFAULT_OPTIONS"))
            .unwrap_or_default();

        let layouts: Vec<String> = split_csv(&layout_csv);
        let variants: Vec<String> = split_csv(&variant_csv);
        let options: Vec<String> = options_csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();

        if layouts.len() > MAX_LAYOUTS {
            return Err(Error::limit(format!(
                "{} layouts exceeds the cap of {MAX_LAYOUTS}",
                layouts.len()
            )));
        }
        for (i, v) in variants.iter().enumerate() {
            if !v.is_empty() && layouts.get(i).map(|l| l.is_empty()).unwrap_or(true) {
                return Err(Error::invalid_usage(format!(
                    "variant {v:?} at position {} has no corresponding layout",
                    i + 1
                )));
            }
        }

        Ok(Rmlvo {
            rules,
            model,
            layouts,
            variants,
            options,
        })
    }
}

fn split_csv(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(',').map(str::trim).map(str::to_owned).collect()
}

/// The four component names a rules lookup produces, plus the number of
/// layout positions that were actually matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KcCgst {
    pub keycodes: String,
    pub types: String,
    pub compat: String,
    pub symbols: String,
    pub geometry: String,
    pub explicit_layouts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Component {
    Keycodes,
    Types,
    Compat,
    Symbols,
    Geometry,
}

impl Component {
    fn parse(s: &str) -> Option<Component> {
        match s {
            "keycodes" => Some(Component::Keycodes),
            "types" => Some(Component::Types),
            "compat" | "compatibility" => Some(Component::Compat),
            "symbols" => Some(Component::Symbols),
            "geometry" => Some(Component::Geometry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Rules,
    Model,
    Layout,
    Variant,
    Option,
}

impl FieldKind {
    fn parse(s: &str) -> Option<FieldKind> {
        match s {
            "rules" => Some(FieldKind::Rules),
            "model" => Some(FieldKind::Model),
            "layout" => Some(FieldKind::Layout),
            "variant" => Some(FieldKind::Variant),
            "option" | "options" => Some(FieldKind::Option),
            _ => None,
        }
    }
}

/// A header-column bracket qualifier binding a field to a specific layout
/// index or index class, spec §4.3: `layout[1]`/`layout[first]` restrict a
/// row to the first layout position, `layout[later]` to every position but
/// the first, a bare numeral to that exact position. `[any]`/`[all]` (and
/// the value-presence qualifiers `[some]`/`[none]`, which this resolver
/// does not distinguish from `[any]`) place no restriction beyond the
/// per-position matching every `layout`/`variant` column already gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexQualifier {
    Unrestricted,
    Later,
    Position(u32),
}

impl IndexQualifier {
    fn parse(s: &str) -> Result<IndexQualifier> {
        match s {
            "any" | "all" | "some" | "none" => Ok(IndexQualifier::Unrestricted),
            "first" => Ok(IndexQualifier::Position(1)),
            "later" => Ok(IndexQualifier::Later),
            n => n
                .parse::<u32>()
                .map(IndexQualifier::Position)
                .map_err(|_| Error::syntax_unlocated(format!("unknown layout-index qualifier [{n}]"))),
        }
    }

    fn allows(self, index: u32) -> bool {
        match self {
            IndexQualifier::Unrestricted => true,
            IndexQualifier::Later => index >= 2,
            IndexQualifier::Position(n) => index == n,
        }
    }
}

fn parse_field_with_qualifier(w: &str) -> Result<(FieldKind, IndexQualifier)> {
    match w.split_once('[') {
        Some((base, rest)) => {
            let qualifier_str = rest.strip_suffix(']').ok_or_else(|| {
                Error::syntax_unlocated(format!("unterminated index qualifier in rule field {w}"))
            })?;
            let kind = FieldKind::parse(base)
                .ok_or_else(|| Error::syntax_unlocated(format!("unknown rule field {w}")))?;
            Ok((kind, IndexQualifier::parse(qualifier_str)?))
        }
        None => {
            let kind = FieldKind::parse(w)
                .ok_or_else(|| Error::syntax_unlocated(format!("unknown rule field {w}")))?;
            Ok((kind, IndexQualifier::Unrestricted))
        }
    }
}

#[derive(Debug, Clone)]
struct RuleGroup {
    inputs: Vec<(FieldKind, IndexQualifier)>,
    outputs: Vec<Component>,
    rows: Vec<RuleRow>,
}

#[derive(Debug, Clone)]
struct RuleRow {
    patterns: Vec<String>,
    values: Vec<String>,
}

fn parse_rules(text: &str) -> Result<Vec<RuleGroup>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut groups = Vec::new();
    let mut current: Option<RuleGroup> = None;

    for raw_line in text.lines() {
        let line = match raw_line.find("//") {
            Some(idx) => &raw_line[..idx],
            None => raw_line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('!') {
            if let Some(g) = current.take() {
                groups.push(g);
            }
            let (lhs, rhs) = header
                .split_once('=')
                .ok_or_else(|| Error::syntax_unlocated("rule header missing '='"))?;
            let inputs = lhs
                .split_whitespace()
                .map(parse_field_with_qualifier)
                .collect::<Result<Vec<_>>>()?;
            let outputs = rhs
                .split_whitespace()
                .map(|w| {
                    Component::parse(w)
                        .ok_or_else(|| Error::syntax_unlocated(format!("unknown rule output {w}")))
                })
                .collect::<Result<Vec<_>>>()?;
            current = Some(RuleGroup {
                inputs,
                outputs,
                rows: Vec::new(),
            });
            continue;
        }
        let group = current
            .as_mut()
            .ok_or_else(|| Error::syntax_unlocated("rule row before any header"))?;
        let (lhs, rhs) = line
            .split_once('=')
            .ok_or_else(|| Error::syntax_unlocated("rule row missing '='"))?;
        let patterns: Vec<String> = lhs.split_whitespace().map(str::to_owned).collect();
        let values: Vec<String> = rhs.split_whitespace().map(str::to_owned).collect();
        if patterns.len() != group.inputs.len() || values.len() != group.outputs.len() {
            return Err(Error::syntax_unlocated(format!(
                "rule row {line:?} has the wrong column count for its header"
            )));
        }
        group.rows.push(RuleRow { patterns, values });
    }
    if let Some(g) = current.take() {
        groups.push(g);
    }
    Ok(groups)
}

fn pattern_matches(pattern: &str, value: Option<&str>) -> bool {
    match pattern {
        "*" | "<some>" => value.map(|v| !v.is_empty()).unwrap_or(false),
        "<none>" => value.map(|v| v.is_empty()).unwrap_or(true),
        "<any>" => true,
        lit => value == Some(lit),
    }
}

/// Splits an option like `grp:menu_latch_group2` from an optional `!n`
/// layout-position restriction, spec §4.3.
fn split_option_restriction(opt: &str) -> (&str, Option<u32>) {
    match opt.split_once('!') {
        Some((base, idx)) => (base, idx.parse().ok()),
        None => (opt, None),
    }
}

/// Expands `%i`/`%l`/`%v`/`%%` plus the two optional-group idioms this
/// resolver recognizes: `(%v)` (dropped entirely when `variant` is empty)
/// and `:%i` (dropped when `index <= 1`, since the primary layout needs no
/// qualifier). Everything else passes through literally.
fn interpolate(template: &str, layout: &str, variant: &str, index: u32) -> String {
    let mut out = String::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '(' && chars.get(i + 1) == Some(&'%') && chars.get(i + 2) == Some(&'v')
            && chars.get(i + 3) == Some(&')')
        {
            if !variant.is_empty() {
                out.push('(');
                out.push_str(variant);
                out.push(')');
            }
            i += 4;
            continue;
        }
        if chars[i] == ':' && chars.get(i + 1) == Some(&'%') && chars.get(i + 2) == Some(&'i') {
            if index > 1 {
                out.push(':');
                out.push_str(&index.to_string());
            }
            i += 3;
            continue;
        }
        if chars[i] == '%' {
            match chars.get(i + 1) {
                Some('i') => {
                    out.push_str(&index.to_string());
                    i += 2;
                    continue;
                }
                Some('l') => {
                    out.push_str(layout);
                    i += 2;
                    continue;
                }
                Some('v') => {
                    out.push_str(variant);
                    i += 2;
                    continue;
                }
                Some('%') => {
                    out.push('%');
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn scalar_field<'a>(rmlvo: &'a Rmlvo, kind: FieldKind) -> Option<&'a str> {
    match kind {
        FieldKind::Rules => Some(rmlvo.rules.as_str()),
        FieldKind::Model => Some(rmlvo.model.as_str()),
        _ => None,
    }
}

/// Resolves `rmlvo` against the rules file text `rules_src`, spec §4.3.
/// Rule groups that key on `layout`/`variant` are applied once per layout
/// position (first matching row per position wins, each row additionally
/// gated by any `[n]`/`[first]`/`[later]` index qualifier on its header
/// column); groups keyed only on `rules`/`model` apply once; groups keyed
/// on `option` apply once per supplied option, honoring an `opt!n` index
/// restriction.
pub fn resolve(ctx: &Context, rmlvo: &Rmlvo, rules_src: &str) -> Result<KcCgst> {
    let _ = ctx;
    let groups = parse_rules(rules_src)?;
    let mut components: HashMap<Component, String> = HashMap::new();
    let explicit_layouts = rmlvo.layouts.iter().filter(|l| !l.is_empty()).count() as u32;
    let num_positions = rmlvo.layouts.len().max(1) as u32;

    for group in &groups {
        let per_layout = group
            .inputs
            .iter()
            .any(|(k, _)| matches!(k, FieldKind::Layout | FieldKind::Variant));
        let per_option = group
            .inputs
            .iter()
            .any(|(k, _)| matches!(k, FieldKind::Option));

        if per_layout {
            for index in 1..=num_positions {
                let layout = rmlvo.layouts.get((index - 1) as usize).map(String::as_str);
                let variant = rmlvo.variants.get((index - 1) as usize).map(String::as_str);
                let layout = match layout {
                    Some(l) if !l.is_empty() => l,
                    _ => continue,
                };
                let variant = variant.unwrap_or("");
                if let Some(row) = group.rows.iter().find(|row| {
                    row.patterns
                        .iter()
                        .zip(&group.inputs)
                        .all(|(pattern, (kind, qualifier))| {
                            if !qualifier.allows(index) {
                                return false;
                            }
                            match kind {
                                FieldKind::Layout => pattern_matches(pattern, Some(layout)),
                                FieldKind::Variant => pattern_matches(pattern, Some(variant)),
                                other => pattern_matches(pattern, scalar_field(rmlvo, *other)),
                            }
                        })
                }) {
                    apply_row(&mut components, group, row, layout, variant, index);
                }
            }
        } else if per_option {
            for opt in &rmlvo.options {
                let (base, restrict) = split_option_restriction(opt);
                if let Some(row) = group.rows.iter().find(|row| {
                    row.patterns
                        .iter()
                        .zip(&group.inputs)
                        .all(|(pattern, (kind, _qualifier))| match kind {
                            FieldKind::Option => pattern_matches(pattern, Some(base)),
                            other => pattern_matches(pattern, scalar_field(rmlvo, *other)),
                        })
                }) {
                    let index = restrict.unwrap_or(0);
                    apply_row(&mut components, group, row, "", "", index);
                }
            }
        } else if let Some(row) = group.rows.iter().find(|row| {
            row.patterns
                .iter()
                .zip(&group.inputs)
                .all(|(pattern, (kind, _qualifier))| pattern_matches(pattern, scalar_field(rmlvo, *kind)))
        }) {
            apply_row(&mut components, group, row, "", "", 0);
        }
    }

    Ok(KcCgst {
        keycodes: components.remove(&Component::Keycodes).unwrap_or_default(),
        types: components.remove(&Component::Types).unwrap_or_default(),
        compat: components.remove(&Component::Compat).unwrap_or_default(),
        symbols: components.remove(&Component::Symbols).unwrap_or_default(),
        geometry: components.remove(&Component::Geometry).unwrap_or_default(),
        explicit_layouts,
    })
}

fn apply_row(
    components: &mut HashMap<Component, String>,
    group: &RuleGroup,
    row: &RuleRow,
    layout: &str,
    variant: &str,
    index: u32,
) {
    for (component, value) in group.outputs.iter().zip(&row.values) {
        let expanded = interpolate(value, layout, variant, index);
        components.entry(*component).or_default().push_str(&expanded);
    }
}

impl Error {
    fn syntax_unlocated(msg: impl Into<String>) -> Error {
        Error::syntax(crate::error::Location::default(), msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextFlags;

    #[test]
    fn variant_without_layout_is_rejected() {
        let ctx = Context::new(ContextFlags::NO_ENVIRONMENT_NAMES);
        let err = Rmlvo::resolve(&ctx, Some("evdev"), Some("pc104"), Some(""), Some("intl"), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[test]
    fn too_many_layouts_is_a_limit_error() {
        let ctx = Context::new(ContextFlags::NO_ENVIRONMENT_NAMES);
        let layouts = vec!["us"; 33].join(",");
        let err = Rmlvo::resolve(&ctx, Some("evdev"), Some("pc104"), Some(&layouts), None, None)
            .unwrap_err();
        assert!(matches!(err, Error::Limit(_)));
    }

    const SCENARIO_6_RULES: &str = r#"
        ! model = symbols
          pc104 = pc

        ! rules = symbols
          evdev = +inet(evdev)

        ! layout = symbols
          *     = +%l(%v):%i
    "#;

    #[test]
    fn layout_qualifier_expansion_matches_scenario() {
        let ctx = Context::new(ContextFlags::NO_ENVIRONMENT_NAMES);
        let rmlvo = Rmlvo::resolve(
            &ctx,
            Some("evdev"),
            Some("pc104"),
            Some("us,ru"),
            Some(",phonetic"),
            Some(""),
        )
        .unwrap();
        let kccgst = resolve(&ctx, &rmlvo, SCENARIO_6_RULES).unwrap();
        assert_eq!(kccgst.symbols, "pc+us+ru(phonetic):2+inet(evdev)");
        assert_eq!(kccgst.explicit_layouts, 2);
    }

    #[test]
    fn wildcard_star_does_not_match_empty_field() {
        assert!(!pattern_matches("*", Some("")));
        assert!(pattern_matches("*", Some("us")));
        assert!(pattern_matches("<none>", Some("")));
        assert!(!pattern_matches("<none>", Some("us")));
        assert!(pattern_matches("<any>", None));
    }

    const LAYOUT_INDEX_QUALIFIER_RULES: &str = r#"
        ! layout = symbols
          *     = +%l:%i

        ! layout[1] = symbols
          x     = +only_first
    "#;

    #[test]
    fn layout_index_qualifier_restricts_row_to_one_position() {
        let ctx = Context::new(ContextFlags::NO_ENVIRONMENT_NAMES);
        let rmlvo =
            Rmlvo::resolve(&ctx, Some("evdev"), Some("pc104"), Some("x,x"), None, None).unwrap();
        let kccgst = resolve(&ctx, &rmlvo, LAYOUT_INDEX_QUALIFIER_RULES).unwrap();
        assert_eq!(kccgst.symbols, "+x+x:2+only_first");
    }

    #[test]
    fn resolving_twice_is_deterministic() {
        let ctx = Context::new(ContextFlags::NO_ENVIRONMENT_NAMES);
        let rmlvo =
            Rmlvo::resolve(&ctx, Some("evdev"), Some("pc104"), Some("us"), None, None).unwrap();
        let a = resolve(&ctx, &rmlvo, SCENARIO_6_RULES).unwrap();
        let b = resolve(&ctx, &rmlvo, SCENARIO_6_RULES).unwrap();
        assert_eq!(a, b);
    }
}
