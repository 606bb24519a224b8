//! Recursive-descent parser: turns `.xkb` source text into the
//! include-expanded tree from `ast`, spec §4.2.

pub mod ast;
pub mod lexer;

use std::path::{Path, PathBuf};

use crate::context::Context;
use crate::error::{Error, Location, Result};

use self::ast::*;
use self::lexer::{Lexer, Spanned, Token};

/// Parses a single `.xkb` source buffer with no include expansion; used
/// both standalone and as the inner primitive `parse_and_resolve` drives.
pub fn parse_str(src: &str) -> Result<XkbFile> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut p = Parser { tokens, pos: 0 };
    p.parse_top()
}

/// Parses `src`, resolving any `include` statements against `ctx`'s
/// include path list, and merges each section's included statements with
/// its own per spec §4.2's `+`/`|`/`^` operators. `current_dir` anchors
/// the subdirectory convention (keycodes/types/compat/symbols) includes
/// are looked up under.
pub fn parse_and_resolve(ctx: &Context, src: &str) -> Result<XkbFile> {
    let mut file = parse_str(src)?;
    for section in &mut file.sections {
        resolve_includes_in_section(ctx, section, 0)?;
    }
    Ok(file)
}

const MAX_INCLUDE_DEPTH: u32 = 32;

fn section_subdir(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Keycodes => "keycodes",
        SectionKind::Types => "types",
        SectionKind::Compat => "compat",
        SectionKind::Symbols => "symbols",
        SectionKind::Geometry => "geometry",
    }
}

fn resolve_includes_in_section(ctx: &Context, section: &mut Section, depth: u32) -> Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(Error::semantic("include recursion too deep"));
    }
    let mut resolved: Vec<Statement> = Vec::new();
    let mut pending_includes = Vec::new();
    // Includes are encoded as VarSet("include", [Name(spec)]) by the
    // parser (see `parse_statement`); pull them out before the rest.
    for stmt in section.statements.drain(..) {
        if let Statement::VarSet { name, value } = &stmt {
            if name == "include" {
                if let Some(MaskTerm::Name(spec)) = value.first() {
                    pending_includes.push(spec.clone());
                    continue;
                }
            }
        }
        resolved.push(stmt);
    }

    let mut merged: Vec<Statement> = Vec::new();
    for spec in pending_includes {
        let (op, file_stem, included_section_name) = split_include_spec(&spec)?;
        let path = find_include_file(ctx, section.kind, &file_stem)?;
        let text = std::fs::read_to_string(&path).map_err(|e| Error::Io {
            path: path.clone(),
            source: e,
        })?;
        let included_file = parse_str(&text)?;
        let mut included_section = included_file
            .sections
            .into_iter()
            .find(|s| {
                s.kind == section.kind
                    && included_section_name
                        .as_deref()
                        .map(|n| n == s.name)
                        .unwrap_or(true)
            })
            .ok_or_else(|| {
                Error::semantic(format!(
                    "include {spec:?} did not resolve to a {:?} section",
                    section.kind
                ))
            })?;
        resolve_includes_in_section(ctx, &mut included_section, depth + 1)?;
        merged = merge_statements(merged, included_section.statements, op);
    }
    section.statements = merge_statements(merged, resolved, section.merge);
    Ok(())
}

fn split_include_spec(spec: &str) -> Result<(MergeOp, String, Option<String>)> {
    let (op, rest) = match spec.chars().next() {
        Some('+') => (MergeOp::Augment, &spec[1..]),
        Some('|') => (MergeOp::Override, &spec[1..]),
        Some('^') => (MergeOp::Replace, &spec[1..]),
        _ => (MergeOp::Augment, spec.as_ref()),
    };
    if let Some(open) = rest.find('(') {
        let file_stem = rest[..open].to_owned();
        let close = rest
            .find(')')
            .ok_or_else(|| Error::semantic("unterminated include section name"))?;
        let section_name = rest[open + 1..close].to_owned();
        Ok((op, file_stem, Some(section_name)))
    } else {
        Ok((op, rest.to_owned(), None))
    }
}

fn find_include_file(ctx: &Context, kind: SectionKind, stem: &str) -> Result<PathBuf> {
    let subdir = section_subdir(kind);
    for root in ctx.include_paths() {
        let candidate = root.join(subdir).join(stem);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(Error::Io {
        path: Path::new(subdir).join(stem),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "include not found on path"),
    })
}

/// Dedup key used to decide whether two statements refer to the "same"
/// declaration for merge purposes.
fn statement_key(stmt: &Statement) -> Option<String> {
    match stmt {
        Statement::KeycodeDef { name, .. } => Some(format!("kc:{name}")),
        Statement::Alias { alias, .. } => Some(format!("alias:{alias}")),
        Statement::IndicatorName { index, .. } => Some(format!("led:{index}")),
        Statement::Type(t) => Some(format!("type:{}", t.name)),
        Statement::Key(k) => Some(format!("key:{}", k.name)),
        Statement::ModMap { mod_name, .. } => Some(format!("modmap:{mod_name}")),
        Statement::Led(l) => Some(format!("ledblock:{}", l.name)),
        _ => None,
    }
}

/// Folds `incoming` into `existing` per spec §4.2's merge semantics.
/// Statements without a natural dedup key (interprets, var sets, virtual
/// modifier lists) are always concatenated, since "duplicates" among them
/// are meaningful repetition rather than conflicting declarations.
fn merge_statements(
    existing: Vec<Statement>,
    incoming: Vec<Statement>,
    op: MergeOp,
) -> Vec<Statement> {
    if op == MergeOp::Replace {
        return incoming;
    }
    let mut result = existing;
    'outer: for stmt in incoming {
        if let Some(key) = statement_key(&stmt) {
            for existing_stmt in result.iter_mut() {
                if statement_key(existing_stmt).as_deref() == Some(key.as_str()) {
                    if op == MergeOp::Override {
                        *existing_stmt = stmt;
                    }
                    // Augment: existing entry wins, drop incoming.
                    continue 'outer;
                }
            }
        }
        result.push(stmt);
    }
    result
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn loc(&self) -> Location {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        Location {
            file: None,
            line: t.line,
            column: t.column,
        }
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &Token) -> Result<()> {
        if self.peek() == tok {
            self.bump();
            Ok(())
        } else {
            Err(Error::syntax(
                self.loc(),
                format!("expected {:?}, found {:?}", tok, self.peek()),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.bump() {
            Token::Ident(s) => Ok(s),
            other => Err(Error::syntax(self.loc(), format!("expected identifier, found {other:?}"))),
        }
    }

    fn expect_number(&mut self) -> Result<i64> {
        match self.bump() {
            Token::Number(n) => Ok(n),
            other => Err(Error::syntax(self.loc(), format!("expected number, found {other:?}"))),
        }
    }

    fn expect_string(&mut self) -> Result<String> {
        match self.bump() {
            Token::Str(s) => Ok(s),
            other => Err(Error::syntax(self.loc(), format!("expected string, found {other:?}"))),
        }
    }

    /// A "name" in many grammar positions can be a bare identifier, a
    /// `<KeyName>`, or a quoted string (used for type/led names).
    fn expect_name(&mut self) -> Result<String> {
        match self.bump() {
            Token::Ident(s) => Ok(s),
            Token::KeyName(s) => Ok(s),
            Token::Str(s) => Ok(s),
            other => Err(Error::syntax(self.loc(), format!("expected name, found {other:?}"))),
        }
    }

    fn parse_top(&mut self) -> Result<XkbFile> {
        let mut file = XkbFile::default();
        if matches!(self.peek(), Token::Ident(s) if s == "xkb_keymap") {
            self.bump();
            self.expect(&Token::LBrace)?;
            while self.peek() != &Token::RBrace {
                file.sections.push(self.parse_section()?);
            }
            self.expect(&Token::RBrace)?;
            self.expect(&Token::Semi)?;
        } else {
            while self.peek() != &Token::Eof {
                file.sections.push(self.parse_section()?);
            }
        }
        Ok(file)
    }

    fn parse_merge_prefix(&mut self) -> MergeOp {
        match self.peek() {
            Token::Plus => {
                self.bump();
                MergeOp::Augment
            }
            Token::Pipe => {
                self.bump();
                MergeOp::Override
            }
            Token::Caret => {
                self.bump();
                MergeOp::Replace
            }
            _ => MergeOp::Augment,
        }
    }

    fn parse_section(&mut self) -> Result<Section> {
        let merge = self.parse_merge_prefix();
        let kind_word = self.expect_ident()?;
        let kind = match kind_word.as_str() {
            "xkb_keycodes" => SectionKind::Keycodes,
            "xkb_types" => SectionKind::Types,
            "xkb_compatibility" | "xkb_compat" => SectionKind::Compat,
            "xkb_symbols" => SectionKind::Symbols,
            "xkb_geometry" => SectionKind::Geometry,
            other => {
                return Err(Error::syntax(
                    self.loc(),
                    format!("unknown section keyword {other}"),
                ))
            }
        };
        let name = if let Token::Str(_) = self.peek() {
            self.expect_string()?
        } else {
            String::new()
        };
        self.expect(&Token::LBrace)?;
        let mut statements = Vec::new();
        while self.peek() != &Token::RBrace {
            statements.push(self.parse_statement(kind)?);
        }
        self.expect(&Token::RBrace)?;
        self.expect(&Token::Semi)?;
        Ok(Section {
            kind,
            name,
            merge,
            statements,
        })
    }

    fn parse_statement(&mut self, kind: SectionKind) -> Result<Statement> {
        if matches!(self.peek(), Token::Ident(s) if s == "include") {
            self.bump();
            let spec = self.expect_string()?;
            self.expect(&Token::Semi)?;
            return Ok(Statement::VarSet {
                name: "include".into(),
                value: vec![MaskTerm::Name(spec)],
            });
        }
        match kind {
            SectionKind::Keycodes => self.parse_keycodes_statement(),
            SectionKind::Types => self.parse_types_statement(),
            SectionKind::Compat => self.parse_compat_statement(),
            SectionKind::Symbols => self.parse_symbols_statement(),
            SectionKind::Geometry => self.skip_statement().map(|_| Statement::VarSet {
                name: "geometry".into(),
                value: vec![],
            }),
        }
    }

    fn skip_statement(&mut self) -> Result<()> {
        let mut depth = 0i32;
        loop {
            match self.bump() {
                Token::LBrace => depth += 1,
                Token::RBrace => depth -= 1,
                Token::Semi if depth <= 0 => return Ok(()),
                Token::Eof => return Err(Error::syntax(self.loc(), "unexpected end of input")),
                _ => {}
            }
        }
    }

    fn parse_keycodes_statement(&mut self) -> Result<Statement> {
        if matches!(self.peek(), Token::Ident(s) if s == "alias") {
            self.bump();
            let alias = self.expect_name()?;
            self.expect(&Token::Equals)?;
            let real = self.expect_name()?;
            self.expect(&Token::Semi)?;
            return Ok(Statement::Alias { alias, real });
        }
        if matches!(self.peek(), Token::Ident(s) if s == "indicator") {
            self.bump();
            let index = self.expect_number()? as u32;
            self.expect(&Token::Equals)?;
            let name = self.expect_string()?;
            self.expect(&Token::Semi)?;
            return Ok(Statement::IndicatorName { index, name });
        }
        let name = self.expect_name()?;
        self.expect(&Token::Equals)?;
        let value = self.expect_number()? as u32;
        self.expect(&Token::Semi)?;
        Ok(Statement::KeycodeDef { name, value })
    }

    fn parse_mask_expr(&mut self) -> Result<MaskExpr> {
        let mut terms = Vec::new();
        loop {
            match self.bump() {
                Token::Ident(s) => terms.push(MaskTerm::Name(s)),
                Token::Number(n) => terms.push(MaskTerm::Number(n as u32)),
                other => {
                    return Err(Error::syntax(
                        self.loc(),
                        format!("expected modifier mask term, found {other:?}"),
                    ))
                }
            }
            if self.peek() == &Token::Plus {
                self.bump();
                continue;
            }
            break;
        }
        Ok(terms)
    }

    fn parse_virtual_mods(&mut self) -> Result<Statement> {
        self.bump(); // 'virtual_modifiers'
        let mut mods = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let mask = if self.peek() == &Token::Equals {
                self.bump();
                Some(self.parse_mask_expr()?)
            } else {
                None
            };
            mods.push((name, mask));
            if self.peek() == &Token::Comma {
                self.bump();
                continue;
            }
            break;
        }
        self.expect(&Token::Semi)?;
        Ok(Statement::VirtualMods(mods))
    }

    fn parse_types_statement(&mut self) -> Result<Statement> {
        if matches!(self.peek(), Token::Ident(s) if s == "virtual_modifiers") {
            return self.parse_virtual_mods();
        }
        if matches!(self.peek(), Token::Ident(s) if s == "type") {
            self.bump();
            let name = self.expect_string()?;
            self.expect(&Token::LBrace)?;
            let mut ty = TypeDef {
                name,
                mods: vec![],
                level_names: vec![],
                entries: vec![],
                preserve: vec![],
            };
            while self.peek() != &Token::RBrace {
                let field = self.expect_ident()?;
                match field.as_str() {
                    "modifiers" => {
                        self.expect(&Token::Equals)?;
                        ty.mods = self.parse_mask_expr()?;
                    }
                    "map" => {
                        self.expect(&Token::LBracket)?;
                        let mods = self.parse_mask_expr()?;
                        self.expect(&Token::RBracket)?;
                        self.expect(&Token::Equals)?;
                        let level = self.expect_number()? as u32;
                        ty.entries.push(KeyTypeEntrySpec { mods, level });
                    }
                    "preserve" => {
                        self.expect(&Token::LBracket)?;
                        let mods = self.parse_mask_expr()?;
                        self.expect(&Token::RBracket)?;
                        self.expect(&Token::Equals)?;
                        let preserve = self.parse_mask_expr()?;
                        ty.preserve.push((mods, preserve));
                    }
                    "level_name" => {
                        self.expect(&Token::LBracket)?;
                        let idx = self.expect_number()? as u32;
                        self.expect(&Token::RBracket)?;
                        self.expect(&Token::Equals)?;
                        let name = self.expect_string()?;
                        ty.level_names.push((idx, name));
                    }
                    other => {
                        return Err(Error::syntax(
                            self.loc(),
                            format!("unknown field {other} in type body"),
                        ))
                    }
                }
                self.expect(&Token::Semi)?;
            }
            self.expect(&Token::RBrace)?;
            self.expect(&Token::Semi)?;
            return Ok(Statement::Type(ty));
        }
        self.parse_generic_varset()
    }

    fn parse_generic_varset(&mut self) -> Result<Statement> {
        let name = self.expect_ident()?;
        self.expect(&Token::Equals)?;
        let value = self.parse_mask_expr()?;
        self.expect(&Token::Semi)?;
        Ok(Statement::VarSet { name, value })
    }

    fn parse_action_list(&mut self) -> Result<Vec<ActionDef>> {
        self.expect(&Token::LBracket)?;
        let mut actions = Vec::new();
        while self.peek() != &Token::RBracket {
            actions.push(self.parse_action()?);
            if self.peek() == &Token::Comma {
                self.bump();
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(actions)
    }

    fn parse_action(&mut self) -> Result<ActionDef> {
        let name = self.expect_ident()?;
        let mut args = Vec::new();
        if self.peek() == &Token::LParen {
            self.bump();
            while self.peek() != &Token::RParen {
                let arg_name = self.expect_ident()?;
                self.expect(&Token::Equals)?;
                let value = match self.peek().clone() {
                    Token::Ident(s) if s == "True" || s == "False" => {
                        self.bump();
                        ActionArgValue::Bool(s == "True")
                    }
                    Token::Number(_) => ActionArgValue::Number(self.expect_number()?),
                    Token::Ident(_) => {
                        let first = self.expect_ident()?;
                        if self.peek() == &Token::Plus {
                            let mut mask = vec![MaskTerm::Name(first)];
                            while self.peek() == &Token::Plus {
                                self.bump();
                                match self.bump() {
                                    Token::Ident(s) => mask.push(MaskTerm::Name(s)),
                                    other => {
                                        return Err(Error::syntax(
                                            self.loc(),
                                            format!("expected mask term, found {other:?}"),
                                        ))
                                    }
                                }
                            }
                            ActionArgValue::Mask(mask)
                        } else {
                            ActionArgValue::Ident(first)
                        }
                    }
                    other => {
                        return Err(Error::syntax(
                            self.loc(),
                            format!("unexpected action argument {other:?}"),
                        ))
                    }
                };
                args.push(ActionArg {
                    name: arg_name,
                    value,
                });
                if self.peek() == &Token::Comma {
                    self.bump();
                }
            }
            self.expect(&Token::RParen)?;
        }
        Ok(ActionDef { name, args })
    }

    fn parse_compat_statement(&mut self) -> Result<Statement> {
        if matches!(self.peek(), Token::Ident(s) if s == "virtual_modifiers") {
            return self.parse_virtual_mods();
        }
        if matches!(self.peek(), Token::Ident(s) if s == "interpret") {
            self.bump();
            let sym = match self.peek().clone() {
                Token::Ident(s) if s == "Any" => {
                    self.bump();
                    None
                }
                Token::Ident(s) => {
                    self.bump();
                    Some(s)
                }
                other => {
                    return Err(Error::syntax(
                        self.loc(),
                        format!("expected keysym name in interpret, found {other:?}"),
                    ))
                }
            };
            let mut mods = Vec::new();
            let mut match_op = MatchOpKind::None;
            let mut level_one_only = false;
            if self.peek() == &Token::Plus {
                self.bump();
                let op_name = self.expect_ident()?;
                self.expect(&Token::LParen)?;
                mods = self.parse_mask_expr()?;
                self.expect(&Token::RParen)?;
                match_op = match op_name.as_str() {
                    "AnyOfOrNone" => MatchOpKind::AnyOrNone,
                    "AnyOf" => MatchOpKind::Any,
                    "AllOf" => MatchOpKind::All,
                    "Exactly" => MatchOpKind::Exactly,
                    "NoneOf" => MatchOpKind::None,
                    other => {
                        return Err(Error::syntax(
                            self.loc(),
                            format!("unknown match operator {other}"),
                        ))
                    }
                };
            }
            self.expect(&Token::LBrace)?;
            let mut actions = Vec::new();
            let mut repeat = None;
            let mut virtual_mod = None;
            while self.peek() != &Token::RBrace {
                let field = self.expect_ident()?;
                self.expect(&Token::Equals)?;
                match field.as_str() {
                    "action" => actions.push(self.parse_single_action()?),
                    "repeat" => {
                        let v = self.expect_ident()?;
                        repeat = Some(v == "True");
                    }
                    "virtualModifier" => {
                        virtual_mod = Some(self.expect_ident()?);
                    }
                    "useModMapMods" => {
                        let v = self.expect_ident()?;
                        level_one_only = v == "level1";
                    }
                    other => {
                        return Err(Error::syntax(
                            self.loc(),
                            format!("unknown field {other} in interpret body"),
                        ))
                    }
                }
                self.expect(&Token::Semi)?;
            }
            self.expect(&Token::RBrace)?;
            self.expect(&Token::Semi)?;
            return Ok(Statement::Interpret(InterpretDef {
                sym,
                match_op,
                mods,
                level_one_only,
                repeat,
                virtual_mod,
                actions,
            }));
        }
        if matches!(self.peek(), Token::Ident(s) if s == "indicator") {
            return self.parse_led_block();
        }
        if matches!(self.peek(), Token::Ident(s) if s == "modifier_map") {
            return self.parse_modifier_map();
        }
        self.parse_generic_varset()
    }

    fn parse_single_action(&mut self) -> Result<ActionDef> {
        self.parse_action()
    }

    fn parse_led_block(&mut self) -> Result<Statement> {
        self.bump(); // 'indicator'
        let name = self.expect_string()?;
        self.expect(&Token::LBrace)?;
        let mut led = LedDef {
            name,
            which_groups: None,
            groups: None,
            which_mods: None,
            mods: None,
            controls: None,
        };
        while self.peek() != &Token::RBrace {
            let field = self.expect_ident()?;
            self.expect(&Token::Equals)?;
            let value = self.parse_mask_expr()?;
            match field.as_str() {
                "whichGroupState" => led.which_groups = Some(value),
                "groups" => led.groups = Some(value),
                "whichModState" => led.which_mods = Some(value),
                "modifiers" => led.mods = Some(value),
                "controls" => led.controls = Some(value),
                other => {
                    return Err(Error::syntax(
                        self.loc(),
                        format!("unknown field {other} in indicator body"),
                    ))
                }
            }
            self.expect(&Token::Semi)?;
        }
        self.expect(&Token::RBrace)?;
        self.expect(&Token::Semi)?;
        Ok(Statement::Led(led))
    }

    fn parse_modifier_map(&mut self) -> Result<Statement> {
        self.bump(); // 'modifier_map'
        let mod_name = self.expect_ident()?;
        self.expect(&Token::LBrace)?;
        let mut keys = Vec::new();
        while self.peek() != &Token::RBrace {
            keys.push(self.expect_name()?);
            if self.peek() == &Token::Comma {
                self.bump();
            }
        }
        self.expect(&Token::RBrace)?;
        self.expect(&Token::Semi)?;
        Ok(Statement::ModMap { mod_name, keys })
    }

    fn parse_symbols_statement(&mut self) -> Result<Statement> {
        if matches!(self.peek(), Token::Ident(s) if s == "virtual_modifiers") {
            return self.parse_virtual_mods();
        }
        if matches!(self.peek(), Token::Ident(s) if s == "modifier_map") {
            return self.parse_modifier_map();
        }
        if matches!(self.peek(), Token::Ident(s) if s == "key") {
            self.bump();
            let name = self.expect_name()?;
            self.expect(&Token::LBrace)?;
            let mut key = KeyDef {
                name,
                groups: Vec::new(),
                type_override: Vec::new(),
                vmodmap: None,
                repeats: None,
            };
            while self.peek() != &Token::RBrace {
                match self.peek().clone() {
                    Token::LBracket => {
                        self.bump();
                        let syms = self.parse_sym_list()?;
                        key.groups.push(GroupSpec {
                            group_index: None,
                            syms,
                            actions: None,
                        });
                    }
                    Token::Ident(field) => {
                        self.bump();
                        match field.as_str() {
                            "symbols" => {
                                let idx = self.parse_optional_group_index()?;
                                self.expect(&Token::Equals)?;
                                self.expect(&Token::LBracket)?;
                                let syms = self.parse_sym_list()?;
                                key.groups.push(GroupSpec {
                                    group_index: idx,
                                    syms,
                                    actions: None,
                                });
                            }
                            "actions" => {
                                let idx = self.parse_optional_group_index()?;
                                self.expect(&Token::Equals)?;
                                let actions = self.parse_action_list()?;
                                if let Some(group) = key
                                    .groups
                                    .iter_mut()
                                    .find(|g| g.group_index == idx)
                                {
                                    group.actions = Some(actions);
                                } else {
                                    key.groups.push(GroupSpec {
                                        group_index: idx,
                                        syms: vec![],
                                        actions: Some(actions),
                                    });
                                }
                            }
                            "type" => {
                                let idx = self.parse_optional_group_index()?;
                                self.expect(&Token::Equals)?;
                                let ty_name = self.expect_string()?;
                                key.type_override.push((idx, ty_name));
                            }
                            "virtualMods" => {
                                self.expect(&Token::Equals)?;
                                key.vmodmap = Some(self.parse_mask_expr()?);
                            }
                            "repeat" => {
                                self.expect(&Token::Equals)?;
                                let v = self.expect_ident()?;
                                key.repeats = Some(v == "True");
                            }
                            other => {
                                return Err(Error::syntax(
                                    self.loc(),
                                    format!("unknown field {other} in key body"),
                                ))
                            }
                        }
                    }
                    other => {
                        return Err(Error::syntax(
                            self.loc(),
                            format!("unexpected token {other:?} in key body"),
                        ))
                    }
                }
                if self.peek() == &Token::Comma {
                    self.bump();
                }
            }
            self.expect(&Token::RBrace)?;
            self.expect(&Token::Semi)?;
            return Ok(Statement::Key(key));
        }
        self.parse_generic_varset()
    }

    fn parse_optional_group_index(&mut self) -> Result<Option<u32>> {
        if self.peek() == &Token::LBracket {
            self.bump();
            let name = self.expect_ident()?;
            self.expect(&Token::RBracket)?;
            let digits: String = name.chars().filter(|c| c.is_ascii_digit()).collect();
            return Ok(digits.parse::<u32>().ok());
        }
        Ok(None)
    }

    fn parse_sym_list(&mut self) -> Result<Vec<String>> {
        let mut syms = Vec::new();
        while self.peek() != &Token::RBracket {
            syms.push(self.expect_ident()?);
            if self.peek() == &Token::Comma {
                self.bump();
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(syms)
    }
}
