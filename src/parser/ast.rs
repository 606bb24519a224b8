//! The uncompiled, include-expanded parse tree, spec §4.2.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Keycodes,
    Types,
    Compat,
    Symbols,
    Geometry,
}

/// Include merge operators, spec §4.2: `+` augment (existing wins), `|`
/// override (new wins), `^` replace (full substitution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeOp {
    #[default]
    Augment,
    Override,
    Replace,
}

/// One term of a modifier-mask expression (`Shift+Control`, a bare
/// number, or a virtual modifier name); the full expression is the
/// bitwise-OR of its terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskTerm {
    Name(String),
    Number(u32),
}

pub type MaskExpr = Vec<MaskTerm>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOpKind {
    None,
    AnyOrNone,
    Any,
    All,
    Exactly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionArg {
    pub name: String,
    pub value: ActionArgValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionArgValue {
    Mask(MaskExpr),
    Ident(String),
    Number(i64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDef {
    pub name: String,
    pub args: Vec<ActionArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    /// 1-based group index, e.g. the `2` in `symbols[Group2]`; `None`
    /// means "next implicit group".
    pub group_index: Option<u32>,
    pub syms: Vec<String>,
    pub actions: Option<Vec<ActionDef>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTypeEntrySpec {
    pub mods: MaskExpr,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub name: String,
    pub mods: MaskExpr,
    pub level_names: Vec<(u32, String)>,
    pub entries: Vec<KeyTypeEntrySpec>,
    pub preserve: Vec<(MaskExpr, MaskExpr)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpretDef {
    /// `None` is the `Any` sym wildcard.
    pub sym: Option<String>,
    pub match_op: MatchOpKind,
    pub mods: MaskExpr,
    pub level_one_only: bool,
    pub repeat: Option<bool>,
    pub virtual_mod: Option<String>,
    pub actions: Vec<ActionDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedDef {
    pub name: String,
    pub which_groups: Option<MaskExpr>,
    pub groups: Option<MaskExpr>,
    pub which_mods: Option<MaskExpr>,
    pub mods: Option<MaskExpr>,
    pub controls: Option<MaskExpr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDef {
    pub name: String,
    pub groups: Vec<GroupSpec>,
    pub type_override: Vec<(Option<u32>, String)>,
    pub vmodmap: Option<MaskExpr>,
    pub repeats: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    KeycodeDef { name: String, value: u32 },
    Alias { alias: String, real: String },
    IndicatorName { index: u32, name: String },
    VirtualMods(Vec<(String, Option<MaskExpr>)>),
    Type(TypeDef),
    Interpret(InterpretDef),
    ModMap { mod_name: String, keys: Vec<String> },
    Led(LedDef),
    Key(KeyDef),
    /// Any `name = value;` statement this crate's subset of the grammar
    /// doesn't special-case (e.g. `xkb_keycodes` minimum/maximum hints).
    VarSet { name: String, value: MaskExpr },
}

#[derive(Debug, Clone)]
pub struct Section {
    pub kind: SectionKind,
    pub name: String,
    pub merge: MergeOp,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Default)]
pub struct XkbFile {
    pub sections: Vec<Section>,
}
