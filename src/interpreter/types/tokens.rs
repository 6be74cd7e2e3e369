//! Compiled token model
//!
//! Tokens are produced once by the script compiler and never mutated by the
//! engine. Flow-control tokens carry the statement index of their structural
//! partner in `int_value`; the run-time state of that branch lives in the
//! running program's branch table, not here.

use super::values::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/* ===================== Operators ===================== */

/// Math and logic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Plus,
    Minus,
    Times,
    Divide,
    /// `\`: integer division
    LeftDivide,
    Modulo,
    Power,
    And,
    Or,
    Xor,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    Question,
    Colon,
    Comma,
}

impl Op {
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Times => "*",
            Op::Divide => "/",
            Op::LeftDivide => "\\",
            Op::Modulo => "%",
            Op::Power => "**",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Not => "not",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Like => "like",
            Op::Question => "?",
            Op::Colon => ":",
            Op::Comma => ",",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Like
        )
    }
}

/// Structural brackets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bracket {
    LeftParen,
    RightParen,
    LeftSquare,
    RightSquare,
    /// `%{`: map literal
    MapOpen,
    MapClose,
    /// `{`: selection expression
    ExpressionBegin,
    ExpressionEnd,
}

impl Bracket {
    pub fn text(&self) -> &'static str {
        match self {
            Bracket::LeftParen => "(",
            Bracket::RightParen => ")",
            Bracket::LeftSquare => "[",
            Bracket::RightSquare => "]",
            Bracket::MapOpen => "%{",
            Bracket::MapClose | Bracket::ExpressionEnd => "}",
            Bracket::ExpressionBegin => "{",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Bracket::LeftParen | Bracket::LeftSquare | Bracket::MapOpen | Bracket::ExpressionBegin
        )
    }
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    /// Operator applied by a compound assignment
    pub fn op(&self) -> Option<Op> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(Op::Plus),
            AssignOp::Sub => Some(Op::Minus),
            AssignOp::Mul => Some(Op::Times),
            AssignOp::Div => Some(Op::Divide),
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
        }
    }
}

/* ===================== Flow and Commands ===================== */

/// Flow-control keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flow {
    If,
    ElseIf,
    Else,
    For,
    While,
    Break,
    Continue,
    Switch,
    Case,
    Default,
    Try,
    Catch,
    End,
    Return,
    Goto,
    Label,
    Process,
    Push,
}

impl Flow {
    pub fn keyword(&self) -> &'static str {
        match self {
            Flow::If => "if",
            Flow::ElseIf => "elseif",
            Flow::Else => "else",
            Flow::For => "for",
            Flow::While => "while",
            Flow::Break => "break",
            Flow::Continue => "continue",
            Flow::Switch => "switch",
            Flow::Case => "case",
            Flow::Default => "default",
            Flow::Try => "try",
            Flow::Catch => "catch",
            Flow::End => "end",
            Flow::Return => "return",
            Flow::Goto => "goto",
            Flow::Label => "label",
            Flow::Process => "process",
            Flow::Push => "push",
        }
    }

    /// Keywords that open a block closed by `end`
    pub fn opens_block(&self) -> bool {
        matches!(
            self,
            Flow::If
                | Flow::For
                | Flow::While
                | Flow::Switch
                | Flow::Try
                | Flow::Process
                | Flow::Push
        )
    }

    /// Keywords whose `int_value` is a partner statement index
    pub fn has_partner(&self) -> bool {
        matches!(
            self,
            Flow::If
                | Flow::ElseIf
                | Flow::Else
                | Flow::For
                | Flow::While
                | Flow::Switch
                | Flow::Case
                | Flow::Default
                | Flow::Try
                | Flow::Catch
                | Flow::End
                | Flow::Process
                | Flow::Push
        )
    }
}

/// Built-in command verbs; anything else is `External`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Verb {
    Print,
    Delay,
    Pause,
    Load,
    Throw,
    Select,
    Define,
    Exit,
    Quit,
    External(String),
}

impl Verb {
    pub fn name(&self) -> &str {
        match self {
            Verb::Print => "print",
            Verb::Delay => "delay",
            Verb::Pause => "pause",
            Verb::Load => "load",
            Verb::Throw => "throw",
            Verb::Select => "select",
            Verb::Define => "define",
            Verb::Exit => "exit",
            Verb::Quit => "quit",
            Verb::External(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keyword {
    In,
    Var,
    As,
}

/* ===================== Item Properties ===================== */

/// Per-item properties the data store answers for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum ItemProperty {
    AtomIndex,
    Element,
    ElementNumber,
    AtomName,
    Model,
    File,
    ResidueName,
    ResidueNumber,
    Chain,
    X,
    Y,
    Z,
    Charge,
    Occupancy,
    Temperature,
    Radius,
    Symop,
    BondOrder,
    Custom(String),
}

impl ItemProperty {
    pub fn from_name(name: &str) -> ItemProperty {
        match name.to_ascii_lowercase().as_str() {
            "index" | "atomindex" => ItemProperty::AtomIndex,
            "element" => ItemProperty::Element,
            "elemno" | "elementnumber" => ItemProperty::ElementNumber,
            "atomname" => ItemProperty::AtomName,
            "model" => ItemProperty::Model,
            "file" => ItemProperty::File,
            "resname" | "group" => ItemProperty::ResidueName,
            "resno" => ItemProperty::ResidueNumber,
            "chain" => ItemProperty::Chain,
            "x" => ItemProperty::X,
            "y" => ItemProperty::Y,
            "z" => ItemProperty::Z,
            "charge" => ItemProperty::Charge,
            "occupancy" => ItemProperty::Occupancy,
            "temperature" => ItemProperty::Temperature,
            "radius" => ItemProperty::Radius,
            "symop" => ItemProperty::Symop,
            "order" | "bondorder" => ItemProperty::BondOrder,
            _ => ItemProperty::Custom(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ItemProperty::AtomIndex => "index",
            ItemProperty::Element => "element",
            ItemProperty::ElementNumber => "elemno",
            ItemProperty::AtomName => "atomname",
            ItemProperty::Model => "model",
            ItemProperty::File => "file",
            ItemProperty::ResidueName => "resname",
            ItemProperty::ResidueNumber => "resno",
            ItemProperty::Chain => "chain",
            ItemProperty::X => "x",
            ItemProperty::Y => "y",
            ItemProperty::Z => "z",
            ItemProperty::Charge => "charge",
            ItemProperty::Occupancy => "occupancy",
            ItemProperty::Temperature => "temperature",
            ItemProperty::Radius => "radius",
            ItemProperty::Symop => "symop",
            ItemProperty::BondOrder => "order",
            ItemProperty::Custom(name) => name,
        }
    }

    /// Integral identities the store may answer as a contiguous index range
    pub fn is_range_identity(&self) -> bool {
        matches!(
            self,
            ItemProperty::Model | ItemProperty::File | ItemProperty::Symop
        )
    }

    /// Properties that index the bond domain
    pub fn is_bond_property(&self) -> bool {
        matches!(self, ItemProperty::BondOrder)
    }
}

/* ===================== Tokens ===================== */

/// Token kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum TokenKind {
    Literal,
    Identifier(String),
    Operator(Op),
    Bracket(Bracket),
    /// `;` inside `for (...)` headers
    Separator,
    Assign(AssignOp),
    Flow(Flow),
    Command(Verb),
    Keyword(Keyword),
    /// `name(`: the open parenthesis is part of the token
    Function(String),
    /// `.name(`
    Method(String),
    /// `.name`
    PropertySelector(String),
    /// `property op value` inside a selection; a missing value is read from the next token
    Comparator { property: ItemProperty, op: Op },
    /// Named set inside a selection (`water`, `hetero`, a defined name)
    Predicate(String),
    /// Embedded expression resolved before the statement runs
    Substitution(Vec<Token>),
}

/// A compiled token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Integer literal value, or the partner statement index for flow tokens
    #[serde(default)]
    pub int_value: i32,
}

impl Token {
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            value: None,
            int_value: 0,
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        let int_value = match &value {
            Value::Int(i) => *i,
            _ => 0,
        };
        Self {
            kind: TokenKind::Literal,
            value: Some(value),
            int_value,
        }
    }

    pub fn ident(name: &str) -> Self {
        Self::new(TokenKind::Identifier(name.to_string()))
    }

    pub fn op(op: Op) -> Self {
        Self::new(TokenKind::Operator(op))
    }

    pub fn bracket(b: Bracket) -> Self {
        Self::new(TokenKind::Bracket(b))
    }

    pub fn flow(flow: Flow, partner: usize) -> Self {
        Self {
            kind: TokenKind::Flow(flow),
            value: None,
            int_value: partner as i32,
        }
    }

    pub fn command(verb: Verb) -> Self {
        Self::new(TokenKind::Command(verb))
    }

    pub fn flow_kind(&self) -> Option<Flow> {
        match self.kind {
            TokenKind::Flow(f) => Some(f),
            _ => None,
        }
    }

    /// Partner statement index of a flow token
    pub fn partner(&self) -> usize {
        self.int_value.unsigned_abs() as usize
    }

    pub fn is_bracket(&self, b: Bracket) -> bool {
        self.kind == TokenKind::Bracket(b)
    }

    pub fn is_op(&self, op: Op) -> bool {
        self.kind == TokenKind::Operator(op)
    }

    /// Source-like rendering used by diagnostics
    pub fn text(&self) -> String {
        match &self.kind {
            TokenKind::Literal => match &self.value {
                Some(Value::Str(s)) => format!("\"{}\"", s),
                Some(v) => v.to_string(),
                None => String::new(),
            },
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::Operator(op) => op.symbol().to_string(),
            TokenKind::Bracket(b) => b.text().to_string(),
            TokenKind::Separator => ";".to_string(),
            TokenKind::Assign(a) => a.text().to_string(),
            TokenKind::Flow(f) => f.keyword().to_string(),
            TokenKind::Command(v) => v.name().to_string(),
            TokenKind::Keyword(Keyword::In) => "in".to_string(),
            TokenKind::Keyword(Keyword::Var) => "var".to_string(),
            TokenKind::Keyword(Keyword::As) => "as".to_string(),
            TokenKind::Function(name) => format!("{}(", name),
            TokenKind::Method(name) => format!(".{}(", name),
            TokenKind::PropertySelector(name) => format!(".{}", name),
            TokenKind::Comparator { property, op } => match &self.value {
                Some(v) => format!("{}{}{}", property.name(), op.symbol(), v),
                None => format!("{}{}", property.name(), op.symbol()),
            },
            TokenKind::Predicate(name) => name.clone(),
            TokenKind::Substitution(tokens) => {
                let inner: Vec<String> = tokens.iter().map(|t| t.text()).collect();
                format!("@{{{}}}", inner.join(" "))
            }
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}
