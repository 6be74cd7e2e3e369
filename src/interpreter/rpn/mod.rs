//! # RPN Math Engine
//!
//! A shunting-yard evaluator over an operand stack and an operator stack, shared
//! by plain math and by selection expressions.
//!
//! ## Skipping
//!
//! `cond ? a : b` and `and`/`or` never reduce their dead operand. Once the
//! condition (or the left operand) is known, the engine enters a skip state in
//! which operand and operator pushes are discarded until the dead region ends,
//! so a function call in that region is never made.
//!
//! ## Barriers
//!
//! Parentheses, calls, method calls, indexing, array and map literals, and a
//! live ternary arm sit on the operator stack as barriers. Reductions never
//! cross a barrier, and every barrier records where its operands start.

pub mod format;
pub mod functions;
pub mod operators;
pub mod properties;

use super::errors::{ScriptError, ScriptResult};
use super::host::DataStore;
use super::types::{Bracket, Domain, ItemSet, Op, Token, TokenKind, Value};
use indexmap::IndexMap;

/* ===================== Context ===================== */

/// What the engine needs from the running interpreter
pub trait MathContext {
    /// Call a script, host, or built-in function
    fn call_function(&mut self, name: &str, args: Vec<Value>) -> ScriptResult<Value>;

    fn store(&self) -> &dyn DataStore;
}

/// Evaluation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Math,
    /// Set algebra; no short-circuit, empty input is the empty atom set
    Selection,
    /// Syntax only: nothing is called, every result is a placeholder
    Check,
}

/* ===================== Stack Entries ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MathOp {
    Binary(Op),
    UnaryMinus,
    Not,
}

impl MathOp {
    fn precedence(&self) -> u8 {
        match self {
            MathOp::UnaryMinus => 10,
            MathOp::Not => 5,
            MathOp::Binary(op) => precedence(*op),
        }
    }

    fn arity(&self) -> usize {
        match self {
            MathOp::UnaryMinus | MathOp::Not => 1,
            MathOp::Binary(_) => 2,
        }
    }
}

fn precedence(op: Op) -> u8 {
    match op {
        Op::Comma => 1,
        Op::Question | Op::Colon => 2,
        Op::Or | Op::Xor => 3,
        Op::And => 4,
        Op::Not => 5,
        Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Like => 6,
        Op::Plus | Op::Minus => 7,
        Op::Times | Op::Divide | Op::LeftDivide | Op::Modulo => 8,
        Op::Power => 9,
    }
}

fn right_associative(op: Op) -> bool {
    matches!(op, Op::Power | Op::Question | Op::Colon)
}

#[derive(Debug, Clone)]
enum OpEntry {
    Op(MathOp),
    Paren { base: usize },
    Call { name: String, base: usize },
    /// `base` is the receiver's slot
    Method { name: String, base: usize },
    /// `base` is the container's slot
    Index { base: usize },
    ArrayLit { base: usize },
    MapLit { base: usize },
    /// Live true arm of a ternary
    Ternary { base: usize },
}

impl OpEntry {
    /// First operand slot owned by this barrier
    fn floor(&self) -> Option<usize> {
        match self {
            OpEntry::Op(_) => None,
            OpEntry::Method { base, .. } | OpEntry::Index { base } => Some(base + 1),
            OpEntry::Paren { base }
            | OpEntry::Call { base, .. }
            | OpEntry::ArrayLit { base }
            | OpEntry::MapLit { base }
            | OpEntry::Ternary { base } => Some(*base),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipKind {
    /// Condition was false: discard up to the matching `:`
    TrueArm,
    /// True arm finished: discard the false arm
    FalseArm,
    /// Left operand decided `and`/`or`: discard up to an operator binding no tighter
    ShortCircuit { prec: u8 },
}

#[derive(Debug, Clone, Copy)]
struct Skip {
    kind: SkipKind,
    /// Open brackets inside the dead region
    nesting: usize,
    /// Unmatched `?` inside the dead region
    ternaries: usize,
}

/* ===================== Engine ===================== */

/// One evaluation's stacks; nested evaluations allocate their own engine
#[derive(Debug)]
pub struct MathEngine {
    xstack: Vec<Value>,
    ostack: Vec<OpEntry>,
    skip: Option<Skip>,
    was_x: bool,
    mode: EngineMode,
}

impl MathEngine {
    pub fn new(mode: EngineMode) -> Self {
        Self {
            xstack: Vec::new(),
            ostack: Vec::new(),
            skip: None,
            was_x: false,
            mode,
        }
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    /// Inside a dead ternary arm or short-circuited operand
    pub fn is_skipping(&self) -> bool {
        self.skip.is_some()
    }

    /// Last push left a complete operand on the stack
    pub fn was_operand(&self) -> bool {
        self.was_x
    }

    fn placeholder() -> Value {
        Value::Int(0)
    }

    /* ---------- operands ---------- */

    /// Push an operand; `false` means two operands in a row
    pub fn push_operand(&mut self, value: Value, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        if self.skip.is_some() {
            self.was_x = true;
            return Ok(true);
        }
        if self.was_x {
            // `x -1`: a negative literal right after an operand is a subtraction
            let positive = match value {
                Value::Int(i) if i < 0 => Value::Int(i.wrapping_neg()),
                Value::Float(f) if f < 0.0 => Value::Float(-f),
                _ => return Ok(false),
            };
            if !self.push_binary(Op::Minus, ctx)? {
                return Ok(false);
            }
            return self.push_operand(positive, ctx);
        }
        self.xstack.push(value);
        self.was_x = true;
        Ok(true)
    }

    /// Apply `.name` to the operand on top of the stack
    pub fn push_property(&mut self, name: &str, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        if self.skip.is_some() {
            return Ok(true);
        }
        if !self.was_x {
            return Ok(false);
        }
        let Some(target) = self.xstack.pop() else {
            return Ok(false);
        };
        let value = if self.mode == EngineMode::Check {
            Self::placeholder()
        } else {
            properties::get_property(&target, name, ctx)?
        };
        self.xstack.push(value);
        Ok(true)
    }

    /* ---------- operators ---------- */

    /// Push an operator, bracket, function opener, or method opener
    ///
    /// `false` means the token cannot appear here.
    pub fn push_operator(&mut self, token: &Token, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        if self.skip.is_some() && self.skip_token(token) {
            return Ok(true);
        }
        match &token.kind {
            TokenKind::Operator(op) => self.push_op(*op, ctx),
            TokenKind::Bracket(b) => self.push_bracket(*b, ctx),
            TokenKind::Function(name) => {
                if self.was_x {
                    return Ok(false);
                }
                self.ostack.push(OpEntry::Call {
                    name: name.clone(),
                    base: self.xstack.len(),
                });
                Ok(true)
            }
            TokenKind::Method(name) => {
                if !self.was_x || self.xstack.is_empty() {
                    return Ok(false);
                }
                self.ostack.push(OpEntry::Method {
                    name: name.clone(),
                    base: self.xstack.len() - 1,
                });
                self.was_x = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Consume a token inside a dead region; `false` ends the skip and lets the
    /// token be processed normally
    fn skip_token(&mut self, token: &Token) -> bool {
        let Some(skip) = self.skip.as_mut() else {
            return false;
        };
        let opens = match &token.kind {
            TokenKind::Function(_) | TokenKind::Method(_) => true,
            TokenKind::Bracket(b) => b.is_open(),
            _ => false,
        };
        if opens {
            skip.nesting += 1;
            self.was_x = false;
            return true;
        }
        if let TokenKind::Bracket(_) = &token.kind {
            if skip.nesting > 0 {
                skip.nesting -= 1;
                self.was_x = true;
                return true;
            }
            // a closer at our level ends any skip except an unterminated true arm
            if skip.kind == SkipKind::TrueArm {
                return true;
            }
            self.skip = None;
            return false;
        }
        let TokenKind::Operator(op) = &token.kind else {
            return true;
        };
        if skip.nesting > 0 {
            self.was_x = false;
            return true;
        }
        match (skip.kind, op) {
            (SkipKind::ShortCircuit { prec }, op) if precedence(*op) <= prec => {
                self.skip = None;
                false
            }
            (_, Op::Question) => {
                skip.ternaries += 1;
                self.was_x = false;
                true
            }
            (_, Op::Colon) if skip.ternaries > 0 => {
                skip.ternaries -= 1;
                self.was_x = false;
                true
            }
            (SkipKind::TrueArm, Op::Colon) => {
                // the false arm is live
                self.skip = None;
                self.was_x = false;
                true
            }
            (SkipKind::FalseArm, Op::Colon | Op::Comma) => {
                self.skip = None;
                false
            }
            _ => {
                self.was_x = false;
                true
            }
        }
    }

    fn push_op(&mut self, op: Op, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        match op {
            Op::Not => {
                if self.was_x {
                    return Ok(false);
                }
                self.ostack.push(OpEntry::Op(MathOp::Not));
                Ok(true)
            }
            Op::Minus if !self.was_x => {
                self.ostack.push(OpEntry::Op(MathOp::UnaryMinus));
                Ok(true)
            }
            Op::Plus if !self.was_x => Ok(true),
            Op::Question => self.push_question(ctx),
            Op::Colon => self.push_colon(ctx),
            Op::Comma => self.push_comma(ctx),
            _ => self.push_binary(op, ctx),
        }
    }

    fn push_binary(&mut self, op: Op, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        if !self.was_x {
            return Ok(false);
        }
        let prec = precedence(op);
        if !self.reduce_while(ctx, |top| {
            top > prec || (top == prec && !right_associative(op))
        })? {
            return Ok(false);
        }
        if self.mode == EngineMode::Math && matches!(op, Op::And | Op::Or) {
            if let Some(left) = self.xstack.last() {
                if !matches!(left, Value::Set(_)) {
                    let decided = match op {
                        Op::And => (!left.as_bool()).then_some(false),
                        _ => left.as_bool().then_some(true),
                    };
                    if let Some(result) = decided {
                        self.xstack.pop();
                        self.xstack.push(Value::Bool(result));
                        self.skip = Some(Skip {
                            kind: SkipKind::ShortCircuit { prec },
                            nesting: 0,
                            ternaries: 0,
                        });
                        self.was_x = false;
                        return Ok(true);
                    }
                }
            }
        }
        self.ostack.push(OpEntry::Op(MathOp::Binary(op)));
        self.was_x = false;
        Ok(true)
    }

    fn push_question(&mut self, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        if self.mode == EngineMode::Check {
            return self.push_binary(Op::Question, ctx);
        }
        if !self.was_x || !self.reduce_while(ctx, |top| top > precedence(Op::Question))? {
            return Ok(false);
        }
        let Some(cond) = self.pop_operand() else {
            return Ok(false);
        };
        if cond.as_bool() {
            self.ostack.push(OpEntry::Ternary {
                base: self.xstack.len(),
            });
        } else {
            self.skip = Some(Skip {
                kind: SkipKind::TrueArm,
                nesting: 0,
                ternaries: 0,
            });
        }
        self.was_x = false;
        Ok(true)
    }

    fn push_colon(&mut self, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        if !self.was_x {
            return Ok(false);
        }
        if !self.reduce_to_barrier(ctx)? {
            return Ok(false);
        }
        match self.ostack.last() {
            Some(OpEntry::MapLit { .. }) => {
                self.was_x = false;
                Ok(true)
            }
            Some(OpEntry::Ternary { .. }) => {
                self.ostack.pop();
                self.skip = Some(Skip {
                    kind: SkipKind::FalseArm,
                    nesting: 0,
                    ternaries: 0,
                });
                // the true arm's value stands
                self.was_x = true;
                Ok(true)
            }
            _ if self.mode == EngineMode::Check => self.push_binary(Op::Colon, ctx),
            _ => Ok(false),
        }
    }

    fn push_comma(&mut self, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        if !self.was_x || !self.reduce_to_barrier(ctx)? {
            return Ok(false);
        }
        match self.ostack.last() {
            Some(
                OpEntry::Call { .. }
                | OpEntry::Method { .. }
                | OpEntry::ArrayLit { .. }
                | OpEntry::MapLit { .. },
            ) => {
                self.was_x = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /* ---------- brackets ---------- */

    fn push_bracket(&mut self, b: Bracket, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        let base = self.xstack.len();
        match b {
            Bracket::LeftParen => {
                if self.was_x {
                    return Ok(false);
                }
                self.ostack.push(OpEntry::Paren { base });
                Ok(true)
            }
            Bracket::LeftSquare => {
                if self.was_x {
                    self.ostack.push(OpEntry::Index { base: base - 1 });
                } else {
                    self.ostack.push(OpEntry::ArrayLit { base });
                }
                self.was_x = false;
                Ok(true)
            }
            Bracket::MapOpen => {
                if self.was_x {
                    return Ok(false);
                }
                self.ostack.push(OpEntry::MapLit { base });
                Ok(true)
            }
            Bracket::RightParen => self.close_paren(ctx),
            Bracket::RightSquare => self.close_square(ctx),
            Bracket::MapClose => self.close_map(ctx),
            Bracket::ExpressionBegin | Bracket::ExpressionEnd => Ok(false),
        }
    }

    fn close_paren(&mut self, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        if !self.reduce_to_barrier(ctx)? {
            return Ok(false);
        }
        let value = match self.ostack.pop() {
            Some(OpEntry::Paren { base }) => {
                let n = self.xstack.len() - base;
                match n {
                    1 => return self.close_with_top(),
                    0 if self.mode == EngineMode::Selection => {
                        Value::Set(ItemSet::empty(Domain::Atoms))
                    }
                    _ => return Ok(false),
                }
            }
            Some(OpEntry::Call { name, base }) => {
                if !self.was_x && self.xstack.len() > base {
                    return Ok(false);
                }
                let args = self.xstack.split_off(base);
                if self.mode == EngineMode::Check {
                    Self::placeholder()
                } else {
                    ctx.call_function(&name, args)?
                }
            }
            Some(OpEntry::Method { name, base }) => {
                if !self.was_x && self.xstack.len() > base + 1 {
                    return Ok(false);
                }
                let args = self.xstack.split_off(base + 1);
                let Some(receiver) = self.xstack.pop() else {
                    return Ok(false);
                };
                if self.mode == EngineMode::Check {
                    Self::placeholder()
                } else {
                    properties::call_method(&receiver, &name, &args, ctx)?
                }
            }
            _ => return Ok(false),
        };
        self.xstack.push(value);
        self.was_x = true;
        Ok(true)
    }

    fn close_with_top(&mut self) -> ScriptResult<bool> {
        self.was_x = true;
        Ok(true)
    }

    fn close_square(&mut self, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        if !self.reduce_to_barrier(ctx)? {
            return Ok(false);
        }
        let value = match self.ostack.pop() {
            Some(OpEntry::Index { base }) => {
                if self.xstack.len() != base + 2 {
                    return Ok(false);
                }
                let (Some(index), Some(container)) = (self.xstack.pop(), self.xstack.pop()) else {
                    return Ok(false);
                };
                if self.mode == EngineMode::Check {
                    Self::placeholder()
                } else {
                    properties::index_value(&container, &index)
                }
            }
            Some(OpEntry::ArrayLit { base }) => {
                if !self.was_x && self.xstack.len() > base {
                    return Ok(false);
                }
                Value::Array(self.xstack.split_off(base))
            }
            _ => return Ok(false),
        };
        self.xstack.push(value);
        self.was_x = true;
        Ok(true)
    }

    fn close_map(&mut self, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        if !self.reduce_to_barrier(ctx)? {
            return Ok(false);
        }
        let Some(OpEntry::MapLit { base }) = self.ostack.pop() else {
            return Ok(false);
        };
        let items = self.xstack.split_off(base);
        if items.len() % 2 != 0 {
            return Ok(false);
        }
        let mut map = IndexMap::new();
        let mut it = items.into_iter();
        while let (Some(k), Some(v)) = (it.next(), it.next()) {
            map.insert(k.to_string(), v);
        }
        self.xstack.push(Value::Map(map));
        self.was_x = true;
        Ok(true)
    }

    /* ---------- reduction ---------- */

    fn floor(&self) -> usize {
        self.ostack
            .iter()
            .rev()
            .find_map(|e| e.floor())
            .unwrap_or(0)
    }

    fn pop_operand(&mut self) -> Option<Value> {
        if self.xstack.len() > self.floor() {
            self.xstack.pop()
        } else {
            None
        }
    }

    /// Reduce operators (not barriers) while `pred(top precedence)` holds
    fn reduce_while(
        &mut self,
        ctx: &mut dyn MathContext,
        pred: impl Fn(u8) -> bool,
    ) -> ScriptResult<bool> {
        while let Some(OpEntry::Op(op)) = self.ostack.last() {
            if !pred(op.precedence()) {
                break;
            }
            if !self.reduce_top(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn reduce_to_barrier(&mut self, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        self.reduce_while(ctx, |_| true)
    }

    fn reduce_top(&mut self, ctx: &mut dyn MathContext) -> ScriptResult<bool> {
        let Some(OpEntry::Op(op)) = self.ostack.pop() else {
            return Ok(false);
        };
        if self.xstack.len() < self.floor() + op.arity() {
            return Ok(false);
        }
        let result = if op.arity() == 1 {
            let Some(v) = self.xstack.pop() else {
                return Ok(false);
            };
            match op {
                _ if self.mode == EngineMode::Check => Self::placeholder(),
                MathOp::UnaryMinus => operators::negate(&v)?,
                _ => {
                    let store = ctx.store();
                    operators::not(&v, |d| store.item_count(d))
                }
            }
        } else {
            let (Some(b), Some(a)) = (self.xstack.pop(), self.xstack.pop()) else {
                return Ok(false);
            };
            match op {
                _ if self.mode == EngineMode::Check => Self::placeholder(),
                MathOp::Binary(bop) => operators::binary(bop, &a, &b)?,
                _ => return Ok(false),
            }
        };
        self.xstack.push(result);
        Ok(true)
    }

    /// Finish: reduce everything and return the single result
    pub fn drain(&mut self, ctx: &mut dyn MathContext) -> ScriptResult<Value> {
        if let Some(skip) = self.skip.take() {
            if skip.kind == SkipKind::TrueArm || skip.nesting > 0 {
                return Err(ScriptError::invalid_expression("incomplete conditional expression").into());
            }
            self.was_x = true;
        }
        if !self.xstack.is_empty() && !self.was_x {
            return Err(ScriptError::invalid_expression("expression ends with an operator").into());
        }
        if !self.reduce_to_barrier(ctx)? {
            return Err(ScriptError::invalid_expression("missing operand").into());
        }
        if !self.ostack.is_empty() {
            return Err(ScriptError::invalid_expression("unbalanced brackets").into());
        }
        match self.xstack.len() {
            0 if self.mode == EngineMode::Selection => Ok(Value::Set(ItemSet::empty(Domain::Atoms))),
            0 if self.mode == EngineMode::Check => Ok(Self::placeholder()),
            0 => Err(ScriptError::invalid_expression("empty expression").into()),
            1 => Ok(self.xstack.pop().unwrap_or_else(Self::placeholder)),
            _ => Err(ScriptError::invalid_expression("missing operator").into()),
        }
    }
}
