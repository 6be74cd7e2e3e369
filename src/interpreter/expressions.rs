//! Token walker feeding the RPN engine
//!
//! Maps compiled tokens onto [`MathEngine`] pushes. Selections hand off to the
//! selection evaluator; substitutions evaluate on a fresh engine. Each call
//! allocates its own engine, so nested evaluation never shares stacks.

use super::errors::{ScriptError, ScriptResult};
use super::rpn::{EngineMode, MathEngine};
use super::selection;
use super::types::{Bracket, Op, Statement, Token, TokenKind, Value};
use super::vm::Vm;
use std::borrow::Cow;

/// Evaluate `tokens` in `mode`
pub fn evaluate(vm: &mut Vm<'_>, tokens: &[Token], mode: EngineMode) -> ScriptResult<Value> {
    let mut engine = MathEngine::new(mode);
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        let accepted = match &token.kind {
            TokenKind::Literal => {
                let value = token.value.clone().unwrap_or(Value::Int(token.int_value));
                engine.push_operand(value, vm)?
            }
            TokenKind::Identifier(name) => {
                let value = if engine.is_skipping() || mode == EngineMode::Check {
                    Value::Int(0)
                } else {
                    vm.require_variable(name)?
                };
                engine.push_operand(value, vm)?
            }
            TokenKind::Bracket(Bracket::ExpressionBegin) => {
                let end = matching_selection_end(tokens, i)?;
                let value = if engine.is_skipping() {
                    Value::Int(0)
                } else {
                    selection::evaluate(vm, &tokens[i + 1..end], mode == EngineMode::Check)?
                };
                i = end;
                engine.push_operand(value, vm)?
            }
            TokenKind::Substitution(inner) => {
                let value = if engine.is_skipping() {
                    Value::Int(0)
                } else {
                    evaluate(vm, inner, mode)?
                };
                engine.push_operand(value, vm)?
            }
            TokenKind::PropertySelector(name) => engine.push_property(name, vm)?,
            TokenKind::Operator(_)
            | TokenKind::Bracket(_)
            | TokenKind::Function(_)
            | TokenKind::Method(_) => engine.push_operator(token, vm)?,
            _ => false,
        };
        if !accepted {
            return Err(unexpected(token).into());
        }
        i += 1;
    }
    engine.drain(vm)
}

pub(crate) fn unexpected(token: &Token) -> ScriptError {
    ScriptError::invalid_expression(format!("unexpected '{}'", token.text()))
}

/// Index of the `}` closing the selection opened at `start`
pub fn matching_selection_end(tokens: &[Token], start: usize) -> ScriptResult<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(start) {
        match token.kind {
            TokenKind::Bracket(Bracket::ExpressionBegin) => depth += 1,
            TokenKind::Bracket(Bracket::ExpressionEnd) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(ScriptError::invalid_expression("unclosed selection").into())
}

fn opens(token: &Token) -> bool {
    match &token.kind {
        TokenKind::Bracket(b) => b.is_open(),
        TokenKind::Function(_) | TokenKind::Method(_) => true,
        _ => false,
    }
}

fn closes(token: &Token) -> bool {
    matches!(&token.kind, TokenKind::Bracket(b) if !b.is_open())
}

/// Split on tokens matching `pred` at bracket depth zero
pub fn split_top_level_by<'t>(tokens: &'t [Token], pred: impl Fn(&Token) -> bool) -> Vec<&'t [Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if opens(token) {
            depth += 1;
        } else if closes(token) {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && pred(token) {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}

/// Split on top-level commas
pub fn split_top_level(tokens: &[Token]) -> Vec<&[Token]> {
    split_top_level_by(tokens, |t| t.is_op(Op::Comma))
}

/// Position of the first top-level token matching `pred`
pub fn find_top_level(tokens: &[Token], pred: impl Fn(&Token) -> bool) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        if opens(token) {
            depth += 1;
        } else if closes(token) {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && pred(token) {
            return Some(i);
        }
    }
    None
}

/* ===================== Substitution ===================== */

fn has_substitution(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .any(|t| matches!(t.kind, TokenKind::Substitution(_)))
}

/// Replace every substitution with a literal of its current value
pub fn resolve_statement<'s>(vm: &mut Vm<'_>, statement: &'s Statement) -> ScriptResult<Cow<'s, Statement>> {
    if !has_substitution(&statement.tokens) {
        return Ok(Cow::Borrowed(statement));
    }
    let mut tokens = Vec::with_capacity(statement.tokens.len());
    for token in &statement.tokens {
        match &token.kind {
            TokenKind::Substitution(inner) => {
                tokens.push(Token::literal(evaluate(vm, inner, EngineMode::Math)?));
            }
            _ => tokens.push(token.clone()),
        }
    }
    Ok(Cow::Owned(Statement::new(tokens)))
}

/// Syntax-only pass over one expression segment
pub fn check(vm: &mut Vm<'_>, tokens: &[Token]) -> ScriptResult<()> {
    if tokens.is_empty() {
        return Ok(());
    }
    evaluate(vm, tokens, EngineMode::Check).map(|_| ())
}
