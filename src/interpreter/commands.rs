//! Built-in commands, assignments, and the external command registry

use super::errors::{fail, Interrupt, ScriptError, ScriptResult, BAD_ARGUMENT, INVALID_EXPRESSION, UNKNOWN_COMMAND, USER_ERROR};
use super::expressions::{self, find_top_level, split_top_level};
use super::host::WaitKind;
use super::rpn::{operators, properties};
use super::selection;
use super::statements::{self, ForHeader};
use super::types::{AssignOp, Bracket, Domain, Flow, ItemProperty, ItemSet, Keyword, Next, Statement, Token, TokenKind, Value, Verb};
use super::vm::Vm;
use indexmap::IndexMap;

/* ===================== Registry ===================== */

/// Handler for a verb the engine does not implement itself
pub trait CommandHandler {
    fn execute(&mut self, vm: &mut Vm<'_>, statement: &Statement) -> ScriptResult<()>;
}

impl<F> CommandHandler for F
where
    F: FnMut(&mut Vm<'_>, &Statement) -> ScriptResult<()>,
{
    fn execute(&mut self, vm: &mut Vm<'_>, statement: &Statement) -> ScriptResult<()> {
        self(vm, statement)
    }
}

/// External command handlers by lower-case verb
#[derive(Default)]
pub struct CommandRegistry {
    handlers: IndexMap<String, Box<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, verb: &str, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(verb.to_ascii_lowercase(), handler);
    }

    pub fn contains(&self, verb: &str) -> bool {
        self.handlers.contains_key(&verb.to_ascii_lowercase())
    }

    fn get_mut(&mut self, verb: &str) -> Option<&mut Box<dyn CommandHandler>> {
        self.handlers.get_mut(&verb.to_ascii_lowercase())
    }
}

/* ===================== Dispatch ===================== */

/// Route one resolved statement by its head token
pub fn dispatch(
    vm: &mut Vm<'_>,
    commands: &mut CommandRegistry,
    stmt: &Statement,
    pc: usize,
) -> ScriptResult<Next> {
    let Some(head) = stmt.head() else {
        return Ok(Next::Advance);
    };
    match &head.kind {
        TokenKind::Flow(flow) => statements::execute(vm, *flow, stmt, pc),
        TokenKind::Command(verb) => run_command(vm, commands, verb, stmt),
        _ => {
            assignment(vm, &stmt.tokens)?;
            Ok(Next::Advance)
        }
    }
}

fn args(stmt: &Statement) -> &[Token] {
    stmt.tokens.get(1..).unwrap_or_default()
}

fn evaluate_or(vm: &mut Vm<'_>, tokens: &[Token], default: Value) -> ScriptResult<Value> {
    if tokens.is_empty() {
        Ok(default)
    } else {
        vm.evaluate(tokens)
    }
}

fn run_command(
    vm: &mut Vm<'_>,
    commands: &mut CommandRegistry,
    verb: &Verb,
    stmt: &Statement,
) -> ScriptResult<Next> {
    let args = args(stmt);
    match verb {
        Verb::Print => {
            let text = evaluate_or(vm, args, Value::empty_string())?.to_string();
            vm.host.output(&text);
        }
        Verb::Delay => {
            let seconds = evaluate_or(vm, args, Value::Float(0.0))?.as_float();
            vm.wait(WaitKind::Delay { seconds }, None)?;
        }
        Verb::Pause => {
            let message = evaluate_or(vm, args, Value::empty_string())?.to_string();
            vm.wait(WaitKind::Pause { message }, None)?;
        }
        Verb::Load => {
            let is_as = |t: &Token| t.kind == TokenKind::Keyword(Keyword::As);
            let (path, target) = match find_top_level(args, is_as) {
                Some(k) => (&args[..k], args.get(k + 1).map(name_of)),
                None => (args, None),
            };
            if path.is_empty() {
                return fail(BAD_ARGUMENT, "load needs a file name");
            }
            let path = vm.evaluate(path)?.to_string();
            vm.wait(WaitKind::Load { path }, target)?;
        }
        Verb::Throw => {
            let message = evaluate_or(vm, args, Value::empty_string())?.to_string();
            return fail(USER_ERROR, message);
        }
        Verb::Select => {
            let set = if args.is_empty() {
                let n = vm.host.store().item_count(Domain::Atoms);
                ItemSet::full(n, Domain::Atoms)
            } else {
                vm.evaluate_set(args)?
            };
            if set.domain != Domain::Atoms {
                return Err(ScriptError::domain_mismatch().into());
            }
            *vm.selection = set;
        }
        Verb::Define => {
            let Some(name) = args.first().map(name_of) else {
                return fail(INVALID_EXPRESSION, "define needs a name");
            };
            let set = vm.evaluate_set(&args[1..])?;
            vm.defined.insert(name.to_ascii_lowercase(), set);
        }
        Verb::Exit => {
            // an empty stack finishes the run normally
            vm.stack.clear();
            return Ok(Next::Stay);
        }
        Verb::Quit => return Err(Interrupt::Halt),
        Verb::External(name) => match commands.get_mut(name) {
            Some(handler) => handler.execute(vm, stmt)?,
            None => return fail(UNKNOWN_COMMAND, format!("unknown command: {}", name)),
        },
    }
    Ok(Next::Advance)
}

fn name_of(token: &Token) -> String {
    match &token.kind {
        TokenKind::Identifier(name) | TokenKind::Predicate(name) => name.clone(),
        _ => token
            .value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| token.text()),
    }
}

/* ===================== Assignment ===================== */

/// `var` declaration, assignment, or bare expression statement
pub fn assignment(vm: &mut Vm<'_>, tokens: &[Token]) -> ScriptResult<()> {
    if let Some(Token {
        kind: TokenKind::Keyword(Keyword::Var),
        ..
    }) = tokens.first()
    {
        return declare(vm, &tokens[1..]);
    }
    match find_top_level(tokens, |t| matches!(t.kind, TokenKind::Assign(_))) {
        Some(k) => assign_at(vm, tokens, k),
        None => vm.evaluate(tokens).map(|_| ()),
    }
}

/// `var a = 1, b`
fn declare(vm: &mut Vm<'_>, tokens: &[Token]) -> ScriptResult<()> {
    for part in split_top_level(tokens) {
        match part {
            [Token {
                kind: TokenKind::Identifier(name),
                ..
            }] => vm.declare_local(name, Value::empty_string()),
            [Token {
                kind: TokenKind::Identifier(name),
                ..
            }, Token {
                kind: TokenKind::Assign(AssignOp::Set),
                ..
            }, rest @ ..]
                if !rest.is_empty() =>
            {
                let value = vm.evaluate(rest)?;
                vm.declare_local(name, value);
            }
            _ => return fail(INVALID_EXPRESSION, "malformed var declaration"),
        }
    }
    Ok(())
}

fn combine(op: AssignOp, current: Option<Value>, value: Value, name: &str) -> ScriptResult<Value> {
    match op.op() {
        None => Ok(value),
        Some(bin) => match current {
            Some(current) => Ok(operators::binary(bin, &current, &value)?),
            None => Err(ScriptError::new(
                super::errors::UNDEFINED_VARIABLE,
                format!("undefined variable: {}", name),
            )
            .into()),
        },
    }
}

/// Component index of `.x`, `.y`, `.z`, `.w`
fn component(key: &str) -> Option<i32> {
    match key.to_ascii_lowercase().as_str() {
        "x" => Some(1),
        "y" => Some(2),
        "z" => Some(3),
        "w" => Some(4),
        _ => None,
    }
}

fn assign_at(vm: &mut Vm<'_>, tokens: &[Token], k: usize) -> ScriptResult<()> {
    let TokenKind::Assign(op) = tokens[k].kind else {
        return fail(INVALID_EXPRESSION, "missing assignment");
    };
    let target = &tokens[..k];
    let rhs = &tokens[k + 1..];
    if rhs.is_empty() {
        return fail(INVALID_EXPRESSION, "nothing to assign");
    }
    let value = vm.evaluate(rhs)?;

    match target {
        [Token {
            kind: TokenKind::Identifier(name),
            ..
        }] => {
            let current = vm.get_variable(name).cloned();
            let value = combine(op, current, value, name)?;
            vm.set_variable(name, value);
        }
        [Token {
            kind: TokenKind::Identifier(name),
            ..
        }, open, index @ .., close]
            if open.is_bracket(Bracket::LeftSquare) && close.is_bracket(Bracket::RightSquare) =>
        {
            let index = vm.evaluate(index)?;
            let mut container = vm.require_variable(name)?;
            let current = properties::index_value(&container, &index);
            let value = combine(op, Some(current), value, name)?;
            properties::set_index(&mut container, &index, value)?;
            vm.set_variable(name, container);
        }
        [Token {
            kind: TokenKind::Identifier(name),
            ..
        }, Token {
            kind: TokenKind::PropertySelector(key),
            ..
        }] => {
            let mut container = vm.require_variable(name)?;
            let index = match (&container, component(key)) {
                (Value::Point3(_) | Value::Point4(_), Some(i)) => Value::Int(i),
                _ => Value::Str(key.clone()),
            };
            let current = properties::index_value(&container, &index);
            let value = combine(op, Some(current), value, name)?;
            if let (Value::Point4(p), Value::Int(i)) = (&mut container, &index) {
                p[(*i - 1) as usize] = value.as_float();
            } else {
                properties::set_index(&mut container, &index, value)?;
            }
            vm.set_variable(name, container);
        }
        [open, terms @ .., close, Token {
            kind: TokenKind::PropertySelector(property),
            ..
        }] if open.is_bracket(Bracket::ExpressionBegin) && close.is_bracket(Bracket::ExpressionEnd) => {
            if op != AssignOp::Set {
                return fail(INVALID_EXPRESSION, "compound assignment to a selection");
            }
            let set = match selection::evaluate(vm, terms, false)? {
                Value::Set(set) => set,
                other => {
                    return Err(ScriptError::type_error(format!(
                        "expected an atom set, got {}",
                        other.type_name()
                    ))
                    .into())
                }
            };
            let property = ItemProperty::from_name(property);
            vm.host
                .store_mut()
                .set_property(&set, &property, &value)
                .map_err(|message| ScriptError::new(BAD_ARGUMENT, message))?;
        }
        _ => {
            let text: Vec<String> = target.iter().map(|t| t.text()).collect();
            return fail(
                INVALID_EXPRESSION,
                format!("cannot assign to {}", text.join(" ")),
            );
        }
    }
    Ok(())
}

/* ===================== Checking ===================== */

/// Syntax-only pass over every expression segment of one statement
pub fn check_statement(vm: &mut Vm<'_>, stmt: &Statement) -> ScriptResult<()> {
    let Some(head) = stmt.head() else {
        return Ok(());
    };
    let args = args(stmt);
    match &head.kind {
        TokenKind::Flow(Flow::For) => match ForHeader::parse(stmt)? {
            ForHeader::Counted { init, test, step } => {
                check_assignment(vm, init)?;
                expressions::check(vm, test)?;
                check_assignment(vm, step)
            }
            ForHeader::Each { collection, .. } => expressions::check(vm, collection),
        },
        TokenKind::Flow(
            Flow::If | Flow::ElseIf | Flow::While | Flow::Switch | Flow::Case | Flow::Return,
        ) => expressions::check(vm, args),
        TokenKind::Flow(_) => Ok(()),
        TokenKind::Command(Verb::Load) => {
            let is_as = |t: &Token| t.kind == TokenKind::Keyword(Keyword::As);
            let end = find_top_level(args, is_as).unwrap_or(args.len());
            expressions::check(vm, &args[..end])
        }
        TokenKind::Command(Verb::Define) => expressions::check(vm, args.get(1..).unwrap_or_default()),
        TokenKind::Command(Verb::External(_)) => Ok(()),
        TokenKind::Command(_) => expressions::check(vm, args),
        _ => check_assignment(vm, &stmt.tokens),
    }
}

fn check_assignment(vm: &mut Vm<'_>, tokens: &[Token]) -> ScriptResult<()> {
    let tokens = match tokens.first() {
        Some(Token {
            kind: TokenKind::Keyword(Keyword::Var),
            ..
        }) => {
            for part in split_top_level(&tokens[1..]) {
                let rhs = part.get(2..).unwrap_or_default();
                expressions::check(vm, rhs)?;
            }
            return Ok(());
        }
        _ => tokens,
    };
    match find_top_level(tokens, |t| matches!(t.kind, TokenKind::Assign(_))) {
        Some(k) => {
            if let [_, open, index @ .., close] = &tokens[..k] {
                if open.is_bracket(Bracket::LeftSquare) && close.is_bracket(Bracket::RightSquare) {
                    expressions::check(vm, index)?;
                }
            }
            if k + 1 >= tokens.len() {
                return fail(INVALID_EXPRESSION, "nothing to assign");
            }
            expressions::check(vm, &tokens[k + 1..])
        }
        None => expressions::check(vm, tokens),
    }
}
