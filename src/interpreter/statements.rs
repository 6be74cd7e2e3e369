//! Flow-control transition table
//!
//! Every flow statement decides its jump from the partner index compiled into
//! its head token and from branch cells in the running program. Conditions are
//! evaluated before any frame is pushed or popped, so a statement replayed
//! after a function call sees the same stack it saw the first time.

use super::commands;
use super::context::{BlockKind, Frame, FrameKind, LoopPhase, SwitchState};
use super::errors::{fail, ScriptError, ScriptResult, INVALID_EXPRESSION, INVALID_JUMP, LABEL_NOT_FOUND};
use super::expressions::{find_top_level, split_top_level_by};
use super::types::{
    label_name, values_equal, BranchState, Bracket, Flow, ItemSet, Keyword, Next, Program,
    Statement, Token, TokenKind, Value,
};
use super::vm::Vm;
use std::rc::Rc;
use tracing::debug;

/// Run one flow statement
pub fn execute(vm: &mut Vm<'_>, flow: Flow, stmt: &Statement, pc: usize) -> ScriptResult<Next> {
    let program = current_program(vm)?;
    let body = stmt.tokens.get(1..).unwrap_or_default();
    match flow {
        Flow::If => {
            reset_chain(&program, pc);
            if_arm(vm, &program, stmt, pc)
        }
        Flow::ElseIf => {
            if program.branches.get(pc) == BranchState::Resolved {
                return Ok(Next::Jump(chain_end(&program, pc)?));
            }
            if_arm(vm, &program, stmt, pc)
        }
        Flow::Else => {
            if program.branches.get(pc) == BranchState::Resolved {
                return Ok(Next::Jump(chain_end(&program, pc)?));
            }
            push_block(vm, BlockKind::If, &program, pc, stmt)?;
            Ok(Next::Advance)
        }
        Flow::End => end_block(vm, &program, pc),
        Flow::For => for_loop(vm, &program, stmt, pc),
        Flow::While => while_loop(vm, &program, stmt, pc),
        Flow::Break => break_out(vm, body, false),
        Flow::Continue => break_out(vm, body, true),
        Flow::Switch => {
            let value = vm.evaluate(body)?;
            push_block(vm, BlockKind::Switch, &program, pc, stmt)?;
            if let Some(frame) = vm.stack.top_mut() {
                frame.switch = Some(SwitchState::Searching(value));
            }
            Ok(Next::Jump(partner(&program, pc)?))
        }
        Flow::Case => case(vm, &program, body, pc),
        Flow::Default => default_case(vm, &program, pc),
        Flow::Try => {
            push_block(vm, BlockKind::Try, &program, pc, stmt)?;
            Ok(Next::Advance)
        }
        Flow::Catch => catch(vm, &program, stmt, pc),
        Flow::Return => {
            let value = if body.is_empty() {
                None
            } else {
                Some(vm.evaluate(body)?)
            };
            return_from(vm, value);
            Ok(Next::Stay)
        }
        Flow::Goto => goto(vm, &program, stmt, pc),
        Flow::Label => Ok(Next::Advance),
        Flow::Push => {
            push_block(vm, BlockKind::Push, &program, pc, stmt)?;
            Ok(Next::Advance)
        }
        Flow::Process => process(vm, &program, stmt, pc),
    }
}

/* ===================== Helpers ===================== */

fn current_program(vm: &Vm<'_>) -> ScriptResult<Program> {
    match vm.stack.top() {
        Some(frame) => Ok(frame.program.clone()),
        None => fail(INVALID_JUMP, "no active frame"),
    }
}

fn partner(program: &Program, pc: usize) -> ScriptResult<usize> {
    match program.script.partner(pc) {
        Some(p) => Ok(p),
        None => fail(INVALID_JUMP, format!("statement {} has no partner", pc)),
    }
}

fn chain_end(program: &Program, pc: usize) -> ScriptResult<usize> {
    match program.script.end_of_chain(pc) {
        Some(end) => Ok(end),
        None => fail(INVALID_JUMP, format!("block at statement {} is not closed", pc)),
    }
}

fn push_block(
    vm: &mut Vm<'_>,
    kind: BlockKind,
    program: &Program,
    pc: usize,
    stmt: &Statement,
) -> ScriptResult<()> {
    let origin = stmt.head().cloned().unwrap_or_else(|| Token::flow(Flow::End, pc));
    vm.stack
        .push(Frame::block(kind, program.clone(), pc, origin))?;
    debug!(kind = ?kind, pc, depth = vm.stack.len(), "Block entered");
    Ok(())
}

/// Pop the top frame and continue the parent at `pc`
fn leave_to(vm: &mut Vm<'_>, pc: usize) {
    if let Some(frame) = vm.stack.pop() {
        debug!(kind = ?frame.kind, depth = frame.depth, "Block left");
    }
    if let Some(parent) = vm.stack.top_mut() {
        parent.pc = pc;
    }
}

/* ===================== If ===================== */

/// Mark every arm of the chain starting at `head` pending
fn reset_chain(program: &Program, head: usize) {
    let mut cur = head;
    while let Some(next) = program.script.partner(cur) {
        match program.statement(next).and_then(|s| s.flow()) {
            Some(Flow::ElseIf) | Some(Flow::Else) => {
                program.branches.set(next, BranchState::Pending);
                cur = next;
            }
            _ => break,
        }
    }
}

/// Later arms must not run once this one has
fn resolve_rest(program: &Program, arm: usize) {
    let mut cur = arm;
    while let Some(next) = program.script.partner(cur) {
        match program.statement(next).and_then(|s| s.flow()) {
            Some(Flow::ElseIf) | Some(Flow::Else) => {
                program.branches.set(next, BranchState::Resolved);
                cur = next;
            }
            _ => break,
        }
    }
}

fn if_arm(vm: &mut Vm<'_>, program: &Program, stmt: &Statement, pc: usize) -> ScriptResult<Next> {
    let body = stmt.tokens.get(1..).unwrap_or_default();
    if body.is_empty() {
        return fail(INVALID_EXPRESSION, "missing condition");
    }
    if vm.evaluate(body)?.as_bool() {
        resolve_rest(program, pc);
        push_block(vm, BlockKind::If, program, pc, stmt)?;
        Ok(Next::Advance)
    } else {
        Ok(Next::Jump(partner(program, pc)?))
    }
}

/* ===================== End ===================== */

fn end_block(vm: &mut Vm<'_>, program: &Program, pc: usize) -> ScriptResult<Next> {
    let head = partner(program, pc)?;
    let expected: &[BlockKind] = match program.statement(head).and_then(|s| s.flow()) {
        Some(Flow::If) => &[BlockKind::If],
        Some(Flow::For) => &[BlockKind::For],
        Some(Flow::While) => &[BlockKind::While],
        Some(Flow::Switch) => &[BlockKind::Switch],
        Some(Flow::Try) => &[BlockKind::Try, BlockKind::Catch],
        Some(Flow::Process) => &[BlockKind::Process],
        Some(Flow::Push) => &[BlockKind::Push],
        _ => return fail(INVALID_JUMP, format!("end at statement {} closes nothing", pc)),
    };
    let open = vm.stack.top().and_then(|frame| {
        let kind = frame.block_kind()?;
        let frame_head = frame.head_pc()?;
        (expected.contains(&kind) && (head..pc).contains(&frame_head)).then_some((kind, frame_head))
    });
    match open {
        Some((kind, frame_head)) if kind.is_loop() => Ok(Next::Jump(frame_head)),
        Some(_) => {
            if let Some(frame) = vm.stack.pop_block() {
                debug!(kind = ?frame.kind, depth = frame.depth, "Block left");
            }
            Ok(Next::Advance)
        }
        // the block was skipped without entering a frame
        None => Ok(Next::Advance),
    }
}

/* ===================== Loops ===================== */

/// Parsed `for` header
pub enum ForHeader<'t> {
    /// `for (init; test; step)`
    Counted {
        init: &'t [Token],
        test: &'t [Token],
        step: &'t [Token],
    },
    /// `for ([var] x in collection)`
    Each {
        var: String,
        declare: bool,
        collection: &'t [Token],
    },
}

impl<'t> ForHeader<'t> {
    pub fn parse(stmt: &'t Statement) -> ScriptResult<ForHeader<'t>> {
        let mut inner = stmt.tokens.get(1..).unwrap_or_default();
        if let (Some(first), Some(last)) = (inner.first(), inner.last()) {
            if first.is_bracket(Bracket::LeftParen) && last.is_bracket(Bracket::RightParen) {
                inner = &inner[1..inner.len() - 1];
            }
        }
        let is_in = |t: &Token| t.kind == TokenKind::Keyword(Keyword::In);
        if let Some(k) = find_top_level(inner, is_in) {
            let (declare, name) = match &inner[..k] {
                [Token {
                    kind: TokenKind::Keyword(Keyword::Var),
                    ..
                }, Token {
                    kind: TokenKind::Identifier(name),
                    ..
                }] => (true, name),
                [Token {
                    kind: TokenKind::Identifier(name),
                    ..
                }] => (false, name),
                _ => return fail(INVALID_EXPRESSION, "malformed for header"),
            };
            return Ok(ForHeader::Each {
                var: name.clone(),
                declare,
                collection: &inner[k + 1..],
            });
        }
        match split_top_level_by(inner, |t| t.kind == TokenKind::Separator).as_slice() {
            [init, test, step] => Ok(ForHeader::Counted {
                init: *init,
                test: *test,
                step: *step,
            }),
            _ => fail(INVALID_EXPRESSION, "malformed for header"),
        }
    }
}

/// Enter a new loop phase; call results of the previous phase no longer apply
fn enter_phase(vm: &mut Vm<'_>, phase: LoopPhase) {
    if let Some(frame) = vm.stack.top_mut() {
        if let Some(looping) = frame.looping.as_mut() {
            looping.phase = phase;
        }
        frame.call_results.clear();
    }
    vm.call_cursor = 0;
}

fn loop_phase(vm: &Vm<'_>) -> LoopPhase {
    vm.stack
        .top()
        .and_then(|f| f.looping.as_ref())
        .map(|l| l.phase)
        .unwrap_or(LoopPhase::Init)
}

/// Items visited by `for (x in value)`
fn snapshot(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Set(set) => set
            .indices()
            .map(|i| Value::Set(ItemSet::single(i, set.domain)))
            .collect(),
        Value::Map(map) => map.into_keys().map(Value::Str).collect(),
        other => vec![other],
    }
}

fn exit_loop(vm: &mut Vm<'_>, program: &Program, pc: usize) -> ScriptResult<Next> {
    let end = partner(program, pc)?;
    leave_to(vm, end + 1);
    Ok(Next::Stay)
}

fn for_loop(vm: &mut Vm<'_>, program: &Program, stmt: &Statement, pc: usize) -> ScriptResult<Next> {
    let header = ForHeader::parse(stmt)?;
    let revisit = vm
        .stack
        .top()
        .map(|f| f.is_block_at(BlockKind::For, pc))
        .unwrap_or(false);
    if !revisit {
        push_block(vm, BlockKind::For, program, pc, stmt)?;
    }

    let go = match header {
        ForHeader::Counted { init, test, step } => {
            match loop_phase(vm) {
                LoopPhase::Init => {
                    if !init.is_empty() {
                        commands::assignment(vm, init)?;
                    }
                    enter_phase(vm, LoopPhase::Test);
                }
                LoopPhase::Body => {
                    if !step.is_empty() {
                        commands::assignment(vm, step)?;
                    }
                    enter_phase(vm, LoopPhase::Test);
                }
                LoopPhase::Test => {}
            }
            test.is_empty() || vm.evaluate(test)?.as_bool()
        }
        ForHeader::Each {
            var,
            declare,
            collection,
        } => {
            match loop_phase(vm) {
                LoopPhase::Init => {
                    let items = snapshot(vm.evaluate(collection)?);
                    if let Some(looping) = vm.stack.top_mut().and_then(|f| f.looping.as_mut()) {
                        looping.items = Some(items);
                        looping.index = 0;
                    }
                    enter_phase(vm, LoopPhase::Test);
                }
                LoopPhase::Body => enter_phase(vm, LoopPhase::Test),
                LoopPhase::Test => {}
            }
            let item = vm
                .stack
                .top_mut()
                .and_then(|f| f.looping.as_mut())
                .and_then(|looping| {
                    let item = looping.items.as_ref()?.get(looping.index).cloned()?;
                    looping.index += 1;
                    Some(item)
                });
            match item {
                Some(item) => {
                    if declare {
                        vm.declare_local(&var, item);
                    } else {
                        vm.set_variable(&var, item);
                    }
                    true
                }
                None => false,
            }
        }
    };

    if go {
        enter_phase(vm, LoopPhase::Body);
        Ok(Next::Advance)
    } else {
        exit_loop(vm, program, pc)
    }
}

fn while_loop(vm: &mut Vm<'_>, program: &Program, stmt: &Statement, pc: usize) -> ScriptResult<Next> {
    let body = stmt.tokens.get(1..).unwrap_or_default();
    let revisit = vm
        .stack
        .top()
        .map(|f| f.is_block_at(BlockKind::While, pc))
        .unwrap_or(false);
    let go = vm.evaluate(body)?.as_bool();
    match (go, revisit) {
        (true, true) => {
            enter_phase(vm, LoopPhase::Body);
            Ok(Next::Advance)
        }
        (true, false) => {
            push_block(vm, BlockKind::While, program, pc, stmt)?;
            enter_phase(vm, LoopPhase::Body);
            Ok(Next::Advance)
        }
        (false, true) => exit_loop(vm, program, pc),
        (false, false) => Ok(Next::Jump(partner(program, pc)? + 1)),
    }
}

/// `break [n]` / `continue [n]`
fn break_out(vm: &mut Vm<'_>, body: &[Token], is_continue: bool) -> ScriptResult<Next> {
    let levels = if body.is_empty() {
        1
    } else {
        vm.evaluate(body)?.as_int().max(1) as usize
    };
    let mut remaining = levels;
    let mut target = None;
    for (distance, frame) in vm.stack.iter().enumerate() {
        if frame.is_scope_boundary() {
            break;
        }
        let counts = match frame.block_kind() {
            Some(kind) if kind.is_loop() => true,
            Some(BlockKind::Switch) => !is_continue,
            _ => false,
        };
        if counts {
            remaining -= 1;
            if remaining == 0 {
                target = Some(distance);
                break;
            }
        }
    }
    let Some(distance) = target else {
        let keyword = if is_continue { "continue" } else { "break" };
        return fail(INVALID_JUMP, format!("{} outside of a loop", keyword));
    };
    for _ in 0..distance {
        vm.stack.pop();
    }
    let Some(frame) = vm.stack.top_mut() else {
        return fail(INVALID_JUMP, "loop frame vanished");
    };
    let head = frame.head_pc().unwrap_or(frame.pc);
    if is_continue {
        frame.pc = head;
        return Ok(Next::Stay);
    }
    let program = frame.program.clone();
    let end = chain_end(&program, head)?;
    leave_to(vm, end + 1);
    Ok(Next::Stay)
}

/* ===================== Switch ===================== */

fn switch_state(vm: &Vm<'_>, pc: usize) -> ScriptResult<SwitchState> {
    match vm.stack.top() {
        Some(frame)
            if frame.block_kind() == Some(BlockKind::Switch)
                && frame.head_pc().map(|h| h < pc).unwrap_or(false) =>
        {
            match &frame.switch {
                Some(state) => Ok(state.clone()),
                None => fail(INVALID_JUMP, "switch frame has no state"),
            }
        }
        _ => fail(INVALID_JUMP, "case outside of a switch"),
    }
}

fn set_matched(vm: &mut Vm<'_>) {
    if let Some(frame) = vm.stack.top_mut() {
        frame.switch = Some(SwitchState::Matched);
    }
}

fn case(vm: &mut Vm<'_>, program: &Program, body: &[Token], pc: usize) -> ScriptResult<Next> {
    match switch_state(vm, pc)? {
        // fall through from the matched arm
        SwitchState::Matched => Ok(Next::Advance),
        SwitchState::Searching(value) => {
            if values_equal(&value, &vm.evaluate(body)?) {
                set_matched(vm);
                Ok(Next::Advance)
            } else {
                Ok(Next::Jump(partner(program, pc)?))
            }
        }
    }
}

/// `default` loses to any later matching `case`
fn default_case(vm: &mut Vm<'_>, program: &Program, pc: usize) -> ScriptResult<Next> {
    let SwitchState::Searching(value) = switch_state(vm, pc)? else {
        return Ok(Next::Advance);
    };
    let mut cur = partner(program, pc)?;
    while let Some(stmt) = program.statement(cur) {
        if stmt.flow() != Some(Flow::Case) {
            break;
        }
        let body = stmt.tokens.get(1..).unwrap_or_default();
        if values_equal(&value, &vm.evaluate(body)?) {
            set_matched(vm);
            return Ok(Next::Jump(cur + 1));
        }
        cur = partner(program, cur)?;
    }
    set_matched(vm);
    Ok(Next::Advance)
}

/* ===================== Try / Catch ===================== */

fn catch(vm: &mut Vm<'_>, program: &Program, stmt: &Statement, pc: usize) -> ScriptResult<Next> {
    let end = partner(program, pc)?;
    let try_head = match vm.stack.top() {
        Some(frame) if frame.block_kind() == Some(BlockKind::Try) => frame.head_pc(),
        _ => None,
    };
    let Some(try_head) = try_head.filter(|h| *h < pc) else {
        return Ok(Next::Jump(end + 1));
    };
    let error = vm.stack.top_mut().and_then(|f| f.error_slot.take());
    vm.stack.pop();
    let Some(error) = error else {
        // the try body finished normally
        if let Some(parent) = vm.stack.top_mut() {
            parent.pc = end + 1;
        }
        return Ok(Next::Stay);
    };
    push_block(vm, BlockKind::Catch, program, try_head, stmt)?;
    let var = stmt.tokens.iter().skip(1).find_map(|t| match &t.kind {
        TokenKind::Identifier(name) => Some(name.clone()),
        _ => None,
    });
    if let Some(frame) = vm.stack.top_mut() {
        frame.pc = pc;
        if let Some(var) = var {
            frame.vars.insert(var, Value::Str(error.message.clone()));
        }
    }
    debug!(code = %error.code, "Caught script error");
    Ok(Next::Advance)
}

/* ===================== Jumps ===================== */

/// Unwind to the enclosing function or root frame and run off its end
pub fn return_from(vm: &mut Vm<'_>, value: Option<Value>) {
    while vm
        .stack
        .top()
        .map(|f| !f.is_scope_boundary())
        .unwrap_or(false)
    {
        vm.stack.pop();
    }
    if let Some(frame) = vm.stack.top_mut() {
        frame.return_value = value;
        frame.pc = frame.program.len();
    }
}

fn goto(vm: &mut Vm<'_>, program: &Program, stmt: &Statement, pc: usize) -> ScriptResult<Next> {
    let Some(name) = stmt.tokens.get(1).map(label_name) else {
        return fail(INVALID_EXPRESSION, "goto needs a label");
    };
    let Some(target) = program.script.find_label(&name) else {
        return fail(LABEL_NOT_FOUND, format!("label not found: {}", name));
    };
    let from = program.script.open_blocks(pc);
    let to = program.script.open_blocks(target);
    if !from.starts_with(&to) {
        return fail(INVALID_JUMP, format!("cannot jump into a block at label {}", name));
    }
    for _ in to.len()..from.len() {
        match vm.stack.top() {
            Some(frame) if matches!(frame.kind, FrameKind::Block { .. }) => {
                vm.stack.pop();
            }
            _ => {
                return Err(ScriptError::new(INVALID_JUMP, "goto crosses a function boundary").into())
            }
        }
    }
    Ok(Next::Jump(target))
}

/* ===================== Parallel ===================== */

fn process(vm: &mut Vm<'_>, program: &Program, stmt: &Statement, pc: usize) -> ScriptResult<Next> {
    let boundary = vm.stack.scope_boundary();
    let parallel = match vm.stack.nth_from_top(boundary).map(|f| &f.kind) {
        Some(FrameKind::Function { parallel, .. }) => *parallel,
        _ => false,
    };
    if !parallel {
        push_block(vm, BlockKind::Process, program, pc, stmt)?;
        return Ok(Next::Advance);
    }
    let end = partner(program, pc)?;
    let name = format!("{}:process@{}", program.script.name, pc);
    let script = Rc::new(program.script.extract(&name, pc + 1, end));
    if let Some(frame) = vm.stack.nth_from_top_mut(boundary) {
        debug!(statements = script.len(), "Collected process block");
        frame.batch.push(script);
    }
    Ok(Next::Jump(end + 1))
}
