//! Compiled scripts and the per-run program view

use super::super::errors::{self, ScriptError};
use super::tokens::{Flow, Token, TokenKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;

/* ===================== Statements ===================== */

/// One compiled statement
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Statement {
    pub tokens: Vec<Token>,
}

impl Statement {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn head(&self) -> Option<&Token> {
        self.tokens.first()
    }

    pub fn flow(&self) -> Option<Flow> {
        self.head().and_then(|t| t.flow_kind())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn text(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.text())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/* ===================== Functions ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    Function,
    /// `process` blocks inside the body are handed to the host as a batch
    Parallel,
}

/// A user-defined function attached to a script by the compiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Script>,
    pub kind: FunctionKind,
}

/* ===================== Scripts ===================== */

/// A compiled script: statements plus diagnostic line/offset tables
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    pub statements: Vec<Statement>,
    #[serde(default)]
    pub line_numbers: Vec<u32>,
    #[serde(default)]
    pub char_ranges: Vec<(u32, u32)>,
    #[serde(default)]
    pub functions: IndexMap<String, Rc<ScriptFunction>>,
}

impl Script {
    pub fn new(name: &str, statements: Vec<Statement>) -> Self {
        let line_numbers = (1..=statements.len() as u32).collect();
        Self {
            name: name.to_string(),
            statements,
            line_numbers,
            char_ranges: Vec::new(),
            functions: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn line_of(&self, pc: usize) -> u32 {
        self.line_numbers.get(pc).copied().unwrap_or(0)
    }

    pub fn format_statement(&self, pc: usize) -> String {
        self.statements
            .get(pc)
            .map(|s| s.text())
            .unwrap_or_default()
    }

    /// Index of the `label name` statement
    pub fn find_label(&self, name: &str) -> Option<usize> {
        self.statements.iter().position(|s| {
            s.flow() == Some(Flow::Label) && s.tokens.get(1).map(label_name).as_deref() == Some(name)
        })
    }

    /// Flow partner of the statement at `pc`
    pub fn partner(&self, pc: usize) -> Option<usize> {
        let head = self.statements.get(pc)?.head()?;
        match head.flow_kind() {
            Some(f) if f.has_partner() => Some(head.partner()),
            _ => None,
        }
    }

    /// Follow partner links from `pc` until the closing `end`
    pub fn end_of_chain(&self, pc: usize) -> Option<usize> {
        let mut cur = pc;
        for _ in 0..=self.len() {
            if self.statements.get(cur)?.flow() == Some(Flow::End) {
                return Some(cur);
            }
            cur = self.partner(cur)?;
        }
        None
    }

    /// Heads of the blocks enclosing `pc`, outermost first
    pub fn open_blocks(&self, pc: usize) -> Vec<usize> {
        let mut open = Vec::new();
        for (i, stmt) in self.statements.iter().enumerate().take(pc) {
            match stmt.flow() {
                Some(f) if f.opens_block() => open.push(i),
                Some(Flow::End) => {
                    open.pop();
                }
                _ => {}
            }
        }
        open
    }

    /// Check that every flow token points at a partner of the right kind
    pub fn validate(&self) -> Result<(), ScriptError> {
        for (pc, stmt) in self.statements.iter().enumerate() {
            let Some(flow) = stmt.flow() else {
                continue;
            };
            if !flow.has_partner() {
                if flow == Flow::Goto || flow == Flow::Label {
                    if stmt.tokens.len() < 2 {
                        return Err(self.jump_error(pc, "missing label name"));
                    }
                }
                continue;
            }
            let partner = self
                .partner(pc)
                .filter(|p| *p < self.len())
                .ok_or_else(|| self.jump_error(pc, "jump target out of range"))?;
            let target = self.statements[partner].flow();
            let ok = match flow {
                Flow::If | Flow::ElseIf => matches!(
                    target,
                    Some(Flow::ElseIf) | Some(Flow::Else) | Some(Flow::End)
                ),
                Flow::Else | Flow::For | Flow::While | Flow::Process | Flow::Push | Flow::Catch => {
                    target == Some(Flow::End)
                }
                Flow::Switch | Flow::Case | Flow::Default => matches!(
                    target,
                    Some(Flow::Case) | Some(Flow::Default) | Some(Flow::End)
                ),
                Flow::Try => matches!(target, Some(Flow::Catch) | Some(Flow::End)),
                Flow::End => target.map(|f| f.opens_block()).unwrap_or(false),
                _ => true,
            };
            let forward = flow == Flow::End || partner > pc;
            if !ok || !forward {
                return Err(self.jump_error(pc, "mismatched block structure"));
            }
        }
        for function in self.functions.values() {
            function.body.validate()?;
        }
        Ok(())
    }

    fn jump_error(&self, pc: usize, message: &str) -> ScriptError {
        ScriptError::new(
            errors::INVALID_JUMP,
            format!(
                "{} at {} line {}: {}",
                message,
                self.name,
                self.line_of(pc),
                self.format_statement(pc)
            ),
        )
    }

    /// Statements `start..end` as a standalone script with jumps rebased
    pub fn extract(&self, name: &str, start: usize, end: usize) -> Script {
        let end = end.min(self.len());
        let statements = self.statements[start..end]
            .iter()
            .map(|stmt| {
                let tokens = stmt
                    .tokens
                    .iter()
                    .enumerate()
                    .map(|(i, t)| match t.kind {
                        TokenKind::Flow(f) if i == 0 && f.has_partner() => {
                            Token::flow(f, t.partner().saturating_sub(start))
                        }
                        _ => t.clone(),
                    })
                    .collect();
                Statement::new(tokens)
            })
            .collect();
        Script {
            name: name.to_string(),
            statements,
            line_numbers: self.line_numbers.get(start..end).map(|l| l.to_vec()).unwrap_or_default(),
            char_ranges: self.char_ranges.get(start..end).map(|r| r.to_vec()).unwrap_or_default(),
            functions: self.functions.clone(),
        }
    }
}

/// Text of a label or goto operand
pub fn label_name(token: &Token) -> String {
    match &token.kind {
        TokenKind::Identifier(name) => name.clone(),
        _ => token
            .value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| token.text()),
    }
}

/* ===================== Branch State ===================== */

/// Run-time state of one branch point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BranchState {
    #[default]
    Pending,
    /// An earlier arm of the chain ran; skip to the end
    Resolved,
}

/// One mutable branch cell per statement, separate from the immutable tokens
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchTable {
    cells: Vec<Cell<BranchState>>,
}

impl BranchTable {
    pub fn new(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| Cell::new(BranchState::Pending)).collect(),
        }
    }

    pub fn get(&self, pc: usize) -> BranchState {
        self.cells.get(pc).map(|c| c.get()).unwrap_or_default()
    }

    pub fn set(&self, pc: usize, state: BranchState) {
        if let Some(cell) = self.cells.get(pc) {
            cell.set(state);
        }
    }
}

/// A script bound to its own branch table for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub script: Rc<Script>,
    pub branches: Rc<BranchTable>,
}

impl Program {
    pub fn new(script: Rc<Script>) -> Self {
        let branches = Rc::new(BranchTable::new(script.len()));
        Self { script, branches }
    }

    /// Empty program for a frame not yet attached to its script
    pub fn detached() -> Self {
        Self::new(Rc::new(Script::new("", Vec::new())))
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    pub fn statement(&self, pc: usize) -> Option<&Statement> {
        self.script.statements.get(pc)
    }
}
