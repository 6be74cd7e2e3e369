//! Execution frames and the context stack
//!
//! Frames form a singly linked chain owned by [`ContextStack`]. Every frame
//! keeps its own program and program counter: leaving a block hands the block's
//! pc down to its parent, returning from a function restores the caller's.
//!
//! A serialized stack is flat: frames are listed outermost first, and each
//! distinct script and branch table is written once and referenced by index.

use super::errors::ScriptError;
use super::types::{BranchTable, Program, Script, Token, Value};
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::rc::Rc;

/* ===================== Frame State ===================== */

/// Block keywords that push a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    If,
    For,
    While,
    Switch,
    Try,
    Catch,
    Process,
    Push,
}

impl BlockKind {
    pub fn is_loop(&self) -> bool {
        matches!(self, BlockKind::For | BlockKind::While)
    }
}

/// Frame kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FrameKind {
    Root,
    Function { name: String, parallel: bool },
    /// `head_pc` is the statement that opened the block
    Block { kind: BlockKind, head_pc: usize },
    /// Syntax-only pass used by script checking
    Check,
}

/// Loop progress, stored on the loop's frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopPhase {
    Init,
    Test,
    Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    pub phase: LoopPhase,
    /// Snapshot of a `for (x in ...)` collection
    pub items: Option<Vec<Value>>,
    pub index: usize,
}

impl LoopState {
    pub fn new() -> Self {
        Self {
            phase: LoopPhase::Init,
            items: None,
            index: 0,
        }
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new()
    }
}

/// Switch progress: still comparing cases, or running a matched arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum SwitchState {
    Searching(Value),
    Matched,
}

/* ===================== Frames ===================== */

/// One execution frame
///
/// `program` and `parent` are not part of a frame's own serialized form; the
/// owning [`ContextStack`] writes and relinks them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    #[serde(skip, default = "Program::detached")]
    pub program: Program,
    pub pc: usize,
    /// Frame-local variables
    pub vars: IndexMap<String, Value>,
    /// Flow token that opened this frame
    pub origin: Option<Token>,
    pub depth: usize,
    pub must_resume: bool,
    /// Some enclosing frame is a `try`
    pub in_try: bool,
    /// Error caught by this `try` frame
    pub error_slot: Option<ScriptError>,
    pub return_value: Option<Value>,
    /// Results of calls made by the statement being replayed
    pub call_results: Vec<Value>,
    pub switch: Option<SwitchState>,
    pub looping: Option<LoopState>,
    /// Scripts collected from `process` blocks
    pub batch: Vec<Rc<Script>>,
    #[serde(skip)]
    pub parent: Option<Box<Frame>>,
}

impl Frame {
    fn with_kind(kind: FrameKind, program: Program, pc: usize) -> Self {
        Self {
            kind,
            program,
            pc,
            vars: IndexMap::new(),
            origin: None,
            depth: 0,
            must_resume: false,
            in_try: false,
            error_slot: None,
            return_value: None,
            call_results: Vec::new(),
            switch: None,
            looping: None,
            batch: Vec::new(),
            parent: None,
        }
    }

    pub fn root(program: Program) -> Self {
        Self::with_kind(FrameKind::Root, program, 0)
    }

    pub fn function(name: &str, parallel: bool, program: Program) -> Self {
        Self::with_kind(
            FrameKind::Function {
                name: name.to_string(),
                parallel,
            },
            program,
            0,
        )
    }

    pub fn block(kind: BlockKind, program: Program, head_pc: usize, origin: Token) -> Self {
        let mut frame = Self::with_kind(FrameKind::Block { kind, head_pc }, program, head_pc);
        frame.origin = Some(origin);
        match kind {
            BlockKind::For | BlockKind::While => frame.looping = Some(LoopState::new()),
            _ => {}
        }
        frame
    }

    pub fn check(program: Program) -> Self {
        Self::with_kind(FrameKind::Check, program, 0)
    }

    /// Function and root frames bound variable lookup
    pub fn is_scope_boundary(&self) -> bool {
        matches!(
            self.kind,
            FrameKind::Root | FrameKind::Function { .. } | FrameKind::Check
        )
    }

    pub fn block_kind(&self) -> Option<BlockKind> {
        match self.kind {
            FrameKind::Block { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn head_pc(&self) -> Option<usize> {
        match self.kind {
            FrameKind::Block { head_pc, .. } => Some(head_pc),
            _ => None,
        }
    }

    pub fn is_block_at(&self, kind: BlockKind, head: usize) -> bool {
        self.kind == FrameKind::Block { kind, head_pc: head }
    }

    /// Name shown in stack traces
    pub fn source(&self) -> String {
        match &self.kind {
            FrameKind::Function { name, .. } => name.clone(),
            FrameKind::Block { kind, .. } => {
                format!("{} ({:?})", self.program.script.name, kind).to_lowercase()
            }
            _ => self.program.script.name.clone(),
        }
    }

    pub fn trace_line(&self) -> TraceLine {
        let statement = self.pc.min(self.program.len().saturating_sub(1));
        TraceLine {
            source: self.source(),
            line: self.program.script.line_of(statement),
            statement: self.pc,
            text: self.program.script.format_statement(self.pc),
        }
    }
}

/* ===================== Diagnostics ===================== */

/// One stack-trace entry: `(source, line, statement index, statement text)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLine {
    pub source: String,
    pub line: u32,
    pub statement: usize,
    pub text: String,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} line {} [{}]: {}",
            self.source, self.line, self.statement, self.text
        )
    }
}

/* ===================== Context Stack ===================== */

/// The frame chain of one script invocation
#[derive(Debug, Default)]
pub struct ContextStack {
    top: Option<Box<Frame>>,
    len: usize,
    max_depth: usize,
}

impl ContextStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            top: None,
            len: 0,
            max_depth,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// Push a frame; exceeding the depth bound is a fatal error
    pub fn push(&mut self, mut frame: Frame) -> Result<(), ScriptError> {
        if self.len >= self.max_depth {
            return Err(ScriptError::too_many_levels(self.max_depth));
        }
        if let Some(parent) = self.top.as_deref() {
            frame.in_try = parent.in_try || parent.block_kind() == Some(BlockKind::Try);
        }
        self.len += 1;
        frame.depth = self.len;
        frame.parent = self.top.take();
        self.top = Some(Box::new(frame));
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        let mut frame = self.top.take()?;
        self.top = frame.parent.take();
        self.len -= 1;
        Some(*frame)
    }

    /// Leave a block: the parent continues from the block's pc
    pub fn pop_block(&mut self) -> Option<Frame> {
        let frame = self.pop()?;
        if let Some(parent) = self.top_mut() {
            parent.pc = frame.pc;
        }
        Some(frame)
    }

    pub fn top(&self) -> Option<&Frame> {
        self.top.as_deref()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.top.as_deref_mut()
    }

    pub fn iter(&self) -> FrameIter<'_> {
        FrameIter {
            next: self.top.as_deref(),
        }
    }

    pub fn nth_from_top(&self, n: usize) -> Option<&Frame> {
        self.iter().nth(n)
    }

    pub fn nth_from_top_mut(&mut self, n: usize) -> Option<&mut Frame> {
        let mut cur = self.top.as_deref_mut();
        for _ in 0..n {
            cur = cur?.parent.as_deref_mut();
        }
        cur
    }

    /// Frame at `depth` (root is depth 1)
    pub fn at_depth_mut(&mut self, depth: usize) -> Option<&mut Frame> {
        if depth == 0 || depth > self.len {
            return None;
        }
        self.nth_from_top_mut(self.len - depth)
    }

    /// Distance from the top to the nearest function, root, or check frame
    pub fn scope_boundary(&self) -> usize {
        self.iter()
            .position(|f| f.is_scope_boundary())
            .unwrap_or(self.len.saturating_sub(1))
    }

    /// Distance from the top to the frame holding `name`, within the current function
    pub fn find_var(&self, name: &str) -> Option<usize> {
        for (i, frame) in self.iter().enumerate() {
            if frame.vars.contains_key(name) {
                return Some(i);
            }
            if frame.is_scope_boundary() {
                break;
            }
        }
        None
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let n = self.find_var(name)?;
        self.nth_from_top(n)?.vars.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Value> {
        let n = self.find_var(name)?;
        self.nth_from_top_mut(n)?.vars.get_mut(name)
    }

    pub fn mark_must_resume(&mut self, flag: bool) {
        let mut cur = self.top.as_deref_mut();
        while let Some(frame) = cur {
            frame.must_resume = flag;
            cur = frame.parent.as_deref_mut();
        }
    }

    /// One line per frame, innermost first
    pub fn stack_trace(&self) -> Vec<TraceLine> {
        self.iter().map(|f| f.trace_line()).collect()
    }

    /// Drop every frame
    pub fn clear(&mut self) {
        // unlink iteratively so long chains do not recurse on drop
        while self.pop().is_some() {}
    }

    pub fn take(&mut self) -> ContextStack {
        let max_depth = self.max_depth;
        std::mem::replace(self, ContextStack::new(max_depth))
    }
}

impl Drop for ContextStack {
    fn drop(&mut self) {
        self.clear();
    }
}

/* ===================== Serialization ===================== */

#[derive(Serialize)]
struct StackOut<'a> {
    max_depth: usize,
    scripts: Vec<&'a Script>,
    branches: Vec<&'a BranchTable>,
    frames: Vec<FrameOut<'a>>,
}

#[derive(Serialize)]
struct FrameOut<'a> {
    script: usize,
    branches: usize,
    frame: &'a Frame,
}

#[derive(Deserialize)]
struct StackIn {
    max_depth: usize,
    scripts: Vec<Rc<Script>>,
    branches: Vec<Rc<BranchTable>>,
    frames: Vec<FrameIn>,
}

#[derive(Deserialize)]
struct FrameIn {
    script: usize,
    branches: usize,
    frame: Frame,
}

/// Index of `item` in `pool`, adding it on first sight
fn intern<'a, T>(pool: &mut Vec<&'a Rc<T>>, item: &'a Rc<T>) -> usize {
    match pool.iter().position(|p| Rc::ptr_eq(p, item)) {
        Some(i) => i,
        None => {
            pool.push(item);
            pool.len() - 1
        }
    }
}

impl Serialize for ContextStack {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut scripts = Vec::new();
        let mut tables = Vec::new();
        let mut frames: Vec<FrameOut<'_>> = self
            .iter()
            .map(|frame| FrameOut {
                script: intern(&mut scripts, &frame.program.script),
                branches: intern(&mut tables, &frame.program.branches),
                frame,
            })
            .collect();
        frames.reverse();
        StackOut {
            max_depth: self.max_depth,
            scripts: scripts.into_iter().map(|s| s.as_ref()).collect(),
            branches: tables.into_iter().map(|t| t.as_ref()).collect(),
            frames,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContextStack {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let image = StackIn::deserialize(deserializer)?;
        let mut stack = ContextStack::new(image.max_depth);
        for FrameIn {
            script,
            branches,
            mut frame,
        } in image.frames
        {
            let (Some(script), Some(branches)) =
                (image.scripts.get(script), image.branches.get(branches))
            else {
                return Err(D::Error::custom("frame refers to a missing script or branch table"));
            };
            frame.program = Program {
                script: script.clone(),
                branches: branches.clone(),
            };
            frame.parent = stack.top.take();
            stack.top = Some(Box::new(frame));
            stack.len += 1;
        }
        Ok(stack)
    }
}

pub struct FrameIter<'a> {
    next: Option<&'a Frame>,
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = &'a Frame;

    fn next(&mut self) -> Option<&'a Frame> {
        let frame = self.next?;
        self.next = frame.parent.as_deref();
        Some(frame)
    }
}
