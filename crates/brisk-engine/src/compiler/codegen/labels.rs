//! The control stack: break and continue targets, finally scopes and
//! iterator-close regions.
//!
//! A non-local exit walks the stack from the top down to its target. Each
//! iterator-close region it crosses closes its iterator inline; the first
//! finally scope it crosses swallows the jump into a [`TempLabel`], which
//! the try statement later binds to a copy of the finally body followed by
//! the real jump.

use super::{CodeGenerator, Completion};
use crate::compiler::bytecode::{Bytecode, HandlerKind, LabelId, OpCode, Operand};
use crate::error::{Error, Result};

/// A branch target whose use is tracked.
#[derive(Debug, Clone, Copy)]
pub(super) struct JumpLabel {
    id: LabelId,
    used: bool,
}

impl JumpLabel {
    pub(super) fn new(code: &mut Bytecode) -> Self {
        Self {
            id: code.new_label(),
            used: false,
        }
    }

    /// The label, recorded as used.
    pub(super) fn target(&mut self) -> LabelId {
        self.used = true;
        self.id
    }

    pub(super) fn id(&self) -> LabelId {
        self.id
    }

    pub(super) fn is_used(&self) -> bool {
        self.used
    }
}

/// Where a non-local exit is headed. Indices refer to the control stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum JumpTarget {
    Break(usize),
    Continue(usize),
    Return,
}

/// Stand-in for an exit that must run a finally body first.
#[derive(Debug, Clone, Copy)]
pub(super) struct TempLabel {
    pub(super) label: LabelId,
    pub(super) target: JumpTarget,
}

/// An iteration statement, `switch` or labelled statement.
#[derive(Debug)]
pub(super) struct JumpScope {
    labels: Vec<String>,
    pub(super) break_label: JumpLabel,
    pub(super) continue_label: Option<JumpLabel>,
    /// `switch` and loops; labelled blocks only take labelled breaks
    unlabelled_break: bool,
    env_depth: u32,
}

impl JumpScope {
    pub(super) fn continue_used(&self) -> bool {
        self.continue_label.is_some_and(|l| l.is_used())
    }

    /// Loop completion: normal as soon as any jump lands after or back
    /// into the loop.
    pub(super) fn loop_completion(&self, body: Completion, infinite: bool) -> Completion {
        if infinite && !self.break_label.is_used() {
            Completion::Abrupt
        } else {
            body.normal(self.continue_used() || self.break_label.is_used())
                .select(Completion::Normal)
        }
    }
}

#[derive(Debug)]
pub(super) struct FinallyScope {
    temps: Vec<TempLabel>,
}

#[derive(Debug)]
pub(super) struct IterCloseScope {
    register: u32,
    open: Option<usize>,
    ranges: Vec<(usize, usize)>,
}

impl IterCloseScope {
    fn suspend(&mut self, at: usize) {
        if let Some(start) = self.open.take() {
            self.ranges.push((start, at));
        }
    }

    fn resume(&mut self, at: usize) {
        if self.open.is_none() {
            self.open = Some(at);
        }
    }
}

#[derive(Debug)]
pub(super) enum ControlEntry {
    Jumps(JumpScope),
    Finally(FinallyScope),
    IterClose(IterCloseScope),
}

impl CodeGenerator<'_> {
    // ========================================================================
    // Entries
    // ========================================================================

    /// Pushes a loop; returns its index.
    pub(super) fn push_loop(&mut self, labels: Vec<String>) -> usize {
        let continue_label = Some(JumpLabel::new(&mut self.code));
        self.push_jumps(labels, continue_label, true)
    }

    /// Pushes a `switch` (`unlabelled_break`) or a labelled statement.
    pub(super) fn push_breakable(&mut self, labels: Vec<String>, unlabelled_break: bool) -> usize {
        self.push_jumps(labels, None, unlabelled_break)
    }

    fn push_jumps(
        &mut self,
        labels: Vec<String>,
        continue_label: Option<JumpLabel>,
        unlabelled_break: bool,
    ) -> usize {
        let break_label = JumpLabel::new(&mut self.code);
        self.control.push(ControlEntry::Jumps(JumpScope {
            labels,
            break_label,
            continue_label,
            unlabelled_break,
            env_depth: self.env_depth,
        }));
        self.control.len() - 1
    }

    pub(super) fn jump_scope(&mut self, index: usize) -> Result<&mut JumpScope> {
        match self.control.get_mut(index) {
            Some(ControlEntry::Jumps(scope)) => Ok(scope),
            _ => Err(Error::internal("control stack out of sync")),
        }
    }

    pub(super) fn pop_jump_scope(&mut self, index: usize) -> Result<JumpScope> {
        match self.pop_entry(index)? {
            ControlEntry::Jumps(scope) => Ok(scope),
            _ => Err(Error::internal("control stack out of sync")),
        }
    }

    pub(super) fn push_finally(&mut self) -> usize {
        self.control
            .push(ControlEntry::Finally(FinallyScope { temps: Vec::new() }));
        self.control.len() - 1
    }

    /// Pops a finally scope and returns the exits that went through it.
    pub(super) fn pop_finally(&mut self, index: usize) -> Result<Vec<TempLabel>> {
        match self.pop_entry(index)? {
            ControlEntry::Finally(scope) => Ok(scope.temps),
            _ => Err(Error::internal("control stack out of sync")),
        }
    }

    /// Pushes an iterator-close region for the iterator in `register`. The
    /// region starts closed; see [`Self::open_iter_close`].
    pub(super) fn push_iter_close(&mut self, register: u32) -> usize {
        self.control.push(ControlEntry::IterClose(IterCloseScope {
            register,
            open: None,
            ranges: Vec::new(),
        }));
        self.control.len() - 1
    }

    /// Starts protecting instructions from here on.
    pub(super) fn open_iter_close(&mut self, index: usize) {
        let at = self.code.position();
        if let Some(ControlEntry::IterClose(scope)) = self.control.get_mut(index) {
            scope.resume(at);
        }
    }

    /// Pops an iterator-close region and registers its handlers.
    pub(super) fn pop_iter_close(&mut self, index: usize) -> Result<()> {
        let at = self.code.position();
        let ControlEntry::IterClose(mut scope) = self.pop_entry(index)? else {
            return Err(Error::internal("control stack out of sync"));
        };
        scope.suspend(at);
        let target = self.label();
        for (start, end) in scope.ranges {
            self.code.add_handler(
                start,
                end,
                target,
                HandlerKind::IterClose {
                    register: scope.register,
                },
            );
        }
        Ok(())
    }

    fn pop_entry(&mut self, index: usize) -> Result<ControlEntry> {
        if index + 1 != self.control.len() {
            return Err(Error::internal("control stack out of sync"));
        }
        self.control
            .pop()
            .ok_or_else(|| Error::internal("control stack underflow"))
    }

    /// Returns true when a `return` here has cleanup to run.
    pub(super) fn has_cleanup(&self) -> bool {
        self.control
            .iter()
            .any(|e| matches!(e, ControlEntry::Finally(_) | ControlEntry::IterClose(_)))
    }

    // ========================================================================
    // Targets
    // ========================================================================

    pub(super) fn break_target(&self, label: Option<&str>) -> Result<usize> {
        self.control
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, entry)| match entry {
                ControlEntry::Jumps(scope) => {
                    let hit = match label {
                        Some(label) => scope.labels.iter().any(|l| l == label),
                        None => scope.unlabelled_break,
                    };
                    hit.then_some(index)
                }
                _ => None,
            })
            .ok_or_else(|| match label {
                Some(label) => Error::internal(format!("undefined label '{label}'")),
                None => Error::internal("break outside of a loop or switch"),
            })
    }

    pub(super) fn continue_target(&self, label: Option<&str>) -> Result<usize> {
        self.control
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, entry)| match entry {
                ControlEntry::Jumps(scope) if scope.continue_label.is_some() => {
                    let hit = match label {
                        Some(label) => scope.labels.iter().any(|l| l == label),
                        None => true,
                    };
                    hit.then_some(index)
                }
                _ => None,
            })
            .ok_or_else(|| Error::internal("continue outside of a loop"))
    }

    // ========================================================================
    // Exits
    // ========================================================================

    /// Emits a non-local exit to `target`.
    pub(super) fn jump_to(&mut self, target: JumpTarget) -> Result<()> {
        let floor = match target {
            JumpTarget::Break(index) | JumpTarget::Continue(index) => index + 1,
            JumpTarget::Return => 0,
        };

        let mut closed = Vec::new();
        for index in (floor..self.control.len()).rev() {
            let at = self.code.position();
            match &mut self.control[index] {
                ControlEntry::Jumps(_) => {}
                ControlEntry::Finally(scope) => {
                    let label = match scope.temps.iter().find(|t| t.target == target) {
                        Some(temp) => temp.label,
                        None => {
                            let label = self.code.new_label();
                            scope.temps.push(TempLabel { label, target });
                            label
                        }
                    };
                    self.jump(OpCode::Jump, label);
                    self.reopen(&closed);
                    return Ok(());
                }
                ControlEntry::IterClose(scope) => {
                    scope.suspend(at);
                    let register = scope.register;
                    closed.push(index);
                    self.op_with(OpCode::LoadReg, Operand::Register(register));
                    self.op(OpCode::IteratorClose);
                }
            }
        }

        match target {
            JumpTarget::Break(index) | JumpTarget::Continue(index) => {
                let depth = self.jump_scope(index)?.env_depth;
                for _ in depth..self.env_depth {
                    self.op(OpCode::PopEnv);
                }
                let scope = self.jump_scope(index)?;
                let label = match (target, scope.continue_label.as_mut()) {
                    (JumpTarget::Continue(_), Some(label)) => label.target(),
                    (JumpTarget::Continue(_), None) => {
                        return Err(Error::internal("continue target is not a loop"));
                    }
                    _ => scope.break_label.target(),
                };
                self.jump(OpCode::Jump, label);
            }
            JumpTarget::Return => {
                let register = self.return_register();
                self.op_with(OpCode::LoadReg, Operand::Register(register));
                self.op(OpCode::Return);
            }
        }
        self.reopen(&closed);
        Ok(())
    }

    fn reopen(&mut self, closed: &[usize]) {
        let at = self.code.position();
        for &index in closed {
            if let Some(ControlEntry::IterClose(scope)) = self.control.get_mut(index) {
                scope.resume(at);
            }
        }
    }
}
