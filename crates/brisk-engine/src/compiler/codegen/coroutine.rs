//! Coroutine lowering.
//!
//! A resumable body starts with `ResumeDispatch`. Every suspension point
//! registers a resume label; on re-entry the dispatch jumps straight to it
//! with the resumption (next, throw or return) parked in the frame, and the
//! code after the label decides what to do with it.

use super::labels::JumpTarget;
use super::{CodeGenerator, ValType};
use crate::ast::{Expression, YieldExpression};
use crate::compiler::bytecode::{FunctionKind, LabelId, OpCode, Operand};
use crate::error::{Error, Result};
use crate::runtime::exception::ErrorKind;

impl CodeGenerator<'_> {
    /// Emits `Suspend` and places its resume label right after it.
    fn suspend(&mut self) {
        let resume = self.label();
        let state = self.code.add_resume_point(resume);
        self.op_with(OpCode::Suspend, Operand::State(state));
        self.place(resume);
    }

    /// The initial suspension of a generator, taken once the prologue has
    /// instantiated its declarations. The first `next` argument is dropped.
    pub(super) fn generator_start(&mut self) {
        self.op(OpCode::Undefined);
        self.suspend();
        self.op(OpCode::ResumeValue);
        self.op(OpCode::Pop);
    }

    /// Stores the value on top of the stack as the return value and leaves
    /// through any pending cleanup.
    fn return_from_stack(&mut self) -> Result<()> {
        let register = self.return_register();
        self.op_with(OpCode::StoreReg, Operand::Register(register));
        self.op(OpCode::ClearStack);
        self.jump_to(JumpTarget::Return)
    }

    pub(super) fn yield_expression(&mut self, y: &YieldExpression) -> Result<ValType> {
        if self.kind != FunctionKind::Generator {
            return Err(Error::internal("yield outside of a generator"));
        }
        if y.delegate {
            let argument = y
                .argument
                .as_deref()
                .ok_or_else(|| Error::internal("yield* without an operand"))?;
            return self.yield_star(argument);
        }

        match y.argument.as_deref() {
            Some(argument) => {
                self.expression_boxed(argument)?;
            }
            None => {
                self.op(OpCode::Undefined);
            }
        }
        self.op_with(OpCode::CreateIterResult, Operand::Flag(false));
        self.suspend();

        let on_return = self.label();
        let resumed = self.label();
        self.op(OpCode::ThrowAfterResume);
        self.jump(OpCode::ReturnAfterResume, on_return);
        self.op(OpCode::ResumeValue);
        self.jump(OpCode::Jump, resumed);

        self.place(on_return);
        self.return_from_stack()?;
        self.place(resumed);
        Ok(ValType::Any)
    }

    /// `yield*`: forwards every resumption to the inner iterator until it
    /// reports completion.
    fn yield_star(&mut self, argument: &Expression) -> Result<ValType> {
        let iterator = self.new_register();
        let received = self.new_register();

        self.expression_boxed(argument)?;
        self.op(OpCode::GetIterator);
        self.op_with(OpCode::StoreReg, Operand::Register(iterator));
        self.op(OpCode::Undefined);
        self.op_with(OpCode::StoreReg, Operand::Register(received));

        let next = self.label();
        let check = self.label();
        let outer_yield = self.label();
        let on_throw = self.label();
        let on_return = self.label();
        let done = self.label();

        // Inner result objects are passed through to the caller unwrapped.
        self.place(next);
        self.op_with(OpCode::LoadReg, Operand::Register(iterator));
        self.op_with(OpCode::LoadReg, Operand::Register(received));
        self.op(OpCode::IteratorNext);
        self.place(check);
        self.op(OpCode::Dup);
        self.op(OpCode::IteratorComplete);
        self.jump(OpCode::JumpIfTrue, done);
        self.place(outer_yield);
        self.suspend();
        self.jump(OpCode::JumpIfResumeThrow, on_throw);
        self.jump(OpCode::JumpIfResumeReturn, on_return);
        self.op(OpCode::ResumeValue);
        self.op_with(OpCode::StoreReg, Operand::Register(received));
        self.jump(OpCode::Jump, next);

        // throw(): delegate, or close the inner iterator and fail.
        self.place(on_throw);
        let no_throw = self.label();
        self.forward_to_method(iterator, received, "throw", no_throw);
        self.jump(OpCode::Jump, check);
        self.place(no_throw);
        self.op(OpCode::Pop);
        self.op_with(OpCode::LoadReg, Operand::Register(iterator));
        self.op(OpCode::IteratorClose);
        self.throw_error(ErrorKind::TypeError, "iterator.throw is not callable");

        // return(): delegate, finishing once the inner iterator is done.
        self.place(on_return);
        let no_return = self.label();
        self.forward_to_method(iterator, received, "return", no_return);
        self.op(OpCode::Dup);
        self.op(OpCode::IteratorComplete);
        self.jump(OpCode::JumpIfFalse, outer_yield);
        self.op(OpCode::IteratorValue);
        self.return_from_stack()?;
        self.place(no_return);
        self.op(OpCode::Pop);
        self.op_with(OpCode::LoadReg, Operand::Register(received));
        self.return_from_stack()?;

        self.place(done);
        self.op(OpCode::IteratorValue);
        Ok(ValType::Any)
    }

    /// Takes the pending resumption into `received` and calls `method` on
    /// the inner iterator with it, leaving the result object on the stack.
    /// Jumps to `missing` with the method still on the stack when the
    /// iterator has none.
    fn forward_to_method(
        &mut self,
        iterator: u32,
        received: u32,
        method: &str,
        missing: LabelId,
    ) {
        self.op(OpCode::ResumeValue);
        self.op_with(OpCode::StoreReg, Operand::Register(received));
        self.op_with(OpCode::LoadReg, Operand::Register(iterator));
        let operand = self.name_operand(method);
        self.op_with(OpCode::GetMethod, operand);
        self.op(OpCode::Dup);
        self.op(OpCode::IsNullish);
        self.jump(OpCode::JumpIfTrue, missing);
        self.op_with(OpCode::LoadReg, Operand::Register(iterator));
        self.op_with(OpCode::LoadReg, Operand::Register(received));
        self.op_with(OpCode::Call, Operand::ArgCount(1));
        self.op(OpCode::RequireObject);
    }

    /// `await`: suspends on the promise-resolved operand. A rejection comes
    /// back as a throw resumption.
    pub(super) fn await_expression(&mut self, argument: &Expression) -> Result<ValType> {
        if !self.kind.is_async() {
            return Err(Error::internal("await outside of an async function"));
        }
        self.expression_boxed(argument)?;
        self.op(OpCode::Await);
        self.suspend();
        self.op(OpCode::ThrowAfterResume);
        self.op(OpCode::ResumeValue);
        Ok(ValType::Any)
    }
}
