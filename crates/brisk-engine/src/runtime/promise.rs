//! Promise plumbing for `await`.
//!
//! Only what async functions need: promises created by the engine, a
//! `then` that chains them, and a FIFO job queue drained by
//! [`Vm::run_jobs`]. Foreign thenables are treated as plain values.

use tracing::trace;

use super::exception::{Exception, JsResult};
use super::object::{Object, ObjectKind, PromiseState, Reaction};
use super::value::Value;
use crate::gc::ObjectRef;
use crate::vm::frame::Resumption;
use crate::vm::generator::resume_async;
use crate::vm::Vm;

/// How a promise settled.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// Fulfilled with a value
    Fulfilled(Value),
    /// Rejected with a reason
    Rejected(Value),
}

/// A pending promise reaction.
#[derive(Debug, Clone)]
pub struct Job {
    /// What to run
    pub reaction: Reaction,
    /// The settlement it reacts to
    pub settlement: Settlement,
}

impl Vm {
    /// A new pending promise.
    pub fn new_promise(&mut self) -> ObjectRef {
        let prototype = self.realm.promise_prototype;
        self.heap.alloc(Object::new(
            Some(prototype),
            ObjectKind::Promise(PromiseState::Pending(Vec::new())),
        ))
    }

    fn is_promise(&self, value: &Value) -> Option<ObjectRef> {
        value
            .as_object()
            .filter(|r| matches!(self.heap.object(*r).kind, ObjectKind::Promise(_)))
    }

    /// PromiseResolve: our own promises pass through, anything else is
    /// wrapped in a fulfilled promise.
    pub fn promise_resolve(&mut self, value: Value) -> ObjectRef {
        if let Some(promise) = self.is_promise(&value) {
            return promise;
        }
        let promise = self.new_promise();
        self.settle(promise, Settlement::Fulfilled(value));
        promise
    }

    /// Resolves `promise` with `value`, adopting the state of a promise value.
    pub fn resolve_promise(&mut self, promise: ObjectRef, value: Value) {
        match self.is_promise(&value) {
            Some(inner) if inner == promise => {
                let error = self.create_error(
                    super::ErrorKind::TypeError,
                    "Chaining cycle detected for promise",
                );
                self.settle(promise, Settlement::Rejected(Value::Object(error)));
            }
            Some(inner) => self.add_reaction(inner, Reaction::Forward { target: promise }),
            None => self.settle(promise, Settlement::Fulfilled(value)),
        }
    }

    /// Rejects `promise`.
    pub fn reject_promise(&mut self, promise: ObjectRef, reason: Value) {
        self.settle(promise, Settlement::Rejected(reason));
    }

    fn settle(&mut self, promise: ObjectRef, settlement: Settlement) {
        let ObjectKind::Promise(state) = &mut self.heap.object_mut(promise).kind else {
            return;
        };
        let PromiseState::Pending(reactions) = &mut *state else {
            return;
        };
        let reactions = std::mem::take(reactions);
        *state = match &settlement {
            Settlement::Fulfilled(v) => PromiseState::Fulfilled(v.clone()),
            Settlement::Rejected(v) => PromiseState::Rejected(v.clone()),
        };
        for reaction in reactions {
            self.jobs.push_back(Job {
                reaction,
                settlement: settlement.clone(),
            });
        }
    }

    /// Runs `reaction` once `promise` settles.
    pub fn add_reaction(&mut self, promise: ObjectRef, reaction: Reaction) {
        let settlement = match &mut self.heap.object_mut(promise).kind {
            ObjectKind::Promise(PromiseState::Pending(reactions)) => {
                reactions.push(reaction);
                return;
            }
            ObjectKind::Promise(PromiseState::Fulfilled(v)) => Settlement::Fulfilled(v.clone()),
            ObjectKind::Promise(PromiseState::Rejected(v)) => Settlement::Rejected(v.clone()),
            _ => return,
        };
        self.jobs.push_back(Job {
            reaction,
            settlement,
        });
    }

    /// Returns the state of a promise value.
    pub fn promise_state(&self, value: &Value) -> Option<&PromiseState> {
        match &self.heap.object(value.as_object()?).kind {
            ObjectKind::Promise(state) => Some(state),
            _ => None,
        }
    }

    /// Drains the job queue. Returns the number of jobs run.
    pub fn run_jobs(&mut self) -> JsResult<usize> {
        let mut count = 0;
        while let Some(job) = self.jobs.pop_front() {
            count += 1;
            self.run_job(job)?;
        }
        trace!(jobs = count, "job queue drained");
        Ok(count)
    }

    fn run_job(&mut self, job: Job) -> JsResult<()> {
        match job.reaction {
            Reaction::Resume { activation } => {
                let resumption = match job.settlement {
                    Settlement::Fulfilled(v) => Resumption::Next(v),
                    Settlement::Rejected(v) => Resumption::Throw(v),
                };
                resume_async(self, activation, Some(resumption))
            }
            Reaction::Then {
                on_fulfilled,
                on_rejected,
                derived,
            } => {
                let (handler, argument, fulfilled) = match job.settlement {
                    Settlement::Fulfilled(v) => (on_fulfilled, v, true),
                    Settlement::Rejected(v) => (on_rejected, v, false),
                };
                if !self.heap.is_callable_value(&handler) {
                    if fulfilled {
                        self.resolve_promise(derived, argument);
                    } else {
                        self.reject_promise(derived, argument);
                    }
                    return Ok(());
                }
                match self.call(&handler, &Value::Undefined, &[argument]) {
                    Ok(value) => self.resolve_promise(derived, value),
                    Err(exception) => {
                        let thrown = self.materialize(exception);
                        self.reject_promise(derived, thrown.value);
                    }
                }
                Ok(())
            }
            Reaction::Forward { target } => {
                self.settle(target, job.settlement);
                Ok(())
            }
        }
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// `Promise.resolve(value)`
pub fn promise_resolve_native(vm: &mut Vm, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::Object(vm.promise_resolve(arg(args, 0))))
}

/// `Promise.reject(reason)`
pub fn promise_reject_native(vm: &mut Vm, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let promise = vm.new_promise();
    vm.reject_promise(promise, arg(args, 0));
    Ok(Value::Object(promise))
}

/// `Promise.prototype.then(onFulfilled, onRejected)`
pub fn promise_then(vm: &mut Vm, this: &Value, args: &[Value]) -> JsResult<Value> {
    let Some(promise) = vm.is_promise(this) else {
        return Err(Exception::type_error(
            "Promise.prototype.then called on a non-promise",
        ));
    };
    let derived = vm.new_promise();
    vm.add_reaction(
        promise,
        Reaction::Then {
            on_fulfilled: arg(args, 0),
            on_rejected: arg(args, 1),
            derived,
        },
    );
    Ok(Value::Object(derived))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmOptions;

    #[test]
    fn test_promise_resolve_passes_own_promises_through() {
        let mut vm = Vm::new(VmOptions::default());
        let p = vm.promise_resolve(Value::Number(1.0));
        assert_eq!(vm.promise_resolve(Value::Object(p)), p);
        assert!(matches!(
            vm.promise_state(&Value::Object(p)),
            Some(PromiseState::Fulfilled(Value::Number(n))) if *n == 1.0
        ));
    }

    #[test]
    fn test_resolution_adopts_promise_values() {
        let mut vm = Vm::new(VmOptions::default());
        let inner = vm.new_promise();
        let outer = vm.new_promise();
        vm.resolve_promise(outer, Value::Object(inner));
        assert!(matches!(
            vm.promise_state(&Value::Object(outer)),
            Some(PromiseState::Pending(_))
        ));

        vm.resolve_promise(inner, Value::from("done"));
        assert_eq!(vm.run_jobs().unwrap(), 1);
        assert!(matches!(
            vm.promise_state(&Value::Object(outer)),
            Some(PromiseState::Fulfilled(Value::String(s))) if &**s == "done"
        ));
    }

    #[test]
    fn test_self_resolution_rejects() {
        let mut vm = Vm::new(VmOptions::default());
        let p = vm.new_promise();
        vm.resolve_promise(p, Value::Object(p));
        assert!(matches!(
            vm.promise_state(&Value::Object(p)),
            Some(PromiseState::Rejected(_))
        ));
    }

    #[test]
    fn test_then_without_callbacks_passes_through() {
        let mut vm = Vm::new(VmOptions::default());
        let p = vm.new_promise();
        let derived = promise_then(&mut vm, &Value::Object(p), &[]).unwrap();
        vm.reject_promise(p, Value::from("no"));
        vm.run_jobs().unwrap();
        assert!(matches!(
            vm.promise_state(&derived),
            Some(PromiseState::Rejected(Value::String(s))) if &**s == "no"
        ));
    }
}
