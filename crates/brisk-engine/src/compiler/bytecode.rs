//! Bytecode definitions.
//!
//! A compiled unit is a flat vector of [`Instruction`]s over an operand
//! stack, plus side tables: constants, nested function templates, exception
//! handler ranges, the coroutine resume table and switch jump tables.
//! Branch targets are emitted as [`Operand::Label`] and rewritten to
//! [`Operand::Jump`] by [`Bytecode::resolve_labels`] once the unit is complete.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::runtime::exception::ErrorKind;

/// A constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Number literal
    Number(f64),
    /// String literal or identifier name
    String(Arc<str>),
}

/// Index of a branch target in the label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

/// What a function template compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Top level of a script
    Script,
    /// Top level of a module
    Module,
    /// `function`
    Normal,
    /// `=>`
    Arrow,
    /// `function*`
    Generator,
    /// `async function`
    Async,
    /// `async =>`
    AsyncArrow,
}

impl FunctionKind {
    /// Returns true for bodies compiled with a resume dispatch.
    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            FunctionKind::Generator | FunctionKind::Async | FunctionKind::AsyncArrow
        )
    }

    /// Returns true for arrow functions, which capture `this`.
    pub fn is_arrow(self) -> bool {
        matches!(self, FunctionKind::Arrow | FunctionKind::AsyncArrow)
    }

    /// Returns true for async functions.
    pub fn is_async(self) -> bool {
        matches!(self, FunctionKind::Async | FunctionKind::AsyncArrow)
    }
}

/// A compiled function body, shared by every closure created from it.
#[derive(Debug, Clone)]
pub struct FunctionTemplate {
    /// Declared or inferred name
    pub name: Arc<str>,
    /// Function flavor
    pub kind: FunctionKind,
    /// Number of formal parameters
    pub param_count: u32,
    /// Strict mode code
    pub strict: bool,
    /// The body
    pub bytecode: Bytecode,
}

/// What the VM does when an exception unwinds through a handler range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Push the exception value and jump to the target
    Catch,
    /// Store the pending exception in `register` and jump to the target
    Finally {
        /// Register receiving the pending exception
        register: u32,
    },
    /// Record the exception pending in `register` as suppressed by the
    /// new one, then keep unwinding
    Suppress {
        /// Register holding the superseded exception
        register: u32,
    },
    /// Call `return` on the iterator in `register`, then keep unwinding
    IterClose {
        /// Register holding the iterator
        register: u32,
    },
}

impl HandlerKind {
    /// Returns true when the handler transfers control to its target.
    pub fn catches(self) -> bool {
        matches!(self, HandlerKind::Catch | HandlerKind::Finally { .. })
    }
}

/// A protected instruction range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First protected instruction
    pub start: usize,
    /// One past the last protected instruction
    pub end: usize,
    /// Handler entry point; unused for non-catching kinds
    pub target: usize,
    /// Handler behavior
    pub kind: HandlerKind,
}

impl ExceptionHandler {
    /// Returns true when `ip` lies in the protected range.
    pub fn covers(&self, ip: usize) -> bool {
        self.start <= ip && ip < self.end
    }
}

/// A case value in a switch jump table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SwitchKey {
    /// int32 literal
    Int(i32),
    /// String literal
    String(Arc<str>),
}

/// Case values of a switch table and their entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchCases {
    /// Every case is an int32 literal
    Int(Vec<(i32, usize)>),
    /// Every case is a string literal
    String(FxHashMap<Arc<str>, usize>),
}

impl Default for SwitchCases {
    fn default() -> Self {
        SwitchCases::Int(Vec::new())
    }
}

/// A jump table used by `switch` when every case is an int32 literal or
/// every case is a string literal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchTable {
    /// Case values and their entry points
    pub cases: SwitchCases,
    /// Entry point when no case matches
    pub default: usize,
}

impl SwitchTable {
    /// Entry point for a number discriminant.
    pub fn number_target(&self, value: f64) -> usize {
        let SwitchCases::Int(cases) = &self.cases else {
            return self.default;
        };
        if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
            return self.default;
        }
        let key = value as i32;
        cases
            .iter()
            .find(|(case, _)| *case == key)
            .map_or(self.default, |(_, target)| *target)
    }

    /// Entry point for a string discriminant.
    pub fn string_target(&self, value: &str) -> usize {
        match &self.cases {
            SwitchCases::String(cases) => cases.get(value).copied().unwrap_or(self.default),
            SwitchCases::Int(_) => self.default,
        }
    }
}

/// A compiled bytecode chunk.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    /// The instructions
    pub instructions: Vec<Instruction>,
    /// The constant pool
    pub constants: Vec<Constant>,
    /// Nested function templates, referenced by `Closure`
    pub functions: Vec<Arc<FunctionTemplate>>,
    /// Exception handler ranges, innermost first
    pub handlers: Vec<ExceptionHandler>,
    /// Entry point of each suspend state, indexed by state id
    pub resume_table: Vec<usize>,
    /// Entry points of out-of-line declaration units
    pub units: Vec<usize>,
    /// Integer switch tables
    pub switch_tables: Vec<SwitchTable>,
    /// Number of registers the frame allocates
    pub register_count: u32,
    labels: Vec<Option<usize>>,
    pending_resume: Vec<LabelId>,
    pending_units: Vec<LabelId>,
    pending_tables: Vec<(Vec<(SwitchKey, LabelId)>, LabelId)>,
    pending_handlers: Vec<(usize, usize, LabelId, HandlerKind)>,
}

impl Bytecode {
    /// Creates a new empty bytecode chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        self.instructions.push(instruction);
        index
    }

    /// Position of the next instruction.
    pub fn position(&self) -> usize {
        self.instructions.len()
    }

    /// Adds a constant and returns its index. Strings are deduplicated.
    pub fn add_constant(&mut self, value: Constant) -> u32 {
        if let Constant::String(s) = &value {
            if let Some(index) = self
                .constants
                .iter()
                .position(|c| matches!(c, Constant::String(existing) if existing == s))
            {
                return index as u32;
            }
        }
        let index = self.constants.len();
        self.constants.push(value);
        index as u32
    }

    /// Adds a name to the constant pool.
    pub fn add_name(&mut self, name: &str) -> u32 {
        self.add_constant(Constant::String(Arc::from(name)))
    }

    /// Returns the string constant at `index`.
    pub fn name(&self, index: u32) -> &str {
        match self.constants.get(index as usize) {
            Some(Constant::String(s)) => s,
            _ => "",
        }
    }

    /// Adds a nested function and returns its index.
    pub fn add_function(&mut self, function: Arc<FunctionTemplate>) -> u32 {
        self.functions.push(function);
        (self.functions.len() - 1) as u32
    }

    /// Allocates an unplaced label.
    pub fn new_label(&mut self) -> LabelId {
        self.labels.push(None);
        LabelId((self.labels.len() - 1) as u32)
    }

    /// Places `label` at the next instruction.
    pub fn place_label(&mut self, label: LabelId) {
        self.labels[label.0 as usize] = Some(self.instructions.len());
    }

    /// Returns true when `label` has been placed.
    pub fn is_placed(&self, label: LabelId) -> bool {
        self.labels
            .get(label.0 as usize)
            .is_some_and(|pos| pos.is_some())
    }

    /// Registers a suspend state whose entry is `label`; returns the state id.
    pub fn add_resume_point(&mut self, label: LabelId) -> u32 {
        self.pending_resume.push(label);
        (self.pending_resume.len() - 1) as u32
    }

    /// Registers an out-of-line unit entered at `label`.
    pub fn add_unit(&mut self, label: LabelId) -> u32 {
        self.pending_units.push(label);
        (self.pending_units.len() - 1) as u32
    }

    /// Registers a switch table; returns its index.
    pub fn add_switch_table(&mut self, cases: Vec<(SwitchKey, LabelId)>, default: LabelId) -> u32 {
        self.pending_tables.push((cases, default));
        (self.pending_tables.len() - 1) as u32
    }

    /// Registers a handler over `[start, end)`.
    pub fn add_handler(&mut self, start: usize, end: usize, target: LabelId, kind: HandlerKind) {
        if start < end {
            self.pending_handlers.push((start, end, target, kind));
        }
    }

    /// Rewrites every label reference to an absolute position.
    ///
    /// Fails when a referenced label was never placed.
    pub fn resolve_labels(&mut self) -> crate::Result<()> {
        let labels = std::mem::take(&mut self.labels);
        let resolve = |label: LabelId| -> crate::Result<usize> {
            labels
                .get(label.0 as usize)
                .copied()
                .flatten()
                .ok_or_else(|| crate::Error::internal(format!("label L{} never placed", label.0)))
        };

        for instruction in &mut self.instructions {
            if let Some(Operand::Label(label)) = instruction.operand {
                instruction.operand = Some(Operand::Jump(resolve(label)?));
            }
        }
        self.resume_table = self
            .pending_resume
            .drain(..)
            .map(resolve)
            .collect::<crate::Result<_>>()?;
        self.units = self
            .pending_units
            .drain(..)
            .map(resolve)
            .collect::<crate::Result<_>>()?;
        for (keys, default) in std::mem::take(&mut self.pending_tables) {
            let cases = match keys.first() {
                Some((SwitchKey::String(_), _)) => {
                    let mut cases = FxHashMap::default();
                    for (key, label) in keys {
                        let SwitchKey::String(key) = key else {
                            return Err(crate::Error::internal("mixed switch table keys"));
                        };
                        cases.entry(key).or_insert(resolve(label)?);
                    }
                    SwitchCases::String(cases)
                }
                _ => {
                    let mut cases = Vec::with_capacity(keys.len());
                    for (key, label) in keys {
                        let SwitchKey::Int(key) = key else {
                            return Err(crate::Error::internal("mixed switch table keys"));
                        };
                        cases.push((key, resolve(label)?));
                    }
                    SwitchCases::Int(cases)
                }
            };
            self.switch_tables.push(SwitchTable {
                cases,
                default: resolve(default)?,
            });
        }
        for (start, end, target, kind) in std::mem::take(&mut self.pending_handlers) {
            let target = if kind.catches() { resolve(target)? } else { 0 };
            self.handlers.push(ExceptionHandler {
                start,
                end,
                target,
                kind,
            });
        }
        Ok(())
    }

    /// Counts instructions with the given opcode, nested functions excluded.
    pub fn count(&self, opcode: OpCode) -> usize {
        self.instructions
            .iter()
            .filter(|i| i.opcode == opcode)
            .count()
    }
}

/// A single bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation code
    pub opcode: OpCode,
    /// Optional operand
    pub operand: Option<Operand>,
}

impl Instruction {
    /// Creates a new instruction with no operand.
    pub fn simple(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: None,
        }
    }

    /// Creates a new instruction with an operand.
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Self {
            opcode,
            operand: Some(operand),
        }
    }
}

/// Instruction operands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// Constant pool index
    Constant(u32),
    /// Constant pool index of an identifier or property name
    Name(u32),
    /// A name plus a flag whose meaning depends on the opcode
    /// (deletable, strict or const)
    Binding {
        /// Constant pool index of the name
        name: u32,
        /// Opcode-specific flag
        flag: bool,
    },
    /// Environment slot
    Slot {
        /// Records to walk up
        hops: u32,
        /// Slot in the record
        slot: u32,
    },
    /// Frame register
    Register(u32),
    /// Unresolved branch target
    Label(LabelId),
    /// Resolved branch target
    Jump(usize),
    /// Argument count
    ArgCount(u32),
    /// Element count or index
    Count(u32),
    /// Index into `functions`
    Function(u32),
    /// Index into `units`
    Unit(u32),
    /// Index into `switch_tables`
    Table(u32),
    /// Suspend state id
    State(u32),
    /// Boolean flag
    Flag(bool),
    /// Error to throw
    Error {
        /// Error constructor
        kind: ErrorKind,
        /// Constant pool index of the message
        message: u32,
    },
}

/// Operation codes for the VM.
///
/// Stack effects are written `[before] -> [after]`, top of stack last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // Stack operations
    /// `[a] -> []`
    Pop,
    /// `[a] -> [a, a]`
    Dup,
    /// `[a, b] -> [a, b, a, b]`
    Dup2,
    /// `[a, b] -> [b, a]`
    Swap,
    /// `[a, b, c] -> [c, a, b]`
    Rot3,
    /// `[a, b, c, d] -> [d, a, b, c]`
    Rot4,
    /// Empty the operand stack
    ClearStack,
    /// Push a constant
    Const,
    /// Push undefined
    Undefined,
    /// Push null
    Null,
    /// Push true
    True,
    /// Push false
    False,
    /// Push a register (undefined when empty)
    LoadReg,
    /// Pop into a register
    StoreReg,

    // Environments
    /// Push an empty declarative record
    PushBlockEnv,
    /// Pop the innermost record
    PopEnv,
    /// Replace the innermost declarative record with a copy
    CopyEnv,
    /// Save the current record in a register
    SaveEnv,
    /// Restore the record saved in a register
    RestoreEnv,
    /// `[obj] -> []`, push an object record
    PushWithEnv,
    /// Create an uninitialized mutable binding (flag: deletable)
    CreateMutableBinding,
    /// Create an uninitialized immutable binding (flag: strict)
    CreateImmutableBinding,
    /// `[v] -> []`, initialize a slot
    InitializeBinding,

    // Variable access
    /// Push a slot that is always initialized
    GetSlot,
    /// Push a slot, throwing in its temporal dead zone
    GetSlotChecked,
    /// `[v] -> []`, assign a slot
    SetSlot,
    /// Push a name resolved through the record chain
    GetName,
    /// Push `[f, this]` for a call through the record chain
    GetNameWithThis,
    /// `[v] -> []`, assign through the record chain (flag: strict)
    SetName,
    /// Push the result of deleting a name
    DeleteName,
    /// Push `typeof name` without throwing for unresolvable names
    TypeofName,
    /// Push a global
    GetGlobal,
    /// `[v] -> []`, assign a global (flag: strict)
    SetGlobal,
    /// `[v] -> []`, initialize a global lexical binding
    InitGlobal,
    /// Push `typeof name` for a global
    TypeofGlobal,

    // Global declaration instantiation
    /// Throw if a lexical name collides with an existing global
    CheckGlobalLexical,
    /// Throw if a var name collides with a global lexical
    CheckGlobalVar,
    /// Throw if a global function binding cannot be created
    CheckGlobalFunction,
    /// Throw if a global var binding cannot be created
    CheckGlobalVarDeclarable,
    /// `[f] -> []`, create a global function binding (flag: deletable)
    CreateGlobalFunction,
    /// Create a global var binding (flag: deletable)
    CreateGlobalVar,
    /// Create an uninitialized global lexical (flag: const)
    CreateGlobalLexical,

    // Functions
    /// Push a pre-resolved module import
    LoadImport,
    /// Run an out-of-line unit and come back
    CallUnit,
    /// Leave an out-of-line unit
    ReturnUnit,
    /// Push a closure over the current record
    Closure,
    /// Push an argument (undefined when absent)
    LoadArg,
    /// Push the function being executed
    LoadCallee,
    /// Push a fresh arguments object
    CreateArguments,
    /// Push `this`
    This,
    /// `[f, this, args..] -> [result]`
    Call,
    /// `[f, this, args..] -> !`, call in tail position
    TailCall,
    /// `[f, args..] -> [obj]`
    New,
    /// `[v] -> !`
    Return,

    // Properties
    /// `[obj] -> [v]`
    GetProp,
    /// `[obj, key] -> [v]`
    GetElem,
    /// `[obj, v] -> [v]`
    SetProp,
    /// `[obj, key, v] -> [v]`
    SetElem,
    /// `[obj] -> [bool]`
    DeleteProp,
    /// `[obj, key] -> [bool]`
    DeleteElem,
    /// Push an empty object
    NewObject,
    /// `[obj, v] -> [obj]`
    DefineField,
    /// `[obj, key, v] -> [obj]`
    DefineComputed,
    /// `[v0..vn] -> [array]`
    NewArray,

    // Operators
    /// Generic `+`
    Add,
    /// `[str, str] -> [str]`
    Concat,
    /// Subtract
    Sub,
    /// Multiply
    Mul,
    /// Divide
    Div,
    /// Modulo
    Mod,
    /// Exponentiation
    Exp,
    /// Bitwise AND
    BitAnd,
    /// Bitwise OR
    BitOr,
    /// Bitwise XOR
    BitXor,
    /// Left shift
    Shl,
    /// Signed right shift
    Shr,
    /// Unsigned right shift
    UShr,
    /// Negate (unary minus)
    Neg,
    /// Bitwise NOT
    BitNot,
    /// Logical NOT of a boolean
    Not,
    /// Add one to a number
    Inc,
    /// Subtract one from a number
    Dec,
    /// Less than
    Lt,
    /// Greater than
    Gt,
    /// Less than or equal
    Le,
    /// Greater than or equal
    Ge,
    /// Equal (==)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Strict equal (===)
    StrictEq,
    /// Strict not equal (!==)
    StrictNe,
    /// instanceof operator
    InstanceOf,
    /// in operator
    In,
    /// typeof operator
    Typeof,
    /// `[v] -> [bool]`, true for null and undefined
    IsNullish,

    // Coercions
    /// ToBoolean
    ToBoolean,
    /// ToNumber
    ToNumber,
    /// ToInt32
    ToInt32,
    /// ToUint32
    ToUint32,
    /// ToString
    ToString,
    /// ToObject
    ToObject,
    /// ToPropertyKey
    ToPropertyKey,
    /// ToPrimitive with no hint
    ToPrimitive,

    // Control flow
    /// Unconditional jump
    Jump,
    /// `[bool] -> []`
    JumpIfTrue,
    /// `[bool] -> []`
    JumpIfFalse,
    /// `[v] -> []`, dispatch through an integer table
    SwitchTable,
    /// `[v] -> !`
    Throw,
    /// Throw a new error object
    ThrowError,
    /// Rethrow the exception pending in a register
    Rethrow,

    // Coroutines
    /// Jump to the entry of the saved suspend state, if resuming
    ResumeDispatch,
    /// `[v] -> !`, save the frame and hand `v` to the resumer
    Suspend,
    /// Throw if resumed with `throw`
    ThrowAfterResume,
    /// Push the value and jump if resumed with `return`
    ReturnAfterResume,
    /// Jump if resumed with `throw`
    JumpIfResumeThrow,
    /// Jump if resumed with `return`
    JumpIfResumeReturn,
    /// Push the value the frame was resumed with
    ResumeValue,
    /// `[v] -> [promise]`
    Await,
    /// `[v] -> [{ value: v, done }]`
    CreateIterResult,

    // Iteration
    /// `[iterable] -> [iterator]`
    GetIterator,
    /// `[iterator, v] -> [result]`
    IteratorNext,
    /// `[result] -> [bool]`
    IteratorComplete,
    /// `[result] -> [v]`
    IteratorValue,
    /// `[iterator] -> []`
    IteratorClose,
    /// `[obj] -> [method | undefined]`
    GetMethod,
    /// `[v] -> [v]`, throw unless `v` is an object
    RequireObject,
    /// `[obj] -> [iterator over enumerable keys]`
    EnumerateKeys,

    // Special
    /// No operation
    Nop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_resolve_to_positions() {
        let mut code = Bytecode::new();
        let end = code.new_label();
        code.emit(Instruction::with_operand(OpCode::Jump, Operand::Label(end)));
        code.emit(Instruction::simple(OpCode::Nop));
        code.place_label(end);
        code.emit(Instruction::simple(OpCode::Undefined));
        code.resolve_labels().unwrap();
        assert_eq!(code.instructions[0].operand, Some(Operand::Jump(2)));
    }

    #[test]
    fn test_unplaced_label_is_internal_error() {
        let mut code = Bytecode::new();
        let nowhere = code.new_label();
        code.emit(Instruction::with_operand(OpCode::Jump, Operand::Label(nowhere)));
        assert!(matches!(code.resolve_labels(), Err(crate::Error::Internal(_))));
    }

    #[test]
    fn test_string_constants_are_deduplicated() {
        let mut code = Bytecode::new();
        let a = code.add_name("x");
        let b = code.add_name("x");
        let c = code.add_constant(Constant::Number(1.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(code.name(a), "x");
    }

    #[test]
    fn test_switch_table_lookup() {
        let table = SwitchTable {
            cases: SwitchCases::Int(vec![(1, 10), (-2, 20)]),
            default: 99,
        };
        assert_eq!(table.number_target(1.0), 10);
        assert_eq!(table.number_target(-2.0), 20);
        assert_eq!(table.number_target(-0.0), 99);
        assert_eq!(table.number_target(1.5), 99);
        assert_eq!(table.number_target(f64::NAN), 99);
        assert_eq!(table.string_target("1"), 99);
    }

    #[test]
    fn test_string_switch_table_lookup() {
        let mut code = Bytecode::new();
        let a = code.new_label();
        let b = code.new_label();
        let other = code.new_label();
        let index = code.add_switch_table(
            vec![
                (SwitchKey::String("a".into()), a),
                (SwitchKey::String("b".into()), b),
                (SwitchKey::String("a".into()), b),
            ],
            other,
        );
        code.place_label(a);
        code.emit(Instruction::simple(OpCode::Nop));
        code.place_label(b);
        code.emit(Instruction::simple(OpCode::Nop));
        code.place_label(other);
        code.resolve_labels().unwrap();

        let table = &code.switch_tables[index as usize];
        assert_eq!(table.string_target("a"), 0);
        assert_eq!(table.string_target("b"), 1);
        assert_eq!(table.string_target("c"), 2);
        assert_eq!(table.number_target(1.0), 2);
    }

    #[test]
    fn test_empty_handler_ranges_are_dropped() {
        let mut code = Bytecode::new();
        let target = code.new_label();
        code.place_label(target);
        code.add_handler(3, 3, target, HandlerKind::Catch);
        code.resolve_labels().unwrap();
        assert!(code.handlers.is_empty());
    }
}
