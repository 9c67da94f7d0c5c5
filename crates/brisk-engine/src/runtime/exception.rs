//! Exceptions raised by generated code.

use std::fmt;

use super::value::Value;

/// Result of an operation that may throw.
pub type JsResult<T> = std::result::Result<T, Exception>;

/// Native error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Error
    Error,
    /// TypeError
    TypeError,
    /// ReferenceError
    ReferenceError,
    /// SyntaxError
    SyntaxError,
    /// RangeError
    RangeError,
    /// InternalError
    InternalError,
}

impl ErrorKind {
    /// All kinds, in realm setup order.
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
        ErrorKind::RangeError,
        ErrorKind::InternalError,
    ];

    /// The constructor name.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A thrown value and the exceptions it superseded.
#[derive(Debug, Clone, PartialEq)]
pub struct Thrown {
    /// The thrown value
    pub value: Value,
    /// Exceptions discarded while unwinding through `finally` blocks
    pub suppressed: Vec<Value>,
}

impl Thrown {
    /// Wraps a thrown value.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            suppressed: Vec::new(),
        }
    }
}

/// An exception unwinding through the VM.
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// A value thrown by `throw`, or an error already materialized
    Thrown(Thrown),
    /// A native error not yet turned into an object
    Error {
        /// Constructor
        kind: ErrorKind,
        /// Message
        message: String,
    },
    /// The call depth limit was reached
    StackOverflow,
}

impl Exception {
    /// Throws `value`.
    pub fn throw(value: Value) -> Self {
        Exception::Thrown(Thrown::new(value))
    }

    /// A native error.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Exception::Error {
            kind,
            message: message.into(),
        }
    }

    /// A TypeError.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::TypeError, message)
    }

    /// A ReferenceError.
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::ReferenceError, message)
    }

    /// A SyntaxError.
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::SyntaxError, message)
    }

    /// ReferenceError for a binding read in its temporal dead zone.
    pub fn uninitialized(name: &str) -> Self {
        Self::reference_error(format!("Cannot access '{name}' before initialization"))
    }

    /// ReferenceError for an unresolvable name.
    pub fn not_defined(name: &str) -> Self {
        Self::reference_error(format!("{name} is not defined"))
    }

    /// TypeError for an assignment to an immutable binding.
    pub fn const_assignment() -> Self {
        Self::type_error("Assignment to constant variable.")
    }

    /// Returns true for the host stack-overflow fault.
    pub fn is_stack_overflow(&self) -> bool {
        matches!(self, Exception::StackOverflow)
    }
}
