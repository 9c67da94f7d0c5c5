//! Static value types of translated expressions.

use crate::ast::{Literal, LiteralValue};

/// What the generator knows about the value an expression leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValType {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// A boolean
    Boolean,
    /// A number
    Number,
    /// A number known to be an int32
    NumberInt,
    /// A number known to be a uint32
    NumberUint,
    /// A string
    String,
    /// An object
    Object,
    /// An unresolved reference; nothing is on the stack for it yet beyond
    /// its base and key
    Reference,
    /// Anything
    Any,
    /// Nothing was pushed
    Empty,
}

impl ValType {
    /// Returns true for primitive types.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            ValType::Undefined
                | ValType::Null
                | ValType::Boolean
                | ValType::Number
                | ValType::NumberInt
                | ValType::NumberUint
                | ValType::String
        )
    }

    /// Returns true for the numeric types.
    pub fn is_numeric(self) -> bool {
        matches!(self, ValType::Number | ValType::NumberInt | ValType::NumberUint)
    }

    /// Least upper bound of two branch results.
    pub fn join(self, other: ValType) -> ValType {
        if self == other {
            self
        } else if self.is_numeric() && other.is_numeric() {
            ValType::Number
        } else {
            ValType::Any
        }
    }

    /// The representation a value takes once stored: every specialised
    /// number widens to [`ValType::Number`].
    pub fn boxed(self) -> ValType {
        if self.is_numeric() { ValType::Number } else { self }
    }

    /// Type of a literal.
    pub fn of_literal(literal: &Literal) -> ValType {
        match &literal.value {
            LiteralValue::Boolean(_) => ValType::Boolean,
            LiteralValue::Null => ValType::Null,
            LiteralValue::String(_) => ValType::String,
            LiteralValue::Number(n) => Self::of_number(*n),
        }
    }

    /// Most specific type of a number constant.
    pub fn of_number(n: f64) -> ValType {
        let integral = n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative());
        if integral && n >= i32::MIN as f64 && n <= i32::MAX as f64 {
            ValType::NumberInt
        } else if integral && n >= 0.0 && n <= u32::MAX as f64 {
            ValType::NumberUint
        } else {
            ValType::Number
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_constants() {
        assert_eq!(ValType::of_number(3.0), ValType::NumberInt);
        assert_eq!(ValType::of_number(-0.0), ValType::Number);
        assert_eq!(ValType::of_number(3_000_000_000.0), ValType::NumberUint);
        assert_eq!(ValType::of_number(0.5), ValType::Number);
        assert_eq!(ValType::of_number(f64::NAN), ValType::Number);
    }

    #[test]
    fn test_join() {
        assert_eq!(ValType::NumberInt.join(ValType::NumberUint), ValType::Number);
        assert_eq!(ValType::String.join(ValType::String), ValType::String);
        assert_eq!(ValType::String.join(ValType::Number), ValType::Any);
        assert_eq!(ValType::NumberInt.boxed(), ValType::Number);
        assert!(!ValType::Object.is_primitive());
    }
}
