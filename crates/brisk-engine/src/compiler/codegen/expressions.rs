//! Expression translation.
//!
//! [`CodeGenerator::expression`] may stop short of loading an identifier or
//! property and return [`ValType::Reference`], leaving the base (and key) on
//! the stack and the reference itself in `self.reference`. Assignment,
//! update, `delete` and `typeof` consume references directly; everything
//! else goes through [`CodeGenerator::expression_value`].

use super::{CodeGenerator, ValType};
use crate::ast::*;
use crate::compiler::bytecode::{OpCode, Operand};
use crate::error::{Error, Result};
use crate::runtime::value::number_to_string;
use crate::scope::{Name, Resolution};

/// An unresolved reference left by [`CodeGenerator::expression`].
#[derive(Debug, Clone)]
pub(super) enum Reference {
    /// A binding; nothing on the stack
    Binding(Name),
    /// A named property; `[obj]` on the stack
    Property(u32),
    /// A computed property; `[obj, key]` on the stack
    Element,
}

impl CodeGenerator<'_> {
    // ========================================================================
    // Entry points
    // ========================================================================

    pub(super) fn expression(&mut self, expr: &Expression) -> Result<ValType> {
        match expr {
            Expression::Identifier(id) => {
                let name = self.resolve(&id.name);
                self.reference = Some(Reference::Binding(name));
                Ok(ValType::Reference)
            }
            Expression::Member(m) => {
                self.expression_boxed(&m.object)?;
                let reference = match m.static_name() {
                    Some(name) => Reference::Property(self.code.add_name(name)),
                    None => {
                        let key = self.expression_value(&m.property)?;
                        self.to_property_key(key);
                        Reference::Element
                    }
                };
                self.reference = Some(reference);
                Ok(ValType::Reference)
            }
            Expression::Literal(literal) => Ok(self.literal(literal)),
            Expression::TemplateLiteral(t) => self.template_literal(t),
            Expression::This => {
                self.op(OpCode::This);
                Ok(ValType::Any)
            }
            Expression::Array(array) => {
                for element in &array.elements {
                    match element {
                        Some(element) => {
                            self.expression_boxed(element)?;
                        }
                        None => {
                            self.op(OpCode::Undefined);
                        }
                    }
                }
                self.op_with(OpCode::NewArray, Operand::Count(array.elements.len() as u32));
                Ok(ValType::Object)
            }
            Expression::Object(object) => self.object_literal(object),
            Expression::Function(f) | Expression::ArrowFunction(f) => {
                let index = self.function_index(f)?;
                self.op_with(OpCode::Closure, Operand::Function(index));
                Ok(ValType::Object)
            }
            Expression::Unary(u) => self.unary(u),
            Expression::Update(u) => self.update(u),
            Expression::Binary(b) => self.binary(b),
            Expression::Logical(l) => self.logical(l),
            Expression::Assignment(a) => self.assignment(a),
            Expression::Conditional(c) => {
                self.condition(&c.test)?;
                let otherwise = self.label();
                let end = self.label();
                self.jump(OpCode::JumpIfFalse, otherwise);
                let consequent = self.expression_boxed(&c.consequent)?;
                self.jump(OpCode::Jump, end);
                self.place(otherwise);
                let alternate = self.expression_boxed(&c.alternate)?;
                self.place(end);
                Ok(consequent.join(alternate))
            }
            Expression::Call(call) => self.call_expression(call, false),
            Expression::New(call) => {
                self.expression_boxed(&call.callee)?;
                let count = self.arguments(&call.arguments)?;
                self.op_with(OpCode::New, Operand::ArgCount(count));
                Ok(ValType::Object)
            }
            Expression::Sequence(s) => {
                let mut ty = ValType::Undefined;
                for (i, expr) in s.expressions.iter().enumerate() {
                    if i > 0 {
                        self.op(OpCode::Pop);
                    }
                    ty = self.expression_value(expr)?;
                }
                if s.expressions.is_empty() {
                    self.op(OpCode::Undefined);
                }
                Ok(ty)
            }
            Expression::Yield(y) => self.yield_expression(y),
            Expression::Await(a) => self.await_expression(&a.argument),
        }
    }

    /// Translates `expr` and dereferences a reference result.
    pub(super) fn expression_value(&mut self, expr: &Expression) -> Result<ValType> {
        match self.expression(expr)? {
            ValType::Reference => {
                self.get_value()?;
                Ok(ValType::Any)
            }
            ty => Ok(ty),
        }
    }

    /// Like [`Self::expression_value`], widened to the stored representation.
    pub(super) fn expression_boxed(&mut self, expr: &Expression) -> Result<ValType> {
        Ok(self.expression_value(expr)?.boxed())
    }

    fn take_reference(&mut self) -> Result<Reference> {
        self.reference
            .take()
            .ok_or_else(|| Error::internal("expected a reference"))
    }

    fn get_value(&mut self) -> Result<()> {
        match self.take_reference()? {
            Reference::Binding(name) => self.load_binding(&name),
            Reference::Property(name) => {
                self.op_with(OpCode::GetProp, Operand::Name(name));
            }
            Reference::Element => {
                self.op(OpCode::GetElem);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    pub(super) fn load_binding(&mut self, name: &Name) {
        match name.resolution {
            Resolution::Static { hops, slot, .. } => {
                let opcode = if name.needs_tdz_check() {
                    OpCode::GetSlotChecked
                } else {
                    OpCode::GetSlot
                };
                self.op_with(opcode, Operand::Slot { hops, slot });
            }
            Resolution::Global => {
                let operand = self.name_operand(&name.identifier);
                self.op_with(OpCode::GetGlobal, operand);
            }
            Resolution::Dynamic | Resolution::Unresolved => {
                let operand = self.name_operand(&name.identifier);
                self.op_with(OpCode::GetName, operand);
            }
        }
    }

    /// Pops the top of stack into `name`.
    pub(super) fn store_name(&mut self, name: &Name) {
        match name.resolution {
            Resolution::Static { hops, slot, .. } => {
                self.op_with(OpCode::SetSlot, Operand::Slot { hops, slot });
            }
            Resolution::Global => {
                let operand = self.binding_operand(&name.identifier, self.strict);
                self.op_with(OpCode::SetGlobal, operand);
            }
            Resolution::Dynamic | Resolution::Unresolved => {
                let operand = self.binding_operand(&name.identifier, self.strict);
                self.op_with(OpCode::SetName, operand);
            }
        }
    }

    pub(super) fn store_binding(&mut self, identifier: &str) -> Result<()> {
        let name = self.resolve(identifier);
        self.store_name(&name);
        Ok(())
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    pub(super) fn to_boolean(&mut self, ty: ValType) {
        if ty != ValType::Boolean {
            self.op(OpCode::ToBoolean);
        }
    }

    fn to_number(&mut self, ty: ValType) {
        if !ty.is_numeric() {
            self.op(OpCode::ToNumber);
        }
    }

    fn to_primitive(&mut self, ty: ValType) {
        if !ty.is_primitive() {
            self.op(OpCode::ToPrimitive);
        }
    }

    fn to_string(&mut self, ty: ValType) {
        if ty != ValType::String {
            self.op(OpCode::ToString);
        }
    }

    pub(super) fn to_property_key(&mut self, ty: ValType) {
        if !(ty == ValType::String || ty.is_numeric()) {
            self.op(OpCode::ToPropertyKey);
        }
    }

    // ========================================================================
    // Literals
    // ========================================================================

    fn literal(&mut self, literal: &Literal) -> ValType {
        match &literal.value {
            LiteralValue::Boolean(true) => {
                self.op(OpCode::True);
            }
            LiteralValue::Boolean(false) => {
                self.op(OpCode::False);
            }
            LiteralValue::Null => {
                self.op(OpCode::Null);
            }
            LiteralValue::Number(n) => self.number(*n),
            LiteralValue::String(s) => self.string(s),
        }
        ValType::of_literal(literal)
    }

    fn template_literal(&mut self, template: &TemplateLiteral) -> Result<ValType> {
        let head = template
            .quasis
            .first()
            .map(|q| q.value.cooked.as_str())
            .unwrap_or_default();
        self.string(head);
        for (i, expr) in template.expressions.iter().enumerate() {
            let ty = self.expression_value(expr)?;
            self.to_string(ty);
            self.op(OpCode::Concat);
            if let Some(quasi) = template.quasis.get(i + 1) {
                if !quasi.value.cooked.is_empty() {
                    self.string(&quasi.value.cooked);
                    self.op(OpCode::Concat);
                }
            }
        }
        Ok(ValType::String)
    }

    fn object_literal(&mut self, object: &ObjectExpression) -> Result<ValType> {
        self.op(OpCode::NewObject);
        for property in &object.properties {
            if property.computed {
                self.expression_boxed(&property.key)?;
                self.expression_boxed(&property.value)?;
                self.op(OpCode::DefineComputed);
                continue;
            }
            let key = match &property.key {
                Expression::Identifier(id) => id.name.clone(),
                Expression::Literal(Literal {
                    value: LiteralValue::String(s),
                }) => s.clone(),
                Expression::Literal(Literal {
                    value: LiteralValue::Number(n),
                }) => number_to_string(*n),
                _ => return Err(Error::internal("unsupported property key")),
            };
            self.expression_boxed(&property.value)?;
            let operand = self.name_operand(&key);
            self.op_with(OpCode::DefineField, operand);
        }
        Ok(ValType::Object)
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn unary(&mut self, u: &UnaryExpression) -> Result<ValType> {
        match u.operator {
            UnaryOperator::Minus => {
                self.expression_value(&u.argument)?;
                self.op(OpCode::Neg);
                Ok(ValType::Number)
            }
            UnaryOperator::Plus => {
                let ty = self.expression_value(&u.argument)?;
                self.to_number(ty);
                Ok(if ty.is_numeric() { ty } else { ValType::Number })
            }
            UnaryOperator::Not => {
                self.expression_value(&u.argument)?;
                self.op(OpCode::Not);
                Ok(ValType::Boolean)
            }
            UnaryOperator::BitwiseNot => {
                self.expression_value(&u.argument)?;
                self.op(OpCode::BitNot);
                Ok(ValType::NumberInt)
            }
            UnaryOperator::Typeof => {
                self.typeof_expression(&u.argument)?;
                Ok(ValType::String)
            }
            UnaryOperator::Void => {
                self.expression_value(&u.argument)?;
                self.op(OpCode::Pop);
                self.op(OpCode::Undefined);
                Ok(ValType::Undefined)
            }
            UnaryOperator::Delete => {
                self.delete_expression(&u.argument)?;
                Ok(ValType::Boolean)
            }
        }
    }

    /// `typeof` never throws for an unresolvable name, but does for a
    /// binding in its temporal dead zone.
    fn typeof_expression(&mut self, argument: &Expression) -> Result<()> {
        let Expression::Identifier(id) = argument else {
            self.expression_value(argument)?;
            self.op(OpCode::Typeof);
            return Ok(());
        };
        let name = self.resolve(&id.name);
        match name.resolution {
            Resolution::Static { .. } => {
                self.load_binding(&name);
                self.op(OpCode::Typeof);
            }
            Resolution::Global => {
                let operand = self.name_operand(&id.name);
                self.op_with(OpCode::TypeofGlobal, operand);
            }
            Resolution::Dynamic | Resolution::Unresolved => {
                let operand = self.name_operand(&id.name);
                self.op_with(OpCode::TypeofName, operand);
            }
        }
        Ok(())
    }

    fn delete_expression(&mut self, argument: &Expression) -> Result<()> {
        match argument {
            Expression::Identifier(id) => {
                let name = self.resolve(&id.name);
                match name.resolution {
                    // Declared bindings are never deletable.
                    Resolution::Static { .. } => {
                        self.op(OpCode::False);
                    }
                    _ => {
                        let operand = self.name_operand(&id.name);
                        self.op_with(OpCode::DeleteName, operand);
                    }
                }
            }
            Expression::Member(m) => {
                self.expression_boxed(&m.object)?;
                match m.static_name() {
                    Some(name) => {
                        let operand = self.name_operand(name);
                        self.op_with(OpCode::DeleteProp, operand);
                    }
                    None => {
                        let key = self.expression_value(&m.property)?;
                        self.to_property_key(key);
                        self.op(OpCode::DeleteElem);
                    }
                }
            }
            other => {
                self.expression_value(other)?;
                self.op(OpCode::Pop);
                self.op(OpCode::True);
            }
        }
        Ok(())
    }

    fn update(&mut self, u: &UpdateExpression) -> Result<ValType> {
        let step = match u.operator {
            UpdateOperator::Increment => OpCode::Inc,
            UpdateOperator::Decrement => OpCode::Dec,
        };
        match &*u.argument {
            Expression::Identifier(id) => {
                let name = self.resolve(&id.name);
                self.load_binding(&name);
                self.op(OpCode::ToNumber);
                if u.prefix {
                    self.op(step);
                    self.op(OpCode::Dup);
                } else {
                    self.op(OpCode::Dup);
                    self.op(step);
                }
                self.store_name(&name);
            }
            target @ Expression::Member(_) => {
                self.expression(target)?;
                match self.take_reference()? {
                    Reference::Property(name) => {
                        self.op(OpCode::Dup);
                        self.op_with(OpCode::GetProp, Operand::Name(name));
                        self.op(OpCode::ToNumber);
                        if !u.prefix {
                            self.op(OpCode::Dup);
                            self.op(OpCode::Rot3);
                        }
                        self.op(step);
                        self.op_with(OpCode::SetProp, Operand::Name(name));
                    }
                    Reference::Element => {
                        self.op(OpCode::Dup2);
                        self.op(OpCode::GetElem);
                        self.op(OpCode::ToNumber);
                        if !u.prefix {
                            self.op(OpCode::Dup);
                            self.op(OpCode::Rot4);
                        }
                        self.op(step);
                        self.op(OpCode::SetElem);
                    }
                    Reference::Binding(_) => return Err(Error::internal("member without a base")),
                }
                if !u.prefix {
                    self.op(OpCode::Pop);
                }
            }
            _ => return Err(Error::internal("invalid update target")),
        }
        Ok(ValType::Number)
    }

    fn binary(&mut self, b: &BinaryExpression) -> Result<ValType> {
        use BinaryOperator as B;
        let (opcode, result) = match b.operator {
            B::Add => return self.addition(&b.left, &b.right),
            B::Subtract => (OpCode::Sub, ValType::Number),
            B::Multiply => (OpCode::Mul, ValType::Number),
            B::Divide => (OpCode::Div, ValType::Number),
            B::Modulo => (OpCode::Mod, ValType::Number),
            B::Exponent => (OpCode::Exp, ValType::Number),
            B::BitwiseAnd => (OpCode::BitAnd, ValType::NumberInt),
            B::BitwiseOr => (OpCode::BitOr, ValType::NumberInt),
            B::BitwiseXor => (OpCode::BitXor, ValType::NumberInt),
            B::LeftShift => (OpCode::Shl, ValType::NumberInt),
            B::RightShift => (OpCode::Shr, ValType::NumberInt),
            B::UnsignedRightShift => (OpCode::UShr, ValType::NumberUint),
            B::Equal => return self.comparison(OpCode::Eq, &b.left, &b.right),
            B::NotEqual => return self.comparison(OpCode::Ne, &b.left, &b.right),
            B::StrictEqual => return self.comparison(OpCode::StrictEq, &b.left, &b.right),
            B::StrictNotEqual => return self.comparison(OpCode::StrictNe, &b.left, &b.right),
            B::LessThan => return self.comparison(OpCode::Lt, &b.left, &b.right),
            B::LessThanEqual => return self.comparison(OpCode::Le, &b.left, &b.right),
            B::GreaterThan => return self.comparison(OpCode::Gt, &b.left, &b.right),
            B::GreaterThanEqual => return self.comparison(OpCode::Ge, &b.left, &b.right),
            B::In => return self.comparison(OpCode::In, &b.left, &b.right),
            B::Instanceof => return self.comparison(OpCode::InstanceOf, &b.left, &b.right),
        };

        // ToNumber on the left operand is only observable after the right
        // operand has been evaluated, unless neither can run user code.
        let left = self.expression_value(&b.left)?;
        let early = left.is_primitive() || b.right.is_value_literal();
        if early {
            self.to_number(left);
        }
        let right = self.expression_value(&b.right)?;
        if !early {
            self.op(OpCode::Swap);
            self.op(OpCode::ToNumber);
            self.op(OpCode::Swap);
        }
        self.to_number(right);
        self.op(opcode);
        Ok(result)
    }

    fn comparison(&mut self, opcode: OpCode, left: &Expression, right: &Expression) -> Result<ValType> {
        self.expression_boxed(left)?;
        self.expression_boxed(right)?;
        self.op(opcode);
        Ok(ValType::Boolean)
    }

    fn addition(&mut self, left: &Expression, right: &Expression) -> Result<ValType> {
        match (left.as_string_literal(), right.as_string_literal()) {
            (Some(""), _) => {
                let ty = self.expression_value(right)?;
                self.to_primitive(ty);
                self.to_string(ty);
                Ok(ValType::String)
            }
            (_, Some("")) => {
                let ty = self.expression_value(left)?;
                self.to_primitive(ty);
                self.to_string(ty);
                Ok(ValType::String)
            }
            (Some(prefix), _) => {
                self.string(prefix);
                let ty = self.expression_value(right)?;
                self.to_primitive(ty);
                self.to_string(ty);
                self.op(OpCode::Concat);
                Ok(ValType::String)
            }
            (_, Some(suffix)) => {
                let ty = self.expression_value(left)?;
                self.to_primitive(ty);
                self.to_string(ty);
                self.string(suffix);
                self.op(OpCode::Concat);
                Ok(ValType::String)
            }
            (None, None) => {
                let l = self.expression_value(left)?;
                let r = self.expression_value(right)?;
                self.op(OpCode::Add);
                Ok(if l.is_numeric() && r.is_numeric() {
                    ValType::Number
                } else if l == ValType::String || r == ValType::String {
                    ValType::String
                } else {
                    ValType::Any
                })
            }
        }
    }

    fn logical(&mut self, l: &LogicalExpression) -> Result<ValType> {
        let left = self.expression_boxed(&l.left)?;
        let end = self.label();
        self.op(OpCode::Dup);
        match l.operator {
            LogicalOperator::And => {
                self.to_boolean(left);
                self.jump(OpCode::JumpIfFalse, end);
            }
            LogicalOperator::Or => {
                self.to_boolean(left);
                self.jump(OpCode::JumpIfTrue, end);
            }
            LogicalOperator::NullishCoalescing => {
                self.op(OpCode::IsNullish);
                self.jump(OpCode::JumpIfFalse, end);
            }
        }
        self.op(OpCode::Pop);
        let right = self.expression_boxed(&l.right)?;
        self.place(end);
        Ok(left.join(right))
    }

    fn assignment(&mut self, a: &AssignmentExpression) -> Result<ValType> {
        let operator = a.operator.binary_operator();
        if let Expression::Identifier(id) = &*a.left {
            let name = self.resolve(&id.name);
            let ty = match operator {
                None => self.expression_boxed(&a.right)?,
                Some(operator) => {
                    self.load_binding(&name);
                    self.expression_boxed(&a.right)?;
                    self.compound(operator)
                }
            };
            self.op(OpCode::Dup);
            self.store_name(&name);
            return Ok(ty);
        }

        if !matches!(&*a.left, Expression::Member(_)) {
            return Err(Error::internal("invalid assignment target"));
        }
        self.expression(&a.left)?;
        let reference = self.take_reference()?;
        if let Some(operator) = operator {
            match &reference {
                Reference::Property(name) => {
                    self.op(OpCode::Dup);
                    self.op_with(OpCode::GetProp, Operand::Name(*name));
                }
                Reference::Element => {
                    self.op(OpCode::Dup2);
                    self.op(OpCode::GetElem);
                }
                Reference::Binding(_) => {}
            }
            self.expression_boxed(&a.right)?;
            self.compound(operator);
        } else {
            self.expression_boxed(&a.right)?;
        }
        match reference {
            Reference::Property(name) => {
                self.op_with(OpCode::SetProp, Operand::Name(name));
            }
            Reference::Element => {
                self.op(OpCode::SetElem);
            }
            Reference::Binding(_) => return Err(Error::internal("member without a base")),
        }
        Ok(ValType::Any)
    }

    /// Emits the operator of a compound assignment over `[old, value]`.
    fn compound(&mut self, operator: BinaryOperator) -> ValType {
        use BinaryOperator as B;
        let (opcode, ty) = match operator {
            B::Add => (OpCode::Add, ValType::Any),
            B::Subtract => (OpCode::Sub, ValType::Number),
            B::Multiply => (OpCode::Mul, ValType::Number),
            B::Divide => (OpCode::Div, ValType::Number),
            B::Modulo => (OpCode::Mod, ValType::Number),
            B::Exponent => (OpCode::Exp, ValType::Number),
            B::LeftShift => (OpCode::Shl, ValType::Number),
            B::RightShift => (OpCode::Shr, ValType::Number),
            B::UnsignedRightShift => (OpCode::UShr, ValType::Number),
            B::BitwiseOr => (OpCode::BitOr, ValType::Number),
            B::BitwiseXor => (OpCode::BitXor, ValType::Number),
            B::BitwiseAnd => (OpCode::BitAnd, ValType::Number),
            _ => (OpCode::Nop, ValType::Any),
        };
        self.op(opcode);
        ty
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn arguments(&mut self, arguments: &[Expression]) -> Result<u32> {
        for argument in arguments {
            self.expression_boxed(argument)?;
        }
        Ok(arguments.len() as u32)
    }

    /// `[f, this, args..]` then `Call`, or `TailCall` in tail position.
    pub(super) fn call_expression(&mut self, call: &CallExpression, tail: bool) -> Result<ValType> {
        match &*call.callee {
            Expression::Member(m) => {
                self.expression_boxed(&m.object)?;
                self.op(OpCode::Dup);
                match m.static_name() {
                    Some(name) => {
                        let operand = self.name_operand(name);
                        self.op_with(OpCode::GetProp, operand);
                    }
                    None => {
                        let key = self.expression_value(&m.property)?;
                        self.to_property_key(key);
                        self.op(OpCode::GetElem);
                    }
                }
                self.op(OpCode::Swap);
            }
            Expression::Identifier(id) => {
                let name = self.resolve(&id.name);
                if matches!(name.resolution, Resolution::Dynamic | Resolution::Unresolved) {
                    let operand = self.name_operand(&id.name);
                    self.op_with(OpCode::GetNameWithThis, operand);
                } else {
                    self.load_binding(&name);
                    self.op(OpCode::Undefined);
                }
            }
            callee => {
                self.expression_boxed(callee)?;
                self.op(OpCode::Undefined);
            }
        }
        let count = self.arguments(&call.arguments)?;
        let opcode = if tail { OpCode::TailCall } else { OpCode::Call };
        self.op_with(opcode, Operand::ArgCount(count));
        Ok(ValType::Any)
    }
}
