//! Human-readable bytecode listings.
//!
//! ```text
//! == f (Normal, 1 params, strict) ==
//! 0000  CreateMutableBinding  x
//! 0001  LoadArg               #0
//! ...
//! handlers:
//!   [0003, 0007) -> 0009  Catch
//! ```

use std::fmt;

use super::bytecode::{Bytecode, Constant, FunctionTemplate, Instruction, Operand, SwitchCases};

impl fmt::Display for FunctionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() {
            "<anonymous>"
        } else {
            &*self.name
        };
        write!(f, "== {name} ({:?}, {} params", self.kind, self.param_count)?;
        if self.strict {
            write!(f, ", strict")?;
        }
        writeln!(f, ") ==")?;
        write!(f, "{}", self.bytecode)
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (ip, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{ip:04}  {}", Listing(self, instruction))?;
        }
        if !self.handlers.is_empty() {
            writeln!(f, "handlers:")?;
            for h in &self.handlers {
                writeln!(
                    f,
                    "  [{:04}, {:04}) -> {:04}  {:?}",
                    h.start, h.end, h.target, h.kind
                )?;
            }
        }
        if !self.resume_table.is_empty() {
            let states: Vec<String> = self.resume_table.iter().map(|t| format!("{t:04}")).collect();
            writeln!(f, "resume: {}", states.join(" "))?;
        }
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Some(operand) => write!(f, "{:<22}{operand:?}", format!("{:?}", self.opcode)),
            None => write!(f, "{:?}", self.opcode),
        }
    }
}

/// An instruction with its operand resolved against the owning unit.
struct Listing<'a>(&'a Bytecode, &'a Instruction);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Listing(code, instruction) = self;
        let opcode = format!("{:?}", instruction.opcode);
        let Some(operand) = &instruction.operand else {
            return write!(f, "{opcode}");
        };
        write!(f, "{opcode:<22}")?;
        match operand {
            Operand::Constant(index) => match code.constants.get(*index as usize) {
                Some(Constant::Number(n)) => write!(f, "{n}"),
                Some(Constant::String(s)) => write!(f, "{s:?}"),
                None => write!(f, "<bad constant {index}>"),
            },
            Operand::Name(index) => write!(f, "{}", code.name(*index)),
            Operand::Binding { name, flag } => {
                write!(f, "{}", code.name(*name))?;
                if *flag {
                    write!(f, " !")?;
                }
                Ok(())
            }
            Operand::Slot { hops, slot } => write!(f, "{hops}:{slot}"),
            Operand::Register(r) => write!(f, "r{r}"),
            Operand::Label(label) => write!(f, "L{}", label.0),
            Operand::Jump(target) => write!(f, "-> {target:04}"),
            Operand::ArgCount(n) => write!(f, "({n})"),
            Operand::Count(n) => write!(f, "#{n}"),
            Operand::Function(index) => match code.functions.get(*index as usize) {
                Some(template) if !template.name.is_empty() => {
                    write!(f, "fn {}", template.name)
                }
                _ => write!(f, "fn #{index}"),
            },
            Operand::Unit(index) => match code.units.get(*index as usize) {
                Some(entry) => write!(f, "unit -> {entry:04}"),
                None => write!(f, "unit #{index}"),
            },
            Operand::Table(index) => match code.switch_tables.get(*index as usize) {
                Some(table) => {
                    match &table.cases {
                        SwitchCases::Int(cases) => {
                            for (value, target) in cases {
                                write!(f, "{value}:{target:04} ")?;
                            }
                        }
                        SwitchCases::String(cases) => {
                            let mut cases: Vec<_> = cases.iter().collect();
                            cases.sort();
                            for (value, target) in cases {
                                write!(f, "{value:?}:{target:04} ")?;
                            }
                        }
                    }
                    write!(f, "default:{:04}", table.default)
                }
                None => write!(f, "table #{index}"),
            },
            Operand::State(state) => write!(f, "state {state}"),
            Operand::Flag(flag) => write!(f, "{flag}"),
            Operand::Error { kind, message } => write!(f, "{kind} {:?}", code.name(*message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::builder::*;
    use crate::compiler::compile;
    use crate::config::CompilerOptions;

    #[test]
    fn test_listing_names_operands() {
        let program = script(vec![
            var("x", Some(num(1.5))),
            function_decl("f", &["a"], vec![ret(Some(ident("a")))]),
        ]);
        let compiled = compile(&program, &CompilerOptions::default()).unwrap();
        let text = compiled.template.to_string();
        assert!(text.starts_with("== <script> (Script, 0 params) =="));
        assert!(text.contains("CreateGlobalVar"));
        assert!(text.contains("1.5"));
        assert!(text.contains("fn f"));
        assert!(text.contains("== f (Normal, 1 params) =="));
        assert!(text.contains("0:0"));
    }

    #[test]
    fn test_listing_shows_handlers() {
        let program = script(vec![try_catch(
            vec![throw(num(1.0))],
            "e",
            vec![],
        )]);
        let compiled = compile(&program, &CompilerOptions::default()).unwrap();
        let text = compiled.template.to_string();
        assert!(text.contains("handlers:"));
        assert!(text.contains("Catch"));
    }
}
