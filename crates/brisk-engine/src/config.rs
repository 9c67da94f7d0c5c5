//! Engine configuration.
//!
//! Configuration is read from TOML. Every field has a default, so a partial
//! file only overrides what it names:
//!
//! ```toml
//! [compiler]
//! block_inline_limit = 16
//!
//! [vm]
//! max_call_depth = 128
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Number of block-scoped declarations instantiated inline before the
/// sequence is moved into an out-of-line unit.
pub const DEFAULT_BLOCK_INLINE_LIMIT: usize = 1 << 5;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Code generation options
    pub compiler: CompilerOptions,

    /// Interpreter limits
    pub vm: VmOptions,
}

/// Options consumed by the code generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Block declaration count above which instantiation is emitted out of line
    pub block_inline_limit: usize,

    /// Emit `TailCall` for calls in tail position of strict functions
    pub tail_calls: bool,

    /// Minimum number of literal `case` clauses before a jump table is used
    pub int_switch_min_cases: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            block_inline_limit: DEFAULT_BLOCK_INLINE_LIMIT,
            tail_calls: true,
            int_switch_min_cases: 2,
        }
    }
}

/// Interpreter limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Maximum nesting of script function activations
    pub max_call_depth: usize,

    /// Maximum operand stack length of a single activation
    pub max_stack_size: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 200,
            max_stack_size: 1 << 16,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overrides every field that `path` sets explicitly.
    pub fn merge_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let overrides: toml::Table = toml::from_str(&text)?;

        let mut merged = match toml::Value::try_from(&*self) {
            Ok(toml::Value::Table(table)) => table,
            Ok(_) => return Err(crate::Error::internal("configuration is not a table")),
            Err(e) => {
                return Err(crate::Error::internal(format!(
                    "configuration is not serializable: {e}"
                )));
            }
        };
        for (section, value) in overrides {
            match (merged.get_mut(&section), value) {
                (Some(toml::Value::Table(current)), toml::Value::Table(incoming)) => {
                    current.extend(incoming);
                }
                (_, value) => {
                    merged.insert(section, value);
                }
            }
        }

        *self = toml::Value::Table(merged).try_into()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.compiler.block_inline_limit, 32);
        assert!(config.compiler.tail_calls);
        assert_eq!(config.vm.max_call_depth, 200);
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str("[compiler]\nblock_inline_limit = 4\n").unwrap();
        assert_eq!(config.compiler.block_inline_limit, 4);
        assert!(config.compiler.tail_calls);
        assert_eq!(config.vm, VmOptions::default());
    }

    #[test]
    fn test_merge_from_file() {
        let path = std::env::temp_dir().join(format!("brisk-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[vm]\nmax_call_depth = 7\n").unwrap();

        let mut config = EngineConfig::default();
        config.compiler.tail_calls = false;
        config.merge_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.vm.max_call_depth, 7);
        assert_eq!(config.vm.max_stack_size, 1 << 16);
        assert!(!config.compiler.tail_calls);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(EngineConfig::from_toml_str("[compiler]\nblock_inline_limit = \"x\"").is_err());
    }
}
