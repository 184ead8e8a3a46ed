use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::CompilerError;

/// First tier with `@"raw"` strings, struct literals and array literals.
pub const RAW_STRING_TIER: u32 = 2;

/// Language features that only exist from a given version tier onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    RawStrings,
    StructLiterals,
    ArrayLiterals,
}

impl Feature {
    pub fn min_tier(self) -> u32 {
        match self {
            Feature::RawStrings | Feature::StructLiterals | Feature::ArrayLiterals => {
                RAW_STRING_TIER
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::RawStrings => "raw string literals",
            Feature::StructLiterals => "struct literals",
            Feature::ArrayLiterals => "array literals",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    Little,
    Big,
}

/// Byte layout of the target VM's instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingParams {
    /// Opcode width in bytes: 1 or 2.
    pub opcode_width: u8,
    /// Width of every operand in bytes: 1, 2, 4 or 8.
    pub operand_width: u8,
    pub endianness: Endianness,
}

impl Default for EncodingParams {
    fn default() -> Self {
        Self {
            opcode_width: 1,
            operand_width: 4,
            endianness: Endianness::Little,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Script,
    Object,
    Asset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub reference: i32,
}

/// Everything the compiler knows about the target data model. Read-only
/// during compilation, so one context can be shared across worker threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionContext {
    pub version_tier: u32,
    #[serde(default)]
    pub builtin_functions: HashSet<String>,
    #[serde(default)]
    pub builtin_variables: HashSet<String>,
    #[serde(default)]
    pub user_symbols: HashMap<String, Symbol>,
    #[serde(default)]
    pub enums: HashMap<String, BTreeMap<String, i64>>,
    #[serde(default)]
    pub encoding: EncodingParams,
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self::new(RAW_STRING_TIER)
    }
}

impl ResolutionContext {
    pub fn new(version_tier: u32) -> Self {
        Self {
            version_tier,
            builtin_functions: HashSet::new(),
            builtin_variables: HashSet::new(),
            user_symbols: HashMap::new(),
            enums: HashMap::new(),
            encoding: EncodingParams::default(),
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, CompilerError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, CompilerError> {
        if !path.exists() {
            return Err(CompilerError::FileNotFound(format!(
                "Resolution context not found: {}",
                path.display()
            )));
        }
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn save(&self, path: &Path) -> Result<(), CompilerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.version_tier >= feature.min_tier()
    }

    pub fn with_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.builtin_functions.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.builtin_variables.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_symbol(mut self, name: &str, kind: SymbolKind, reference: i32) -> Self {
        self.user_symbols
            .insert(name.to_string(), Symbol { kind, reference });
        self
    }

    pub fn with_enum<'a, I>(mut self, name: &str, members: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let members = members
            .into_iter()
            .map(|(member, value)| (member.to_string(), value))
            .collect();
        self.enums.insert(name.to_string(), members);
        self
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.builtin_functions.contains(name)
            || self.builtin_variables.contains(name)
            || self.user_symbols.contains_key(name)
            || self.enums.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_from_json_with_defaults() {
        let ctx = ResolutionContext::from_json(
            r#"{
                "version_tier": 1,
                "builtin_functions": ["show_message"],
                "user_symbols": { "scr_move": { "kind": "script", "reference": 7 } },
                "encoding": { "opcode_width": 2, "operand_width": 2, "endianness": "big" }
            }"#,
        )
        .unwrap();
        assert_eq!(ctx.version_tier, 1);
        assert!(ctx.is_known("show_message"));
        assert_eq!(ctx.user_symbols["scr_move"].reference, 7);
        assert!(ctx.builtin_variables.is_empty());
        assert_eq!(ctx.encoding.endianness, Endianness::Big);
        assert!(!ctx.supports(Feature::RawStrings));
    }

    #[test]
    fn builder_helpers() {
        let ctx = ResolutionContext::new(2)
            .with_functions(["draw_text"])
            .with_variables(["x", "y"])
            .with_enum("Dir", [("Left", 0), ("Right", 1)]);
        assert!(ctx.supports(Feature::StructLiterals));
        assert!(ctx.is_known("y"));
        assert_eq!(ctx.enums["Dir"]["Right"], 1);
    }
}
