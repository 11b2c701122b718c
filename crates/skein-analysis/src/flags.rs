//! Named engine tunables and the bridge that applies caller flag tables.
//!
//! A [`TunableRegistry`] is an ordinary value: each run builds one, applies
//! the caller's [`FlagTable`] to it, then freezes it behind an `Arc` for the
//! engine. Nothing here is process-global, so concurrent runs (and tests)
//! never observe each other's settings, and no worker can see a tunable
//! change mid-run.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::warn;

use crate::diagnostic::{Category, Diagnostic};

/// Tunable names understood by the standard registry.
pub mod names {
    pub const PARSE_ERROR_LIMIT: &str = "ParseErrorLimit";
    pub const RECURSION_LIMIT: &str = "RecursionLimit";
    pub const SUGGESTION_DISTANCE: &str = "SuggestionDistance";
    pub const TYPE_MAXIMUM_STRINGIFIER_LENGTH: &str = "TypeMaximumStringifierLength";

    pub const DEBUG_LOG_CHECK_TO_JSON: &str = "DebugLogCheckToJson";
    pub const DEBUG_FORCE_STRICT_MODE: &str = "DebugForceStrictMode";
    pub const DEBUG_FORCE_NONSTRICT_MODE: &str = "DebugForceNonStrictMode";
    pub const DEBUG_TIME_TRACING: &str = "DebugTimeTracing";
}

/// Value of a tunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunableValue {
    Bool(bool),
    Int(i64),
}

impl TunableValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
        }
    }
}

/// Static description of a tunable.
#[derive(Debug, Clone, Copy)]
pub struct TunableDef {
    pub name: &'static str,
    pub default: TunableValue,
    pub description: &'static str,
}

/// Tunables of the standard registry.
pub const STANDARD_TUNABLES: &[TunableDef] = &[
    TunableDef {
        name: names::PARSE_ERROR_LIMIT,
        default: TunableValue::Int(100),
        description: "maximum syntax errors recorded per module",
    },
    TunableDef {
        name: names::RECURSION_LIMIT,
        default: TunableValue::Int(200),
        description: "maximum block and bracket nesting depth",
    },
    TunableDef {
        name: names::SUGGESTION_DISTANCE,
        default: TunableValue::Int(2),
        description: "edit distance for 'did you mean' suggestions; 0 disables",
    },
    TunableDef {
        name: names::TYPE_MAXIMUM_STRINGIFIER_LENGTH,
        default: TunableValue::Int(500),
        description: "messages longer than this are truncated",
    },
    TunableDef {
        name: names::DEBUG_LOG_CHECK_TO_JSON,
        default: TunableValue::Bool(false),
        description: "emit a JSON log per checked module through the json_log callback",
    },
    TunableDef {
        name: names::DEBUG_FORCE_STRICT_MODE,
        default: TunableValue::Bool(false),
        description: "check every module in strict mode",
    },
    TunableDef {
        name: names::DEBUG_FORCE_NONSTRICT_MODE,
        default: TunableValue::Bool(false),
        description: "check every module in nonstrict mode",
    },
    TunableDef {
        name: names::DEBUG_TIME_TRACING,
        default: TunableValue::Bool(false),
        description: "log per-module check durations (requires the time-trace feature)",
    },
];

/// Errors from writing a tunable by name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunableError {
    #[error("unrecognized flag '{0}'")]
    Unknown(String),

    #[error("flag '{name}' expects a {expected} value")]
    TypeMismatch { name: String, expected: &'static str },
}

/// Named integer and boolean tunables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunableRegistry {
    values: BTreeMap<String, TunableValue>,
}

impl TunableRegistry {
    /// A registry with no tunables at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding [`STANDARD_TUNABLES`] at their defaults.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for def in STANDARD_TUNABLES {
            registry.define(def.name, def.default);
        }
        registry
    }

    /// Add (or reset) a tunable.
    pub fn define(&mut self, name: impl Into<String>, default: TunableValue) {
        self.values.insert(name.into(), default);
    }

    /// Overwrite an existing tunable. The value kind must match.
    pub fn set(&mut self, name: &str, value: TunableValue) -> Result<(), TunableError> {
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| TunableError::Unknown(name.to_string()))?;

        if std::mem::discriminant(slot) != std::mem::discriminant(&value) {
            return Err(TunableError::TypeMismatch {
                name: name.to_string(),
                expected: slot.kind(),
            });
        }

        *slot = value;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<TunableValue> {
        self.values.get(name).copied()
    }

    /// Boolean tunable; `false` when absent or not boolean.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(TunableValue::Bool(true)))
    }

    /// Integer tunable; `default` when absent or not integer.
    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        match self.get(name) {
            Some(TunableValue::Int(v)) => v,
            _ => default,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Tri-state boolean option; only `Off`/`On` cause a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoolFlag {
    #[default]
    Default,
    Off,
    On,
}

impl From<bool> for BoolFlag {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

/// Integer option; only set entries cause a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntFlag {
    pub is_set: bool,
    pub value: i64,
}

impl IntFlag {
    pub const fn set(value: i64) -> Self {
        Self {
            is_set: true,
            value,
        }
    }
}

/// One caller-supplied option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagValue {
    Bool(BoolFlag),
    Int(IntFlag),
}

impl FlagValue {
    /// The write this option requests, if any.
    fn explicit(&self) -> Option<TunableValue> {
        match *self {
            Self::Bool(BoolFlag::Default) => None,
            Self::Bool(BoolFlag::Off) => Some(TunableValue::Bool(false)),
            Self::Bool(BoolFlag::On) => Some(TunableValue::Bool(true)),
            Self::Int(IntFlag { is_set: false, .. }) => None,
            Self::Int(IntFlag { is_set: true, value }) => Some(TunableValue::Int(value)),
        }
    }
}

/// Errors from parsing `NAME=VALUE` option text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagParseError {
    #[error("expected NAME=VALUE, got '{0}'")]
    MissingValue(String),

    #[error("flag '{name}': '{value}' is neither a boolean nor an integer")]
    BadValue { name: String, value: String },
}

/// Caller-supplied options, applied in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagTable {
    entries: Vec<(String, FlagValue)>,
}

impl FlagTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bool(mut self, name: impl Into<String>, value: impl Into<BoolFlag>) -> Self {
        self.insert(name, FlagValue::Bool(value.into()));
        self
    }

    pub fn with_int(mut self, name: impl Into<String>, value: i64) -> Self {
        self.insert(name, FlagValue::Int(IntFlag::set(value)));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FlagValue) {
        self.entries.push((name.into(), value));
    }

    /// Parse `NAME=true|false|on|off|<integer>` and add it.
    pub fn insert_assignment(&mut self, text: &str) -> Result<(), FlagParseError> {
        let (name, value) = text
            .split_once('=')
            .ok_or_else(|| FlagParseError::MissingValue(text.to_string()))?;
        let (name, value) = (name.trim(), value.trim());

        let flag = match value {
            "true" | "on" => FlagValue::Bool(BoolFlag::On),
            "false" | "off" => FlagValue::Bool(BoolFlag::Off),
            other => match other.parse::<i64>() {
                Ok(v) => FlagValue::Int(IntFlag::set(v)),
                Err(_) => {
                    return Err(FlagParseError::BadValue {
                        name: name.to_string(),
                        value: value.to_string(),
                    });
                }
            },
        };

        self.insert(name, flag);
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, FlagValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Apply every explicit option of `table` to `registry`.
///
/// Unknown names and kind mismatches never abort: each produces one
/// `Warning` diagnostic naming the flag and leaves the registry untouched.
pub fn apply_flags(table: &FlagTable, registry: &mut TunableRegistry) -> Vec<Diagnostic> {
    let mut warnings = Vec::new();

    for (name, flag) in table.entries() {
        let Some(value) = flag.explicit() else {
            continue;
        };

        if let Err(e) = registry.set(name, value) {
            warn!(flag = name, "{}", e);
            warnings.push(Diagnostic::host(Category::Warning, e.to_string()));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_defaults() {
        let registry = TunableRegistry::standard();
        assert_eq!(registry.int_or(names::PARSE_ERROR_LIMIT, 0), 100);
        assert_eq!(registry.int_or(names::RECURSION_LIMIT, 0), 200);
        assert!(!registry.flag(names::DEBUG_FORCE_STRICT_MODE));
        assert_eq!(registry.names().count(), STANDARD_TUNABLES.len());
    }

    #[test]
    fn test_apply_writes_only_explicit_values() {
        let mut registry = TunableRegistry::standard();
        let table = FlagTable::new()
            .with_bool(names::DEBUG_FORCE_STRICT_MODE, true)
            .with_bool(names::DEBUG_LOG_CHECK_TO_JSON, BoolFlag::Default)
            .with_int(names::RECURSION_LIMIT, 12);

        let mut unset = table.clone();
        unset.insert(names::PARSE_ERROR_LIMIT, FlagValue::Int(IntFlag::default()));

        let warnings = apply_flags(&unset, &mut registry);
        assert!(warnings.is_empty());
        assert!(registry.flag(names::DEBUG_FORCE_STRICT_MODE));
        assert!(!registry.flag(names::DEBUG_LOG_CHECK_TO_JSON));
        assert_eq!(registry.int_or(names::RECURSION_LIMIT, 0), 12);
        assert_eq!(registry.int_or(names::PARSE_ERROR_LIMIT, 0), 100);
    }

    #[test]
    fn test_unknown_flag_warns_once_and_changes_nothing() {
        let mut registry = TunableRegistry::standard();
        let before = registry.clone();

        let table = FlagTable::new().with_bool("NoSuchFlag", true);
        let warnings = apply_flags(&table, &mut registry);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].category, Category::Warning);
        assert!(warnings[0].message.contains("'NoSuchFlag'"));
        assert_eq!(registry, before);
    }

    #[test]
    fn test_default_bool_for_unknown_name_is_silent() {
        let mut registry = TunableRegistry::standard();
        let table = FlagTable::new().with_bool("NoSuchFlag", BoolFlag::Default);
        assert!(apply_flags(&table, &mut registry).is_empty());
    }

    #[test]
    fn test_kind_mismatch_warns() {
        let mut registry = TunableRegistry::standard();
        let table = FlagTable::new().with_int(names::DEBUG_TIME_TRACING, 1);
        let warnings = apply_flags(&table, &mut registry);

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("expects a boolean"));
        assert!(!registry.flag(names::DEBUG_TIME_TRACING));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let table = FlagTable::new().with_int(names::SUGGESTION_DISTANCE, 5);
        let mut once = TunableRegistry::standard();
        apply_flags(&table, &mut once);
        let mut twice = once.clone();
        apply_flags(&table, &mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_assignments() {
        let mut table = FlagTable::new();
        table.insert_assignment("DebugTimeTracing=on").unwrap();
        table.insert_assignment("RecursionLimit = 40").unwrap();
        assert_eq!(
            table.entries().collect::<Vec<_>>(),
            vec![
                ("DebugTimeTracing", FlagValue::Bool(BoolFlag::On)),
                ("RecursionLimit", FlagValue::Int(IntFlag::set(40))),
            ]
        );

        assert!(matches!(
            table.insert_assignment("RecursionLimit"),
            Err(FlagParseError::MissingValue(_))
        ));
        assert!(matches!(
            table.insert_assignment("RecursionLimit=lots"),
            Err(FlagParseError::BadValue { .. })
        ));
    }
}
