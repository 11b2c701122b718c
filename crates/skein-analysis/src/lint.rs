//! Lint rule codes and lint findings.
//!
//! Rules form a closed enumeration. Configuration refers to them by their
//! stable names, which [`LintCode::from_name`] maps back to a variant.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::diagnostic::Location;

/// Severity a rule reports at unless promoted by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LintSeverity {
    Warning,
    Error,
}

macro_rules! lint_codes {
    ($($variant:ident),* $(,)?) => {
        /// A lint rule.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum LintCode {
            $($variant),*
        }

        impl LintCode {
            /// Every rule, in declaration order.
            pub const ALL: &'static [LintCode] = &[$(LintCode::$variant),*];

            /// Stable rule name used in reports and configuration.
            pub fn name(self) -> &'static str {
                match self {
                    $(LintCode::$variant => stringify!($variant)),*
                }
            }

            /// Look a rule up by its stable name (exact match).
            pub fn from_name(name: &str) -> Option<LintCode> {
                match name {
                    $(stringify!($variant) => Some(LintCode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

lint_codes! {
    Unknown,
    UnknownGlobal,
    DeprecatedGlobal,
    GlobalUsedAsLocal,
    LocalShadow,
    SameLineStatement,
    MultiLineStatement,
    LocalUnused,
    FunctionUnused,
    ImportUnused,
    BuiltinGlobalWrite,
    PlaceholderRead,
    UnreachableCode,
    UnknownType,
    ForRange,
    UnbalancedAssignment,
    ImplicitReturn,
    DuplicateLocal,
    FormatString,
    TableLiteral,
    UninitializedLocal,
    DuplicateFunction,
    DeprecatedApi,
    TableOperations,
    DuplicateCondition,
    MisleadingAndOr,
    CommentDirective,
    IntegerParsing,
    ComparisonPrecedence,
    RedundantNativeAttribute,
}

impl LintCode {
    pub fn default_severity(self) -> LintSeverity {
        LintSeverity::Warning
    }

    /// Whether the rule is on in a default configuration.
    pub fn default_enabled(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    fn bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

impl std::fmt::Display for LintCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for LintCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for LintCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        LintCode::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown lint rule '{name}'")))
    }
}

/// A set of lint rules.
///
/// Serialized as a list of rule names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LintSet(u64);

impl LintSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        LintCode::ALL.iter().copied().collect()
    }

    /// Rules enabled in a default configuration.
    pub fn defaults() -> Self {
        LintCode::ALL
            .iter()
            .copied()
            .filter(|code| code.default_enabled())
            .collect()
    }

    pub fn enable(&mut self, code: LintCode) {
        self.0 |= code.bit();
    }

    pub fn disable(&mut self, code: LintCode) {
        self.0 &= !code.bit();
    }

    pub fn contains(&self, code: LintCode) -> bool {
        self.0 & code.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = LintCode> + '_ {
        LintCode::ALL.iter().copied().filter(|code| self.contains(*code))
    }
}

impl FromIterator<LintCode> for LintSet {
    fn from_iter<I: IntoIterator<Item = LintCode>>(iter: I) -> Self {
        let mut set = Self::empty();
        for code in iter {
            set.enable(code);
        }
        set
    }
}

impl std::fmt::Debug for LintSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter().map(LintCode::name)).finish()
    }
}

impl Serialize for LintSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for LintSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let codes = Vec::<LintCode>::deserialize(deserializer)?;
        Ok(codes.into_iter().collect())
    }
}

/// One lint finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintWarning {
    pub code: LintCode,
    pub location: Location,
    pub text: String,
}

impl LintWarning {
    pub fn new(code: LintCode, location: Location, text: impl Into<String>) -> Self {
        Self {
            code,
            location,
            text: text.into(),
        }
    }
}

/// Lint findings of one module, split by severity after configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LintResult {
    pub errors: Vec<LintWarning>,
    pub warnings: Vec<LintWarning>,
}

impl LintResult {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}
