//! Hub-and-spoke generic type system for cross-engine type mapping.
//!
//! Instead of one mapper per (source, target) pair, every engine implements
//! two conversions through a generic pivot:
//!
//! ```text
//! Source native  →  GenericType  →  Target native
//!   tinyint(1)   →    Boolean    →   BOOLEAN
//!   int4         →    Integer    →   INT
//! ```
//!
//! - [`ToGeneric`]: classify a native type string
//! - [`FromGeneric`]: render a generic type in a target's vocabulary
//!
//! Both steps are total. Classification falls back to `Text` or `Blob` with a
//! warning; rendering clamps out-of-range parameters with a warning.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::traits::{TypeMapper, TypeMapping};

/// Generic type category every native type classifies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenericType {
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Binary floating point.
    Floating,
    /// Exact decimal. `precision` is `None` for unconstrained numerics.
    Decimal { precision: Option<u32>, scale: u32 },
    /// Bounded character string.
    Varchar(u32),
    /// Unbounded character string.
    Text,
    /// Binary data.
    Blob,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Timestamp without time zone.
    DateTime,
    /// Timestamp with time zone (or the engine's instant type).
    Timestamp,
}

impl GenericType {
    /// Whether values of this category are naturally carried as text.
    pub fn is_textual(&self) -> bool {
        matches!(self, GenericType::Varchar(_) | GenericType::Text)
    }
}

impl std::fmt::Display for GenericType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenericType::SmallInt => write!(f, "SMALLINT"),
            GenericType::Integer => write!(f, "INTEGER"),
            GenericType::BigInt => write!(f, "BIGINT"),
            GenericType::Floating => write!(f, "FLOATING"),
            GenericType::Decimal {
                precision: Some(p),
                scale,
            } => write!(f, "DECIMAL({},{})", p, scale),
            GenericType::Decimal { precision: None, .. } => write!(f, "DECIMAL"),
            GenericType::Varchar(n) => write!(f, "VARCHAR({})", n),
            GenericType::Text => write!(f, "TEXT"),
            GenericType::Blob => write!(f, "BLOB"),
            GenericType::Boolean => write!(f, "BOOLEAN"),
            GenericType::Date => write!(f, "DATE"),
            GenericType::Time => write!(f, "TIME"),
            GenericType::DateTime => write!(f, "DATETIME"),
            GenericType::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// A native type string split into its parts.
///
/// `DECIMAL(10, 2) UNSIGNED` parses to base `DECIMAL`, params `["10", "2"]`,
/// `unsigned = true`. `timestamp(3) with time zone` parses to base
/// `TIMESTAMP` with `with_time_zone = true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeType {
    /// Uppercased base keyword(s), whitespace collapsed.
    pub base: String,
    /// Raw parameters inside the first parenthesis group.
    pub params: Vec<String>,
    /// `UNSIGNED` modifier present.
    pub unsigned: bool,
    /// `WITH TIME ZONE` modifier present.
    pub with_time_zone: bool,
    /// Trailing `[]` (PostgreSQL arrays).
    pub array: bool,
}

impl NativeType {
    /// Parse a native type string. Never fails; garbage yields a garbage base.
    pub fn parse(native: &str) -> Self {
        let mut s = native.trim().to_uppercase();

        let mut array = false;
        while s.ends_with("[]") {
            array = true;
            s.truncate(s.len() - 2);
            s = s.trim_end().to_string();
        }

        let mut params = Vec::new();
        if let (Some(open), Some(close)) = (s.find('('), s.rfind(')')) {
            if close > open {
                params = s[open + 1..close]
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect();
                s = format!("{} {}", &s[..open], &s[close + 1..]);
            }
        }

        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        let mut unsigned = false;
        let mut with_time_zone = false;

        tokens.retain(|t| match *t {
            "UNSIGNED" => {
                unsigned = true;
                false
            }
            "ZEROFILL" | "SIGNED" => false,
            _ => true,
        });

        if let Some(pos) = find_phrase(&tokens, &["WITH", "TIME", "ZONE"]) {
            with_time_zone = true;
            tokens.drain(pos..pos + 3);
        } else if let Some(pos) = find_phrase(&tokens, &["WITHOUT", "TIME", "ZONE"]) {
            tokens.drain(pos..pos + 3);
        }

        Self {
            base: tokens.join(" "),
            params,
            unsigned,
            with_time_zone,
            array,
        }
    }

    /// Numeric parameter at `index`.
    pub fn param(&self, index: usize) -> Option<u32> {
        self.params.get(index).and_then(|p| p.parse().ok())
    }

    /// Whether the base keyword carries string affinity.
    ///
    /// Unknown types with string affinity fall back to `Text`, everything
    /// else to `Blob`.
    pub fn has_string_affinity(&self) -> bool {
        const KEYWORDS: [&str; 8] = ["CHAR", "TEXT", "CLOB", "STRING", "ENUM", "SET", "JSON", "XML"];
        self.array || KEYWORDS.iter().any(|k| self.base.contains(k))
    }
}

fn find_phrase(tokens: &[&str], phrase: &[&str]) -> Option<usize> {
    tokens
        .windows(phrase.len())
        .position(|w| w.iter().zip(phrase).all(|(a, b)| a == b))
}

/// Result of classifying a native type.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericTypeInfo {
    /// The category.
    pub generic: GenericType,
    /// Whether information was lost classifying the type.
    pub is_lossy: bool,
    /// Warning message if the classification is lossy.
    pub warning: Option<String>,
}

impl GenericTypeInfo {
    /// Create a lossless classification.
    pub fn lossless(generic: GenericType) -> Self {
        Self {
            generic,
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy classification with a warning.
    pub fn lossy(generic: GenericType, warning: impl Into<String>) -> Self {
        Self {
            generic,
            is_lossy: true,
            warning: Some(warning.into()),
        }
    }

    /// Fallback for a type the dialect table does not know.
    pub fn unknown(dialect: &str, native: &str, parsed: &NativeType) -> Self {
        let generic = if parsed.has_string_affinity() {
            GenericType::Text
        } else {
            GenericType::Blob
        };
        Self::lossy(
            generic,
            format!(
                "unrecognized {} type '{}' migrated as {}",
                dialect, native, generic
            ),
        )
    }
}

/// Classify native types into generic categories.
pub trait ToGeneric: Send + Sync {
    /// Dialect name ("mysql", "sqlite", "postgresql").
    fn dialect_name(&self) -> &str;

    /// Classify a native type string, as reported by the engine's catalog.
    fn to_generic(&self, native_type: &str) -> GenericTypeInfo;
}

/// Render generic categories as native type strings.
#[allow(clippy::wrong_self_convention)]
pub trait FromGeneric: Send + Sync {
    /// Dialect name ("mysql", "sqlite", "postgresql").
    fn dialect_name(&self) -> &str;

    /// Render a generic type. Clamped parameters produce a lossy mapping.
    fn from_generic(&self, generic: &GenericType) -> TypeMapping;
}

/// Type mapper chaining a [`ToGeneric`] and a [`FromGeneric`].
///
/// # Example
///
/// ```rust,ignore
/// let mapper = ComposedMapper::new(Arc::new(MysqlTypes), Arc::new(PostgresTypes));
/// let mapping = mapper.map_type("tinyint(1)");
/// assert_eq!(mapping.target_type, "BOOLEAN");
/// ```
pub struct ComposedMapper {
    source_converter: Arc<dyn ToGeneric>,
    target_converter: Arc<dyn FromGeneric>,
}

impl ComposedMapper {
    /// Create a new composed mapper.
    pub fn new(source_converter: Arc<dyn ToGeneric>, target_converter: Arc<dyn FromGeneric>) -> Self {
        Self {
            source_converter,
            target_converter,
        }
    }
}

impl std::fmt::Debug for ComposedMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedMapper")
            .field("source", &self.source_converter.dialect_name())
            .field("target", &self.target_converter.dialect_name())
            .finish()
    }
}

impl TypeMapper for ComposedMapper {
    fn source_dialect(&self) -> &str {
        self.source_converter.dialect_name()
    }

    fn target_dialect(&self) -> &str {
        self.target_converter.dialect_name()
    }

    fn map_type(&self, native_type: &str) -> TypeMapping {
        let info = self.source_converter.to_generic(native_type);
        let mut mapping = self.target_converter.from_generic(&info.generic);

        if info.is_lossy {
            mapping.is_lossy = true;
            mapping.warning = match (info.warning, mapping.warning.take()) {
                (Some(src), Some(tgt)) => Some(format!("{}; {}", src, tgt)),
                (Some(src), None) => Some(src),
                (None, tgt) => tgt,
            };
        }

        mapping
    }
}
