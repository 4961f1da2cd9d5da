//! Per-dialect classifier tables and target type renderers.
//!
//! Each engine gets one converter implementing both [`ToGeneric`] and
//! [`FromGeneric`]. Pair mappers are composed from them on demand, so adding
//! an engine means adding one converter, not one mapper per pair.

use std::sync::Arc;

use crate::config::DialectKind;
use crate::core::traits::TypeMapping;

use super::canonical::{
    ComposedMapper, FromGeneric, GenericType, GenericTypeInfo, NativeType, ToGeneric,
};

/// Longest VARCHAR MySQL accepts under utf8mb4 (65535 bytes / 4).
pub const MYSQL_MAX_VARCHAR: u32 = 16_383;
/// MySQL DECIMAL limits.
pub const MYSQL_MAX_PRECISION: u32 = 65;
pub const MYSQL_MAX_SCALE: u32 = 30;
/// Longest VARCHAR PostgreSQL accepts.
pub const PG_MAX_VARCHAR: u32 = 10_485_760;
/// PostgreSQL NUMERIC precision limit.
pub const PG_MAX_PRECISION: u32 = 1000;

/// Classifier for a dialect.
pub fn to_generic(kind: DialectKind) -> Arc<dyn ToGeneric> {
    match kind {
        DialectKind::Mysql => Arc::new(MysqlTypes),
        DialectKind::Sqlite => Arc::new(SqliteTypes),
        DialectKind::Postgresql => Arc::new(PostgresTypes),
    }
}

/// Renderer for a dialect.
pub fn from_generic(kind: DialectKind) -> Arc<dyn FromGeneric> {
    match kind {
        DialectKind::Mysql => Arc::new(MysqlTypes),
        DialectKind::Sqlite => Arc::new(SqliteTypes),
        DialectKind::Postgresql => Arc::new(PostgresTypes),
    }
}

/// Mapper for a (source, target) pair.
pub fn mapper(source: DialectKind, target: DialectKind) -> ComposedMapper {
    ComposedMapper::new(to_generic(source), from_generic(target))
}

/// Classify a native type of the given dialect.
pub fn classify(kind: DialectKind, native_type: &str) -> GenericTypeInfo {
    to_generic(kind).to_generic(native_type)
}

fn decimal(precision: Option<u32>, scale: Option<u32>) -> GenericType {
    GenericType::Decimal {
        precision,
        scale: scale.unwrap_or(0),
    }
}

/// Clamp DECIMAL parameters, reporting whether anything changed.
fn clamp_decimal(precision: u32, scale: u32, max_precision: u32, max_scale: u32) -> (u32, u32, bool) {
    let p = precision.clamp(1, max_precision);
    let s = scale.min(max_scale).min(p);
    (p, s, p != precision || s != scale)
}

// =============================================================================
// MySQL
// =============================================================================

/// MySQL type converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlTypes;

impl ToGeneric for MysqlTypes {
    fn dialect_name(&self) -> &str {
        "mysql"
    }

    fn to_generic(&self, native_type: &str) -> GenericTypeInfo {
        let t = NativeType::parse(native_type);
        if t.array {
            return GenericTypeInfo::unknown(ToGeneric::dialect_name(self), native_type, &t);
        }

        let generic = match t.base.as_str() {
            "BOOL" | "BOOLEAN" => GenericType::Boolean,
            // TINYINT(1) is how MySQL spells BOOLEAN.
            "TINYINT" if t.param(0) == Some(1) => GenericType::Boolean,
            "BIT" if t.param(0).unwrap_or(1) == 1 => GenericType::Boolean,

            "TINYINT" | "YEAR" => GenericType::SmallInt,
            "SMALLINT" if t.unsigned => GenericType::Integer,
            "SMALLINT" => GenericType::SmallInt,
            "MEDIUMINT" => GenericType::Integer,
            "INT" | "INTEGER" if t.unsigned => GenericType::BigInt,
            "INT" | "INTEGER" => GenericType::Integer,
            "BIGINT" if t.unsigned => decimal(Some(20), None),
            "BIGINT" => GenericType::BigInt,

            "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" | "REAL" => GenericType::Floating,
            "DECIMAL" | "NUMERIC" | "DEC" | "FIXED" => {
                decimal(Some(t.param(0).unwrap_or(10)), t.param(1))
            }

            "CHAR" | "NCHAR" => GenericType::Varchar(t.param(0).unwrap_or(1)),
            "VARCHAR" | "NVARCHAR" => GenericType::Varchar(t.param(0).unwrap_or(255)),
            "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" | "JSON" => {
                GenericType::Text
            }

            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                GenericType::Blob
            }
            "BIT" => {
                return GenericTypeInfo::lossy(
                    GenericType::Blob,
                    format!("MySQL '{}' migrated as raw bytes", native_type),
                )
            }

            "DATE" => GenericType::Date,
            "TIME" => GenericType::Time,
            "DATETIME" => GenericType::DateTime,
            "TIMESTAMP" => GenericType::Timestamp,

            _ => return GenericTypeInfo::unknown(ToGeneric::dialect_name(self), native_type, &t),
        };
        GenericTypeInfo::lossless(generic)
    }
}

impl FromGeneric for MysqlTypes {
    fn dialect_name(&self) -> &str {
        "mysql"
    }

    fn from_generic(&self, generic: &GenericType) -> TypeMapping {
        let g = *generic;
        match g {
            GenericType::SmallInt => TypeMapping::lossless(g, "SMALLINT"),
            GenericType::Integer => TypeMapping::lossless(g, "INT"),
            GenericType::BigInt => TypeMapping::lossless(g, "BIGINT"),
            GenericType::Floating => TypeMapping::lossless(g, "DOUBLE"),
            GenericType::Decimal {
                precision: Some(precision),
                scale,
            } => {
                let (p, s, clamped) =
                    clamp_decimal(precision, scale, MYSQL_MAX_PRECISION, MYSQL_MAX_SCALE);
                let target = format!("DECIMAL({},{})", p, s);
                if clamped {
                    TypeMapping::lossy(
                        g,
                        target,
                        format!(
                            "DECIMAL({},{}) exceeds MySQL limits, clamped to DECIMAL({},{})",
                            precision, scale, p, s
                        ),
                    )
                } else {
                    TypeMapping::lossless(g, target)
                }
            }
            GenericType::Decimal { precision: None, .. } => TypeMapping::lossy(
                g,
                format!("DECIMAL({},{})", MYSQL_MAX_PRECISION, MYSQL_MAX_SCALE),
                "unconstrained numeric mapped to the widest MySQL DECIMAL",
            ),
            GenericType::Varchar(n) if n > MYSQL_MAX_VARCHAR => TypeMapping::lossy(
                g,
                format!("VARCHAR({})", MYSQL_MAX_VARCHAR),
                format!(
                    "VARCHAR({}) exceeds the MySQL utf8mb4 limit, clamped to VARCHAR({})",
                    n, MYSQL_MAX_VARCHAR
                ),
            ),
            GenericType::Varchar(n) => TypeMapping::lossless(g, format!("VARCHAR({})", n)),
            GenericType::Text => TypeMapping::lossless(g, "TEXT"),
            GenericType::Blob => TypeMapping::lossless(g, "BLOB"),
            GenericType::Boolean => TypeMapping::lossless(g, "TINYINT(1)"),
            GenericType::Date => TypeMapping::lossless(g, "DATE"),
            GenericType::Time => TypeMapping::lossless(g, "TIME"),
            GenericType::DateTime => TypeMapping::lossless(g, "DATETIME"),
            // MySQL TIMESTAMP stops at 2038.
            GenericType::Timestamp => TypeMapping::lossless(g, "DATETIME"),
        }
    }
}

// =============================================================================
// SQLite
// =============================================================================

/// SQLite type converter.
///
/// SQLite accepts any declared type; only the common spellings are
/// recognized; the rest go through the affinity fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteTypes;

impl ToGeneric for SqliteTypes {
    fn dialect_name(&self) -> &str {
        "sqlite"
    }

    fn to_generic(&self, native_type: &str) -> GenericTypeInfo {
        let t = NativeType::parse(native_type);
        if t.base.is_empty() {
            return GenericTypeInfo::lossy(
                GenericType::Text,
                "column has no declared type, migrated as TEXT",
            );
        }

        let generic = match t.base.as_str() {
            "INTEGER" | "INT" | "MEDIUMINT" | "INT4" => GenericType::Integer,
            "TINYINT" | "SMALLINT" | "INT2" => GenericType::SmallInt,
            "BIGINT" | "INT8" | "UNSIGNED BIG INT" => GenericType::BigInt,
            "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" => GenericType::Floating,
            "NUMERIC" | "DECIMAL" => decimal(t.param(0), t.param(1)),
            "CHAR" | "CHARACTER" | "VARCHAR" | "VARYING CHARACTER" | "NCHAR"
            | "NATIVE CHARACTER" | "NVARCHAR" => match t.param(0) {
                Some(n) => GenericType::Varchar(n),
                None => GenericType::Text,
            },
            "TEXT" | "CLOB" | "JSON" => GenericType::Text,
            "BLOB" => GenericType::Blob,
            "BOOLEAN" | "BOOL" => GenericType::Boolean,
            "DATE" => GenericType::Date,
            "TIME" => GenericType::Time,
            "DATETIME" => GenericType::DateTime,
            "TIMESTAMP" => GenericType::Timestamp,
            _ => return GenericTypeInfo::unknown(ToGeneric::dialect_name(self), native_type, &t),
        };
        GenericTypeInfo::lossless(generic)
    }
}

impl FromGeneric for SqliteTypes {
    fn dialect_name(&self) -> &str {
        "sqlite"
    }

    fn from_generic(&self, generic: &GenericType) -> TypeMapping {
        let g = *generic;
        let target = match g {
            GenericType::SmallInt
            | GenericType::Integer
            | GenericType::BigInt
            | GenericType::Boolean => "INTEGER",
            GenericType::Floating | GenericType::Decimal { .. } => "REAL",
            GenericType::Varchar(_) | GenericType::Text => "TEXT",
            GenericType::Blob => "BLOB",
            GenericType::Date | GenericType::Time | GenericType::DateTime | GenericType::Timestamp => {
                "TEXT"
            }
        };
        TypeMapping::lossless(g, target)
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// PostgreSQL type converter.
///
/// Native types are the `format_type()` spellings (`character varying(20)`,
/// `timestamp without time zone`) plus their short aliases.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTypes;

impl ToGeneric for PostgresTypes {
    fn dialect_name(&self) -> &str {
        "postgresql"
    }

    fn to_generic(&self, native_type: &str) -> GenericTypeInfo {
        let t = NativeType::parse(native_type);
        if t.array {
            return GenericTypeInfo::unknown(ToGeneric::dialect_name(self), native_type, &t);
        }

        let generic = match t.base.as_str() {
            "SMALLINT" | "INT2" | "SMALLSERIAL" | "SERIAL2" => GenericType::SmallInt,
            "INTEGER" | "INT" | "INT4" | "SERIAL" | "SERIAL4" => GenericType::Integer,
            "BIGINT" | "INT8" | "BIGSERIAL" | "SERIAL8" => GenericType::BigInt,
            "REAL" | "FLOAT4" | "DOUBLE PRECISION" | "FLOAT8" | "FLOAT" => GenericType::Floating,
            "NUMERIC" | "DECIMAL" => decimal(t.param(0), t.param(1)),
            "MONEY" => decimal(Some(19), Some(2)),

            "CHARACTER VARYING" | "VARCHAR" => match t.param(0) {
                Some(n) => GenericType::Varchar(n),
                None => GenericType::Text,
            },
            "CHARACTER" | "CHAR" | "BPCHAR" => GenericType::Varchar(t.param(0).unwrap_or(1)),
            "TEXT" | "CITEXT" | "NAME" | "JSON" | "JSONB" | "XML" => GenericType::Text,
            "INTERVAL" => {
                return GenericTypeInfo::lossy(
                    GenericType::Text,
                    format!("PostgreSQL '{}' migrated as its text form", native_type),
                )
            }
            "UUID" => GenericType::Varchar(36),
            "INET" | "CIDR" => GenericType::Varchar(43),
            "MACADDR" => GenericType::Varchar(17),

            "BYTEA" => GenericType::Blob,
            "BOOLEAN" | "BOOL" => GenericType::Boolean,
            "DATE" => GenericType::Date,
            "TIME" | "TIMETZ" if t.with_time_zone || t.base == "TIMETZ" => {
                return GenericTypeInfo::lossy(
                    GenericType::Time,
                    format!("time zone of '{}' is dropped", native_type),
                )
            }
            "TIME" => GenericType::Time,
            "TIMESTAMP" if t.with_time_zone => GenericType::Timestamp,
            "TIMESTAMP" => GenericType::DateTime,
            "TIMESTAMPTZ" => GenericType::Timestamp,

            _ => return GenericTypeInfo::unknown(ToGeneric::dialect_name(self), native_type, &t),
        };
        GenericTypeInfo::lossless(generic)
    }
}

impl FromGeneric for PostgresTypes {
    fn dialect_name(&self) -> &str {
        "postgresql"
    }

    fn from_generic(&self, generic: &GenericType) -> TypeMapping {
        let g = *generic;
        match g {
            GenericType::SmallInt => TypeMapping::lossless(g, "SMALLINT"),
            GenericType::Integer => TypeMapping::lossless(g, "INTEGER"),
            GenericType::BigInt => TypeMapping::lossless(g, "BIGINT"),
            GenericType::Floating => TypeMapping::lossless(g, "DOUBLE PRECISION"),
            GenericType::Decimal {
                precision: Some(precision),
                scale,
            } => {
                let (p, s, clamped) =
                    clamp_decimal(precision, scale, PG_MAX_PRECISION, PG_MAX_PRECISION);
                let target = format!("NUMERIC({},{})", p, s);
                if clamped {
                    TypeMapping::lossy(
                        g,
                        target,
                        format!(
                            "NUMERIC({},{}) exceeds PostgreSQL limits, clamped to NUMERIC({},{})",
                            precision, scale, p, s
                        ),
                    )
                } else {
                    TypeMapping::lossless(g, target)
                }
            }
            GenericType::Decimal { precision: None, .. } => TypeMapping::lossless(g, "NUMERIC"),
            GenericType::Varchar(0) => TypeMapping::lossless(g, "TEXT"),
            GenericType::Varchar(n) if n > PG_MAX_VARCHAR => TypeMapping::lossy(
                g,
                format!("VARCHAR({})", PG_MAX_VARCHAR),
                format!(
                    "VARCHAR({}) exceeds the PostgreSQL limit, clamped to VARCHAR({})",
                    n, PG_MAX_VARCHAR
                ),
            ),
            GenericType::Varchar(n) => TypeMapping::lossless(g, format!("VARCHAR({})", n)),
            GenericType::Text => TypeMapping::lossless(g, "TEXT"),
            GenericType::Blob => TypeMapping::lossless(g, "BYTEA"),
            GenericType::Boolean => TypeMapping::lossless(g, "BOOLEAN"),
            GenericType::Date => TypeMapping::lossless(g, "DATE"),
            GenericType::Time => TypeMapping::lossless(g, "TIME"),
            GenericType::DateTime => TypeMapping::lossless(g, "TIMESTAMP"),
            GenericType::Timestamp => TypeMapping::lossless(g, "TIMESTAMPTZ"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::TypeMapper;

    const ALL: [DialectKind; 3] = [DialectKind::Mysql, DialectKind::Sqlite, DialectKind::Postgresql];

    fn render(kind: DialectKind, g: GenericType) -> String {
        from_generic(kind).from_generic(&g).target_type
    }

    fn dec(p: u32, s: u32) -> GenericType {
        GenericType::Decimal {
            precision: Some(p),
            scale: s,
        }
    }

    #[test]
    fn test_matrix() {
        use DialectKind::*;
        let rows = [
            (GenericType::Integer, ["INT", "INTEGER", "INTEGER"]),
            (GenericType::BigInt, ["BIGINT", "INTEGER", "BIGINT"]),
            (GenericType::Varchar(80), ["VARCHAR(80)", "TEXT", "VARCHAR(80)"]),
            (GenericType::Text, ["TEXT", "TEXT", "TEXT"]),
            (GenericType::Blob, ["BLOB", "BLOB", "BYTEA"]),
            (GenericType::DateTime, ["DATETIME", "TEXT", "TIMESTAMP"]),
            (dec(12, 4), ["DECIMAL(12,4)", "REAL", "NUMERIC(12,4)"]),
            (GenericType::Boolean, ["TINYINT(1)", "INTEGER", "BOOLEAN"]),
            (GenericType::SmallInt, ["SMALLINT", "INTEGER", "SMALLINT"]),
            (GenericType::Floating, ["DOUBLE", "REAL", "DOUBLE PRECISION"]),
            (GenericType::Date, ["DATE", "TEXT", "DATE"]),
            (GenericType::Time, ["TIME", "TEXT", "TIME"]),
            (GenericType::Timestamp, ["DATETIME", "TEXT", "TIMESTAMPTZ"]),
        ];
        for (generic, [mysql, sqlite, pg]) in rows {
            assert_eq!(render(Mysql, generic), mysql, "{generic}");
            assert_eq!(render(Sqlite, generic), sqlite, "{generic}");
            assert_eq!(render(Postgresql, generic), pg, "{generic}");
        }
    }

    #[test]
    fn test_mysql_classification() {
        let c = |s: &str| classify(DialectKind::Mysql, s).generic;
        assert_eq!(c("tinyint(1)"), GenericType::Boolean);
        assert_eq!(c("tinyint(4)"), GenericType::SmallInt);
        assert_eq!(c("int(11)"), GenericType::Integer);
        assert_eq!(c("int unsigned"), GenericType::BigInt);
        assert_eq!(c("bigint(20) unsigned"), dec(20, 0));
        assert_eq!(c("decimal(10,2)"), dec(10, 2));
        assert_eq!(c("decimal"), dec(10, 0));
        assert_eq!(c("varchar(255)"), GenericType::Varchar(255));
        assert_eq!(c("enum('a','b')"), GenericType::Text);
        assert_eq!(c("json"), GenericType::Text);
        assert_eq!(c("longblob"), GenericType::Blob);
        assert_eq!(c("bit(1)"), GenericType::Boolean);
        assert_eq!(c("datetime(6)"), GenericType::DateTime);
        assert_eq!(c("timestamp"), GenericType::Timestamp);
        assert_eq!(c("year"), GenericType::SmallInt);
    }

    #[test]
    fn test_postgres_classification() {
        let c = |s: &str| classify(DialectKind::Postgresql, s).generic;
        assert_eq!(c("integer"), GenericType::Integer);
        assert_eq!(c("int8"), GenericType::BigInt);
        assert_eq!(c("character varying(40)"), GenericType::Varchar(40));
        assert_eq!(c("character varying"), GenericType::Text);
        assert_eq!(c("character(2)"), GenericType::Varchar(2));
        assert_eq!(c("numeric(8,3)"), dec(8, 3));
        assert_eq!(
            c("numeric"),
            GenericType::Decimal {
                precision: None,
                scale: 0
            }
        );
        assert_eq!(c("timestamp without time zone"), GenericType::DateTime);
        assert_eq!(c("timestamp(3) with time zone"), GenericType::Timestamp);
        assert_eq!(c("uuid"), GenericType::Varchar(36));
        assert_eq!(c("bytea"), GenericType::Blob);
        assert_eq!(c("jsonb"), GenericType::Text);
        assert_eq!(c("money"), dec(19, 2));

        let info = classify(DialectKind::Postgresql, "time with time zone");
        assert_eq!(info.generic, GenericType::Time);
        assert!(info.is_lossy);
    }

    #[test]
    fn test_sqlite_classification() {
        let c = |s: &str| classify(DialectKind::Sqlite, s).generic;
        assert_eq!(c("INTEGER"), GenericType::Integer);
        assert_eq!(c("REAL"), GenericType::Floating);
        assert_eq!(c("VARCHAR(100)"), GenericType::Varchar(100));
        assert_eq!(c("TEXT"), GenericType::Text);
        assert_eq!(c("BLOB"), GenericType::Blob);
        assert_eq!(c("DATETIME"), GenericType::DateTime);
        assert_eq!(c("BOOLEAN"), GenericType::Boolean);
        assert_eq!(c("DECIMAL(10,2)"), dec(10, 2));
        assert!(classify(DialectKind::Sqlite, "").is_lossy);
    }

    #[test]
    fn test_unknown_types_fall_back_with_warning() {
        for kind in ALL {
            let info = classify(kind, "geometry");
            assert_eq!(info.generic, GenericType::Blob);
            let warning = info.warning.unwrap();
            assert!(warning.contains(&format!("unrecognized {} type 'geometry'", kind.name())));

            let info = classify(kind, "superstring");
            assert_eq!(info.generic, GenericType::Text);
            assert!(info.warning.is_some());
        }
        assert_eq!(
            classify(DialectKind::Postgresql, "integer[]").generic,
            GenericType::Text
        );
    }

    #[test]
    fn test_mapping_is_total() {
        let natives = [
            "int", "varchar(10)", "text", "blob", "datetime", "decimal(5,2)", "boolean",
            "geometry", "weird type", "", "timestamp with time zone", "numeric",
        ];
        for source in ALL {
            for target in ALL {
                let m = mapper(source, target);
                for native in natives {
                    assert!(!m.map_type(native).target_type.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_varchar_clamping() {
        let m = from_generic(DialectKind::Mysql).from_generic(&GenericType::Varchar(20_000));
        assert_eq!(m.target_type, "VARCHAR(16383)");
        assert!(m.is_lossy);

        let m = from_generic(DialectKind::Postgresql)
            .from_generic(&GenericType::Varchar(PG_MAX_VARCHAR + 1));
        assert_eq!(m.target_type, "VARCHAR(10485760)");
        assert!(m.warning.is_some());

        let m = from_generic(DialectKind::Mysql).from_generic(&GenericType::Varchar(16_383));
        assert!(!m.is_lossy);
    }

    #[test]
    fn test_decimal_clamping() {
        let m = from_generic(DialectKind::Mysql).from_generic(&dec(80, 40));
        assert_eq!(m.target_type, "DECIMAL(65,30)");
        assert!(m.is_lossy);

        let m = from_generic(DialectKind::Postgresql).from_generic(&dec(80, 40));
        assert_eq!(m.target_type, "NUMERIC(80,40)");
        assert!(!m.is_lossy);

        let unconstrained = GenericType::Decimal {
            precision: None,
            scale: 0,
        };
        assert!(from_generic(DialectKind::Mysql).from_generic(&unconstrained).is_lossy);
        assert_eq!(
            from_generic(DialectKind::Postgresql)
                .from_generic(&unconstrained)
                .target_type,
            "NUMERIC"
        );
    }

    #[test]
    fn test_cross_engine_mapping() {
        let m = mapper(DialectKind::Mysql, DialectKind::Postgresql);
        assert_eq!(m.map_type("tinyint(1)").target_type, "BOOLEAN");
        assert_eq!(m.map_type("datetime").target_type, "TIMESTAMP");

        let m = mapper(DialectKind::Postgresql, DialectKind::Mysql);
        assert_eq!(m.map_type("uuid").target_type, "VARCHAR(36)");
        assert_eq!(m.map_type("timestamptz").target_type, "DATETIME");

        let m = mapper(DialectKind::Sqlite, DialectKind::Mysql);
        let mapping = m.map_type("geometry");
        assert_eq!(mapping.target_type, "BLOB");
        assert!(mapping.warning.is_some());
    }
}
