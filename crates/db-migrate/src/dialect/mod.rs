//! Type classification and mapping between dialects.
//!
//! Every native type is classified into a [`GenericType`] by its source
//! dialect, then rendered by the target dialect:
//!
//! ```rust,ignore
//! let mapper = typemap::mapper(DialectKind::Mysql, DialectKind::Postgresql);
//! let mapping = mapper.map_type("tinyint(1)");
//! assert_eq!(mapping.target_type, "BOOLEAN");
//! ```

mod canonical;
pub mod typemap;

pub use canonical::{
    ComposedMapper, FromGeneric, GenericType, GenericTypeInfo, NativeType, ToGeneric,
};
pub use typemap::{classify, mapper, MysqlTypes, PostgresTypes, SqliteTypes};
