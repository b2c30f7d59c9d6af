//! An embedded object-persistence layer over a single SQLite file.
//!
//! Reflects plain Rust structs into tables ([`model`], [`table`]), keeps
//! those tables synchronized with live schema ([`schema`]), and maps rows to
//! and from them ([`mapper`]) through a single [`connection::Connection`].
//! Predicates are expressed as a small tree ([`predicate`]) and translated
//! into parameterized SQL rather than built as raw strings.

pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod ident;
pub mod mapper;
pub mod model;
pub mod predicate;
pub mod schema;
pub mod statement;
pub mod table;
mod trace;
pub mod value;

pub use config::{ConnectionOptions, DateTimeFormat, GuidStringFormat, JournalMode};
pub use connection::Connection;
pub use error::{Result, StoreError};
pub use mapper::{delete, load, load_all, save};
pub use model::{HasAffinity, Model, TypeRegistry};
pub use predicate::{translate, BinaryOp, Expr, LogicalOp, MethodCall};
pub use statement::{StepResult, Statement};
pub use table::{Affinity, ColumnAttributes, ColumnDescriptor, TableDescriptor, TableDescriptorBuilder};
pub use value::{BoundValue, FromSqlValue, SqlValue};

/// Re-exports the common entry points for a `use litebase::prelude::*;` import.
pub mod prelude {
    pub use crate::config::{ConnectionOptions, DateTimeFormat, GuidStringFormat, JournalMode};
    pub use crate::connection::Connection;
    pub use crate::error::{Result, StoreError};
    pub use crate::mapper::{delete, load, load_all, save};
    pub use crate::model::{Model, TypeRegistry};
    pub use crate::predicate::{translate, BinaryOp, Expr, LogicalOp, MethodCall};
    pub use crate::table::{Affinity, ColumnAttributes, TableDescriptor, TableDescriptorBuilder};
    pub use crate::value::{BoundValue, FromSqlValue, SqlValue};
}
