//! Sieve query engine library.
//!
//! Compiles loosely-typed request parameters (filters, sorts, paging and
//! nested relation includes) into a [`QueryDescriptor`] for a relational
//! data-access layer. The `sieve` binary wraps the compiler for use from
//! the command line.

pub mod config;
pub mod error;
pub mod query;
pub mod schema;

pub use config::{Dialect, EngineConfig};
pub use error::{QueryError, QueryResult};
pub use query::{QueryCompiler, QueryDescriptor, RequestQuery};
pub use schema::{Entity, Field, NativeType, Schema};
