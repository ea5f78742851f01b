//! # sqlx-query-mapper
//!
//! Declarative SQL templates with embedded binding placeholders, resolved
//! once against the shape of a query method and executed over SQLx.
//!
//! ## Features
//!
//! - **Binding Placeholders**: `{%1}` binds a method argument, `{%%}` maps a result column
//! - **Bind-Time Validation**: Every template error is reported when the method is bound, never mid-query
//! - **Beans and Collections**: Results fill scalars, beans (setters, constructors or factories), collections and maps
//! - **IN-Clause Expansion**: Array arguments expand to one `?` per element at execution time
//! - **Batching**: Collection arguments to updates run as JDBC-style batches
//! - **Extension Mapping Types**: Register adapters, including multi-column ones, per scope
//!
//! ## Quick Start
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sqlx-query-mapper = "0.1"
//! ```
//!
//! ## Placeholder Syntax
//!
//! ```text
//! {%1}              method parameter 1
//! {%1.address.zip}  getter chain on parameter 1
//! {long %2}         explicit mapping type
//! {%1#, #}          IN-clause separator for an array parameter
//! {%%}              result column
//! {%%.name}         result column into bean property `name`
//! {%%.$1}           result column into constructor parameter 1
//! {%%*}             map key column
//! {point %1@1[2]}   column 2 of multi-column mapping group 1
//! ```
//!
//! ## Examples
//!
//! ### Selecting Values
//!
//! ```rust,no_run
//! use sqlx_query_mapper::prelude::*;
//!
//! # fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let source = MySqlSource::connect("mysql://localhost/test")?;
//! let registry = Registry::new();
//!
//! let names = QueryMethod::bind(
//!     &QueryDecl::select("SELECT name {%%} FROM users WHERE age >= {%1}"),
//!     &MethodSignature::new("names", Type::list(Type::String)).param(Type::I32),
//!     &registry,
//! )?;
//!
//! let names: Vec<String> = names.invoke_as(&source, &[Value::I32(18)])?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Beans
//!
//! ```rust,no_run
//! use sqlx_query_mapper::prelude::*;
//!
//! # fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! # let source = MySqlSource::connect("mysql://localhost/test")?;
//! let user = Class::builder("User")
//!     .property("id", Type::I64)
//!     .property("name", Type::String)
//!     .default_constructor()
//!     .build();
//!
//! let find = QueryMethod::bind(
//!     &QueryDecl::select("SELECT id {%%.id}, name {%%.name} FROM users WHERE id = {%1}"),
//!     &MethodSignature::new("find", Type::object(&user)).param(Type::I64),
//!     &Registry::new(),
//! )?;
//!
//! if let Some(found) = find.invoke_as::<Option<Object>>(&source, &[Value::I64(42)])? {
//!     println!("Found {:?}", found.get("name"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Batch Updates
//!
//! ```rust,no_run
//! use sqlx_query_mapper::prelude::*;
//!
//! # fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! # let source = MySqlSource::connect("mysql://localhost/test")?;
//! let tag = QueryMethod::bind(
//!     &QueryDecl::insert("INSERT INTO tags (name) VALUES ({%1})").batch_size(100),
//!     &MethodSignature::new("tag", Type::array(Type::I32)).param(Type::list(Type::String)),
//!     &Registry::new(),
//! )?;
//!
//! let counts: Vec<i32> = tag.invoke_as(&source, &[Value::from_iter(["a", "b"])])?;
//! # Ok(())
//! # }
//! ```
//!
//! ## How It Works
//!
//! 1. **Parse**: Placeholders are lexed out of the template and replaced by `?` markers
//! 2. **Resolve**: Each definition is checked against the method signature and turned into an immutable `Mapper`
//! 3. **Execute**: Each invocation binds, runs and maps through the synchronous driver contract
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.

pub mod builder;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod mysql;
pub mod query;
pub mod query_as;
pub mod reflect;
pub mod registry;
pub mod resolve;
pub mod template;
pub mod types;
pub mod value;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use query::QueryMethod;
pub use query_as::FromValue;

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::{Error, Result};
    pub use crate::mysql::MySqlSource;
    pub use crate::reflect::MethodSignature;
    pub use crate::registry::{Registry, Scope, TypeAdapter};
    pub use crate::resolve::QueryDecl;
    pub use crate::types::{Class, CollectionClass, EnumType, Type};
    pub use crate::value::{Object, Value};
    pub use crate::{FromValue, QueryMethod};
}
