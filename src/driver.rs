//! The connection collaborator contract.
//!
//! The execution engine only talks to a database through these traits. A
//! [`ConnectionSource`] hands out one connection per invocation and takes it
//! back afterwards; statements, rows and callable statements follow the
//! classic prepare / bind / execute protocol with 1-based slot indexes.
//!
//! Reads follow the raw-value-then-null-flag protocol: [`Rows::read`]
//! returns whatever the driver produced (typically a zero value for SQL
//! NULL) and [`Rows::was_null`] reports whether that read was NULL.

use crate::{value::Value, Result};

/// SQL type codes used for typed NULL binds and output parameter
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Char,
    VarChar,
    Date,
    Time,
    Timestamp,
    VarBinary,
    Other,
}

pub trait ConnectionSource {
    fn acquire(&self) -> Result<Box<dyn Connection + '_>>;

    /// Invoked right after [`ConnectionSource::acquire`].
    fn post_acquire(&self, _connection: &mut dyn Connection) -> Result<()> {
        Ok(())
    }

    fn release(&self, connection: Box<dyn Connection + '_>) -> Result<()>;
}

pub trait Connection {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement + '_>>;

    fn prepare_call(&mut self, sql: &str) -> Result<Box<dyn CallableStatement + '_>>;
}

pub trait Statement {
    /// Row count hint for result fetching.
    fn set_fetch_size(&mut self, _rows: u32) -> Result<()> {
        Ok(())
    }

    fn bind(&mut self, index: usize, value: Value) -> Result<()>;

    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> Result<()>;

    fn execute_query(&mut self) -> Result<Box<dyn Rows + '_>>;

    fn execute_update(&mut self) -> Result<u64>;

    /// Queues the currently bound parameters as one batch entry.
    fn add_batch(&mut self) -> Result<()>;

    /// Executes every queued entry, returning one count per entry.
    fn execute_batch(&mut self) -> Result<Vec<u64>>;

    fn close(&mut self) -> Result<()>;
}

pub trait Rows {
    /// Advances to the next row; `false` once the rows are exhausted.
    fn next(&mut self) -> Result<bool>;

    fn read(&mut self, column: usize, sql_type: SqlType) -> Result<Value>;

    fn was_null(&self) -> bool;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait CallableStatement: Statement {
    fn register_out(&mut self, index: usize, sql_type: SqlType) -> Result<()>;

    fn read_out(&mut self, index: usize, sql_type: SqlType) -> Result<Value>;

    fn was_null(&self) -> bool;
}
