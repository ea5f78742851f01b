//! The execution engine: runs a [`Mapper`] against a connection source.
//!
//! Every invocation acquires one connection, prepares one statement and
//! releases both on every exit path. When a release step fails after the
//! invocation already failed, the original error wins and the release
//! error is logged.

mod bind;
mod call;
mod read;
mod select;
mod update;

#[cfg(test)]
mod tests;

use tracing::{trace, warn};

use crate::{
    driver::{CallableStatement, Connection, ConnectionSource, Statement},
    mapper::{Mapper, QueryKind},
    value::Value,
    Result,
};

/// Executes one invocation of `mapper` with `args`, one value per method
/// parameter.
pub fn execute(mapper: &Mapper, source: &dyn ConnectionSource, args: &[Value]) -> Result<Value> {
    trace!(method = mapper.method(), kind = %mapper.kind(), "executing query method");
    match mapper.kind() {
        QueryKind::Select => select::run(mapper, source, args),
        _ if mapper.is_batch() => update::run_batch(mapper, source, args),
        QueryKind::Call => call::run(mapper, source, args),
        _ => update::run(mapper, source, args),
    }
}

/// Keeps the primary outcome, surfacing a cleanup error only when there
/// is nothing else to report.
fn finish<T>(result: Result<T>, cleanup: Result<()>, resource: &str) -> Result<T> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(secondary)) => {
            warn!(error = %secondary, "failed to release {resource} after an error");
            Err(err)
        }
    }
}

fn with_connection<T>(
    source: &dyn ConnectionSource,
    f: impl FnOnce(&mut dyn Connection) -> Result<T>,
) -> Result<T> {
    let mut connection = source.acquire()?;
    trace!("acquired connection");
    let result = source
        .post_acquire(&mut *connection)
        .and_then(|()| f(&mut *connection));
    let released = source.release(connection);
    finish(result, released, "connection")
}

fn with_statement<T>(
    connection: &mut dyn Connection,
    sql: &str,
    f: impl FnOnce(&mut dyn Statement) -> Result<T>,
) -> Result<T> {
    trace!(sql, "preparing statement");
    let mut statement = connection.prepare(sql)?;
    let result = f(&mut *statement);
    let closed = statement.close();
    finish(result, closed, "statement")
}

fn with_call<T>(
    connection: &mut dyn Connection,
    sql: &str,
    f: impl FnOnce(&mut dyn CallableStatement) -> Result<T>,
) -> Result<T> {
    trace!(sql, "preparing call");
    let mut statement = connection.prepare_call(sql)?;
    let result = f(&mut *statement);
    let closed = statement.close();
    finish(result, closed, "statement")
}
