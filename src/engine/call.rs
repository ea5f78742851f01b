use indexmap::IndexSet;
use tracing::trace;

use super::{
    bind::{self, Arguments},
    read::{self, OutSource},
    with_call, with_connection,
};
use crate::{
    driver::{CallableStatement, ConnectionSource},
    error::Error,
    mapper::{Mapper, ReturnShape},
    value::Value,
    Result,
};

/// Runs a stored procedure call, reading the return value from its output
/// parameters.
pub(super) fn run(mapper: &Mapper, source: &dyn ConnectionSource, args: &[Value]) -> Result<Value> {
    with_connection(source, |connection| {
        with_call(connection, mapper.sql(), |statement| {
            execute(statement, mapper, args)
        })
    })
}

fn execute(statement: &mut dyn CallableStatement, mapper: &Mapper, args: &[Value]) -> Result<Value> {
    bind::bind_all(statement, mapper, &Arguments::new(args), &[])?;
    for result in mapper.results() {
        for (slot, sql_type) in result.slots.iter().zip(result.mapping.kind().sql_types()) {
            statement.register_out(*slot, sql_type)?;
        }
    }
    statement.execute_update()?;
    trace!("executed call");

    match mapper.returns() {
        ReturnShape::Void => Ok(Value::Null),
        ReturnShape::Collection { class, .. } => {
            let value = read::read_value(&mut OutSource(statement), mapper)?;
            Ok(if class.is_set() {
                Value::Set(IndexSet::from([value]))
            } else {
                Value::List(vec![value])
            })
        }
        ReturnShape::Single(_) => read::read_value(&mut OutSource(statement), mapper),
        ReturnShape::Map { .. } | ReturnShape::Count(_) | ReturnShape::Counts => {
            Err(Error::Unsupported("call statements return a single value"))
        }
    }
}
