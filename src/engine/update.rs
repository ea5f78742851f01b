use tracing::trace;

use super::{
    bind::{self, Arguments},
    with_call, with_connection, with_statement,
};
use crate::{
    driver::{ConnectionSource, Statement},
    error::Error,
    mapper::{Mapper, QueryKind, ReturnShape},
    types::Type,
    value::Value,
    Result,
};

pub(super) fn run(mapper: &Mapper, source: &dyn ConnectionSource, args: &[Value]) -> Result<Value> {
    let (sql, expansions) = bind::expand(mapper, args)?;
    with_connection(source, |connection| {
        with_statement(connection, &sql, |statement| {
            bind::bind_all(statement, mapper, &Arguments::new(args), &expansions)?;
            let count = statement.execute_update()?;
            trace!(count, "executed update");
            match mapper.returns() {
                ReturnShape::Count(ty) => count_value(count, ty),
                _ => Ok(Value::Null),
            }
        })
    })
}

/// Runs one statement per element tuple of the collection arguments,
/// either immediately or in batches of the configured size.
pub(super) fn run_batch(
    mapper: &Mapper,
    source: &dyn ConnectionSource,
    args: &[Value],
) -> Result<Value> {
    let collections = mapper
        .batch_parameters()
        .iter()
        .map(|&parameter| match args.get(parameter) {
            Some(value) => bind::array_elements(value),
            None => Err(Error::ArgumentCount {
                expected: parameter + 1,
                actual: args.len(),
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    let size = collections.first().map_or(0, Vec::len);
    if collections.iter().any(|c| c.len() != size) {
        return Err(Error::CollectionsDifferentSize);
    }
    if size == 0 {
        trace!("empty batch");
        return counts_value(mapper, Vec::new());
    }

    let rows = (0..size).map(|row| {
        mapper
            .batch_parameters()
            .iter()
            .zip(&collections)
            .map(|(&parameter, elements)| (parameter, elements[row]))
            .collect::<Vec<_>>()
    });

    let counts = with_connection(source, |connection| {
        if mapper.kind() == QueryKind::Call {
            with_call(connection, mapper.sql(), |statement| {
                execute_rows(statement, mapper, args, rows)
            })
        } else {
            with_statement(connection, mapper.sql(), |statement| {
                execute_rows(statement, mapper, args, rows)
            })
        }
    })?;
    counts_value(mapper, counts)
}

fn execute_rows<'a, S: Statement + ?Sized>(
    statement: &mut S,
    mapper: &Mapper,
    args: &'a [Value],
    rows: impl Iterator<Item = Vec<(usize, &'a Value)>>,
) -> Result<Vec<u64>> {
    let batch_size = usize::try_from(mapper.batch_size()).unwrap_or(0);
    let mut counts = Vec::new();
    let mut pending = 0;

    for elements in rows {
        let arguments = Arguments::with_elements(args, elements);
        bind::bind_all(statement, mapper, &arguments, &[])?;
        if batch_size > 0 {
            statement.add_batch()?;
            pending += 1;
            if pending == batch_size {
                counts.extend(statement.execute_batch()?);
                trace!(entries = pending, "flushed batch");
                pending = 0;
            }
        } else {
            counts.push(statement.execute_update()?);
        }
    }
    if pending > 0 {
        counts.extend(statement.execute_batch()?);
        trace!(entries = pending, "flushed batch");
    }
    Ok(counts)
}

fn count_value(count: u64, ty: &Type) -> Result<Value> {
    let count = i64::try_from(count).map_err(|_| Error::conversion(ty, count))?;
    Value::I64(count).coerce(ty)
}

fn counts_value(mapper: &Mapper, counts: Vec<u64>) -> Result<Value> {
    match mapper.returns() {
        ReturnShape::Counts => Ok(Value::Array(
            counts
                .into_iter()
                .map(|count| count_value(count, &Type::I32))
                .collect::<Result<_>>()?,
        )),
        _ => Ok(Value::Null),
    }
}
