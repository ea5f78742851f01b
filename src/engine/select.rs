use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use super::{
    bind::{self, Arguments},
    finish,
    read::{self, RowSource},
    with_connection, with_statement,
};
use crate::{
    driver::{ConnectionSource, Rows},
    error::Error,
    mapper::{Mapper, ReturnShape},
    value::Value,
    Result,
};

pub(super) fn run(mapper: &Mapper, source: &dyn ConnectionSource, args: &[Value]) -> Result<Value> {
    let (sql, expansions) = bind::expand(mapper, args)?;
    with_connection(source, |connection| {
        with_statement(connection, &sql, |statement| {
            if let Some(rows) = mapper.fetch_size() {
                statement.set_fetch_size(rows)?;
            }
            bind::bind_all(statement, mapper, &Arguments::new(args), &expansions)?;
            let mut rows = statement.execute_query()?;
            let result = collect(mapper, &mut *rows);
            let closed = rows.close();
            finish(result, closed, "result set")
        })
    })
}

fn collect(mapper: &Mapper, rows: &mut dyn Rows) -> Result<Value> {
    match mapper.returns() {
        ReturnShape::Collection {
            class, capacity, ..
        } => {
            let mut values = Vec::with_capacity(capacity.unwrap_or_default());
            while rows.next()? {
                values.push(read::read_value(&mut RowSource(&mut *rows), mapper)?);
            }
            trace!(rows = values.len(), "collected rows");
            Ok(if class.is_set() {
                Value::Set(values.into_iter().collect::<IndexSet<_>>())
            } else {
                Value::List(values)
            })
        }
        ReturnShape::Map { .. } => {
            let mut map = IndexMap::new();
            while rows.next()? {
                let mut source = RowSource(&mut *rows);
                let key = read::read_key(&mut source, mapper)?;
                let value = read::read_value(&mut source, mapper)?;
                map.insert(key, value);
            }
            trace!(entries = map.len(), "collected rows");
            Ok(Value::Map(map))
        }
        _ => {
            if !rows.next()? {
                return if mapper.bean().is_some() {
                    Ok(Value::Null)
                } else {
                    Err(Error::EmptyResult)
                };
            }
            let value = read::read_value(&mut RowSource(&mut *rows), mapper)?;
            if rows.next()? {
                return Err(Error::MoreThanOneResult);
            }
            Ok(value)
        }
    }
}
