use std::borrow::Cow;

use crate::{
    builder::replace_in_with,
    driver::{SqlType, Statement},
    error::Error,
    mapper::{Mapper, ParameterMapping, ParameterSource},
    registry::{MappingKind, MappingType},
    value::Value,
    Result,
};

/// Argument values for one execution: the method arguments, plus the
/// current elements of the collections driving a batch.
pub(super) struct Arguments<'a> {
    args: &'a [Value],
    elements: Vec<(usize, &'a Value)>,
}

impl<'a> Arguments<'a> {
    pub(super) fn new(args: &'a [Value]) -> Self {
        Arguments {
            args,
            elements: Vec::new(),
        }
    }

    pub(super) fn with_elements(args: &'a [Value], elements: Vec<(usize, &'a Value)>) -> Self {
        Arguments { args, elements }
    }

    fn get(&self, mapping: &ParameterMapping) -> Result<&'a Value> {
        let value = match mapping.source {
            ParameterSource::BatchElement => self
                .elements
                .iter()
                .find(|(parameter, _)| *parameter == mapping.parameter)
                .map(|(_, element)| *element),
            _ => self.args.get(mapping.parameter),
        };
        value.ok_or(Error::ArgumentCount {
            expected: mapping.parameter + 1,
            actual: self.args.len(),
        })
    }
}

/// One `?` marker expanded into `count` markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Expansion {
    slot: usize,
    count: usize,
}

/// Elements of an array-mode argument; null binds like an empty array.
pub(super) fn array_elements(value: &Value) -> Result<Vec<&Value>> {
    match value {
        Value::Null => Ok(Vec::new()),
        other => other
            .elements()
            .ok_or_else(|| Error::conversion("array or collection", other)),
    }
}

/// Rewrites the SQL so every array-mode marker becomes one marker per
/// element. An empty array still takes one marker, bound to NULL.
pub(super) fn expand<'m>(
    mapper: &'m Mapper,
    args: &[Value],
) -> Result<(Cow<'m, str>, Vec<Expansion>)> {
    let arguments = Arguments::new(args);
    let mut expansions = Vec::new();
    for mapping in mapper.parameters() {
        if let ParameterSource::ArrayElements { separator } = &mapping.source {
            let count = array_elements(arguments.get(mapping)?)?.len().max(1);
            expansions.push((mapping.sql_indexes[0], count, separator.as_str()));
        }
    }
    if expansions.is_empty() {
        return Ok((Cow::Borrowed(mapper.sql()), Vec::new()));
    }

    expansions.sort_by_key(|(slot, _, _)| *slot);
    let mut sql = mapper.sql().to_owned();
    let mut offset = 0;
    for (slot, count, separator) in &expansions {
        sql = replace_in_with(&sql, slot + offset, *count, separator)?;
        offset += count - 1;
    }
    tracing::trace!(sql = %sql, "expanded array parameters");

    let expansions = expansions
        .into_iter()
        .map(|(slot, count, _)| Expansion { slot, count })
        .collect();
    Ok((Cow::Owned(sql), expansions))
}

/// Position of an original marker after the expansions before it.
fn shift(slot: usize, expansions: &[Expansion]) -> usize {
    slot + expansions
        .iter()
        .filter(|e| e.slot < slot)
        .map(|e| e.count - 1)
        .sum::<usize>()
}

/// Binds every parameter mapping of `mapper`.
pub(super) fn bind_all<S: Statement + ?Sized>(
    statement: &mut S,
    mapper: &Mapper,
    arguments: &Arguments<'_>,
    expansions: &[Expansion],
) -> Result<()> {
    for mapping in mapper.parameters() {
        let value = arguments.get(mapping)?;
        if mapping.is_array() {
            let first = shift(mapping.sql_indexes[0], expansions);
            let elements = array_elements(value)?;
            if elements.is_empty() {
                let sql_type = mapping.mapping.kind().sql_types()[0];
                statement.bind_null(first, sql_type)?;
            }
            for (i, element) in elements.into_iter().enumerate() {
                let element = mapping.extract(element)?;
                bind_value(statement, &mapping.mapping, &element, &[first + i])?;
            }
        } else {
            let slots: Vec<usize> = mapping
                .sql_indexes
                .iter()
                .map(|slot| shift(*slot, expansions))
                .collect();
            let value = mapping.extract(value)?;
            bind_value(statement, &mapping.mapping, &value, &slots)?;
        }
    }
    Ok(())
}

/// Converts `value` through `mapping` and binds it to `slots`, one slot per
/// column the mapping spans.
pub(super) fn bind_value<S: Statement + ?Sized>(
    statement: &mut S,
    mapping: &MappingType,
    value: &Value,
    slots: &[usize],
) -> Result<()> {
    let sql_types = mapping.kind().sql_types();
    let columns = match mapping.kind() {
        MappingKind::Adapter(adapter) => adapter.to_sql(value)?,
        kind => vec![match kind.sql_value_type() {
            Some(ty) if !value.is_null() => value.clone().coerce(&ty)?,
            _ => value.clone(),
        }],
    };
    for ((slot, sql_type), column) in slots.iter().zip(sql_types).zip(columns) {
        bind_one(statement, *slot, column, sql_type)?;
    }
    Ok(())
}

fn bind_one<S: Statement + ?Sized>(
    statement: &mut S,
    slot: usize,
    value: Value,
    sql_type: SqlType,
) -> Result<()> {
    if value.is_null() {
        statement.bind_null(slot, sql_type)
    } else {
        statement.bind(slot, value)
    }
}
