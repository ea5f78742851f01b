use crate::{
    driver::{CallableStatement, Rows, SqlType},
    error::Error,
    mapper::{Mapper, ResultMapping},
    registry::MappingKind,
    value::Value,
    Result,
};

/// Something result columns are read from: a result row, or the output
/// parameters of a call.
pub(super) trait Source {
    /// Reads one slot, yielding [`Value::Null`] when the driver reports
    /// the raw value as NULL.
    fn read(&mut self, slot: usize, sql_type: SqlType) -> Result<Value>;
}

pub(super) struct RowSource<'a, 'r>(pub &'a mut (dyn Rows + 'r));

impl Source for RowSource<'_, '_> {
    fn read(&mut self, slot: usize, sql_type: SqlType) -> Result<Value> {
        let raw = self.0.read(slot, sql_type)?;
        Ok(if self.0.was_null() { Value::Null } else { raw })
    }
}

pub(super) struct OutSource<'a, 's>(pub &'a mut (dyn CallableStatement + 's));

impl Source for OutSource<'_, '_> {
    fn read(&mut self, slot: usize, sql_type: SqlType) -> Result<Value> {
        let raw = self.0.read_out(slot, sql_type)?;
        Ok(if self.0.was_null() { Value::Null } else { raw })
    }
}

/// Reads one result mapping and converts it to its target type.
fn read_mapping(source: &mut dyn Source, mapping: &ResultMapping) -> Result<Value> {
    let sql_types = mapping.mapping.kind().sql_types();
    let value = match mapping.mapping.kind() {
        MappingKind::Adapter(adapter) => {
            let columns = mapping
                .slots
                .iter()
                .zip(sql_types)
                .map(|(slot, sql_type)| source.read(*slot, sql_type))
                .collect::<Result<Vec<_>>>()?;
            adapter.from_sql(columns)?
        }
        _ => source.read(mapping.slots[0], sql_types[0])?,
    };
    value.coerce(&mapping.target_type)
}

/// The map key of the current row.
pub(super) fn read_key(source: &mut dyn Source, mapper: &Mapper) -> Result<Value> {
    match mapper.map_key() {
        Some(mapping) => read_mapping(source, mapping),
        None => Err(Error::Unsupported("map return without a map key")),
    }
}

/// Materializes the value of the current row: the atomic value, or a bean
/// built from its constructor arguments with every setter applied.
pub(super) fn read_value(source: &mut dyn Source, mapper: &Mapper) -> Result<Value> {
    let Some(bean) = mapper.bean() else {
        return match mapper.value_result() {
            Some(mapping) => read_mapping(source, mapping),
            None => Err(Error::Unsupported("result without a value mapping")),
        };
    };

    let arguments = mapper
        .constructor_results()
        .map(|mapping| read_mapping(source, mapping))
        .collect::<Result<Vec<_>>>()?;
    let mut instance = bean.construction.invoke(arguments)?;

    for (field, mapping) in mapper.setters() {
        let value = read_mapping(source, mapping)?;
        match &mut instance {
            Value::Object(object) => object.set(field, value)?,
            other => return Err(Error::conversion(&bean.class.name, &*other)),
        }
    }
    Ok(instance)
}
