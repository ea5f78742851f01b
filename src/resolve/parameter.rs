use super::Context;
use crate::{
    mapper::{ParameterMapping, ParameterSource, QueryKind},
    reflect::MethodInfo,
    template::ParameterDefinition,
    Result,
};

const DEFAULT_SEPARATOR: &str = ",";

/// Resolves one parameter definition against the method parameter it reads.
pub(super) fn resolve(
    context: &Context<'_>,
    kind: QueryKind,
    batch: bool,
    info: &MethodInfo,
    definition: &ParameterDefinition,
) -> Result<ParameterMapping> {
    let index = definition.parameter;
    let parameter = index
        .checked_sub(1)
        .and_then(|i| info.parameters.get(i))
        .ok_or_else(|| context.invalid(format!("there is no parameter {index}")))?;

    let array = || ParameterSource::ArrayElements {
        separator: definition
            .separator
            .clone()
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_owned()),
    };
    let source = if parameter.is_collection() {
        if kind == QueryKind::Select {
            array()
        } else {
            ParameterSource::BatchElement
        }
    } else if parameter.is_array() {
        if batch {
            return Err(context.invalid(format!(
                "array parameter {index} cannot be bound in a batch"
            )));
        }
        if kind == QueryKind::Call {
            return Err(context.invalid(format!(
                "call statement cannot bind array parameter {index}"
            )));
        }
        array()
    } else {
        ParameterSource::Argument
    };

    let mut bound = parameter.value_type().clone();
    for field in &definition.fields {
        let property = bound
            .unboxed()
            .as_class()
            .and_then(|class| class.getter(field))
            .ok_or_else(|| context.invalid(format!("{bound} has no getter '{field}'")))?;
        bound = property.ty.clone();
    }

    let mapping = context.mapping(&definition.type_name, &bound)?;
    if !mapping.accepts(&bound) {
        return Err(context.invalid(format!(
            "mapping type '{}' cannot bind {bound} from parameter {index}",
            mapping.name()
        )));
    }
    context.check_slots(mapping, definition.sql_indexes.len())?;
    if matches!(source, ParameterSource::ArrayElements { .. }) && mapping.kind().columns() != 1 {
        return Err(context.invalid(format!(
            "array parameter {index} needs a single-column mapping type"
        )));
    }

    Ok(ParameterMapping {
        parameter: parameter.index - 1,
        mapping: mapping.clone(),
        bound_type: bound,
        getters: definition.fields.clone(),
        source,
        sql_indexes: definition.sql_indexes.clone(),
    })
}
