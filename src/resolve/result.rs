use super::{construct, Context, QueryDecl};
use crate::{
    mapper::{Bean, ResultMapping, ResultTarget, ReturnShape},
    registry::{MappingType, AUTO},
    template::ResultDefinition,
    types::Type,
    Result,
};

/// Resolves the result definitions against the return shape, selecting a
/// bean construction when rows materialize into beans.
pub(super) fn resolve(
    context: &Context<'_>,
    decl: &QueryDecl,
    returns: &ReturnShape,
    definitions: &[ResultDefinition],
) -> Result<(Vec<ResultMapping>, Option<Bean>)> {
    let (keys, values): (Vec<_>, Vec<_>) = definitions.iter().partition(|d| d.map_key);
    let mut results = Vec::with_capacity(definitions.len());

    match returns {
        ReturnShape::Map { key, .. } => {
            let [definition] = keys.as_slice() else {
                return Err(context.invalid(format!(
                    "map return needs exactly one map key definition, found {}",
                    keys.len()
                )));
            };
            results.push(map_key(context, definition, key)?);
        }
        _ if !keys.is_empty() => {
            return Err(context.invalid("map key definition requires a map return"));
        }
        _ => {}
    }

    let value_type = match returns {
        ReturnShape::Void | ReturnShape::Count(_) | ReturnShape::Counts => {
            if !values.is_empty() {
                return Err(context.invalid(format!(
                    "{} statement without a result value cannot map result columns",
                    decl.kind
                )));
            }
            return Ok((results, None));
        }
        ReturnShape::Single(ty) => ty,
        ReturnShape::Collection { element, .. } => element,
        ReturnShape::Map { value, .. } => value,
    };

    let bean_class = value_type.unboxed().as_class().filter(|_| {
        values
            .iter()
            .any(|d| d.field.is_some() || d.constructor_parameter.is_some())
    });

    let Some(class) = bean_class else {
        let [definition] = values.as_slice() else {
            return Err(context.invalid(format!(
                "{value_type} result needs exactly one result definition, found {}",
                values.len()
            )));
        };
        if let Some(field) = &definition.field {
            return Err(context.invalid(format!("{value_type} has no setter '{field}'")));
        }
        let mapping = produces(context, definition, value_type)?;
        results.push(ResultMapping {
            mapping: mapping.clone(),
            target_type: value_type.clone(),
            target: ResultTarget::Value,
            slots: definition.columns.clone(),
        });
        return Ok((results, None));
    };

    let mut arguments = Vec::new();
    let mut setters = Vec::new();
    for definition in values {
        match (&definition.field, definition.constructor_parameter) {
            (Some(field), None) => {
                let property = class.setter(field).ok_or_else(|| {
                    context.invalid(format!("{} has no setter '{field}'", class.name))
                })?;
                let mapping = context.mapping(&definition.type_name, &property.ty)?;
                // Enum setters are matched by name only.
                let is_enum = matches!(property.ty.unboxed(), Type::Enum(_));
                if !is_enum && !mapping.produces(&property.ty) {
                    return Err(context.invalid(format!(
                        "mapping type '{}' cannot produce {} for '{field}'",
                        mapping.name(),
                        property.ty
                    )));
                }
                context.check_slots(mapping, definition.columns.len())?;
                setters.push(ResultMapping {
                    mapping: mapping.clone(),
                    target_type: property.ty.clone(),
                    target: ResultTarget::Setter(field.clone()),
                    slots: definition.columns.clone(),
                });
            }
            (None, Some(ordinal)) => arguments.push((ordinal, definition)),
            _ => {
                return Err(context.invalid(format!(
                    "result for {} needs either a field or a constructor parameter",
                    class.name
                )));
            }
        }
    }

    arguments.sort_by_key(|(ordinal, _)| *ordinal);
    let ordinals: Vec<usize> = arguments.iter().map(|(ordinal, _)| *ordinal).collect();
    if ordinals.iter().enumerate().any(|(i, ordinal)| *ordinal != i + 1) {
        return Err(context.invalid(format!(
            "constructor parameters must be numbered from 1 without gaps, found {ordinals:?}"
        )));
    }

    let named = arguments
        .iter()
        .map(|(_, definition)| {
            if definition.type_name == AUTO {
                Ok(None)
            } else {
                context.named(&definition.type_name).map(Some)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let construction = construct::select(context, class, decl.factory.as_ref(), &named)?;
    let params = construction.params().to_vec();
    for (((ordinal, definition), mapping), ty) in arguments.iter().zip(named).zip(params) {
        let mapping = match mapping {
            Some(mapping) => mapping,
            None => context.mapping(AUTO, &ty)?,
        };
        context.check_slots(mapping, definition.columns.len())?;
        results.push(ResultMapping {
            mapping: mapping.clone(),
            target_type: ty,
            target: ResultTarget::ConstructorParameter(*ordinal),
            slots: definition.columns.clone(),
        });
    }
    results.extend(setters);

    Ok((
        results,
        Some(Bean {
            class: class.clone(),
            construction,
        }),
    ))
}

fn map_key(context: &Context<'_>, definition: &ResultDefinition, key: &Type) -> Result<ResultMapping> {
    if definition.field.is_some() || definition.constructor_parameter.is_some() {
        return Err(context.invalid("map key definition cannot target a field"));
    }
    let mapping = produces(context, definition, key)?;
    Ok(ResultMapping {
        mapping: mapping.clone(),
        target_type: key.clone(),
        target: ResultTarget::MapKey,
        slots: definition.columns.clone(),
    })
}

/// The mapping of a definition that must produce values of `ty`.
fn produces<'r>(
    context: &Context<'r>,
    definition: &ResultDefinition,
    ty: &Type,
) -> Result<&'r MappingType> {
    let mapping = context.mapping(&definition.type_name, ty)?;
    if !mapping.produces(ty) {
        return Err(context.invalid(format!(
            "mapping type '{}' cannot produce {ty}",
            mapping.name()
        )));
    }
    context.check_slots(mapping, definition.columns.len())?;
    Ok(mapping)
}
