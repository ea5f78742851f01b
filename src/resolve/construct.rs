use std::sync::Arc;

use super::{Context, Factory};
use crate::{
    mapper::Construction,
    registry::MappingType,
    types::{Class, Type},
    Result,
};

type Pass = fn(&MappingType, &Type) -> bool;

/// Exact declared types first, then anything assignable.
const PASSES: [Pass; 2] = [MappingType::declares, MappingType::produces];

/// Selects the constructor, or the factory method when one is declared,
/// whose parameters take the constructor argument mappings in ordinal
/// order. `None` stands for an `auto` mapping, which matches any parameter
/// type that has a default mapping.
pub(super) fn select(
    context: &Context<'_>,
    bean: &Arc<Class>,
    factory: Option<&Factory>,
    mappings: &[Option<&MappingType>],
) -> Result<Construction> {
    match factory {
        Some(factory) => {
            let bean_type = Type::object(bean);
            let candidates = factory
                .class
                .static_methods(&factory.method)
                .filter(|(_, method)| {
                    method.is_public
                        && method.is_static
                        && bean_type.is_assignable_from(&method.returns)
                })
                .map(|(index, method)| (index, method.params.as_slice()))
                .collect::<Vec<_>>();
            find(context, &candidates, mappings)
                .map(|index| Construction::Factory {
                    class: factory.class.clone(),
                    index,
                })
                .ok_or_else(|| {
                    context.invalid(format!(
                        "no matching factory method {}::{} taking {} argument(s) for {}",
                        factory.class.name,
                        factory.method,
                        mappings.len(),
                        bean.name
                    ))
                })
        }
        None => {
            if bean.is_abstract {
                return Err(context.invalid(format!(
                    "cannot instantiate abstract class {} without a factory",
                    bean.name
                )));
            }
            let candidates = bean
                .constructors
                .iter()
                .enumerate()
                .map(|(index, constructor)| (index, constructor.params.as_slice()))
                .collect::<Vec<_>>();
            find(context, &candidates, mappings)
                .map(|index| Construction::Constructor {
                    class: bean.clone(),
                    index,
                })
                .ok_or_else(|| {
                    context.invalid(format!(
                        "no matching constructor of {} taking {} argument(s)",
                        bean.name,
                        mappings.len()
                    ))
                })
        }
    }
}

fn find(
    context: &Context<'_>,
    candidates: &[(usize, &[Type])],
    mappings: &[Option<&MappingType>],
) -> Option<usize> {
    PASSES.iter().find_map(|pass| {
        candidates
            .iter()
            .find(|(_, params)| {
                params.len() == mappings.len()
                    && params.iter().zip(mappings).all(|(ty, mapping)| match mapping {
                        Some(mapping) => pass(mapping, ty),
                        None => context.has_default_mapping(ty),
                    })
            })
            .map(|(index, _)| *index)
    })
}
