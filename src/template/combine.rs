use indexmap::IndexMap;

use super::{ParameterDefinition, PartialSlot, ResultDefinition};

/// A definition that may be one column of a multi-column mapping.
pub trait Partial {
    fn type_name(&self) -> &str;

    fn partial(&self) -> Option<PartialSlot>;

    fn slots(&self) -> &[usize];

    /// Names the first attribute on which `other` reads or writes something
    /// different from `self`.
    fn disagreement(&self, other: &Self) -> Option<&'static str>;

    /// Replaces the slots with those of the whole group and clears the
    /// partial marker.
    fn merge(&mut self, slots: Vec<usize>);
}

impl Partial for ParameterDefinition {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn partial(&self) -> Option<PartialSlot> {
        self.partial
    }

    fn slots(&self) -> &[usize] {
        &self.sql_indexes
    }

    fn disagreement(&self, other: &Self) -> Option<&'static str> {
        if self.parameter != other.parameter {
            Some("the method parameter")
        } else if self.fields != other.fields {
            Some("the getter chain")
        } else {
            None
        }
    }

    fn merge(&mut self, slots: Vec<usize>) {
        self.sql_indexes = slots;
        self.partial = None;
    }
}

impl Partial for ResultDefinition {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn partial(&self) -> Option<PartialSlot> {
        self.partial
    }

    fn slots(&self) -> &[usize] {
        &self.columns
    }

    fn disagreement(&self, other: &Self) -> Option<&'static str> {
        if self.field != other.field {
            Some("the field")
        } else if self.constructor_parameter != other.constructor_parameter {
            Some("the constructor parameter")
        } else if self.map_key != other.map_key {
            Some("the map key flag")
        } else {
            None
        }
    }

    fn merge(&mut self, slots: Vec<usize>) {
        self.columns = slots;
        self.partial = None;
    }
}

/// Members of one partial group that read or write different things.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("partial definitions of '{type_name}' group {group} disagree on {attribute}")]
pub struct GroupConflict {
    pub type_name: String,
    pub group: usize,
    pub attribute: &'static str,
}

enum Entry<D> {
    Single(D),
    Group((String, usize)),
}

/// Collapses definitions sharing a type name and group index into one
/// definition whose slots are the members' slots in position order.
///
/// Members with an explicit position come first, ascending; the rest keep
/// the order they were written in. The combined definition takes the place
/// of the first member written. Every member of a group must agree on what
/// it reads or writes.
pub fn combine<D: Partial>(definitions: Vec<D>) -> Result<Vec<D>, GroupConflict> {
    let mut entries = Vec::with_capacity(definitions.len());
    let mut groups: IndexMap<(String, usize), Vec<D>> = IndexMap::new();

    for definition in definitions {
        match definition.partial() {
            None => entries.push(Entry::Single(definition)),
            Some(slot) => {
                let key = (definition.type_name().to_owned(), slot.group);
                let members = groups.entry(key.clone()).or_default();
                if members.is_empty() {
                    entries.push(Entry::Group(key));
                }
                members.push(definition);
            }
        }
    }

    let mut combined = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = match entry {
            Entry::Single(definition) => {
                combined.push(definition);
                continue;
            }
            Entry::Group(key) => key,
        };
        let Some(mut members) = groups.swap_remove(&key) else {
            continue;
        };
        if let Some(attribute) = members
            .iter()
            .skip(1)
            .find_map(|member| members[0].disagreement(member))
        {
            let (type_name, group) = key;
            return Err(GroupConflict {
                type_name,
                group,
                attribute,
            });
        }
        if members.len() == 1 {
            combined.extend(members.pop());
            continue;
        }

        let mut order: Vec<usize> = (0..members.len()).collect();
        order.sort_by_key(|&i| match members[i].partial().and_then(|s| s.position) {
            Some(position) => (0, position),
            None => (1, i),
        });
        let slots = order
            .iter()
            .flat_map(|&i| members[i].slots().iter().copied())
            .collect();
        let mut first = members.swap_remove(0);
        first.merge(slots);
        combined.push(first);
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::parse;

    #[test]
    fn test_combine_orders_by_position() {
        let template = parse(
            "INSERT INTO shapes VALUES ({%2}, {point %1@1[2]}, {point %1@1[1]}, {point %3@2})",
            false,
        )
        .unwrap()
        .combined()
        .unwrap();

        let p = &template.parameters;
        assert_eq!(p.len(), 3);
        assert_eq!(p[0].sql_indexes, vec![1]);
        assert_eq!(p[1].type_name, "point");
        assert_eq!(p[1].sql_indexes, vec![3, 2]);
        assert_eq!(p[1].partial, None);
        // A lone group member passes through untouched.
        assert_eq!(p[2].sql_indexes, vec![4]);
        assert_eq!(p[2].partial, Some(PartialSlot { group: 2, position: None }));
    }

    #[test]
    fn test_unpositioned_members_keep_written_order() {
        let template = parse(
            "SELECT x {point %%.location@1}, y {point %%.location@1}, z {point %%.location@1[1]} FROM p",
            false,
        )
        .unwrap()
        .combined()
        .unwrap();

        assert_eq!(template.results.len(), 1);
        let r = &template.results[0];
        assert_eq!(r.columns, vec![3, 1, 2]);
        assert_eq!(r.field.as_deref(), Some("location"));
    }

    #[test]
    fn test_groups_are_keyed_by_type() {
        let template = parse("VALUES ({a %1@1}, {b %1@1})", false)
            .unwrap()
            .combined()
            .unwrap();
        assert_eq!(template.parameters.len(), 2);
    }

    #[test]
    fn test_group_members_must_agree() {
        let conflict = parse("VALUES ({point %1@1}, {point %2@1})", false)
            .unwrap()
            .combined()
            .unwrap_err();
        assert_eq!(
            conflict,
            GroupConflict {
                type_name: "point".into(),
                group: 1,
                attribute: "the method parameter",
            }
        );

        let conflict = parse("VALUES ({point %1.from@1}, {point %1.to@1})", false)
            .unwrap()
            .combined()
            .unwrap_err();
        assert_eq!(conflict.attribute, "the getter chain");

        let conflict = parse("SELECT x {point %%.from@1}, y {point %%.to@1} FROM p", false)
            .unwrap()
            .combined()
            .unwrap_err();
        assert_eq!(
            conflict.to_string(),
            "partial definitions of 'point' group 1 disagree on the field"
        );
    }
}
