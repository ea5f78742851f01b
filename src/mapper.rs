//! The resolved binding model for one query method.
//!
//! A [`Mapper`] is produced once by the resolver and is immutable afterwards;
//! the execution engine walks it on every invocation.

use std::{borrow::Cow, fmt, sync::Arc};

use crate::{
    error::Error,
    registry::MappingType,
    types::{Class, CollectionClass, Type},
    value::Value,
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Call,
}

impl QueryKind {
    /// Insert, update and delete share one execution protocol.
    pub fn is_update(self) -> bool {
        matches!(self, QueryKind::Insert | QueryKind::Update | QueryKind::Delete)
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryKind::Select => "select",
            QueryKind::Insert => "insert",
            QueryKind::Update => "update",
            QueryKind::Delete => "delete",
            QueryKind::Call => "call",
        })
    }
}

/// Where a parameter mapping takes its value from at call time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterSource {
    /// The method argument itself.
    Argument,
    /// The current element of a collection argument driving a batch.
    BatchElement,
    /// Every element of an array or collection argument, expanded into a
    /// run of `?` markers joined by `separator`.
    ArrayElements { separator: String },
}

#[derive(Debug, Clone)]
pub struct ParameterMapping {
    /// 0-based method argument index.
    pub parameter: usize,
    pub mapping: MappingType,
    /// Type of the value handed to the mapping, after getters are applied.
    pub bound_type: Type,
    pub getters: Vec<String>,
    pub source: ParameterSource,
    /// 1-based `?` positions in the rewritten SQL.
    pub sql_indexes: Vec<usize>,
}

impl ParameterMapping {
    pub fn is_array(&self) -> bool {
        matches!(self.source, ParameterSource::ArrayElements { .. })
    }

    /// Applies the getter chain to an argument or element.
    ///
    /// A null anywhere along the chain yields null.
    pub fn extract<'v>(&self, value: &'v Value) -> Result<Cow<'v, Value>> {
        let mut current = value;
        for name in &self.getters {
            current = match current {
                Value::Null => return Ok(Cow::Owned(Value::Null)),
                Value::Object(object) => object
                    .get(name)
                    .ok_or_else(|| Error::conversion(format!("bean with '{name}'"), object))?,
                other => return Err(Error::conversion(format!("bean with '{name}'"), other)),
            };
        }
        Ok(Cow::Borrowed(current))
    }
}

/// What a result column is read into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultTarget {
    /// The whole row value of an atomic return.
    Value,
    MapKey,
    Setter(String),
    /// 1-based constructor or factory argument ordinal.
    ConstructorParameter(usize),
}

#[derive(Debug, Clone)]
pub struct ResultMapping {
    pub mapping: MappingType,
    /// Type the read value is converted to before it is stored.
    pub target_type: Type,
    pub target: ResultTarget,
    /// 1-based result columns, or output parameter indexes for calls.
    pub slots: Vec<usize>,
}

/// How a bean instance is created for each row.
#[derive(Debug, Clone)]
pub enum Construction {
    Constructor { class: Arc<Class>, index: usize },
    /// A static method of `class`, which need not be the bean class.
    Factory { class: Arc<Class>, index: usize },
}

impl Construction {
    pub fn invoke(&self, args: Vec<Value>) -> Result<Value> {
        match self {
            Construction::Constructor { class, index } => {
                let constructor = &class.constructors[*index];
                Ok(Value::Object(constructor.invoke(class, args)?))
            }
            Construction::Factory { class, index } => class.methods[*index].invoke(args),
        }
    }

    /// Parameter types of the selected constructor or factory method.
    pub fn params(&self) -> &[Type] {
        match self {
            Construction::Constructor { class, index } => &class.constructors[*index].params,
            Construction::Factory { class, index } => &class.methods[*index].params,
        }
    }
}

/// The bean a row materializes into.
#[derive(Debug, Clone)]
pub struct Bean {
    pub class: Arc<Class>,
    pub construction: Construction,
}

/// The shape of the value returned from an invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnShape {
    Void,
    /// Affected row count, as an `i32` or `i64` (possibly optional).
    Count(Type),
    /// One affected row count per batch entry.
    Counts,
    Single(Type),
    Collection {
        class: CollectionClass,
        capacity: Option<usize>,
        element: Type,
    },
    Map {
        key: Type,
        value: Type,
    },
}

/// Resolved binding model for one query method.
#[derive(Debug, Clone)]
pub struct Mapper {
    pub(crate) method: String,
    pub(crate) kind: QueryKind,
    pub(crate) sql: String,
    pub(crate) parameters: Vec<ParameterMapping>,
    pub(crate) results: Vec<ResultMapping>,
    pub(crate) bean: Option<Bean>,
    pub(crate) returns: ReturnShape,
    pub(crate) batch_size: i32,
    pub(crate) fetch_size: Option<u32>,
    pub(crate) argument_count: usize,
    /// 0-based indexes of the collection arguments driving a batch.
    pub(crate) batch_parameters: Vec<usize>,
}

impl Mapper {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Driver-ready SQL, before any IN-clause expansion.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[ParameterMapping] {
        &self.parameters
    }

    pub fn results(&self) -> &[ResultMapping] {
        &self.results
    }

    pub fn bean(&self) -> Option<&Bean> {
        self.bean.as_ref()
    }

    pub fn returns(&self) -> &ReturnShape {
        &self.returns
    }

    pub fn batch_size(&self) -> i32 {
        self.batch_size
    }

    pub fn fetch_size(&self) -> Option<u32> {
        self.fetch_size
    }

    pub fn argument_count(&self) -> usize {
        self.argument_count
    }

    pub fn batch_parameters(&self) -> &[usize] {
        &self.batch_parameters
    }

    pub fn is_batch(&self) -> bool {
        !self.batch_parameters.is_empty()
    }

    pub fn constructor_parameters(&self) -> usize {
        self.constructor_results().count()
    }

    pub fn map_key(&self) -> Option<&ResultMapping> {
        self.results
            .iter()
            .find(|r| r.target == ResultTarget::MapKey)
    }

    pub fn value_result(&self) -> Option<&ResultMapping> {
        self.results.iter().find(|r| r.target == ResultTarget::Value)
    }

    /// Constructor argument mappings in ordinal order.
    pub fn constructor_results(&self) -> impl Iterator<Item = &ResultMapping> {
        self.results
            .iter()
            .filter(|r| matches!(r.target, ResultTarget::ConstructorParameter(_)))
    }

    pub fn setters(&self) -> impl Iterator<Item = (&str, &ResultMapping)> {
        self.results.iter().filter_map(|r| match &r.target {
            ResultTarget::Setter(name) => Some((name.as_str(), r)),
            _ => None,
        })
    }
}
