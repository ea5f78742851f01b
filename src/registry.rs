//! Mapping types: the conversions a placeholder can select by name.
//!
//! A [`Registry`] holds the built-in mapping types (`int`, `string`,
//! `date`, ...) plus adapters registered under an extension [`Scope`].
//! Lookups consult the scope first and fall back to the built-ins.

use std::{collections::HashMap, fmt, sync::Arc};

use indexmap::IndexMap;

use crate::{
    driver::SqlType,
    error::Error,
    types::Type,
    value::Value,
    Result,
};

/// Name that asks the resolver to pick a mapping from the value type.
pub const AUTO: &str = "auto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Numeric {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Character {
    Char,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date,
    Time,
    Timestamp,
}

/// How values are converted between Rust and SQL for one placeholder.
#[derive(Debug, Clone)]
pub enum MappingKind {
    Numeric(Numeric),
    Character(Character),
    DateTime(Temporal),
    Binary,
    Adapter(Arc<dyn TypeAdapter>),
}

impl MappingKind {
    /// SQL types of the slots this mapping occupies, one per column.
    pub fn sql_types(&self) -> Vec<SqlType> {
        let sql_type = match self {
            MappingKind::Numeric(n) => match n {
                Numeric::Bool => SqlType::Boolean,
                Numeric::Byte => SqlType::TinyInt,
                Numeric::Short => SqlType::SmallInt,
                Numeric::Int => SqlType::Integer,
                Numeric::Long => SqlType::BigInt,
                Numeric::Float => SqlType::Real,
                Numeric::Double => SqlType::Double,
            },
            MappingKind::Character(Character::Char) => SqlType::Char,
            MappingKind::Character(Character::String) => SqlType::VarChar,
            MappingKind::DateTime(Temporal::Date) => SqlType::Date,
            MappingKind::DateTime(Temporal::Time) => SqlType::Time,
            MappingKind::DateTime(Temporal::Timestamp) => SqlType::Timestamp,
            MappingKind::Binary => SqlType::VarBinary,
            MappingKind::Adapter(adapter) => return adapter.sql_types(),
        };
        vec![sql_type]
    }

    pub fn columns(&self) -> usize {
        match self {
            MappingKind::Adapter(adapter) => adapter.sql_types().len(),
            _ => 1,
        }
    }

    /// The canonical value type handed to the driver.
    pub(crate) fn sql_value_type(&self) -> Option<Type> {
        Some(match self {
            MappingKind::Numeric(n) => match n {
                Numeric::Bool => Type::Bool,
                Numeric::Byte => Type::I8,
                Numeric::Short => Type::I16,
                Numeric::Int => Type::I32,
                Numeric::Long => Type::I64,
                Numeric::Float => Type::F32,
                Numeric::Double => Type::F64,
            },
            MappingKind::Character(Character::Char) => Type::Char,
            MappingKind::Character(Character::String) => Type::String,
            MappingKind::DateTime(Temporal::Date) => Type::Date,
            MappingKind::DateTime(Temporal::Time) => Type::Time,
            MappingKind::DateTime(Temporal::Timestamp) => Type::Timestamp,
            MappingKind::Binary => Type::Bytes,
            MappingKind::Adapter(_) => return None,
        })
    }
}

/// A user-supplied conversion, possibly spanning several columns.
pub trait TypeAdapter: Send + Sync + fmt::Debug {
    /// Rust-side types this adapter can bind and produce.
    fn value_types(&self) -> Vec<Type>;

    /// One SQL type per column the adapter occupies.
    fn sql_types(&self) -> Vec<SqlType>;

    /// Splits a value into one driver value per column.
    fn to_sql(&self, value: &Value) -> Result<Vec<Value>>;

    /// Reassembles a value from its columns; NULL columns arrive as
    /// [`Value::Null`].
    fn from_sql(&self, columns: Vec<Value>) -> Result<Value>;
}

/// A named mapping kind and the value types it can bind to.
#[derive(Debug, Clone)]
pub struct MappingType {
    name: String,
    kind: MappingKind,
    value_types: Vec<Type>,
}

impl MappingType {
    fn builtin(name: &str, kind: MappingKind, value_types: Vec<Type>) -> Self {
        MappingType {
            name: name.to_owned(),
            kind,
            value_types,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &MappingKind {
        &self.kind
    }

    pub fn value_types(&self) -> &[Type] {
        &self.value_types
    }

    fn maps_enums(&self) -> bool {
        matches!(self.kind, MappingKind::Character(Character::String))
    }

    /// Whether `ty` is exactly one of the declared value types.
    pub fn declares(&self, ty: &Type) -> bool {
        self.value_types.contains(ty) || (matches!(ty, Type::Enum(_)) && self.maps_enums())
    }

    /// Whether a value of type `ty` can be bound through this mapping.
    ///
    /// Optional reference types bind like their inner type.
    pub fn accepts(&self, ty: &Type) -> bool {
        self.declares(ty)
            || self.value_types.iter().any(|v| v.is_assignable_from(ty))
            || matches!(ty, Type::Option(inner) if !inner.is_primitive() && self.accepts(inner))
    }

    /// Whether values this mapping produces can be stored into `ty`.
    pub fn produces(&self, ty: &Type) -> bool {
        self.declares(ty) || self.value_types.iter().any(|v| ty.is_assignable_from(v))
    }
}

/// Extension scope under which adapters are registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope(String);

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Scope(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Table of mapping types, shared read-only once query methods are bound.
///
/// # Examples
///
/// ```
/// use sqlx_query_mapper::registry::{Registry, Scope};
/// use sqlx_query_mapper::types::Type;
///
/// let registry = Registry::new();
/// let scope = Scope::new("app");
///
/// assert!(registry.is_registered(&scope, "int"));
/// assert_eq!(registry.mapping_for_type(None, &Type::I64).unwrap().name(), "long");
/// ```
#[derive(Debug, Clone)]
pub struct Registry {
    builtins: IndexMap<String, MappingType>,
    scoped: HashMap<Scope, IndexMap<String, MappingType>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates a registry seeded with the built-in mapping types.
    pub fn new() -> Self {
        let nullable = |ty: Type| vec![ty.clone(), Type::option(ty)];
        let numeric = |name: &str, n: Numeric, ty: Type| {
            MappingType::builtin(name, MappingKind::Numeric(n), nullable(ty))
        };
        let builtins = [
            numeric("boolean", Numeric::Bool, Type::Bool),
            numeric("byte", Numeric::Byte, Type::I8),
            numeric("short", Numeric::Short, Type::I16),
            numeric("int", Numeric::Int, Type::I32),
            numeric("long", Numeric::Long, Type::I64),
            numeric("float", Numeric::Float, Type::F32),
            numeric("double", Numeric::Double, Type::F64),
            MappingType::builtin(
                "char",
                MappingKind::Character(Character::Char),
                nullable(Type::Char),
            ),
            MappingType::builtin(
                "string",
                MappingKind::Character(Character::String),
                vec![Type::String],
            ),
            MappingType::builtin("date", MappingKind::DateTime(Temporal::Date), vec![Type::Date]),
            MappingType::builtin("time", MappingKind::DateTime(Temporal::Time), vec![Type::Time]),
            MappingType::builtin(
                "timestamp",
                MappingKind::DateTime(Temporal::Timestamp),
                vec![Type::Timestamp],
            ),
            MappingType::builtin(
                "blob",
                MappingKind::Binary,
                vec![Type::Bytes, Type::array(Type::I8)],
            ),
        ];

        Registry {
            builtins: builtins
                .into_iter()
                .map(|m| (m.name.clone(), m))
                .collect(),
            scoped: HashMap::new(),
        }
    }

    /// Registers an adapter under `name` in `scope`.
    ///
    /// A scoped registration may shadow a built-in name, but a name can only
    /// be registered once per scope.
    pub fn register(
        &mut self,
        scope: &Scope,
        name: impl Into<String>,
        adapter: Arc<dyn TypeAdapter>,
    ) -> Result<()> {
        let name = name.into();
        let table = self.scoped.entry(scope.clone()).or_default();
        if table.contains_key(&name) {
            return Err(Error::AlreadyRegistered(name));
        }
        tracing::debug!(scope = scope.name(), name = %name, "registering mapping type");
        let value_types = adapter.value_types();
        table.insert(
            name.clone(),
            MappingType {
                name,
                kind: MappingKind::Adapter(adapter),
                value_types,
            },
        );
        Ok(())
    }

    /// Removes a scoped registration; built-ins cannot be removed.
    pub fn unregister(&mut self, scope: &Scope, name: &str) -> bool {
        let Some(table) = self.scoped.get_mut(scope) else {
            return false;
        };
        let removed = table.shift_remove(name).is_some();
        if table.is_empty() {
            self.scoped.remove(scope);
        }
        removed
    }

    pub fn is_registered(&self, scope: &Scope, name: &str) -> bool {
        self.lookup(Some(scope), name).is_some()
    }

    /// Finds a mapping type by name, trying `scope` before the built-ins.
    pub fn lookup(&self, scope: Option<&Scope>, name: &str) -> Option<&MappingType> {
        scope
            .and_then(|scope| self.scoped.get(scope))
            .and_then(|table| table.get(name))
            .or_else(|| self.builtins.get(name))
    }

    /// The mapping used for an `auto` placeholder bound to `ty`.
    ///
    /// Scoped adapters declaring `ty` win over built-ins; enums map through
    /// `string` by variant name.
    pub fn mapping_for_type(&self, scope: Option<&Scope>, ty: &Type) -> Option<&MappingType> {
        let scoped = scope
            .and_then(|scope| self.scoped.get(scope))
            .and_then(|table| table.values().find(|m| m.value_types.contains(ty)));
        if scoped.is_some() {
            return scoped;
        }
        match ty {
            Type::Enum(_) => self.builtins.get("string"),
            Type::Option(inner) if !inner.is_primitive() => self.mapping_for_type(scope, inner),
            _ => self.builtins.values().find(|m| m.value_types.contains(ty)),
        }
    }
}
