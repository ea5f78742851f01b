//! The binding resolver: turns a query declaration and a reflected method
//! signature into a [`Mapper`].
//!
//! Every failure is reported at bind time as a [`ValidationError`] naming
//! the method; nothing left unresolved here can fail later for a reason
//! the declaration could have caught.

mod construct;
mod parameter;
mod result;

use std::sync::Arc;

use crate::{
    config::Settings,
    error::{Error, ValidationError},
    mapper::{Mapper, QueryKind, ReturnShape},
    reflect::MethodInfo,
    registry::{MappingType, Registry, Scope, AUTO},
    template::Parser,
    types::{Class, CollectionClass, Type},
    Result,
};

/// A static factory method used instead of a constructor to create beans.
#[derive(Debug, Clone)]
pub struct Factory {
    pub class: Arc<Class>,
    pub method: String,
}

/// Declares what a query method runs and how.
///
/// # Examples
///
/// ```
/// use sqlx_query_mapper::resolve::QueryDecl;
/// use sqlx_query_mapper::types::CollectionClass;
///
/// let decl = QueryDecl::select("SELECT name {%%} FROM users WHERE age > {%1}")
///     .collection(CollectionClass::VecDeque)
///     .capacity(64)
///     .fetch_size(500);
/// assert_eq!(decl.batch_size, 0);
/// ```
#[derive(Debug, Clone)]
pub struct QueryDecl {
    pub kind: QueryKind,
    pub sql: String,
    pub batch_size: i32,
    pub fetch_size: Option<u32>,
    /// Concrete collection to return instead of the declared interface.
    pub collection: Option<CollectionClass>,
    pub capacity: Option<usize>,
    pub factory: Option<Factory>,
    pub scope: Option<Scope>,
}

impl QueryDecl {
    pub fn new(kind: QueryKind, sql: impl Into<String>) -> Self {
        let defaults = Settings::default();
        QueryDecl {
            kind,
            sql: sql.into(),
            batch_size: defaults.batch_size,
            fetch_size: defaults.fetch_size,
            collection: None,
            capacity: None,
            factory: None,
            scope: None,
        }
    }

    pub fn select(sql: impl Into<String>) -> Self {
        Self::new(QueryKind::Select, sql)
    }

    pub fn insert(sql: impl Into<String>) -> Self {
        Self::new(QueryKind::Insert, sql)
    }

    pub fn update(sql: impl Into<String>) -> Self {
        Self::new(QueryKind::Update, sql)
    }

    pub fn delete(sql: impl Into<String>) -> Self {
        Self::new(QueryKind::Delete, sql)
    }

    pub fn call(sql: impl Into<String>) -> Self {
        Self::new(QueryKind::Call, sql)
    }

    /// Applies batch and fetch size defaults from `settings`.
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.batch_size = settings.batch_size;
        self.fetch_size = settings.fetch_size;
        self
    }

    pub fn batch_size(mut self, size: i32) -> Self {
        self.batch_size = size;
        self
    }

    pub fn fetch_size(mut self, rows: u32) -> Self {
        self.fetch_size = Some(rows);
        self
    }

    pub fn collection(mut self, class: CollectionClass) -> Self {
        self.collection = Some(class);
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn factory(mut self, class: &Arc<Class>, method: impl Into<String>) -> Self {
        self.factory = Some(Factory {
            class: class.clone(),
            method: method.into(),
        });
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Lookup state shared by the parameter and result resolvers.
struct Context<'r> {
    registry: &'r Registry,
    scope: Option<&'r Scope>,
    method: &'r str,
}

impl<'r> Context<'r> {
    fn invalid(&self, reason: impl Into<String>) -> Error {
        ValidationError::new(self.method, reason).into()
    }

    /// The mapping a placeholder names, or the default one for `ty` when
    /// it names none.
    fn mapping(&self, name: &str, ty: &Type) -> Result<&'r MappingType> {
        if name == AUTO {
            self.registry
                .mapping_for_type(self.scope, ty)
                .ok_or_else(|| self.invalid(format!("no default mapping type for {ty}")))
        } else {
            self.named(name)
        }
    }

    fn named(&self, name: &str) -> Result<&'r MappingType> {
        self.registry
            .lookup(self.scope, name)
            .ok_or_else(|| self.invalid(format!("unknown mapping type '{name}'")))
    }

    fn has_default_mapping(&self, ty: &Type) -> bool {
        self.registry.mapping_for_type(self.scope, ty).is_some()
    }

    fn check_slots(&self, mapping: &MappingType, slots: usize) -> Result<()> {
        let columns = mapping.kind().columns();
        if columns != slots {
            return Err(self.invalid(format!(
                "mapping type '{}' spans {columns} column(s) but {slots} given",
                mapping.name()
            )));
        }
        Ok(())
    }
}

/// Resolves query declarations against a mapping type registry.
///
/// # Examples
///
/// ```
/// use sqlx_query_mapper::reflect::{MethodInfo, MethodSignature};
/// use sqlx_query_mapper::registry::Registry;
/// use sqlx_query_mapper::resolve::{QueryDecl, Resolver};
/// use sqlx_query_mapper::types::Type;
///
/// let registry = Registry::new();
/// let signature = MethodSignature::new("count_older", Type::I64).param(Type::I32);
/// let info = MethodInfo::reflect(&signature)?;
///
/// let decl = QueryDecl::select("SELECT COUNT(*) {%%} FROM users WHERE age > {%1}");
/// let mapper = Resolver::new(&registry).resolve(&decl, &info)?;
///
/// assert_eq!(mapper.sql(), "SELECT COUNT(*)  FROM users WHERE age > ?");
/// assert_eq!(mapper.parameters()[0].mapping.name(), "int");
/// assert_eq!(mapper.results()[0].mapping.name(), "long");
/// # Ok::<(), sqlx_query_mapper::Error>(())
/// ```
pub struct Resolver<'r> {
    registry: &'r Registry,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Resolver { registry }
    }

    pub fn resolve(&self, decl: &QueryDecl, info: &MethodInfo) -> Result<Mapper> {
        let context = Context {
            registry: self.registry,
            scope: decl.scope.as_ref(),
            method: info.name(),
        };

        let template = Parser::new(&decl.sql)
            .call_statement(decl.kind == QueryKind::Call)
            .parameter_count(info.parameters.len())
            .parse()?
            .combined()
            .map_err(|conflict| context.invalid(conflict.to_string()))?;

        let batch = decl.kind != QueryKind::Select && !info.collection_parameters.is_empty();
        let returns = return_shape(&context, decl, info, batch)?;

        let parameters = template
            .parameters
            .iter()
            .map(|definition| parameter::resolve(&context, decl.kind, batch, info, definition))
            .collect::<Result<Vec<_>>>()?;

        let (results, bean) = result::resolve(&context, decl, &returns, &template.results)?;

        tracing::debug!(
            method = info.name(),
            kind = %decl.kind,
            sql = %template.sql,
            parameters = parameters.len(),
            results = results.len(),
            "resolved query method"
        );

        Ok(Mapper {
            method: info.name().to_owned(),
            kind: decl.kind,
            sql: template.sql,
            parameters,
            results,
            bean,
            returns,
            batch_size: decl.batch_size,
            fetch_size: decl.fetch_size,
            argument_count: info.parameters.len(),
            batch_parameters: if batch {
                info.collection_parameters.iter().map(|i| i - 1).collect()
            } else {
                Vec::new()
            },
        })
    }
}

fn return_shape(
    context: &Context<'_>,
    decl: &QueryDecl,
    info: &MethodInfo,
    batch: bool,
) -> Result<ReturnShape> {
    let returned = &info.return_info;
    let ty = &returned.ty;

    if decl.kind.is_update() || (decl.kind == QueryKind::Call && batch) {
        return match ty {
            Type::Void => Ok(ReturnShape::Void),
            Type::Array(element) if batch && decl.kind.is_update() && **element == Type::I32 => {
                Ok(ReturnShape::Counts)
            }
            ty if !batch && matches!(ty.unboxed(), Type::I32 | Type::I64) => {
                Ok(ReturnShape::Count(ty.clone()))
            }
            ty => Err(context.invalid(format!(
                "{}{} statement cannot return {ty}",
                if batch { "batch " } else { "" },
                decl.kind
            ))),
        };
    }

    if decl.kind == QueryKind::Select && ty.is_void() {
        return Err(context.invalid("select statement must return a value"));
    }
    if decl.kind == QueryKind::Call && returned.is_map() {
        return Err(context.invalid("call statement cannot return a map"));
    }

    Ok(match (&returned.collection, &returned.map_key, &returned.element) {
        (Some(declared), _, Some(element)) => ReturnShape::Collection {
            class: collection_class(context, decl, *declared)?,
            capacity: decl.capacity,
            element: element.clone(),
        },
        (_, Some(key), Some(value)) => ReturnShape::Map {
            key: key.clone(),
            value: value.clone(),
        },
        _ if ty.is_void() => ReturnShape::Void,
        _ => ReturnShape::Single(ty.clone()),
    })
}

/// Picks the concrete collection to fill, validating a requested one.
fn collection_class(
    context: &Context<'_>,
    decl: &QueryDecl,
    declared: CollectionClass,
) -> Result<CollectionClass> {
    let class = match decl.collection {
        None => declared.concrete(),
        Some(class) => {
            if !declared.is_assignable_from(class) {
                return Err(context.invalid(format!("{class} is not a {declared}")));
            }
            if class.is_abstract() {
                return Err(context.invalid(format!("collection class {class} is abstract")));
            }
            class
        }
    };
    if decl.capacity.is_some() && !class.has_capacity_constructor() {
        return Err(context.invalid(format!(
            "collection class {class} cannot be created with a capacity"
        )));
    }
    Ok(class)
}
