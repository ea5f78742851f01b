use std::sync::Arc;

use tracing::debug;

use crate::{
    driver::ConnectionSource,
    engine,
    error::Error,
    mapper::Mapper,
    reflect::{MethodInfo, MethodSignature},
    registry::Registry,
    resolve::{QueryDecl, Resolver},
    value::Value,
};

/// A query method bound to its SQL template.
///
/// `QueryMethod` resolves the declaration once, at bind time, into an
/// immutable [`Mapper`]. Every malformed placeholder, unknown mapping type
/// or unsupported method shape is reported by [`QueryMethod::bind`]; an
/// invocation only fails for runtime reasons such as driver errors or
/// result cardinality.
///
/// The bound method is cheap to clone and can be shared across threads.
///
/// # Examples
///
/// ```rust
/// use sqlx_query_mapper::prelude::*;
///
/// let registry = Registry::new();
/// let find_name = QueryMethod::bind(
///     &QueryDecl::select("SELECT name {%%} FROM users WHERE id = {%1}"),
///     &MethodSignature::new("find_name", Type::String).param(Type::I64),
///     &registry,
/// )?;
///
/// assert_eq!(find_name.mapper().sql(), "SELECT name  FROM users WHERE id = ?");
/// # Ok::<(), sqlx_query_mapper::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct QueryMethod {
    mapper: Arc<Mapper>,
}

impl QueryMethod {
    /// Reflects `signature`, then resolves `decl` against it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the template is malformed and
    /// [`Error::Validation`] when the template does not fit the method.
    pub fn bind(
        decl: &QueryDecl,
        signature: &MethodSignature,
        registry: &Registry,
    ) -> crate::Result<Self> {
        let info = MethodInfo::reflect(signature)?;
        let mapper = Resolver::new(registry).resolve(decl, &info)?;
        debug!(
            method = mapper.method(),
            batch = mapper.is_batch(),
            "bound query method"
        );
        Ok(Self::from_mapper(mapper))
    }

    pub fn from_mapper(mapper: Mapper) -> Self {
        QueryMethod {
            mapper: Arc::new(mapper),
        }
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    /// Runs the method with one argument per declared parameter.
    ///
    /// Acquires a connection from `source` for the duration of the call and
    /// always releases it, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentCount`] when `args` does not match the
    /// method's parameter count, or any error raised while executing.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use sqlx_query_mapper::prelude::*;
    ///
    /// # fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
    /// let source = MySqlSource::connect("mysql://localhost/test")?;
    /// let rename = QueryMethod::bind(
    ///     &QueryDecl::update("UPDATE users SET name = {%2} WHERE id = {%1}"),
    ///     &MethodSignature::new("rename", Type::I32)
    ///         .param(Type::I64)
    ///         .param(Type::String),
    ///     &Registry::new(),
    /// )?;
    ///
    /// let updated = rename.invoke(&source, &[Value::I64(42), Value::from("Jane")])?;
    /// println!("Updated {updated} row(s)");
    /// # Ok(())
    /// # }
    /// ```
    pub fn invoke(&self, source: &dyn ConnectionSource, args: &[Value]) -> crate::Result<Value> {
        let expected = self.mapper.argument_count();
        if args.len() != expected {
            return Err(Error::ArgumentCount {
                expected,
                actual: args.len(),
            });
        }
        engine::execute(&self.mapper, source, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{Event, MockSource},
        types::Type,
    };

    fn count_users() -> QueryMethod {
        QueryMethod::bind(
            &QueryDecl::select("SELECT COUNT(*) {%%} FROM users WHERE age > {%1}"),
            &MethodSignature::new("count_users", Type::I64).param(Type::I32),
            &Registry::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_bind_resolves_template() {
        let method = count_users();
        assert_eq!(method.mapper().method(), "count_users");
        assert_eq!(
            method.mapper().sql(),
            "SELECT COUNT(*)  FROM users WHERE age > ?"
        );
        assert_eq!(method.mapper().argument_count(), 1);
    }

    #[test]
    fn test_bind_reports_bad_templates() {
        let result = QueryMethod::bind(
            &QueryDecl::select("SELECT name {%%} FROM users WHERE id = {%1"),
            &MethodSignature::new("find", Type::String).param(Type::I64),
            &Registry::new(),
        );
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_invoke_checks_argument_count() {
        let source = MockSource::new();
        let err = count_users().invoke(&source, &[]).unwrap_err();

        assert_eq!(err.to_string(), "expected 1 arguments, got 0");
        assert!(source.events().is_empty());
    }

    #[test]
    fn test_invoke_runs_mapper() {
        let source = MockSource::new().rows(vec![vec![Value::I64(12)]]);
        let method = count_users();
        let shared = method.clone();

        assert_eq!(shared.invoke(&source, &[Value::I32(30)]).unwrap(), Value::I64(12));
        assert_eq!(source.count(|e| *e == Event::Bind(1, Value::I32(30))), 1);
        assert_eq!(source.events().last(), Some(&Event::Release));
    }
}
