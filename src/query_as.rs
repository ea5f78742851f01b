use std::hash::Hash;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;

use crate::{
    driver::ConnectionSource,
    error::Error,
    query::QueryMethod,
    value::{Object, Value},
};

/// Conversion from a dynamic [`Value`] into a Rust type.
///
/// Implemented for the scalar types the built-in mapping types produce,
/// for `Option<T>`, `Vec<T>` and `IndexMap<K, V>` containers, and for
/// [`Object`] beans. Implement it for your own types to read bean objects
/// into plain structs.
///
/// # Examples
///
/// ```rust
/// use sqlx_query_mapper::query_as::FromValue;
/// use sqlx_query_mapper::value::Value;
///
/// let ids = Vec::<i64>::from_value(Value::from_iter([1i64, 2, 3]))?;
/// assert_eq!(ids, vec![1, 2, 3]);
///
/// assert_eq!(Option::<i32>::from_value(Value::Null)?, None);
/// # Ok::<(), sqlx_query_mapper::Error>(())
/// ```
pub trait FromValue: Sized {
    fn from_value(value: Value) -> crate::Result<Self>;
}

fn mismatch<T>(expected: &str, value: Value) -> crate::Result<T> {
    Err(Error::conversion(expected, value))
}

impl FromValue for Value {
    fn from_value(value: Value) -> crate::Result<Self> {
        Ok(value)
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Null => Ok(()),
            other => mismatch("()", other),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> crate::Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => mismatch(stringify!($ty), other),
                    }
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    char => Char,
    String => String,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    Object => Object,
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Array(items) | Value::List(items) => {
                items.into_iter().map(T::from_value).collect()
            }
            Value::Set(items) => items.into_iter().map(T::from_value).collect(),
            other => mismatch("Vec", other),
        }
    }
}

impl<K, V> FromValue for IndexMap<K, V>
where
    K: FromValue + Eq + Hash,
    V: FromValue,
{
    fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => mismatch("IndexMap", other),
        }
    }
}

impl QueryMethod {
    /// Like [`QueryMethod::invoke`], converting the result into `R`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use sqlx_query_mapper::prelude::*;
    ///
    /// # fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
    /// let source = MySqlSource::connect("mysql://localhost/test")?;
    /// let names = QueryMethod::bind(
    ///     &QueryDecl::select("SELECT name {%%} FROM users WHERE id IN ({%1})"),
    ///     &MethodSignature::new("names", Type::list(Type::String))
    ///         .param(Type::array(Type::I64)),
    ///     &Registry::new(),
    /// )?;
    ///
    /// let ids = Value::Array(vec![Value::I64(1), Value::I64(2)]);
    /// let names: Vec<String> = names.invoke_as(&source, &[ids])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn invoke_as<R: FromValue>(
        &self,
        source: &dyn ConnectionSource,
        args: &[Value],
    ) -> crate::Result<R> {
        R::from_value(self.invoke(source, args)?)
    }
}
