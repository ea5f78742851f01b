//! Dynamic values passed to and returned from query methods.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::{IndexMap, IndexSet};

use crate::{
    error::Error,
    types::{Class, EnumType, Type},
    Result,
};

/// A runtime value.
///
/// Floating point values compare and hash by bit pattern so that any value
/// can key a map.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Enum(EnumValue),
    Object(Object),
    Array(Vec<Value>),
    List(Vec<Value>),
    Set(IndexSet<Value>),
    Map(IndexMap<Value, Value>),
}

/// One variant of an [`EnumType`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub ty: Arc<EnumType>,
    pub name: String,
}

/// An instance of a bean [`Class`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    class: Arc<Class>,
    fields: IndexMap<String, Value>,
}

impl Object {
    /// Creates an instance with every property at its default value.
    pub fn new(class: &Arc<Class>) -> Self {
        let fields = class
            .properties
            .values()
            .map(|p| (p.name.clone(), p.ty.default_value()))
            .collect();
        Object {
            class: class.clone(),
            fields,
        }
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::conversion(
                format!("property of {}", self.class.name),
                name,
            )),
        }
    }

    /// Builder-style [`Object::set`] for assembling arguments.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value.into())?;
        Ok(self)
    }
}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class.name.hash(state);
        for value in self.fields.values() {
            value.hash(state);
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Elements of an array, list or set argument.
    pub fn elements(&self) -> Option<Vec<&Value>> {
        match self {
            Value::Array(items) | Value::List(items) => Some(items.iter().collect()),
            Value::Set(items) => Some(items.iter().collect()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn enum_value(ty: &Arc<EnumType>, name: impl Into<String>) -> Value {
        Value::Enum(EnumValue {
            ty: ty.clone(),
            name: name.into(),
        })
    }

    fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Value::Bool(v) => v as i64,
            Value::I8(v) => v as i64,
            Value::I16(v) => v as i64,
            Value::I32(v) => v as i64,
            Value::I64(v) => v,
            _ => return None,
        })
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Converts the value to `target`, the way a driver value is converted
    /// into a parameter slot or a result field.
    ///
    /// Null becomes the zero value for primitives and stays null otherwise.
    pub fn coerce(self, target: &Type) -> Result<Value> {
        if self.is_null() {
            return Ok(target.default_value());
        }
        if let Type::Option(inner) = target {
            return self.coerce(inner);
        }
        let converted = match (target, &self) {
            (Type::Bool, Value::Bool(_)) => Some(self.clone()),
            (Type::Bool, _) => self.as_i64().map(|v| Value::Bool(v != 0)),
            (Type::I8, _) => self.as_i64().and_then(|v| i8::try_from(v).ok()).map(Value::I8),
            (Type::I16, _) => self
                .as_i64()
                .and_then(|v| i16::try_from(v).ok())
                .map(Value::I16),
            (Type::I32, _) => self
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::I32),
            (Type::I64, _) => self.as_i64().map(Value::I64),
            (Type::F32, _) => self.as_f64().map(|v| Value::F32(v as f32)),
            (Type::F64, _) => self.as_f64().map(Value::F64),
            (Type::Char, Value::Char(_)) => Some(self.clone()),
            (Type::Char, Value::String(s)) => s.chars().next().map(Value::Char),
            (Type::String, Value::String(_)) => Some(self.clone()),
            (Type::String, Value::Char(c)) => Some(Value::String(c.to_string())),
            (Type::String, Value::Enum(e)) => Some(Value::String(e.name.clone())),
            (Type::Enum(ty), Value::String(name)) if ty.has_variant(name) => {
                Some(Value::enum_value(ty, name.clone()))
            }
            (Type::Enum(ty), Value::Enum(e)) if e.ty == *ty => Some(self.clone()),
            (Type::Date, Value::Date(_)) => Some(self.clone()),
            (Type::Date, Value::Timestamp(ts)) => Some(Value::Date(ts.date())),
            (Type::Time, Value::Time(_)) => Some(self.clone()),
            (Type::Time, Value::Timestamp(ts)) => Some(Value::Time(ts.time())),
            (Type::Timestamp, Value::Timestamp(_)) => Some(self.clone()),
            (Type::Timestamp, Value::Date(d)) => d.and_hms_opt(0, 0, 0).map(Value::Timestamp),
            (Type::Bytes, Value::Bytes(_)) => Some(self.clone()),
            (Type::Array(element), Value::Bytes(_)) if **element == Type::I8 => {
                Some(self.clone())
            }
            (Type::Object(class), Value::Object(object))
                if object.class().is_subclass_of(class) =>
            {
                Some(self.clone())
            }
            (Type::Array(_), Value::Array(_))
            | (Type::Collection(..), Value::List(_) | Value::Set(_))
            | (Type::Map(..), Value::Map(_)) => Some(self.clone()),
            _ => None,
        };
        converted.ok_or_else(|| Error::conversion(target, self))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (F32(a), F32(b)) => a.to_bits() == b.to_bits(),
            (F64(a), F64(b)) => a.to_bits() == b.to_bits(),
            (Char(a), Char(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Array(a), Array(b)) | (List(a), List(b)) => a == b,
            (Set(a), Set(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::I8(v) => v.hash(state),
            Value::I16(v) => v.hash(state),
            Value::I32(v) => v.hash(state),
            Value::I64(v) => v.hash(state),
            Value::F32(v) => v.to_bits().hash(state),
            Value::F64(v) => v.to_bits().hash(state),
            Value::Char(v) => v.hash(state),
            Value::String(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Time(v) => v.hash(state),
            Value::Timestamp(v) => v.hash(state),
            Value::Enum(v) => v.hash(state),
            Value::Object(v) => v.hash(state),
            Value::Array(v) | Value::List(v) => v.hash(state),
            // Set and map equality ignores order, so only the size is hashed.
            Value::Set(v) => v.len().hash(state),
            Value::Map(v) => v.len().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::String(s) => write!(f, "'{s}'"),
            Value::Enum(e) => f.write_str(&e.name),
            other => write!(f, "{other:?}"),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_from! {
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

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    /// Collects into a [`Value::List`].
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::List(iter.into_iter().map(Into::into).collect())
    }
}
