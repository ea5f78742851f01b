//! Structural description of method and bean types.
//!
//! Query methods are described with these types instead of runtime
//! reflection: a [`Class`] lists the properties, constructors and static
//! methods a bean exposes, and [`Type`] describes parameter and return
//! shapes, including collections, arrays and maps.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use indexmap::IndexMap;

use crate::value::{Object, Value};

/// The declared type of a method parameter, return value, bean property or
/// constructor parameter.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Char,
    /// Nullable form of a primitive
    Option(Box<Type>),
    String,
    /// Binary large object, always bound as a single value
    Bytes,
    Date,
    Time,
    Timestamp,
    Enum(Arc<EnumType>),
    Object(Arc<Class>),
    Array(Box<Type>),
    Collection(CollectionClass, Box<Type>),
    Map(Box<Type>, Box<Type>),
}

impl Type {
    pub fn option(inner: Type) -> Type {
        Type::Option(Box::new(inner))
    }

    pub fn array(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn list(element: Type) -> Type {
        Type::Collection(CollectionClass::List, Box::new(element))
    }

    pub fn set(element: Type) -> Type {
        Type::Collection(CollectionClass::Set, Box::new(element))
    }

    pub fn collection(class: CollectionClass, element: Type) -> Type {
        Type::Collection(class, Box::new(element))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn object(class: &Arc<Class>) -> Type {
        Type::Object(class.clone())
    }

    /// Primitives can never hold null; reading SQL NULL into one yields zero.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::I8
                | Type::I16
                | Type::I32
                | Type::I64
                | Type::F32
                | Type::F64
                | Type::Char
        )
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// `Vec<u8>`-like arrays are blobs, not expandable arrays.
    pub fn is_blob(&self) -> bool {
        match self {
            Type::Bytes => true,
            Type::Array(element) => **element == Type::I8,
            _ => false,
        }
    }

    /// Single-valued types: everything except beans, containers and `Void`.
    pub fn is_atomic(&self) -> bool {
        match self {
            Type::Void | Type::Object(_) | Type::Collection(..) | Type::Map(..) => false,
            Type::Array(_) => self.is_blob(),
            Type::Option(inner) => inner.is_atomic(),
            _ => true,
        }
    }

    /// Strips one level of `Option`.
    pub fn unboxed(&self) -> &Type {
        match self {
            Type::Option(inner) => inner,
            other => other,
        }
    }

    pub fn as_class(&self) -> Option<&Arc<Class>> {
        match self {
            Type::Object(class) => Some(class),
            _ => None,
        }
    }

    /// Whether a value of type `other` may be stored where `self` is
    /// declared, allowing boxing, unboxing, primitive widening and
    /// subclassing.
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Type::Option(inner), Type::Option(other)) => inner.is_assignable_from(other),
            (Type::Option(inner), other) => inner.is_assignable_from(other),
            (this, Type::Option(other)) if this.is_primitive() => this.is_assignable_from(other),
            (Type::Object(this), Type::Object(other)) => other.is_subclass_of(this),
            (Type::Collection(this, a), Type::Collection(other, b)) => {
                this.is_assignable_from(*other) && a == b
            }
            (Type::Array(a), Type::Array(b)) => a == b,
            (Type::Map(ka, va), Type::Map(kb, vb)) => ka == kb && va == vb,
            (this, other) => widens(other, this),
        }
    }

    /// The value a field of this type holds before anything is assigned.
    pub fn default_value(&self) -> Value {
        match self {
            Type::Bool => Value::Bool(false),
            Type::I8 => Value::I8(0),
            Type::I16 => Value::I16(0),
            Type::I32 => Value::I32(0),
            Type::I64 => Value::I64(0),
            Type::F32 => Value::F32(0.0),
            Type::F64 => Value::F64(0.0),
            Type::Char => Value::Char('\0'),
            _ => Value::Null,
        }
    }
}

/// Widening primitive conversions.
fn widens(from: &Type, to: &Type) -> bool {
    use Type::*;
    matches!(
        (from, to),
        (I8, I16 | I32 | I64 | F32 | F64)
            | (I16, I32 | I64 | F32 | F64)
            | (Char, I32 | I64 | F32 | F64)
            | (I32, I64 | F32 | F64)
            | (I64, F32 | F64)
            | (F32, F64)
    )
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("()"),
            Type::Bool => f.write_str("bool"),
            Type::I8 => f.write_str("i8"),
            Type::I16 => f.write_str("i16"),
            Type::I32 => f.write_str("i32"),
            Type::I64 => f.write_str("i64"),
            Type::F32 => f.write_str("f32"),
            Type::F64 => f.write_str("f64"),
            Type::Char => f.write_str("char"),
            Type::Option(inner) => write!(f, "Option<{inner}>"),
            Type::String => f.write_str("String"),
            Type::Bytes => f.write_str("Bytes"),
            Type::Date => f.write_str("NaiveDate"),
            Type::Time => f.write_str("NaiveTime"),
            Type::Timestamp => f.write_str("NaiveDateTime"),
            Type::Enum(ty) => f.write_str(&ty.name),
            Type::Object(class) => f.write_str(&class.name),
            Type::Array(element) => write!(f, "[{element}]"),
            Type::Collection(class, element) => write!(f, "{class}<{element}>"),
            Type::Map(key, value) => write!(f, "Map<{key}, {value}>"),
        }
    }
}

/// Collection interfaces and the concrete collections that implement them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionClass {
    Collection,
    List,
    Set,
    Queue,
    Vec,
    VecDeque,
    LinkedList,
    HashSet,
}

impl CollectionClass {
    pub fn is_abstract(self) -> bool {
        matches!(
            self,
            CollectionClass::Collection
                | CollectionClass::List
                | CollectionClass::Set
                | CollectionClass::Queue
        )
    }

    fn interfaces(self) -> &'static [CollectionClass] {
        use CollectionClass::*;
        match self {
            Collection => &[],
            List | Set | Queue => &[Collection],
            Vec => &[List, Collection],
            VecDeque | LinkedList => &[List, Queue, Collection],
            HashSet => &[Set, Collection],
        }
    }

    pub fn is_assignable_from(self, other: CollectionClass) -> bool {
        self == other || other.interfaces().contains(&self)
    }

    /// Whether the collection can be created with an initial capacity.
    pub fn has_capacity_constructor(self) -> bool {
        matches!(
            self,
            CollectionClass::Vec | CollectionClass::VecDeque | CollectionClass::HashSet
        )
    }

    pub fn is_set(self) -> bool {
        matches!(self, CollectionClass::Set | CollectionClass::HashSet)
    }

    /// The concrete class used when only an interface is declared.
    pub fn concrete(self) -> CollectionClass {
        match self {
            CollectionClass::Collection | CollectionClass::List => CollectionClass::Vec,
            CollectionClass::Set => CollectionClass::HashSet,
            CollectionClass::Queue => CollectionClass::VecDeque,
            concrete => concrete,
        }
    }
}

impl fmt::Display for CollectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An enumeration whose values are stored by variant name.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Arc<EnumType>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(EnumType {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        })
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variants.iter().any(|v| v == name)
    }
}

/// A named, typed bean property.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub ty: Type,
    pub readable: bool,
    pub writable: bool,
}

pub type ConstructorFn = Arc<dyn Fn(&Arc<Class>, Vec<Value>) -> crate::Result<Object> + Send + Sync>;

pub type StaticMethodFn = Arc<dyn Fn(Vec<Value>) -> crate::Result<Value> + Send + Sync>;

/// A public constructor of a bean class.
#[derive(Clone)]
pub struct Constructor {
    pub params: Vec<Type>,
    body: ConstructorFn,
}

impl Constructor {
    pub fn new(params: Vec<Type>, body: ConstructorFn) -> Self {
        Constructor { params, body }
    }

    pub fn invoke(&self, class: &Arc<Class>, args: Vec<Value>) -> crate::Result<Object> {
        (self.body)(class, args)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A method declared on a class that can act as a bean factory.
#[derive(Clone)]
pub struct StaticMethod {
    pub name: String,
    pub params: Vec<Type>,
    pub returns: Type,
    pub is_public: bool,
    pub is_static: bool,
    body: StaticMethodFn,
}

impl StaticMethod {
    pub fn new(
        name: impl Into<String>,
        params: Vec<Type>,
        returns: Type,
        body: StaticMethodFn,
    ) -> Self {
        StaticMethod {
            name: name.into(),
            params,
            returns,
            is_public: true,
            is_static: true,
            body,
        }
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn instance(mut self) -> Self {
        self.is_static = false;
        self
    }

    pub fn invoke(&self, args: Vec<Value>) -> crate::Result<Value> {
        (self.body)(args)
    }
}

impl fmt::Debug for StaticMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticMethod")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("is_public", &self.is_public)
            .field("is_static", &self.is_static)
            .finish_non_exhaustive()
    }
}

/// Describes a bean: its properties, constructors and static methods.
///
/// Classes compare and hash by name.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub supertypes: Vec<String>,
    pub is_abstract: bool,
    pub properties: IndexMap<String, Property>,
    pub constructors: Vec<Constructor>,
    pub methods: Vec<StaticMethod>,
}

impl Class {
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder {
            class: Class {
                name: name.into(),
                supertypes: Vec::new(),
                is_abstract: false,
                properties: IndexMap::new(),
                constructors: Vec::new(),
                methods: Vec::new(),
            },
            pending: Vec::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn getter(&self, name: &str) -> Option<&Property> {
        self.property(name).filter(|p| p.readable)
    }

    pub fn setter(&self, name: &str) -> Option<&Property> {
        self.property(name).filter(|p| p.writable)
    }

    pub fn is_subclass_of(&self, other: &Class) -> bool {
        self.name == other.name || self.supertypes.iter().any(|s| *s == other.name)
    }

    /// Methods named `name`, paired with their index in `methods`.
    pub fn static_methods<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (usize, &'a StaticMethod)> {
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.name == name)
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Builds a [`Class`].
///
/// ```
/// use sqlx_query_mapper::types::{Class, Type};
///
/// let user = Class::builder("User")
///     .property("id", Type::I64)
///     .property("name", Type::String)
///     .default_constructor()
///     .constructor(["id", "name"])
///     .build();
///
/// assert!(user.setter("name").is_some());
/// assert_eq!(user.constructors.len(), 2);
/// ```
pub struct ClassBuilder {
    class: Class,
    pending: Vec<Vec<String>>,
}

impl ClassBuilder {
    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.class.supertypes.push(supertype.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.class.is_abstract = true;
        self
    }

    /// A readable and writable property.
    pub fn property(self, name: impl Into<String>, ty: Type) -> Self {
        self.with_property(name.into(), ty, true, true)
    }

    pub fn read_only(self, name: impl Into<String>, ty: Type) -> Self {
        self.with_property(name.into(), ty, true, false)
    }

    pub fn write_only(self, name: impl Into<String>, ty: Type) -> Self {
        self.with_property(name.into(), ty, false, true)
    }

    fn with_property(mut self, name: String, ty: Type, readable: bool, writable: bool) -> Self {
        self.class.properties.insert(
            name.clone(),
            Property {
                name,
                ty,
                readable,
                writable,
            },
        );
        self
    }

    pub fn default_constructor(self) -> Self {
        self.constructor(std::iter::empty::<&str>())
    }

    /// A constructor assigning its arguments to the named properties, in order.
    pub fn constructor<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending
            .push(properties.into_iter().map(Into::into).collect());
        self
    }

    pub fn constructor_with(mut self, params: Vec<Type>, body: ConstructorFn) -> Self {
        self.class.constructors.push(Constructor::new(params, body));
        self
    }

    pub fn static_method(mut self, method: StaticMethod) -> Self {
        self.class.methods.push(method);
        self
    }

    /// # Panics
    ///
    /// Panics if a property-assigning constructor names an undeclared
    /// property.
    pub fn build(mut self) -> Arc<Class> {
        for names in std::mem::take(&mut self.pending) {
            let params = names
                .iter()
                .map(|name| match self.class.properties.get(name) {
                    Some(property) => property.ty.clone(),
                    None => panic!(
                        "constructor of {} assigns undeclared property '{name}'",
                        self.class.name
                    ),
                })
                .collect();
            let body: ConstructorFn = Arc::new(
                move |class: &Arc<Class>, args: Vec<Value>| -> crate::Result<Object> {
                    let mut object = Object::new(class);
                    for (name, value) in names.iter().zip(args) {
                        object.set(name, value)?;
                    }
                    Ok(object)
                },
            );
            self.class.constructors.push(Constructor::new(params, body));
        }
        Arc::new(self.class)
    }
}
