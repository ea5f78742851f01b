use std::sync::Arc;

use indexmap::IndexMap;

use super::execute;
use crate::{
    driver::SqlType,
    error::Error,
    mapper::Mapper,
    reflect::{MethodInfo, MethodSignature},
    registry::{Registry, Scope, TypeAdapter},
    resolve::{QueryDecl, Resolver},
    testing::{user_class, Event, Failure, MockSource},
    types::{Class, EnumType, Type},
    value::{Object, Value},
    Result,
};

fn resolve_with(registry: &Registry, decl: QueryDecl, signature: MethodSignature) -> Mapper {
    let info = MethodInfo::reflect(&signature).unwrap();
    Resolver::new(registry).resolve(&decl, &info).unwrap()
}

fn resolve(decl: QueryDecl, signature: MethodSignature) -> Mapper {
    resolve_with(&Registry::new(), decl, signature)
}

fn user(id: i64, name: Option<&str>) -> Value {
    let object = Object::new(&user_class())
        .with("id", id)
        .and_then(|o| o.with("name", name))
        .unwrap();
    Value::Object(object)
}

#[test]
fn test_select_atomic_value() {
    let mapper = resolve(
        QueryDecl::select("SELECT name {%%} FROM users WHERE id = {%1}"),
        MethodSignature::new("name_of", Type::String).param(Type::I64),
    );
    let source = MockSource::new().rows(vec![vec![Value::from("ann")]]);

    let value = execute(&mapper, &source, &[Value::I64(7)]).unwrap();

    assert_eq!(value, Value::from("ann"));
    assert_eq!(
        source.events(),
        vec![
            Event::Acquire,
            Event::Prepare("SELECT name  FROM users WHERE id = ?".into()),
            Event::Bind(1, Value::I64(7)),
            Event::ExecuteQuery,
            Event::CloseRows,
            Event::CloseStatement,
            Event::Release,
        ]
    );
}

#[test]
fn test_select_atomic_cardinality() {
    let mapper = resolve(
        QueryDecl::select("SELECT age {%%} FROM users WHERE id = {%1}"),
        MethodSignature::new("age_of", Type::I32).param(Type::I64),
    );

    let empty = MockSource::new();
    let err = execute(&mapper, &empty, &[Value::I64(1)]).unwrap_err();
    assert!(matches!(err, Error::EmptyResult));
    assert_eq!(empty.events().last(), Some(&Event::Release));

    let many = MockSource::new().rows(vec![vec![Value::I32(1)], vec![Value::I32(2)]]);
    let err = execute(&mapper, &many, &[Value::I64(1)]).unwrap_err();
    assert!(matches!(err, Error::MoreThanOneResult));
    assert_eq!(many.count(|e| *e == Event::CloseStatement), 1);
    assert_eq!(many.count(|e| *e == Event::Release), 1);
}

#[test]
fn test_select_null_into_primitive_and_option() {
    let primitive = resolve(
        QueryDecl::select("SELECT age {%%} FROM users"),
        MethodSignature::new("age", Type::I32),
    );
    let optional = resolve(
        QueryDecl::select("SELECT age {%%} FROM users"),
        MethodSignature::new("age", Type::option(Type::I32)),
    );
    let source = MockSource::new().rows(vec![vec![Value::Null]]);

    assert_eq!(execute(&primitive, &source, &[]).unwrap(), Value::I32(0));
    assert_eq!(execute(&optional, &source, &[]).unwrap(), Value::Null);
}

#[test]
fn test_select_bean_with_setters() {
    let class = user_class();
    let mapper = resolve(
        QueryDecl::select("SELECT id {%%.id}, name {%%.name}, age {%%.age} FROM users WHERE id = {%1}"),
        MethodSignature::new("find", Type::object(&class)).param(Type::I64),
    );
    let source = MockSource::new().rows(vec![vec![Value::I64(3), Value::from("bob"), Value::Null]]);

    let value = execute(&mapper, &source, &[Value::I64(3)]).unwrap();

    let object = value.as_object().unwrap();
    assert_eq!(object.get("id"), Some(&Value::I64(3)));
    assert_eq!(object.get("name"), Some(&Value::from("bob")));
    assert_eq!(object.get("age"), Some(&Value::Null));
}

#[test]
fn test_select_bean_without_rows_is_null() {
    let class = user_class();
    let mapper = resolve(
        QueryDecl::select("SELECT id {%%.id} FROM users WHERE id = {%1}"),
        MethodSignature::new("find", Type::object(&class)).param(Type::I64),
    );
    let source = MockSource::new();
    assert_eq!(execute(&mapper, &source, &[Value::I64(3)]).unwrap(), Value::Null);
}

#[test]
fn test_select_beans_through_constructor() {
    let class = user_class();
    let mapper = resolve(
        QueryDecl::select("SELECT id {%%.$1}, name {%%.$2}, age {%%.age} FROM users"),
        MethodSignature::new("all", Type::list(Type::object(&class))),
    );
    let source = MockSource::new().rows(vec![
        vec![Value::I64(1), Value::from("ann"), Value::I32(30)],
        vec![Value::I64(2), Value::from("bob"), Value::Null],
    ]);

    let value = execute(&mapper, &source, &[]).unwrap();

    let Value::List(users) = value else {
        panic!("expected a list, got {value:?}");
    };
    assert_eq!(users.len(), 2);
    let first = users[0].as_object().unwrap();
    assert_eq!(first.get("name"), Some(&Value::from("ann")));
    assert_eq!(first.get("age"), Some(&Value::I32(30)));
    assert_eq!(users[1].as_object().unwrap().get("id"), Some(&Value::I64(2)));
}

#[test]
fn test_select_map_later_keys_overwrite() {
    let mapper = resolve(
        QueryDecl::select("SELECT id {%%*}, name {%%} FROM users"),
        MethodSignature::new("names", Type::map(Type::I64, Type::String)),
    );
    let source = MockSource::new().rows(vec![
        vec![Value::I64(1), Value::from("a")],
        vec![Value::I64(2), Value::from("b")],
        vec![Value::I64(1), Value::from("c")],
    ]);

    let value = execute(&mapper, &source, &[]).unwrap();

    let mut expected = IndexMap::new();
    expected.insert(Value::I64(1), Value::from("c"));
    expected.insert(Value::I64(2), Value::from("b"));
    assert_eq!(value, Value::Map(expected));
}

#[test]
fn test_select_map_key_and_value_share_column() {
    let mapper = resolve(
        QueryDecl::select("SELECT name {%%*, %%} FROM users"),
        MethodSignature::new("names", Type::map(Type::String, Type::String)),
    );
    let source = MockSource::new().rows(vec![vec![Value::from("x")]]);

    let Value::Map(map) = execute(&mapper, &source, &[]).unwrap() else {
        panic!("expected a map");
    };
    assert_eq!(map.get(&Value::from("x")), Some(&Value::from("x")));
}

#[test]
fn test_select_set_collection() {
    let mapper = resolve(
        QueryDecl::select("SELECT name {%%} FROM users"),
        MethodSignature::new("names", Type::set(Type::String)),
    );
    let source = MockSource::new().rows(vec![
        vec![Value::from("a")],
        vec![Value::from("a")],
        vec![Value::from("b")],
    ]);

    let Value::Set(names) = execute(&mapper, &source, &[]).unwrap() else {
        panic!("expected a set");
    };
    assert_eq!(names.len(), 2);
}

#[test]
fn test_in_clause_expansion_renumbers_slots() {
    let mapper = resolve(
        QueryDecl::select("SELECT name {%%} FROM users WHERE id IN ({%2}) AND age > {%1}"),
        MethodSignature::new("names", Type::list(Type::String))
            .param(Type::I32)
            .param(Type::array(Type::I64)),
    );
    let source = MockSource::new();
    let ids = Value::Array(vec![Value::I64(4), Value::I64(5), Value::I64(6)]);

    execute(&mapper, &source, &[Value::I32(18), ids]).unwrap();

    let events = source.events();
    assert_eq!(
        events[1],
        Event::Prepare("SELECT name  FROM users WHERE id IN (?,?,?) AND age > ?".into())
    );
    assert_eq!(
        events[2..6],
        [
            Event::Bind(1, Value::I64(4)),
            Event::Bind(2, Value::I64(5)),
            Event::Bind(3, Value::I64(6)),
            Event::Bind(4, Value::I32(18)),
        ]
    );
}

#[test]
fn test_in_clause_collection_with_separator_and_getters() {
    let class = user_class();
    let mapper = resolve(
        QueryDecl::select("SELECT age {%%} FROM users WHERE id IN ({%1.id#, #})"),
        MethodSignature::new("ages", Type::list(Type::I32))
            .param(Type::list(Type::object(&class))),
    );
    let source = MockSource::new();
    let users = Value::List(vec![user(1, None), user(2, None)]);

    execute(&mapper, &source, &[users]).unwrap();

    let events = source.events();
    assert_eq!(
        events[1],
        Event::Prepare("SELECT age  FROM users WHERE id IN (?, ?)".into())
    );
    assert_eq!(events[2], Event::Bind(1, Value::I64(1)));
    assert_eq!(events[3], Event::Bind(2, Value::I64(2)));
}

#[test]
fn test_empty_in_clause_binds_null() {
    let mapper = resolve(
        QueryDecl::select("SELECT name {%%} FROM users WHERE id IN ({%1})"),
        MethodSignature::new("names", Type::list(Type::String)).param(Type::list(Type::I64)),
    );
    let source = MockSource::new();

    let value = execute(&mapper, &source, &[Value::List(Vec::new())]).unwrap();

    assert_eq!(value, Value::List(Vec::new()));
    let events = source.events();
    assert_eq!(
        events[1],
        Event::Prepare("SELECT name  FROM users WHERE id IN (?)".into())
    );
    assert_eq!(events[2], Event::BindNull(1, SqlType::BigInt));
}

#[test]
fn test_fetch_size_hint() {
    let mapper = resolve(
        QueryDecl::select("SELECT name {%%} FROM users").fetch_size(250),
        MethodSignature::new("names", Type::list(Type::String)),
    );
    let source = MockSource::new();
    execute(&mapper, &source, &[]).unwrap();
    assert_eq!(source.count(|e| *e == Event::FetchSize(250)), 1);
}

#[test]
fn test_update_returns_count() {
    let mapper = resolve(
        QueryDecl::update("UPDATE users SET name = {%2} WHERE id = {%1}"),
        MethodSignature::new("rename", Type::I32)
            .param(Type::I64)
            .param(Type::String),
    );
    let source = MockSource::new().update_count(3);

    let value = execute(&mapper, &source, &[Value::I64(1), Value::from("eve")]).unwrap();

    assert_eq!(value, Value::I32(3));
    assert_eq!(
        source.events(),
        vec![
            Event::Acquire,
            Event::Prepare("UPDATE users SET name = ? WHERE id = ?".into()),
            Event::Bind(1, Value::from("eve")),
            Event::Bind(2, Value::I64(1)),
            Event::ExecuteUpdate,
            Event::CloseStatement,
            Event::Release,
        ]
    );
}

#[test]
fn test_insert_bean_getters_bind_null() {
    let class = user_class();
    let mapper = resolve(
        QueryDecl::insert("INSERT INTO users (id, name) VALUES ({%1.id}, {%1.name})"),
        MethodSignature::new("save", Type::Void).param(Type::object(&class)),
    );
    let source = MockSource::new();

    let value = execute(&mapper, &source, &[user(9, None)]).unwrap();

    assert_eq!(value, Value::Null);
    let events = source.events();
    assert_eq!(events[2], Event::Bind(1, Value::I64(9)));
    assert_eq!(events[3], Event::BindNull(2, SqlType::VarChar));
}

#[test]
fn test_batch_insert_flushes_by_size() {
    let class = user_class();
    let mapper = resolve(
        QueryDecl::insert("INSERT INTO users (id, name) VALUES ({%1.id}, {%1.name})").batch_size(2),
        MethodSignature::new("save_all", Type::array(Type::I32))
            .param(Type::list(Type::object(&class))),
    );
    let source = MockSource::new();
    let users = Value::List(vec![
        user(1, Some("a")),
        user(2, Some("b")),
        user(3, Some("c")),
    ]);

    let value = execute(&mapper, &source, &[users]).unwrap();

    assert_eq!(
        value,
        Value::Array(vec![Value::I32(1), Value::I32(1), Value::I32(1)])
    );
    assert_eq!(source.count(|e| *e == Event::AddBatch), 3);
    assert_eq!(
        source.count(|e| matches!(e, Event::ExecuteBatch(_))),
        2
    );
    assert!(source.events().contains(&Event::ExecuteBatch(2)));
    assert!(source.events().contains(&Event::ExecuteBatch(1)));
    assert_eq!(source.count(|e| *e == Event::ExecuteUpdate), 0);
}

#[test]
fn test_batch_without_size_executes_each_row() {
    let mapper = resolve(
        QueryDecl::delete("DELETE FROM users WHERE id = {%1} AND name = {%2}"),
        MethodSignature::new("remove", Type::Void)
            .param(Type::list(Type::I64))
            .param(Type::list(Type::String)),
    );
    let source = MockSource::new();
    let ids = Value::from_iter([1i64, 2]);
    let names = Value::from_iter(["a", "b"]);

    execute(&mapper, &source, &[ids, names]).unwrap();

    assert_eq!(source.count(|e| *e == Event::ExecuteUpdate), 2);
    assert_eq!(source.count(|e| matches!(e, Event::Prepare(_))), 1);
    let events = source.events();
    assert_eq!(events[2], Event::Bind(1, Value::I64(1)));
    assert_eq!(events[3], Event::Bind(2, Value::from("a")));
    assert_eq!(events[5], Event::Bind(1, Value::I64(2)));
    assert_eq!(events[6], Event::Bind(2, Value::from("b")));
}

#[test]
fn test_empty_batch_touches_nothing() {
    let mapper = resolve(
        QueryDecl::insert("INSERT INTO tags VALUES ({%1})").batch_size(10),
        MethodSignature::new("tag", Type::array(Type::I32)).param(Type::list(Type::String)),
    );
    let source = MockSource::new();

    let value = execute(&mapper, &source, &[Value::List(Vec::new())]).unwrap();

    assert_eq!(value, Value::Array(Vec::new()));
    assert!(source.events().is_empty());
}

#[test]
fn test_batch_collections_of_different_size() {
    let mapper = resolve(
        QueryDecl::insert("INSERT INTO users VALUES ({%1}, {%2})"),
        MethodSignature::new("save", Type::Void)
            .param(Type::list(Type::I64))
            .param(Type::list(Type::String)),
    );
    let source = MockSource::new();

    let err = execute(
        &mapper,
        &source,
        &[Value::from_iter([1i64, 2]), Value::from_iter(["a"])],
    )
    .unwrap_err();

    assert!(matches!(err, Error::CollectionsDifferentSize));
    assert_eq!(err.to_string(), "collections have different size");
    assert!(source.events().is_empty());
}

#[test]
fn test_call_reads_output_parameter() {
    let mapper = resolve(
        QueryDecl::call("call next_id({%1}, {long %%})"),
        MethodSignature::new("next_id", Type::I64).param(Type::String),
    );
    let source = MockSource::new().out(2, 42i64);

    let value = execute(&mapper, &source, &[Value::from("users")]).unwrap();

    assert_eq!(value, Value::I64(42));
    assert_eq!(
        source.events(),
        vec![
            Event::Acquire,
            Event::PrepareCall("call next_id(?, ?)".into()),
            Event::Bind(1, Value::from("users")),
            Event::RegisterOut(2, SqlType::BigInt),
            Event::ExecuteUpdate,
            Event::CloseStatement,
            Event::Release,
        ]
    );
}

#[test]
fn test_call_batch_flushes_by_size() {
    let mapper = resolve(
        QueryDecl::call("call tag({%1})").batch_size(2),
        MethodSignature::new("tag_all", Type::Void).param(Type::list(Type::String)),
    );
    let source = MockSource::new();

    let value = execute(&mapper, &source, &[Value::from_iter(["a", "b", "c"])]).unwrap();

    assert_eq!(value, Value::Null);
    assert_eq!(
        source.events(),
        vec![
            Event::Acquire,
            Event::PrepareCall("call tag(?)".into()),
            Event::Bind(1, Value::from("a")),
            Event::AddBatch,
            Event::Bind(1, Value::from("b")),
            Event::AddBatch,
            Event::ExecuteBatch(2),
            Event::Bind(1, Value::from("c")),
            Event::AddBatch,
            Event::ExecuteBatch(1),
            Event::CloseStatement,
            Event::Release,
        ]
    );
}

#[test]
fn test_call_batch_without_size_executes_each_row() {
    let mapper = resolve(
        QueryDecl::call("call move_user({%1}, {%2})"),
        MethodSignature::new("move_all", Type::Void)
            .param(Type::list(Type::I64))
            .param(Type::I32),
    );
    let source = MockSource::new();

    execute(&mapper, &source, &[Value::from_iter([1i64, 2]), Value::I32(4)]).unwrap();

    assert_eq!(
        source.events(),
        vec![
            Event::Acquire,
            Event::PrepareCall("call move_user(?, ?)".into()),
            Event::Bind(1, Value::I64(1)),
            Event::Bind(2, Value::I32(4)),
            Event::ExecuteUpdate,
            Event::Bind(1, Value::I64(2)),
            Event::Bind(2, Value::I32(4)),
            Event::ExecuteUpdate,
            Event::CloseStatement,
            Event::Release,
        ]
    );
}

#[test]
fn test_call_in_out_parameter() {
    let mapper = resolve(
        QueryDecl::call("call bump({%1, int %%})"),
        MethodSignature::new("bump", Type::option(Type::I32)).param(Type::I32),
    );

    let source = MockSource::new().out(1, 6);
    assert_eq!(execute(&mapper, &source, &[Value::I32(5)]).unwrap(), Value::I32(6));
    let events = source.events();
    assert_eq!(events[2], Event::Bind(1, Value::I32(5)));
    assert_eq!(events[3], Event::RegisterOut(1, SqlType::Integer));

    let null = MockSource::new();
    assert_eq!(execute(&mapper, &null, &[Value::I32(5)]).unwrap(), Value::Null);
}

#[test]
fn test_call_bean_from_output_parameters() {
    let class = user_class();
    let mapper = resolve(
        QueryDecl::call("call load_user({%1}, {%%.$1}, {%%.$2})"),
        MethodSignature::new("load", Type::list(Type::object(&class))).param(Type::I64),
    );
    let source = MockSource::new().out(2, 5i64).out(3, "zoe");

    let value = execute(&mapper, &source, &[Value::I64(5)]).unwrap();

    let Value::List(users) = value else {
        panic!("expected a one-element list");
    };
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].as_object().unwrap().get("name"), Some(&Value::from("zoe")));
}

#[test]
fn test_prepare_failure_still_releases() {
    let mapper = resolve(
        QueryDecl::delete("DELETE FROM users WHERE id = {%1}"),
        MethodSignature::new("remove", Type::Void).param(Type::I64),
    );
    let source = MockSource::new().fail(Failure::Prepare);

    let err = execute(&mapper, &source, &[Value::I64(1)]).unwrap_err();

    assert!(matches!(err, Error::Driver(_)));
    assert_eq!(
        source.events(),
        vec![
            Event::Acquire,
            Event::Prepare("DELETE FROM users WHERE id = ?".into()),
            Event::Release,
        ]
    );
}

#[test]
fn test_primary_error_wins_over_cleanup_errors() {
    let mapper = resolve(
        QueryDecl::delete("DELETE FROM users WHERE id = {%1}"),
        MethodSignature::new("remove", Type::Void).param(Type::I64),
    );
    let source = MockSource::new()
        .fail(Failure::Execute)
        .fail(Failure::Close)
        .fail(Failure::Release);

    let err = execute(&mapper, &source, &[Value::I64(1)]).unwrap_err();

    assert_eq!(err.to_string(), "Driver error: injected Execute failure");
    assert_eq!(source.count(|e| *e == Event::CloseStatement), 1);
    assert_eq!(source.count(|e| *e == Event::Release), 1);
}

#[test]
fn test_release_failure_after_success_is_reported() {
    let mapper = resolve(
        QueryDecl::delete("DELETE FROM users WHERE id = {%1}"),
        MethodSignature::new("remove", Type::Void).param(Type::I64),
    );
    let source = MockSource::new().fail(Failure::Release);

    let err = execute(&mapper, &source, &[Value::I64(1)]).unwrap_err();
    assert_eq!(err.to_string(), "Driver error: injected Release failure");
}

#[test]
fn test_enum_read_by_name() {
    let color = EnumType::new("Color", ["Red", "Green"]);
    let mapper = resolve(
        QueryDecl::select("SELECT color {%%} FROM items WHERE id = {%1}"),
        MethodSignature::new("color", Type::Enum(color.clone())).param(Type::I64),
    );
    let source = MockSource::new().rows(vec![vec![Value::from("Green")]]);

    let value = execute(&mapper, &source, &[Value::I64(1)]).unwrap();
    assert_eq!(value, Value::enum_value(&color, "Green"));
}

#[derive(Debug)]
struct PointAdapter(Arc<Class>);

impl TypeAdapter for PointAdapter {
    fn value_types(&self) -> Vec<Type> {
        vec![Type::object(&self.0)]
    }

    fn sql_types(&self) -> Vec<SqlType> {
        vec![SqlType::Integer, SqlType::Integer]
    }

    fn to_sql(&self, value: &Value) -> Result<Vec<Value>> {
        let object = match value {
            Value::Object(object) => object,
            Value::Null => return Err(Error::NullNotAllowed("point".into())),
            other => return Err(Error::Driver(format!("not a point: {other}"))),
        };
        Ok(vec![
            object.get("x").cloned().unwrap_or_default(),
            object.get("y").cloned().unwrap_or_default(),
        ])
    }

    fn from_sql(&self, columns: Vec<Value>) -> Result<Value> {
        let mut columns = columns.into_iter();
        let point = Object::new(&self.0)
            .with("x", columns.next().unwrap_or_default())?
            .with("y", columns.next().unwrap_or_default())?;
        Ok(Value::Object(point))
    }
}

fn point_registry() -> (Registry, Arc<Class>) {
    let point = Class::builder("Point")
        .property("x", Type::I32)
        .property("y", Type::I32)
        .build();
    let mut registry = Registry::new();
    registry
        .register(&Scope::new("geo"), "point", Arc::new(PointAdapter(point.clone())))
        .unwrap();
    (registry, point)
}

#[test]
fn test_multi_column_adapter_binds_and_reads() {
    let (registry, point) = point_registry();
    let insert = resolve_with(
        &registry,
        QueryDecl::insert("INSERT INTO shapes (x, y) VALUES ({point %1@1}, {point %1@1})")
            .scope(Scope::new("geo")),
        MethodSignature::new("save", Type::Void).param(Type::object(&point)),
    );
    let select = resolve_with(
        &registry,
        QueryDecl::select("SELECT y {point %%@1[2]}, x {point %%@1[1]} FROM shapes")
            .scope(Scope::new("geo")),
        MethodSignature::new("load", Type::object(&point)),
    );

    let value = Object::new(&point).with("x", 3).and_then(|p| p.with("y", 4)).unwrap();
    let source = MockSource::new();
    execute(&insert, &source, &[Value::Object(value)]).unwrap();
    let events = source.events();
    assert_eq!(events[2], Event::Bind(1, Value::I32(3)));
    assert_eq!(events[3], Event::Bind(2, Value::I32(4)));

    let source = MockSource::new().rows(vec![vec![Value::I32(8), Value::I32(7)]]);
    let loaded = execute(&select, &source, &[]).unwrap();
    let loaded = loaded.as_object().unwrap();
    assert_eq!(loaded.get("x"), Some(&Value::I32(7)));
    assert_eq!(loaded.get("y"), Some(&Value::I32(8)));
}

#[test]
fn test_adapter_rejecting_null() {
    let (registry, point) = point_registry();
    let insert = resolve_with(
        &registry,
        QueryDecl::insert("INSERT INTO shapes (x, y) VALUES ({point %1@1}, {point %1@1})")
            .scope(Scope::new("geo")),
        MethodSignature::new("save", Type::Void).param(Type::object(&point)),
    );
    let source = MockSource::new();

    let err = execute(&insert, &source, &[Value::Null]).unwrap_err();

    assert_eq!(err.to_string(), "null value not allowed for mapper point");
    assert_eq!(source.events().last(), Some(&Event::Release));
}
