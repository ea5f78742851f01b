//! Scripted in-memory driver recording every call the engine makes.

use std::{cell::RefCell, collections::HashMap, sync::Arc};

use crate::{
    driver::{CallableStatement, Connection, ConnectionSource, Rows, SqlType, Statement},
    error::Error,
    types::{Class, Type},
    value::Value,
    Result,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Acquire,
    Prepare(String),
    PrepareCall(String),
    FetchSize(u32),
    Bind(usize, Value),
    BindNull(usize, SqlType),
    ExecuteQuery,
    ExecuteUpdate,
    AddBatch,
    ExecuteBatch(usize),
    RegisterOut(usize, SqlType),
    CloseRows,
    CloseStatement,
    Release,
}

/// Where an injected driver failure happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Prepare,
    Execute,
    Close,
    Release,
}

#[derive(Debug, Default)]
pub struct MockSource {
    events: RefCell<Vec<Event>>,
    rows: Vec<Vec<Value>>,
    outs: HashMap<usize, Value>,
    update_count: u64,
    failures: Vec<Failure>,
}

impl MockSource {
    pub fn new() -> Self {
        MockSource {
            update_count: 1,
            ..Default::default()
        }
    }

    /// Rows returned by every query; `Value::Null` cells read as SQL NULL.
    pub fn rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn out(mut self, index: usize, value: impl Into<Value>) -> Self {
        self.outs.insert(index, value.into());
        self
    }

    pub fn update_count(mut self, count: u64) -> Self {
        self.update_count = count;
        self
    }

    pub fn fail(mut self, failure: Failure) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| matches(e)).count()
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    fn check(&self, failure: Failure) -> Result<()> {
        if self.failures.contains(&failure) {
            Err(Error::Driver(format!("injected {failure:?} failure")))
        } else {
            Ok(())
        }
    }
}

/// Raw values the mock reports for SQL NULL, like a real driver would.
fn raw_null(sql_type: SqlType) -> Value {
    match sql_type {
        SqlType::Boolean => Value::Bool(false),
        SqlType::TinyInt => Value::I8(0),
        SqlType::SmallInt => Value::I16(0),
        SqlType::Integer => Value::I32(0),
        SqlType::BigInt => Value::I64(0),
        SqlType::Real => Value::F32(0.0),
        SqlType::Double => Value::F64(0.0),
        _ => Value::Null,
    }
}

impl ConnectionSource for MockSource {
    fn acquire(&self) -> Result<Box<dyn Connection + '_>> {
        self.record(Event::Acquire);
        Ok(Box::new(MockConnection { source: self }))
    }

    fn release(&self, _connection: Box<dyn Connection + '_>) -> Result<()> {
        self.record(Event::Release);
        self.check(Failure::Release)
    }
}

struct MockConnection<'a> {
    source: &'a MockSource,
}

impl Connection for MockConnection<'_> {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        self.source.record(Event::Prepare(sql.to_owned()));
        self.source.check(Failure::Prepare)?;
        Ok(Box::new(MockStatement::new(self.source)))
    }

    fn prepare_call(&mut self, sql: &str) -> Result<Box<dyn CallableStatement + '_>> {
        self.source.record(Event::PrepareCall(sql.to_owned()));
        self.source.check(Failure::Prepare)?;
        Ok(Box::new(MockStatement::new(self.source)))
    }
}

struct MockStatement<'a> {
    source: &'a MockSource,
    pending: usize,
    last_null: bool,
}

impl<'a> MockStatement<'a> {
    fn new(source: &'a MockSource) -> Self {
        MockStatement {
            source,
            pending: 0,
            last_null: false,
        }
    }
}

impl Statement for MockStatement<'_> {
    fn set_fetch_size(&mut self, rows: u32) -> Result<()> {
        self.source.record(Event::FetchSize(rows));
        Ok(())
    }

    fn bind(&mut self, index: usize, value: Value) -> Result<()> {
        self.source.record(Event::Bind(index, value));
        Ok(())
    }

    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> Result<()> {
        self.source.record(Event::BindNull(index, sql_type));
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn Rows + '_>> {
        self.source.record(Event::ExecuteQuery);
        self.source.check(Failure::Execute)?;
        Ok(Box::new(MockRows {
            source: self.source,
            position: None,
            last_null: false,
        }))
    }

    fn execute_update(&mut self) -> Result<u64> {
        self.source.record(Event::ExecuteUpdate);
        self.source.check(Failure::Execute)?;
        Ok(self.source.update_count)
    }

    fn add_batch(&mut self) -> Result<()> {
        self.source.record(Event::AddBatch);
        self.pending += 1;
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>> {
        self.source.record(Event::ExecuteBatch(self.pending));
        self.source.check(Failure::Execute)?;
        let counts = vec![self.source.update_count; self.pending];
        self.pending = 0;
        Ok(counts)
    }

    fn close(&mut self) -> Result<()> {
        self.source.record(Event::CloseStatement);
        self.source.check(Failure::Close)
    }
}

impl CallableStatement for MockStatement<'_> {
    fn register_out(&mut self, index: usize, sql_type: SqlType) -> Result<()> {
        self.source.record(Event::RegisterOut(index, sql_type));
        Ok(())
    }

    fn read_out(&mut self, index: usize, sql_type: SqlType) -> Result<Value> {
        let value = self.source.outs.get(&index).cloned().unwrap_or_default();
        self.last_null = value.is_null();
        Ok(if self.last_null { raw_null(sql_type) } else { value })
    }

    fn was_null(&self) -> bool {
        self.last_null
    }
}

struct MockRows<'a> {
    source: &'a MockSource,
    position: Option<usize>,
    last_null: bool,
}

impl Rows for MockRows<'_> {
    fn next(&mut self) -> Result<bool> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next);
        Ok(next < self.source.rows.len())
    }

    fn read(&mut self, column: usize, sql_type: SqlType) -> Result<Value> {
        let value = self
            .position
            .and_then(|row| self.source.rows.get(row))
            .and_then(|row| row.get(column - 1))
            .cloned()
            .ok_or_else(|| Error::Driver(format!("no column {column}")))?;
        self.last_null = value.is_null();
        Ok(if self.last_null { raw_null(sql_type) } else { value })
    }

    fn was_null(&self) -> bool {
        self.last_null
    }

    fn close(&mut self) -> Result<()> {
        self.source.record(Event::CloseRows);
        Ok(())
    }
}

/// `User { id: i64, name: String, age: Option<i32> }` with a default
/// constructor and an `(id, name)` constructor.
pub fn user_class() -> Arc<Class> {
    Class::builder("User")
        .property("id", Type::I64)
        .property("name", Type::String)
        .property("age", Type::option(Type::I32))
        .default_constructor()
        .constructor(["id", "name"])
        .build()
}
