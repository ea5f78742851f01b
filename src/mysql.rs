//! A [`ConnectionSource`] backed by an sqlx MySQL pool.
//!
//! The driver contract is synchronous, so the source owns a tokio runtime
//! and blocks on it for every round trip. Do not use it from inside
//! another tokio runtime.
//!
//! Statements buffer their bound parameters and build a fresh sqlx
//! [`Query`] on every execution. Result rows are fetched eagerly. Stored
//! procedure calls run like any other statement, including in batches, but
//! MySQL has no output parameters over sqlx, so registering or reading one
//! fails with [`Error::Unsupported`].

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{
    mysql::{MySqlArguments, MySqlPool, MySqlRow},
    pool::PoolConnection,
    query::Query,
    Decode, MySql, Row,
};
use tokio::runtime::Runtime;
use tracing::trace;

use crate::{
    driver::{CallableStatement, Connection, ConnectionSource, Rows, SqlType, Statement},
    error::Error,
    value::Value,
    Result,
};

/// Type alias for SQLx Query with MySQL arguments
pub type Q<'q> = Query<'q, MySql, MySqlArguments>;

/// A pool of MySQL connections driven by an owned runtime.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx_query_mapper::mysql::MySqlSource;
///
/// # fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
/// let source = MySqlSource::connect("mysql://localhost/test")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MySqlSource {
    pool: MySqlPool,
    runtime: Runtime,
}

impl MySqlSource {
    /// Starts a runtime and connects a pool to `url`.
    pub fn connect(url: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Driver(format!("failed to start runtime: {e}")))?;
        let pool = runtime.block_on(MySqlPool::connect(url))?;
        Ok(MySqlSource { pool, runtime })
    }

    /// Wraps an existing pool; `runtime` must be the one the pool runs on.
    pub fn from_pool(pool: MySqlPool, runtime: Runtime) -> Self {
        MySqlSource { pool, runtime }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Runs a future on the source's runtime, e.g. to prepare a schema.
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl ConnectionSource for MySqlSource {
    fn acquire(&self) -> Result<Box<dyn Connection + '_>> {
        let connection = self.runtime.block_on(self.pool.acquire())?;
        Ok(Box::new(MySqlConnection {
            connection,
            runtime: &self.runtime,
        }))
    }

    fn release(&self, connection: Box<dyn Connection + '_>) -> Result<()> {
        // Dropping a pool connection hands it back to the pool.
        drop(connection);
        Ok(())
    }
}

struct MySqlConnection<'s> {
    connection: PoolConnection<MySql>,
    runtime: &'s Runtime,
}

impl MySqlConnection<'_> {
    fn statement(&mut self, sql: &str) -> MySqlStatement<'_> {
        MySqlStatement {
            connection: &mut self.connection,
            runtime: self.runtime,
            sql: sql.to_owned(),
            buffer: Buffer::default(),
        }
    }
}

impl Connection for MySqlConnection<'_> {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        Ok(Box::new(self.statement(sql)))
    }

    /// Calls share the buffered statement path; only output parameters are
    /// unavailable.
    fn prepare_call(&mut self, sql: &str) -> Result<Box<dyn CallableStatement + '_>> {
        Ok(Box::new(self.statement(sql)))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Param {
    Value(Value),
    Null(SqlType),
}

type Params = BTreeMap<usize, Param>;

/// Bound parameters plus the entries queued for the next batch.
#[derive(Debug, Default)]
struct Buffer {
    params: Params,
    batch: Vec<Params>,
}

impl Buffer {
    fn set(&mut self, index: usize, param: Param) {
        self.params.insert(index, param);
    }

    /// Queues the current binds; they stay bound for the next entry.
    fn queue(&mut self) {
        self.batch.push(self.params.clone());
    }

    fn drain(&mut self) -> Vec<Params> {
        std::mem::take(&mut self.batch)
    }

    fn clear(&mut self) {
        self.params.clear();
        self.batch.clear();
    }
}

struct MySqlStatement<'c> {
    connection: &'c mut PoolConnection<MySql>,
    runtime: &'c Runtime,
    sql: String,
    buffer: Buffer,
}

impl MySqlStatement<'_> {
    fn run_update(&mut self, params: &Params) -> Result<u64> {
        let query = build(&self.sql, params)?;
        let result = self.runtime.block_on(query.execute(&mut **self.connection))?;
        Ok(result.rows_affected())
    }
}

/// Params in slot order; every slot from 1 up must be bound.
fn ordered(params: &Params) -> Result<Vec<&Param>> {
    params
        .iter()
        .enumerate()
        .map(|(i, (slot, param))| {
            if *slot == i + 1 {
                Ok(param)
            } else {
                Err(Error::Driver(format!("parameter {} is not bound", i + 1)))
            }
        })
        .collect()
}

fn build<'q>(sql: &'q str, params: &Params) -> Result<Q<'q>> {
    let mut q = sqlx::query::<MySql>(sql);
    for param in ordered(params)? {
        q = match param {
            Param::Value(value) => bind_value(q, value.clone())?,
            Param::Null(sql_type) => bind_null(q, *sql_type),
        };
    }
    Ok(q)
}

fn bind_value(q: Q<'_>, value: Value) -> Result<Q<'_>> {
    Ok(match value {
        Value::Null => q.bind(None::<String>),
        Value::Bool(v) => q.bind(v),
        Value::I8(v) => q.bind(v),
        Value::I16(v) => q.bind(v),
        Value::I32(v) => q.bind(v),
        Value::I64(v) => q.bind(v),
        Value::F32(v) => q.bind(v),
        Value::F64(v) => q.bind(v),
        Value::Char(v) => q.bind(v.to_string()),
        Value::String(v) => q.bind(v),
        Value::Bytes(v) => q.bind(v),
        Value::Date(v) => q.bind(v),
        Value::Time(v) => q.bind(v),
        Value::Timestamp(v) => q.bind(v),
        Value::Enum(v) => q.bind(v.name),
        Value::Object(_) | Value::Array(_) | Value::List(_) | Value::Set(_) | Value::Map(_) => {
            return Err(Error::Unsupported("binding a composite value to MySQL"));
        }
    })
}

fn bind_null(q: Q<'_>, sql_type: SqlType) -> Q<'_> {
    match sql_type {
        SqlType::Boolean => q.bind(None::<bool>),
        SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
            q.bind(None::<i64>)
        }
        SqlType::Real | SqlType::Double => q.bind(None::<f64>),
        SqlType::Date => q.bind(None::<NaiveDate>),
        SqlType::Time => q.bind(None::<NaiveTime>),
        SqlType::Timestamp => q.bind(None::<NaiveDateTime>),
        SqlType::VarBinary => q.bind(None::<Vec<u8>>),
        SqlType::Char | SqlType::VarChar | SqlType::Other => q.bind(None::<String>),
    }
}

impl Statement for MySqlStatement<'_> {
    fn set_fetch_size(&mut self, rows: u32) -> Result<()> {
        trace!(rows, "fetch size hint ignored, rows are fetched eagerly");
        Ok(())
    }

    fn bind(&mut self, index: usize, value: Value) -> Result<()> {
        self.buffer.set(index, Param::Value(value));
        Ok(())
    }

    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> Result<()> {
        self.buffer.set(index, Param::Null(sql_type));
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn Rows + '_>> {
        let query = build(&self.sql, &self.buffer.params)?;
        let rows = self.runtime.block_on(query.fetch_all(&mut **self.connection))?;
        trace!(rows = rows.len(), "fetched rows");
        Ok(Box::new(MySqlRows {
            rows,
            position: None,
            last_null: false,
        }))
    }

    fn execute_update(&mut self) -> Result<u64> {
        let params = std::mem::take(&mut self.buffer.params);
        let result = self.run_update(&params);
        self.buffer.params = params;
        result
    }

    fn add_batch(&mut self) -> Result<()> {
        self.buffer.queue();
        Ok(())
    }

    /// Runs the queued entries one by one on the same connection.
    fn execute_batch(&mut self) -> Result<Vec<u64>> {
        self.buffer
            .drain()
            .iter()
            .map(|params| self.run_update(params))
            .collect()
    }

    fn close(&mut self) -> Result<()> {
        self.buffer.clear();
        Ok(())
    }
}

impl CallableStatement for MySqlStatement<'_> {
    fn register_out(&mut self, _index: usize, _sql_type: SqlType) -> Result<()> {
        Err(Error::Unsupported("output parameters over MySQL"))
    }

    fn read_out(&mut self, _index: usize, _sql_type: SqlType) -> Result<Value> {
        Err(Error::Unsupported("output parameters over MySQL"))
    }

    fn was_null(&self) -> bool {
        false
    }
}

struct MySqlRows {
    rows: Vec<MySqlRow>,
    position: Option<usize>,
    last_null: bool,
}

fn get<'r, T>(row: &'r MySqlRow, index: usize) -> Result<Value>
where
    T: Decode<'r, MySql> + Into<Value>,
{
    Ok(row.try_get_unchecked::<Option<T>, _>(index)?.into())
}

impl Rows for MySqlRows {
    fn next(&mut self) -> Result<bool> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next);
        Ok(next < self.rows.len())
    }

    fn read(&mut self, column: usize, sql_type: SqlType) -> Result<Value> {
        let row = self
            .position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| Error::Driver("no current row".into()))?;
        let index = column
            .checked_sub(1)
            .ok_or_else(|| Error::Driver("column indexes start at 1".into()))?;
        // Integers are decoded at full width and narrowed by the caller.
        let value = match sql_type {
            SqlType::Boolean => get::<bool>(row, index)?,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => {
                get::<i64>(row, index)?
            }
            SqlType::Real => get::<f32>(row, index)?,
            SqlType::Double => get::<f64>(row, index)?,
            SqlType::Date => get::<NaiveDate>(row, index)?,
            SqlType::Time => get::<NaiveTime>(row, index)?,
            SqlType::Timestamp => get::<NaiveDateTime>(row, index)?,
            SqlType::VarBinary => get::<Vec<u8>>(row, index)?,
            SqlType::Char | SqlType::VarChar | SqlType::Other => get::<String>(row, index)?,
        };
        self.last_null = value.is_null();
        Ok(value)
    }

    fn was_null(&self) -> bool {
        self.last_null
    }
}
