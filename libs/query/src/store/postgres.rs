//! PostgreSQL store backed by a `sqlx` pool.

use super::{Link, Related, RelatedQuery, Store};
use crate::error::{Error, Result};
use crate::query::SelectQuery;
use crate::record::Record;
use crate::registry::{EntityDef, EntityRegistry};
use crate::sql::{projection, BindValue, Projected, SqlBuilder};
use crate::value::{ScalarType, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(Error::Database)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_all(&self, sql: &str, bind_values: Vec<BindValue>) -> Result<Vec<PgRow>> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        bind_all(sqlx::query(sql), bind_values)
            .fetch_all(&mut *conn)
            .await
            .map_err(Error::Database)
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    bind_values: Vec<BindValue>,
) -> Query<'q, Postgres, PgArguments> {
    for value in bind_values {
        query = match value {
            BindValue::Null => query.bind(Option::<String>::None),
            BindValue::Bool(v) => query.bind(v),
            BindValue::Int(v) => query.bind(v),
            BindValue::Float(v) => query.bind(v),
            BindValue::Text(v) => query.bind(v),
            BindValue::Date(v) => query.bind(v),
            BindValue::DateTime(v) => query.bind(v),
            BindValue::Timestamp(v) => query.bind(v),
            BindValue::Uuid(v) => query.bind(v),
            BindValue::BoolArray(vs) => query.bind(vs),
            BindValue::IntArray(vs) => query.bind(vs),
            BindValue::FloatArray(vs) => query.bind(vs),
            BindValue::TextArray(vs) => query.bind(vs),
            BindValue::DateArray(vs) => query.bind(vs),
            BindValue::DateTimeArray(vs) => query.bind(vs),
            BindValue::TimestampArray(vs) => query.bind(vs),
            BindValue::UuidArray(vs) => query.bind(vs),
        };
    }
    query
}

/// Read one column as `scalar`. Integer and float columns of any width are accepted.
fn read(row: &PgRow, index: usize, scalar: ScalarType) -> std::result::Result<Value, sqlx::Error> {
    Ok(match scalar {
        ScalarType::Boolean => row
            .try_get::<Option<bool>, _>(index)?
            .map_or(Value::Null, Value::Bool),
        ScalarType::Integer => row
            .try_get::<Option<i64>, _>(index)
            .or_else(|_| {
                row.try_get::<Option<i32>, _>(index)
                    .map(|v| v.map(i64::from))
            })
            .or_else(|_| {
                row.try_get::<Option<i16>, _>(index)
                    .map(|v| v.map(i64::from))
            })?
            .map_or(Value::Null, Value::Int),
        ScalarType::Float => row
            .try_get::<Option<f64>, _>(index)
            .or_else(|_| {
                row.try_get::<Option<f32>, _>(index)
                    .map(|v| v.map(f64::from))
            })?
            .map_or(Value::Null, Value::Float),
        ScalarType::Text => row
            .try_get::<Option<String>, _>(index)?
            .map_or(Value::Null, Value::Text),
        ScalarType::Date => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map_or(Value::Null, Value::Date),
        ScalarType::DateTime => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map_or(Value::Null, Value::DateTime),
        ScalarType::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map_or(Value::Null, Value::Timestamp),
        ScalarType::Uuid => row
            .try_get::<Option<Uuid>, _>(index)?
            .map_or(Value::Null, Value::Uuid),
    })
}

fn decode(row: &PgRow, entity: &EntityDef, columns: &[Projected], offset: usize) -> Result<Record> {
    let mut record = Record::new(&entity.name, &entity.id, Value::Null);
    for (i, column) in columns.iter().enumerate() {
        let value = read(row, offset + i, column.scalar).map_err(Error::Database)?;
        if column.reference {
            record.references.insert(column.name.clone(), value);
            continue;
        }
        if column.name == entity.id {
            record.id = value.clone();
        }
        record.fields.insert(column.name.clone(), value);
    }
    Ok(record)
}

#[async_trait]
impl Store for PgStore {
    async fn select(&self, registry: &EntityRegistry, query: &SelectQuery) -> Result<Vec<Record>> {
        let (sql, bind_values) = SqlBuilder::new(registry).build_select(query)?;
        debug!(entity = %query.entity, sql = %sql, binds = bind_values.len(), "Selecting roots");

        let entity = registry.entity(&query.entity)?;
        let columns = projection(registry, entity)?;
        self.fetch_all(&sql, bind_values)
            .await?
            .iter()
            .map(|row| decode(row, entity, &columns, 0))
            .collect()
    }

    async fn count(&self, registry: &EntityRegistry, query: &SelectQuery) -> Result<i64> {
        let (sql, bind_values) = SqlBuilder::new(registry).build_count(query)?;
        debug!(entity = %query.entity, sql = %sql, "Counting roots");

        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        let row = bind_all(sqlx::query(&sql), bind_values)
            .fetch_one(&mut *conn)
            .await
            .map_err(Error::Database)?;
        row.try_get::<i64, _>(0).map_err(Error::Database)
    }

    async fn fetch_related(
        &self,
        registry: &EntityRegistry,
        query: &RelatedQuery,
    ) -> Result<Vec<Related>> {
        let (sql, bind_values) = SqlBuilder::new(registry).build_related(query)?;
        debug!(
            owner = %query.owner,
            attribute = %query.attribute,
            keys = query.keys.len(),
            sql = %sql,
            "Loading association"
        );

        let target = registry.entity(&query.target)?;
        let owner_type = match query.link {
            Link::Identity => target.id_type(),
            _ => registry.entity(&query.owner)?.id_type(),
        };
        let columns = projection(registry, target)?;
        self.fetch_all(&sql, bind_values)
            .await?
            .iter()
            .map(|row| {
                Ok(Related {
                    owner_key: read(row, 0, owner_type).map_err(Error::Database)?,
                    record: decode(row, target, &columns, 1)?,
                })
            })
            .collect()
    }
}
