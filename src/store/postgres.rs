use anyhow::{anyhow, Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Row as SqlRow};

use crate::error::{is_foreign_key_violation, EngineError, EngineResult};
use crate::logic::predicate::{CompareOp, Predicate, QueryPlan};
use crate::model::{ColumnKind, ColumnSchema, Id, PageWindow, RelationDef, ResourceDefinition, Row};
use crate::store::traits::{PageSlice, RecordStore, SchemaIntrospector};

const BASE_ALIAS: &str = "base";
const RELATED_ALIAS: &str = "rel";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Double-quotes an identifier, escaping embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column_ref(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quote_ident(column))
}

/// Escapes LIKE metacharacters so user input only ever matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// `EXISTS (...)` correlation between the base row and one relation hop
fn push_relation_join(builder: &mut QueryBuilder<'_, Postgres>, relation: &RelationDef) {
    let (local, remote) = relation.join_columns();
    builder.push("SELECT 1 FROM ");
    builder.push(quote_ident(relation.table()));
    builder.push(" AS ");
    builder.push(RELATED_ALIAS);
    builder.push(" WHERE ");
    builder.push(column_ref(RELATED_ALIAS, remote));
    builder.push(" = ");
    builder.push(column_ref(BASE_ALIAS, local));
}

/// Compiles a predicate into SQL against `alias`. Relation predicates become
/// correlated `EXISTS` sub-queries; there are no joins, so the base row
/// count is never inflated.
pub fn push_predicate(
    builder: &mut QueryBuilder<'_, Postgres>,
    resource: &ResourceDefinition,
    alias: &str,
    predicate: &Predicate,
) -> EngineResult<()> {
    match predicate {
        Predicate::Compare { column, op, value } => {
            builder.push(column_ref(alias, column));
            builder.push(match op {
                CompareOp::Eq => "::text = ",
                CompareOp::Ne => "::text <> ",
            });
            builder.push_bind(value.clone());
        }
        Predicate::Like { column, term } => {
            builder.push(column_ref(alias, column));
            builder.push("::text ILIKE ");
            builder.push_bind(escape_like(term));
        }
        Predicate::In { column, values } => {
            builder.push(column_ref(alias, column));
            builder.push("::text = ANY(");
            builder.push_bind(values.clone());
            builder.push(")");
        }
        Predicate::NotIn { column, values } => {
            builder.push("(");
            builder.push(column_ref(alias, column));
            builder.push(" IS NOT NULL AND NOT (");
            builder.push(column_ref(alias, column));
            builder.push("::text = ANY(");
            builder.push_bind(values.clone());
            builder.push(")))");
        }
        Predicate::IsNull { column } => {
            builder.push(column_ref(alias, column));
            builder.push(" IS NULL");
        }
        Predicate::Related {
            relation,
            predicate,
        } => {
            let definition = resource
                .relation(relation)
                .ok_or_else(|| anyhow!("Relation '{}' is not declared on {}", relation, resource.name))?;
            builder.push("EXISTS (");
            push_relation_join(builder, definition);
            builder.push(" AND (");
            push_predicate(builder, resource, RELATED_ALIAS, predicate)?;
            builder.push("))");
        }
        Predicate::Any(parts) if parts.is_empty() => {
            builder.push("FALSE");
        }
        Predicate::All(parts) if parts.is_empty() => {
            builder.push("TRUE");
        }
        Predicate::Any(parts) | Predicate::All(parts) => {
            let joiner = if matches!(predicate, Predicate::Any(_)) { " OR " } else { " AND " };
            builder.push("(");
            for (index, part) in parts.iter().enumerate() {
                if index > 0 {
                    builder.push(joiner);
                }
                push_predicate(builder, resource, alias, part)?;
            }
            builder.push(")");
        }
    }
    Ok(())
}

/// `to_jsonb(base) || jsonb_build_object('rel', (...), ...)` so that every
/// returned row already carries its preloaded relations.
fn push_row_projection(
    builder: &mut QueryBuilder<'_, Postgres>,
    resource: &ResourceDefinition,
    relations: &[String],
) -> EngineResult<()> {
    builder.push("to_jsonb(");
    builder.push(BASE_ALIAS);
    builder.push(")");

    if relations.is_empty() {
        return Ok(());
    }

    builder.push(" || jsonb_build_object(");
    for (index, name) in relations.iter().enumerate() {
        let definition = resource
            .relation(name)
            .ok_or_else(|| anyhow!("Relation '{}' is not declared on {}", name, resource.name))?;
        if index > 0 {
            builder.push(", ");
        }
        builder.push(format!("'{}', (", name.replace('\'', "''")));
        if definition.is_many() {
            builder.push("SELECT COALESCE(jsonb_agg(to_jsonb(");
            builder.push(RELATED_ALIAS);
            builder.push(")), '[]'::jsonb) FROM (");
            push_relation_join_rows(builder, definition);
            builder.push(") AS ");
            builder.push(RELATED_ALIAS);
        } else {
            builder.push("SELECT to_jsonb(");
            builder.push(RELATED_ALIAS);
            builder.push(") FROM (");
            push_relation_join_rows(builder, definition);
            builder.push(" LIMIT 1) AS ");
            builder.push(RELATED_ALIAS);
        }
        builder.push(")");
    }
    builder.push(")");
    Ok(())
}

/// Like [`push_relation_join`] but selecting the related rows themselves
fn push_relation_join_rows(builder: &mut QueryBuilder<'_, Postgres>, relation: &RelationDef) {
    let (local, remote) = relation.join_columns();
    builder.push("SELECT * FROM ");
    builder.push(quote_ident(relation.table()));
    builder.push(" AS inner_rel WHERE ");
    builder.push(column_ref("inner_rel", remote));
    builder.push(" = ");
    builder.push(column_ref(BASE_ALIAS, local));
}

fn push_base_table(builder: &mut QueryBuilder<'_, Postgres>, resource: &ResourceDefinition) {
    builder.push(" FROM ");
    builder.push(quote_ident(&resource.table));
    builder.push(" AS ");
    builder.push(BASE_ALIAS);
}

fn decode_rows(rows: Vec<sqlx::postgres::PgRow>) -> EngineResult<Vec<Row>> {
    rows.into_iter()
        .map(|row| -> EngineResult<Row> {
            let value: serde_json::Value = row.try_get("row")?;
            let row = Row::from_value(value).ok_or_else(|| anyhow!("Row projection did not produce an object"))?;
            Ok(row)
        })
        .collect()
}

#[async_trait::async_trait]
impl RecordStore for PostgresStore {
    async fn query_page(
        &self,
        resource: &ResourceDefinition,
        plan: &QueryPlan,
        window: PageWindow,
    ) -> EngineResult<PageSlice> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        push_base_table(&mut count, resource);
        count.push(" WHERE ");
        push_predicate(&mut count, resource, BASE_ALIAS, &plan.predicate)?;

        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT ");
        push_row_projection(&mut select, resource, &plan.relations)?;
        select.push(" AS row");
        push_base_table(&mut select, resource);
        select.push(" WHERE ");
        push_predicate(&mut select, resource, BASE_ALIAS, &plan.predicate)?;
        select.push(" ORDER BY ");
        select.push(column_ref(BASE_ALIAS, &plan.sort.column));
        select.push(" ");
        select.push(plan.sort.direction.as_sql());
        select.push(", ");
        select.push(column_ref(BASE_ALIAS, &resource.primary_key));
        select.push(" ASC LIMIT ");
        select.push_bind(i64::try_from(window.limit()).unwrap_or(i64::MAX));
        select.push(" OFFSET ");
        select.push_bind(i64::try_from(window.offset()).unwrap_or(i64::MAX));

        log::debug!("{} page query: {}", resource.name, select.sql());
        let rows = select.build().fetch_all(&self.pool).await?;

        Ok(PageSlice {
            rows: decode_rows(rows)?,
            total: total.max(0) as u64,
        })
    }

    async fn fetch_rows(
        &self,
        resource: &ResourceDefinition,
        key_field: &str,
        ids: Option<&[Id]>,
        relations: &[String],
    ) -> EngineResult<Vec<Row>> {
        let mut select = QueryBuilder::<Postgres>::new("SELECT ");
        push_row_projection(&mut select, resource, relations)?;
        select.push(" AS row");
        push_base_table(&mut select, resource);
        if let Some(ids) = ids {
            select.push(" WHERE ");
            select.push(column_ref(BASE_ALIAS, key_field));
            select.push("::text = ANY(");
            select.push_bind(ids.to_vec());
            select.push(")");
        }
        select.push(" ORDER BY ");
        select.push(column_ref(BASE_ALIAS, key_field));
        select.push(" ASC");

        let rows = select.build().fetch_all(&self.pool).await?;
        decode_rows(rows)
    }

    async fn bulk_update(
        &self,
        resource: &ResourceDefinition,
        ids: &[Id],
        column: &str,
        value: Option<String>,
        schema: &ColumnSchema,
    ) -> EngineResult<u64> {
        let mut tx = self.pool.begin().await?;

        let mut update = QueryBuilder::<Postgres>::new("UPDATE ");
        update.push(quote_ident(&resource.table));
        update.push(" SET ");
        update.push(quote_ident(column));
        update.push(" = CAST(");
        update.push_bind(value);
        update.push(" AS ");
        update.push(quote_ident(&schema.sql_type));
        update.push(") WHERE ");
        update.push(quote_ident(&resource.primary_key));
        update.push("::text = ANY(");
        update.push_bind(ids.to_vec());
        update.push(")");

        // Dropping `tx` on error rolls the batch back
        let result = match update.build().execute(&mut *tx).await {
            Ok(result) => result,
            Err(err) if is_foreign_key_violation(&err) => return Err(EngineError::dangling_reference(column)),
            Err(err) => return Err(err.into()),
        };
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(0);
        }
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn bulk_delete(&self, resource: &ResourceDefinition, ids: &[Id]) -> EngineResult<u64> {
        let mut tx = self.pool.begin().await?;

        let mut delete = QueryBuilder::<Postgres>::new("DELETE FROM ");
        delete.push(quote_ident(&resource.table));
        delete.push(" WHERE ");
        delete.push(quote_ident(&resource.primary_key));
        delete.push("::text = ANY(");
        delete.push_bind(ids.to_vec());
        delete.push(")");

        // A foreign-key error drops `tx`, rolling the whole batch back
        let result = delete.build().execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl SchemaIntrospector for PostgresStore {
    async fn column_schema(&self, table: &str, column: &str) -> EngineResult<Option<ColumnSchema>> {
        // information_schema uses domain types; cast everything to plain types
        let row = sqlx::query(
            r#"
            SELECT c.data_type::text AS data_type,
                   c.udt_name::text AS udt_name,
                   c.is_nullable::text AS is_nullable,
                   c.character_maximum_length::int4 AS max_length,
                   c.numeric_precision::int4 AS numeric_precision,
                   c.numeric_scale::int4 AS numeric_scale
            FROM information_schema.columns c
            WHERE c.table_schema = current_schema()
              AND c.table_name = $1
              AND c.column_name = $2
            "#,
        )
        .bind(table)
        .bind(column)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data_type: String = row.try_get("data_type")?;
        let udt_name: String = row.try_get("udt_name")?;
        let nullable = row.try_get::<String, _>("is_nullable")? == "YES";
        let max_length: Option<i32> = row.try_get("max_length")?;
        let precision: Option<i32> = row.try_get("numeric_precision")?;
        let scale: Option<i32> = row.try_get("numeric_scale")?;

        let kind = match data_type.as_str() {
            "smallint" => ColumnKind::Numeric {
                integer: true,
                min: Some(i16::MIN as f64),
                max: Some(i16::MAX as f64),
                scale: None,
            },
            "integer" => ColumnKind::integer(),
            "bigint" => ColumnKind::Numeric {
                integer: true,
                min: Some(i64::MIN as f64),
                max: Some(i64::MAX as f64),
                scale: None,
            },
            "numeric" => match (precision, scale) {
                (Some(p), Some(s)) if p >= s && s >= 0 => ColumnKind::fixed(p as u32, s as u32),
                _ => ColumnKind::decimal(),
            },
            "real" | "double precision" => ColumnKind::decimal(),
            "character varying" | "character" | "text" => ColumnKind::Text {
                max_len: max_length.map(|n| n.max(0) as usize),
            },
            "boolean" => ColumnKind::Boolean,
            "USER-DEFINED" => {
                let values: Vec<String> = sqlx::query_scalar(
                    r#"
                    SELECT e.enumlabel::text
                    FROM pg_enum e
                    JOIN pg_type t ON t.oid = e.enumtypid
                    WHERE t.typname = $1
                    ORDER BY e.enumsortorder
                    "#,
                )
                .bind(&udt_name)
                .fetch_all(&self.pool)
                .await?;

                if values.is_empty() {
                    ColumnKind::Other
                } else {
                    ColumnKind::Enum { values }
                }
            }
            _ => ColumnKind::Other,
        };

        Ok(Some(ColumnSchema {
            kind,
            nullable,
            sql_type: udt_name,
        }))
    }
}
