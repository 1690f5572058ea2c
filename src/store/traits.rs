use crate::error::EngineResult;
use crate::logic::predicate::QueryPlan;
use crate::model::{ColumnSchema, Id, PageWindow, ResourceDefinition, Row};

/// One window of matching rows plus the total match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSlice {
    pub rows: Vec<Row>,
    pub total: u64,
}

/// Abstract queryable collection the engine runs against.
///
/// Every call reads from the underlying store; implementations must not
/// cache rows between calls.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Filtered, sorted window over `resource`'s table. Relation predicates
    /// must be existence checks so that no base row is returned twice.
    async fn query_page(
        &self,
        resource: &ResourceDefinition,
        plan: &QueryPlan,
        window: PageWindow,
    ) -> EngineResult<PageSlice>;

    /// Rows whose `key_field` is in `ids` (all rows when `None`), ordered by
    /// `key_field` ascending, with `relations` preloaded.
    async fn fetch_rows(
        &self,
        resource: &ResourceDefinition,
        key_field: &str,
        ids: Option<&[Id]>,
        relations: &[String],
    ) -> EngineResult<Vec<Row>>;

    /// Sets `column` to `value` (already validated, in text form) on every
    /// row in `ids` as one atomic statement. Returns the number of rows changed.
    async fn bulk_update(
        &self,
        resource: &ResourceDefinition,
        ids: &[Id],
        column: &str,
        value: Option<String>,
        schema: &ColumnSchema,
    ) -> EngineResult<u64>;

    /// Deletes every row in `ids` atomically. A foreign-key violation must
    /// surface as `EngineError::ReferentialConflict` with nothing deleted.
    async fn bulk_delete(&self, resource: &ResourceDefinition, ids: &[Id]) -> EngineResult<u64>;
}

/// Live-schema lookup used to type-check bulk edits.
#[async_trait::async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn column_schema(&self, table: &str, column: &str) -> EngineResult<Option<ColumnSchema>>;
}

pub trait Store: RecordStore + SchemaIntrospector + Send + Sync {}
impl<T: RecordStore + SchemaIntrospector + Send + Sync> Store for T {}
