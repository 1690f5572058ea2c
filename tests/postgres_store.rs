use admin_engine::config::PaginationConfig;
use admin_engine::model::{
    ColumnDescriptor, ColumnType, ListRequest, RelationDef, ResourceDefinition, UserContext,
};
use admin_engine::store::PostgresStore;
use admin_engine::{BulkMutationEngine, EngineError, FilterComposer, QueryHandle};
use serde_json::json;

const ASSETS: &str = "engine_test_assets";
const MAINTENANCES: &str = "engine_test_maintenances";
const LOCATIONS: &str = "engine_test_locations";

fn assets() -> ResourceDefinition {
    ResourceDefinition::new("assets", ASSETS)
        .with_descriptors(vec![
            ColumnDescriptor::new("Name", "name", ColumnType::String),
            ColumnDescriptor::new("Status", "status", ColumnType::Select),
            ColumnDescriptor::new("Created", "created_at", ColumnType::Date),
        ])
        .with_searchable(&["name", "status", "maintenances.title"])
        .with_mass_assignable(&["status", "location_id", "cost"])
        .with_relation("maintenances", RelationDef::has_many(MAINTENANCES, "asset_id"))
}

async fn prepare() -> Option<PostgresStore> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        println!("DATABASE_URL not set, skipping");
        return None;
    };
    let store = PostgresStore::new(&database_url, 2).await.expect("Failed to connect");

    for statement in [
        format!("DROP TABLE IF EXISTS {} CASCADE", MAINTENANCES),
        format!("DROP TABLE IF EXISTS {} CASCADE", ASSETS),
        format!("DROP TABLE IF EXISTS {} CASCADE", LOCATIONS),
        format!("CREATE TABLE {} (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", LOCATIONS),
        format!("INSERT INTO {} (id, name) VALUES (1, 'Head Office')", LOCATIONS),
        format!(
            "CREATE TABLE {} (id INTEGER PRIMARY KEY, name VARCHAR(255) NOT NULL, \
             status VARCHAR(20) NOT NULL, created_at TIMESTAMPTZ NOT NULL, \
             location_id INTEGER REFERENCES {}(id), cost NUMERIC(10, 2))",
            ASSETS, LOCATIONS
        ),
        format!(
            "CREATE TABLE {} (id INTEGER PRIMARY KEY, asset_id INTEGER NOT NULL REFERENCES {}(id), title TEXT)",
            MAINTENANCES, ASSETS
        ),
    ] {
        sqlx::query(&statement).execute(store.pool()).await.expect("Failed to prepare schema");
    }

    for i in 1..=23 {
        let status = if i % 2 == 1 && i <= 17 { "Assigned" } else { "Available" };
        sqlx::query(&format!(
            "INSERT INTO {} (id, name, status, created_at) VALUES ($1, $2, $3, $4::timestamptz)",
            ASSETS
        ))
        .bind(i)
        .bind(format!("Asset {:02}", i))
        .bind(status)
        .bind(format!("2024-01-{:02}T09:00:00Z", i))
        .execute(store.pool())
        .await
        .expect("Failed to insert asset");
    }
    for (id, asset_id, title) in [(1, 5, "Screen replacement"), (2, 5, "Battery check")] {
        sqlx::query(&format!("INSERT INTO {} (id, asset_id, title) VALUES ($1, $2, $3)", MAINTENANCES))
            .bind(id)
            .bind(asset_id)
            .bind(title)
            .execute(store.pool())
            .await
            .expect("Failed to insert maintenance");
    }

    Some(store)
}

#[tokio::test]
#[ignore]
async fn test_postgres_list_and_bulk_operations() {
    let Some(store) = prepare().await else {
        return;
    };
    let resource = assets();
    let user = UserContext::default();
    let composer = FilterComposer::new(PaginationConfig::default());

    let request = ListRequest {
        filters: Some(r#"[{"field":"status","condition":"=","value":"Assigned"}]"#.into()),
        sort_column: Some("created_at".into()),
        sort_direction: Some("desc".into()),
        ..ListRequest::default()
    };
    let page = composer
        .apply(QueryHandle::new(&store, &resource), &request, &user)
        .await
        .unwrap();
    assert_eq!(page.total, 9);
    assert_eq!(page.records[0].text("id").as_deref(), Some("17"));

    // has_many search must not duplicate asset 5
    let request = ListRequest {
        search: Some("e".into()),
        filters: Some(r#"[{"field":"maintenances.title","condition":"like","value":"battery"}]"#.into()),
        ..ListRequest::default()
    };
    let page = composer
        .apply(QueryHandle::new(&store, &resource), &request, &user)
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    let engine = BulkMutationEngine::new(&store, &store);
    let error = engine
        .bulk_delete(&resource, &["5".to_string()], &user)
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::ReferentialConflict(_)));

    let edited = engine
        .bulk_edit(&resource, &["2".to_string(), "4".to_string()], "status", &json!("Disposed"), &user)
        .await
        .unwrap();
    assert_eq!(edited.updated_count, 2);

    let error = engine
        .bulk_edit(&resource, &["2".to_string()], "status", &json!("x".repeat(30)), &user)
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::InvalidValue(_)));

    let error = engine
        .bulk_edit(&resource, &["2".to_string()], "location_id", &json!(99), &user)
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::InvalidValue(_)), "{:?}", error);

    let moved = engine
        .bulk_edit(&resource, &["2".to_string()], "location_id", &json!(1), &user)
        .await
        .unwrap();
    assert_eq!(moved.updated_count, 1);

    let error = engine
        .bulk_edit(&resource, &["2".to_string()], "cost", &json!(100000000), &user)
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::InvalidValue(_)), "{:?}", error);

    let all = composer
        .apply(QueryHandle::new(&store, &resource), &ListRequest::default(), &user)
        .await
        .unwrap();
    assert_eq!(all.total, 23);
}
