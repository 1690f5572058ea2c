use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::model::{
    ColumnContext, ColumnDescriptor, ColumnKind, ColumnSchema, ColumnType, DropdownConfig, FilterCondition,
    FilterExpression, RelationDef, ResourceDefinition, ResourceRegistry, Row, SelectOption, ValidationRule,
    ValueType, ACTIVITY_LOG,
};
use crate::store::{ForeignKey, MemoryStore};

pub const ASSET_STATUSES: [&str; 4] = ["Available", "Assigned", "Under Repair", "Disposed"];

const ASSET_KINDS: [&str; 5] = ["Laptop", "Monitor", "Dock", "Phone", "Printer"];

/// Number of demo assets; odd ids up to 17 are assigned
pub const DEMO_ASSET_COUNT: u64 = 23;

/// Resource definitions for the demo asset register.
pub fn demo_registry() -> ResourceRegistry {
    ResourceRegistry::from_definitions(vec![assets(), locations(), users(), maintenances()])
}

fn assets() -> ResourceDefinition {
    let mut assets = ResourceDefinition::new("assets", "assets")
        .with_descriptors(vec![
            ColumnDescriptor::new("Asset Name", "name", ColumnType::String)
                .with_rules(vec![ValidationRule::Required, ValidationRule::Max { value: 255 }]),
            ColumnDescriptor::new("Serial Number", "serial_number", ColumnType::String)
                .hidden()
                .with_rules(vec![
                    ValidationRule::Required,
                    ValidationRule::Max { value: 50 },
                    ValidationRule::Unique,
                ]),
            ColumnDescriptor::new("Status", "status", ColumnType::Select)
                .with_options(ASSET_STATUSES.iter().map(|s| SelectOption::new(*s, *s)).collect())
                .with_rules(vec![
                    ValidationRule::Required,
                    ValidationRule::In {
                        values: ASSET_STATUSES.iter().map(|s| s.to_string()).collect(),
                    },
                ]),
            ColumnDescriptor::new("Location", "location.name", ColumnType::Link).only(&[ColumnContext::Show]),
            ColumnDescriptor::new("Location", "location_id", ColumnType::Link)
                .only(&[ColumnContext::Create, ColumnContext::Edit])
                .with_search_endpoint("locations")
                .with_rules(vec![ValidationRule::Nullable, ValidationRule::Type { of: ValueType::Integer }]),
            ColumnDescriptor::new("Assigned To", "user.name", ColumnType::Link).only(&[ColumnContext::Show]),
            ColumnDescriptor::new("Assigned To", "user_id", ColumnType::Link)
                .only(&[ColumnContext::Create, ColumnContext::Edit])
                .with_search_endpoint("users")
                .with_rules(vec![
                    ValidationRule::RequiredIf {
                        field: "status".to_string(),
                        value: "Assigned".to_string(),
                    },
                    ValidationRule::Type { of: ValueType::Integer },
                ]),
            ColumnDescriptor::new("Cost", "cost", ColumnType::Number)
                .with_rules(vec![ValidationRule::Nullable, ValidationRule::Type { of: ValueType::Numeric }]),
            ColumnDescriptor::new("Tags", "tags", ColumnType::Tag).hidden(),
            ColumnDescriptor::new("Created", "created_at", ColumnType::Date).only(&[ColumnContext::Show]),
        ])
        .with_searchable(&["name", "serial_number", "status", "location.name", "user.name", "created_at"])
        .with_mass_assignable(&["status", "location_id", "user_id", "cost"])
        .with_relation("location", RelationDef::belongs_to("locations", "location_id"))
        .with_relation("user", RelationDef::belongs_to("users", "user_id"))
        .with_relation("maintenances", RelationDef::has_many("maintenances", "asset_id"))
        .with_dropdown(DropdownConfig {
            label_template: Some("{serial_number} - {name}".to_string()),
            search_fields: vec!["name".to_string(), "serial_number".to_string()],
            parent_fields: vec!["location_id".to_string()],
            order_by: Some("created_at".to_string()),
            unassigned_column: Some("user_id".to_string()),
            ..DropdownConfig::default()
        })
        .with_tab(
            "mine",
            vec![FilterExpression::new("user_id", FilterCondition::Eq, "$user")],
        )
        .with_tab(
            "available",
            vec![FilterExpression::new("status", FilterCondition::Eq, "Available")],
        );
    assets.subject_type = Some("asset".to_string());
    assets
}

fn locations() -> ResourceDefinition {
    let mut locations = ResourceDefinition::new("locations", "locations")
        .with_descriptors(vec![
            ColumnDescriptor::new("Code", "code", ColumnType::String)
                .with_rules(vec![ValidationRule::Required, ValidationRule::Unique]),
            ColumnDescriptor::new("Name", "name", ColumnType::String).with_rules(vec![ValidationRule::Required]),
            ColumnDescriptor::new("Assets", "assets.name", ColumnType::Tag).only(&[ColumnContext::Show]),
        ])
        .with_searchable(&["code", "name", "assets.name"])
        .with_mass_assignable(&["name"])
        .with_relation("assets", RelationDef::has_many("assets", "location_id"))
        .with_dropdown(DropdownConfig {
            label_template: Some("{code} - {name}".to_string()),
            search_fields: vec!["code".to_string(), "name".to_string()],
            ..DropdownConfig::default()
        });
    locations.subject_type = Some("location".to_string());
    locations
}

fn users() -> ResourceDefinition {
    ResourceDefinition::new("users", "users")
        .with_descriptors(vec![
            ColumnDescriptor::new("Name", "name", ColumnType::String).with_rules(vec![ValidationRule::Required]),
            ColumnDescriptor::new("Email", "email", ColumnType::String).with_rules(vec![
                ValidationRule::Required,
                ValidationRule::Type { of: ValueType::Email },
                ValidationRule::Unique,
            ]),
            ColumnDescriptor::new("Password", "password", ColumnType::Password)
                .only(&[ColumnContext::Create])
                .with_rules(vec![ValidationRule::Required]),
        ])
        .with_searchable(&["name", "email"])
        .with_dropdown(DropdownConfig::default())
}

fn maintenances() -> ResourceDefinition {
    ResourceDefinition::new("maintenances", "maintenances")
        .with_descriptors(vec![
            ColumnDescriptor::new("Title", "title", ColumnType::String),
            ColumnDescriptor::new("Asset", "asset.name", ColumnType::Link).only(&[ColumnContext::Show]),
            ColumnDescriptor::new("Performed", "performed_at", ColumnType::Date),
        ])
        .with_searchable(&["title", "asset.name"])
        .with_relation("asset", RelationDef::belongs_to("assets", "asset_id"))
}

fn row(value: Value) -> Result<Row> {
    Row::from_value(value).ok_or_else(|| anyhow!("Seed rows must be JSON objects"))
}

/// Loads the demo asset register into a memory store: users, locations,
/// assets, maintenance records, activity history, column schemas and
/// foreign keys.
pub async fn load_demo_data(store: &MemoryStore) -> Result<()> {
    log::info!("Loading demo data");

    let users = [
        (1, "Administrator", "admin@localhost"),
        (2, "Dana Scully", "dana.scully@example.com"),
        (3, "Fox Mulder", "fox.mulder@example.com"),
    ];
    for (id, name, email) in users {
        store
            .insert_row("users", row(json!({"id": id, "name": name, "email": email}))?)
            .await;
    }

    let locations = [(1, "HQ", "Head Office"), (2, "WH", "Warehouse"), (3, "BR", "Branch Office")];
    for (id, code, name) in locations {
        store
            .insert_row("locations", row(json!({"id": id, "code": code, "name": name}))?)
            .await;
    }

    for i in 1..=DEMO_ASSET_COUNT {
        let assigned = i % 2 == 1 && i <= 17;
        let status = if assigned {
            "Assigned"
        } else if i % 10 == 0 {
            "Under Repair"
        } else {
            "Available"
        };
        let user_id = if assigned { json!((i / 2) % 3 + 1) } else { Value::Null };
        let location_id = if i == 23 { Value::Null } else { json!(i % 3 + 1) };
        let tags = if i % 4 == 0 { json!(["portable", "leased"]) } else { json!([]) };

        store
            .insert_row(
                "assets",
                row(json!({
                    "id": i,
                    "name": format!("{} {:02}", ASSET_KINDS[(i as usize - 1) % ASSET_KINDS.len()], i),
                    "serial_number": format!("SN-{:05}", 1000 + i),
                    "status": status,
                    "location_id": location_id,
                    "user_id": user_id,
                    "cost": 250 + i * 10,
                    "tags": tags,
                    "created_at": format!("2024-01-{:02}T09:00:00Z", i),
                }))?,
            )
            .await;
    }

    let maintenances = [
        (1, 5, "Screen replacement", "2024-02-01"),
        (2, 5, "Battery check", "2024-03-15"),
        (3, 8, "Firmware update", "2024-02-20"),
    ];
    for (id, asset_id, title, performed_at) in maintenances {
        store
            .insert_row(
                "maintenances",
                row(json!({"id": id, "asset_id": asset_id, "title": title, "performed_at": performed_at}))?,
            )
            .await;
    }

    let history = [
        json!({"id": 1, "event": "created", "description": "created", "subject_type": "asset", "subject_id": 5,
               "causer_id": 1, "properties": {"attributes": {"status": "Available"}},
               "created_at": "2024-01-05T09:00:00Z"}),
        json!({"id": 2, "event": "updated", "description": "updated", "subject_type": "asset", "subject_id": 5,
               "causer_id": 2, "properties": {"attributes": {"status": "Assigned"}, "old": {"status": "Available"}},
               "created_at": "2024-01-06T10:30:00Z"}),
        json!({"id": 3, "event": "updated", "description": "nightly depreciation", "subject_type": "asset",
               "subject_id": 5, "causer_id": null, "properties": {"attributes": {"cost": 290}},
               "created_at": "2024-01-07T00:00:00Z"}),
        json!({"id": 4, "event": "created", "description": "created", "subject_type": "location", "subject_id": 1,
               "causer_id": 1, "properties": {"attributes": {"name": "Head Office"}},
               "created_at": "2024-01-01T08:00:00Z"}),
    ];
    for entry in history {
        store.insert_row(ACTIVITY_LOG, row(entry)?).await;
    }

    store
        .define_column(
            "assets",
            "status",
            ColumnSchema::new(ColumnKind::enumeration(&ASSET_STATUSES), false, "asset_status"),
        )
        .await;
    store
        .define_column("assets", "name", ColumnSchema::new(ColumnKind::text(255), false, "varchar"))
        .await;
    store
        .define_column("assets", "location_id", ColumnSchema::new(ColumnKind::integer(), true, "int4"))
        .await;
    store
        .define_column("assets", "user_id", ColumnSchema::new(ColumnKind::integer(), true, "int4"))
        .await;
    store
        .define_column("assets", "cost", ColumnSchema::new(ColumnKind::decimal(), true, "numeric"))
        .await;
    store
        .define_column("locations", "name", ColumnSchema::new(ColumnKind::text(100), false, "varchar"))
        .await;

    store.add_foreign_key(ForeignKey::new("maintenances", "asset_id", "assets")).await;
    store.add_foreign_key(ForeignKey::new("assets", "location_id", "locations")).await;
    store.add_foreign_key(ForeignKey::new("assets", "user_id", "users")).await;
    store.add_foreign_key(ForeignKey::new(ACTIVITY_LOG, "causer_id", "users")).await;

    log::info!("Demo data loaded: {} assets", DEMO_ASSET_COUNT);
    Ok(())
}
