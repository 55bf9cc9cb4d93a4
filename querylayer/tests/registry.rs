mod common;

use bson::doc;

use querylayer::prelude::*;

const CONFIG: &str = r#"
default = "main"
keep_alive = ["cache"]

[connections.main]
driver = "sqlite"
path = ":memory:"

[connections.cache]
driver = "memory"

[connections.reports]
driver = "memory"
"#;

#[tokio::test]
async fn boots_from_toml_and_serves_each_connection() {
    common::init_tracing();

    let config = DatabaseConfig::from_toml_str(CONFIG).unwrap();
    let registry = ConnectionRegistry::boot(config, &DriverTable::default()).await.unwrap();

    assert_eq!(registry.default_connection(), "main");
    assert_eq!(registry.connection_names().await, ["cache", "main", "reports"]);
    assert!(!registry.is_connected("reports").await);

    registry
        .schema(None)
        .await
        .unwrap()
        .create_table(&TableBlueprint::new("people").string("name"))
        .await
        .unwrap();
    let sql = registry.document_manager(None).await.unwrap();
    sql.table("people").insert_one(doc! { "name": "Ann" }).await.unwrap();

    let cache = registry.document_manager(Some("cache")).await.unwrap();
    cache.table("people").insert_one(doc! { "name": "Bob" }).await.unwrap();

    assert_eq!(sql.table("people").count().await.unwrap(), 1);
    assert_eq!(cache.table("people").count().await.unwrap(), 1);
    assert_eq!(
        registry.document_manager(Some("reports")).await.unwrap().table("people").count().await.unwrap(),
        0
    );

    assert!(registry.is_adapter("memory", Some("cache")).await.unwrap());
    assert!(matches!(registry.client(Some("cache")).await.unwrap(), NativeClient::Document(_)));

    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn boot_rejects_inconsistent_configuration() {
    let missing_default = DatabaseConfig::from_toml_str(
        r#"
        default = "main"

        [connections.other]
        driver = "memory"
        "#,
    )
    .unwrap();
    let err = ConnectionRegistry::boot(missing_default, &DriverTable::default()).await.unwrap_err();
    assert!(matches!(err, DatabaseError::InvalidDatabaseConnection(name) if name == "main"));

    let unknown_driver = DatabaseConfig::new("main").connection("main", ConnectionConfig::new("cassandra"));
    let err = ConnectionRegistry::boot(unknown_driver, &DriverTable::default()).await.unwrap_err();
    assert!(matches!(err, DatabaseError::InvalidDatabaseDriver(name) if name == "cassandra"));
}

#[tokio::test]
async fn custom_driver_tables_can_alias_drivers() {
    let drivers = DriverTable::new().register("scratch", |_| {
        Ok(querylayer::registry::Backend::Document(Box::new(querylayer::memory::MemoryDriverBuilder)))
    });
    let config = DatabaseConfig::new("main").connection("main", ConnectionConfig::new("scratch"));

    let registry = ConnectionRegistry::boot(config, &drivers).await.unwrap();

    assert!(registry.is_adapter("scratch", None).await.unwrap());
    assert_eq!(registry.document_manager(None).await.unwrap().backend(), BackendKind::Document);
}
