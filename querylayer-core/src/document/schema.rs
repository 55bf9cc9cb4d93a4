use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::{
    driver::DocumentDriver,
    error::{DatabaseError, DatabaseResult},
    schema::{AlterOperation, SchemaManager, TableBlueprint},
};

/// [`SchemaManager`] mapping tables onto collections.
///
/// Column definitions are not enforced by the store and are ignored. Creating
/// an existing collection is a no-op.
#[derive(Debug, Clone)]
pub struct DocumentSchema {
    driver: Arc<dyn DocumentDriver>,
}

impl DocumentSchema {
    pub fn new(driver: Arc<dyn DocumentDriver>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl SchemaManager for DocumentSchema {
    async fn create_table(&self, blueprint: &TableBlueprint) -> DatabaseResult<()> {
        if self.table_exists(&blueprint.name).await? {
            return Ok(());
        }

        self.driver.create_collection(&blueprint.name).await?;

        info!(collection = %blueprint.name, "created collection");
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> DatabaseResult<()> {
        if !self.table_exists(name).await? {
            return Ok(());
        }

        self.driver.drop_collection(name).await?;

        info!(collection = %name, "dropped collection");
        Ok(())
    }

    async fn table_exists(&self, name: &str) -> DatabaseResult<bool> {
        Ok(self
            .driver
            .list_collections()
            .await?
            .iter()
            .any(|collection| collection == name))
    }

    async fn alter_table(&self, name: &str, _operations: &[AlterOperation]) -> DatabaseResult<()> {
        Err(DatabaseError::Unsupported(format!(
            "altering collection '{name}': document stores have no fixed columns"
        )))
    }

    async fn list_tables(&self) -> DatabaseResult<Vec<String>> {
        self.driver.list_collections().await
    }
}
