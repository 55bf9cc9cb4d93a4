use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::{
    driver::SqlDriver,
    error::DatabaseResult,
    schema::{AlterOperation, SchemaManager, TableBlueprint},
    sql::{SqlCompiler, run_query, run_statement},
};

/// [`SchemaManager`] issuing DDL through a [`SqlDriver`].
#[derive(Debug, Clone)]
pub struct RelationalSchema {
    driver: Arc<dyn SqlDriver>,
    compiler: SqlCompiler,
}

impl RelationalSchema {
    pub fn new(driver: Arc<dyn SqlDriver>) -> Self {
        let compiler = SqlCompiler::new(driver.dialect());

        Self { driver, compiler }
    }
}

#[async_trait]
impl SchemaManager for RelationalSchema {
    async fn create_table(&self, blueprint: &TableBlueprint) -> DatabaseResult<()> {
        for statement in self.compiler.compile_create_table(blueprint) {
            run_statement(self.driver.as_ref(), &statement).await?;
        }

        info!(table = %blueprint.name, columns = blueprint.columns.len(), "created table");
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> DatabaseResult<()> {
        run_statement(self.driver.as_ref(), &self.compiler.compile_drop_table(name)).await?;

        info!(table = %name, "dropped table");
        Ok(())
    }

    async fn table_exists(&self, name: &str) -> DatabaseResult<bool> {
        let statement = self.compiler.dialect().table_exists(name);

        Ok(!run_query(self.driver.as_ref(), &statement).await?.is_empty())
    }

    async fn alter_table(&self, name: &str, operations: &[AlterOperation]) -> DatabaseResult<()> {
        let mut statements = Vec::new();
        for operation in operations {
            statements.extend(self.compiler.compile_alter(name, operation)?);
        }

        for statement in &statements {
            run_statement(self.driver.as_ref(), statement).await?;
        }

        info!(table = %name, operations = operations.len(), "altered table");
        Ok(())
    }

    async fn list_tables(&self) -> DatabaseResult<Vec<String>> {
        let statement = self.compiler.dialect().list_tables();

        Ok(run_query(self.driver.as_ref(), &statement)
            .await?
            .into_iter()
            .filter_map(|row| row.get_str("name").ok().map(str::to_string))
            .collect())
    }
}
