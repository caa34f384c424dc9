//! Data Engine - Interface of the analytic engine collaborator

use crate::dataset::{DatasetSchema, Row};
use crate::error::{AnalystError, Result};
use crate::sql_query::SqlQuery;
use async_trait::async_trait;
use tracing::warn;

#[async_trait]
pub trait DataEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_schema(&self, table_name: &str) -> Result<DatasetSchema>;

    /// Run SQL text against the engine. Callers go through
    /// [`DataEngine::execute_query`], which enforces the safety flag.
    /// Temporal values must come back as text.
    async fn run_sql(&self, sql: &str) -> Result<Vec<Row>>;

    /// Execute a validated query. Queries not marked safe are refused
    /// before the engine is touched.
    async fn execute_query(&self, query: &SqlQuery) -> Result<Vec<Row>> {
        if !query.is_safe() {
            warn!(engine = self.name(), "Refusing to execute a query not marked safe");
            return Err(AnalystError::SecurityPolicy(format!(
                "attempted to execute an unvalidated or unsafe query: {}",
                query.validation_error().unwrap_or("not validated")
            )));
        }
        self.run_sql(query.raw_text()).await
    }
}
