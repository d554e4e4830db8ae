use async_trait::async_trait;

use super::{HandlerContext, StatementHandler};
use crate::driver::{Connection, Statement};
use crate::error::SqlMapperError;
use crate::executor::result_handler::ResultHandler;
use crate::mapping::BoundSql;
use crate::results::CustomDbRow;

/// Runs the SQL text as-is on an unparameterized statement.
pub struct PlainStatementHandler<'a> {
    context: HandlerContext<'a>,
}

impl<'a> PlainStatementHandler<'a> {
    pub(crate) fn new(context: HandlerContext<'a>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl StatementHandler for PlainStatementHandler<'_> {
    async fn prepare(
        &self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<u32>,
    ) -> Result<Box<dyn Statement>, SqlMapperError> {
        let mut statement = connection
            .create_statement()
            .await
            .map_err(|e| self.context.describe_failure("preparing", e))?;
        self.context
            .apply_timeout(statement.as_mut(), transaction_timeout);
        Ok(statement)
    }

    fn parameterize(&self, _statement: &mut dyn Statement) -> Result<(), SqlMapperError> {
        Ok(())
    }

    fn batch(&self, statement: &mut dyn Statement) -> Result<(), SqlMapperError> {
        statement.add_batch_sql(self.context.bound_sql.sql())
    }

    async fn update(&self, statement: &mut dyn Statement) -> Result<i64, SqlMapperError> {
        statement
            .execute_sql_update(self.context.bound_sql.sql())
            .await
            .map_err(|e| self.context.describe_failure("executing", e))
    }

    async fn query(
        &self,
        statement: &mut dyn Statement,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        let result_set = statement
            .execute_sql_query(self.context.bound_sql.sql())
            .await
            .map_err(|e| self.context.describe_failure("querying", e))?;
        self.context.handle_result_set(result_set, result_handler)
    }

    fn bound_sql(&self) -> &BoundSql {
        &self.context.bound_sql
    }
}
