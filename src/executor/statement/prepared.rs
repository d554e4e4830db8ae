use async_trait::async_trait;

use super::{HandlerContext, StatementHandler};
use crate::driver::{Connection, Statement};
use crate::error::SqlMapperError;
use crate::executor::result_handler::ResultHandler;
use crate::mapping::BoundSql;
use crate::results::CustomDbRow;

/// Compiles the SQL once and binds parameters per execution.
pub struct PreparedStatementHandler<'a> {
    context: HandlerContext<'a>,
}

impl<'a> PreparedStatementHandler<'a> {
    pub(crate) fn new(context: HandlerContext<'a>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl StatementHandler for PreparedStatementHandler<'_> {
    async fn prepare(
        &self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<u32>,
    ) -> Result<Box<dyn Statement>, SqlMapperError> {
        let mut statement = connection
            .prepare(self.context.bound_sql.sql())
            .await
            .map_err(|e| self.context.describe_failure("preparing", e))?;
        self.context
            .apply_timeout(statement.as_mut(), transaction_timeout);
        Ok(statement)
    }

    fn parameterize(&self, statement: &mut dyn Statement) -> Result<(), SqlMapperError> {
        self.context.parameter_handler().set_parameters(statement)
    }

    fn batch(&self, statement: &mut dyn Statement) -> Result<(), SqlMapperError> {
        statement.add_batch()
    }

    async fn update(&self, statement: &mut dyn Statement) -> Result<i64, SqlMapperError> {
        statement
            .execute_update()
            .await
            .map_err(|e| self.context.describe_failure("executing", e))
    }

    async fn query(
        &self,
        statement: &mut dyn Statement,
        result_handler: Option<&mut (dyn ResultHandler + Send)>,
    ) -> Result<Vec<CustomDbRow>, SqlMapperError> {
        let result_set = statement
            .execute_query()
            .await
            .map_err(|e| self.context.describe_failure("querying", e))?;
        self.context.handle_result_set(result_set, result_handler)
    }

    fn bound_sql(&self) -> &BoundSql {
        &self.context.bound_sql
    }
}
