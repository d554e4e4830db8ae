use async_trait::async_trait;
use tracing::debug;

use super::{HandlerContext, StatementHandler};
use crate::driver::{Connection, Statement};
use crate::error::SqlMapperError;
use crate::executor::result_handler::ResultHandler;
use crate::mapping::BoundSql;
use crate::results::CustomDbRow;

/// Stored-procedure calls. OUT and INOUT slots are registered with the driver while
/// binding; their values are not copied back into the parameter object.
pub struct CallableStatementHandler<'a> {
    context: HandlerContext<'a>,
}

impl<'a> CallableStatementHandler<'a> {
    pub(crate) fn new(context: HandlerContext<'a>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl StatementHandler for CallableStatementHandler<'_> {
    async fn prepare(
        &self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<u32>,
    ) -> Result<Box<dyn Statement>, SqlMapperError> {
        debug!(statement = self.context.mapped_statement.id(), "preparing call");
        let mut statement = connection
            .prepare_call(self.context.bound_sql.sql())
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
