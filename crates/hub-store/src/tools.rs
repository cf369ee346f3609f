//! Tool execution persistence — one row per invocation, status already
//! normalized to `{success, error, timeout}` by the caller
//! (`hub_core::domain::ToolExecutionStatus::normalize`).

use crate::{Store, StoreError};
use hub_core::domain::{ToolExecution, ToolExecutionStatus};
use sqlx::Row;

impl Store {
    pub async fn insert_tool_execution(&self, exec: &ToolExecution) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tool_executions (id, message_id, tool_name, parameters, result, \
             execution_time_ms, status, error) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(exec.id)
        .bind(exec.message_id)
        .bind(&exec.tool_name)
        .bind(&exec.parameters)
        .bind(&exec.result)
        .bind(exec.execution_time_ms as i64)
        .bind(status_str(exec.status))
        .bind(&exec.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn tool_executions_for_message(
        &self,
        message_id: uuid::Uuid,
    ) -> Result<Vec<ToolExecution>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, message_id, tool_name, parameters, result, execution_time_ms, status, error \
             FROM tool_executions WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r: sqlx::postgres::PgRow| {
                let status: String = r.get("status");
                ToolExecution {
                    id: r.get("id"),
                    message_id: r.get("message_id"),
                    tool_name: r.get("tool_name"),
                    parameters: r.get("parameters"),
                    result: r.get("result"),
                    execution_time_ms: r.get::<i64, _>("execution_time_ms") as u64,
                    status: ToolExecutionStatus::normalize(&status),
                    error: r.get("error"),
                }
            })
            .collect())
    }
}

fn status_str(status: ToolExecutionStatus) -> &'static str {
    match status {
        ToolExecutionStatus::Success => "success",
        ToolExecutionStatus::Error => "error",
        ToolExecutionStatus::Timeout => "timeout",
    }
}
