//! Postgres-backed stores: rows from the `db` crate mapped to domain types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::{CustomerRow, ExecutionRow, ExecutionUpdate, SequenceRow};
use db::repository::{customers, executions, sequences};
use db::{DbError, DbPool};
use serde_json::Value;
use uuid::Uuid;

use super::{
    CustomerCriteria, CustomerDirectory, ExecutionChange, ExecutionFilter, ExecutionStore, SequenceStore, StepGuard,
};
use crate::{Customer, ExecutionRecord, SequenceDefinition, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn clamp_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn clamp_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn decode<T: serde::de::DeserializeOwned>(entity: &'static str, id: Uuid, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Decode { entity, id, message: e.to_string() })
}

fn encode<T: serde::Serialize>(entity: &'static str, id: Uuid, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Decode { entity, id, message: e.to_string() })
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn sequence_from_row(row: SequenceRow) -> Result<SequenceDefinition, StoreError> {
    let trigger_type = row
        .trigger_type
        .parse()
        .map_err(|message| StoreError::Decode { entity: "sequence", id: row.id, message })?;
    Ok(SequenceDefinition {
        id: row.id,
        name: row.name,
        trigger_type,
        steps: decode("sequence", row.id, row.steps)?,
        version: u32::try_from(row.version).unwrap_or(1),
        active: row.active,
        created_at: row.created_at,
    })
}

fn execution_from_row(row: ExecutionRow) -> Result<ExecutionRecord, StoreError> {
    let status = row
        .status
        .parse()
        .map_err(|message| StoreError::Decode { entity: "execution", id: row.id, message })?;
    Ok(ExecutionRecord {
        id: row.id,
        sequence_id: row.sequence_id,
        customer_id: row.customer_id,
        current_step: u32::try_from(row.current_step).unwrap_or(0),
        step_attempts: u32::try_from(row.step_attempts).unwrap_or(0),
        status,
        steps: decode("execution", row.id, row.steps)?,
        execution_data: decode("execution", row.id, row.execution_data)?,
        started_at: row.started_at,
        completed_at: row.completed_at,
        failed_at: row.failed_at,
        failure_reason: row.failure_reason,
    })
}

fn execution_to_row(r: &ExecutionRecord) -> Result<ExecutionRow, StoreError> {
    Ok(ExecutionRow {
        id: r.id,
        sequence_id: r.sequence_id,
        customer_id: r.customer_id,
        current_step: clamp_i32(r.current_step),
        step_attempts: clamp_i32(r.step_attempts),
        status: r.status.as_str().to_string(),
        steps: encode("execution", r.id, &r.steps)?,
        execution_data: encode("execution", r.id, &r.execution_data)?,
        started_at: r.started_at,
        completed_at: r.completed_at,
        failed_at: r.failed_at,
        failure_reason: r.failure_reason.clone(),
    })
}

fn customer_from_row(row: CustomerRow) -> Customer {
    let attributes = match row.attributes {
        Value::Object(map) => map.into_iter().collect(),
        _ => Default::default(),
    };
    Customer {
        id: row.id,
        name: row.name,
        phone: row.phone,
        email: row.email,
        tags: row.tags,
        attributes,
        created_at: row.created_at,
        last_activity_at: row.last_activity_at,
    }
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

#[async_trait]
impl SequenceStore for PgStore {
    async fn create_sequence(&self, s: &SequenceDefinition) -> Result<(), StoreError> {
        let row = SequenceRow {
            id: s.id,
            name: s.name.clone(),
            trigger_type: s.trigger_type.as_str().to_string(),
            steps: encode("sequence", s.id, &s.steps)?,
            version: clamp_i32(s.version),
            active: s.active,
            created_at: s.created_at,
        };
        sequences::create_sequence(&self.pool, &row).await?;
        Ok(())
    }

    async fn get_sequence(&self, id: Uuid) -> Result<Option<SequenceDefinition>, StoreError> {
        match sequences::get_sequence(&self.pool, id).await {
            Ok(row) => sequence_from_row(row).map(Some),
            Err(DbError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_sequences(&self) -> Result<Vec<SequenceDefinition>, StoreError> {
        sequences::list_sequences(&self.pool)
            .await?
            .into_iter()
            .map(sequence_from_row)
            .collect()
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool, StoreError> {
        match sequences::set_active(&self.pool, id, active).await {
            Ok(()) => Ok(true),
            Err(DbError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn create_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        executions::create_execution(&self.pool, &execution_to_row(record)?).await?;
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRecord>, StoreError> {
        executions::get_execution(&self.pool, id).await?.map(execution_from_row).transpose()
    }

    async fn find_active(&self, sequence_id: Uuid, customer_id: Uuid) -> Result<Option<ExecutionRecord>, StoreError> {
        executions::find_active(&self.pool, sequence_id, customer_id)
            .await?
            .map(execution_from_row)
            .transpose()
    }

    async fn commit(
        &self,
        id: Uuid,
        guard: StepGuard,
        change: ExecutionChange,
    ) -> Result<Option<ExecutionRecord>, StoreError> {
        let update = ExecutionUpdate {
            current_step: clamp_i32(change.current_step),
            step_attempts: clamp_i32(change.step_attempts),
            status: change.status.as_str().to_string(),
            append: encode("execution", id, &change.append)?,
            completed_at: change.completed_at,
            failed_at: change.failed_at,
            failure_reason: change.failure_reason,
        };
        executions::compare_and_swap(
            &self.pool,
            id,
            clamp_i32(guard.current_step),
            clamp_i32(guard.step_attempts),
            &update,
        )
        .await?
        .map(execution_from_row)
        .transpose()
    }

    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionRecord>, StoreError> {
        executions::list_executions(
            &self.pool,
            filter.sequence_id,
            filter.status.map(|s| s.as_str()),
            clamp_i64(filter.limit),
        )
        .await?
        .into_iter()
        .map(execution_from_row)
        .collect()
    }

    async fn prune_finished(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(executions::soft_delete_finished_before(&self.pool, before).await?)
    }
}

#[async_trait]
impl CustomerDirectory for PgStore {
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, StoreError> {
        Ok(customers::get_customer(&self.pool, id).await?.map(customer_from_row))
    }

    async fn find_customers(&self, criteria: &CustomerCriteria) -> Result<Vec<Customer>, StoreError> {
        let query = customers::CustomerQuery {
            ids: criteria.ids.clone(),
            created_after: criteria.created_after,
            inactive_since: criteria.inactive_since,
            tags: criteria.tags.clone(),
            limit: clamp_i64(criteria.limit),
        };
        Ok(customers::find_customers(&self.pool, &query)
            .await?
            .into_iter()
            .map(customer_from_row)
            .collect())
    }
}
