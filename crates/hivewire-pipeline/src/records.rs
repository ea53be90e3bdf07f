//! Durable entity records in the Store.
//!
//! The Store owns the authoritative copy of every entity; these helpers
//! read and write the typed records behind the keyspace resolver. Queue
//! payloads are treated as transport; the record is what survives.

use hivewire_core::{
    CampaignState, HitlItem, HivewireError, HivewireResult, Task, TaskResult, TenantKeyspace,
};
use hivewire_store::{Store, Versioned, WriteOp};
use serde::de::DeserializeOwned;
use std::sync::Arc;

fn decode<T: DeserializeOwned>(versioned: Versioned) -> HivewireResult<T> {
    Ok(serde_json::from_value(versioned.value)?)
}

pub async fn load_task(
    store: &Arc<dyn Store>,
    ks: &TenantKeyspace,
    task_id: &str,
) -> HivewireResult<Option<Task>> {
    Ok(match store.get(&ks.task(task_id)).await? {
        Some(v) => Some(decode(v)?),
        None => None,
    })
}

pub async fn require_task(
    store: &Arc<dyn Store>,
    ks: &TenantKeyspace,
    task_id: &str,
) -> HivewireResult<Task> {
    load_task(store, ks, task_id)
        .await?
        .ok_or_else(|| HivewireError::Store(format!("no task record for {task_id}")))
}

pub async fn save_task(
    store: &Arc<dyn Store>,
    ks: &TenantKeyspace,
    task: &Task,
) -> HivewireResult<()> {
    store
        .put(&ks.task(&task.task_id), serde_json::to_value(task)?)
        .await?;
    Ok(())
}

/// Write op for a task record, for folding into atomic batches.
pub fn task_record_op(ks: &TenantKeyspace, task: &Task) -> HivewireResult<WriteOp> {
    Ok(WriteOp::Put {
        key: ks.task(&task.task_id),
        value: serde_json::to_value(task)?,
    })
}

/// A campaign read together with the Store version guarding it.
pub struct CampaignRead {
    pub state: CampaignState,
    pub version: u64,
}

pub async fn load_campaign(
    store: &Arc<dyn Store>,
    ks: &TenantKeyspace,
    campaign_id: &str,
) -> HivewireResult<Option<CampaignRead>> {
    Ok(match store.get(&ks.campaign(campaign_id)).await? {
        Some(versioned) => {
            let version = versioned.version;
            Some(CampaignRead {
                state: decode(versioned)?,
                version,
            })
        }
        None => None,
    })
}

pub async fn load_hitl_item(
    store: &Arc<dyn Store>,
    ks: &TenantKeyspace,
    task_id: &str,
) -> HivewireResult<Option<HitlItem>> {
    Ok(match store.get(&ks.hitl_item(task_id)).await? {
        Some(v) => Some(decode(v)?),
        None => None,
    })
}

pub async fn save_hitl_item(
    store: &Arc<dyn Store>,
    ks: &TenantKeyspace,
    item: &HitlItem,
) -> HivewireResult<()> {
    store
        .put(&ks.hitl_item(&item.task_id), serde_json::to_value(item)?)
        .await?;
    Ok(())
}

pub async fn load_output(
    store: &Arc<dyn Store>,
    ks: &TenantKeyspace,
    task_id: &str,
) -> HivewireResult<Option<TaskResult>> {
    Ok(match store.get(&ks.output(task_id)).await? {
        Some(v) => Some(decode(v)?),
        None => None,
    })
}
