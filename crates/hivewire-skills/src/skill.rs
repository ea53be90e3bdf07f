use crate::secrets::SecretProvider;
use async_trait::async_trait;
use hivewire_core::{HivewireResult, Task};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Metadata describing a skill's interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-Schema-style object the arguments must satisfy.
    pub input_schema: serde_json::Value,
    /// JSON-Schema-style object the result must satisfy.
    pub output_schema: serde_json::Value,
}

/// Per-invocation context handed to every skill.
#[derive(Clone)]
pub struct SkillContext {
    pub tenant_id: String,
    pub agent_id: String,
    pub secrets: Arc<dyn SecretProvider>,
}

impl SkillContext {
    pub fn new(
        tenant_id: impl Into<String>,
        agent_id: impl Into<String>,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            agent_id: agent_id.into(),
            secrets,
        }
    }
}

/// A handler for one task type.
///
/// Implementations must be pure with respect to the orchestrator: no Store
/// access, no queue access. Whatever the skill needs from the outside world
/// it reaches through its own transport, invisible to the core.
#[async_trait]
pub trait Skill: Send + Sync {
    fn descriptor(&self) -> &SkillDescriptor;

    /// Build the invocation arguments for a task. The default shape carries
    /// the goal and the task context verbatim; skills with richer contracts
    /// override this.
    fn arguments(&self, task: &Task) -> serde_json::Value {
        serde_json::json!({
            "goal": task.goal_description,
            "context": task.context,
        })
    }

    /// Execute the skill. Returns the structured result; transport and
    /// domain failures are errors, never panics.
    async fn invoke(
        &self,
        arguments: serde_json::Value,
        ctx: &SkillContext,
    ) -> HivewireResult<serde_json::Value>;
}
