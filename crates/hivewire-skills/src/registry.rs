use crate::builtin;
use crate::schema;
use crate::skill::{Skill, SkillContext, SkillDescriptor};
use hivewire_core::{HivewireError, HivewireResult, Task, TaskType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// What the dispatcher hands back to the Worker: the validated structured
/// output plus the two fields every contract carries.
#[derive(Debug, Clone)]
pub struct SkillOutcome {
    pub output: serde_json::Value,
    pub confidence: f64,
    pub cost_usdc: f64,
}

/// Dispatch table from task type to skill handler.
///
/// The builtin table is fixed at construction; there is no runtime mutation
/// of the mapping once a worker holds it.
pub struct SkillRegistry {
    handlers: HashMap<TaskType, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The full production table: one handler per task type.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(TaskType::AnalyzeTrends, Arc::new(builtin::AnalyzeTrendsSkill::new()));
        registry.register(
            TaskType::GenerateContent,
            Arc::new(builtin::GenerateContentSkill::new()),
        );
        registry.register(TaskType::PostContent, Arc::new(builtin::PostContentSkill::new()));
        registry.register(TaskType::ReplyComment, Arc::new(builtin::ReplyCommentSkill::new()));
        registry.register(
            TaskType::ExecuteTransaction,
            Arc::new(builtin::CommerceSkill::new()),
        );
        registry
    }

    pub fn register(&mut self, task_type: TaskType, skill: Arc<dyn Skill>) {
        info!(task_type = %task_type, skill = %skill.descriptor().name, "registered skill");
        self.handlers.insert(task_type, skill);
    }

    pub fn get(&self, task_type: TaskType) -> Option<&Arc<dyn Skill>> {
        self.handlers.get(&task_type)
    }

    pub fn descriptors(&self) -> Vec<&SkillDescriptor> {
        self.handlers.values().map(|s| s.descriptor()).collect()
    }

    /// Resolve a task to its handler and run one schema-checked invocation.
    pub async fn dispatch(&self, task: &Task, ctx: &SkillContext) -> HivewireResult<SkillOutcome> {
        let skill = self
            .handlers
            .get(&task.task_type)
            .ok_or_else(|| HivewireError::UnknownSkill(task.task_type.to_string()))?;
        let descriptor = skill.descriptor();

        let arguments = skill.arguments(task);
        if let Err(detail) = schema::validate(&arguments, &descriptor.input_schema) {
            warn!(skill = %descriptor.name, %detail, "input schema violation");
            return Err(HivewireError::Schema {
                skill: descriptor.name.clone(),
                detail,
            });
        }

        let output = skill.invoke(arguments, ctx).await?;
        if let Err(detail) = schema::validate(&output, &descriptor.output_schema) {
            warn!(skill = %descriptor.name, %detail, "output schema violation");
            return Err(HivewireError::Schema {
                skill: descriptor.name.clone(),
                detail,
            });
        }

        let confidence = output
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let cost_usdc = output
            .get("cost_usdc")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
            .max(0.0);

        Ok(SkillOutcome {
            output,
            confidence,
            cost_usdc,
        })
    }

    /// Uniform capability boundary: invoke a skill by name.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
        ctx: &SkillContext,
    ) -> HivewireResult<serde_json::Value> {
        let skill = self
            .handlers
            .values()
            .find(|s| s.descriptor().name == name)
            .ok_or_else(|| HivewireError::UnknownSkill(name.to_string()))?;
        let descriptor = skill.descriptor();

        if let Err(detail) = schema::validate(&arguments, &descriptor.input_schema) {
            return Err(HivewireError::Schema {
                skill: descriptor.name.clone(),
                detail,
            });
        }
        let output = skill.invoke(arguments, ctx).await?;
        if let Err(detail) = schema::validate(&output, &descriptor.output_schema) {
            return Err(HivewireError::Schema {
                skill: descriptor.name.clone(),
                detail,
            });
        }
        Ok(output)
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
