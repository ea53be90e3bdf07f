use crate::skill::{Skill, SkillContext, SkillDescriptor};
use async_trait::async_trait;
use hivewire_core::{HivewireResult, Task};
use serde_json::json;

/// Drafts post copy for a goal under persona constraints. The real
/// collaborator is a model-inference endpoint.
pub struct GenerateContentSkill {
    descriptor: SkillDescriptor,
}

impl GenerateContentSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: "generate_content".to_string(),
                description: "Generate platform copy for a campaign goal.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "required": ["goal"],
                    "properties": {
                        "goal": {"type": "string"},
                        "persona": {"type": "string"},
                        "platform": {"type": "string"}
                    }
                }),
                output_schema: json!({
                    "type": "object",
                    "required": ["content", "platform", "confidence"],
                    "properties": {
                        "content": {"type": "string"},
                        "platform": {"type": "string"},
                        "confidence": {"type": "number"}
                    }
                }),
            },
        }
    }
}

impl Default for GenerateContentSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for GenerateContentSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn arguments(&self, task: &Task) -> serde_json::Value {
        json!({
            "goal": task.goal_description,
            "persona": task.context.get("persona").cloned().unwrap_or_default(),
            "platform": task.context.get("platform").cloned().unwrap_or_else(|| "twitter".to_string()),
        })
    }

    async fn invoke(
        &self,
        arguments: serde_json::Value,
        _ctx: &SkillContext,
    ) -> HivewireResult<serde_json::Value> {
        let goal = arguments["goal"].as_str().unwrap_or_default();
        let persona = arguments["persona"].as_str().unwrap_or_default();
        let platform = arguments["platform"].as_str().unwrap_or("twitter");

        let content = if persona.is_empty() {
            format!("Fresh take: {goal}")
        } else {
            format!("Fresh take ({persona}): {goal}")
        };

        Ok(json!({
            "content": content,
            "platform": platform,
            "confidence": 0.92,
        }))
    }
}
