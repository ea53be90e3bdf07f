use crate::skill::{Skill, SkillContext, SkillDescriptor};
use async_trait::async_trait;
use hivewire_core::{HivewireResult, Task};
use serde_json::json;

/// Drafts a reply to an audience comment.
pub struct ReplyCommentSkill {
    descriptor: SkillDescriptor,
}

impl ReplyCommentSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: "reply_comment".to_string(),
                description: "Draft a reply to an audience comment.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "required": ["goal"],
                    "properties": {
                        "goal": {"type": "string"},
                        "comment": {"type": "string"},
                        "persona": {"type": "string"}
                    }
                }),
                output_schema: json!({
                    "type": "object",
                    "required": ["reply_text", "confidence"],
                    "properties": {
                        "reply_text": {"type": "string"},
                        "confidence": {"type": "number"}
                    }
                }),
            },
        }
    }
}

impl Default for ReplyCommentSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for ReplyCommentSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn arguments(&self, task: &Task) -> serde_json::Value {
        json!({
            "goal": task.goal_description,
            "comment": task.context.get("comment").cloned().unwrap_or_default(),
            "persona": task.context.get("persona").cloned().unwrap_or_default(),
        })
    }

    async fn invoke(
        &self,
        arguments: serde_json::Value,
        _ctx: &SkillContext,
    ) -> HivewireResult<serde_json::Value> {
        let goal = arguments["goal"].as_str().unwrap_or_default();
        let comment = arguments["comment"].as_str().unwrap_or_default();

        let reply_text = if comment.is_empty() {
            format!("Thanks for following along — more on {goal} soon.")
        } else {
            format!("Appreciate the note on \"{comment}\" — more on {goal} soon.")
        };

        Ok(json!({
            "reply_text": reply_text,
            "confidence": 0.88,
        }))
    }
}
