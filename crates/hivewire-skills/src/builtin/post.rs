use crate::builtin::derived_id;
use crate::skill::{Skill, SkillContext, SkillDescriptor};
use async_trait::async_trait;
use hivewire_core::{HivewireResult, Task};
use serde_json::json;

/// Publishes copy to a social platform. The real collaborator is the
/// platform's publishing API; this adapter mints deterministic post ids.
pub struct PostContentSkill {
    descriptor: SkillDescriptor,
}

impl PostContentSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: "post_content".to_string(),
                description: "Publish content to a social platform.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "required": ["platform", "text_content"],
                    "properties": {
                        "platform": {"type": "string"},
                        "text_content": {"type": "string"},
                        "media_urls": {"type": "array", "items": {"type": "string"}},
                        "disclosure_level": {"type": "string"}
                    }
                }),
                output_schema: json!({
                    "type": "object",
                    "required": ["status", "post_id", "url", "confidence"],
                    "properties": {
                        "status": {"enum": ["success", "error"]},
                        "post_id": {"type": "string"},
                        "url": {"type": "string"},
                        "confidence": {"type": "number"}
                    }
                }),
            },
        }
    }
}

impl Default for PostContentSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for PostContentSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn arguments(&self, task: &Task) -> serde_json::Value {
        json!({
            "platform": task.context.get("platform").cloned().unwrap_or_else(|| "twitter".to_string()),
            "text_content": task.context.get("content").cloned().unwrap_or_else(|| task.goal_description.clone()),
            "disclosure_level": task.context.get("disclosure").cloned().unwrap_or_else(|| "automated".to_string()),
        })
    }

    async fn invoke(
        &self,
        arguments: serde_json::Value,
        _ctx: &SkillContext,
    ) -> HivewireResult<serde_json::Value> {
        let platform = arguments["platform"].as_str().unwrap_or("twitter");
        let text = arguments["text_content"].as_str().unwrap_or_default();

        if text.is_empty() {
            return Ok(json!({
                "status": "error",
                "post_id": "",
                "url": "",
                "error_message": "refusing to publish empty content",
                "confidence": 0.0,
            }));
        }

        let post_id = format!("post_{}", derived_id(&[platform, text]));
        Ok(json!({
            "status": "success",
            "post_id": post_id,
            "url": format!("https://{platform}.example/{post_id}"),
            "confidence": 0.97,
        }))
    }
}
