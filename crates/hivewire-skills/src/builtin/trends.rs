use crate::skill::{Skill, SkillContext, SkillDescriptor};
use async_trait::async_trait;
use hivewire_core::HivewireResult;
use serde_json::json;

/// Trend analysis over the goal text. Surfaces candidate topics with a
/// relevance ladder; the real collaborator queries platform trend feeds.
pub struct AnalyzeTrendsSkill {
    descriptor: SkillDescriptor,
}

impl AnalyzeTrendsSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: "analyze_trends".to_string(),
                description: "Analyze content for trending topics relevant to a goal.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "required": ["goal"],
                    "properties": {
                        "goal": {"type": "string"},
                        "context": {"type": "object"},
                        "max_results": {"type": "integer"}
                    }
                }),
                output_schema: json!({
                    "type": "object",
                    "required": ["status", "trends", "confidence"],
                    "properties": {
                        "status": {"enum": ["success", "error"]},
                        "trends": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["topic", "score", "velocity"],
                                "properties": {
                                    "topic": {"type": "string"},
                                    "score": {"type": "number"},
                                    "velocity": {"enum": ["rising", "stable", "declining"]}
                                }
                            }
                        },
                        "confidence": {"type": "number"}
                    }
                }),
            },
        }
    }
}

impl Default for AnalyzeTrendsSkill {
    fn default() -> Self {
        Self::new()
    }
}

const SCORE_LADDER: [f64; 3] = [0.92, 0.85, 0.78];

#[async_trait]
impl Skill for AnalyzeTrendsSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        arguments: serde_json::Value,
        _ctx: &SkillContext,
    ) -> HivewireResult<serde_json::Value> {
        let goal = arguments["goal"].as_str().unwrap_or_default();

        let mut topics: Vec<String> = Vec::new();
        for token in goal
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| t.len() > 3)
        {
            let topic = token.to_lowercase();
            if !topics.contains(&topic) {
                topics.push(topic);
            }
            if topics.len() == SCORE_LADDER.len() {
                break;
            }
        }

        let trends: Vec<serde_json::Value> = topics
            .iter()
            .zip(SCORE_LADDER)
            .map(|(topic, score)| {
                json!({"topic": topic, "score": score, "velocity": "rising"})
            })
            .collect();

        let confidence = if trends.is_empty() { 0.40 } else { 0.95 };

        Ok(json!({
            "status": "success",
            "trends": trends,
            "confidence": confidence,
            "analysis_metadata": {
                "goal_length": goal.len(),
                "topic_count": topics.len(),
            }
        }))
    }
}
