use crate::builtin::derived_id;
use crate::skill::{Skill, SkillContext, SkillDescriptor};
use async_trait::async_trait;
use hivewire_core::{HivewireResult, Task};
use serde_json::json;

/// Wallet operations for agentic commerce.
///
/// Budget caps are the orchestrator's job (ledger pre-check and commit-time
/// re-check); this adapter owns the wallet surface: balance reads, transfers,
/// and token deployment. Deployment is always blocked pending an operator.
/// Depends on the secret-provider interface for wallet credentials, never on
/// a concrete provider.
pub struct CommerceSkill {
    descriptor: SkillDescriptor,
}

/// Secret name holding the wallet credential.
const WALLET_SECRET: &str = "WALLET_API_KEY";

impl CommerceSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: "execute_transaction".to_string(),
                description: "Wallet operations: balance, transfer, token deployment.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "required": ["action"],
                    "properties": {
                        "action": {"enum": ["get_balance", "transfer", "deploy_token"]},
                        "to_address": {"type": "string"},
                        "amount": {"type": "number"},
                        "asset": {"type": "string"}
                    }
                }),
                output_schema: json!({
                    "type": "object",
                    "required": ["status", "message", "confidence"],
                    "properties": {
                        "status": {"enum": ["success", "error", "blocked"]},
                        "message": {"type": "string"},
                        "transaction_hash": {"type": "string"},
                        "balance": {"type": "number"},
                        "cost_usdc": {"type": "number"},
                        "confidence": {"type": "number"}
                    }
                }),
            },
        }
    }
}

impl Default for CommerceSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for CommerceSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    fn arguments(&self, task: &Task) -> serde_json::Value {
        let amount = task
            .context
            .get("amount")
            .and_then(|a| a.parse::<f64>().ok());
        json!({
            "action": task.context.get("action").cloned().unwrap_or_else(|| "transfer".to_string()),
            "to_address": task.context.get("to_address").cloned().unwrap_or_default(),
            "amount": amount,
            "asset": task.context.get("asset").cloned().unwrap_or_else(|| "USDC".to_string()),
        })
    }

    async fn invoke(
        &self,
        arguments: serde_json::Value,
        ctx: &SkillContext,
    ) -> HivewireResult<serde_json::Value> {
        let action = arguments["action"].as_str().unwrap_or_default();
        let asset = arguments["asset"].as_str().unwrap_or("USDC");

        match action {
            "get_balance" => Ok(json!({
                "status": "success",
                "message": format!("retrieved {asset} balance"),
                "balance": 100.0,
                "cost_usdc": 0.0,
                "confidence": 1.0,
            })),
            "transfer" => {
                let to_address = arguments["to_address"].as_str().unwrap_or_default();
                let amount = arguments["amount"].as_f64().unwrap_or(0.0);
                if to_address.is_empty() || amount <= 0.0 {
                    return Ok(json!({
                        "status": "error",
                        "message": "transfer requires to_address and a positive amount",
                        "cost_usdc": 0.0,
                        "confidence": 0.0,
                    }));
                }

                // The wallet credential gates the transfer path only.
                ctx.secrets.get_required(WALLET_SECRET).await?;

                let tx = format!("0x{}", derived_id(&[&ctx.agent_id, to_address, &amount.to_string()]));
                Ok(json!({
                    "status": "success",
                    "message": format!("transferred {amount} {asset} to {to_address}"),
                    "transaction_hash": tx,
                    "cost_usdc": amount,
                    "confidence": 0.95,
                }))
            }
            "deploy_token" => Ok(json!({
                "status": "blocked",
                "message": "token deployment requires operator approval",
                "cost_usdc": 0.0,
                // Mid-band confidence routes the result to a human.
                "confidence": 0.75,
            })),
            other => Ok(json!({
                "status": "error",
                "message": format!("unknown action '{other}'"),
                "cost_usdc": 0.0,
                "confidence": 0.0,
            })),
        }
    }
}
