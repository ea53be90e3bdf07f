//! Deterministic builtin skill adapters.
//!
//! Production deployments swap these for transports to real collaborators
//! (model inference, social publishing, wallet RPC); the contracts are
//! identical, which is what the pipeline tests exercise.

mod commerce;
mod content;
mod post;
mod reply;
mod trends;

pub use commerce::CommerceSkill;
pub use content::GenerateContentSkill;
pub use post::PostContentSkill;
pub use reply::ReplyCommentSkill;
pub use trends::AnalyzeTrendsSkill;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Stable-ish identifier derived from invocation inputs, for post ids and
/// transaction hashes in the deterministic adapters.
pub(crate) fn derived_id(parts: &[&str]) -> String {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}
