//! The skill boundary: how the core reaches external collaborators.
//!
//! A [`Skill`] is a handler for one task type, exposing a name plus JSON
//! input/output schemas, invoked through a uniform `invoke(arguments)`
//! capability. The core neither knows nor cares whether the handler wraps
//! in-process code, subprocess IPC, or network RPC; the builtin adapters
//! here are deterministic in-process stand-ins with production-shaped
//! contracts.
//!
//! Schema validation runs on both sides of every invocation; violations
//! surface as schema errors, never panics.

pub mod builtin;
pub mod registry;
pub mod schema;
pub mod secrets;
pub mod skill;

pub use registry::{SkillOutcome, SkillRegistry};
pub use secrets::{
    provider_from_config, CachedSecretProvider, EnvSecretProvider, SecretProvider,
    StoreKvSecretProvider,
};
pub use skill::{Skill, SkillContext, SkillDescriptor};
