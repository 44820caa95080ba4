//! Deterministic fixed-tick kinematic character controller.
//!
//! An agent ([`Kcc`]) moves a capsule through a host scene reached via the
//! [`GeometryQuery`] port, runs a priority-ordered processor pipeline every
//! tick, keeps a per-tick history for resimulation and replicates its state
//! as quantized integer words.

pub mod agent;
pub mod bitmask_flags;
pub mod collision;
pub mod constants;
pub mod error;
pub mod history;
pub mod math;
pub mod network;
pub mod pipeline;
pub mod processors;
pub mod query;
pub mod scene;
pub mod settings;
pub mod state;

#[cfg(test)]
mod scenarios;

pub use agent::{Authority, FixedTick, Kcc, KccHooks, RenderTick, UpdatePhase};
pub use error::{CodecError, KccError, ProcessorError};
pub use math::{Quat, Vec3};
pub use network::{InterpolationData, NetworkCodec, NetworkConfig};
pub use pipeline::{Processor, ProcessorRef, Stage, StageContext, StageMask};
pub use processors::EnvironmentProcessor;
pub use query::{
    ColliderId, GeometryQuery, ObjectId, ObjectLookup, Scene, SceneObject, Transform,
    TriggerInteraction,
};
pub use scene::{ColliderDef, ColliderShapeDef, CollisionWorld};
pub use settings::{Feature, FeatureMask, RenderBehavior, Settings, ShapeKind};
pub use state::AgentState;
