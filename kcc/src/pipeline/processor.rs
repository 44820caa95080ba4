//! Processor callback interface.
//!
//! A processor is a set of callbacks invoked at named stages of a tick. Every
//! callback has an empty default, so implementors override only what they use.

use std::{any::Any, fmt, rc::Rc};

use crate::{
    bitmask_flags::BitmaskFlags, define_bitmask_flags, error::ProcessorError,
    pipeline::StageContext, state::AgentState,
};

define_bitmask_flags!(
    /// Named pipeline stages, in execution order.
    Stage, u16, {
        SetInputProperties,
        SetDynamicVelocity,
        SetKinematicDirection,
        SetKinematicTangent,
        SetKinematicSpeed,
        SetKinematicVelocity,
        ProcessPhysicsQuery,
        Stay,
        Interpolate,
    }
);

pub type StageMask = BitmaskFlags<u16>;

impl Stage {
    /// Stay and Interpolate run for every processor regardless of its valid stages.
    #[inline]
    pub fn ignores_valid_stages(self) -> bool {
        matches!(self, Stage::Stay | Stage::Interpolate)
    }
}

/// Every stage enabled.
pub fn all_stages() -> StageMask {
    StageMask::from_tags(Stage::ALL)
}

pub type ProcessorResult = Result<(), ProcessorError>;

/// Shared handle to a processor. Identity is pointer identity.
pub type ProcessorRef = Rc<dyn Processor>;

/// Type introspection for processors. Implemented for every `'static` type.
pub trait ProcessorAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any> ProcessorAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

pub trait Processor: ProcessorAny {
    /// Higher priority runs first.
    fn priority(&self) -> f32 {
        0.0
    }

    /// Stages this processor runs in for the current tick. Queried once per tick.
    fn valid_stages(&self, _data: &AgentState) -> StageMask {
        all_stages()
    }

    /// Called once when the processor is attached through a Collision or Modifier.
    fn enter(&self, _data: &mut AgentState) -> ProcessorResult {
        Ok(())
    }

    /// Called once when the processor is detached.
    fn exit(&self, _data: &mut AgentState) -> ProcessorResult {
        Ok(())
    }

    fn set_input_properties(&self, _ctx: &mut StageContext<'_>) -> ProcessorResult {
        Ok(())
    }

    fn set_dynamic_velocity(&self, _ctx: &mut StageContext<'_>) -> ProcessorResult {
        Ok(())
    }

    fn set_kinematic_direction(&self, _ctx: &mut StageContext<'_>) -> ProcessorResult {
        Ok(())
    }

    fn set_kinematic_tangent(&self, _ctx: &mut StageContext<'_>) -> ProcessorResult {
        Ok(())
    }

    fn set_kinematic_speed(&self, _ctx: &mut StageContext<'_>) -> ProcessorResult {
        Ok(())
    }

    fn set_kinematic_velocity(&self, _ctx: &mut StageContext<'_>) -> ProcessorResult {
        Ok(())
    }

    /// Runs after every CCD substep's physics query.
    fn process_physics_query(&self, _ctx: &mut StageContext<'_>) -> ProcessorResult {
        Ok(())
    }

    fn stay(&self, _ctx: &mut StageContext<'_>) -> ProcessorResult {
        Ok(())
    }

    /// Render-only smoothing, outside the authoritative tick.
    fn interpolate(&self, _ctx: &mut StageContext<'_>) -> ProcessorResult {
        Ok(())
    }
}

impl fmt::Debug for dyn Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("type", &self.type_name())
            .field("priority", &self.priority())
            .finish()
    }
}

/// Dispatch one stage callback.
pub(crate) fn invoke(
    processor: &dyn Processor,
    stage: Stage,
    ctx: &mut StageContext<'_>,
) -> ProcessorResult {
    match stage {
        Stage::SetInputProperties => processor.set_input_properties(ctx),
        Stage::SetDynamicVelocity => processor.set_dynamic_velocity(ctx),
        Stage::SetKinematicDirection => processor.set_kinematic_direction(ctx),
        Stage::SetKinematicTangent => processor.set_kinematic_tangent(ctx),
        Stage::SetKinematicSpeed => processor.set_kinematic_speed(ctx),
        Stage::SetKinematicVelocity => processor.set_kinematic_velocity(ctx),
        Stage::ProcessPhysicsQuery => processor.process_physics_query(ctx),
        Stage::Stay => processor.stay(ctx),
        Stage::Interpolate => processor.interpolate(ctx),
    }
}

/// True when `processor` is a `T`.
#[inline]
pub fn is_processor<T: Processor>(processor: &dyn Processor) -> bool {
    processor.as_any().is::<T>()
}

/// Pointer identity, ignoring vtables.
#[inline]
pub fn same_processor(a: &ProcessorRef, b: &ProcessorRef) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
