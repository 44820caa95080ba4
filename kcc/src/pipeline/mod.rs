/*!
Stage pipeline.

Each tick the pipeline gathers processors from four sources, in order:
settings processors, agent-local processors, modifiers and collisions. The
list is stably sorted by descending priority and cached; every stage then runs
over a copy of the cache so processors can suppress pending entries without
disturbing the cache.

Notes
- A fault in one processor is logged and the stage continues with the next.
- Introspection and suppression are only valid while a stage is running.
- `Stay` and `Interpolate` ignore a processor's valid-stage mask.
*/

pub mod processor;

pub use processor::{
    Processor, ProcessorAny, ProcessorRef, ProcessorResult, Stage, StageMask, all_stages,
    is_processor, same_processor,
};

use crate::{
    error::KccError,
    query::{ColliderId, ObjectId},
    settings::{Feature, FeatureMask, Settings},
    state::{AgentState, Collision, Modifier},
};

#[derive(Debug)]
pub struct ProcessorPipeline {
    cached: Vec<Option<ProcessorRef>>,
    cached_stages: Vec<StageMask>,
    slots: Vec<Option<ProcessorRef>>,
    stage_index: usize,
    active_stage: Option<Stage>,
    active_features: FeatureMask,
}

impl Default for ProcessorPipeline {
    fn default() -> Self {
        Self {
            cached: Vec::new(),
            cached_stages: Vec::new(),
            slots: Vec::new(),
            stage_index: 0,
            active_stage: None,
            active_features: FeatureMask::empty(),
        }
    }
}

impl ProcessorPipeline {
    #[inline]
    pub fn active_stage(&self) -> Option<Stage> {
        self.active_stage
    }

    #[inline]
    pub fn active_features(&self) -> FeatureMask {
        self.active_features
    }

    #[inline]
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.active_features.has(feature)
    }

    pub(crate) fn reset_features(&mut self, features: FeatureMask) {
        self.active_features = features;
    }

    pub(crate) fn clear_active_stage(&mut self) {
        self.active_stage = None;
        self.slots.clear();
    }

    /// Cached processors in execution order.
    pub fn processors(&self) -> impl Iterator<Item = &ProcessorRef> {
        self.cached.iter().flatten()
    }

    pub fn clear(&mut self) {
        self.cached.clear();
        self.cached_stages.clear();
        self.slots.clear();
        self.stage_index = 0;
        self.active_stage = None;
    }

    /// Gathers and sorts the per-tick processor list.
    pub fn cache(&mut self, settings: &Settings, local: &[ProcessorRef], data: &AgentState) {
        self.cached.clear();
        self.cached_stages.clear();

        let modifiers = data.modifiers.iter().filter_map(|m| m.processor.as_ref());
        let collisions = data.collisions.iter().filter_map(|c| c.processor.as_ref());
        self.cached.extend(
            settings
                .processors
                .iter()
                .chain(local)
                .chain(modifiers)
                .chain(collisions)
                .cloned()
                .map(Some),
        );

        sort_by_priority(&mut self.cached);

        self.cached_stages.extend(
            self.cached
                .iter()
                .map(|p| p.as_ref().map_or(StageMask::empty(), |p| p.valid_stages(data))),
        );
    }

    /// Runs one stage over the cached processors.
    pub fn process_stage(
        &mut self,
        stage: Stage,
        data: &mut AgentState,
        settings: &Settings,
        is_in_fixed_update: bool,
    ) {
        self.active_stage = Some(stage);
        self.slots.clear();
        self.slots.extend(self.cached.iter().cloned());

        for index in 0..self.slots.len() {
            self.stage_index = index;

            if !stage.ignores_valid_stages() && !self.cached_stages[index].has(stage) {
                continue;
            }
            let Some(processor) = self.slots[index].clone() else {
                continue;
            };

            let mut ctx = StageContext {
                data: &mut *data,
                settings,
                is_in_fixed_update,
                pipeline: &mut *self,
            };
            if let Err(err) = processor::invoke(&*processor, stage, &mut ctx) {
                log::error!(
                    "{} failed in {:?}: {}",
                    (*processor).type_name(),
                    stage,
                    err
                );
            }
        }

        self.clear_active_stage();
    }

    // --- Introspection ---

    pub fn has_pending(&self, processor: &ProcessorRef) -> Result<bool, KccError> {
        Ok(self.pending()?.iter().flatten().any(|p| same_processor(p, processor)))
    }

    pub fn has_pending_type<T: Processor>(&self) -> Result<bool, KccError> {
        Ok(self.pending()?.iter().flatten().any(|p| is_processor::<T>(&**p)))
    }

    /// Includes the processor currently running.
    pub fn has_executed(&self, processor: &ProcessorRef) -> Result<bool, KccError> {
        Ok(self.executed()?.iter().flatten().any(|p| same_processor(p, processor)))
    }

    pub fn has_executed_type<T: Processor>(&self) -> Result<bool, KccError> {
        Ok(self.executed()?.iter().flatten().any(|p| is_processor::<T>(&**p)))
    }

    /// Removes the first pending occurrence of `processor` from the current stage.
    pub fn suppress(&mut self, processor: &ProcessorRef) -> Result<bool, KccError> {
        let start = self.pending_start()?;
        let slot = self.slots[start..]
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|p| same_processor(p, processor)));
        Ok(slot.map(|slot| slot.take()).is_some())
    }

    /// Removes every pending processor of type `T`. Returns how many were removed.
    pub fn suppress_type<T: Processor>(&mut self) -> Result<usize, KccError> {
        let start = self.pending_start()?;
        let mut count = 0;
        for slot in &mut self.slots[start..] {
            if slot.as_ref().is_some_and(|p| is_processor::<T>(&**p)) {
                *slot = None;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Disables a feature for the rest of the tick.
    pub fn suppress_feature(&mut self, feature: Feature) -> Result<(), KccError> {
        if self.active_stage != Some(Stage::SetInputProperties) {
            return Err(KccError::FeatureSuppressionOutsideInput(self.active_stage));
        }
        self.active_features.remove(feature);
        Ok(())
    }

    /// Replaces the feature set for the rest of the tick.
    pub fn set_active_features(&mut self, features: FeatureMask) -> Result<(), KccError> {
        if self.active_stage != Some(Stage::SetInputProperties) {
            return Err(KccError::FeatureSuppressionOutsideInput(self.active_stage));
        }
        self.active_features = features;
        Ok(())
    }

    fn pending_start(&self) -> Result<usize, KccError> {
        if self.active_stage.is_none() {
            return Err(KccError::NoActiveStage);
        }
        Ok((self.stage_index + 1).min(self.slots.len()))
    }

    fn pending(&self) -> Result<&[Option<ProcessorRef>], KccError> {
        let start = self.pending_start()?;
        Ok(&self.slots[start..])
    }

    fn executed(&self) -> Result<&[Option<ProcessorRef>], KccError> {
        let start = self.pending_start()?;
        Ok(&self.slots[..start])
    }

    // --- Attach / detach ---

    pub(crate) fn on_processor_added(&mut self, processor: &ProcessorRef, data: &mut AgentState) {
        if let Err(err) = processor.enter(data) {
            log::error!("{} failed on enter: {}", (**processor).type_name(), err);
        }
    }

    /// Suppresses the processor in a running stage and drops it from the cache
    /// before calling `exit`.
    pub(crate) fn on_processor_removed(&mut self, processor: &ProcessorRef, data: &mut AgentState) {
        if self.active_stage.is_some() {
            let _ = self.suppress(processor);
        }
        if let Some(slot) = self
            .cached
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|p| same_processor(p, processor)))
        {
            *slot = None;
        }
        if let Err(err) = processor.exit(data) {
            log::error!("{} failed on exit: {}", (**processor).type_name(), err);
        }
    }

    /// Registers a modifier once per object. Returns `false` if already present.
    pub fn add_modifier(
        &mut self,
        data: &mut AgentState,
        object: ObjectId,
        processor: Option<ProcessorRef>,
    ) -> bool {
        if data.has_modifier(object) {
            return false;
        }
        data.modifiers.push(Modifier {
            object,
            processor: processor.clone(),
        });
        if let Some(processor) = processor {
            self.on_processor_added(&processor, data);
        }
        true
    }

    pub fn remove_modifier(&mut self, data: &mut AgentState, object: ObjectId) -> bool {
        let Some(index) = data.modifiers.iter().position(|m| m.object == object) else {
            return false;
        };
        if let Some(processor) = data.modifiers[index].processor.clone() {
            self.on_processor_removed(&processor, data);
        }
        // exit may have mutated the list
        if let Some(index) = data.modifiers.iter().position(|m| m.object == object) {
            data.modifiers.remove(index);
        }
        true
    }

    /// Removes modifiers from the last element, firing exits.
    pub fn remove_all_modifiers(&mut self, data: &mut AgentState) {
        while let Some(modifier) = data.modifiers.last() {
            let object = modifier.object;
            self.remove_modifier(data, object);
        }
    }

    pub(crate) fn add_collision(&mut self, data: &mut AgentState, collision: Collision) {
        let processor = collision.processor.clone();
        data.collisions.push(collision);
        if let Some(processor) = processor {
            self.on_processor_added(&processor, data);
        }
    }

    pub(crate) fn remove_collision(&mut self, data: &mut AgentState, collider: ColliderId) {
        let Some(index) = data.collisions.iter().position(|c| c.collider == collider) else {
            return;
        };
        if let Some(processor) = data.collisions[index].processor.clone() {
            self.on_processor_removed(&processor, data);
        }
        if let Some(index) = data.collisions.iter().position(|c| c.collider == collider) {
            data.collisions.remove(index);
        }
    }
}

/// Stable descending sort. Equal priorities keep gathering order.
fn sort_by_priority(processors: &mut [Option<ProcessorRef>]) {
    let priority = |p: &Option<ProcessorRef>| p.as_ref().map_or(f32::MIN, |p| p.priority());
    let count = processors.len();
    for i in 0..count {
        let mut swapped = false;
        for j in 0..count.saturating_sub(i + 1) {
            if priority(&processors[j]) < priority(&processors[j + 1]) {
                processors.swap(j, j + 1);
                swapped = true;
            }
        }
        if !swapped {
            break;
        }
    }
}

/// What a processor sees while a stage runs.
pub struct StageContext<'a> {
    pub data: &'a mut AgentState,
    pub settings: &'a Settings,
    pub is_in_fixed_update: bool,
    pipeline: &'a mut ProcessorPipeline,
}

impl StageContext<'_> {
    #[inline]
    pub fn stage(&self) -> Option<Stage> {
        self.pipeline.active_stage
    }

    #[inline]
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.pipeline.has_feature(feature)
    }

    pub fn has_pending(&self, processor: &ProcessorRef) -> Result<bool, KccError> {
        self.pipeline.has_pending(processor)
    }

    pub fn has_pending_type<T: Processor>(&self) -> Result<bool, KccError> {
        self.pipeline.has_pending_type::<T>()
    }

    pub fn has_executed(&self, processor: &ProcessorRef) -> Result<bool, KccError> {
        self.pipeline.has_executed(processor)
    }

    pub fn has_executed_type<T: Processor>(&self) -> Result<bool, KccError> {
        self.pipeline.has_executed_type::<T>()
    }

    pub fn suppress(&mut self, processor: &ProcessorRef) -> Result<bool, KccError> {
        self.pipeline.suppress(processor)
    }

    pub fn suppress_type<T: Processor>(&mut self) -> Result<usize, KccError> {
        self.pipeline.suppress_type::<T>()
    }

    pub fn suppress_feature(&mut self, feature: Feature) -> Result<(), KccError> {
        self.pipeline.suppress_feature(feature)
    }

    pub fn set_active_features(&mut self, features: FeatureMask) -> Result<(), KccError> {
        self.pipeline.set_active_features(features)
    }

    /// The new processor joins the cache on the next tick.
    pub fn add_modifier(&mut self, object: ObjectId, processor: Option<ProcessorRef>) -> bool {
        self.pipeline.add_modifier(self.data, object, processor)
    }

    /// Also suppresses the modifier's processor for the rest of this stage.
    pub fn remove_modifier(&mut self, object: ObjectId) -> bool {
        self.pipeline.remove_modifier(self.data, object)
    }
}
