//! Interaction groups replicated by object id.
//!
//! Each group is one count word followed by `NETWORK_INTERACTION_CAPACITY`
//! object ids. Entries past the capacity are not replicated. Reading
//! reconciles the local list: entries missing from the snapshot are removed,
//! new ids are resolved through the object lookup and added.

use crate::{
    constants::NETWORK_INTERACTION_CAPACITY,
    error::CodecError,
    network::{NetworkContext, NetworkProperty},
    query::ObjectId,
    settings::Settings,
    state::{AgentState, Collision, Ignore},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InteractionKind {
    Collisions,
    Modifiers,
    /// Only ignores with an owner object are replicated.
    Ignores,
}

#[derive(Clone, Debug)]
pub struct InteractionGroup {
    kind: InteractionKind,
}

impl InteractionGroup {
    pub fn new(kind: InteractionKind) -> Self {
        Self { kind }
    }

    #[inline]
    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    fn object_ids(&self, data: &AgentState) -> Vec<ObjectId> {
        match self.kind {
            InteractionKind::Collisions => data.collisions.iter().map(|c| c.object).collect(),
            InteractionKind::Modifiers => data.modifiers.iter().map(|m| m.object).collect(),
            InteractionKind::Ignores => data.ignores.iter().filter_map(|i| i.object).collect(),
        }
    }

    fn decode(words: &[i32]) -> Vec<ObjectId> {
        let count = (words[0].max(0) as usize).min(NETWORK_INTERACTION_CAPACITY);
        words[1..=count]
            .iter()
            .map(|&word| ObjectId(word as u32))
            .collect()
    }

    fn reconcile(&self, ctx: &mut NetworkContext<'_>, ids: &[ObjectId]) {
        match self.kind {
            InteractionKind::Collisions => reconcile_collisions(ctx, ids),
            InteractionKind::Modifiers => reconcile_modifiers(ctx, ids),
            InteractionKind::Ignores => reconcile_ignores(ctx, ids),
        }
    }
}

impl NetworkProperty for InteractionGroup {
    fn word_count(&self) -> usize {
        1 + NETWORK_INTERACTION_CAPACITY
    }

    fn write(&self, data: &AgentState, _settings: &Settings, words: &mut [i32]) {
        let ids = self.object_ids(data);
        let count = ids.len().min(NETWORK_INTERACTION_CAPACITY);
        if ids.len() > count {
            log::debug!("{:?}: {} entries not replicated", self.kind, ids.len() - count);
        }

        words.fill(0);
        words[0] = count as i32;
        for (word, id) in words[1..].iter_mut().zip(&ids[..count]) {
            *word = id.0 as i32;
        }
    }

    fn read(&self, ctx: &mut NetworkContext<'_>, words: &[i32]) -> Result<(), CodecError> {
        let ids = Self::decode(words);
        self.reconcile(ctx, &ids);
        Ok(())
    }

    fn interpolate(
        &self,
        ctx: &mut NetworkContext<'_>,
        from: &[i32],
        to: &[i32],
        alpha: f32,
    ) -> Result<(), CodecError> {
        self.read(ctx, if alpha < 0.5 { from } else { to })
    }
}

fn reconcile_collisions(ctx: &mut NetworkContext<'_>, ids: &[ObjectId]) {
    let stale: Vec<_> = ctx
        .data
        .collisions
        .iter()
        .filter(|c| !ids.contains(&c.object))
        .map(|c| c.collider)
        .collect();
    for collider in stale {
        ctx.pipeline.remove_collision(ctx.data, collider);
    }

    for &id in ids {
        if ctx.data.collisions.iter().any(|c| c.object == id) {
            continue;
        }
        let Some(object) = ctx.objects.find_object(id) else {
            log::warn!("replicated collision with unknown object {:?}", id);
            continue;
        };
        let Some(collider) = object.collider else {
            continue;
        };
        ctx.pipeline.add_collision(
            ctx.data,
            Collision {
                object: id,
                collider,
                processor: object.processor,
            },
        );
    }
}

fn reconcile_modifiers(ctx: &mut NetworkContext<'_>, ids: &[ObjectId]) {
    let stale: Vec<_> = ctx
        .data
        .modifiers
        .iter()
        .filter(|m| !ids.contains(&m.object))
        .map(|m| m.object)
        .collect();
    for object in stale {
        ctx.pipeline.remove_modifier(ctx.data, object);
    }

    for &id in ids {
        if ctx.data.has_modifier(id) {
            continue;
        }
        let Some(object) = ctx.objects.find_object(id) else {
            log::warn!("replicated modifier with unknown object {:?}", id);
            continue;
        };
        ctx.pipeline.add_modifier(ctx.data, id, object.processor);
    }
}

fn reconcile_ignores(ctx: &mut NetworkContext<'_>, ids: &[ObjectId]) {
    ctx.data
        .ignores
        .retain(|i| i.object.is_none_or(|object| ids.contains(&object)));

    for &id in ids {
        if ctx.data.ignores.iter().any(|i| i.object == Some(id)) {
            continue;
        }
        let Some(collider) = ctx.objects.find_object(id).and_then(|o| o.collider) else {
            log::warn!("replicated ignore of unknown object {:?}", id);
            continue;
        };
        ctx.data.add_ignore(Ignore {
            object: Some(id),
            collider,
        });
    }
}
