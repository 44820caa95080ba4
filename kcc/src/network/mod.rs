/*!
Network state codec.

An agent's replicated state is a flat buffer of `i32` words. Field groups
(`NetworkProperty`) are registered in a fixed order and each owns a contiguous
run of words; the buffer length is the sum of their word counts.

- quantize:     accuracy quantization of positions and angles
- properties:   core group (position, look rotation, packed settings)
- interactions: ignores, modifiers and collisions by object id
- interpolation: snapshot pair handed to proxies, teleport detection

Notes
- The core group is always registered first; the position sits at word 0.
- Reads reconcile interaction lists through the scene's object lookup and fire
  processor enter/exit through the pipeline.
*/

pub mod interactions;
pub mod interpolation;
pub mod properties;
pub mod quantize;

pub use interactions::{InteractionGroup, InteractionKind};
pub use interpolation::{InterpolationData, is_teleport};
pub use properties::{CORE_WORD_COUNT, CoreProperties, NETWORK_LAYOUT_VERSION};

use crate::{
    error::CodecError,
    math::Vec3,
    pipeline::ProcessorPipeline,
    query::ObjectLookup,
    settings::Settings,
    state::AgentState,
};

/// Quantization accuracies shared by every peer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NetworkConfig {
    /// Meters. Non-positive stores raw floats.
    pub position_accuracy: f32,
    /// Degrees. Non-positive stores raw floats.
    pub rotation_accuracy: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            position_accuracy: 0.001,
            rotation_accuracy: 0.01,
        }
    }
}

/// What a field group may touch while reading or interpolating.
pub struct NetworkContext<'a> {
    pub data: &'a mut AgentState,
    pub settings: &'a mut Settings,
    pub pipeline: &'a mut ProcessorPipeline,
    pub objects: &'a dyn ObjectLookup,
}

/// One replicated field group.
pub trait NetworkProperty {
    fn word_count(&self) -> usize;

    fn write(&self, data: &AgentState, settings: &Settings, words: &mut [i32]);

    fn read(&self, ctx: &mut NetworkContext<'_>, words: &[i32]) -> Result<(), CodecError>;

    /// Blends two snapshots of this group at `alpha`.
    fn interpolate(
        &self,
        ctx: &mut NetworkContext<'_>,
        from: &[i32],
        to: &[i32],
        alpha: f32,
    ) -> Result<(), CodecError>;
}

/// Ordered field groups of one agent.
pub struct NetworkCodec {
    config: NetworkConfig,
    properties: Vec<Box<dyn NetworkProperty>>,
}

impl std::fmt::Debug for NetworkCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkCodec")
            .field("config", &self.config)
            .field("groups", &self.properties.len())
            .field("word_count", &self.word_count())
            .finish()
    }
}

impl Default for NetworkCodec {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl NetworkCodec {
    /// Core properties followed by collisions, modifiers and ignores.
    pub fn new(config: NetworkConfig) -> Self {
        let mut codec = Self {
            config,
            properties: Vec::new(),
        };
        codec.register(Box::new(CoreProperties::new(config)));
        codec.register(Box::new(InteractionGroup::new(InteractionKind::Collisions)));
        codec.register(Box::new(InteractionGroup::new(InteractionKind::Modifiers)));
        codec.register(Box::new(InteractionGroup::new(InteractionKind::Ignores)));
        codec
    }

    #[inline]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Appends a group after the existing ones.
    pub fn register(&mut self, property: Box<dyn NetworkProperty>) {
        self.properties.push(property);
    }

    pub fn word_count(&self) -> usize {
        self.properties.iter().map(|p| p.word_count()).sum()
    }

    fn check(&self, words: &[i32]) -> Result<(), CodecError> {
        let expected = self.word_count();
        if words.len() < expected {
            return Err(CodecError::BufferTooSmall {
                expected,
                actual: words.len(),
            });
        }
        Ok(())
    }

    pub fn write(
        &self,
        data: &AgentState,
        settings: &Settings,
        words: &mut [i32],
    ) -> Result<(), CodecError> {
        self.check(words)?;
        let mut offset = 0;
        for property in &self.properties {
            let count = property.word_count();
            property.write(data, settings, &mut words[offset..offset + count]);
            offset += count;
        }
        Ok(())
    }

    pub fn read(&self, ctx: &mut NetworkContext<'_>, words: &[i32]) -> Result<(), CodecError> {
        self.check(words)?;
        let mut offset = 0;
        for property in &self.properties {
            let count = property.word_count();
            property.read(ctx, &words[offset..offset + count])?;
            offset += count;
        }
        Ok(())
    }

    pub fn interpolate(
        &self,
        ctx: &mut NetworkContext<'_>,
        from: &[i32],
        to: &[i32],
        alpha: f32,
    ) -> Result<(), CodecError> {
        self.check(from)?;
        self.check(to)?;
        let mut offset = 0;
        for property in &self.properties {
            let count = property.word_count();
            let range = offset..offset + count;
            property.interpolate(ctx, &from[range.clone()], &to[range], alpha)?;
            offset += count;
        }
        Ok(())
    }

    /// Decoded target position of a snapshot.
    pub fn position(&self, words: &[i32]) -> Result<Vec3, CodecError> {
        if words.len() < 3 {
            return Err(CodecError::BufferTooSmall {
                expected: 3,
                actual: words.len(),
            });
        }
        Ok(quantize::read_vec3(words, self.config.position_accuracy))
    }

    #[inline]
    pub fn quantized_position(&self, position: Vec3) -> Vec3 {
        quantize::quantized_vec3(position, self.config.position_accuracy)
    }

    #[inline]
    pub fn quantized_rotation(&self, angle: f32) -> f32 {
        quantize::quantized(angle, self.config.rotation_accuracy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::NETWORK_INTERACTION_CAPACITY,
        query::{ColliderId, ObjectId, SceneObject},
        settings::{Feature, RenderBehavior, ShapeKind},
        state::Ignore,
    };

    struct NoObjects;

    impl ObjectLookup for NoObjects {}

    struct Objects;

    impl ObjectLookup for Objects {
        fn find_object(&self, id: ObjectId) -> Option<SceneObject> {
            Some(SceneObject {
                id,
                collider: Some(ColliderId(id.0 + 100)),
                processor: None,
            })
        }
    }

    #[test]
    fn word_count_sums_groups() {
        let codec = NetworkCodec::default();
        assert_eq!(
            codec.word_count(),
            CORE_WORD_COUNT + 3 * (1 + NETWORK_INTERACTION_CAPACITY)
        );
    }

    #[test]
    fn short_buffer_is_rejected() {
        let codec = NetworkCodec::default();
        let mut words = vec![0; 4];
        let err = codec
            .write(&AgentState::default(), &Settings::default(), &mut words)
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::BufferTooSmall {
                expected: codec.word_count(),
                actual: 4
            }
        );
    }

    #[test]
    fn authority_state_reaches_proxy() {
        let codec = NetworkCodec::default();
        let source = AgentState {
            target_position: Vec3::new(1.23456, -2.5, 10.0),
            look_pitch: 12.345,
            look_yaw: -170.0,
            ignores: vec![Ignore {
                object: Some(ObjectId(4)),
                collider: ColliderId(104),
            }],
            ..AgentState::default()
        };
        let source_settings = Settings {
            shape: ShapeKind::Void,
            radius: 0.4,
            collider_layer: 6,
            collision_mask: 0b1010,
            render_behavior: RenderBehavior::Interpolate,
            features: Settings::default().features.without(Feature::StepUp),
            ..Settings::default()
        };

        let mut words = vec![0; codec.word_count()];
        codec.write(&source, &source_settings, &mut words).unwrap();

        let mut data = AgentState::default();
        let mut settings = Settings::default();
        let mut pipeline = ProcessorPipeline::default();
        let mut ctx = NetworkContext {
            data: &mut data,
            settings: &mut settings,
            pipeline: &mut pipeline,
            objects: &Objects,
        };
        codec.read(&mut ctx, &words).unwrap();

        assert!((data.target_position - source.target_position).norm() < 0.001);
        assert!((data.look_pitch - 12.345).abs() <= 0.005 + 1.0e-4);
        assert_eq!(settings.shape, ShapeKind::Void);
        assert_eq!(settings.collider_layer, 6);
        assert_eq!(settings.collision_mask, 0b1010);
        assert_eq!(settings.render_behavior, RenderBehavior::Interpolate);
        assert!(!settings.features.has(Feature::StepUp));
        assert!(settings.features.has(Feature::SnapToGround));
        assert_eq!(settings.radius, 0.4);
        assert!(data.has_ignore(ColliderId(104)));
    }

    #[test]
    fn unknown_layout_version_is_rejected() {
        let codec = NetworkCodec::default();
        let mut words = vec![0; codec.word_count()];
        codec
            .write(&AgentState::default(), &Settings::default(), &mut words)
            .unwrap();
        words[5] ^= 0x7f << 24;

        let mut data = AgentState::default();
        let mut settings = Settings::default();
        let mut pipeline = ProcessorPipeline::default();
        let mut ctx = NetworkContext {
            data: &mut data,
            settings: &mut settings,
            pipeline: &mut pipeline,
            objects: &NoObjects,
        };
        assert!(matches!(
            codec.read(&mut ctx, &words),
            Err(CodecError::LayoutVersion { .. })
        ));
    }
}
