//! Snapshot pairs for proxy interpolation.

use crate::math::Vec3;

/// Two bracketing snapshots handed over by the host transport.
#[derive(Copy, Clone, Debug)]
pub struct InterpolationData<'a> {
    pub from: &'a [i32],
    pub to: &'a [i32],
    pub from_tick: i32,
    pub to_tick: i32,
    /// Blend factor between `from` (0) and `to` (1).
    pub alpha: f32,
}

impl InterpolationData<'_> {
    #[inline]
    pub fn ticks(&self) -> i32 {
        self.to_tick.saturating_sub(self.from_tick)
    }

    /// Fractional tick the blend represents.
    #[inline]
    pub fn tick(&self) -> f32 {
        self.from_tick as f32 + self.alpha * self.ticks() as f32
    }
}

/// A move faster than one meter per tick between two snapshots is a teleport.
#[inline]
pub fn is_teleport(delta: Vec3, ticks: i32) -> bool {
    let ticks = ticks as f32;
    ticks > 0.0 && delta.norm_squared() > ticks * ticks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_meters_in_three_ticks_is_a_teleport() {
        assert!(is_teleport(Vec3::new(10.0, 0.0, 0.0), 3));
    }

    #[test]
    fn boundary_is_not_a_teleport() {
        assert!(!is_teleport(Vec3::new(3.0, 0.0, 0.0), 3));
        assert!(!is_teleport(Vec3::new(0.0, 0.5, 0.0), 1));
        assert!(is_teleport(Vec3::new(0.0, 1.01, 0.0), 1));
    }

    #[test]
    fn zero_tick_gap_never_teleports() {
        assert!(!is_teleport(Vec3::new(100.0, 0.0, 0.0), 0));
    }

    #[test]
    fn long_gaps_compare_without_overflow() {
        assert!(!is_teleport(Vec3::new(1.0, 0.0, 0.0), 50_000));
        assert!(!is_teleport(Vec3::new(1.0e5, 0.0, 0.0), i32::MAX));
        assert!(is_teleport(Vec3::new(60_000.0, 0.0, 0.0), 50_000));
    }

    #[test]
    fn tick_gap_saturates() {
        let words = [0i32; 1];
        let data = InterpolationData {
            from: &words,
            to: &words,
            from_tick: i32::MIN,
            to_tick: i32::MAX,
            alpha: 0.0,
        };
        assert_eq!(data.ticks(), i32::MAX);
    }

    #[test]
    fn blend_tick_is_fractional() {
        let words = [0i32; 1];
        let data = InterpolationData {
            from: &words,
            to: &words,
            from_tick: 10,
            to_tick: 12,
            alpha: 0.25,
        };
        assert_eq!(data.ticks(), 2);
        assert_eq!(data.tick(), 10.5);
    }
}
