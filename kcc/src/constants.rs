/*!
Controller-wide constants.

Defaults and tolerances used by the movement driver, the penetration resolver,
the ground analyzer and the network codec. Keeping them together keeps every
peer on the same numbers, which resimulation depends on.

Notes
- Distances are in meters, angles in degrees, time in seconds.
- Iteration counts and tolerances are fixed constants. Never derive them from
  wall-clock time; a resimulated tick must reproduce the same output.
*/

/// Capacity of every overlap/raycast/shape-cast hit buffer.
/// Queries silently truncate at this size.
pub const CACHE_SIZE: usize = 64;

/// Number of ticks kept in the state history ring.
pub const HISTORY_SIZE: usize = 180;

/// Maximum ground angle applied at the start of every tick (degrees).
pub const DEFAULT_MAX_GROUND_ANGLE: f32 = 75.0;

/// Maximum wall angle applied at the start of every tick (degrees).
/// A contact within this band around horizontal is a wall; anything between
/// the wall band and the ground cone is a slope.
pub const DEFAULT_MAX_WALL_ANGLE: f32 = 5.0;

/// A substep whose displacement exceeds `radius * CCD_MAX_STEP_RATIO` is split.
pub const CCD_MAX_STEP_RATIO: f32 = 0.85;

/// Split substeps are scaled down to `radius * CCD_OPTIMAL_STEP_RATIO` of movement.
pub const CCD_OPTIMAL_STEP_RATIO: f32 = 0.75;

/// Gradient descent iteration budget.
pub const RESOLVER_MAX_ITERATIONS: usize = 12;

/// Gradient descent early-exit tolerance (meters of residual penetration).
pub const RESOLVER_MAX_ERROR: f32 = 1.0e-4;

/// Bisection steps used by the two-contact wedge solver.
pub const RESOLVER_BINARY_ITERATIONS: usize = 24;

/// Refinement sub-steps after the first depenetration pass.
pub const DEPENETRATION_SUB_STEPS: u32 = 3;

/// Ground distance under which a grounded agent may start stepping up (meters).
pub const STEP_GROUND_DISTANCE: f32 = 0.001;

/// Desired movement pointing this much straight down never steps up.
pub const STEP_MAX_DOWN_DOT: f32 = 0.9;

/// Minimum alignment between desired and correction XZ directions for a step.
pub const STEP_MIN_ALIGNMENT: f32 = 0.1;

/// Snap probe increment as a fraction of radius.
pub const SNAP_STEP_RATIO: f32 = 0.25;

/// Squared prediction error at or above which the error is treated as a teleport (m^2).
pub const PREDICTION_ERROR_TELEPORT_SQ: f32 = 4.0;

/// Decay rate while correcting within the frame a fixed tick ran (1/s).
pub const PREDICTION_CORRECTION_SPEED: f32 = 20.0;

/// Decay rate while carrying the error between frames (1/s).
pub const PREDICTION_CARRY_SPEED: f32 = 30.0;

/// History entries scanned backwards when looking for the render bracket.
pub const PREDICTION_HISTORY_SCAN: usize = 5;

/// Object ids replicated per interaction group (ignores/modifiers/collisions).
pub const NETWORK_INTERACTION_CAPACITY: usize = 8;

/// Minimum collider radius (meters).
pub const MIN_RADIUS: f32 = 0.01;

/// Practical small distance for comparisons (meters).
pub const DIST_EPS: f32 = 1.0e-6;
