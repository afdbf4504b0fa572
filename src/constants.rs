//! Solver tuning constants.
//!
//! Defaults for the solver knobs; all of them can be overridden per
//! simulation epoch through [`crate::FluidOptions`].

/// Number of Jacobi relaxation iterations per pressure solve.
/// Termination is always by count, never by measured convergence.
pub const DEFAULT_JACOBI_ITERATIONS: u32 = 20;

/// Vorticity confinement force coefficient.
pub const DEFAULT_VORTICITY_STRENGTH: f32 = 0.35;

/// Channels carried by the velocity field (x, y).
pub const VELOCITY_CHANNELS: usize = 2;

/// Channels carried by the render/density field (r, g, b, density).
pub const DENSITY_CHANNELS: usize = 4;

/// Maximum channels a grid buffer may carry.
pub const MAX_FIELD_CHANNELS: usize = 4;

/// Boundary mask values above this mark a cell as solid.
pub const BOUNDARY_THRESHOLD: f32 = 0.5;

/// Falloff weights below this are treated as zero when an injector overwrites.
pub const OVERWRITE_EPSILON: f32 = 1e-3;
