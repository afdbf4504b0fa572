//! Simulation configuration and derived grid spacing.

use glam::{UVec2, Vec2};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_JACOBI_ITERATIONS, DEFAULT_VORTICITY_STRENGTH};
use crate::error::FluidError;

/// Immutable per-epoch simulation options. Changing size or resolution on a
/// running pipeline clears its ready flag; nothing takes effect until the next
/// `init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidOptions {
    /// Physical extent of the simulated domain in world units.
    pub size: Vec2,

    /// Grid resolution used by the physics passes.
    pub solver_resolution: UVec2,

    /// Grid resolution of the output density field.
    pub render_resolution: UVec2,

    /// Jacobi relaxation iterations per pressure solve.
    pub jacobi_iterations: u32,

    /// Vorticity confinement coefficient. Zero disables confinement.
    pub vorticity_strength: f32,
}

impl Default for FluidOptions {
    fn default() -> Self {
        Self {
            size: Vec2::ONE,
            solver_resolution: UVec2::new(128, 128),
            render_resolution: UVec2::new(256, 256),
            jacobi_iterations: DEFAULT_JACOBI_ITERATIONS,
            vorticity_strength: DEFAULT_VORTICITY_STRENGTH,
        }
    }
}

impl FluidOptions {
    /// Parse options from TOML. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, FluidError> {
        Ok(toml::from_str(text)?)
    }

    /// Derive all cell-size conversions in one place. Callers must never cache
    /// a `GridDeltas` across a size or resolution change; the pipeline
    /// recomputes it on every `init`.
    pub fn deltas(&self) -> GridDeltas {
        let solver = self.solver_resolution.as_vec2();
        let render = self.render_resolution.as_vec2();
        GridDeltas {
            render_delta: self.size / render,
            solver_delta: self.size / solver,
            render_delta_inv: render / self.size,
            solver_delta_inv: solver / self.size,
            solver_to_render_scale: solver / render,
        }
    }
}

/// World-space / grid-space conversion factors, always recomputed together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridDeltas {
    /// World units per render cell.
    pub render_delta: Vec2,
    /// World units per solver cell.
    pub solver_delta: Vec2,
    /// Render cells per world unit.
    pub render_delta_inv: Vec2,
    /// Solver cells per world unit.
    pub solver_delta_inv: Vec2,
    /// Solver resolution over render resolution.
    pub solver_to_render_scale: Vec2,
}
