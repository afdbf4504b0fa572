//! Pass abstraction and program loading.
//!
//! A [`CompiledPass`] is an atomic full-grid computation: it reads zero or
//! more field views plus scalar uniforms and writes exactly one output slot.
//! The pipeline only orders and feeds passes; the actual numerical kernels
//! come from a [`ProgramLoader`]. [`CpuProgramLoader`] is the bundled loader
//! whose kernels run on plain slices, so the whole solver works without a
//! device.

pub mod cpu;

pub use cpu::CpuProgramLoader;

use glam::{UVec2, Vec2};

use crate::error::FluidError;
use crate::field::FieldView;

/// Names of the numerical programs the pipeline asks a loader for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassName {
    /// Semi-Lagrangian advection of the velocity field along itself.
    Advect,
    /// Curl of the velocity field.
    Vorticity,
    /// Confinement force derived from the curl field, added to velocity.
    VorticityForce,
    /// Radial velocity impulse from one perturber.
    Perturb,
    /// Radial color/density blend from one injector.
    Inject,
    /// No-flow enforcement at masked cells and domain edges.
    Boundary,
    /// Divergence of the velocity field.
    Divergence,
    /// One Jacobi relaxation of the pressure-Poisson equation.
    Jacobi,
    /// Pressure-gradient subtraction (projection).
    SubtractGradient,
    /// Advection of the render-resolution density field.
    Render,
}

/// Scalar parameters fed to a pass. The pipeline fills in whatever the pass
/// consumes; unused fields are ignored by the kernel.
#[derive(Debug, Clone, Copy)]
pub struct PassUniforms {
    /// Timestep in seconds.
    pub dt: f32,
    /// World units per output-grid cell.
    pub delta: Vec2,
    /// Output-grid cells per world unit.
    pub delta_inv: Vec2,
    /// Velocity-grid cells per world unit (differs from `delta_inv` when the
    /// output grid is the finer render grid).
    pub velocity_delta_inv: Vec2,
    /// Vorticity confinement coefficient.
    pub strength: f32,
    /// Interaction center in world space.
    pub point: Vec2,
    /// Interaction velocity contribution.
    pub vector: Vec2,
    /// Interaction color contribution.
    pub color: [f32; 3],
    /// Interaction falloff radius in world units.
    pub radius: f32,
    /// Injector overwrite flag.
    pub overwrite: bool,
}

impl PassUniforms {
    /// Uniforms for a grid with the given cell size; interaction fields zeroed.
    pub fn for_grid(delta: Vec2, delta_inv: Vec2) -> Self {
        Self {
            dt: 0.0,
            delta,
            delta_inv,
            velocity_delta_inv: delta_inv,
            strength: 0.0,
            point: Vec2::ZERO,
            vector: Vec2::ZERO,
            color: [0.0; 3],
            radius: 0.0,
            overwrite: false,
        }
    }
}

/// Everything a kernel needs for one invocation.
pub struct PassArgs<'a> {
    /// Resolution of the output grid.
    pub resolution: UVec2,
    /// Channels of the output grid.
    pub channels: usize,
    /// Read-only input fields, in the order the pass documents.
    pub inputs: &'a [FieldView<'a>],
    pub uniforms: PassUniforms,
}

/// An executable numerical kernel bound to named inputs and uniforms.
pub trait PassKernel: Send + Sync {
    fn run(&self, args: &PassArgs, output: &mut [f32]);
}

/// A loaded pass, ready for repeated execution.
pub struct CompiledPass {
    name: PassName,
    kernel: Box<dyn PassKernel>,
}

impl CompiledPass {
    pub fn new(name: PassName, kernel: Box<dyn PassKernel>) -> Self {
        Self { name, kernel }
    }

    pub fn name(&self) -> PassName {
        self.name
    }

    /// Run the kernel over the full output grid. The output slice must be the
    /// inactive slot of the destination buffer; the caller swaps afterwards.
    pub fn execute(&self, args: &PassArgs, output: &mut [f32]) {
        debug_assert_eq!(
            output.len(),
            (args.resolution.x * args.resolution.y) as usize * args.channels,
            "output slice does not match pass resolution for {:?}",
            self.name
        );
        self.kernel.run(args, output);
    }
}

/// Collaborator that supplies the numerical kernel for each pass name.
/// Load failures surface as `init` failures on the pipeline.
pub trait ProgramLoader {
    fn load(&self, name: PassName) -> Result<CompiledPass, FluidError>;
}
