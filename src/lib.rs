//! Grid-based 2D fluid simulation engine.
//!
//! Advances a velocity and density field through a fixed multi-stage pipeline:
//! semi-Lagrangian advection, vorticity confinement, interactive force and
//! color injection, boundary enforcement, a Jacobi pressure solve, projection,
//! and render-field advection. Every field is double-buffered and the pipeline
//! owns all buffer-swap bookkeeping.
//!
//! The numerical kernels are supplied by a [`passes::ProgramLoader`]; the
//! bundled [`passes::CpuProgramLoader`] executes every pass on the CPU so the
//! solver runs and tests without a GPU. Rendering and device setup live
//! outside this crate - renderers read the density field through
//! [`SolverPipeline::density`], and anything that needs velocity (audio,
//! physics, UI) registers a [`VelocityPoller`].

pub mod constants;
pub mod context;
pub mod error;
pub mod field;
pub mod interaction;
pub mod options;
pub mod passes;
pub mod pipeline;
pub mod poller;

pub use context::RenderingContext;
pub use error::FluidError;
pub use field::{FieldId, FieldView, GridBuffer};
pub use interaction::{Boundary, InteractionQueue, Injector, Perturber};
pub use options::{FluidOptions, GridDeltas};
pub use passes::{CompiledPass, CpuProgramLoader, PassName, ProgramLoader};
pub use pipeline::SolverPipeline;
pub use poller::{PollerId, VelocityPoller, VelocitySnapshot};
