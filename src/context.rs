//! Explicit execution context for the solver.
//!
//! The context is an owned value created by the process, bound to one or
//! more pipelines at construction, and dropped on process exit. No global
//! state is involved.

use crate::passes::{CompiledPass, CpuProgramLoader, PassName, ProgramLoader};
use crate::FluidError;

/// Owns the program loader that supplies numerical kernels to a pipeline.
pub struct RenderingContext {
    loader: Box<dyn ProgramLoader>,
}

impl RenderingContext {
    pub fn new(loader: Box<dyn ProgramLoader>) -> Self {
        Self { loader }
    }

    /// Context backed by the built-in CPU kernels.
    pub fn cpu() -> Self {
        Self::new(Box::new(CpuProgramLoader))
    }

    pub fn load(&self, name: PassName) -> Result<CompiledPass, FluidError> {
        self.loader.load(name)
    }
}

impl Default for RenderingContext {
    fn default() -> Self {
        Self::cpu()
    }
}
