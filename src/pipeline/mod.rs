//! The solver pipeline: canonical field state and the fixed per-step pass
//! sequence.
//!
//! One `step(dt)` consumes the interaction queue and advances all fields by
//! one frame:
//!
//! 1.  commit a staged boundary mask / queued boundary stamps
//! 2.  advect velocity along itself (semi-Lagrangian)
//! 3.  vorticity confinement (curl, then confinement force)
//! 4.  apply queued perturbers to velocity
//! 5.  apply queued injectors to the density field
//! 6.  enforce no-flow at boundaries
//! 7.  divergence of velocity
//! 8.  fixed-count Jacobi pressure solve
//! 9.  subtract the pressure gradient (projection)
//! 10. advect the render-resolution density field
//! 11. notify velocity pollers with a host-side snapshot
//!
//! Stages form a strict dependency chain; only 4 and 5 are commutative among
//! themselves. The pipeline is single-threaded and `step` blocks to
//! completion.

use glam::{UVec2, Vec2};

use crate::constants::{DENSITY_CHANNELS, VELOCITY_CHANNELS};
use crate::context::RenderingContext;
use crate::error::FluidError;
use crate::field::{FieldError, FieldId, FieldView, GridBuffer};
use crate::interaction::InteractionQueue;
use crate::options::{FluidOptions, GridDeltas};
use crate::passes::{CompiledPass, PassArgs, PassName, PassUniforms};
use crate::poller::{PollerId, PollerRegistry, VelocityPoller, VelocitySnapshot};

/// All grid buffers owned by the pipeline.
struct FieldSet {
    velocity: GridBuffer,
    vorticity: GridBuffer,
    pressure: GridBuffer,
    divergence: GridBuffer,
    boundary: GridBuffer,
    density: GridBuffer,
}

impl FieldSet {
    fn new(solver: UVec2, render: UVec2) -> Result<Self, FieldError> {
        Ok(Self {
            velocity: GridBuffer::new("velocity", solver, VELOCITY_CHANNELS)?,
            vorticity: GridBuffer::new("vorticity", solver, 1)?,
            pressure: GridBuffer::new("pressure", solver, 1)?,
            divergence: GridBuffer::new("divergence", solver, 1)?,
            boundary: GridBuffer::new("boundary", solver, 1)?,
            density: GridBuffer::new("density", render, DENSITY_CHANNELS)?,
        })
    }

    fn get_mut(&mut self, id: FieldId) -> &mut GridBuffer {
        match id {
            FieldId::Velocity => &mut self.velocity,
            FieldId::Vorticity => &mut self.vorticity,
            FieldId::Pressure => &mut self.pressure,
            FieldId::Divergence => &mut self.divergence,
            FieldId::BoundaryMask => &mut self.boundary,
            FieldId::Density => &mut self.density,
        }
    }
}

/// The loaded programs, one per stage of the fixed sequence.
struct PassSet {
    advect: CompiledPass,
    vorticity: CompiledPass,
    vorticity_force: CompiledPass,
    perturb: CompiledPass,
    inject: CompiledPass,
    boundary: CompiledPass,
    divergence: CompiledPass,
    jacobi: CompiledPass,
    subtract_gradient: CompiledPass,
    render: CompiledPass,
}

impl PassSet {
    fn load(context: &RenderingContext) -> Result<Self, FluidError> {
        Ok(Self {
            advect: context.load(PassName::Advect)?,
            vorticity: context.load(PassName::Vorticity)?,
            vorticity_force: context.load(PassName::VorticityForce)?,
            perturb: context.load(PassName::Perturb)?,
            inject: context.load(PassName::Inject)?,
            boundary: context.load(PassName::Boundary)?,
            divergence: context.load(PassName::Divergence)?,
            jacobi: context.load(PassName::Jacobi)?,
            subtract_gradient: context.load(PassName::SubtractGradient)?,
            render: context.load(PassName::Render)?,
        })
    }
}

/// Orchestrator owning field state, pass programs, interaction queue and
/// poller registry. Construct with a [`RenderingContext`], call
/// [`SolverPipeline::init`], then step once per frame.
pub struct SolverPipeline {
    context: RenderingContext,
    options: FluidOptions,
    deltas: GridDeltas,
    fields: Option<FieldSet>,
    passes: Option<PassSet>,
    queue: InteractionQueue,
    pollers: PollerRegistry,
    staged_mask: Option<Vec<f32>>,
    snapshot: Vec<f32>,
    ready: bool,
}

impl SolverPipeline {
    pub fn new(context: RenderingContext) -> Self {
        let options = FluidOptions::default();
        let deltas = options.deltas();
        Self {
            context,
            options,
            deltas,
            fields: None,
            passes: None,
            queue: InteractionQueue::default(),
            pollers: PollerRegistry::default(),
            staged_mask: None,
            snapshot: Vec::new(),
            ready: false,
        }
    }

    /// (Re)establish resolutions, deltas, buffers and programs. `ready` is
    /// cleared for the duration and set only once every setup stage succeeds;
    /// on failure the pipeline stays not-ready and `init` may be retried.
    pub fn init(&mut self, options: FluidOptions, reload_programs: bool) -> Result<(), FluidError> {
        self.ready = false;

        if options.size.x <= 0.0 || options.size.y <= 0.0 {
            return Err(FluidError::InvalidSize {
                x: options.size.x,
                y: options.size.y,
            });
        }
        if options.jacobi_iterations == 0 {
            log::warn!("[SolverPipeline] jacobi_iterations is 0: projection will be a no-op");
        }

        self.options = options;
        self.deltas = self.options.deltas();

        if reload_programs || self.passes.is_none() {
            self.passes = Some(PassSet::load(&self.context)?);
        }

        let solver = self.options.solver_resolution;
        let render = self.options.render_resolution;
        self.fields = Some(FieldSet::new(solver, render)?);
        self.snapshot = vec![0.0; (solver.x * solver.y) as usize * VELOCITY_CHANNELS];
        // A mask staged for the previous resolution no longer fits.
        self.staged_mask = None;

        self.ready = true;
        log::info!(
            "[SolverPipeline] initialized: size {} solver {} render {} jacobi {}",
            self.options.size,
            solver,
            render,
            self.options.jacobi_iterations
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn options(&self) -> &FluidOptions {
        &self.options
    }

    pub fn size(&self) -> Vec2 {
        self.options.size
    }

    pub fn solver_resolution(&self) -> UVec2 {
        self.options.solver_resolution
    }

    pub fn render_resolution(&self) -> UVec2 {
        self.options.render_resolution
    }

    /// Change the domain size. Clears `ready`; `init` must run before the
    /// next step.
    pub fn set_size(&mut self, size: Vec2) {
        self.ready = false;
        self.options.size = size;
    }

    /// Change the solver resolution. Clears `ready`; `init` must run before
    /// the next step.
    pub fn set_resolution(&mut self, resolution: UVec2) {
        self.ready = false;
        self.options.solver_resolution = resolution;
    }

    /// Queue a color/density source for the next step.
    pub fn inject(&mut self, position: Vec2, r: f32, g: f32, b: f32, size: f32, overwrite: bool) {
        self.warn_outside_domain("injector", position);
        self.queue.inject(position, r, g, b, size, overwrite);
    }

    /// Queue a velocity impulse for the next step.
    pub fn perturb(&mut self, position: Vec2, velocity: Vec2, size: f32) {
        self.warn_outside_domain("perturber", position);
        self.queue.perturb(position, velocity, size);
    }

    /// Queue an obstacle stamp, rasterized into the boundary mask at the next
    /// step.
    pub fn add_arbitrary_boundary(&mut self, position: Vec2, size: f32) {
        self.warn_outside_domain("boundary", position);
        self.queue.add_boundary(position, size);
    }

    /// Stage a pre-rasterized solver-resolution obstacle mask, committed
    /// atomically at stage 1 of the next step. Staging again before that step
    /// replaces the previous mask.
    pub fn set_boundary_mask(&mut self, mask: &[f32]) -> Result<(), FluidError> {
        let solver = self.options.solver_resolution;
        let expected = (solver.x * solver.y) as usize;
        if mask.len() != expected {
            return Err(FluidError::MaskSizeMismatch {
                expected,
                actual: mask.len(),
            });
        }
        self.staged_mask = Some(mask.to_vec());
        Ok(())
    }

    pub fn attach_poller(&mut self, poller: Box<dyn VelocityPoller>) -> PollerId {
        self.pollers.attach(poller)
    }

    /// Detaching a poller that is not attached is a no-op.
    pub fn detach_poller(&mut self, id: PollerId) {
        self.pollers.detach(id);
    }

    /// Write a rectangular block of raw floats into a field's current slot.
    /// Out-of-range regions are an error, never clamped.
    pub fn upload_region(
        &mut self,
        field: FieldId,
        origin: UVec2,
        extent: UVec2,
        data: &[f32],
    ) -> Result<(), FluidError> {
        let fields = self.fields.as_mut().ok_or(FluidError::NotReady)?;
        fields.get_mut(field).upload_region(origin, extent, data)?;
        Ok(())
    }

    /// Read-only view of the render-resolution density field, or `None`
    /// before a successful `init`.
    pub fn density(&self) -> Option<FieldView<'_>> {
        if !self.ready {
            return None;
        }
        self.fields.as_ref().map(|f| f.density.view())
    }

    /// Density field as raw bytes for texture upload.
    pub fn density_bytes(&self) -> Option<&[u8]> {
        if !self.ready {
            return None;
        }
        self.fields
            .as_ref()
            .map(|f| bytemuck::cast_slice(f.density.read()))
    }

    /// Read-only view of the solver-resolution velocity field.
    pub fn velocity_field(&self) -> Option<FieldView<'_>> {
        if !self.ready {
            return None;
        }
        self.fields.as_ref().map(|f| f.velocity.view())
    }

    /// Bilinear velocity sample at a world-space position, or `None` before a
    /// successful `init`.
    pub fn sample_velocity(&self, position: Vec2) -> Option<Vec2> {
        let view = self.velocity_field()?;
        Some(view.sample_vec2(position * self.deltas.solver_delta_inv - 0.5))
    }

    /// Advance all fields by one frame. Consumes the interaction queue and
    /// notifies pollers. Fails without touching any state when the pipeline
    /// is not ready.
    pub fn step(&mut self, dt: f32) -> Result<(), FluidError> {
        if !self.ready {
            return Err(FluidError::NotReady);
        }
        let (Some(fields), Some(passes)) = (self.fields.as_mut(), self.passes.as_ref()) else {
            return Err(FluidError::NotReady);
        };

        let deltas = self.deltas;
        let solver = self.options.solver_resolution;
        let render = self.options.render_resolution;
        let drained = self.queue.drain();

        let solver_uniforms = PassUniforms::for_grid(deltas.solver_delta, deltas.solver_delta_inv);
        let render_uniforms = PassUniforms::for_grid(deltas.render_delta, deltas.render_delta_inv);

        // Stage 1: boundary commit. Idempotent no-op when nothing is staged.
        let staged = self.staged_mask.take();
        if staged.is_some() || !drained.boundaries.is_empty() {
            {
                let (front, back) = fields.boundary.split();
                match &staged {
                    Some(mask) => back.copy_from_slice(mask),
                    None => back.copy_from_slice(front.data),
                }
            }
            let back = fields.boundary.write_target();
            for boundary in &drained.boundaries {
                stamp_boundary(back, solver, deltas.solver_delta, boundary.position, boundary.size);
            }
            fields.boundary.swap();
            log::debug!(
                "[SolverPipeline] boundary commit: staged={} stamps={}",
                staged.is_some(),
                drained.boundaries.len()
            );
        }

        // Stage 2: self-advection of velocity.
        {
            let mut uniforms = solver_uniforms;
            uniforms.dt = dt;
            let (vel, out) = fields.velocity.split();
            let inputs = [vel, vel, fields.boundary.view()];
            passes.advect.execute(
                &PassArgs {
                    resolution: solver,
                    channels: VELOCITY_CHANNELS,
                    inputs: &inputs,
                    uniforms,
                },
                out,
            );
        }
        fields.velocity.swap();

        // Stage 3: vorticity confinement. Curl first, then the force pass.
        {
            let inputs = [fields.velocity.view()];
            let out = fields.vorticity.write_target();
            passes.vorticity.execute(
                &PassArgs {
                    resolution: solver,
                    channels: 1,
                    inputs: &inputs,
                    uniforms: solver_uniforms,
                },
                out,
            );
        }
        fields.vorticity.swap();
        {
            let mut uniforms = solver_uniforms;
            uniforms.dt = dt;
            uniforms.strength = self.options.vorticity_strength;
            let (vel, out) = fields.velocity.split();
            let inputs = [vel, fields.vorticity.view(), fields.boundary.view()];
            passes.vorticity_force.execute(
                &PassArgs {
                    resolution: solver,
                    channels: VELOCITY_CHANNELS,
                    inputs: &inputs,
                    uniforms,
                },
                out,
            );
        }
        fields.velocity.swap();

        // Stage 4: queued perturbers. Additive, so application order is
        // irrelevant.
        for perturber in &drained.perturbers {
            let mut uniforms = solver_uniforms;
            uniforms.point = perturber.position;
            uniforms.vector = perturber.velocity;
            uniforms.radius = perturber.size;
            let (vel, out) = fields.velocity.split();
            let inputs = [vel];
            passes.perturb.execute(
                &PassArgs {
                    resolution: solver,
                    channels: VELOCITY_CHANNELS,
                    inputs: &inputs,
                    uniforms,
                },
                out,
            );
            fields.velocity.swap();
        }

        // Stage 5: queued injectors on the render-resolution density field.
        for injector in &drained.injectors {
            let mut uniforms = render_uniforms;
            uniforms.point = injector.position;
            uniforms.color = injector.color;
            uniforms.radius = injector.size;
            uniforms.overwrite = injector.overwrite;
            let (density, out) = fields.density.split();
            let inputs = [density];
            passes.inject.execute(
                &PassArgs {
                    resolution: render,
                    channels: DENSITY_CHANNELS,
                    inputs: &inputs,
                    uniforms,
                },
                out,
            );
            fields.density.swap();
        }

        // Stage 6: no-flow boundary enforcement.
        {
            let (vel, out) = fields.velocity.split();
            let inputs = [vel, fields.boundary.view()];
            passes.boundary.execute(
                &PassArgs {
                    resolution: solver,
                    channels: VELOCITY_CHANNELS,
                    inputs: &inputs,
                    uniforms: solver_uniforms,
                },
                out,
            );
        }
        fields.velocity.swap();

        // Stage 7: divergence of the boundary-enforced velocity.
        {
            let inputs = [fields.velocity.view(), fields.boundary.view()];
            let out = fields.divergence.write_target();
            passes.divergence.execute(
                &PassArgs {
                    resolution: solver,
                    channels: 1,
                    inputs: &inputs,
                    uniforms: solver_uniforms,
                },
                out,
            );
        }
        fields.divergence.swap();

        // Stage 8: Jacobi pressure solve. Fixed iteration count, no
        // convergence check - latency over accuracy.
        fields.pressure.clear();
        for _ in 0..self.options.jacobi_iterations {
            let (pressure, out) = fields.pressure.split();
            let inputs = [pressure, fields.divergence.view(), fields.boundary.view()];
            passes.jacobi.execute(
                &PassArgs {
                    resolution: solver,
                    channels: 1,
                    inputs: &inputs,
                    uniforms: solver_uniforms,
                },
                out,
            );
            fields.pressure.swap();
        }

        // Stage 9: projection.
        {
            let (vel, out) = fields.velocity.split();
            let inputs = [vel, fields.pressure.view(), fields.boundary.view()];
            passes.subtract_gradient.execute(
                &PassArgs {
                    resolution: solver,
                    channels: VELOCITY_CHANNELS,
                    inputs: &inputs,
                    uniforms: solver_uniforms,
                },
                out,
            );
        }
        fields.velocity.swap();

        // Stage 10: advect the density field with the now divergence-free
        // velocity, crossing from render to solver resolution.
        {
            let mut uniforms = render_uniforms;
            uniforms.dt = dt;
            uniforms.velocity_delta_inv =
                deltas.render_delta_inv * deltas.solver_to_render_scale;
            let (density, out) = fields.density.split();
            let inputs = [density, fields.velocity.view()];
            passes.render.execute(
                &PassArgs {
                    resolution: render,
                    channels: DENSITY_CHANNELS,
                    inputs: &inputs,
                    uniforms,
                },
                out,
            );
        }
        fields.density.swap();

        // Stage 11: host readback and poller notification, after all swaps
        // are finalized.
        self.snapshot.copy_from_slice(fields.velocity.read());
        if !self.pollers.is_empty() {
            let snapshot = VelocitySnapshot {
                resolution: solver,
                data: &self.snapshot,
            };
            self.pollers.notify(&snapshot);
        }

        Ok(())
    }

    fn warn_outside_domain(&self, kind: &str, position: Vec2) {
        let size = self.options.size;
        if position.x < 0.0 || position.y < 0.0 || position.x > size.x || position.y > size.y {
            log::warn!(
                "[SolverPipeline] {kind} at {position} is outside the domain {size}; \
                 it will clamp to the grid edge"
            );
        }
    }
}

/// Rasterize a circular obstacle stamp into a solver-resolution mask slot.
/// Positions outside the grid clamp to a no-op at the edges.
fn stamp_boundary(mask: &mut [f32], resolution: UVec2, delta: Vec2, position: Vec2, size: f32) {
    let min_cell = ((position - Vec2::splat(size)) / delta - 0.5).floor();
    let max_cell = ((position + Vec2::splat(size)) / delta - 0.5).ceil();
    let x0 = (min_cell.x.max(0.0)) as u32;
    let y0 = (min_cell.y.max(0.0)) as u32;
    let x1 = (max_cell.x.min(resolution.x as f32 - 1.0)).max(0.0) as u32;
    let y1 = (max_cell.y.min(resolution.y as f32 - 1.0)).max(0.0) as u32;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5) * delta;
            if (center - position).length() <= size {
                mask[(y * resolution.x + x) as usize] = 1.0;
            }
        }
    }
}
