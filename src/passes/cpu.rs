//! CPU reference implementation of every pass kernel.
//!
//! Kernels operate on interleaved row-major `f32` grids. Cell centers sit at
//! integer grid coordinates; world positions convert through the deltas in
//! [`PassUniforms`]. Each kernel documents its input order.

use glam::Vec2;

use crate::constants::{BOUNDARY_THRESHOLD, OVERWRITE_EPSILON};
use crate::error::FluidError;
use crate::field::FieldView;
use crate::passes::{CompiledPass, PassArgs, PassKernel, PassName, ProgramLoader};

/// Loader returning the built-in CPU kernels. The `Render` pass reuses the
/// advection kernel bound to the render grid; the two names exist so other
/// loaders can serve per-grid variants of the program.
#[derive(Debug, Default)]
pub struct CpuProgramLoader;

impl ProgramLoader for CpuProgramLoader {
    fn load(&self, name: PassName) -> Result<CompiledPass, FluidError> {
        let kernel: Box<dyn PassKernel> = match name {
            PassName::Advect | PassName::Render => Box::new(AdvectKernel),
            PassName::Vorticity => Box::new(CurlKernel),
            PassName::VorticityForce => Box::new(ConfinementKernel),
            PassName::Perturb => Box::new(PerturbKernel),
            PassName::Inject => Box::new(InjectKernel),
            PassName::Boundary => Box::new(BoundaryKernel),
            PassName::Divergence => Box::new(DivergenceKernel),
            PassName::Jacobi => Box::new(JacobiKernel),
            PassName::SubtractGradient => Box::new(GradientKernel),
        };
        Ok(CompiledPass::new(name, kernel))
    }
}

#[inline]
fn cell_center_world(x: u32, y: u32, delta: Vec2) -> Vec2 {
    Vec2::new(x as f32 + 0.5, y as f32 + 0.5) * delta
}

#[inline]
fn is_solid(mask: &FieldView, x: i32, y: i32) -> bool {
    mask.at(x, y, 0) > BOUNDARY_THRESHOLD
}

#[inline]
fn falloff(pos: Vec2, center: Vec2, radius: f32) -> f32 {
    let r = radius.max(f32::EPSILON);
    (-(pos - center).length_squared() / (r * r)).exp()
}

/// Semi-Lagrangian advection.
/// Inputs: `[source, velocity]`, optionally `[source, velocity, mask]`.
/// Backtraces each output cell along the velocity field by `dt` and bilinearly
/// samples the source there. Masked cells are forced to zero.
struct AdvectKernel;

impl PassKernel for AdvectKernel {
    fn run(&self, args: &PassArgs, output: &mut [f32]) {
        let source = &args.inputs[0];
        let velocity = &args.inputs[1];
        let mask = args.inputs.get(2);
        let u = &args.uniforms;

        for y in 0..args.resolution.y {
            for x in 0..args.resolution.x {
                let idx = (y * args.resolution.x + x) as usize * args.channels;

                if let Some(mask) = mask {
                    if is_solid(mask, x as i32, y as i32) {
                        output[idx..idx + args.channels].fill(0.0);
                        continue;
                    }
                }

                let pos = cell_center_world(x, y, u.delta);
                let vel = velocity.sample_vec2(pos * u.velocity_delta_inv - 0.5);
                let back = (pos - vel * u.dt) * u.delta_inv - 0.5;
                for c in 0..args.channels {
                    output[idx + c] = source.sample(back, c);
                }
            }
        }
    }
}

/// Curl of the velocity field by central differences.
/// Inputs: `[velocity]`. Output: one channel.
struct CurlKernel;

impl PassKernel for CurlKernel {
    fn run(&self, args: &PassArgs, output: &mut [f32]) {
        let velocity = &args.inputs[0];
        let delta = args.uniforms.delta;

        for y in 0..args.resolution.y as i32 {
            for x in 0..args.resolution.x as i32 {
                let dv_dx =
                    (velocity.at(x + 1, y, 1) - velocity.at(x - 1, y, 1)) / (2.0 * delta.x);
                let du_dy =
                    (velocity.at(x, y + 1, 0) - velocity.at(x, y - 1, 0)) / (2.0 * delta.y);
                output[(y as u32 * args.resolution.x + x as u32) as usize] = dv_dx - du_dy;
            }
        }
    }
}

/// Vorticity confinement force, F = strength * h * (N x omega), added back
/// into the velocity field to restore rotational detail lost to dissipation.
/// Inputs: `[velocity, vorticity, mask]`.
struct ConfinementKernel;

impl PassKernel for ConfinementKernel {
    fn run(&self, args: &PassArgs, output: &mut [f32]) {
        let velocity = &args.inputs[0];
        let curl = &args.inputs[1];
        let mask = &args.inputs[2];
        let u = &args.uniforms;
        let h = u.delta.x;

        for y in 0..args.resolution.y as i32 {
            for x in 0..args.resolution.x as i32 {
                let idx = (y as u32 * args.resolution.x + x as u32) as usize * 2;
                let vel = Vec2::new(velocity.at(x, y, 0), velocity.at(x, y, 1));

                if is_solid(mask, x, y) {
                    output[idx] = vel.x;
                    output[idx + 1] = vel.y;
                    continue;
                }

                // Normalized gradient of curl magnitude.
                let grad = Vec2::new(
                    (curl.at(x + 1, y, 0).abs() - curl.at(x - 1, y, 0).abs()) * 0.5,
                    (curl.at(x, y + 1, 0).abs() - curl.at(x, y - 1, 0).abs()) * 0.5,
                );
                let len = grad.length() + 1e-5;
                let n = grad / len;

                let omega = curl.at(x, y, 0);
                let force = Vec2::new(n.y * omega, -n.x * omega) * (u.strength * h);
                let out = vel + force * u.dt;
                output[idx] = out.x;
                output[idx + 1] = out.y;
            }
        }
    }
}

/// One perturber's velocity impulse with Gaussian falloff. Additive, so the
/// order of multiple perturbers cannot matter.
/// Inputs: `[velocity]`.
struct PerturbKernel;

impl PassKernel for PerturbKernel {
    fn run(&self, args: &PassArgs, output: &mut [f32]) {
        let velocity = &args.inputs[0];
        let u = &args.uniforms;

        for y in 0..args.resolution.y {
            for x in 0..args.resolution.x {
                let idx = (y * args.resolution.x + x) as usize * 2;
                let pos = cell_center_world(x, y, u.delta);
                let wgt = falloff(pos, u.point, u.radius);
                output[idx] = velocity.at(x as i32, y as i32, 0) + u.vector.x * wgt;
                output[idx + 1] = velocity.at(x as i32, y as i32, 1) + u.vector.y * wgt;
            }
        }
    }
}

/// One injector's color/density contribution on the render grid.
/// Inputs: `[density]` (4 channels: r, g, b, density).
struct InjectKernel;

impl PassKernel for InjectKernel {
    fn run(&self, args: &PassArgs, output: &mut [f32]) {
        let density = &args.inputs[0];
        let u = &args.uniforms;

        for y in 0..args.resolution.y {
            for x in 0..args.resolution.x {
                let idx = (y * args.resolution.x + x) as usize * 4;
                let pos = cell_center_world(x, y, u.delta);
                let wgt = falloff(pos, u.point, u.radius);

                if u.overwrite {
                    if wgt > OVERWRITE_EPSILON {
                        output[idx] = u.color[0] * wgt;
                        output[idx + 1] = u.color[1] * wgt;
                        output[idx + 2] = u.color[2] * wgt;
                        output[idx + 3] = wgt;
                    } else {
                        for c in 0..4 {
                            output[idx + c] = density.at(x as i32, y as i32, c);
                        }
                    }
                } else {
                    output[idx] = density.at(x as i32, y as i32, 0) + u.color[0] * wgt;
                    output[idx + 1] = density.at(x as i32, y as i32, 1) + u.color[1] * wgt;
                    output[idx + 2] = density.at(x as i32, y as i32, 2) + u.color[2] * wgt;
                    output[idx + 3] = density.at(x as i32, y as i32, 3) + wgt;
                }
            }
        }
    }
}

/// No-slip enforcement: velocity is zeroed at masked cells and domain edges.
/// Inputs: `[velocity, mask]`.
struct BoundaryKernel;

impl PassKernel for BoundaryKernel {
    fn run(&self, args: &PassArgs, output: &mut [f32]) {
        let velocity = &args.inputs[0];
        let mask = &args.inputs[1];
        let (w, h) = (args.resolution.x, args.resolution.y);

        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize * 2;
                let edge = x == 0 || y == 0 || x == w - 1 || y == h - 1;
                if edge || is_solid(mask, x as i32, y as i32) {
                    output[idx] = 0.0;
                    output[idx + 1] = 0.0;
                } else {
                    output[idx] = velocity.at(x as i32, y as i32, 0);
                    output[idx + 1] = velocity.at(x as i32, y as i32, 1);
                }
            }
        }
    }
}

/// Divergence of the velocity field by central differences.
/// Inputs: `[velocity, mask]`. Output: one channel, zero inside solids.
struct DivergenceKernel;

impl PassKernel for DivergenceKernel {
    fn run(&self, args: &PassArgs, output: &mut [f32]) {
        let velocity = &args.inputs[0];
        let mask = &args.inputs[1];
        let delta = args.uniforms.delta;

        for y in 0..args.resolution.y as i32 {
            for x in 0..args.resolution.x as i32 {
                let idx = (y as u32 * args.resolution.x + x as u32) as usize;
                if is_solid(mask, x, y) {
                    output[idx] = 0.0;
                    continue;
                }
                let du_dx =
                    (velocity.at(x + 1, y, 0) - velocity.at(x - 1, y, 0)) / (2.0 * delta.x);
                let dv_dy =
                    (velocity.at(x, y + 1, 1) - velocity.at(x, y - 1, 1)) / (2.0 * delta.y);
                output[idx] = du_dx + dv_dy;
            }
        }
    }
}

/// One Jacobi relaxation of the pressure-Poisson equation, with Neumann
/// conditions at solids (the solid neighbor contributes the center value).
/// Inputs: `[pressure, divergence, mask]`.
struct JacobiKernel;

impl PassKernel for JacobiKernel {
    fn run(&self, args: &PassArgs, output: &mut [f32]) {
        let pressure = &args.inputs[0];
        let divergence = &args.inputs[1];
        let mask = &args.inputs[2];
        let delta = args.uniforms.delta;
        let h2 = delta.x * delta.y;

        for y in 0..args.resolution.y as i32 {
            for x in 0..args.resolution.x as i32 {
                let idx = (y as u32 * args.resolution.x + x as u32) as usize;
                if is_solid(mask, x, y) {
                    output[idx] = 0.0;
                    continue;
                }

                let p = pressure.at(x, y, 0);
                let neighbor = |nx: i32, ny: i32| {
                    if is_solid(mask, nx, ny) {
                        p
                    } else {
                        pressure.at(nx, ny, 0)
                    }
                };

                let sum = neighbor(x - 1, y)
                    + neighbor(x + 1, y)
                    + neighbor(x, y - 1)
                    + neighbor(x, y + 1);
                output[idx] = (sum - h2 * divergence.at(x, y, 0)) * 0.25;
            }
        }
    }
}

/// Projection: subtract the pressure gradient from velocity to push the field
/// toward divergence-free. Solid cells stay at zero velocity.
/// Inputs: `[velocity, pressure, mask]`.
struct GradientKernel;

impl PassKernel for GradientKernel {
    fn run(&self, args: &PassArgs, output: &mut [f32]) {
        let velocity = &args.inputs[0];
        let pressure = &args.inputs[1];
        let mask = &args.inputs[2];
        let delta = args.uniforms.delta;

        for y in 0..args.resolution.y as i32 {
            for x in 0..args.resolution.x as i32 {
                let idx = (y as u32 * args.resolution.x + x as u32) as usize * 2;
                if is_solid(mask, x, y) {
                    output[idx] = 0.0;
                    output[idx + 1] = 0.0;
                    continue;
                }

                let p = pressure.at(x, y, 0);
                let neighbor = |nx: i32, ny: i32| {
                    if is_solid(mask, nx, ny) {
                        p
                    } else {
                        pressure.at(nx, ny, 0)
                    }
                };

                let grad = Vec2::new(
                    (neighbor(x + 1, y) - neighbor(x - 1, y)) / (2.0 * delta.x),
                    (neighbor(x, y + 1) - neighbor(x, y - 1)) / (2.0 * delta.y),
                );
                output[idx] = velocity.at(x, y, 0) - grad.x;
                output[idx + 1] = velocity.at(x, y, 1) - grad.y;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::PassUniforms;
    use glam::UVec2;

    const RES: UVec2 = UVec2::new(8, 8);

    fn view(data: &[f32], channels: usize) -> FieldView<'_> {
        FieldView {
            data,
            resolution: RES,
            channels,
        }
    }

    fn uniforms() -> PassUniforms {
        // Unit domain over an 8x8 grid.
        let delta = Vec2::splat(1.0 / 8.0);
        PassUniforms::for_grid(delta, delta.recip())
    }

    fn zeros(channels: usize) -> Vec<f32> {
        vec![0.0; (RES.x * RES.y) as usize * channels]
    }

    #[test]
    fn divergence_of_linear_field_is_constant() {
        // u = x world coordinate => du/dx = 1 everywhere (away from clamped edges).
        let u = uniforms();
        let mut velocity = zeros(2);
        for y in 0..RES.y {
            for x in 0..RES.x {
                velocity[(y * RES.x + x) as usize * 2] = (x as f32 + 0.5) * u.delta.x;
            }
        }
        let mask = zeros(1);
        let mut out = zeros(1);

        DivergenceKernel.run(
            &PassArgs {
                resolution: RES,
                channels: 1,
                inputs: &[view(&velocity, 2), view(&mask, 1)],
                uniforms: u,
            },
            &mut out,
        );

        for y in 1..RES.y - 1 {
            for x in 1..RES.x - 1 {
                let div = out[(y * RES.x + x) as usize];
                assert!((div - 1.0).abs() < 1e-4, "div at ({x},{y}) = {div}");
            }
        }
    }

    #[test]
    fn jacobi_reduces_poisson_residual() {
        let u = uniforms();
        let mask = zeros(1);
        let mut divergence = zeros(1);
        divergence[(4 * RES.x + 4) as usize] = 1.0;

        let mut pressure = zeros(1);
        let mut next = zeros(1);

        let residual = |p: &[f32]| -> f32 {
            let pv = view(p, 1);
            let h2 = u.delta.x * u.delta.y;
            let mut worst = 0.0f32;
            for y in 1..RES.y as i32 - 1 {
                for x in 1..RES.x as i32 - 1 {
                    let lap = (pv.at(x - 1, y, 0) + pv.at(x + 1, y, 0) + pv.at(x, y - 1, 0)
                        + pv.at(x, y + 1, 0)
                        - 4.0 * pv.at(x, y, 0))
                        / h2;
                    let div = divergence[(y as u32 * RES.x + x as u32) as usize];
                    worst = worst.max((lap - div).abs());
                }
            }
            worst
        };

        let before = residual(&pressure);
        for _ in 0..40 {
            JacobiKernel.run(
                &PassArgs {
                    resolution: RES,
                    channels: 1,
                    inputs: &[view(&pressure, 1), view(&divergence, 1), view(&mask, 1)],
                    uniforms: u,
                },
                &mut next,
            );
            std::mem::swap(&mut pressure, &mut next);
        }
        let after = residual(&pressure);

        assert!(
            after < before * 0.5,
            "residual did not drop: {before} -> {after}"
        );
    }

    #[test]
    fn advection_transports_against_velocity() {
        // Uniform rightward velocity moves field content rightward: after one
        // step a cell picks up the value that used to sit one cell to its left.
        let mut u = uniforms();
        u.dt = u.delta.x; // one cell per step at unit speed

        let mut source = zeros(1);
        source[(4 * RES.x + 3) as usize] = 1.0;
        let mut velocity = zeros(2);
        for cell in velocity.chunks_exact_mut(2) {
            cell[0] = 1.0;
        }
        let mut out = zeros(1);

        AdvectKernel.run(
            &PassArgs {
                resolution: RES,
                channels: 1,
                inputs: &[view(&source, 1), view(&velocity, 2)],
                uniforms: u,
            },
            &mut out,
        );

        assert!((out[(4 * RES.x + 4) as usize] - 1.0).abs() < 1e-4);
        assert!(out[(4 * RES.x + 3) as usize].abs() < 1e-4);
    }

    #[test]
    fn curl_of_rigid_rotation_is_uniform() {
        // v = omega x r with omega = 1: u = -(y - cy), v = (x - cx); curl = 2.
        let u = uniforms();
        let center = Vec2::splat(0.5);
        let mut velocity = zeros(2);
        for y in 0..RES.y {
            for x in 0..RES.x {
                let pos = cell_center_world(x, y, u.delta) - center;
                let idx = (y * RES.x + x) as usize * 2;
                velocity[idx] = -pos.y;
                velocity[idx + 1] = pos.x;
            }
        }
        let mut out = zeros(1);

        CurlKernel.run(
            &PassArgs {
                resolution: RES,
                channels: 1,
                inputs: &[view(&velocity, 2)],
                uniforms: u,
            },
            &mut out,
        );

        for y in 1..RES.y - 1 {
            for x in 1..RES.x - 1 {
                let curl = out[(y * RES.x + x) as usize];
                assert!((curl - 2.0).abs() < 1e-3, "curl at ({x},{y}) = {curl}");
            }
        }
    }

    #[test]
    fn boundary_kernel_zeroes_solids_and_edges() {
        let u = uniforms();
        let velocity = vec![1.0; (RES.x * RES.y) as usize * 2];
        let mut mask = zeros(1);
        mask[(3 * RES.x + 3) as usize] = 1.0;
        let mut out = zeros(2);

        BoundaryKernel.run(
            &PassArgs {
                resolution: RES,
                channels: 2,
                inputs: &[view(&velocity, 2), view(&mask, 1)],
                uniforms: u,
            },
            &mut out,
        );

        assert_eq!(out[(3 * RES.x + 3) as usize * 2], 0.0);
        assert_eq!(out[0], 0.0); // corner
        assert_eq!(out[(4 * RES.x + 4) as usize * 2], 1.0); // interior, unmasked
    }

    #[test]
    fn perturb_is_additive_and_localized() {
        let mut u = uniforms();
        u.point = Vec2::splat(0.5);
        u.vector = Vec2::new(2.0, 0.0);
        u.radius = 0.1;

        let velocity = zeros(2);
        let mut once = zeros(2);
        PerturbKernel.run(
            &PassArgs {
                resolution: RES,
                channels: 2,
                inputs: &[view(&velocity, 2)],
                uniforms: u,
            },
            &mut once,
        );
        let mut twice = zeros(2);
        PerturbKernel.run(
            &PassArgs {
                resolution: RES,
                channels: 2,
                inputs: &[view(&once, 2)],
                uniforms: u,
            },
            &mut twice,
        );

        let center = (4 * RES.x + 4) as usize * 2;
        let corner = 0;
        assert!(once[center] > 0.1);
        assert!((twice[center] - 2.0 * once[center]).abs() < 1e-5);
        assert!(once[corner].abs() < 1e-6);
    }
}
