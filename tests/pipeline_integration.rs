//! End-to-end tests of the solver pipeline through its public API.

use fluid_engine::{
    FieldId, FluidError, FluidOptions, RenderingContext, SolverPipeline, VelocityPoller,
    VelocitySnapshot,
};
use glam::{UVec2, Vec2};
use std::cell::RefCell;
use std::rc::Rc;

const DT: f32 = 1.0 / 60.0;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pipeline_with(solver: u32, render: u32) -> SolverPipeline {
    let mut pipeline = SolverPipeline::new(RenderingContext::cpu());
    pipeline
        .init(
            FluidOptions {
                size: Vec2::ONE,
                solver_resolution: UVec2::splat(solver),
                render_resolution: UVec2::splat(render),
                ..Default::default()
            },
            false,
        )
        .expect("init");
    pipeline
}

/// Total |divergence| of the velocity field over interior cells, measured with
/// the same central differences the solver uses.
fn total_divergence(pipeline: &SolverPipeline) -> f32 {
    let view = pipeline.velocity_field().expect("ready");
    let res = view.resolution;
    let delta = pipeline.size() / res.as_vec2();
    let mut total = 0.0;
    for y in 1..res.y as i32 - 1 {
        for x in 1..res.x as i32 - 1 {
            let du_dx = (view.at(x + 1, y, 0) - view.at(x - 1, y, 0)) / (2.0 * delta.x);
            let dv_dy = (view.at(x, y + 1, 1) - view.at(x, y - 1, 1)) / (2.0 * delta.y);
            total += (du_dx + dv_dy).abs();
        }
    }
    total
}

#[test]
fn empty_step_leaves_fields_at_zero() {
    init_logger();
    for resolution in [4u32, 16, 33] {
        let mut pipeline = pipeline_with(resolution, resolution);
        for _ in 0..3 {
            pipeline.step(DT).expect("step");
        }

        let velocity = pipeline.velocity_field().expect("ready");
        assert!(
            velocity.data.iter().all(|&v| v == 0.0),
            "velocity drifted at resolution {resolution}"
        );
        let density = pipeline.density().expect("ready");
        assert!(
            density.data.iter().all(|&d| d == 0.0),
            "density drifted at resolution {resolution}"
        );
    }
}

#[test]
fn injectors_are_additive() {
    init_logger();
    let center = Vec2::splat(0.5);

    let mut single = pipeline_with(16, 16);
    single.inject(center, 0.8, 0.2, 0.1, 0.1, false);
    single.step(DT).expect("step");

    let mut double = pipeline_with(16, 16);
    double.inject(center, 0.8, 0.2, 0.1, 0.1, false);
    double.inject(center, 0.8, 0.2, 0.1, 0.1, false);
    double.step(DT).expect("step");

    let one = single.density().expect("ready");
    let two = double.density().expect("ready");
    for (a, b) in one.data.iter().zip(two.data.iter()) {
        assert!(
            (b - 2.0 * a).abs() < 1e-5,
            "double injection is not the sum: {a} vs {b}"
        );
    }
}

#[test]
fn overwrite_injection_ignores_prior_content() {
    init_logger();
    let center = Vec2::splat(0.5);

    // Dirty pipeline: a large additive blob first, then the overwrite.
    let mut dirty = pipeline_with(16, 16);
    dirty.inject(center, 9.0, 9.0, 9.0, 0.3, false);
    dirty.step(DT).expect("step");
    dirty.inject(center, 0.1, 0.5, 0.9, 0.1, true);
    dirty.step(DT).expect("step");

    // Clean pipeline: the overwrite alone, stepped twice to advect equally.
    let mut clean = pipeline_with(16, 16);
    clean.step(DT).expect("step");
    clean.inject(center, 0.1, 0.5, 0.9, 0.1, true);
    clean.step(DT).expect("step");

    let dirty_view = dirty.density().expect("ready");
    let clean_view = clean.density().expect("ready");
    // At the overwrite center the result is independent of prior content.
    for channel in 0..4 {
        let a = dirty_view.at(8, 8, channel);
        let b = clean_view.at(8, 8, channel);
        assert!(
            (a - b).abs() < 1e-4,
            "channel {channel} depends on prior content: {a} vs {b}"
        );
    }
}

#[test]
fn arbitrary_boundary_pins_velocity_to_zero() {
    init_logger();
    for size in [0.1f32, 0.2, 0.3] {
        let mut pipeline = pipeline_with(32, 32);
        let center = Vec2::splat(0.5);
        pipeline.add_arbitrary_boundary(center, size);
        pipeline.perturb(Vec2::new(0.3, 0.5), Vec2::new(3.0, 1.0), 0.2);
        for _ in 0..3 {
            pipeline.step(DT).expect("step");
        }

        let velocity = pipeline.sample_velocity(center).expect("ready");
        assert!(
            velocity.length() < 1e-5,
            "velocity {velocity} inside boundary of size {size}"
        );
    }
}

#[test]
fn staged_mask_commits_on_next_step() {
    init_logger();
    let mut pipeline = pipeline_with(16, 16);

    // Solid column at x = 8.
    let mut mask = vec![0.0f32; 16 * 16];
    for y in 0..16 {
        mask[y * 16 + 8] = 1.0;
    }
    pipeline.set_boundary_mask(&mask).expect("stage mask");
    pipeline.perturb(Vec2::new(0.25, 0.5), Vec2::new(4.0, 0.0), 0.2);
    pipeline.step(DT).expect("step");

    let column_center = Vec2::new(8.5 / 16.0, 0.5);
    let velocity = pipeline.sample_velocity(column_center).expect("ready");
    assert!(velocity.length() < 1e-5, "masked column carries {velocity}");
}

#[test]
fn projection_reduces_divergence() {
    init_logger();
    let perturb = |pipeline: &mut SolverPipeline| {
        pipeline.perturb(Vec2::new(0.4, 0.5), Vec2::new(2.0, 0.0), 0.15);
        pipeline.perturb(Vec2::new(0.6, 0.45), Vec2::new(0.0, -1.5), 0.1);
    };

    let mut unprojected = SolverPipeline::new(RenderingContext::cpu());
    unprojected
        .init(
            FluidOptions {
                size: Vec2::ONE,
                solver_resolution: UVec2::splat(32),
                render_resolution: UVec2::splat(32),
                jacobi_iterations: 0,
                ..Default::default()
            },
            false,
        )
        .expect("init");
    perturb(&mut unprojected);
    unprojected.step(DT).expect("step");

    let mut projected = SolverPipeline::new(RenderingContext::cpu());
    projected
        .init(
            FluidOptions {
                size: Vec2::ONE,
                solver_resolution: UVec2::splat(32),
                render_resolution: UVec2::splat(32),
                jacobi_iterations: 40,
                ..Default::default()
            },
            false,
        )
        .expect("init");
    perturb(&mut projected);
    projected.step(DT).expect("step");

    let before = total_divergence(&unprojected);
    let after = total_divergence(&projected);
    assert!(
        after < before,
        "projection did not reduce divergence: {before} -> {after}"
    );
}

#[test]
fn perturb_produces_local_rightward_flow() {
    init_logger();
    let mut pipeline = pipeline_with(4, 4);
    pipeline.perturb(Vec2::splat(0.5), Vec2::new(1.0, 0.0), 0.1);
    pipeline.step(DT).expect("step");

    let near = pipeline.sample_velocity(Vec2::splat(0.5)).expect("ready");
    let far = pipeline
        .sample_velocity(Vec2::new(0.05, 0.05))
        .expect("ready");

    assert!(near.x > 1e-4, "no rightward flow at the impulse: {near}");
    assert!(
        far.length() < near.x * 0.5,
        "impulse was not localized: near {near}, far {far}"
    );
}

struct MaxSpeedPoller {
    calls: Rc<RefCell<usize>>,
    max_speed: Rc<RefCell<f32>>,
}

impl VelocityPoller for MaxSpeedPoller {
    fn poll_velocity(&mut self, snapshot: &VelocitySnapshot) {
        *self.calls.borrow_mut() += 1;
        let mut max = self.max_speed.borrow_mut();
        for y in 0..snapshot.resolution.y {
            for x in 0..snapshot.resolution.x {
                *max = max.max(snapshot.velocity_at(x, y).length());
            }
        }
    }
}

#[test]
fn pollers_run_once_per_step_until_detached() {
    init_logger();
    let calls = Rc::new(RefCell::new(0));
    let max_speed = Rc::new(RefCell::new(0.0f32));

    let mut pipeline = pipeline_with(16, 16);
    let id = pipeline.attach_poller(Box::new(MaxSpeedPoller {
        calls: calls.clone(),
        max_speed: max_speed.clone(),
    }));

    pipeline.perturb(Vec2::splat(0.5), Vec2::new(1.0, 0.0), 0.2);
    pipeline.step(DT).expect("step");
    pipeline.step(DT).expect("step");
    assert_eq!(*calls.borrow(), 2);
    assert!(*max_speed.borrow() > 0.0);

    pipeline.detach_poller(id);
    pipeline.detach_poller(id); // unknown id: no-op
    pipeline.step(DT).expect("step");
    assert_eq!(*calls.borrow(), 2);
}

#[test]
fn uploaded_density_survives_a_still_step() {
    init_logger();
    let mut pipeline = pipeline_with(8, 8);

    let block = vec![1.0f32; 2 * 2 * 4];
    pipeline
        .upload_region(FieldId::Density, UVec2::new(3, 3), UVec2::new(2, 2), &block)
        .expect("upload");
    pipeline.step(DT).expect("step");

    // Zero velocity: advection leaves the uploaded block in place.
    let density = pipeline.density().expect("ready");
    assert!((density.at(3, 3, 3) - 1.0).abs() < 1e-5);
    assert!(density.at(6, 6, 3).abs() < 1e-5);
}

#[test]
fn projection_tames_a_random_velocity_field() {
    use rand::{Rng, SeedableRng};

    init_logger();
    let mut pipeline = SolverPipeline::new(RenderingContext::cpu());
    pipeline
        .init(
            FluidOptions {
                size: Vec2::ONE,
                solver_resolution: UVec2::splat(16),
                render_resolution: UVec2::splat(16),
                jacobi_iterations: 40,
                ..Default::default()
            },
            false,
        )
        .expect("init");

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let noise: Vec<f32> = (0..16 * 16 * 2).map(|_| rng.gen_range(-1.0..1.0)).collect();
    pipeline
        .upload_region(FieldId::Velocity, UVec2::ZERO, UVec2::splat(16), &noise)
        .expect("upload");

    let before = total_divergence(&pipeline);
    pipeline.step(DT).expect("step");
    let after = total_divergence(&pipeline);

    assert!(before > 0.0);
    assert!(
        after < before * 0.9,
        "divergence was not tamed: {before} -> {after}"
    );
}

#[test]
fn not_ready_errors_are_reported_not_panicked() {
    init_logger();
    let mut pipeline = SolverPipeline::new(RenderingContext::cpu());
    assert!(matches!(pipeline.step(DT), Err(FluidError::NotReady)));
    assert!(matches!(
        pipeline.upload_region(FieldId::Density, UVec2::ZERO, UVec2::ONE, &[0.0; 4]),
        Err(FluidError::NotReady)
    ));
}
