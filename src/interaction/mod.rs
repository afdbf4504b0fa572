//! Per-frame interaction submissions.
//!
//! Callers queue injectors (color/density sources), perturbers (velocity
//! impulses) and boundaries (obstacle markers) between frames; the pipeline
//! drains each queue exactly once at the start of the next step. The queues
//! are unbounded by contract - callers must step at least once per submitted
//! burst.

use glam::Vec2;

/// A paint/emission event at a world-space point with a radial falloff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Injector {
    pub position: Vec2,
    pub color: [f32; 3],
    pub size: f32,
    /// `true` replaces the destination value outright; `false` adds.
    pub overwrite: bool,
}

/// A velocity impulse at a world-space point with falloff radius `size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perturber {
    pub position: Vec2,
    pub velocity: Vec2,
    pub size: f32,
}

/// An obstacle marker rasterized into the boundary mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    pub position: Vec2,
    pub size: f32,
}

/// Transient lists of pending interactions, consumed once per step.
#[derive(Debug, Default)]
pub struct InteractionQueue {
    pub injectors: Vec<Injector>,
    pub perturbers: Vec<Perturber>,
    pub boundaries: Vec<Boundary>,
}

impl InteractionQueue {
    pub fn inject(&mut self, position: Vec2, r: f32, g: f32, b: f32, size: f32, overwrite: bool) {
        self.injectors.push(Injector {
            position,
            color: [r, g, b],
            size,
            overwrite,
        });
    }

    pub fn perturb(&mut self, position: Vec2, velocity: Vec2, size: f32) {
        self.perturbers.push(Perturber {
            position,
            velocity,
            size,
        });
    }

    pub fn add_boundary(&mut self, position: Vec2, size: f32) {
        self.boundaries.push(Boundary { position, size });
    }

    pub fn is_empty(&self) -> bool {
        self.injectors.is_empty() && self.perturbers.is_empty() && self.boundaries.is_empty()
    }

    /// Take all pending entries, leaving the queue empty.
    pub fn drain(&mut self) -> InteractionQueue {
        std::mem::take(self)
    }
}
