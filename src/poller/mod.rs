//! Velocity observation.
//!
//! Consumers that need the simulated velocity (audio, physics, UI) register a
//! [`VelocityPoller`]; the pipeline invokes every registered poller once per
//! completed step with a borrowed snapshot. The snapshot is backed by
//! pipeline-owned storage reused next frame, so the borrow ends with the call.

use glam::{UVec2, Vec2};

/// Handle returned by `attach`; detaching an unknown handle is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollerId(u64);

/// Point-in-time, read-only view of the velocity field.
#[derive(Debug, Clone, Copy)]
pub struct VelocitySnapshot<'a> {
    /// Solver-grid resolution of the snapshot.
    pub resolution: UVec2,
    /// Interleaved (x, y) velocity per cell, row-major.
    pub data: &'a [f32],
}

impl<'a> VelocitySnapshot<'a> {
    /// Velocity at a cell, clamped to the grid.
    pub fn velocity_at(&self, x: u32, y: u32) -> Vec2 {
        let x = x.min(self.resolution.x - 1);
        let y = y.min(self.resolution.y - 1);
        let idx = (y * self.resolution.x + x) as usize * 2;
        Vec2::new(self.data[idx], self.data[idx + 1])
    }
}

/// Observer notified with sampled velocity data after each frame.
pub trait VelocityPoller {
    fn poll_velocity(&mut self, snapshot: &VelocitySnapshot);
}

/// Registry of attached pollers. Notification order is insertion order, but
/// is not guaranteed stable across attach/detach churn.
#[derive(Default)]
pub struct PollerRegistry {
    pollers: Vec<(PollerId, Box<dyn VelocityPoller>)>,
    next_id: u64,
}

impl PollerRegistry {
    pub fn attach(&mut self, poller: Box<dyn VelocityPoller>) -> PollerId {
        let id = PollerId(self.next_id);
        self.next_id += 1;
        self.pollers.push((id, poller));
        id
    }

    pub fn detach(&mut self, id: PollerId) {
        self.pollers.retain(|(pid, _)| *pid != id);
    }

    pub fn len(&self) -> usize {
        self.pollers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pollers.is_empty()
    }

    pub fn notify(&mut self, snapshot: &VelocitySnapshot) {
        for (_, poller) in &mut self.pollers {
            poller.poll_velocity(snapshot);
        }
    }
}
