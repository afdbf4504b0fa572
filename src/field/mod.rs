//! Double-buffered 2D field storage.
//!
//! Every logical field (velocity, pressure, density, ...) is a [`GridBuffer`]:
//! two storage slots of interleaved `f32` channels plus a front-slot index.
//! A pass always reads the front slot and writes the back slot, then the
//! owner calls [`GridBuffer::swap`] to publish the result. No pass can ever
//! read and write the same slot in one invocation.

use glam::{UVec2, Vec2};

use crate::constants::MAX_FIELD_CHANNELS;

/// Typed handle for a logical field owned by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    Velocity,
    Vorticity,
    Pressure,
    Divergence,
    Density,
    BoundaryMask,
}

#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("invalid field resolution: {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    #[error("invalid channel count {channels}: must be 1-{max}", max = MAX_FIELD_CHANNELS)]
    InvalidChannelCount { channels: usize },

    #[error("field data size mismatch: expected {expected} floats, got {actual}")]
    DataSizeMismatch { expected: usize, actual: usize },

    #[error(
        "upload region out of bounds: origin ({x}, {y}) extent ({w}, {h}) exceeds {width}x{height}"
    )]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        width: u32,
        height: u32,
    },
}

/// Read-only view of one slot of a field, as handed to passes and renderers.
#[derive(Debug, Clone, Copy)]
pub struct FieldView<'a> {
    pub data: &'a [f32],
    pub resolution: UVec2,
    pub channels: usize,
}

impl<'a> FieldView<'a> {
    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y * self.resolution.x + x) as usize * self.channels
    }

    /// Value of one channel at a cell, clamped to the grid.
    #[inline]
    pub fn at(&self, x: i32, y: i32, channel: usize) -> f32 {
        let x = x.clamp(0, self.resolution.x as i32 - 1) as u32;
        let y = y.clamp(0, self.resolution.y as i32 - 1) as u32;
        self.data[self.index(x, y) + channel]
    }

    /// Bilinear sample at a position in cell coordinates (cell centers sit at
    /// integer coordinates). Clamps at the grid edges.
    pub fn sample(&self, pos: Vec2, channel: usize) -> f32 {
        let x = pos.x.floor();
        let y = pos.y.floor();
        let fx = pos.x - x;
        let fy = pos.y - y;
        let i = x as i32;
        let j = y as i32;

        let v00 = self.at(i, j, channel);
        let v10 = self.at(i + 1, j, channel);
        let v01 = self.at(i, j + 1, channel);
        let v11 = self.at(i + 1, j + 1, channel);

        let v0 = v00 * (1.0 - fx) + v10 * fx;
        let v1 = v01 * (1.0 - fx) + v11 * fx;
        v0 * (1.0 - fy) + v1 * fy
    }

    /// Bilinear sample of a two-channel field as a vector.
    pub fn sample_vec2(&self, pos: Vec2) -> Vec2 {
        Vec2::new(self.sample(pos, 0), self.sample(pos, 1))
    }
}

/// A named double-buffered field of fixed resolution and channel count.
pub struct GridBuffer {
    name: &'static str,
    resolution: UVec2,
    channels: usize,
    slots: [Vec<f32>; 2],
    front: usize,
}

impl GridBuffer {
    pub fn new(name: &'static str, resolution: UVec2, channels: usize) -> Result<Self, FieldError> {
        if resolution.x == 0 || resolution.y == 0 {
            return Err(FieldError::InvalidResolution {
                width: resolution.x,
                height: resolution.y,
            });
        }
        if channels == 0 || channels > MAX_FIELD_CHANNELS {
            return Err(FieldError::InvalidChannelCount { channels });
        }

        let len = (resolution.x * resolution.y) as usize * channels;
        log::debug!("[GridBuffer] allocating '{name}' {resolution}x{channels}ch ({len} floats/slot)");

        Ok(Self {
            name,
            resolution,
            channels,
            slots: [vec![0.0; len], vec![0.0; len]],
            front: 0,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Floats per slot.
    pub fn len(&self) -> usize {
        self.slots[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].is_empty()
    }

    /// The slot holding the output of the last completed pass.
    pub fn read(&self) -> &[f32] {
        &self.slots[self.front]
    }

    /// Read-only view of the front slot.
    pub fn view(&self) -> FieldView<'_> {
        FieldView {
            data: self.read(),
            resolution: self.resolution,
            channels: self.channels,
        }
    }

    /// Front slot as a view plus the back slot as the pass's write target.
    /// The two are guaranteed to be distinct storage.
    pub fn split(&mut self) -> (FieldView<'_>, &mut [f32]) {
        let (left, right) = self.slots.split_at_mut(1);
        let (read, write) = if self.front == 0 {
            (&left[0], &mut right[0])
        } else {
            (&right[0], &mut left[0])
        };
        (
            FieldView {
                data: read,
                resolution: self.resolution,
                channels: self.channels,
            },
            write.as_mut_slice(),
        )
    }

    /// Mutable access to the front slot, for host uploads and in-place
    /// rasterization outside the pass system.
    pub fn read_mut(&mut self) -> &mut [f32] {
        &mut self.slots[self.front]
    }

    /// Mutable access to the back slot without publishing it.
    pub fn write_target(&mut self) -> &mut [f32] {
        &mut self.slots[1 - self.front]
    }

    /// Publish the back slot as the new front.
    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }

    /// Zero both slots.
    pub fn clear(&mut self) {
        self.slots[0].fill(0.0);
        self.slots[1].fill(0.0);
    }

    /// Write a rectangular region of raw floats into the front slot.
    /// Out-of-range regions are an error, never clamped.
    pub fn upload_region(
        &mut self,
        origin: UVec2,
        extent: UVec2,
        data: &[f32],
    ) -> Result<(), FieldError> {
        let (w, h) = (self.resolution.x, self.resolution.y);
        let out_of_bounds = origin.x as u64 + extent.x as u64 > w as u64
            || origin.y as u64 + extent.y as u64 > h as u64;
        if out_of_bounds {
            return Err(FieldError::RegionOutOfBounds {
                x: origin.x,
                y: origin.y,
                w: extent.x,
                h: extent.y,
                width: w,
                height: h,
            });
        }

        let expected = (extent.x * extent.y) as usize * self.channels;
        if data.len() != expected {
            return Err(FieldError::DataSizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let channels = self.channels;
        let row_len = extent.x as usize * channels;
        let front = self.read_mut();
        for row in 0..extent.y {
            let src = &data[row as usize * row_len..(row as usize + 1) * row_len];
            let dst_start = ((origin.y + row) * w + origin.x) as usize * channels;
            front[dst_start..dst_start + row_len].copy_from_slice(src);
        }
        Ok(())
    }
}
