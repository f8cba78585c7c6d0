use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::BuildError;
use crate::terrain::color::{ColorField, Rgb};
use crate::terrain::height::HeightStack;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub colors: Vec<f32>,
    pub uvs: Vec<f32>,
    /// Left out when the receiver already holds the grid topology for this
    /// resolution.
    pub indices: Option<Vec<u32>>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.as_ref().map_or(0, |indices| indices.len() / 3)
    }

    pub fn position(&self, index: usize) -> [f32; 3] {
        let i = index * 3;
        [self.positions[i], self.positions[i + 1], self.positions[i + 2]]
    }

    pub fn normal(&self, index: usize) -> [f32; 3] {
        let i = index * 3;
        [self.normals[i], self.normals[i + 1], self.normals[i + 2]]
    }

    pub fn color(&self, index: usize) -> [f32; 3] {
        let i = index * 3;
        [self.colors[i], self.colors[i + 1], self.colors[i + 2]]
    }

    pub fn uv(&self, index: usize) -> [f32; 2] {
        let i = index * 2;
        [self.uvs[i], self.uvs[i + 1]]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub apply_height: bool,
    pub apply_color: bool,
    pub debug_color: Rgb,
    pub emit_indices: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            apply_height: true,
            apply_color: true,
            debug_color: Rgb::from_hex(defaults::color::DEBUG),
            emit_indices: true,
        }
    }
}

/// A planar patch centred on `offset`, spanning `width` x `height` in the XY
/// plane with elevation along +Z.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub width: f32,
    pub height: f32,
    pub resolution: u32,
    pub offset: Vec3,
    pub settings: BuildSettings,
}

pub fn build_patch(
    request: &PatchRequest,
    heights: &HeightStack,
    colors: &ColorField,
) -> Result<MeshData, BuildError> {
    let PatchRequest {
        width,
        height,
        resolution,
        offset,
        settings,
    } = *request;

    if resolution == 0 {
        return Err(BuildError::ZeroResolution);
    }
    if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
        return Err(BuildError::InvalidExtent { width, height });
    }

    let half_width = width as f64 / 2.0;
    let half_height = height as f64 / 2.0;
    let step_x = width as f64 / resolution as f64;
    let step_y = height as f64 / resolution as f64;
    let origin_x = offset.x as f64 - half_width;
    let origin_y = offset.y as f64 - half_height;

    Ok(assemble_grid(resolution, settings.emit_indices, |i, j| {
        let local_x = i as f64 * step_x - half_width;
        let local_y = j as f64 * step_y - half_height;
        let world_x = origin_x + i as f64 * step_x;
        let world_y = origin_y + j as f64 * step_y;

        let elevation = if settings.apply_height {
            heights.get(world_x, world_y)
        } else {
            0.0
        };
        let color = if settings.apply_color {
            colors.get_color(world_x, world_y, elevation)
        } else {
            settings.debug_color
        };

        GridVertex {
            position: Vec3::new(local_x as f32, local_y as f32, elevation as f32),
            up: Vec3::Z,
            color,
            uv: grid_uv(i, j, resolution),
        }
    }))
}

pub(crate) struct GridVertex {
    pub position: Vec3,
    /// Fallback normal for vertices whose adjacent faces are degenerate.
    pub up: Vec3,
    pub color: Rgb,
    pub uv: [f32; 2],
}

pub(crate) fn grid_uv(i: u32, j: u32, resolution: u32) -> [f32; 2] {
    [
        i as f32 / resolution as f32,
        1.0 - j as f32 / resolution as f32,
    ]
}

/// Samples a `(resolution + 1)^2` vertex grid, row by row along `j`, then
/// triangulates it and smooths normals across shared vertices.
pub(crate) fn assemble_grid<F>(resolution: u32, emit_indices: bool, mut vertex: F) -> MeshData
where
    F: FnMut(u32, u32) -> GridVertex,
{
    let stride = resolution as usize + 1;
    let vertex_count = stride * stride;
    let mut positions = Vec::with_capacity(vertex_count * 3);
    let mut ups = Vec::with_capacity(vertex_count);
    let mut colors = Vec::with_capacity(vertex_count * 3);
    let mut uvs = Vec::with_capacity(vertex_count * 2);

    for j in 0..=resolution {
        for i in 0..=resolution {
            let v = vertex(i, j);
            positions.extend_from_slice(&v.position.to_array());
            ups.push(v.up);
            colors.extend_from_slice(&v.color.0);
            uvs.extend_from_slice(&v.uv);
        }
    }

    let indices = grid_indices(resolution);
    let normals = smooth_normals(&positions, &indices, &ups);

    MeshData {
        positions,
        normals,
        colors,
        uvs,
        indices: emit_indices.then_some(indices),
    }
}

/// Two triangles per cell, `(a, b, d)` and `(b, c, d)`, counter-clockwise when
/// `i` runs along the first tangent axis and `j` along the second.
pub fn grid_indices(resolution: u32) -> Vec<u32> {
    let stride = resolution + 1;
    let mut indices = Vec::with_capacity((resolution * resolution * 6) as usize);
    for j in 0..resolution {
        for i in 0..resolution {
            let a = i + stride * j;
            let b = (i + 1) + stride * j;
            let c = (i + 1) + stride * (j + 1);
            let d = i + stride * (j + 1);
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
    indices
}

fn smooth_normals(positions: &[f32], indices: &[u32], ups: &[Vec3]) -> Vec<f32> {
    let at = |index: u32| {
        let i = index as usize * 3;
        Vec3::new(positions[i], positions[i + 1], positions[i + 2])
    };

    let mut accumulated = vec![Vec3::ZERO; ups.len()];
    for triangle in indices.chunks_exact(3) {
        let (p0, p1, p2) = (at(triangle[0]), at(triangle[1]), at(triangle[2]));
        // Unnormalized, so larger faces weigh more.
        let face = (p1 - p0).cross(p2 - p0);
        for &index in triangle {
            accumulated[index as usize] += face;
        }
    }

    let mut normals = Vec::with_capacity(ups.len() * 3);
    for (sum, up) in accumulated.into_iter().zip(ups) {
        let normal = sum.try_normalize().unwrap_or(*up);
        normals.extend_from_slice(&normal.to_array());
    }
    normals
}
