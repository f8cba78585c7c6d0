use bevy::math::{DVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::terrain::color::ColorField;
use crate::terrain::height::HeightStack;
use crate::terrain::mesh::{assemble_grid, grid_uv, BuildSettings, GridVertex, MeshData};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    pub fn local_up(self) -> Vec3 {
        match self {
            CubeFace::PosX => Vec3::X,
            CubeFace::NegX => Vec3::NEG_X,
            CubeFace::PosY => Vec3::Y,
            CubeFace::NegY => Vec3::NEG_Y,
            CubeFace::PosZ => Vec3::Z,
            CubeFace::NegZ => Vec3::NEG_Z,
        }
    }

    pub fn axes(self) -> (Vec3, Vec3) {
        face_axes(self.local_up())
    }
}

/// Tangent axes of a cube face. `axis_a x axis_b` points along `local_up`,
/// which keeps grid winding facing outward on every face.
pub fn face_axes(local_up: Vec3) -> (Vec3, Vec3) {
    let axis_a = Vec3::new(local_up.y, local_up.z, local_up.x);
    let axis_b = local_up.cross(axis_a);
    (axis_a, axis_b)
}

/// A square patch of a cube face, projected onto a sphere of `radius`.
///
/// `offset` is the patch centre on the cube whose half-extent equals the
/// planet radius, so a whole face is `offset = local_up * radius` with
/// `size = 2 * radius`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SphereRequest {
    pub offset: Vec3,
    pub size: f32,
    pub resolution: u32,
    pub radius: f32,
    /// Planet centre in world space. Fields are sampled at `origin + P` so
    /// neighbouring faces see one continuous field.
    pub origin: Vec3,
    pub local_up: Vec3,
    pub settings: BuildSettings,
}

/// Builds a cube-sphere patch. Vertex positions are relative to the planet
/// centre.
pub fn build_sphere_patch(
    request: &SphereRequest,
    heights: &HeightStack,
    colors: &ColorField,
) -> Result<MeshData, BuildError> {
    let SphereRequest {
        offset,
        size,
        resolution,
        radius,
        origin,
        local_up,
        settings,
    } = *request;

    if resolution == 0 {
        return Err(BuildError::ZeroResolution);
    }
    if !(size > 0.0 && size.is_finite()) {
        return Err(BuildError::InvalidExtent {
            width: size,
            height: size,
        });
    }
    if !(radius > 0.0 && radius.is_finite()) {
        return Err(BuildError::InvalidRadius(radius));
    }

    let (axis_a, axis_b) = face_axes(local_up);
    let (axis_a, axis_b) = (axis_a.as_dvec3(), axis_b.as_dvec3());
    let centre = offset.as_dvec3();
    let origin = origin.as_dvec3();
    let radius = radius as f64;
    let half = size as f64 / 2.0;

    Ok(assemble_grid(resolution, settings.emit_indices, |i, j| {
        let u = i as f64 / resolution as f64;
        let v = j as f64 / resolution as f64;
        let on_cube = centre + axis_a * ((2.0 * u - 1.0) * half) + axis_b * ((2.0 * v - 1.0) * half);
        let direction = on_cube.normalize_or_zero();
        let surface = direction * radius;
        let world = origin + surface;

        let elevation = if settings.apply_height {
            heights.get_at(world)
        } else {
            0.0
        };
        let color = if settings.apply_color {
            colors.get_color_at(world, elevation)
        } else {
            settings.debug_color
        };

        let displaced: DVec3 = surface + direction * elevation;
        GridVertex {
            position: displaced.as_vec3(),
            up: direction.as_vec3(),
            color,
            uv: grid_uv(i, j, resolution),
        }
    }))
}
