use bevy::math::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::NoiseError;
use crate::fractal::{NoiseGenerator, NoiseParams};

/// Serializable description of one elevation source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightFieldParams {
    Noise {
        noise: NoiseParams,
    },
    /// Noise whose influence fades out between `min_radius` and `max_radius`
    /// around `center`, for isolated islands.
    Radial {
        noise: NoiseParams,
        center: [f64; 3],
        min_radius: f64,
        max_radius: f64,
    },
    Fixed {
        elevation: f64,
    },
}

impl Default for HeightFieldParams {
    fn default() -> Self {
        HeightFieldParams::Noise {
            noise: NoiseParams::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum HeightField {
    Noise(NoiseGenerator),
    Radial {
        generator: NoiseGenerator,
        center: DVec3,
        min_radius: f64,
        max_radius: f64,
    },
    Fixed(f64),
}

impl HeightField {
    pub fn from_params(params: &HeightFieldParams) -> Result<Self, NoiseError> {
        Ok(match params {
            HeightFieldParams::Noise { noise } => HeightField::Noise(NoiseGenerator::new(*noise)?),
            HeightFieldParams::Radial {
                noise,
                center,
                min_radius,
                max_radius,
            } => HeightField::Radial {
                generator: NoiseGenerator::new(*noise)?,
                center: DVec3::from_array(*center),
                min_radius: *min_radius,
                max_radius: *max_radius,
            },
            HeightFieldParams::Fixed { elevation } => HeightField::Fixed(*elevation),
        })
    }

    pub fn params(&self) -> HeightFieldParams {
        match self {
            HeightField::Noise(generator) => HeightFieldParams::Noise {
                noise: *generator.params(),
            },
            HeightField::Radial {
                generator,
                center,
                min_radius,
                max_radius,
            } => HeightFieldParams::Radial {
                noise: *generator.params(),
                center: center.to_array(),
                min_radius: *min_radius,
                max_radius: *max_radius,
            },
            HeightField::Fixed(elevation) => HeightFieldParams::Fixed {
                elevation: *elevation,
            },
        }
    }

    /// Planar lookup: `(elevation, weight)` at world `(x, y)`.
    pub fn get(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            HeightField::Noise(generator) => (generator.sample_2d(x, y), 1.0),
            HeightField::Radial {
                generator,
                center,
                min_radius,
                max_radius,
            } => {
                let distance = (x - center.x).hypot(y - center.y);
                (
                    generator.sample_2d(x, y),
                    falloff(distance, *min_radius, *max_radius),
                )
            }
            HeightField::Fixed(elevation) => (*elevation, 1.0),
        }
    }

    /// Lookup at a world-space point on a planet surface.
    pub fn get_at(&self, point: DVec3) -> (f64, f64) {
        match self {
            HeightField::Noise(generator) => {
                (generator.sample_3d(point.x, point.y, point.z), 1.0)
            }
            HeightField::Radial {
                generator,
                center,
                min_radius,
                max_radius,
            } => (
                generator.sample_3d(point.x, point.y, point.z),
                falloff(point.distance(*center), *min_radius, *max_radius),
            ),
            HeightField::Fixed(elevation) => (*elevation, 1.0),
        }
    }
}

fn falloff(distance: f64, min_radius: f64, max_radius: f64) -> f64 {
    1.0 - smoothstep(min_radius, max_radius, distance)
}

pub fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Weighted blend of several height fields evaluated at the same point.
#[derive(Clone, Debug, Default)]
pub struct HeightStack {
    fields: Vec<HeightField>,
}

impl HeightStack {
    pub fn new(fields: Vec<HeightField>) -> Self {
        Self { fields }
    }

    pub fn from_params(params: &[HeightFieldParams]) -> Result<Self, NoiseError> {
        let fields = params
            .iter()
            .map(HeightField::from_params)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fields })
    }

    pub fn params(&self) -> Vec<HeightFieldParams> {
        self.fields.iter().map(HeightField::params).collect()
    }

    pub fn fields(&self) -> &[HeightField] {
        &self.fields
    }

    pub fn get(&self, x: f64, y: f64) -> f64 {
        blend(self.fields.iter().map(|field| field.get(x, y)))
    }

    pub fn get_at(&self, point: DVec3) -> f64 {
        blend(self.fields.iter().map(|field| field.get_at(point)))
    }
}

fn blend<I>(samples: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (elevation, weight) in samples {
        weighted += elevation * weight;
        total_weight += weight;
    }
    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    }
}
