use bevy::math::DVec3;
use serde::{Deserialize, Serialize};

use crate::defaults::color::*;
use crate::error::NoiseError;
use crate::fractal::{NoiseGenerator, NoiseParams};

/// Linear RGB color with components in [0, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgb(pub [f32; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([1.0, 1.0, 1.0]);

    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xff) as f32 / 255.0;
        let g = ((hex >> 8) & 0xff) as f32 / 255.0;
        let b = (hex & 0xff) as f32 / 255.0;
        Rgb([r, g, b])
    }

    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let [r0, g0, b0] = self.0;
        let [r1, g1, b1] = other.0;
        Rgb([
            r0 + (r1 - r0) * t,
            g0 + (g1 - g0) * t,
            b0 + (b1 - b0) * t,
        ])
    }

    pub fn to_u8(self) -> [u8; 3] {
        self.0.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub value: f32,
    pub color: Rgb,
}

/// Piecewise-linear color ramp over [0, 1]. Stops are kept sorted by value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<GradientStop>", into = "Vec<GradientStop>")]
pub struct ColorGradient {
    stops: Vec<GradientStop>,
}

impl From<Vec<GradientStop>> for ColorGradient {
    fn from(stops: Vec<GradientStop>) -> Self {
        let mut gradient = ColorGradient { stops };
        gradient.sort();
        gradient
    }
}

impl From<ColorGradient> for Vec<GradientStop> {
    fn from(gradient: ColorGradient) -> Self {
        gradient.stops
    }
}

impl ColorGradient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stop(mut self, value: f32, color: Rgb) -> Self {
        self.add_stop(value, color);
        self
    }

    pub fn add_stop(&mut self, value: f32, color: Rgb) {
        self.stops.push(GradientStop { value, color });
        self.sort();
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }

    fn sort(&mut self) {
        self.stops.sort_by(|a, b| a.value.total_cmp(&b.value));
    }

    pub fn evaluate(&self, t: f32) -> Rgb {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return Rgb::default();
        };
        if t.is_nan() || t <= first.value {
            return first.color;
        }
        if t >= last.value {
            return last.color;
        }

        let upper = self.stops.partition_point(|stop| stop.value < t);
        let hi = self.stops[upper];
        let lo = self.stops[upper - 1];
        let span = hi.value - lo.value;
        if span <= f32::EPSILON {
            return hi.color;
        }
        lo.color.lerp(hi.color, (t - lo.value) / span)
    }

    pub fn arid() -> Self {
        ColorGradient::new()
            .with_stop(0.0, Rgb::from_hex(ARID_LOW))
            .with_stop(0.5, Rgb::from_hex(ARID_MID))
            .with_stop(1.0, Rgb::from_hex(SNOW))
    }

    pub fn humid() -> Self {
        ColorGradient::new()
            .with_stop(0.0, Rgb::from_hex(HUMID_LOW))
            .with_stop(0.5, Rgb::from_hex(HUMID_MID))
            .with_stop(1.0, Rgb::from_hex(SNOW))
    }

    pub fn ocean() -> Self {
        ColorGradient::new()
            .with_stop(0.0, Rgb::from_hex(DEEP_OCEAN))
            .with_stop(0.03, Rgb::from_hex(SHALLOW_OCEAN))
            .with_stop(0.05, Rgb::from_hex(SHALLOW_OCEAN))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TintParams {
    pub biome_noise: NoiseParams,
    pub arid: ColorGradient,
    pub humid: ColorGradient,
    pub ocean: ColorGradient,
    /// Normalized elevation below which the ocean ramp applies.
    pub ocean_threshold: f32,
    /// Elevation mapped to 1.0 before the ramps are evaluated.
    pub elevation_scale: f32,
}

impl Default for TintParams {
    fn default() -> Self {
        Self {
            biome_noise: NoiseParams::biome(),
            arid: ColorGradient::arid(),
            humid: ColorGradient::humid(),
            ocean: ColorGradient::ocean(),
            ocean_threshold: OCEAN_THRESHOLD,
            elevation_scale: ELEVATION_SCALE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFieldParams {
    Tints(TintParams),
    Fixed { color: Rgb },
}

impl Default for ColorFieldParams {
    fn default() -> Self {
        ColorFieldParams::Tints(TintParams::default())
    }
}

/// Hypsometric tinting: elevation picks a point on the arid and humid ramps,
/// biome noise mixes between them, and low ground takes the ocean ramp.
#[derive(Clone, Debug)]
pub enum ColorField {
    Tints {
        biome: NoiseGenerator,
        params: TintParams,
    },
    Fixed(Rgb),
}

impl ColorField {
    pub fn from_params(params: &ColorFieldParams) -> Result<Self, NoiseError> {
        Ok(match params {
            ColorFieldParams::Tints(tints) => ColorField::Tints {
                biome: NoiseGenerator::new(tints.biome_noise)?,
                params: tints.clone(),
            },
            ColorFieldParams::Fixed { color } => ColorField::Fixed(*color),
        })
    }

    pub fn params(&self) -> ColorFieldParams {
        match self {
            ColorField::Tints { params, .. } => ColorFieldParams::Tints(params.clone()),
            ColorField::Fixed(color) => ColorFieldParams::Fixed { color: *color },
        }
    }

    pub fn get_color(&self, x: f64, y: f64, elevation: f64) -> Rgb {
        match self {
            ColorField::Tints { biome, params } => {
                tint(params, biome.sample_2d(x, y), elevation)
            }
            ColorField::Fixed(color) => *color,
        }
    }

    pub fn get_color_at(&self, point: DVec3, elevation: f64) -> Rgb {
        match self {
            ColorField::Tints { biome, params } => {
                tint(params, biome.sample_3d(point.x, point.y, point.z), elevation)
            }
            ColorField::Fixed(color) => *color,
        }
    }
}

fn tint(params: &TintParams, moisture: f64, elevation: f64) -> Rgb {
    let scale = if params.elevation_scale > 0.0 {
        params.elevation_scale
    } else {
        1.0
    };
    let h = (elevation as f32 / scale).max(0.0);
    if h < params.ocean_threshold {
        return params.ocean.evaluate(h);
    }

    let m = (moisture as f32).clamp(0.0, 1.0);
    let arid = params.arid.evaluate(h);
    let humid = params.humid.evaluate(h);
    arid.lerp(humid, m)
}
