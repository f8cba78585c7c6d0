use ::noise::{NoiseFn, Perlin, Simplex};
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::NoiseError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseType {
    Simplex,
    Perlin,
}

/// Plain-data description of a fractal noise source.
///
/// A generator never observes later edits to these values: change a field
/// (usually `seed`) and construct a fresh [`NoiseGenerator`] from it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub octaves: u32,
    pub persistence: f64,
    pub lacunarity: f64,
    pub exponentiation: f64,
    /// Output scale applied after exponentiation.
    pub height: f64,
    /// Input wavelength; sample coordinates are divided by it.
    pub scale: f64,
    pub noise_type: NoiseType,
    pub seed: u32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        use defaults::height::*;

        Self {
            octaves: OCTAVES,
            persistence: PERSISTENCE,
            lacunarity: LACUNARITY,
            exponentiation: EXPONENTIATION,
            height: HEIGHT,
            scale: SCALE,
            noise_type: NoiseType::Simplex,
            seed: SEED,
        }
    }
}

impl NoiseParams {
    pub fn biome() -> Self {
        use defaults::biome::*;

        Self {
            octaves: OCTAVES,
            persistence: PERSISTENCE,
            lacunarity: LACUNARITY,
            exponentiation: EXPONENTIATION,
            height: HEIGHT,
            scale: SCALE,
            noise_type: NoiseType::Simplex,
            seed: SEED,
        }
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), NoiseError> {
        if self.octaves == 0 {
            return Err(NoiseError::ZeroOctaves);
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(NoiseError::InvalidScale(self.scale));
        }
        let finite = [
            ("persistence", self.persistence),
            ("lacunarity", self.lacunarity),
            ("exponentiation", self.exponentiation),
            ("height", self.height),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(NoiseError::NonFiniteParameter(name));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
enum Primitive {
    Perlin(Perlin),
    Simplex(Simplex),
}

impl Primitive {
    fn new(noise_type: NoiseType, seed: u32) -> Self {
        match noise_type {
            NoiseType::Perlin => Primitive::Perlin(Perlin::new(seed)),
            NoiseType::Simplex => Primitive::Simplex(Simplex::new(seed)),
        }
    }

    // Raw primitives can overshoot [-1, 1] by a hair; clamp so the fBm
    // remap stays inside [0, 1].
    fn get_2d(&self, x: f64, y: f64) -> f64 {
        let value = match self {
            Primitive::Perlin(noise) => noise.get([x, y]),
            Primitive::Simplex(noise) => noise.get([x, y]),
        };
        value.clamp(-1.0, 1.0)
    }

    fn get_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        let value = match self {
            Primitive::Perlin(noise) => noise.get([x, y, z]),
            Primitive::Simplex(noise) => noise.get([x, y, z]),
        };
        value.clamp(-1.0, 1.0)
    }
}

/// Seeded fractal Brownian motion over a Perlin or Simplex primitive.
#[derive(Clone)]
pub struct NoiseGenerator {
    params: NoiseParams,
    primitive: Primitive,
}

impl std::fmt::Debug for NoiseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseGenerator")
            .field("params", &self.params)
            .finish()
    }
}

impl NoiseGenerator {
    pub fn new(params: NoiseParams) -> Result<Self, NoiseError> {
        params.validate()?;
        Ok(Self {
            primitive: Primitive::new(params.noise_type, params.seed),
            params,
        })
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }

    /// Normalized octave sum in [0, 1], before exponentiation and height.
    pub fn fbm_2d(&self, x: f64, y: f64) -> f64 {
        let xs = x / self.params.scale;
        let ys = y / self.params.scale;
        self.accumulate(|frequency| self.primitive.get_2d(xs * frequency, ys * frequency))
    }

    pub fn fbm_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        let xs = x / self.params.scale;
        let ys = y / self.params.scale;
        let zs = z / self.params.scale;
        self.accumulate(|frequency| {
            self.primitive
                .get_3d(xs * frequency, ys * frequency, zs * frequency)
        })
    }

    pub fn sample_2d(&self, x: f64, y: f64) -> f64 {
        self.shape(self.fbm_2d(x, y))
    }

    pub fn sample_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        self.shape(self.fbm_3d(x, y, z))
    }

    fn accumulate<F>(&self, mut octave: F) -> f64
    where
        F: FnMut(f64) -> f64,
    {
        let gain = 2.0_f64.powf(-self.params.persistence);
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut normalization = 0.0;
        let mut total = 0.0;

        for _ in 0..self.params.octaves {
            let value = octave(frequency) * 0.5 + 0.5;
            total += value * amplitude;
            normalization += amplitude;
            amplitude *= gain;
            frequency *= self.params.lacunarity;
        }

        total / normalization
    }

    fn shape(&self, total: f64) -> f64 {
        total.powf(self.params.exponentiation) * self.params.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn single_octave_perlin() -> NoiseParams {
        NoiseParams {
            octaves: 1,
            persistence: 1.0,
            lacunarity: 1.0,
            exponentiation: 1.0,
            height: 10.0,
            scale: 1.0,
            noise_type: NoiseType::Perlin,
            seed: 1,
        }
    }

    #[test]
    fn zero_octaves_is_rejected() {
        let params = NoiseParams {
            octaves: 0,
            ..NoiseParams::default()
        };
        assert_eq!(
            NoiseGenerator::new(params).unwrap_err(),
            NoiseError::ZeroOctaves
        );
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        let params = NoiseParams {
            scale: 0.0,
            ..NoiseParams::default()
        };
        assert!(matches!(
            NoiseGenerator::new(params),
            Err(NoiseError::InvalidScale(_))
        ));
    }

    #[test]
    fn nan_persistence_is_rejected() {
        let params = NoiseParams {
            persistence: f64::NAN,
            ..NoiseParams::default()
        };
        assert_eq!(
            NoiseGenerator::new(params).unwrap_err(),
            NoiseError::NonFiniteParameter("persistence")
        );
    }

    #[test]
    fn repeated_samples_are_bit_identical() {
        let generator = NoiseGenerator::new(NoiseParams::default()).expect("valid params");
        let first = generator.sample_2d(123.25, -847.5);
        for _ in 0..8 {
            assert_eq!(generator.sample_2d(123.25, -847.5).to_bits(), first.to_bits());
        }
        let first_3d = generator.sample_3d(1.0, 2.0, 3.0);
        assert_eq!(generator.sample_3d(1.0, 2.0, 3.0).to_bits(), first_3d.to_bits());
    }

    #[test]
    fn same_params_build_identical_generators() {
        let a = NoiseGenerator::new(single_octave_perlin()).expect("valid params");
        let b = NoiseGenerator::new(single_octave_perlin()).expect("valid params");
        let f = a.sample_2d(0.0, 0.0);
        assert!(f.is_finite());
        assert_eq!(f.to_bits(), b.sample_2d(0.0, 0.0).to_bits());
        // Gradient noise vanishes on lattice points, so the remapped octave is 0.5.
        assert!((f - 5.0).abs() < 1e-9);
    }

    #[test]
    fn reseeding_changes_the_field() {
        let params = NoiseParams::default();
        let a = NoiseGenerator::new(params).expect("valid params");
        let b = NoiseGenerator::new(params.with_seed(params.seed + 1)).expect("valid params");
        let differs = (0..32).any(|i| {
            let x = i as f64 * 97.3;
            a.sample_2d(x, x * 0.5) != b.sample_2d(x, x * 0.5)
        });
        assert!(differs);
    }

    #[test]
    fn fbm_stays_normalized() {
        let mut rng = StdRng::seed_from_u64(7);
        for noise_type in [NoiseType::Perlin, NoiseType::Simplex] {
            for octaves in 1..=8 {
                let params = NoiseParams {
                    octaves,
                    persistence: rng.gen_range(0.25..1.0),
                    lacunarity: rng.gen_range(0.5..3.0),
                    noise_type,
                    ..NoiseParams::default()
                };
                let generator = NoiseGenerator::new(params).expect("valid params");
                for _ in 0..200 {
                    let x = rng.gen_range(-1.0e5..1.0e5);
                    let y = rng.gen_range(-1.0e5..1.0e5);
                    let total = generator.fbm_2d(x, y);
                    assert!((0.0..=1.0).contains(&total), "fbm {total} out of range");
                    let total_3d = generator.fbm_3d(x, y, x - y);
                    assert!((0.0..=1.0).contains(&total_3d));
                }
            }
        }
    }

    #[test]
    fn params_round_trip_through_json() {
        let params = NoiseParams::biome().with_seed(99);
        let json = serde_json::to_string(&params).expect("serialize");
        assert!(json.contains("\"simplex\""));
        let decoded: NoiseParams = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded, params);
    }
}
