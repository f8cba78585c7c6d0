use std::fs;
use std::path::Path;

use bevy::math::Vec3;
use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::ConfigError;
use crate::terrain::color::ColorFieldParams;
use crate::terrain::height::HeightFieldParams;
use crate::terrain::mesh::BuildSettings;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceMode {
    /// Endless z-up plane of square root tiles.
    Planar { root_size: f32, view_distance: f32 },
    /// Cube-sphere planet centred on `origin`.
    Planet { radius: f32, origin: Vec3 },
}

impl Default for SurfaceMode {
    fn default() -> Self {
        SurfaceMode::Planet {
            radius: defaults::lod::PLANET_RADIUS,
            origin: Vec3::ZERO,
        }
    }
}

#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub heights: Vec<HeightFieldParams>,
    pub colors: ColorFieldParams,
    pub surface: SurfaceMode,
    pub resolution: u32,
    /// Split threshold per detail level; its length caps the tree depth.
    pub detail_distances: Vec<f32>,
    pub settings: BuildSettings,
    pub use_workers: bool,
    pub worker_count: usize,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        use defaults::lod::*;

        Self {
            heights: vec![HeightFieldParams::default()],
            colors: ColorFieldParams::default(),
            surface: SurfaceMode::default(),
            resolution: CHUNK_RESOLUTION,
            detail_distances: DETAIL_LEVEL_DISTANCES.to_vec(),
            settings: BuildSettings::default(),
            use_workers: true,
            worker_count: defaults::workers::WORKER_COUNT,
        }
    }
}

impl TerrainConfig {
    pub fn planar() -> Self {
        Self {
            surface: SurfaceMode::Planar {
                root_size: defaults::lod::ROOT_SIZE,
                view_distance: defaults::lod::VIEW_DISTANCE,
            },
            ..Self::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: TerrainConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution == 0 {
            return Err(ConfigError::Invalid("chunk resolution must be at least 1".into()));
        }
        if self.detail_distances.is_empty() {
            return Err(ConfigError::Invalid("detail distance table is empty".into()));
        }
        if let Some(bad) = self
            .detail_distances
            .iter()
            .find(|distance| !distance.is_finite() || **distance < 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "detail distance {bad} must be finite and non-negative"
            )));
        }
        match self.surface {
            SurfaceMode::Planar {
                root_size,
                view_distance,
            } => {
                if !(root_size > 0.0 && root_size.is_finite()) {
                    return Err(ConfigError::Invalid(format!(
                        "root size must be positive, got {root_size}"
                    )));
                }
                if !(view_distance >= 0.0 && view_distance.is_finite()) {
                    return Err(ConfigError::Invalid(format!(
                        "view distance must be non-negative, got {view_distance}"
                    )));
                }
            }
            SurfaceMode::Planet { radius, .. } => {
                if !(radius > 0.0 && radius.is_finite()) {
                    return Err(ConfigError::Invalid(format!(
                        "planet radius must be positive, got {radius}"
                    )));
                }
            }
        }
        if self.use_workers && self.worker_count == 0 {
            return Err(ConfigError::Invalid(
                "worker_count must be at least 1 when use_workers is set".into(),
            ));
        }

        for height in &self.heights {
            match height {
                HeightFieldParams::Noise { noise } | HeightFieldParams::Radial { noise, .. } => {
                    noise.validate()?
                }
                HeightFieldParams::Fixed { .. } => {}
            }
        }
        if let ColorFieldParams::Tints(tints) = &self.colors {
            tints.biome_noise.validate()?;
        }
        Ok(())
    }
}
