pub mod chunk;
pub mod config;
pub mod defaults;
pub mod error;
pub mod fractal;
pub mod render;
pub mod terrain;

pub use chunk::{ChunkManager, TerrainContext, UpdateReport};
pub use config::{SurfaceMode, TerrainConfig};
pub use error::{BuildError, ConfigError, NoiseError, WorkerError};
pub use render::{TerrainPlugin, TerrainViewer};
