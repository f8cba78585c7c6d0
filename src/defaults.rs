pub mod height {
    pub const OCTAVES: u32 = 10;
    pub const PERSISTENCE: f64 = 0.5;
    pub const LACUNARITY: f64 = 1.6;
    pub const EXPONENTIATION: f64 = 7.5;
    pub const HEIGHT: f64 = 900.0;
    pub const SCALE: f64 = 1800.0;
    pub const SEED: u32 = 1;
}
pub mod biome {
    pub const OCTAVES: u32 = 2;
    pub const PERSISTENCE: f64 = 0.5;
    pub const LACUNARITY: f64 = 2.0;
    pub const EXPONENTIATION: f64 = 1.0;
    pub const HEIGHT: f64 = 1.0;
    pub const SCALE: f64 = 2048.0;
    pub const SEED: u32 = 2;
}
pub mod color {
    pub const ARID_LOW: u32 = 0xb7a67d;
    pub const ARID_MID: u32 = 0xf1e1bc;
    pub const HUMID_LOW: u32 = 0x29c100;
    pub const HUMID_MID: u32 = 0xcee59c;
    pub const SNOW: u32 = 0xffffff;
    pub const DEEP_OCEAN: u32 = 0x2002ff;
    pub const SHALLOW_OCEAN: u32 = 0x8080ff;
    pub const DEBUG: u32 = 0x808080;
    pub const OCEAN_THRESHOLD: f32 = 0.1;
    pub const ELEVATION_SCALE: f32 = 900.0;
}
pub mod lod {
    pub const DETAIL_LEVEL_DISTANCES: [f32; 7] = [2500.0, 1000.0, 400.0, 150.0, 70.0, 30.0, 10.0];
    pub const CHUNK_RESOLUTION: u32 = 64;
    pub const MIN_CELL_SIZE: f32 = 250.0;
    pub const PLANET_RADIUS: f32 = 4000.0;
    pub const VIEW_DISTANCE: f32 = 4000.0;
    pub const ROOT_SIZE: f32 = 8000.0;
}
pub mod workers {
    pub const WORKER_COUNT: usize = 7;
}
