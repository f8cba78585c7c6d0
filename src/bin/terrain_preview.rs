use std::env;
use std::process;

use terrain_lod::terrain::{export_preview, ColorField, HeightStack};
use terrain_lod::TerrainConfig;

fn main() {
    let args: Vec<String> = env::args().collect();
    let output = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "terrain_preview.png".to_string());
    let extent: f64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(16_000.0);
    let size: u32 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(512);

    let config = match env::var("TERRAIN_CONFIG") {
        Ok(path) => match TerrainConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Failed to load {}: {}", path, err);
                process::exit(1);
            }
        },
        Err(_) => TerrainConfig::planar(),
    };

    let fields = HeightStack::from_params(&config.heights)
        .and_then(|heights| Ok((heights, ColorField::from_params(&config.colors)?)));
    let (heights, colors) = match fields {
        Ok(fields) => fields,
        Err(err) => {
            eprintln!("Invalid terrain fields: {}", err);
            process::exit(1);
        }
    };

    println!(
        "Rendering {}x{} preview covering {:.0} units to {}",
        size, size, extent, output
    );
    match export_preview(&heights, &colors, (0.0, 0.0), extent, size, &output) {
        Ok(summary) => {
            println!(
                "Elevation range: {:.1} .. {:.1}",
                summary.min_elevation, summary.max_elevation
            );
            println!("Land coverage: {:.1}%", summary.land_ratio * 100.0);
        }
        Err(err) => {
            eprintln!("Failed to write preview: {}", err);
            process::exit(1);
        }
    }
}
