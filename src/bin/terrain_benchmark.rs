use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use bevy::math::Vec3;
use terrain_lod::chunk::{BuildJob, BuildRequest, ChunkManager, Geometry, WorkerPool};
use terrain_lod::defaults::lod::PLANET_RADIUS;
use terrain_lod::terrain::{BuildSettings, MeshData, PatchRequest};
use terrain_lod::TerrainConfig;

fn requests(config: &TerrainConfig, radius: i32, size: f32) -> Vec<BuildRequest> {
    (-radius..=radius)
        .flat_map(|y| (-radius..=radius).map(move |x| (x, y)))
        .map(|(x, y)| BuildRequest {
            geometry: Geometry::Patch(PatchRequest {
                width: size,
                height: size,
                resolution: config.resolution,
                offset: Vec3::new(x as f32 * size, y as f32 * size, 0.0),
                settings: BuildSettings::default(),
            }),
            heights: config.heights.clone(),
            colors: config.colors.clone(),
        })
        .collect()
}

fn main() {
    let radius: i32 = 3; // 7x7 patches
    let size = 500.0;
    let config = TerrainConfig::planar();
    let requests = requests(&config, radius, size);

    println!(
        "Terrain build benchmark: {} patches at resolution {}, {} workers",
        requests.len(),
        config.resolution,
        config.worker_count
    );

    let start = Instant::now();
    let inline: Vec<Option<MeshData>> = requests.iter().map(|r| r.execute().ok()).collect();
    let inline_ms = start.elapsed().as_secs_f64() * 1000.0;

    let mut pool = match WorkerPool::new(config.worker_count) {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("Failed to start workers: {}", err);
            return;
        }
    };
    let pooled: Rc<RefCell<Vec<Option<MeshData>>>> =
        Rc::new(RefCell::new(vec![None; requests.len()]));
    let start = Instant::now();
    for (index, request) in requests.iter().enumerate() {
        let job = match BuildJob::encode(request) {
            Ok(job) => job,
            Err(err) => {
                eprintln!("Failed to encode request {}: {}", index, err);
                continue;
            }
        };
        let pooled = Rc::clone(&pooled);
        pool.enqueue(job, move |result| {
            pooled.borrow_mut()[index] = result.ok().and_then(Result::ok);
        });
    }
    pool.wait_idle();
    let pooled_ms = start.elapsed().as_secs_f64() * 1000.0;

    let identical = inline
        .iter()
        .zip(pooled.borrow().iter())
        .filter(|(a, b)| a.is_some() && a == b)
        .count();

    println!("Inline:  {:.2} ms ({:.2} ms/patch)", inline_ms, inline_ms / inline.len() as f64);
    println!("Workers: {:.2} ms ({:.2} ms/patch)", pooled_ms, pooled_ms / inline.len() as f64);
    println!("Speedup: {:.2}x", inline_ms / pooled_ms.max(f64::EPSILON));
    println!("Bit-identical patches: {}/{}", identical, inline.len());

    let mut manager = match ChunkManager::from_config(&TerrainConfig::default()) {
        Ok(manager) => manager,
        Err(err) => {
            eprintln!("Failed to build chunk manager: {}", err);
            return;
        }
    };
    let viewer = Vec3::new(0.0, PLANET_RADIUS + 50.0, 0.0);
    let start = Instant::now();
    let report = manager.update(viewer);
    manager.wait_idle();
    println!(
        "Planet update: {} chunks built in {:.2} ms",
        report.builds_issued,
        start.elapsed().as_secs_f64() * 1000.0
    );

    if identical != inline.len() {
        std::process::exit(1);
    }
}
