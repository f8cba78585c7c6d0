use std::collections::HashMap;

use bevy::log::{debug, info, warn};
use bevy::math::Vec3;
use bevy::utils::HashSet;
use crossbeam::channel::{self, Receiver, Sender};

use crate::chunk::pool::WorkerPool;
use crate::chunk::quadtree::{ChunkDescriptor, CubeQuadTree, PlanarQuadTree, QuadTree};
use crate::chunk::request::{BuildJob, BuildRequest, Geometry};
use crate::config::{SurfaceMode, TerrainConfig};
use crate::error::{BuildError, ConfigError, NoiseError};
use crate::terrain::color::{ColorField, ColorFieldParams};
use crate::terrain::height::{HeightFieldParams, HeightStack};
use crate::terrain::mesh::{BuildSettings, MeshData, PatchRequest};
use crate::terrain::sphere::{CubeFace, SphereRequest};

/// Chunk positions are snapped to 1/64 of a world unit before hashing.
const KEY_QUANTUM: f32 = 64.0;

fn quantize(value: f32) -> i64 {
    (value * KEY_QUANTUM).round() as i64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    face: Option<u8>,
    x: i64,
    y: i64,
    z: i64,
    radius: i64,
}

impl ChunkKey {
    pub fn from_descriptor(descriptor: &ChunkDescriptor) -> Self {
        Self {
            face: descriptor.face.map(|face| face as u8),
            x: quantize(descriptor.offset.x),
            y: quantize(descriptor.offset.y),
            z: quantize(descriptor.offset.z),
            radius: quantize(descriptor.radius),
        }
    }
}

/// Free-list bucket: mesh objects are only reused for the same size and
/// resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshPoolKey {
    size: i64,
    resolution: u32,
}

impl MeshPoolKey {
    pub fn from_descriptor(descriptor: &ChunkDescriptor) -> Self {
        Self {
            size: quantize(descriptor.size()),
            resolution: descriptor.resolution,
        }
    }
}

pub type MeshId = u64;

#[derive(Debug)]
pub struct ChunkMesh {
    id: MeshId,
    pool_key: MeshPoolKey,
    data: MeshData,
    visible: bool,
    revision: u64,
    topology: Option<u32>,
}

impl ChunkMesh {
    fn new(id: MeshId, pool_key: MeshPoolKey) -> Self {
        Self {
            id,
            pool_key,
            data: MeshData::default(),
            visible: false,
            revision: 0,
            topology: None,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn pool_key(&self) -> MeshPoolKey {
        self.pool_key
    }

    pub fn data(&self) -> &MeshData {
        &self.data
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Bumped on every write so consumers can skip unchanged buffers.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn has_topology(&self, resolution: u32) -> bool {
        self.topology == Some(resolution)
    }

    fn write(&mut self, mut data: MeshData, resolution: u32) {
        match data.indices {
            Some(_) => self.topology = Some(resolution),
            None => data.indices = self.data.indices.take(),
        }
        self.data = data;
        self.visible = true;
        self.revision += 1;
    }
}

#[derive(Debug, Default)]
pub struct MeshObjectPool {
    free: HashMap<MeshPoolKey, Vec<ChunkMesh>>,
    allocated: u64,
}

impl MeshObjectPool {
    pub fn acquire(&mut self, key: MeshPoolKey) -> ChunkMesh {
        if let Some(mesh) = self.free.get_mut(&key).and_then(Vec::pop) {
            return mesh;
        }
        let mesh = ChunkMesh::new(self.allocated, key);
        self.allocated += 1;
        mesh
    }

    pub fn release(&mut self, mut mesh: ChunkMesh) {
        mesh.visible = false;
        self.free.entry(mesh.pool_key).or_default().push(mesh);
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    pub fn free_count(&self, key: MeshPoolKey) -> usize {
        self.free.get(&key).map_or(0, Vec::len)
    }

    pub fn free_meshes(&self) -> impl Iterator<Item = &ChunkMesh> {
        self.free.values().flatten()
    }
}

pub struct TerrainContext {
    height_params: Vec<HeightFieldParams>,
    color_params: ColorFieldParams,
    heights: HeightStack,
    colors: ColorField,
    settings: BuildSettings,
    workers: Option<WorkerPool<BuildJob>>,
}

impl TerrainContext {
    pub fn new(
        height_params: Vec<HeightFieldParams>,
        color_params: ColorFieldParams,
        settings: BuildSettings,
        workers: Option<WorkerPool<BuildJob>>,
    ) -> Result<Self, NoiseError> {
        Ok(Self {
            heights: HeightStack::from_params(&height_params)?,
            colors: ColorField::from_params(&color_params)?,
            height_params,
            color_params,
            settings,
            workers,
        })
    }

    pub fn from_config(config: &TerrainConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let workers = if config.use_workers {
            Some(
                WorkerPool::new(config.worker_count)
                    .map_err(|err| ConfigError::Invalid(err.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self::new(
            config.heights.clone(),
            config.colors.clone(),
            config.settings,
            workers,
        )?)
    }

    pub fn heights(&self) -> &HeightStack {
        &self.heights
    }

    pub fn colors(&self) -> &ColorField {
        &self.colors
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn uses_workers(&self) -> bool {
        self.workers.is_some()
    }

    /// Replaces the field definitions. Generators are rebuilt before anything
    /// is swapped, so a bad param set leaves the context untouched.
    pub fn set_params(
        &mut self,
        height_params: Vec<HeightFieldParams>,
        color_params: ColorFieldParams,
    ) -> Result<(), NoiseError> {
        let heights = HeightStack::from_params(&height_params)?;
        let colors = ColorField::from_params(&color_params)?;
        self.heights = heights;
        self.colors = colors;
        self.height_params = height_params;
        self.color_params = color_params;
        Ok(())
    }

    fn request(&self, geometry: Geometry) -> BuildRequest {
        BuildRequest {
            geometry,
            heights: self.height_params.clone(),
            colors: self.color_params.clone(),
        }
    }
}

struct LiveChunk {
    descriptor: ChunkDescriptor,
    mesh: ChunkMesh,
    ticket: u64,
    pending: bool,
}

struct BuildResult {
    key: ChunkKey,
    ticket: u64,
    outcome: Result<MeshData, BuildError>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    pub applied: usize,
    pub discarded: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateReport {
    pub added: Vec<ChunkKey>,
    pub removed: Vec<ChunkKey>,
    pub kept: usize,
    pub builds_issued: usize,
    pub completions: PollReport,
}

impl PollReport {
    fn absorb(&mut self, other: PollReport) {
        self.applied += other.applied;
        self.discarded += other.discarded;
        self.failed += other.failed;
    }
}

impl UpdateReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Keeps the live chunk set in step with the quadtree and routes mesh builds.
///
/// Every build carries the chunk key plus a ticket issued when it was
/// submitted; a result is written only if that chunk is still live with the
/// same ticket.
pub struct ChunkManager {
    context: TerrainContext,
    tree: QuadTree,
    surface: SurfaceMode,
    resolution: u32,
    live: HashMap<ChunkKey, LiveChunk>,
    pool: MeshObjectPool,
    results_tx: Sender<BuildResult>,
    results_rx: Receiver<BuildResult>,
    next_ticket: u64,
}

impl ChunkManager {
    pub fn new(
        context: TerrainContext,
        surface: SurfaceMode,
        resolution: u32,
        detail_distances: Vec<f32>,
    ) -> Self {
        let tree = match surface {
            SurfaceMode::Planar {
                root_size,
                view_distance,
            } => QuadTree::Planar(PlanarQuadTree::new(root_size, view_distance, detail_distances)),
            SurfaceMode::Planet { radius, origin } => {
                QuadTree::Cube(CubeQuadTree::new(radius, origin, detail_distances))
            }
        };
        let (results_tx, results_rx) = channel::unbounded();
        Self {
            context,
            tree,
            surface,
            resolution: resolution.max(1),
            live: HashMap::default(),
            pool: MeshObjectPool::default(),
            results_tx,
            results_rx,
            next_ticket: 0,
        }
    }

    pub fn from_config(config: &TerrainConfig) -> Result<Self, ConfigError> {
        let context = TerrainContext::from_config(config)?;
        Ok(Self::new(
            context,
            config.surface,
            config.resolution,
            config.detail_distances.clone(),
        ))
    }

    pub fn context(&self) -> &TerrainContext {
        &self.context
    }

    pub fn surface(&self) -> SurfaceMode {
        self.surface
    }

    pub fn mesh_pool(&self) -> &MeshObjectPool {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.live.contains_key(key)
    }

    pub fn mesh(&self, key: &ChunkKey) -> Option<&ChunkMesh> {
        self.live.get(key).map(|chunk| &chunk.mesh)
    }

    pub fn chunks(&self) -> impl Iterator<Item = (&ChunkKey, &ChunkDescriptor, &ChunkMesh)> {
        self.live
            .iter()
            .map(|(key, chunk)| (key, &chunk.descriptor, &chunk.mesh))
    }

    pub fn pending(&self) -> usize {
        self.live.values().filter(|chunk| chunk.pending).count()
    }

    pub fn is_busy(&self) -> bool {
        self.pending() > 0
            || self
                .context
                .workers
                .as_ref()
                .is_some_and(WorkerPool::is_busy)
    }

    /// One tick: apply finished builds, refresh the quadtree for `viewer`,
    /// then diff the visible set against the live one.
    pub fn update(&mut self, viewer: Vec3) -> UpdateReport {
        let completions = self.poll();
        self.tree.update(viewer);
        let chunks = self.tree.chunks(self.resolution);
        let mut report = self.apply_chunks(chunks);
        report.completions.absorb(completions);
        report
    }

    /// Diffs `chunks` against the live set by key. Chunks present in both keep
    /// their mesh untouched. Without workers, new chunks are built and written
    /// before this returns.
    pub fn apply_chunks(&mut self, chunks: Vec<ChunkDescriptor>) -> UpdateReport {
        let next: HashMap<ChunkKey, ChunkDescriptor> = chunks
            .into_iter()
            .map(|descriptor| (ChunkKey::from_descriptor(&descriptor), descriptor))
            .collect();

        let mut removed: Vec<ChunkKey> = self
            .live
            .keys()
            .filter(|key| !next.contains_key(*key))
            .copied()
            .collect();
        let mut added: Vec<(ChunkKey, ChunkDescriptor)> = next
            .iter()
            .filter(|(key, _)| !self.live.contains_key(*key))
            .map(|(key, descriptor)| (*key, *descriptor))
            .collect();

        let mut report = UpdateReport::default();
        if removed.is_empty() && added.is_empty() {
            report.kept = self.live.len();
            return report;
        }
        removed.sort_unstable();
        added.sort_unstable_by_key(|(key, _)| *key);

        for key in &removed {
            if let Some(chunk) = self.live.remove(key) {
                self.pool.release(chunk.mesh);
            }
        }
        report.kept = self.live.len();

        for (key, descriptor) in &added {
            let mesh = self.pool.acquire(MeshPoolKey::from_descriptor(descriptor));
            self.live.insert(
                *key,
                LiveChunk {
                    descriptor: *descriptor,
                    mesh,
                    ticket: 0,
                    pending: false,
                },
            );
            self.submit(*key);
            report.builds_issued += 1;
        }

        report.removed = removed;
        report.added = added.into_iter().map(|(key, _)| key).collect();
        report.completions = self.settle_inline();
        debug!(
            "Terrain chunks: {} added, {} removed, {} kept",
            report.added.len(),
            report.removed.len(),
            report.kept
        );
        report
    }

    pub fn poll(&mut self) -> PollReport {
        if let Some(workers) = self.context.workers.as_mut() {
            workers.poll();
        }
        self.drain_results()
    }

    /// Blocks until every outstanding build has landed and been applied.
    pub fn wait_idle(&mut self) -> PollReport {
        if let Some(workers) = self.context.workers.as_mut() {
            workers.wait_idle();
        }
        self.drain_results()
    }

    pub fn set_params(
        &mut self,
        height_params: Vec<HeightFieldParams>,
        color_params: ColorFieldParams,
    ) -> Result<(), NoiseError> {
        self.context.set_params(height_params, color_params)?;
        self.rebuild_all();
        Ok(())
    }

    /// Resubmits every live chunk. Meshes keep their current geometry until
    /// the new build lands; results from earlier builds are discarded.
    pub fn rebuild_all(&mut self) -> usize {
        let mut keys: Vec<ChunkKey> = self.live.keys().copied().collect();
        keys.sort_unstable();
        info!("Rebuilding {} terrain chunks", keys.len());
        for key in &keys {
            self.submit(*key);
        }
        self.settle_inline();
        keys.len()
    }

    fn geometry(&self, descriptor: &ChunkDescriptor, emit_indices: bool) -> Geometry {
        let settings = BuildSettings {
            emit_indices,
            ..self.context.settings
        };
        match (self.surface, descriptor.face) {
            (SurfaceMode::Planet { radius, origin }, Some(face)) => Geometry::Sphere(SphereRequest {
                offset: descriptor.offset,
                size: descriptor.size(),
                resolution: descriptor.resolution,
                radius,
                origin,
                local_up: CubeFace::local_up(face),
                settings,
            }),
            _ => Geometry::Patch(PatchRequest {
                width: descriptor.size(),
                height: descriptor.size(),
                resolution: descriptor.resolution,
                offset: descriptor.offset,
                settings,
            }),
        }
    }

    fn submit(&mut self, key: ChunkKey) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let Some(chunk) = self.live.get_mut(&key) else {
            return;
        };
        chunk.ticket = ticket;
        chunk.pending = true;
        let descriptor = chunk.descriptor;
        let emit_indices = !chunk.mesh.has_topology(descriptor.resolution);
        let request = self.context.request(self.geometry(&descriptor, emit_indices));

        match self.context.workers.as_mut() {
            Some(workers) => match BuildJob::encode(&request) {
                Ok(job) => {
                    let results = self.results_tx.clone();
                    workers.enqueue(job, move |outcome| {
                        let outcome = outcome.map_err(BuildError::from).and_then(|built| built);
                        let _ = results.send(BuildResult {
                            key,
                            ticket,
                            outcome,
                        });
                    });
                }
                Err(err) => {
                    warn!("Could not encode terrain chunk {:?}: {}", key, err);
                    if let Some(chunk) = self.live.get_mut(&key) {
                        chunk.pending = false;
                    }
                }
            },
            None => {
                let outcome = request.execute_with(&self.context.heights, &self.context.colors);
                let _ = self.results_tx.send(BuildResult {
                    key,
                    ticket,
                    outcome,
                });
            }
        }
    }

    /// Inline builds have already run; write them now so the frame that
    /// retired meshes also shows their replacements.
    fn settle_inline(&mut self) -> PollReport {
        if self.context.uses_workers() {
            PollReport::default()
        } else {
            self.drain_results()
        }
    }

    fn drain_results(&mut self) -> PollReport {
        let mut report = PollReport::default();
        while let Ok(result) = self.results_rx.try_recv() {
            let Some(chunk) = self
                .live
                .get_mut(&result.key)
                .filter(|chunk| chunk.ticket == result.ticket)
            else {
                debug!("Discarding stale terrain build for {:?}", result.key);
                report.discarded += 1;
                continue;
            };

            chunk.pending = false;
            match result.outcome {
                Ok(data) => {
                    chunk.mesh.write(data, chunk.descriptor.resolution);
                    report.applied += 1;
                }
                Err(err) => {
                    warn!("Terrain chunk {:?} failed to build: {}", result.key, err);
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn keys(&self) -> Vec<ChunkKey> {
        let mut keys: Vec<ChunkKey> = self.live.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn active_mesh_ids(&self) -> HashSet<MeshId> {
        self.live.values().map(|chunk| chunk.mesh.id).collect()
    }
}
