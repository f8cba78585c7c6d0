pub mod manager;
pub mod pool;
pub mod quadtree;
pub mod request;

pub use manager::{
    ChunkKey, ChunkManager, ChunkMesh, MeshId, MeshObjectPool, MeshPoolKey, PollReport,
    TerrainContext, UpdateReport,
};
pub use pool::{Job, JobId, WorkerPool};
pub use quadtree::{ChunkDescriptor, CubeQuadTree, PlanarQuadTree, QuadTree, QuadTreeNode};
pub use request::{BuildJob, BuildRequest, Geometry};
