pub mod color;
pub mod height;
pub mod mesh;
pub mod preview;
pub mod sphere;

pub use color::{ColorField, ColorFieldParams, ColorGradient, Rgb, TintParams};
pub use height::{HeightField, HeightFieldParams, HeightStack};
pub use mesh::{build_patch, grid_indices, BuildSettings, MeshData, PatchRequest};
pub use preview::{export_preview, render_preview, PreviewSummary};
pub use sphere::{build_sphere_patch, face_axes, CubeFace, SphereRequest};
