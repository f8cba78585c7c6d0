use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology};
use bevy::render::render_asset::RenderAssetUsages;

use crate::chunk::{ChunkDescriptor, ChunkKey, ChunkManager, MeshId};
use crate::config::{SurfaceMode, TerrainConfig};
use crate::terrain::mesh::MeshData;

/// Marks the entity whose position drives level of detail.
#[derive(Component, Default)]
pub struct TerrainViewer;

#[derive(Component)]
pub struct TerrainChunk {
    pub mesh_id: MeshId,
}

/// Maps the terrain frame into bevy's y-up world.
#[derive(Resource, Clone, Copy)]
pub struct TerrainFrame(pub Transform);

impl TerrainFrame {
    pub fn for_surface(surface: &SurfaceMode) -> Self {
        match surface {
            SurfaceMode::Planar { .. } => {
                TerrainFrame(Transform::from_rotation(Quat::from_rotation_x(-FRAC_PI_2)))
            }
            SurfaceMode::Planet { .. } => TerrainFrame(Transform::IDENTITY),
        }
    }

    pub fn to_terrain(&self, world: Vec3) -> Vec3 {
        self.0.rotation.inverse() * (world - self.0.translation)
    }

    /// Planar meshes are local to their chunk centre; planet meshes are local
    /// to the planet centre.
    pub fn chunk_transform(&self, surface: &SurfaceMode, descriptor: &ChunkDescriptor) -> Transform {
        let local = match surface {
            SurfaceMode::Planar { .. } => descriptor.offset,
            SurfaceMode::Planet { origin, .. } => *origin,
        };
        self.0.mul_transform(Transform::from_translation(local))
    }
}

#[derive(Resource)]
pub struct TerrainMaterial(pub Handle<StandardMaterial>);

struct UploadedChunk {
    entity: Entity,
    mesh: Handle<Mesh>,
    key: ChunkKey,
    revision: u64,
}

#[derive(Resource, Default)]
struct ChunkEntities {
    by_mesh: HashMap<MeshId, UploadedChunk>,
}

pub struct TerrainPlugin {
    pub config: TerrainConfig,
}

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        let manager = match ChunkManager::from_config(&self.config) {
            Ok(manager) => manager,
            Err(err) => {
                error!("Terrain disabled: {}", err);
                return;
            }
        };

        app.insert_non_send_resource(manager)
            .insert_resource(self.config.clone())
            .insert_resource(TerrainFrame::for_surface(&self.config.surface))
            .init_resource::<ChunkEntities>()
            .add_systems(Startup, setup_terrain_material)
            .add_systems(Update, (update_terrain_chunks, sync_chunk_meshes).chain());
    }
}

fn setup_terrain_material(
    mut commands: Commands,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // Vertex colors carry the tint; keep the base white so they show as-is.
    let material = materials.add(StandardMaterial {
        base_color: Color::WHITE,
        perceptual_roughness: 0.9,
        ..default()
    });
    commands.insert_resource(TerrainMaterial(material));
}

fn update_terrain_chunks(
    mut manager: NonSendMut<ChunkManager>,
    frame: Res<TerrainFrame>,
    viewers: Query<&GlobalTransform, With<TerrainViewer>>,
) {
    let Some(viewer) = viewers.iter().next() else {
        manager.poll();
        return;
    };

    let report = manager.update(frame.to_terrain(viewer.translation()));
    if !report.is_noop() {
        debug!(
            "Terrain update issued {} builds ({} live chunks)",
            report.builds_issued,
            manager.len()
        );
    }
}

fn sync_chunk_meshes(
    mut commands: Commands,
    manager: NonSend<ChunkManager>,
    frame: Res<TerrainFrame>,
    material: Option<Res<TerrainMaterial>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut entities: ResMut<ChunkEntities>,
    mut placed: Query<(&mut Transform, &mut Visibility), With<TerrainChunk>>,
) {
    let Some(material) = material else {
        return;
    };
    let surface = manager.surface();

    for (key, descriptor, chunk) in manager.chunks() {
        match entities.by_mesh.get_mut(&chunk.id()) {
            Some(uploaded) => {
                let Ok((mut transform, mut visible)) = placed.get_mut(uploaded.entity) else {
                    continue;
                };
                // A reused mesh stays hidden until its new chunk has geometry.
                if !chunk.is_visible() {
                    *visible = Visibility::Hidden;
                    continue;
                }
                if uploaded.revision != chunk.revision() || uploaded.key != *key {
                    if let Some(mesh) = meshes.get_mut(&uploaded.mesh) {
                        *mesh = to_bevy_mesh(chunk.data());
                    }
                    *transform = frame.chunk_transform(&surface, descriptor);
                    uploaded.revision = chunk.revision();
                    uploaded.key = *key;
                }
                *visible = Visibility::Visible;
            }
            None if chunk.is_visible() => {
                let mesh = meshes.add(to_bevy_mesh(chunk.data()));
                let entity = commands
                    .spawn((
                        PbrBundle {
                            mesh: mesh.clone(),
                            material: material.0.clone(),
                            transform: frame.chunk_transform(&surface, descriptor),
                            visibility: Visibility::Visible,
                            ..default()
                        },
                        TerrainChunk {
                            mesh_id: chunk.id(),
                        },
                    ))
                    .id();
                entities.by_mesh.insert(
                    chunk.id(),
                    UploadedChunk {
                        entity,
                        mesh,
                        key: *key,
                        revision: chunk.revision(),
                    },
                );
            }
            None => {}
        }
    }

    for pooled in manager.mesh_pool().free_meshes() {
        if let Some(uploaded) = entities.by_mesh.get(&pooled.id()) {
            if let Ok((_, mut visible)) = placed.get_mut(uploaded.entity) {
                *visible = Visibility::Hidden;
            }
        }
    }
}

/// Copies flat terrain buffers into a bevy triangle-list mesh.
pub fn to_bevy_mesh(data: &MeshData) -> Mesh {
    let positions: Vec<[f32; 3]> = data
        .positions
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    let normals: Vec<[f32; 3]> = data
        .normals
        .chunks_exact(3)
        .map(|n| [n[0], n[1], n[2]])
        .collect();
    let uvs: Vec<[f32; 2]> = data.uvs.chunks_exact(2).map(|uv| [uv[0], uv[1]]).collect();
    let colors: Vec<[f32; 4]> = data
        .colors
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2], 1.0])
        .collect();

    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::RENDER_WORLD | RenderAssetUsages::MAIN_WORLD,
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors);
    if let Some(indices) = &data.indices {
        mesh.insert_indices(Indices::U32(indices.clone()));
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::asset::AssetPlugin;
    use bevy::utils::HashSet;

    use crate::terrain::color::{ColorField, ColorFieldParams, Rgb};
    use crate::terrain::height::{HeightField, HeightFieldParams, HeightStack};
    use crate::terrain::mesh::{build_patch, BuildSettings, PatchRequest};

    fn flat_config(surface: SurfaceMode) -> TerrainConfig {
        TerrainConfig {
            heights: vec![HeightFieldParams::Fixed { elevation: 0.0 }],
            colors: ColorFieldParams::Fixed { color: Rgb::WHITE },
            surface,
            resolution: 2,
            detail_distances: vec![10.0],
            use_workers: false,
            ..TerrainConfig::default()
        }
    }

    fn headless_app(config: TerrainConfig, viewer: Vec3) -> (App, Entity) {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .init_asset::<Mesh>()
            .init_asset::<StandardMaterial>()
            .add_plugins(TerrainPlugin { config });
        let viewer = app
            .world_mut()
            .spawn((TerrainViewer, GlobalTransform::from_translation(viewer)))
            .id();
        (app, viewer)
    }

    fn placements(app: &mut App) -> HashMap<MeshId, (Vec3, Visibility)> {
        let mut query = app
            .world_mut()
            .query::<(&TerrainChunk, &Transform, &Visibility)>();
        query
            .iter(app.world())
            .map(|(chunk, transform, visibility)| (chunk.mesh_id, (transform.translation, *visibility)))
            .collect()
    }

    /// Every live mesh is shown where its chunk sits; pooled meshes are hidden.
    fn assert_chunks_placed(app: &mut App) {
        let placed = placements(app);
        let frame = *app.world().resource::<TerrainFrame>();
        let manager = app.world().non_send_resource::<ChunkManager>();
        let surface = manager.surface();
        assert!(!manager.is_empty());

        for (key, descriptor, mesh) in manager.chunks() {
            let (translation, visibility) = placed.get(&mesh.id()).expect("entity per live mesh");
            let expected = frame.chunk_transform(&surface, descriptor).translation;
            assert!(
                (*translation - expected).length() < 1e-3,
                "chunk {key:?} drawn at {translation} instead of {expected}"
            );
            assert_eq!(*visibility, Visibility::Visible);
        }
        for pooled in manager.mesh_pool().free_meshes() {
            if let Some((_, visibility)) = placed.get(&pooled.id()) {
                assert_eq!(*visibility, Visibility::Hidden);
            }
        }
    }

    #[test]
    fn planar_frame_maps_z_up_to_y_up() {
        let frame = TerrainFrame::for_surface(&TerrainConfig::planar().surface);
        let up = frame.0.rotation * Vec3::Z;
        assert!((up - Vec3::Y).length() < 1e-6);
        let terrain = frame.to_terrain(Vec3::new(3.0, 7.0, -2.0));
        assert!((terrain - Vec3::new(3.0, 2.0, 7.0)).length() < 1e-5);
    }

    #[test]
    fn mesh_conversion_keeps_every_attribute() {
        let data = build_patch(
            &PatchRequest {
                width: 10.0,
                height: 10.0,
                resolution: 2,
                offset: Vec3::ZERO,
                settings: BuildSettings::default(),
            },
            &HeightStack::new(vec![HeightField::Fixed(1.0)]),
            &ColorField::Fixed(Rgb::WHITE),
        )
        .expect("build");

        let mesh = to_bevy_mesh(&data);
        assert_eq!(mesh.count_vertices(), 9);
        assert_eq!(mesh.indices().map(Indices::len), Some(24));
        assert!(mesh.attribute(Mesh::ATTRIBUTE_COLOR).is_some());
        assert!(mesh.attribute(Mesh::ATTRIBUTE_UV_0).is_some());
    }

    #[test]
    fn planar_chunk_entities_sit_at_their_offsets() {
        let config = flat_config(SurfaceMode::Planar {
            root_size: 100.0,
            view_distance: 140.0,
        });
        let (mut app, _) = headless_app(config, Vec3::new(50.0, 50.0, 0.0));
        app.update();
        app.update();

        assert_chunks_placed(&mut app);
        let placed = placements(&mut app);
        assert_eq!(placed.len(), app.world().non_send_resource::<ChunkManager>().len());
        let distinct: HashSet<(i32, i32, i32)> = placed
            .values()
            .map(|(t, _)| (t.x.round() as i32, t.y.round() as i32, t.z.round() as i32))
            .collect();
        assert_eq!(distinct.len(), placed.len());
    }

    #[test]
    fn reused_meshes_follow_their_new_chunk() {
        let config = flat_config(SurfaceMode::Planar {
            root_size: 100.0,
            view_distance: 140.0,
        });
        // On a tile edge the viewer sees 12 roots; at a tile centre only 9.
        let (mut app, viewer) = headless_app(config, Vec3::new(50.0, 50.0, 0.0));
        app.update();
        let before = placements(&mut app).len();
        assert_eq!(before, 12);

        app.world_mut()
            .entity_mut(viewer)
            .insert(GlobalTransform::from_translation(Vec3::new(100_000.0, 50.0, 0.0)));
        app.update();

        let manager = app.world().non_send_resource::<ChunkManager>();
        assert_eq!(manager.len(), 9);
        assert_eq!(manager.mesh_pool().allocated(), 12);
        assert_eq!(manager.mesh_pool().free_meshes().count(), 3);
        assert_eq!(placements(&mut app).len(), before);
        assert_chunks_placed(&mut app);
    }

    #[test]
    fn planet_chunks_sit_on_the_planet_origin() {
        let origin = Vec3::new(10.0, -20.0, 30.0);
        let config = flat_config(SurfaceMode::Planet {
            radius: 500.0,
            origin,
        });
        let (mut app, _) = headless_app(config, Vec3::new(0.0, 100_000.0, 0.0));
        app.update();

        let placed = placements(&mut app);
        assert_eq!(placed.len(), 6);
        assert!(placed.values().all(|(t, _)| (*t - origin).length() < 1e-4));
        assert_chunks_placed(&mut app);
    }
}
