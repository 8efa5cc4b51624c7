//! Headless editor viewport
//!
//! Usage: `viewport_app [config.toml|config.ron] [entity_ids.png]`
//!
//! Renders a small scene for a few frames on the headless backend, picks the
//! entity under the viewport centre and optionally writes the entity ID
//! attachment as a false-colour PNG.

use std::sync::Arc;

use editor_renderer::foundation::logging;
use editor_renderer::prelude::*;
use editor_renderer::render::scene::{DirectionalLight, GBufferAttachment, PointLight};
use log::{info, warn};

const FRAME_COUNT: u32 = 3;

fn load_config(path: Option<&str>) -> Result<RendererConfig, ConfigError> {
    let config = match path {
        Some(path) => RendererConfig::load_from_file(path)?,
        None => RendererConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn scene_lights() -> EnvironmentLight {
    EnvironmentLight {
        directional: Some(DirectionalLight::default()),
        point_lights: vec![PointLight {
            position: Vec3::new(2.0, 3.0, 2.0),
            color: Vec3::new(1.0, 0.8, 0.6),
            intensity: 4.0,
            range: 12.0,
        }],
        spot_lights: Vec::new(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first().map(String::as_str))?;
    logging::init_with_config(&config.logging);

    info!("Starting headless viewport");
    info!(
        "Render mode {:?}, viewport {}x{}",
        config.scene.render_mode(),
        config.viewport.width,
        config.viewport.height
    );

    let mut backend = HeadlessBackend::new();
    let mut renderer = SceneRenderer::new(&mut backend, &config)?;
    let cube = Arc::new(Mesh::cube(&mut backend)?);
    renderer.set_environment_light(scene_lights());
    renderer.set_outline_ids(&[1]);

    #[allow(clippy::cast_precision_loss)]
    let aspect = config.viewport.width as f32 / config.viewport.height as f32;
    let camera = SceneCamera::perspective(60.0_f32.to_radians(), aspect, 0.1, 100.0).looking_at(
        Vec3::new(3.0, 2.0, 5.0),
        Vec3::zeros(),
        Vec3::y(),
    );

    for frame in 0..FRAME_COUNT {
        renderer.reset_statistics();
        renderer.begin_scene(&camera)?;

        #[allow(clippy::cast_precision_loss)]
        let spin = Mat4::new_rotation(Vec3::y() * (frame as f32 * 0.3));
        renderer.submit_mesh(Some(&cube), &[], &spin, 1, true);
        renderer.submit_mesh(
            Some(&cube),
            &[],
            &Mat4::new_translation(&Vec3::new(0.0, -1.5, 0.0))
                .prepend_nonuniform_scaling(&Vec3::new(8.0, 0.1, 8.0)),
            2,
            false,
        );

        renderer.draw_quad_billboard(
            &Vec3::new(2.0, 3.0, 2.0),
            &Vec2::new(0.4, 0.4),
            &Vec4::new(1.0, 0.8, 0.6, 1.0),
            3,
        );
        renderer.draw_line(
            &Vec3::zeros(),
            &Vec3::new(1.5, 0.0, 0.0),
            &Vec4::new(1.0, 0.2, 0.2, 1.0),
            -1,
        );
        renderer.draw_infinite_line(&Vec3::zeros(), &Vec3::z(), &Vec4::new(0.3, 0.3, 0.3, 1.0));

        renderer.end_scene(&mut backend)?;

        let stats = renderer.statistics();
        info!(
            "Frame {frame}: {} meshes, {} draw calls ({} 2D, {} 3D)",
            stats.renderer3d.mesh_count,
            stats.total_draw_calls(),
            stats.renderer2d.draw_calls,
            stats.renderer3d.total_draw_calls()
        );
    }

    let (width, height) = renderer.viewport_size();
    #[allow(clippy::cast_possible_wrap)]
    let (center_x, center_y) = ((width / 2) as i32, (height / 2) as i32);
    let picked = renderer.read_entity_id(&mut backend, center_x, center_y)?;
    if picked == NO_ENTITY {
        info!("Nothing under the viewport centre");
    } else {
        info!("Entity {picked} under the viewport centre");
    }

    if let Some(path) = args.get(1) {
        let (framebuffer, attachment) = if renderer.scene_info().is_deferred() {
            (renderer.g_buffer(), GBufferAttachment::ObjectId.index())
        } else {
            (renderer.target_framebuffer(), 1)
        };
        match backend.object_id_image(framebuffer, attachment) {
            Ok(image) => {
                image.save_with_format(path, image::ImageFormat::Png)?;
                info!("Wrote entity IDs to {path}");
            }
            Err(e) => warn!("Could not export entity IDs: {e}"),
        }
    }

    renderer.shutdown(&mut backend);
    cube.destroy(&mut backend);
    info!("Viewport finished, {} backend resources left", backend.resource_count());
    Ok(())
}
