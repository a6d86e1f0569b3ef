//! Diffuse irradiance map, convolved from the environment once when the scene is uploaded

use crate::bind;
use crate::context::{validated, RenderError};
use crate::shaders;
use crate::targets::RenderTarget;

pub const IRRADIANCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Equirectangular, 2:1 like the environment it is convolved from
pub const IRRADIANCE_WIDTH: u32 = 64;
pub const IRRADIANCE_HEIGHT: u32 = 32;

const WORKGROUP_SIZE: u32 = 8;

pub fn workgroups(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(WORKGROUP_SIZE), height.div_ceil(WORKGROUP_SIZE))
}

/// Run the cosine-weighted convolution of `environment` and return the result
pub fn convolve(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    environment: &wgpu::TextureView,
) -> Result<RenderTarget, RenderError> {
    let compute = wgpu::ShaderStages::COMPUTE;
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Irradiance BGL"),
        entries: &[
            bind::unfilterable_2d(0, compute),
            bind::storage_texture(1, compute, IRRADIANCE_FORMAT),
        ],
    });
    let pipeline = validated(device, "Irradiance Pipeline", || {
        let module = shaders::module(device, "Irradiance Shader", shaders::IRRADIANCE);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Irradiance Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Irradiance Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("cs_irradiance"),
            compilation_options: Default::default(),
            cache: None,
        })
    })?;

    let irradiance = RenderTarget::new(
        device,
        "Irradiance Map",
        IRRADIANCE_WIDTH,
        IRRADIANCE_HEIGHT,
        IRRADIANCE_FORMAT,
        wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
    );
    let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Irradiance Bind Group"),
        layout: &layout,
        entries: &[bind::view_entry(0, environment), bind::view_entry(1, &irradiance.view)],
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Irradiance Encoder"),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Irradiance Convolution"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &group, &[]);
        let (x, y) = workgroups(IRRADIANCE_WIDTH, IRRADIANCE_HEIGHT);
        pass.dispatch_workgroups(x, y, 1);
    }
    queue.submit(std::iter::once(encoder.finish()));

    log::debug!(
        "Convolved {}x{} irradiance map",
        IRRADIANCE_WIDTH,
        IRRADIANCE_HEIGHT
    );
    Ok(irradiance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use kiln_scene::{EnvironmentMap, SceneSnapshot};

    fn irradiance_of(environment: EnvironmentMap) -> Option<Vec<f32>> {
        let ctx = testing::context(1, 1)?;
        let scene = SceneSnapshot {
            environment,
            ..SceneSnapshot::default()
        };
        let gpu = crate::gpu_scene::GpuScene::upload(&ctx.device, &ctx.queue, &scene)
            .expect("scene upload");
        Some(testing::read_f16(&ctx, &gpu.irradiance.texture))
    }

    /// Red channel of the texel at (`x`, `y`)
    fn red(texels: &[f32], x: u32, y: u32) -> f32 {
        texels[((y * IRRADIANCE_WIDTH + x) * 4) as usize]
    }

    #[test]
    fn test_workgroups_cover_map() {
        assert_eq!(workgroups(IRRADIANCE_WIDTH, IRRADIANCE_HEIGHT), (8, 4));
        assert_eq!(workgroups(9, 1), (2, 1));
    }

    #[test]
    fn test_uniform_environment_gives_uniform_irradiance() {
        let Some(texels) = irradiance_of(EnvironmentMap::uniform([0.25, 0.5, 1.0, 1.0])) else {
            return;
        };
        for texel in texels.chunks(4) {
            assert!((texel[0] - 0.25).abs() < 1e-3, "{:?}", texel);
            assert!((texel[1] - 0.5).abs() < 1e-3, "{:?}", texel);
            assert!((texel[2] - 1.0).abs() < 1e-3, "{:?}", texel);
        }
    }

    #[test]
    fn test_bright_sky_lights_upward_normals() {
        // Top half (v < 0.5, directions above the horizon) is white, bottom half black
        let (width, height) = (16, 8);
        let texels = (0..width * height)
            .map(|i| if i / width < height / 2 { [1.0; 4] } else { [0.0, 0.0, 0.0, 1.0] })
            .collect();
        let Some(irradiance) = irradiance_of(EnvironmentMap {
            width,
            height,
            texels,
        }) else {
            return;
        };

        let up = red(&irradiance, 0, 0);
        let horizon = red(&irradiance, 0, IRRADIANCE_HEIGHT / 2);
        let down = red(&irradiance, 0, IRRADIANCE_HEIGHT - 1);
        assert!(up > 0.95, "up {}", up);
        assert!(down < 0.05, "down {}", down);
        assert!(horizon > down && horizon < up);
    }
}
