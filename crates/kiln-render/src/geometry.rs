//! Skybox, opaque and transparent draws of the main view

use crate::bind;
use crate::context::{validated, RenderError};
use crate::gpu_scene::{vertex_layout, GpuScene};
use crate::oit::OitPass;
use crate::shaders;
use crate::shadow::ShadowPass;
use crate::targets::{copy_target, FrameTargets, DEPTH_FORMAT, HDR_FORMAT, VELOCITY_FORMAT};
use crate::uniforms::{uniform_buffer, FrameBindings, FrameSlot, SkyUniforms};

/// What the geometry pass draws this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryOptions {
    pub opaque: bool,
    pub transparent: bool,
    /// Jittered vertex stage and velocity output; the velocity target is left
    /// untouched otherwise
    pub jitter: bool,
    pub multi_draw: bool,
}

pub struct GeometryPass {
    skybox: wgpu::RenderPipeline,
    skybox_velocity: wgpu::RenderPipeline,
    opaque: wgpu::RenderPipeline,
    opaque_jittered: wgpu::RenderPipeline,
    transparent: wgpu::RenderPipeline,
    sky_uniforms: wgpu::Buffer,
    sky_group: wgpu::BindGroup,
    material_group: wgpu::BindGroup,
    oit_layout: wgpu::BindGroupLayout,
    oit_group: wgpu::BindGroup,
}

impl GeometryPass {
    pub fn new(
        device: &wgpu::Device,
        frame: &FrameBindings,
        scene: &GpuScene,
        shadow: &ShadowPass,
        oit: &OitPass,
        targets: &FrameTargets,
    ) -> Result<Self, RenderError> {
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let vertex_fragment = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;

        let texture_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let environment_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Environment Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let irradiance_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Irradiance Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // Group 2: textures, shadow map, irradiance
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Textures BGL"),
            entries: &[
                bind::texture(
                    0,
                    fragment,
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2Array,
                ),
                bind::sampler(1, fragment, wgpu::SamplerBindingType::Filtering),
                bind::depth_2d(2, fragment),
                bind::sampler(3, fragment, wgpu::SamplerBindingType::Comparison),
                bind::texture_2d(4, fragment),
                bind::sampler(5, fragment, wgpu::SamplerBindingType::Filtering),
            ],
        });
        let material_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Textures"),
            layout: &material_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&scene.texture_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&texture_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&shadow.map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&shadow.comparison_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&scene.irradiance.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&irradiance_sampler),
                },
            ],
        });

        // Group 3: OIT lists and the opaque depth snapshot
        let oit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("OIT Append BGL"),
            entries: &[
                bind::storage(0, fragment, false),
                bind::storage(1, fragment, false),
                bind::storage(2, fragment, false),
                bind::depth_2d(3, fragment),
            ],
        });
        let oit_group = Self::oit_group(device, &oit_layout, oit, targets);

        // Skybox has its own group 0
        let sky_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Skybox BGL"),
            entries: &[
                bind::uniform(0, vertex_fragment),
                bind::unfilterable_2d(1, fragment),
                bind::sampler(2, fragment, wgpu::SamplerBindingType::NonFiltering),
            ],
        });
        let sky_uniforms = uniform_buffer::<SkyUniforms>(device, "Skybox Uniforms");
        let sky_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Skybox Bind Group"),
            layout: &sky_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: sky_uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&scene.environment_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&environment_sampler),
                },
            ],
        });

        let mesh = shaders::module(device, "Mesh Shader", shaders::MESH);
        let opaque_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Opaque Pipeline Layout"),
            bind_group_layouts: &[&frame.layout, &scene.draw_layout, &material_layout],
            push_constant_ranges: &[],
        });
        let transparent_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Transparent Pipeline Layout"),
            bind_group_layouts: &[
                &frame.layout,
                &scene.draw_layout,
                &material_layout,
                &oit_layout,
            ],
            push_constant_ranges: &[],
        });

        // The velocity target is only attached while TAA runs
        let color_targets = |velocity: bool| {
            let mut targets = vec![Some(wgpu::ColorTargetState {
                format: HDR_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })];
            if velocity {
                targets.push(Some(wgpu::ColorTargetState {
                    format: VELOCITY_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                }));
            }
            targets
        };
        let depth_state = |write: bool| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: write,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        };
        let mesh_primitive = wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            ..Default::default()
        };

        let opaque_pipeline = |label: &str, vs: &str, fs: &str, velocity: bool| {
            validated(device, label, || {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(label),
                    layout: Some(&opaque_layout),
                    vertex: wgpu::VertexState {
                        module: &mesh,
                        entry_point: Some(vs),
                        buffers: &[vertex_layout()],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &mesh,
                        entry_point: Some(fs),
                        targets: &color_targets(velocity),
                        compilation_options: Default::default(),
                    }),
                    primitive: mesh_primitive,
                    depth_stencil: Some(depth_state(true)),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
            })
        };
        let opaque = opaque_pipeline("Opaque Pipeline", "vs_mesh", "fs_opaque", false)?;
        let opaque_jittered = opaque_pipeline(
            "Opaque Jittered Pipeline",
            "vs_mesh_jittered",
            "fs_opaque_velocity",
            true,
        )?;

        let transparent = validated(device, "Transparent Pipeline", || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Transparent Pipeline"),
                layout: Some(&transparent_layout),
                vertex: wgpu::VertexState {
                    module: &mesh,
                    entry_point: Some("vs_mesh"),
                    buffers: &[vertex_layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &mesh,
                    entry_point: Some("fs_transparent"),
                    targets: &[],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    cull_mode: None,
                    ..mesh_primitive
                },
                depth_stencil: Some(depth_state(false)),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        let sky_module = shaders::module(device, "Skybox Shader", shaders::SKYBOX);
        let sky_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Skybox Pipeline Layout"),
            bind_group_layouts: &[&sky_layout],
            push_constant_ranges: &[],
        });
        let sky_pipeline = |label: &str, fs: &str, velocity: bool| {
            validated(device, label, || {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(label),
                    layout: Some(&sky_pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &sky_module,
                        entry_point: Some("vs_skybox"),
                        buffers: &[],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &sky_module,
                        entry_point: Some(fs),
                        targets: &color_targets(velocity),
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: Some(depth_state(false)),
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
            })
        };
        let skybox = sky_pipeline("Skybox Pipeline", "fs_skybox", false)?;
        let skybox_velocity = sky_pipeline("Skybox Velocity Pipeline", "fs_skybox_velocity", true)?;

        Ok(Self {
            skybox,
            skybox_velocity,
            opaque,
            opaque_jittered,
            transparent,
            sky_uniforms,
            sky_group,
            material_group,
            oit_layout,
            oit_group,
        })
    }

    fn oit_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        oit: &OitPass,
        targets: &FrameTargets,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("OIT Append Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: targets.oit_heads.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: oit.fragments.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: oit.counter.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&targets.depth_copy.view),
                },
            ],
        })
    }

    pub fn rebuild_targets(&mut self, device: &wgpu::Device, oit: &OitPass, targets: &FrameTargets) {
        self.oit_group = Self::oit_group(device, &self.oit_layout, oit, targets);
    }

    pub fn write_sky(&self, queue: &wgpu::Queue, sky: &SkyUniforms) {
        queue.write_buffer(&self.sky_uniforms, 0, bytemuck::bytes_of(sky));
    }

    /// Clear the main targets, draw the sky and opaque geometry, snapshot the depth, then
    /// append transparent fragments. The OIT heads must already be cleared.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame: &FrameBindings,
        scene: &GpuScene,
        targets: &FrameTargets,
        options: GeometryOptions,
    ) {
        let main_offset = [frame.offset(FrameSlot::Main)];
        {
            let mut color_attachments = vec![Some(wgpu::RenderPassColorAttachment {
                view: &targets.opaque_color.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })];
            if options.jitter {
                color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                    view: &targets.velocity.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                }));
            }
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Opaque Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let (sky, opaque) = if options.jitter {
                (&self.skybox_velocity, &self.opaque_jittered)
            } else {
                (&self.skybox, &self.opaque)
            };
            pass.set_pipeline(sky);
            pass.set_bind_group(0, &self.sky_group, &[]);
            pass.draw(0..3, 0..1);

            if options.opaque {
                pass.set_pipeline(opaque);
                pass.set_bind_group(0, &frame.bind_group, &main_offset);
                pass.set_bind_group(1, &scene.draw_group, &[]);
                pass.set_bind_group(2, &self.material_group, &[]);
                scene.bind_geometry(&mut pass);
                scene.opaque.draw(&mut pass, options.multi_draw);
            }
        }

        copy_target(encoder, &targets.depth, &targets.depth_copy);

        if options.transparent {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Transparent Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth.view,
                    depth_ops: None,
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.transparent);
            pass.set_bind_group(0, &frame.bind_group, &main_offset);
            pass.set_bind_group(1, &scene.draw_group, &[]);
            pass.set_bind_group(2, &self.material_group, &[]);
            pass.set_bind_group(3, &self.oit_group, &[]);
            scene.bind_geometry(&mut pass);
            scene.transparent.draw(&mut pass, options.multi_draw);
        }
    }
}
