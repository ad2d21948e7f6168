//! wgpu resources behind [`ScenePrimitive`]
//!
//! iced creates one [`ScenePipeline`] per renderer. Resources that belong
//! to a single layer (uniform buffers, source textures, bind groups) live in
//! `cached_layers`, keyed by layer id, and are dropped once a layer stops
//! appearing in the scene.

use std::borrow::Cow;

use iced::Rectangle;
use iced::wgpu;
use iced::widget::shader::{self, Viewport};

use super::{GradientFrame, LayerOutput, ScenePrimitive, SurfaceFrame};
use crate::engine::noise::NOISE_WGSL;
use crate::layers::glass::{GLASS_SHADER, GlassUniforms};
use crate::layers::gradient::{FrameUniforms, GRADIENT_SHADER, GradientParams};

/// Format for uploaded CPU pixmaps on a given target
fn upload_format(target: wgpu::TextureFormat) -> wgpu::TextureFormat {
    if target.is_srgb() {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

/// Texture extent for a requested size, at least 1×1 and within device limits
fn clamp_extent((width, height): (u32, u32), max: u32) -> (u32, u32) {
    let max = max.max(1);
    (width.clamp(1, max), height.clamp(1, max))
}

struct GradientResources {
    params_buffer: wgpu::Buffer,
    frame_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    /// Revision of the params currently in `params_buffer`; 0 = never written
    revision: u64,
}

impl GradientResources {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Self {
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Gradient Params Buffer"),
            size: std::mem::size_of::<GradientParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Gradient Frame Buffer"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Gradient Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: frame_buffer.as_entire_binding(),
                },
            ],
        });

        Self {
            params_buffer,
            frame_buffer,
            bind_group,
            revision: 0,
        }
    }
}

/// Texture sampled by the refraction pass, plus its glass uniforms
struct SourceTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
    format: wgpu::TextureFormat,
    /// Generation of the CPU surface last uploaded
    generation: Option<u64>,
    glass_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl SourceTexture {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        (width, height): (u32, u32),
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Layer Source Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let glass_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Glass Uniform Buffer"),
            size: std::mem::size_of::<GlassUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Glass Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: glass_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        Self {
            texture,
            view,
            size: (width, height),
            format,
            generation: None,
            glass_buffer,
            bind_group,
        }
    }
}

struct CachedLayer {
    layer_id: u64,
    gradient: Option<GradientResources>,
    source: Option<SourceTexture>,
}

/// Shared pipeline for every layer of the scene
pub struct ScenePipeline {
    gradient_pipeline: wgpu::RenderPipeline,
    glass_pipeline: wgpu::RenderPipeline,
    gradient_layout: wgpu::BindGroupLayout,
    glass_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    target_format: wgpu::TextureFormat,
    cached_layers: Vec<CachedLayer>,
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Full-screen triangle pipeline without vertex buffers
fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    module: &wgpu::ShaderModule,
    bind_group_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

/// Render a gradient into an offscreen texture on its own submission
fn render_offscreen(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    target: &wgpu::TextureView,
) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Gradient Offscreen Encoder"),
    });
    {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Gradient Offscreen Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
    queue.submit(std::iter::once(encoder.finish()));
}

impl ScenePipeline {
    fn index_of(&mut self, layer_id: u64) -> usize {
        match self
            .cached_layers
            .iter()
            .position(|c| c.layer_id == layer_id)
        {
            Some(index) => index,
            None => {
                self.cached_layers.push(CachedLayer {
                    layer_id,
                    gradient: None,
                    source: None,
                });
                self.cached_layers.len() - 1
            }
        }
    }

    fn cached(&self, layer_id: u64) -> Option<&CachedLayer> {
        self.cached_layers.iter().find(|c| c.layer_id == layer_id)
    }

    fn cleanup_unused(&mut self, active_ids: &[u64]) {
        self.cached_layers
            .retain(|c| active_ids.contains(&c.layer_id));
    }

    fn prepare_gradient(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, frame: &GradientFrame) {
        let index = self.index_of(frame.layer_id);
        let layer = &mut self.cached_layers[index];
        let resources = layer
            .gradient
            .get_or_insert_with(|| GradientResources::new(device, &self.gradient_layout));

        if resources.revision != frame.revision {
            queue.write_buffer(&resources.params_buffer, 0, bytemuck::bytes_of(&frame.params));
            resources.revision = frame.revision;
        }

        let mut uniforms = frame.frame;
        uniforms.output_linear = if self.target_format.is_srgb() { 1.0 } else { 0.0 };
        queue.write_buffer(&resources.frame_buffer, 0, bytemuck::bytes_of(&uniforms));

        let Some(glass) = frame.glass else {
            layer.source = None;
            return;
        };

        let requested = (
            frame.frame.resolution[0].max(0.0) as u32,
            frame.frame.resolution[1].max(0.0) as u32,
        );
        let size = clamp_extent(requested, device.limits().max_texture_dimension_2d);
        let format = self.target_format;
        let stale = layer
            .source
            .as_ref()
            .is_none_or(|s| s.size != size || s.format != format);
        if stale {
            layer.source = None;
        }
        let source = layer.source.get_or_insert_with(|| {
            SourceTexture::new(
                device,
                &self.glass_layout,
                &self.sampler,
                format,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                size,
            )
        });

        queue.write_buffer(&source.glass_buffer, 0, bytemuck::bytes_of(&glass));
        render_offscreen(
            device,
            queue,
            &self.gradient_pipeline,
            &resources.bind_group,
            &source.view,
        );
    }

    fn prepare_surface(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, frame: &SurfaceFrame) {
        let Some(requested) = frame.source.size() else {
            return;
        };
        let max = device.limits().max_texture_dimension_2d;
        if requested.0 > max || requested.1 > max {
            tracing::warn!(
                "Layer surface {}x{} exceeds texture limit {}",
                requested.0,
                requested.1,
                max
            );
            return;
        }

        let format = upload_format(self.target_format);
        let index = self.index_of(frame.layer_id);
        let layer = &mut self.cached_layers[index];
        let stale = layer
            .source
            .as_ref()
            .is_none_or(|s| s.size != requested || s.format != format);
        if stale {
            layer.source = None;
        }
        let source = layer.source.get_or_insert_with(|| {
            SourceTexture::new(
                device,
                &self.glass_layout,
                &self.sampler,
                format,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                requested,
            )
        });

        let generation = frame.source.generation();
        if source.generation != Some(generation) {
            let texture = &source.texture;
            let uploaded = frame.source.with_pixels(|width, height, data| {
                if (width, height) != requested {
                    return false;
                }
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    data,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(4 * width),
                        rows_per_image: Some(height),
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                );
                true
            });
            if uploaded == Some(true) {
                source.generation = Some(generation);
            }
        }

        queue.write_buffer(&source.glass_buffer, 0, bytemuck::bytes_of(&frame.glass));
    }
}

impl shader::Pipeline for ScenePipeline {
    fn new(device: &wgpu::Device, _queue: &wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let gradient_source = format!("{}\n{}", GRADIENT_SHADER, NOISE_WGSL);
        let gradient_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Gradient Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(gradient_source)),
        });
        let glass_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Glass Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(GLASS_SHADER)),
        });

        let gradient_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Gradient Bind Group Layout"),
            entries: &[uniform_entry(0), uniform_entry(1)],
        });

        let glass_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Glass Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Layer Source Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let gradient_pipeline = fullscreen_pipeline(
            device,
            "Gradient Pipeline",
            &gradient_module,
            &gradient_layout,
            format,
            wgpu::BlendState::ALPHA_BLENDING,
        );
        let glass_pipeline = fullscreen_pipeline(
            device,
            "Glass Pipeline",
            &glass_module,
            &glass_layout,
            format,
            wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        );

        Self {
            gradient_pipeline,
            glass_pipeline,
            gradient_layout,
            glass_layout,
            sampler,
            target_format: format,
            cached_layers: Vec::new(),
        }
    }
}

impl shader::Primitive for ScenePrimitive {
    type Pipeline = ScenePipeline;

    fn prepare(
        &self,
        pipeline: &mut Self::Pipeline,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        _bounds: &Rectangle,
        viewport: &Viewport,
    ) {
        if let Some(probe) = &self.scale {
            probe.set(viewport.scale_factor() as f32);
        }
        for layer in &self.layers {
            match layer {
                LayerOutput::Gradient(frame) => pipeline.prepare_gradient(device, queue, frame),
                LayerOutput::Surface(frame) => pipeline.prepare_surface(device, queue, frame),
            }
        }
        pipeline.cleanup_unused(&self.active_ids());
    }

    fn draw(&self, pipeline: &Self::Pipeline, render_pass: &mut wgpu::RenderPass<'_>) -> bool {
        let mut drawn = false;

        for layer in &self.layers {
            let Some(cached) = pipeline.cached(layer.layer_id()) else {
                continue;
            };
            let direct = matches!(layer, LayerOutput::Gradient(g) if g.glass.is_none());

            if direct {
                if let Some(gradient) = &cached.gradient {
                    render_pass.set_pipeline(&pipeline.gradient_pipeline);
                    render_pass.set_bind_group(0, &gradient.bind_group, &[]);
                    render_pass.draw(0..3, 0..1);
                    drawn = true;
                }
            } else if let Some(source) = &cached.source {
                render_pass.set_pipeline(&pipeline.glass_pipeline);
                render_pass.set_bind_group(0, &source.bind_group, &[]);
                render_pass.draw(0..3, 0..1);
                drawn = true;
            }
        }

        drawn
    }
}
