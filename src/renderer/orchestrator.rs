use glam::{Mat4, Vec3};

use crate::error::CrowdError;
use crate::renderer::buffers::{CrowdBuffers, SkinTextureData, VatGpuResources};
use crate::renderer::context::GpuContext;
use crate::renderer::culling::{CullParams, CullSettings, CullingPipeline};
use crate::renderer::draw_args::{DrawCommandAssembler, DrawStream, IndirectDrawArgs};
use crate::renderer::frustum::Frustum;
use crate::renderer::instance::InstanceDataStore;
use crate::renderer::mesh::{MergedMesh, MeshSegmentRegistry};
use crate::renderer::pipeline::{CrowdRenderPipeline, FrameUniform};
use crate::settings::CrowdSettings;
use crate::vat::atlas::VatAtlas;

/// Camera state for one frame, supplied by the host engine.
#[derive(Debug, Clone, Copy)]
pub struct CameraFrame {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Strategy selected once at setup. The render loop never branches on a
/// culling flag; it asks the path for its dispatch work and instance
/// binding.
enum DrawPath {
    Culled(CullingPipeline),
    Direct,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameStats {
    pub instances_submitted: u32,
    pub draw_commands: u32,
    pub culling_active: bool,
}

/// Owns every runtime resource of one crowd and drives the per-frame
/// sequence: instance upload, optional three-stage cull, one indirect
/// multi-draw.
pub struct RenderOrchestrator {
    store: InstanceDataStore,
    buffers: CrowdBuffers,
    registry: MeshSegmentRegistry,
    merged: MergedMesh,
    vat: VatGpuResources,
    render: CrowdRenderPipeline,
    stream: DrawStream,
    frustum: Frustum,
    path: DrawPath,
    direct_instances: wgpu::BindGroup,
    visible_instances: wgpu::BindGroup,
    cull_bind: Option<wgpu::BindGroup>,
    settings: CrowdSettings,
    global_transform: Mat4,
    time: f32,
    multi_draw: bool,
}

impl RenderOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: &GpuContext,
        settings: CrowdSettings,
        registry: MeshSegmentRegistry,
        merged: MergedMesh,
        atlas: &VatAtlas,
        skin_ranges: &[(u32, u32)],
        skins: &SkinTextureData,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Result<Self, CrowdError> {
        // Indirect draws with non-zero first_instance are the foundation of
        // the whole scheme; without them nothing here is usable.
        if !context.supports_indirect_first_instance() {
            return Err(CrowdError::MissingCapability("INDIRECT_FIRST_INSTANCE"));
        }

        let settings = settings.validate();
        let device = &context.device;

        // A missing compute path is recoverable: stay on the direct path
        // rather than failing setup.
        let path = if settings.culling_enabled {
            match CullingPipeline::new(context) {
                Ok(pipeline) => DrawPath::Culled(pipeline),
                Err(err) => {
                    log::warn!("Culling unavailable ({}), using unculled draw path", err);
                    DrawPath::Direct
                }
            }
        } else {
            DrawPath::Direct
        };
        let culling = matches!(path, DrawPath::Culled(_));

        let prototype_count = registry.len() as u32;
        let buffers = CrowdBuffers::new(device, settings.instance_capacity, prototype_count, culling);

        let vat = VatGpuResources::new(device, &context.queue, atlas, skin_ranges, skins);
        let render = CrowdRenderPipeline::new(device, color_format, depth_format, &vat);

        let direct_instances = render.create_instance_bind_group(device, &buffers.instances);
        let visible_instances = render.create_instance_bind_group(device, &buffers.visible);
        let cull_bind = match &path {
            DrawPath::Culled(pipeline) => Some(Self::cull_bind_group(pipeline, device, &buffers)),
            DrawPath::Direct => None,
        };

        let stream =
            DrawCommandAssembler::assemble(&vec![0; registry.len()], &registry, settings.instance_capacity)?;
        buffers.upload_stream(&context.queue, &stream);

        Ok(Self {
            store: InstanceDataStore::new(settings.instance_capacity),
            buffers,
            registry,
            merged,
            vat,
            render,
            stream,
            frustum: Frustum::default(),
            path,
            direct_instances,
            visible_instances,
            cull_bind,
            settings,
            global_transform: Mat4::IDENTITY,
            time: 0.0,
            multi_draw: context.supports_multi_draw_indirect(),
        })
    }

    fn cull_bind_group(
        pipeline: &CullingPipeline,
        device: &wgpu::Device,
        buffers: &CrowdBuffers,
    ) -> wgpu::BindGroup {
        pipeline.create_bind_group(
            device,
            &buffers.instances,
            &buffers.visible,
            &buffers.counters,
            &buffers.commands,
            &buffers.args_snapshot,
            &buffers.draw_args,
        )
    }

    /// The producer's write window. Records written here are consumed by the
    /// next `frame` call; the store must be fully written before that call
    /// enqueues the frame's dispatch sequence.
    pub fn instances_mut(&mut self) -> &mut InstanceDataStore {
        &mut self.store
    }

    pub fn settings(&self) -> &CrowdSettings {
        &self.settings
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            instances_submitted: self.store.len(),
            draw_commands: self.stream.args.len() as u32,
            culling_active: matches!(self.path, DrawPath::Culled(_)),
        }
    }

    /// The draw arguments as assembled, before any culling rewrites. The
    /// compact stage copies every field except `instance_count` from these.
    pub fn assembled_args(&self) -> &[IndirectDrawArgs] {
        &self.stream.args
    }

    pub fn set_global_transform(&mut self, transform: Mat4) {
        self.global_transform = transform;
    }

    /// Reassembles the draw stream for new per-prototype instance counts.
    /// All validation happens host-side before any upload.
    pub fn set_instance_counts(&mut self, queue: &wgpu::Queue, counts: &[u32]) -> Result<(), CrowdError> {
        let stream =
            DrawCommandAssembler::assemble(counts, &self.registry, self.settings.instance_capacity)?;
        self.buffers.upload_stream(queue, &stream);
        self.stream = stream;
        Ok(())
    }

    /// Rebuilds the runtime buffers for a new capacity. Must only run
    /// between frames; nothing in flight may reference the old buffers.
    /// The active stream is re-validated against the new capacity before
    /// anything is replaced, so a rejected shrink leaves the orchestrator
    /// exactly as it was.
    pub fn set_instance_capacity(&mut self, context: &GpuContext, capacity: u32) -> Result<(), CrowdError> {
        let capacity = capacity.max(1);
        if capacity == self.buffers.capacity() {
            return Ok(());
        }
        let stream = self.reassembled_stream(capacity)?;
        self.settings.instance_capacity = capacity;
        self.store = InstanceDataStore::new(capacity);
        self.rebuild_buffers(context, stream);
        Ok(())
    }

    /// Toggles culling. The draw-args buffer has different binding
    /// requirements per mode, so this reallocates it rather than refilling.
    pub fn set_culling_enabled(&mut self, context: &GpuContext, enabled: bool) -> Result<(), CrowdError> {
        let currently = matches!(self.path, DrawPath::Culled(_));
        if enabled == currently {
            return Ok(());
        }
        let stream = self.reassembled_stream(self.settings.instance_capacity)?;
        self.settings.culling_enabled = enabled;
        self.path = if enabled {
            match CullingPipeline::new(context) {
                Ok(pipeline) => DrawPath::Culled(pipeline),
                Err(err) => {
                    log::warn!("Culling unavailable ({}), staying on unculled draw path", err);
                    DrawPath::Direct
                }
            }
        } else {
            DrawPath::Direct
        };
        self.rebuild_buffers(context, stream);
        Ok(())
    }

    /// Reassembles the current counts against `capacity` without touching
    /// any state. The fallible half of every rebuild.
    fn reassembled_stream(&self, capacity: u32) -> Result<DrawStream, CrowdError> {
        let counts: Vec<u32> = self.stream.args.iter().map(|a| a.instance_count).collect();
        DrawCommandAssembler::assemble(&counts, &self.registry, capacity)
    }

    fn rebuild_buffers(&mut self, context: &GpuContext, stream: DrawStream) {
        let device = &context.device;
        let culling = matches!(self.path, DrawPath::Culled(_));
        log::info!(
            "Rebuilding crowd buffers: capacity {}, prototypes {}, culling {}",
            self.settings.instance_capacity,
            self.registry.len(),
            culling
        );

        self.buffers = CrowdBuffers::new(
            device,
            self.settings.instance_capacity,
            self.registry.len() as u32,
            culling,
        );
        self.direct_instances = self
            .render
            .create_instance_bind_group(device, &self.buffers.instances);
        self.visible_instances = self
            .render
            .create_instance_bind_group(device, &self.buffers.visible);
        self.cull_bind = match &self.path {
            DrawPath::Culled(pipeline) => {
                Some(Self::cull_bind_group(pipeline, device, &self.buffers))
            }
            DrawPath::Direct => None,
        };

        self.buffers.upload_stream(&context.queue, &stream);
        self.stream = stream;
    }

    /// Encodes one frame: instance upload, uniform updates, the culling
    /// dispatch sequence when active, then the indirect draw. Everything is
    /// enqueued in fixed order on one queue; stage-to-stage visibility needs
    /// no other synchronization.
    pub fn frame(
        &mut self,
        context: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        camera: &CameraFrame,
        dt: f32,
    ) {
        let queue = &context.queue;
        self.time += dt;

        self.buffers.upload_instances(queue, &self.store);
        self.render.upload_frame(
            queue,
            &FrameUniform::new(
                camera.view_proj,
                self.global_transform,
                self.time,
                self.settings.animation_enabled,
            ),
        );

        let instance_bind = match &self.path {
            DrawPath::Culled(pipeline) => {
                self.frustum.update_from_matrix(camera.view_proj);
                let cull_settings = CullSettings {
                    global_transform: self.global_transform,
                    sphere_radius: self.settings.bounding_sphere_radius,
                    max_distance: self.settings.max_render_distance,
                    camera_pos: camera.position,
                };
                let command_count = self.stream.args.len() as u32;
                let params = CullParams::new(
                    &cull_settings,
                    &self.frustum,
                    self.stream.total_instances,
                    self.registry.len() as u32,
                    command_count,
                );
                pipeline.upload_params(queue, &params);

                if let Some(bind) = &self.cull_bind {
                    pipeline.encode(
                        encoder,
                        bind,
                        self.stream.total_instances,
                        self.registry.len() as u32,
                        command_count,
                    );
                }
                &self.visible_instances
            }
            DrawPath::Direct => &self.direct_instances,
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("CrowdPass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        rpass.set_pipeline(self.render.pipeline());
        rpass.set_bind_group(0, self.render.frame_bind_group(), &[]);
        rpass.set_bind_group(1, instance_bind, &[]);
        rpass.set_bind_group(2, self.render.vat_bind_group(), &[]);
        rpass.set_vertex_buffer(0, self.merged.vbuf.slice(..));
        rpass.set_index_buffer(self.merged.ibuf.slice(..), wgpu::IndexFormat::Uint32);

        let command_count = self.stream.args.len() as u32;
        if self.multi_draw {
            rpass.multi_draw_indexed_indirect(&self.buffers.draw_args, 0, command_count);
        } else {
            let stride = std::mem::size_of::<IndirectDrawArgs>() as u64;
            for command in 0..command_count {
                rpass.draw_indexed_indirect(&self.buffers.draw_args, command as u64 * stride);
            }
        }
    }
}
