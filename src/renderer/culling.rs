use std::borrow::Cow;
use std::mem;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::error::CrowdError;
use crate::renderer::context::GpuContext;
use crate::renderer::frustum::{global_scale_factor, Frustum};
use crate::renderer::instance::InstanceRecord;

const WORKGROUP_SIZE: u32 = 64;

/// Host-side culling configuration for one frame.
#[derive(Debug, Clone, Copy)]
pub struct CullSettings {
    pub global_transform: Mat4,
    pub sphere_radius: f32,
    /// Zero or negative disables the distance test.
    pub max_distance: f32,
    pub camera_pos: Vec3,
}

/// Uniform block shared with `culling.wgsl`. The global scale factor is
/// computed once here, never per instance.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct CullParams {
    pub global_transform: [[f32; 4]; 4],
    pub planes: [[f32; 4]; 6],
    pub camera_pos: [f32; 4],
    pub sphere_radius: f32,
    pub global_scale: f32,
    pub max_distance_sq: f32,
    pub instance_count: u32,
    pub prototype_count: u32,
    pub command_count: u32,
    pub _padding: [u32; 2],
}

impl CullParams {
    pub fn new(
        settings: &CullSettings,
        frustum: &Frustum,
        instance_count: u32,
        prototype_count: u32,
        command_count: u32,
    ) -> Self {
        let mut planes = [[0.0f32; 4]; 6];
        for (target, plane) in planes.iter_mut().zip(frustum.planes.iter()) {
            *target = [plane.normal[0], plane.normal[1], plane.normal[2], plane.d];
        }
        let max_distance_sq = if settings.max_distance > 0.0 {
            settings.max_distance * settings.max_distance
        } else {
            0.0
        };
        Self {
            global_transform: settings.global_transform.to_cols_array_2d(),
            planes,
            camera_pos: settings.camera_pos.extend(1.0).to_array(),
            sphere_radius: settings.sphere_radius,
            global_scale: global_scale_factor(settings.global_transform),
            max_distance_sq,
            instance_count,
            prototype_count,
            command_count,
            _padding: [0; 2],
        }
    }
}

/// Host mirror of the cull stage, used by the orchestrator's statistics and
/// by tests to pin down the shader's semantics: returns per-prototype
/// visible counts for a record set.
pub fn visible_counts(
    records: &[InstanceRecord],
    prototype_count: usize,
    settings: &CullSettings,
    frustum: &Frustum,
) -> Vec<u32> {
    let radius = settings.sphere_radius * global_scale_factor(settings.global_transform);
    let max_distance_sq = if settings.max_distance > 0.0 {
        settings.max_distance * settings.max_distance
    } else {
        0.0
    };

    let mut counts = vec![0u32; prototype_count];
    for record in records {
        let center = settings
            .global_transform
            .transform_point3(record.translation());
        if !frustum.sphere_visible(center, radius) {
            continue;
        }
        if max_distance_sq > 0.0 {
            let to_center = center - settings.camera_pos;
            if to_center.length_squared() > max_distance_sq {
                continue;
            }
        }
        let prototype = record.mesh_id() as usize;
        if prototype < prototype_count {
            counts[prototype] += 1;
        }
    }
    counts
}

/// The three-stage GPU culling pipeline: reset per-prototype counters, test
/// every instance and compact survivors, then rewrite the indirect draw
/// arguments' instance counts in place.
pub struct CullingPipeline {
    reset: wgpu::ComputePipeline,
    cull: wgpu::ComputePipeline,
    compact: wgpu::ComputePipeline,
    bind_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
}

impl CullingPipeline {
    /// Fails with `MissingCapability` when the adapter cannot run compute
    /// shaders; the orchestrator answers that by staying on the unculled
    /// draw path instead of failing the frame.
    pub fn new(context: &GpuContext) -> Result<Self, CrowdError> {
        if !context.supports_compute() {
            return Err(CrowdError::MissingCapability("compute shaders"));
        }

        let device = &context.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("CrowdCulling"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                "../shader/culling.wgsl"
            ))),
        });

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("CrowdCullingBindLayout"),
            entries: &[
                storage_entry(0, true),  // instance store
                storage_entry(1, false), // visible output
                storage_entry(2, false), // per-prototype counters
                storage_entry(3, true),  // command lookup table
                storage_entry(4, true),  // args snapshot
                storage_entry(5, false), // live draw args
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            NonZeroU64::new(mem::size_of::<CullParams>() as u64).unwrap(),
                        ),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("CrowdCullingPipelineLayout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let compute_pipeline = |label: &str, entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("CrowdCullParams"),
            contents: bytemuck::bytes_of(&CullParams::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Ok(Self {
            reset: compute_pipeline("CrowdCullReset", "reset_counters"),
            cull: compute_pipeline("CrowdCull", "cull_instances"),
            compact: compute_pipeline("CrowdCullCompact", "compact_args"),
            bind_layout,
            params_buffer,
        })
    }

    pub fn bind_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_layout
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        instances: &wgpu::Buffer,
        visible: &wgpu::Buffer,
        counters: &wgpu::Buffer,
        commands: &wgpu::Buffer,
        args_snapshot: &wgpu::Buffer,
        draw_args: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("CrowdCullingBindGroup"),
            layout: &self.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: instances.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: visible.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: counters.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: commands.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: args_snapshot.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: draw_args.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        })
    }

    pub fn upload_params(&self, queue: &wgpu::Queue, params: &CullParams) {
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));
    }

    /// Encodes the three stages back to back. Ordering between them is
    /// carried by dispatch order on the queue; nothing here waits on the
    /// host, and a dispatched sequence always runs to completion.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
        instance_count: u32,
        prototype_count: u32,
        command_count: u32,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("CrowdCullingPass"),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, bind_group, &[]);

        pass.set_pipeline(&self.reset);
        pass.dispatch_workgroups(prototype_count.div_ceil(WORKGROUP_SIZE).max(1), 1, 1);

        pass.set_pipeline(&self.cull);
        pass.dispatch_workgroups(instance_count.div_ceil(WORKGROUP_SIZE).max(1), 1, 1);

        pass.set_pipeline(&self.compact);
        pass.dispatch_workgroups(command_count.div_ceil(WORKGROUP_SIZE).max(1), 1, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cull_params_match_wgsl_uniform_layout() {
        // mat4x4 (64) + 6 * vec4 (96) + vec4 (16) + 3 * f32 + 3 * u32 (24)
        // + vec2<u32> pad (8) = 208
        assert_eq!(std::mem::size_of::<CullParams>(), 208);
    }

    #[test]
    fn max_distance_disables_at_zero() {
        let settings = CullSettings {
            global_transform: Mat4::IDENTITY,
            sphere_radius: 1.0,
            max_distance: 0.0,
            camera_pos: Vec3::ZERO,
        };
        let params = CullParams::new(&settings, &Frustum::default(), 0, 0, 0);
        assert_eq!(params.max_distance_sq, 0.0);

        let settings = CullSettings {
            max_distance: 50.0,
            ..settings
        };
        let params = CullParams::new(&settings, &Frustum::default(), 0, 0, 0);
        assert_eq!(params.max_distance_sq, 2500.0);
    }

    #[test]
    fn host_mirror_counts_visible_instances_per_prototype() {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let frustum = Frustum::from_matrix(proj);
        let settings = CullSettings {
            global_transform: Mat4::IDENTITY,
            sphere_radius: 0.5,
            max_distance: 20.0,
            camera_pos: Vec3::ZERO,
        };

        let records = vec![
            // Prototype 0, in view.
            InstanceRecord::new(Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)), 0, 0, 0, 1.0),
            // Prototype 0, behind the camera.
            InstanceRecord::new(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)), 0, 0, 0, 1.0),
            // Prototype 1, in view but past the 20 unit distance cap.
            InstanceRecord::new(Mat4::from_translation(Vec3::new(0.0, 0.0, -50.0)), 1, 0, 0, 1.0),
            // Prototype 1, in view and close.
            InstanceRecord::new(Mat4::from_translation(Vec3::new(1.0, 0.0, -10.0)), 1, 0, 0, 1.0),
        ];

        let counts = visible_counts(&records, 2, &settings, &frustum);
        assert_eq!(counts, [1, 1]);
    }
}
