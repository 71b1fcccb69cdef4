use std::mem;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::renderer::draw_args::{CommandInfo, DrawStream, IndirectDrawArgs};
use crate::renderer::instance::{InstanceDataStore, InstanceRecord};
use crate::vat::atlas::VatAtlas;
use crate::vat::baker::VatTexture;

/// Runtime buffer set for one crowd. Exclusively owned by the orchestrator;
/// everything here is rebuilt wholesale when capacity, prototype count or
/// the culling mode changes, always between frames on the control thread.
pub struct CrowdBuffers {
    pub instances: wgpu::Buffer,
    pub visible: wgpu::Buffer,
    pub counters: wgpu::Buffer,
    pub commands: wgpu::Buffer,
    pub args_snapshot: wgpu::Buffer,
    pub draw_args: wgpu::Buffer,
    capacity: u32,
    prototype_count: u32,
    culling: bool,
}

impl CrowdBuffers {
    pub fn new(device: &wgpu::Device, capacity: u32, prototype_count: u32, culling: bool) -> Self {
        let record_size = mem::size_of::<InstanceRecord>() as u64;
        let capacity_bytes = (capacity.max(1) as u64) * record_size;
        let prototypes = prototype_count.max(1) as u64;

        let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;

        let instances = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("CrowdInstanceStore"),
            size: capacity_bytes,
            usage: storage,
            mapped_at_creation: false,
        });

        // Sized for the worst case (everything visible) so the cull stage
        // never has to bounds-check a claimed slot.
        let visible = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("CrowdVisibleInstances"),
            size: capacity_bytes,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let counters = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("CrowdVisibleCounters"),
            size: prototypes * mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let commands = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("CrowdCommandLookup"),
            size: prototypes * mem::size_of::<CommandInfo>() as u64,
            usage: storage,
            mapped_at_creation: false,
        });

        let args_snapshot = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("CrowdDrawArgsSnapshot"),
            size: prototypes * mem::size_of::<IndirectDrawArgs>() as u64,
            usage: storage,
            mapped_at_creation: false,
        });

        // The live args buffer doubles as a compute write target only on the
        // culled path; the binding requirements differ, which is why a
        // culling toggle rebuilds it instead of refilling it.
        let mut args_usage = wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST;
        if culling {
            args_usage |= wgpu::BufferUsages::STORAGE;
        }
        let draw_args = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("CrowdDrawArgs"),
            size: prototypes * mem::size_of::<IndirectDrawArgs>() as u64,
            usage: args_usage,
            mapped_at_creation: false,
        });

        Self {
            instances,
            visible,
            counters,
            commands,
            args_snapshot,
            draw_args,
            capacity,
            prototype_count,
            culling,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn prototype_count(&self) -> u32 {
        self.prototype_count
    }

    pub fn culling(&self) -> bool {
        self.culling
    }

    /// Flushes the producer-written records for this frame. Must run before
    /// the frame's dispatch sequence is enqueued; ordering with the compute
    /// stages comes from queue enqueue order alone.
    pub fn upload_instances(&self, queue: &wgpu::Queue, store: &InstanceDataStore) {
        if !store.is_empty() {
            queue.write_buffer(&self.instances, 0, bytemuck::cast_slice(store.records()));
        }
    }

    /// Uploads a freshly assembled draw stream: live args, the immutable
    /// snapshot the compact stage copies from, and the offset lookup table.
    pub fn upload_stream(&self, queue: &wgpu::Queue, stream: &DrawStream) {
        queue.write_buffer(&self.draw_args, 0, bytemuck::cast_slice(&stream.args));
        queue.write_buffer(&self.args_snapshot, 0, bytemuck::cast_slice(&stream.args));
        queue.write_buffer(&self.commands, 0, bytemuck::cast_slice(&stream.commands));
    }
}

/// Per-prototype lookup record for the render shader: clip range into the
/// flattened clip list plus the prototype's skin-array window.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct PrototypeGpuInfo {
    pub clip_start: u32,
    pub clip_count: u32,
    pub skin_start: u32,
    pub skin_count: u32,
}

/// Clip metadata as the render shader reads it.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct ClipGpuInfo {
    pub rect: [f32; 4],
    pub vertex_count: u32,
    pub frame_count: u32,
    pub duration: f32,
    pub _padding: f32,
}

/// CPU description of the skin texture array: `layer_count` RGBA8 images of
/// identical dimensions, tightly packed.
pub struct SkinTextureData {
    pub width: u32,
    pub height: u32,
    pub layer_count: u32,
    pub rgba: Vec<u8>,
}

impl SkinTextureData {
    /// Single white 1x1 layer for crowds without skin variation.
    pub fn solid_white() -> Self {
        Self {
            width: 1,
            height: 1,
            layer_count: 1,
            rgba: vec![255; 4],
        }
    }
}

/// GPU-resident VAT atlas pair, clip metadata and skin array.
pub struct VatGpuResources {
    pub position_view: wgpu::TextureView,
    pub normal_view: wgpu::TextureView,
    pub clips: wgpu::Buffer,
    pub prototypes: wgpu::Buffer,
    pub skins_view: wgpu::TextureView,
    pub skin_sampler: wgpu::Sampler,
    _position: wgpu::Texture,
    _normal: wgpu::Texture,
    _skins: wgpu::Texture,
}

impl VatGpuResources {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        atlas: &VatAtlas,
        skin_ranges: &[(u32, u32)],
        skins: &SkinTextureData,
    ) -> Self {
        let position = upload_float_texture(device, queue, &atlas.position, "CrowdVatPositions");
        let normal = upload_float_texture(device, queue, &atlas.normal, "CrowdVatNormals");

        let clip_infos: Vec<ClipGpuInfo> = atlas
            .clips
            .iter()
            .map(|clip| ClipGpuInfo {
                rect: [clip.offset_x, clip.offset_y, clip.width, clip.length],
                vertex_count: clip.vertex_count,
                frame_count: clip.frame_count,
                duration: clip.duration,
                _padding: 0.0,
            })
            .collect();
        // A prototype set can legitimately have zero clips; keep the binding
        // non-empty so the layout stays valid.
        let clip_contents = if clip_infos.is_empty() {
            vec![ClipGpuInfo::zeroed()]
        } else {
            clip_infos
        };
        let clips = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("CrowdVatClips"),
            contents: bytemuck::cast_slice(&clip_contents),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let prototype_infos: Vec<PrototypeGpuInfo> = atlas
            .segments
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                let (skin_start, skin_count) =
                    skin_ranges.get(index).copied().unwrap_or((0, 1));
                PrototypeGpuInfo {
                    clip_start: segment.clip_start,
                    clip_count: segment.clip_count,
                    skin_start,
                    skin_count,
                }
            })
            .collect();
        let prototypes = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("CrowdVatPrototypes"),
            contents: bytemuck::cast_slice(&prototype_infos),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let skins_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("CrowdSkinArray"),
            size: wgpu::Extent3d {
                width: skins.width,
                height: skins.height,
                depth_or_array_layers: skins.layer_count,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &skins_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &skins.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(skins.width * 4),
                rows_per_image: Some(skins.height),
            },
            wgpu::Extent3d {
                width: skins.width,
                height: skins.height,
                depth_or_array_layers: skins.layer_count,
            },
        );
        let skins_view = skins_texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let skin_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("CrowdSkinSampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            position_view: position.1,
            normal_view: normal.1,
            clips,
            prototypes,
            skins_view,
            skin_sampler,
            _position: position.0,
            _normal: normal.0,
            _skins: skins_texture,
        }
    }
}

fn upload_float_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &VatTexture,
    label: &str,
) -> (wgpu::Texture, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width: source.width.max(1),
        height: source.height.max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    if !source.texels.is_empty() {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&source.texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(source.width * 16),
                rows_per_image: Some(source.height),
            },
            size,
        );
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
