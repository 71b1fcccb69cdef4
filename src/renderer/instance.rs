use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use half::f16;

use crate::error::CrowdError;

/// Packed per-instance record shared with the culling and render shaders.
///
/// Two id pairs are packed into single 32-bit words with plain shift/mask
/// arithmetic:
/// - `mesh_skin`: prototype mesh id in bits 0..16, skin id in bits 16..32.
/// - `anim_speed`: animation clip id in bits 0..16, playback speed as IEEE
///   half-precision bits in 16..32.
///
/// The struct is 80 bytes so it tiles a WGSL storage array with a 16-byte
/// aligned stride.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct InstanceRecord {
    pub model: [[f32; 4]; 4],
    pub mesh_skin: u32,
    pub anim_speed: u32,
    pub _padding: [u32; 2],
}

impl InstanceRecord {
    pub fn new(model: Mat4, mesh_id: u16, skin_id: u16, animation_id: u16, speed: f32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            mesh_skin: pack_mesh_skin(mesh_id, skin_id),
            anim_speed: pack_anim_speed(animation_id, speed),
            _padding: [0; 2],
        }
    }

    pub fn mesh_id(&self) -> u16 {
        unpack_mesh_skin(self.mesh_skin).0
    }

    pub fn skin_id(&self) -> u16 {
        unpack_mesh_skin(self.mesh_skin).1
    }

    pub fn animation_id(&self) -> u16 {
        unpack_anim_speed(self.anim_speed).0
    }

    pub fn speed(&self) -> f32 {
        unpack_anim_speed(self.anim_speed).1
    }

    /// World-space translation column of the model matrix. The cull shader
    /// reconstructs the bounding-sphere center from the same column.
    pub fn translation(&self) -> glam::Vec3 {
        glam::Vec3::new(self.model[3][0], self.model[3][1], self.model[3][2])
    }

    /// Checks every packed id against the per-prototype limits. Producers
    /// call this before upload; the shaders clamp rather than re-validate.
    pub fn validate(&self, limits: &[PrototypeIdLimits]) -> Result<(), CrowdError> {
        let prototype = self.mesh_id();
        let limit = limits
            .get(prototype as usize)
            .ok_or(CrowdError::PrototypeOutOfRange {
                index: prototype as usize,
                count: limits.len(),
            })?;
        let skin = self.skin_id();
        if skin as u32 >= limit.skin_count.max(1) {
            return Err(CrowdError::SkinOutOfRange {
                skin,
                prototype,
                count: limit.skin_count,
            });
        }
        let animation = self.animation_id();
        if limit.clip_count > 0 && animation as u32 >= limit.clip_count {
            return Err(CrowdError::AnimationOutOfRange {
                animation,
                prototype,
                count: limit.clip_count,
            });
        }
        Ok(())
    }
}

/// Per-prototype id limits a record's packed words must respect. A prototype
/// with zero clips accepts any animation id (the shader ignores it).
#[derive(Debug, Clone, Copy)]
pub struct PrototypeIdLimits {
    pub clip_count: u32,
    pub skin_count: u32,
}

/// Encode (mesh id, skin id) into one word. Exact for any pair of u16s.
#[inline]
pub fn pack_mesh_skin(mesh_id: u16, skin_id: u16) -> u32 {
    mesh_id as u32 | (skin_id as u32) << 16
}

#[inline]
pub fn unpack_mesh_skin(word: u32) -> (u16, u16) {
    ((word & 0xffff) as u16, (word >> 16) as u16)
}

/// Encode (animation id, speed) into one word. The id round-trips exactly;
/// speed round-trips within half-precision rounding.
#[inline]
pub fn pack_anim_speed(animation_id: u16, speed: f32) -> u32 {
    animation_id as u32 | (f16::from_f32(speed).to_bits() as u32) << 16
}

#[inline]
pub fn unpack_anim_speed(word: u32) -> (u16, f32) {
    (
        (word & 0xffff) as u16,
        f16::from_bits((word >> 16) as u16).to_f32(),
    )
}

/// Fixed-capacity store of packed instance records.
///
/// An external producer writes complete records each update; the store is
/// read-only to the culling and draw stages. Capacity never changes after
/// construction — the orchestrator rebuilds the whole store between frames
/// when a different capacity is requested.
pub struct InstanceDataStore {
    records: Vec<InstanceRecord>,
    len: u32,
}

impl InstanceDataStore {
    pub fn new(capacity: u32) -> Self {
        Self {
            records: vec![InstanceRecord::zeroed(); capacity as usize],
            len: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.records.len() as u32
    }

    /// Number of records written for the current frame.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write one record at `index`. Records must be written in full before
    /// the frame that consumes them; a partially updated record is undefined
    /// from the consumer's perspective.
    pub fn write(&mut self, index: u32, record: InstanceRecord) -> Result<(), CrowdError> {
        let capacity = self.capacity();
        if index >= capacity {
            return Err(CrowdError::InstanceOutOfRange { index, capacity });
        }
        self.records[index as usize] = record;
        self.len = self.len.max(index + 1);
        Ok(())
    }

    /// Write a contiguous run of records starting at `start`.
    pub fn write_slice(&mut self, start: u32, records: &[InstanceRecord]) -> Result<(), CrowdError> {
        let end = start as usize + records.len();
        let capacity = self.capacity();
        if end > capacity as usize {
            return Err(CrowdError::CapacityExceeded {
                requested: end as u32,
                capacity,
            });
        }
        self.records[start as usize..end].copy_from_slice(records);
        self.len = self.len.max(end as u32);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn records(&self) -> &[InstanceRecord] {
        &self.records[..self.len as usize]
    }

    pub fn record(&self, index: u32) -> Option<&InstanceRecord> {
        self.records.get(index as usize)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.records)
    }
}
