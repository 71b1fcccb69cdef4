use bytemuck::{Pod, Zeroable};

use crate::error::CrowdError;
use crate::renderer::mesh::MeshSegmentRegistry;

/// Indirect draw arguments, field-for-field the layout the GPU consumes for
/// `draw_indexed_indirect` (`wgpu::util::DrawIndexedIndirectArgs`).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct IndirectDrawArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// One entry of the per-command lookup table: where the command's instances
/// start in the (dense) instance range, and which prototype it draws.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct CommandInfo {
    pub first_instance: u32,
    pub prototype: u32,
}

/// Fully assembled draw stream for one frame: one command per prototype plus
/// the offset lookup that resolves (command, local instance) to a global
/// instance index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawStream {
    pub args: Vec<IndirectDrawArgs>,
    pub commands: Vec<CommandInfo>,
    pub total_instances: u32,
}

/// Converts per-prototype instance counts plus segment descriptors into
/// indirect draw arguments. Pure host-side arithmetic; all range checks
/// happen here, before anything touches the device.
pub struct DrawCommandAssembler;

impl DrawCommandAssembler {
    /// Exclusive prefix sum over `counts` yields each prototype's start
    /// offset; each emitted args record references its mesh segment and that
    /// offset. Rejects a total above `capacity` before any GPU allocation.
    pub fn assemble(
        counts: &[u32],
        registry: &MeshSegmentRegistry,
        capacity: u32,
    ) -> Result<DrawStream, CrowdError> {
        if counts.len() != registry.len() {
            return Err(CrowdError::PrototypeOutOfRange {
                index: counts.len().max(registry.len()) - 1,
                count: registry.len(),
            });
        }

        let total: u64 = counts.iter().map(|&c| c as u64).sum();
        if total > capacity as u64 {
            return Err(CrowdError::CapacityExceeded {
                requested: total as u32,
                capacity,
            });
        }

        let mut args = Vec::with_capacity(counts.len());
        let mut commands = Vec::with_capacity(counts.len());
        let mut offset = 0u32;
        for (prototype, &count) in counts.iter().enumerate() {
            let segment = registry.get(prototype)?;
            args.push(IndirectDrawArgs {
                index_count: segment.index_count,
                instance_count: count,
                first_index: segment.start_index,
                base_vertex: segment.base_vertex,
                first_instance: offset,
            });
            commands.push(CommandInfo {
                first_instance: offset,
                prototype: prototype as u32,
            });
            offset += count;
        }

        Ok(DrawStream {
            args,
            commands,
            total_instances: total as u32,
        })
    }
}
