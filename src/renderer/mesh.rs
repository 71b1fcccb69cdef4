use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use wgpu::util::DeviceExt;

use crate::error::CrowdError;

/// Vertex of the merged static buffer the crowd draws from. Skinning data is
/// bake-time only; at runtime the VAT atlas supplies animated positions and
/// normals, while the merged vertex contributes the rest pose, UVs and
/// `vat_index`, the vertex's column in its prototype's atlas slice.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct CrowdVertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub vat_index: u32,
}

impl CrowdVertex {
    pub const ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Uint32
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<CrowdVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Region of the merged vertex/index buffer belonging to one prototype.
/// Produced once at bake time; immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshSegmentDescriptor {
    pub base_vertex: i32,
    pub start_index: u32,
    pub index_count: u32,
    pub prototype: u16,
}

/// Immutable table mapping prototype id to its merged-buffer segment.
pub struct MeshSegmentRegistry {
    segments: Vec<MeshSegmentDescriptor>,
}

impl MeshSegmentRegistry {
    /// Builds the registry, checking that every segment's index range lies
    /// inside the merged index buffer and that segments arrive in prototype
    /// order (segment `i` describes prototype `i`).
    pub fn new(
        segments: Vec<MeshSegmentDescriptor>,
        merged_index_count: u32,
    ) -> Result<Self, CrowdError> {
        for (i, segment) in segments.iter().enumerate() {
            if segment.prototype as usize != i {
                return Err(CrowdError::PrototypeOutOfRange {
                    index: segment.prototype as usize,
                    count: segments.len(),
                });
            }
            let end = segment.start_index as u64 + segment.index_count as u64;
            if end > merged_index_count as u64 {
                return Err(CrowdError::PrototypeOutOfRange {
                    index: i,
                    count: segments.len(),
                });
            }
        }
        Ok(Self { segments })
    }

    pub fn get(&self, prototype: usize) -> Result<&MeshSegmentDescriptor, CrowdError> {
        self.segments
            .get(prototype)
            .ok_or(CrowdError::PrototypeOutOfRange {
                index: prototype,
                count: self.segments.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeshSegmentDescriptor> {
        self.segments.iter()
    }
}

/// Merged vertex/index data for every prototype, uploaded once.
pub struct MergedMesh {
    pub vbuf: wgpu::Buffer,
    pub ibuf: wgpu::Buffer,
    pub index_count: u32,
}

impl MergedMesh {
    pub fn from_vertices(
        device: &wgpu::Device,
        vertices: &[CrowdVertex],
        indices: &[u32],
    ) -> Self {
        let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("CrowdMergedMesh.VertexBuffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let ibuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("CrowdMergedMesh.IndexBuffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vbuf,
            ibuf,
            index_count: indices.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(prototype: u16, start_index: u32, index_count: u32) -> MeshSegmentDescriptor {
        MeshSegmentDescriptor {
            base_vertex: prototype as i32 * 100,
            start_index,
            index_count,
            prototype,
        }
    }

    #[test]
    fn vertex_stride_matches_struct_size() {
        assert_eq!(
            CrowdVertex::layout().array_stride,
            std::mem::size_of::<CrowdVertex>() as wgpu::BufferAddress
        );
    }

    #[test]
    fn registry_accepts_ordered_in_range_segments() {
        let registry = MeshSegmentRegistry::new(
            vec![segment(0, 0, 36), segment(1, 36, 24), segment(2, 60, 12)],
            72,
        )
        .unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(1).unwrap().start_index, 36);
        assert!(registry.get(3).is_err());
    }

    #[test]
    fn registry_rejects_out_of_range_index_window() {
        let result = MeshSegmentRegistry::new(vec![segment(0, 0, 36), segment(1, 36, 40)], 72);
        assert!(matches!(
            result,
            Err(CrowdError::PrototypeOutOfRange { index: 1, count: 2 })
        ));
    }

    #[test]
    fn registry_rejects_misordered_prototypes() {
        let result = MeshSegmentRegistry::new(vec![segment(1, 0, 8)], 8);
        assert!(result.is_err());
    }
}
