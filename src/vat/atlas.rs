use serde::{Deserialize, Serialize};

use crate::error::CrowdError;
use crate::vat::baker::{PrototypeVat, VatTexture};

/// Per-prototype slice of the shared atlas: a normalized X window plus the
/// range of this prototype's clips in the flattened clip list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VatAtlasSegment {
    pub offset_x: f32,
    pub width: f32,
    pub clip_start: u32,
    pub clip_count: u32,
}

/// One clip's frame-by-vertex rectangle inside the shared atlas, in
/// normalized [0, 1] UV space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatClipAtlasInfo {
    pub name: String,
    pub vertex_count: u32,
    pub frame_count: u32,
    pub duration: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub width: f32,
    pub length: f32,
}

/// The packed atlas pair plus all lookup metadata.
#[derive(Debug, Clone)]
pub struct VatAtlas {
    pub position: VatTexture,
    pub normal: VatTexture,
    pub segments: Vec<VatAtlasSegment>,
    pub clips: Vec<VatClipAtlasInfo>,
}

/// Packs per-prototype VAT texture pairs into one shared atlas pair.
///
/// Inputs are concatenated horizontally; the atlas is as tall as the tallest
/// input and shorter inputs are anchored to the bottom so every prototype
/// shares the same coordinate origin.
pub struct AtlasPacker {
    max_dimension: u32,
}

impl AtlasPacker {
    /// `max_dimension` is the device's maximum 2D texture size
    /// (`wgpu::Limits::max_texture_dimension_2d`).
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    pub fn pack(&self, inputs: &[PrototypeVat]) -> Result<VatAtlas, CrowdError> {
        let atlas_width: u32 = inputs.iter().map(|vat| vat.position.width).sum();
        let atlas_height: u32 = inputs
            .iter()
            .map(|vat| vat.position.height)
            .max()
            .unwrap_or(0);

        // Device-limit check happens before any texel allocation.
        if atlas_width > self.max_dimension || atlas_height > self.max_dimension {
            return Err(CrowdError::AtlasTooLarge {
                width: atlas_width,
                height: atlas_height,
                limit: self.max_dimension,
            });
        }

        let mut position = VatTexture::new(atlas_width, atlas_height);
        let mut normal = VatTexture::new(atlas_width, atlas_height);
        let mut segments = Vec::with_capacity(inputs.len());
        let mut clips = Vec::new();

        let mut x_offset = 0u32;
        for vat in inputs {
            let input_width = vat.position.width;
            let input_height = vat.position.height;
            let y_offset = atlas_height - input_height;

            blit(&vat.position, &mut position, x_offset, y_offset);
            blit(&vat.normal, &mut normal, x_offset, y_offset);

            let height_scale = input_height as f32 / atlas_height as f32;
            let anchor_y = y_offset as f32 / atlas_height as f32;
            let normalized_x = x_offset as f32 / atlas_width as f32;
            let normalized_width = input_width as f32 / atlas_width as f32;

            segments.push(VatAtlasSegment {
                offset_x: normalized_x,
                width: normalized_width,
                clip_start: clips.len() as u32,
                clip_count: vat.clips.len() as u32,
            });

            for clip in &vat.clips {
                clips.push(VatClipAtlasInfo {
                    name: clip.name.clone(),
                    vertex_count: clip.vertex_count,
                    frame_count: clip.frame_count,
                    duration: clip.duration,
                    offset_x: normalized_x,
                    offset_y: clip.normalized_start * height_scale + anchor_y,
                    width: normalized_width,
                    length: clip.normalized_length * height_scale,
                });
            }

            x_offset += input_width;
        }

        Ok(VatAtlas {
            position,
            normal,
            segments,
            clips,
        })
    }
}

fn blit(source: &VatTexture, target: &mut VatTexture, x_offset: u32, y_offset: u32) {
    for row in 0..source.height {
        let src_start = (row * source.width) as usize;
        let dst_start = ((y_offset + row) * target.width + x_offset) as usize;
        target.texels[dst_start..dst_start + source.width as usize]
            .copy_from_slice(&source.texels[src_start..src_start + source.width as usize]);
    }
}
