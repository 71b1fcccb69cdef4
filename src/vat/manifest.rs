use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::renderer::mesh::MeshSegmentDescriptor;
use crate::vat::atlas::{VatAtlas, VatAtlasSegment, VatClipAtlasInfo};
use crate::vat::baker::VatTexture;

/// Persisted bake output: everything the runtime needs to rebuild the crowd
/// rendering buffers, minus the raw texel payloads, which live in sidecar
/// binary files referenced by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakeManifest {
    pub segments: Vec<MeshSegmentDescriptor>,
    /// Per-prototype (start, count) range into the skin texture array.
    pub skin_ranges: Vec<(u32, u32)>,
    pub atlas_segments: Vec<VatAtlasSegment>,
    pub clips: Vec<VatClipAtlasInfo>,
    pub atlas_width: u32,
    pub atlas_height: u32,
    pub position_payload: String,
    pub normal_payload: String,
}

impl BakeManifest {
    pub fn from_atlas(
        segments: Vec<MeshSegmentDescriptor>,
        skin_ranges: Vec<(u32, u32)>,
        atlas: &VatAtlas,
        position_payload: impl Into<String>,
        normal_payload: impl Into<String>,
    ) -> Self {
        Self {
            segments,
            skin_ranges,
            atlas_segments: atlas.segments.clone(),
            clips: atlas.clips.clone(),
            atlas_width: atlas.position.width,
            atlas_height: atlas.position.height,
            position_payload: position_payload.into(),
            normal_payload: normal_payload.into(),
        }
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        std::fs::write(path.as_ref(), json)?;
        log::info!("Saved bake manifest to {:?}", path.as_ref());
        Ok(())
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

/// Writes a texture's texels as little-endian f32 quadruplets.
pub fn save_texture_payload<P: AsRef<Path>>(texture: &VatTexture, path: P) -> std::io::Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for texel in &texture.texels {
        for component in texel {
            file.write_all(&component.to_le_bytes())?;
        }
    }
    file.flush()
}

/// Reads a payload written by [`save_texture_payload`]. Dimensions come from
/// the manifest; a size mismatch is an invalid-data error.
pub fn load_texture_payload<P: AsRef<Path>>(
    path: P,
    width: u32,
    height: u32,
) -> std::io::Result<VatTexture> {
    let bytes = std::fs::read(path.as_ref())?;
    let expected = (width * height) as usize * 16;
    if bytes.len() != expected {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "payload {:?} is {} bytes, expected {} for {}x{}",
                path.as_ref(),
                bytes.len(),
                expected,
                width,
                height
            ),
        ));
    }

    let texels = bytes
        .chunks_exact(16)
        .map(|chunk| {
            let mut texel = [0.0f32; 4];
            for (component, value) in chunk.chunks_exact(4).zip(texel.iter_mut()) {
                *value = f32::from_le_bytes([component[0], component[1], component[2], component[3]]);
            }
            texel
        })
        .collect();

    Ok(VatTexture {
        width,
        height,
        texels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_payload_roundtrips() {
        let dir = std::env::temp_dir().join("wgpu_crowd_manifest_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("positions.vat");

        let mut texture = VatTexture::new(2, 3);
        for (i, texel) in texture.texels.iter_mut().enumerate() {
            *texel = [i as f32, -(i as f32), 0.5, 1.0];
        }

        save_texture_payload(&texture, &path).unwrap();
        let loaded = load_texture_payload(&path, 2, 3).unwrap();
        assert_eq!(loaded, texture);

        assert!(load_texture_payload(&path, 2, 4).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn manifest_json_roundtrips() {
        let manifest = BakeManifest {
            segments: vec![MeshSegmentDescriptor {
                base_vertex: 0,
                start_index: 0,
                index_count: 36,
                prototype: 0,
            }],
            skin_ranges: vec![(0, 2)],
            atlas_segments: vec![VatAtlasSegment {
                offset_x: 0.0,
                width: 1.0,
                clip_start: 0,
                clip_count: 1,
            }],
            clips: vec![VatClipAtlasInfo {
                name: "walk".into(),
                vertex_count: 8,
                frame_count: 61,
                duration: 1.0,
                offset_x: 0.0,
                offset_y: 0.5 / 61.0,
                width: 1.0,
                length: 60.0 / 61.0,
            }],
            atlas_width: 8,
            atlas_height: 61,
            position_payload: "positions.vat".into(),
            normal_payload: "normals.vat".into(),
        };

        let json = serde_json::to_string(&manifest).unwrap();
        let parsed: BakeManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.segments, manifest.segments);
        assert_eq!(parsed.clips[0].name, "walk");
        assert_eq!(parsed.atlas_height, 61);
    }
}
