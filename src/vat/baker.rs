use rayon::prelude::*;

use crate::error::BakeError;
use crate::vat::skin::{PoseBuffer, SkinnedMeshSource};

/// CPU-side float texture, row-major, one `[x, y, z, w]` texel per entry.
/// Rows are animation frames, columns are vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct VatTexture {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl VatTexture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texels: vec![[0.0; 4]; (width * height) as usize],
        }
    }

    pub fn row_mut(&mut self, row: u32) -> &mut [[f32; 4]] {
        let start = (row * self.width) as usize;
        &mut self.texels[start..start + self.width as usize]
    }

    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.width + x) as usize]
    }
}

/// Where one clip's frames landed in the prototype's own texture, in
/// normalized [0, 1] row coordinates with a half-texel inset so samplers
/// never bleed into the neighbouring clip's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct VatClipInfo {
    pub name: String,
    pub vertex_count: u32,
    pub frame_count: u32,
    pub duration: f32,
    pub normalized_start: f32,
    pub normalized_length: f32,
}

/// Bake output for one prototype: a position/normal texture pair plus
/// per-clip row metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PrototypeVat {
    pub position: VatTexture,
    pub normal: VatTexture,
    pub clips: Vec<VatClipInfo>,
}

impl PrototypeVat {
    /// Default entry emitted for sources that produced no animation data,
    /// so batch indices keep lining up with prototype ids.
    pub fn placeholder() -> Self {
        Self {
            position: VatTexture::new(1, 1),
            normal: VatTexture::new(1, 1),
            clips: Vec::new(),
        }
    }
}

/// Number of samples for one clip: evenly spaced, endpoints included.
pub fn clip_frame_count(duration: f32, samples_per_second: f32) -> u32 {
    (duration * samples_per_second).ceil() as u32 + 1
}

/// Samples every clip of `source` into a position/normal texture pair,
/// column = vertex index, row = global frame index with clips concatenated
/// in order.
///
/// A source with no vertices, no joints or no clips is the recoverable
/// "nothing to bake" outcome and returns `Ok(None)`; internal inconsistency
/// (bad joint references, broken hierarchy) is a fatal `BakeError`. All
/// transient pose state is owned by this call and dropped on every exit
/// path.
pub fn bake_prototype(
    source: &SkinnedMeshSource,
    samples_per_second: f32,
) -> Result<Option<PrototypeVat>, BakeError> {
    source.validate()?;

    if source.vertices.is_empty() || source.joints.is_empty() || source.clips.is_empty() {
        return Ok(None);
    }

    let vertex_count = source.vertices.len() as u32;
    let frame_counts: Vec<u32> = source
        .clips
        .iter()
        .map(|clip| clip_frame_count(clip.duration.max(0.0), samples_per_second))
        .collect();
    let total_frames: u32 = frame_counts.iter().sum();

    let mut position = VatTexture::new(vertex_count, total_frames);
    let mut normal = VatTexture::new(vertex_count, total_frames);
    let mut clips = Vec::with_capacity(source.clips.len());

    let mut start_frame = 0u32;
    for (clip, &frame_count) in source.clips.iter().zip(frame_counts.iter()) {
        let duration = clip.duration.max(0.0);

        // Each frame gets its own transient pose copy; rows of one clip are
        // independent, so evaluate them in parallel.
        let rows: Vec<(Vec<[f32; 4]>, Vec<[f32; 4]>)> = (0..frame_count)
            .into_par_iter()
            .map(|frame| {
                let time = if frame_count > 1 {
                    duration * frame as f32 / (frame_count - 1) as f32
                } else {
                    0.0
                };
                let mut pose = PoseBuffer::for_skeleton(&source.joints);
                pose.evaluate(&source.joints, clip, time);

                let mut position_row = Vec::with_capacity(source.vertices.len());
                let mut normal_row = Vec::with_capacity(source.vertices.len());
                for vertex in &source.vertices {
                    let (p, n) = pose.skin_vertex(vertex);
                    position_row.push([p.x, p.y, p.z, 1.0]);
                    normal_row.push([n.x, n.y, n.z, 0.0]);
                }
                (position_row, normal_row)
            })
            .collect();

        for (offset, (position_row, normal_row)) in rows.into_iter().enumerate() {
            let row = start_frame + offset as u32;
            position.row_mut(row).copy_from_slice(&position_row);
            normal.row_mut(row).copy_from_slice(&normal_row);
        }

        let total = total_frames as f32;
        let normalized_start = (start_frame as f32 + 0.5) / total;
        let normalized_length =
            (start_frame as f32 + frame_count as f32 - 0.5) / total - normalized_start;
        clips.push(VatClipInfo {
            name: clip.name.clone(),
            vertex_count,
            frame_count,
            duration,
            normalized_start,
            normalized_length,
        });

        start_frame += frame_count;
    }

    Ok(Some(PrototypeVat {
        position,
        normal,
        clips,
    }))
}

/// Bakes a batch of sources. Per-item "nothing to bake" outcomes are
/// recovered locally with a placeholder entry so the batch keeps going;
/// fatal errors abort the whole bake.
pub fn bake_batch(
    sources: &[SkinnedMeshSource],
    samples_per_second: f32,
) -> Result<Vec<PrototypeVat>, BakeError> {
    let mut baked = Vec::with_capacity(sources.len());
    for source in sources {
        match bake_prototype(source, samples_per_second)? {
            Some(vat) => baked.push(vat),
            None => {
                log::warn!(
                    "Source '{}' has no animation data, emitting placeholder VAT",
                    source.name
                );
                baked.push(PrototypeVat::placeholder());
            }
        }
    }
    Ok(baked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vat::skin::{
        ChannelInterpolation, ChannelOutput, ChannelSampler, Joint, JointChannel, JointProperty,
        SkinClip, SkinnedVertex,
    };
    use glam::{Mat4, Quat, Vec3};

    fn single_joint_source(clip_durations: &[f32]) -> SkinnedMeshSource {
        let clips = clip_durations
            .iter()
            .enumerate()
            .map(|(i, &duration)| {
                let mut clip = SkinClip::new(format!("clip{}", i));
                clip.add_channel(JointChannel {
                    joint: 0,
                    property: JointProperty::Translation,
                    sampler: ChannelSampler {
                        times: vec![0.0, duration],
                        output: ChannelOutput::Vec3(vec![Vec3::ZERO, Vec3::Y * duration]),
                        interpolation: ChannelInterpolation::Linear,
                    },
                });
                clip
            })
            .collect();

        SkinnedMeshSource {
            name: "rig".into(),
            vertices: vec![
                SkinnedVertex {
                    position: Vec3::ZERO,
                    normal: Vec3::Y,
                    joints: [0; 4],
                    weights: [1.0, 0.0, 0.0, 0.0],
                },
                SkinnedVertex {
                    position: Vec3::X,
                    normal: Vec3::Y,
                    joints: [0; 4],
                    weights: [1.0, 0.0, 0.0, 0.0],
                },
            ],
            joints: vec![Joint {
                parent: None,
                translation: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
                inverse_bind: Mat4::IDENTITY,
            }],
            clips,
        }
    }

    #[test]
    fn frame_count_formula() {
        assert_eq!(clip_frame_count(1.0, 60.0), 61);
        assert_eq!(clip_frame_count(0.5, 60.0), 31);
        assert_eq!(clip_frame_count(0.0, 60.0), 1);
    }

    #[test]
    fn two_clip_bake_matches_expected_rows_and_insets() {
        let source = single_joint_source(&[1.0, 0.5]);
        let vat = bake_prototype(&source, 60.0).unwrap().unwrap();

        assert_eq!(vat.position.width, 2);
        assert_eq!(vat.position.height, 61 + 31);
        assert_eq!(vat.clips.len(), 2);
        assert_eq!(vat.clips[0].frame_count, 61);
        assert_eq!(vat.clips[1].frame_count, 31);

        let second_start = (61.0 + 0.5) / 92.0;
        assert!((vat.clips[1].normalized_start - second_start).abs() < 1e-6);
        assert!((vat.clips[1].normalized_start - 0.6685).abs() < 1e-3);

        let first_length = 60.0 / 92.0;
        assert!((vat.clips[0].normalized_length - first_length).abs() < 1e-6);
    }

    #[test]
    fn baked_positions_track_the_animated_joint() {
        let source = single_joint_source(&[1.0]);
        let vat = bake_prototype(&source, 60.0).unwrap().unwrap();

        // First frame: rest pose.
        let first = vat.position.texel(1, 0);
        assert!((first[0] - 1.0).abs() < 1e-5);
        assert!(first[1].abs() < 1e-5);

        // Last frame: joint translated a full unit up.
        let last = vat.position.texel(1, vat.position.height - 1);
        assert!((last[1] - 1.0).abs() < 1e-5);

        // Midpoint frame interpolates halfway.
        let mid = vat.position.texel(0, 30);
        assert!((mid[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn empty_source_is_recoverable_not_fatal() {
        let mut source = single_joint_source(&[1.0]);
        source.clips.clear();
        assert!(bake_prototype(&source, 60.0).unwrap().is_none());

        let baked = bake_batch(&[source], 60.0).unwrap();
        assert_eq!(baked.len(), 1);
        assert!(baked[0].clips.is_empty());
        assert_eq!(baked[0].position.width, 1);
    }

    #[test]
    fn inconsistent_source_is_fatal() {
        let mut source = single_joint_source(&[1.0]);
        source.clips[0].channels[0].joint = 9;
        assert!(bake_prototype(&source, 60.0).is_err());
    }
}
