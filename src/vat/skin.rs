use glam::{Mat4, Quat, Vec3};

use crate::error::BakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelInterpolation {
    Step,
    Linear,
}

#[derive(Debug, Clone)]
pub enum ChannelOutput {
    Vec3(Vec<Vec3>),
    Quat(Vec<Quat>),
}

/// Keyframe sampler for one animated joint property.
#[derive(Debug, Clone)]
pub struct ChannelSampler {
    pub times: Vec<f32>,
    pub output: ChannelOutput,
    pub interpolation: ChannelInterpolation,
}

impl ChannelSampler {
    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    /// Resolves `time` to a bracketing keyframe pair and blend factor.
    /// Times outside the keyframe range clamp to the first or last key.
    fn sample_indices(&self, time: f32) -> Option<(usize, usize, f32)> {
        let (&first, &last) = (self.times.first()?, self.times.last()?);
        if time <= first {
            return Some((0, 0, 0.0));
        }
        if time >= last {
            let end = self.times.len() - 1;
            return Some((end, end, 0.0));
        }

        // First key strictly after `time`; the range checks above guarantee
        // 1 <= upper < len. An exact keyframe hit lands on factor 0.
        let upper = self.times.partition_point(|&t| t <= time);
        let lower = upper - 1;
        let span = self.times[upper] - self.times[lower];
        let factor = if span <= f32::EPSILON {
            0.0
        } else {
            (time - self.times[lower]) / span
        };
        Some((lower, upper, factor))
    }

    pub fn sample_vec3(&self, time: f32) -> Option<Vec3> {
        let values = match &self.output {
            ChannelOutput::Vec3(values) => values,
            _ => return None,
        };

        let (lower, upper, factor) = self.sample_indices(time)?;

        if lower == upper || matches!(self.interpolation, ChannelInterpolation::Step) {
            return Some(values[lower]);
        }

        Some(values[lower].lerp(values[upper], factor))
    }

    pub fn sample_quat(&self, time: f32) -> Option<Quat> {
        let values = match &self.output {
            ChannelOutput::Quat(values) => values,
            _ => return None,
        };

        let (lower, upper, factor) = self.sample_indices(time)?;

        if lower == upper || matches!(self.interpolation, ChannelInterpolation::Step) {
            return Some(values[lower]);
        }

        let a = values[lower].normalize();
        let b = values[upper].normalize();
        Some(a.slerp(b, factor).normalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointProperty {
    Translation,
    Rotation,
    Scale,
}

#[derive(Debug, Clone)]
pub struct JointChannel {
    pub joint: usize,
    pub property: JointProperty,
    pub sampler: ChannelSampler,
}

/// One animation clip over the skeleton's joints.
#[derive(Debug, Clone)]
pub struct SkinClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<JointChannel>,
}

impl SkinClip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration: 0.0,
            channels: Vec::new(),
        }
    }

    pub fn add_channel(&mut self, channel: JointChannel) {
        self.duration = self.duration.max(channel.sampler.end_time());
        self.channels.push(channel);
    }
}

/// Rest-pose joint. Parents must precede children in the joint array so a
/// single forward pass resolves the hierarchy.
#[derive(Debug, Clone)]
pub struct Joint {
    pub parent: Option<usize>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub inverse_bind: Mat4,
}

#[derive(Debug, Clone, Copy)]
pub struct SkinnedVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub joints: [u16; 4],
    pub weights: [f32; 4],
}

/// Bake input: a skinned mesh plus its clip set. Produced by an external
/// importer; the baker only reads it.
#[derive(Debug, Clone)]
pub struct SkinnedMeshSource {
    pub name: String,
    pub vertices: Vec<SkinnedVertex>,
    pub joints: Vec<Joint>,
    pub clips: Vec<SkinClip>,
}

impl SkinnedMeshSource {
    pub fn validate(&self) -> Result<(), BakeError> {
        let joint_count = self.joints.len();
        for (index, joint) in self.joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                if parent >= index {
                    return Err(BakeError::InvalidJointHierarchy {
                        joint: index,
                        parent,
                    });
                }
            }
        }
        for (vertex, v) in self.vertices.iter().enumerate() {
            for (&joint, &weight) in v.joints.iter().zip(v.weights.iter()) {
                if weight != 0.0 && joint as usize >= joint_count {
                    return Err(BakeError::JointOutOfRange {
                        vertex,
                        joint: joint as usize,
                        joint_count,
                    });
                }
            }
        }
        for clip in &self.clips {
            for channel in &clip.channels {
                if channel.joint >= joint_count {
                    return Err(BakeError::ChannelTargetOutOfRange {
                        clip: clip.name.clone(),
                        joint: channel.joint,
                        joint_count,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Transient per-frame pose state. Each evaluation works on its own copy so
/// nothing from a failed or in-flight bake leaks into the source.
#[derive(Debug, Clone)]
pub struct PoseBuffer {
    translations: Vec<Vec3>,
    rotations: Vec<Quat>,
    scales: Vec<Vec3>,
    globals: Vec<Mat4>,
    skinning: Vec<Mat4>,
}

impl PoseBuffer {
    pub fn for_skeleton(joints: &[Joint]) -> Self {
        Self {
            translations: joints.iter().map(|j| j.translation).collect(),
            rotations: joints.iter().map(|j| j.rotation).collect(),
            scales: joints.iter().map(|j| j.scale).collect(),
            globals: vec![Mat4::IDENTITY; joints.len()],
            skinning: vec![Mat4::IDENTITY; joints.len()],
        }
    }

    /// Samples `clip` at `time`, resolves the hierarchy and produces the
    /// skinning palette (global x inverse bind).
    pub fn evaluate(&mut self, joints: &[Joint], clip: &SkinClip, time: f32) {
        for (index, joint) in joints.iter().enumerate() {
            self.translations[index] = joint.translation;
            self.rotations[index] = joint.rotation;
            self.scales[index] = joint.scale;
        }

        for channel in &clip.channels {
            match channel.property {
                JointProperty::Translation => {
                    if let Some(value) = channel.sampler.sample_vec3(time) {
                        self.translations[channel.joint] = value;
                    }
                }
                JointProperty::Rotation => {
                    if let Some(value) = channel.sampler.sample_quat(time) {
                        self.rotations[channel.joint] = value;
                    }
                }
                JointProperty::Scale => {
                    if let Some(value) = channel.sampler.sample_vec3(time) {
                        self.scales[channel.joint] = value;
                    }
                }
            }
        }

        for (index, joint) in joints.iter().enumerate() {
            let local = Mat4::from_scale_rotation_translation(
                self.scales[index],
                self.rotations[index],
                self.translations[index],
            );
            self.globals[index] = match joint.parent {
                Some(parent) => self.globals[parent] * local,
                None => local,
            };
            self.skinning[index] = self.globals[index] * joint.inverse_bind;
        }
    }

    /// Linear-blend skins one vertex with the current palette.
    pub fn skin_vertex(&self, vertex: &SkinnedVertex) -> (Vec3, Vec3) {
        let mut position = Vec3::ZERO;
        let mut normal = Vec3::ZERO;
        for (&joint, &weight) in vertex.joints.iter().zip(vertex.weights.iter()) {
            if weight == 0.0 {
                continue;
            }
            let palette = &self.skinning[joint as usize];
            position += palette.transform_point3(vertex.position) * weight;
            normal += palette.transform_vector3(vertex.normal) * weight;
        }
        (position, normal.normalize_or_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    fn root_joint() -> Joint {
        Joint {
            parent: None,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            inverse_bind: Mat4::IDENTITY,
        }
    }

    #[test]
    fn sampler_linear_interpolation_and_clamping() {
        let sampler = ChannelSampler {
            times: vec![0.0, 1.0],
            output: ChannelOutput::Vec3(vec![Vec3::ZERO, Vec3::ONE]),
            interpolation: ChannelInterpolation::Linear,
        };

        assert_eq!(sampler.sample_vec3(-0.5).unwrap(), Vec3::ZERO);
        assert_eq!(sampler.sample_vec3(2.0).unwrap(), Vec3::ONE);
        let mid = sampler.sample_vec3(0.5).unwrap();
        assert!((mid - vec3(0.5, 0.5, 0.5)).length() < 1e-6);
    }

    #[test]
    fn sampler_returns_interior_keyframes_exactly() {
        let sampler = ChannelSampler {
            times: vec![0.0, 1.0, 2.0],
            output: ChannelOutput::Vec3(vec![Vec3::ZERO, Vec3::X, Vec3::Y]),
            interpolation: ChannelInterpolation::Linear,
        };
        // An exact hit on a middle key yields that key, not a blend.
        assert_eq!(sampler.sample_vec3(1.0).unwrap(), Vec3::X);
        let blended = sampler.sample_vec3(1.25).unwrap();
        assert!((blended - (Vec3::X * 0.75 + Vec3::Y * 0.25)).length() < 1e-6);
    }

    #[test]
    fn sampler_step_mode_holds_previous_key() {
        let sampler = ChannelSampler {
            times: vec![0.0, 1.0, 2.0],
            output: ChannelOutput::Vec3(vec![Vec3::ZERO, Vec3::X, Vec3::Y]),
            interpolation: ChannelInterpolation::Step,
        };
        assert_eq!(sampler.sample_vec3(0.9).unwrap(), Vec3::ZERO);
        assert_eq!(sampler.sample_vec3(1.5).unwrap(), Vec3::X);
    }

    #[test]
    fn pose_resolves_parent_chain() {
        let joints = vec![
            root_joint(),
            Joint {
                parent: Some(0),
                translation: vec3(1.0, 0.0, 0.0),
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
                inverse_bind: Mat4::IDENTITY,
            },
        ];

        let mut clip = SkinClip::new("slide");
        clip.add_channel(JointChannel {
            joint: 0,
            property: JointProperty::Translation,
            sampler: ChannelSampler {
                times: vec![0.0, 1.0],
                output: ChannelOutput::Vec3(vec![Vec3::ZERO, vec3(0.0, 2.0, 0.0)]),
                interpolation: ChannelInterpolation::Linear,
            },
        });

        let mut pose = PoseBuffer::for_skeleton(&joints);
        pose.evaluate(&joints, &clip, 1.0);

        let child_world = pose.globals[1].transform_point3(Vec3::ZERO);
        assert!((child_world - vec3(1.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn validate_rejects_bad_hierarchy_and_ranges() {
        let mut source = SkinnedMeshSource {
            name: "bad".into(),
            vertices: vec![SkinnedVertex {
                position: Vec3::ZERO,
                normal: Vec3::Y,
                joints: [3, 0, 0, 0],
                weights: [1.0, 0.0, 0.0, 0.0],
            }],
            joints: vec![root_joint()],
            clips: Vec::new(),
        };
        assert!(matches!(
            source.validate(),
            Err(BakeError::JointOutOfRange { vertex: 0, joint: 3, .. })
        ));

        source.vertices[0].joints = [0; 4];
        source.joints.push(Joint {
            parent: Some(1),
            ..root_joint()
        });
        assert!(matches!(
            source.validate(),
            Err(BakeError::InvalidJointHierarchy { joint: 1, parent: 1 })
        ));
    }
}
