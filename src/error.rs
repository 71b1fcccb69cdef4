use thiserror::Error;

/// Errors surfaced by the crowd renderer.
///
/// Capacity and range violations are always detected before any device
/// upload; atlas sizing is checked before any large host allocation.
#[derive(Debug, Error)]
pub enum CrowdError {
    #[error("missing device capability: {0}")]
    MissingCapability(&'static str),

    #[error("instance count {requested} exceeds store capacity {capacity}")]
    CapacityExceeded { requested: u32, capacity: u32 },

    #[error("prototype index {index} out of range ({count} prototypes)")]
    PrototypeOutOfRange { index: usize, count: usize },

    #[error("instance index {index} out of range (capacity {capacity})")]
    InstanceOutOfRange { index: u32, capacity: u32 },

    #[error("skin id {skin} out of range for prototype {prototype} ({count} skins)")]
    SkinOutOfRange { skin: u16, prototype: u16, count: u32 },

    #[error("animation id {animation} out of range for prototype {prototype} ({count} clips)")]
    AnimationOutOfRange { animation: u16, prototype: u16, count: u32 },

    #[error(
        "VAT atlas {width}x{height} exceeds maximum texture dimension {limit}"
    )]
    AtlasTooLarge { width: u32, height: u32, limit: u32 },

    #[error("bake failed: {0}")]
    Bake(#[from] BakeError),
}

/// Fatal inconsistencies encountered while baking vertex animation textures.
///
/// A source that simply has no usable animation data is not an error; bakes
/// report that case as a recoverable `None` result instead.
#[derive(Debug, Error)]
pub enum BakeError {
    #[error("vertex {vertex} references joint {joint}, but the skeleton has {joint_count} joints")]
    JointOutOfRange {
        vertex: usize,
        joint: usize,
        joint_count: usize,
    },

    #[error("clip '{clip}' targets joint {joint}, but the skeleton has {joint_count} joints")]
    ChannelTargetOutOfRange {
        clip: String,
        joint: usize,
        joint_count: usize,
    },

    #[error("joint {joint} lists parent {parent}, which does not precede it")]
    InvalidJointHierarchy { joint: usize, parent: usize },
}
