//! GPU-driven crowd renderer: draws very large populations of similar
//! animated meshes with one indirect multi-draw call, compute-shader
//! visibility culling and vertex-animation-texture playback, keeping
//! per-frame host work proportional to prototype count, not instance count.

pub mod error;
pub mod renderer;
pub mod settings;
pub mod vat;

pub use error::{BakeError, CrowdError};
pub use renderer::{
    CameraFrame, DrawCommandAssembler, GpuContext, InstanceDataStore, InstanceRecord,
    MeshSegmentDescriptor, MeshSegmentRegistry, RenderOrchestrator,
};
pub use settings::CrowdSettings;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
