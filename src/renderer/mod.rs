pub mod buffers;
pub mod context;
pub mod culling;
pub mod draw_args;
pub mod frustum;
pub mod instance;
pub mod mesh;
pub mod orchestrator;
pub mod pipeline;

pub use buffers::{CrowdBuffers, SkinTextureData, VatGpuResources};
pub use context::GpuContext;
pub use culling::{CullParams, CullSettings, CullingPipeline};
pub use draw_args::{CommandInfo, DrawCommandAssembler, DrawStream, IndirectDrawArgs};
pub use frustum::{Frustum, Plane};
pub use instance::{InstanceDataStore, InstanceRecord, PrototypeIdLimits};
pub use mesh::{CrowdVertex, MergedMesh, MeshSegmentDescriptor, MeshSegmentRegistry};
pub use orchestrator::{CameraFrame, FrameStats, RenderOrchestrator};
pub use pipeline::{CrowdRenderPipeline, FrameUniform};
