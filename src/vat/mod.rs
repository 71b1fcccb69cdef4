//! Bake-time vertex-animation-texture pipeline: skinned-source sampling,
//! per-prototype texture baking and atlas packing.

pub mod atlas;
pub mod baker;
pub mod manifest;
pub mod skin;

pub use atlas::{AtlasPacker, VatAtlas, VatAtlasSegment, VatClipAtlasInfo};
pub use baker::{bake_batch, bake_prototype, clip_frame_count, PrototypeVat, VatClipInfo, VatTexture};
pub use manifest::BakeManifest;
pub use skin::{SkinClip, SkinnedMeshSource, SkinnedVertex};
