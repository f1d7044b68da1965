pub mod display_list;
pub mod error;
pub mod microcode;
pub mod room;
pub mod scanner;
pub mod scene;
pub mod segment;
pub mod stream;

pub use display_list::{DisplayListPatcher, F3dex, F3dex2, patch_display_list};
pub use error::StructureError;
pub use microcode::{Dialect, GfxToolchain, MicrocodeTransform, TransformError};
pub use room::{MeshHeader, RoomOptions, RoomSummary, clear_actor_lists, convert_room};
pub use scanner::{Candidate, Rejection, RoomRange, ScanReport, SceneHit, find_scene_headers};
pub use scene::{ExtractOptions, ExtractedRoom, ExtractedScene, ScenePatches, extract_scene};
pub use segment::{Owner, Segment, SegmentAddress};
pub use stream::{Flow, HeaderCommand, StreamEnd, StreamError, walk, walk_mut};
