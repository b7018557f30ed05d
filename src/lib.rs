//! Node and entity framework for the Crystal runtime.
//!
//! Game objects are plain-data nodes kept in fixed-capacity arrays per
//! node kind, instantiated in groups from declarative templates, wired
//! together by field routes and updated in per-kind batches every frame.
//! Physics, resources, rendering and input are injected collaborators so
//! the whole simulation runs headless and under test.

pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod fail;
pub mod field;
pub mod group;
pub mod input;
pub mod level;
pub mod nodes;
pub mod physics;
pub mod registry;
pub mod reload;
pub mod render;
pub mod resource;
pub mod storage;
pub mod world;

pub use config::{NodeCapacities, WorldConfig};
pub use context::{Env, FrameContext, LifecycleContext, ResurrectContext};
pub use error::{NodeError, NodeResult};
pub use field::{FieldDesc, FieldKind, FieldType, InlineName, SlotVal, SlotValue};
pub use group::{FieldPath, NodeGroupDef, NodeGroupDesc};
pub use input::{InputState, KeyCode, MouseButton, NamedKey};
pub use level::{LevelDesc, SpawnDesc};
pub use physics::{BodyDesc, BodyRef, BodyState, PhysicsBackend, PointMassPhysics, SegmentHit};
pub use registry::{NodeKind, NodeTypeDescriptor, NodeTypeId, NodeTypeRegistry};
pub use reload::WorldSnapshot;
pub use render::{DrawCommand, DrawList, DrawSink};
pub use resource::{ClipResource, ModelResource, ResourceId, ResourceKind, ResourceStore};
pub use storage::{ImplHandle, NodeRun, NodeStorage};
pub use world::{GroupId, NodeHandle, NodeInfo, SlotRouting, World};
