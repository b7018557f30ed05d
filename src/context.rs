//! Services injected into the world instead of living in globals.

use crate::input::InputState;
use crate::physics::{PhysicsBackend, PointMassPhysics};
use crate::resource::ResourceStore;
use crate::world::NodeHandle;

/// External collaborators the simulation talks to. Owned by the embedding
/// loop and passed by reference into every world call that needs them.
pub struct Env {
    pub physics: Box<dyn PhysicsBackend>,
    pub resources: ResourceStore,
    pub input: InputState,
}

impl Env {
    pub fn new(physics: Box<dyn PhysicsBackend>, resources: ResourceStore) -> Self {
        Self {
            physics,
            resources,
            input: InputState::new(),
        }
    }

    /// Point-mass physics and an empty resource store.
    pub fn headless() -> Self {
        Self::new(Box::new(PointMassPhysics::new()), ResourceStore::new())
    }

    pub(crate) fn lifecycle(&mut self) -> LifecycleContext<'_> {
        LifecycleContext {
            physics: self.physics.as_mut(),
            resources: &self.resources,
        }
    }

    pub(crate) fn resurrection(&self) -> ResurrectContext<'_> {
        ResurrectContext {
            physics: self.physics.as_ref(),
            resources: &self.resources,
        }
    }
}

/// What a node kind's update hook may touch during a frame.
pub struct FrameContext<'a> {
    /// Simulation time after this frame's advance.
    pub time: f64,
    pub dt: f32,
    pub physics: &'a mut dyn PhysicsBackend,
    pub resources: &'a ResourceStore,
    pub input: &'a InputState,
    removals: &'a mut Vec<NodeHandle>,
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(time: f64, dt: f32, env: &'a mut Env, removals: &'a mut Vec<NodeHandle>) -> Self {
        Self {
            time,
            dt,
            physics: env.physics.as_mut(),
            resources: &env.resources,
            input: &env.input,
            removals,
        }
    }

    /// Schedules the group owning `member` for teardown once the frame's
    /// updates and routes are done.
    pub fn request_group_removal(&mut self, member: NodeHandle) {
        if !self.removals.contains(&member) {
            self.removals.push(member);
        }
    }
}

/// Services available while a node is created or destroyed.
pub struct LifecycleContext<'a> {
    pub physics: &'a mut dyn PhysicsBackend,
    pub resources: &'a ResourceStore,
}

/// Read-only services for the resurrect pass; nothing here can create
/// nodes or bodies.
pub struct ResurrectContext<'a> {
    pub physics: &'a dyn PhysicsBackend,
    pub resources: &'a ResourceStore,
}
