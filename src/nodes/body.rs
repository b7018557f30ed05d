use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::context::{FrameContext, LifecycleContext, ResurrectContext};
use crate::field::FieldDesc;
use crate::node_fields;
use crate::physics::{BodyDesc, BodyRef, PhysicsBackend};
use crate::registry::NodeKind;
use crate::storage::NodeRun;

/// Disc simulated by the physics backend.
///
/// `force` is an input, applied every frame until overwritten. `position`,
/// `velocity` and `angle` are read back from the backend after each
/// update and are the fields other nodes usually route from. `body` caches
/// the backend id and is rebuilt when the backend no longer knows it.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RigidBody {
    pub radius: f32,
    pub mass: f32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
    pub force: Vec2,
    pub body: u32,
}

impl RigidBody {
    fn body_ref(&self) -> Option<BodyRef> {
        BodyRef::from_raw(self.body)
    }

    fn create_body(&mut self, physics: &mut dyn PhysicsBackend) -> BodyRef {
        let body = physics.create_body(&BodyDesc {
            position: self.position,
            angle: self.angle,
            radius: self.radius,
            mass: self.mass,
        });
        if self.velocity != Vec2::ZERO {
            physics.apply_impulse(body, self.velocity * self.mass, self.position);
        }
        self.body = body.raw();
        body
    }
}

impl NodeKind for RigidBody {
    const NAME: &'static str = "rigid_body";

    fn fields() -> Vec<FieldDesc> {
        node_fields!(RigidBody {
            radius,
            mass,
            position,
            velocity,
            angle,
            force,
            body,
        })
    }

    fn update(mut run: NodeRun<'_, Self>, ctx: &mut FrameContext<'_>) {
        for node in run.nodes_mut() {
            let body = match node.body_ref() {
                Some(body) if ctx.physics.contains(body) => body,
                _ => node.create_body(ctx.physics),
            };
            if node.force != Vec2::ZERO {
                ctx.physics.apply_force(body, node.force, node.position);
            }
            if let Some(state) = ctx.physics.body_state(body) {
                node.position = state.position;
                node.velocity = state.velocity;
                node.angle = state.angle;
            }
        }
    }

    fn on_allocate(&mut self, ctx: &mut LifecycleContext<'_>) -> Option<u32> {
        Some(self.create_body(ctx.physics).raw())
    }

    fn on_free(&mut self, ctx: &mut LifecycleContext<'_>) {
        if let Some(body) = self.body_ref() {
            ctx.physics.free_body(body);
        }
    }

    fn resurrect(&mut self, ctx: &ResurrectContext<'_>) -> Option<u32> {
        match self.body_ref() {
            Some(body) if ctx.physics.contains(body) => Some(body.raw()),
            _ => {
                self.body = BodyRef::NONE_RAW;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Env;
    use crate::physics::PointMassPhysics;
    use crate::resource::ResourceStore;

    fn disc() -> RigidBody {
        RigidBody {
            radius: 0.5,
            mass: 2.0,
            position: Vec2::new(1.0, 0.0),
            body: BodyRef::NONE_RAW,
            ..RigidBody::zeroed()
        }
    }

    #[test]
    fn allocation_creates_and_free_releases_the_body() {
        let mut env = Env::headless();
        let mut node = disc();
        let external = node.on_allocate(&mut env.lifecycle());
        assert_eq!(external, Some(node.body));
        assert_eq!(env.physics.body_count(), 1);
        node.on_free(&mut env.lifecycle());
        assert_eq!(env.physics.body_count(), 0);
    }

    #[test]
    fn resurrect_drops_bodies_the_backend_forgot() {
        let mut env = Env::headless();
        let mut node = disc();
        node.on_allocate(&mut env.lifecycle());
        assert_eq!(node.resurrect(&env.resurrection()), Some(node.body));

        let fresh = Env::new(Box::new(PointMassPhysics::new()), ResourceStore::new());
        assert_eq!(node.resurrect(&fresh.resurrection()), None);
        assert_eq!(node.body, BodyRef::NONE_RAW);
        assert_eq!(node.resurrect(&fresh.resurrection()), None);
    }
}
