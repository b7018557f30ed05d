//! Body-simulation collaborator.
//!
//! The node framework never integrates anything itself; rigid body nodes
//! talk to a [`PhysicsBackend`]. [`PointMassPhysics`] is a small
//! deterministic backend used by headless runs and tests.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Opaque id of a body owned by the physics backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyRef(pub u32);

impl BodyRef {
    /// Raw value stored in node fields when no body is attached.
    pub const NONE_RAW: u32 = u32::MAX;

    pub fn from_raw(raw: u32) -> Option<Self> {
        (raw != Self::NONE_RAW).then_some(Self(raw))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Parameters of a single circular body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyDesc {
    pub position: Vec2,
    pub angle: f32,
    pub radius: f32,
    /// Zero mass makes the body static.
    pub mass: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
    pub angular_velocity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    pub body: BodyRef,
    /// Closest point of the segment to the body centre.
    pub point: Vec2,
    /// Position of `point` along the segment, 0 at `a` and 1 at `b`.
    pub fraction: f32,
}

pub trait PhysicsBackend {
    fn create_body(&mut self, desc: &BodyDesc) -> BodyRef;

    /// Returns `false` if the body does not exist.
    fn free_body(&mut self, body: BodyRef) -> bool;

    fn step(&mut self, dt: f32);

    /// Reports every body touched by the segment `a..b` swept with `radius`,
    /// nearest first.
    fn segment_query(&self, a: Vec2, b: Vec2, radius: f32, visit: &mut dyn FnMut(SegmentHit));

    /// Accumulates a force applied at a world-space point until the next step.
    fn apply_force(&mut self, body: BodyRef, force: Vec2, point: Vec2);

    fn apply_impulse(&mut self, body: BodyRef, impulse: Vec2, point: Vec2);

    fn body_state(&self, body: BodyRef) -> Option<BodyState>;

    fn contains(&self, body: BodyRef) -> bool {
        self.body_state(body).is_some()
    }

    fn body_count(&self) -> usize;
}

#[derive(Debug, Clone)]
struct PointBody {
    state: BodyState,
    radius: f32,
    inv_mass: f32,
    inv_inertia: f32,
    force: Vec2,
    torque: f32,
}

/// Explicit Euler integration of discs without collision response.
#[derive(Debug, Default)]
pub struct PointMassPhysics {
    bodies: Vec<Option<PointBody>>,
    gravity: Vec2,
}

impl PointMassPhysics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gravity(gravity: Vec2) -> Self {
        Self {
            bodies: Vec::new(),
            gravity,
        }
    }

    fn body(&self, body: BodyRef) -> Option<&PointBody> {
        self.bodies.get(body.0 as usize).and_then(Option::as_ref)
    }

    fn body_mut(&mut self, body: BodyRef) -> Option<&mut PointBody> {
        self.bodies.get_mut(body.0 as usize).and_then(Option::as_mut)
    }
}

impl PhysicsBackend for PointMassPhysics {
    fn create_body(&mut self, desc: &BodyDesc) -> BodyRef {
        let (inv_mass, inv_inertia) = if desc.mass > 0.0 {
            let inertia = 0.5 * desc.mass * desc.radius * desc.radius;
            let inv_inertia = if inertia > 0.0 { 1.0 / inertia } else { 0.0 };
            (1.0 / desc.mass, inv_inertia)
        } else {
            (0.0, 0.0)
        };
        let body = PointBody {
            state: BodyState {
                position: desc.position,
                angle: desc.angle,
                ..BodyState::default()
            },
            radius: desc.radius.max(0.0),
            inv_mass,
            inv_inertia,
            force: Vec2::ZERO,
            torque: 0.0,
        };
        let index = match self.bodies.iter().position(Option::is_none) {
            Some(index) => {
                self.bodies[index] = Some(body);
                index
            }
            None => {
                self.bodies.push(Some(body));
                self.bodies.len() - 1
            }
        };
        BodyRef(index as u32)
    }

    fn free_body(&mut self, body: BodyRef) -> bool {
        match self.bodies.get_mut(body.0 as usize) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    fn step(&mut self, dt: f32) {
        let gravity = self.gravity;
        for body in self.bodies.iter_mut().flatten() {
            if body.inv_mass > 0.0 {
                let acceleration = body.force * body.inv_mass + gravity;
                body.state.velocity += acceleration * dt;
                body.state.angular_velocity += body.torque * body.inv_inertia * dt;
            }
            body.state.position += body.state.velocity * dt;
            body.state.angle += body.state.angular_velocity * dt;
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    fn segment_query(&self, a: Vec2, b: Vec2, radius: f32, visit: &mut dyn FnMut(SegmentHit)) {
        let segment = b - a;
        let length_squared = segment.length_squared();
        let mut hits: Vec<SegmentHit> = self
            .bodies
            .iter()
            .enumerate()
            .filter_map(|(index, body)| {
                let body = body.as_ref()?;
                let centre = body.state.position;
                let fraction = if length_squared > f32::EPSILON {
                    ((centre - a).dot(segment) / length_squared).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let point = a + segment * fraction;
                (point.distance(centre) <= body.radius + radius).then_some(SegmentHit {
                    body: BodyRef(index as u32),
                    point,
                    fraction,
                })
            })
            .collect();
        hits.sort_by(|l, r| l.fraction.total_cmp(&r.fraction));
        for hit in hits {
            visit(hit);
        }
    }

    fn apply_force(&mut self, body: BodyRef, force: Vec2, point: Vec2) {
        if let Some(body) = self.body_mut(body) {
            let arm = point - body.state.position;
            body.force += force;
            body.torque += arm.perp_dot(force);
        }
    }

    fn apply_impulse(&mut self, body: BodyRef, impulse: Vec2, point: Vec2) {
        if let Some(body) = self.body_mut(body) {
            let arm = point - body.state.position;
            body.state.velocity += impulse * body.inv_mass;
            body.state.angular_velocity += arm.perp_dot(impulse) * body.inv_inertia;
        }
    }

    fn body_state(&self, body: BodyRef) -> Option<BodyState> {
        self.body(body).map(|body| body.state)
    }

    fn body_count(&self) -> usize {
        self.bodies.iter().flatten().count()
    }
}
