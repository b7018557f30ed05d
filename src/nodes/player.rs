use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::context::FrameContext;
use crate::field::FieldDesc;
use crate::node_fields;
use crate::registry::NodeKind;
use crate::storage::NodeRun;

/// Turns the movement keys into a force, usually routed into a body.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PlayerCharacter {
    pub speed: f32,
    pub position: Vec2,
    pub move_force: Vec2,
    pub facing: Vec2,
}

impl NodeKind for PlayerCharacter {
    const NAME: &'static str = "player_character";

    fn fields() -> Vec<FieldDesc> {
        node_fields!(PlayerCharacter {
            speed,
            position,
            move_force,
            facing,
        })
    }

    fn update(mut run: NodeRun<'_, Self>, ctx: &mut FrameContext<'_>) {
        let direction = ctx.input.move_axis().normalize_or_zero();
        for node in run.nodes_mut() {
            node.move_force = direction * node.speed;
            if direction != Vec2::ZERO {
                node.facing = direction;
            }
        }
    }
}
