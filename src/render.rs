//! Output side of the frame: draw commands handed to a renderer or editor.

use glam::{Affine2, Vec2};

use crate::resource::ResourceId;
use crate::world::NodeHandle;

/// One model instance to draw this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCommand {
    pub node: NodeHandle,
    pub model: ResourceId,
    pub transform: Affine2,
    pub half_extents: Vec2,
    pub color: [f32; 4],
    pub layer: i32,
}

impl DrawCommand {
    /// Whether a world-space point falls inside the command's quad.
    pub fn contains(&self, point: Vec2) -> bool {
        let local = self.transform.inverse().transform_point2(point);
        local.x.abs() <= self.half_extents.x && local.y.abs() <= self.half_extents.y
    }
}

pub trait DrawSink {
    fn submit(&mut self, command: DrawCommand);
}

/// Collects the commands of one frame.
#[derive(Debug, Default)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Orders commands back to front. Submission order breaks ties.
    pub fn sort_by_layer(&mut self) {
        self.commands.sort_by_key(|command| command.layer);
    }

    /// Editor pick query: the front-most node whose quad covers `point`.
    pub fn entity_at(&self, point: Vec2) -> Option<NodeHandle> {
        let mut best: Option<&DrawCommand> = None;
        for command in self.commands.iter().filter(|c| c.contains(point)) {
            if best.map_or(true, |b| command.layer >= b.layer) {
                best = Some(command);
            }
        }
        best.map(|command| command.node)
    }
}

impl DrawSink for DrawList {
    fn submit(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }
}
