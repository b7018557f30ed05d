use bytemuck::{Pod, Zeroable};
use glam::{Affine2, Vec2};

use crate::context::{FrameContext, LifecycleContext, ResurrectContext};
use crate::field::{FieldDesc, InlineName};
use crate::node_fields;
use crate::registry::NodeKind;
use crate::render::{DrawCommand, DrawSink};
use crate::resource::{ResourceId, ResourceKind, ResourceStore};
use crate::storage::NodeRun;
use crate::world::NodeHandle;

/// A model drawn at a routed transform.
///
/// A zero `scale` draws at unit scale and a fully transparent `color`
/// falls back to the model's own color.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ModelEntity {
    pub model: InlineName,
    pub position: Vec2,
    pub angle: f32,
    pub scale: f32,
    pub color: [f32; 4],
    pub layer: i32,
    pub model_res: u32,
}

impl ModelEntity {
    fn resolve(&mut self, resources: &ResourceStore) {
        self.model_res = resources
            .resource_by_name(ResourceKind::Model, self.model.as_str())
            .raw();
    }
}

impl NodeKind for ModelEntity {
    const NAME: &'static str = "model_entity";

    fn fields() -> Vec<FieldDesc> {
        node_fields!(ModelEntity {
            model,
            position,
            angle,
            scale,
            color,
            layer,
            model_res,
        })
    }

    fn update(_run: NodeRun<'_, Self>, _ctx: &mut FrameContext<'_>) {}

    fn on_allocate(&mut self, ctx: &mut LifecycleContext<'_>) -> Option<u32> {
        self.resolve(ctx.resources);
        None
    }

    fn resurrect(&mut self, ctx: &ResurrectContext<'_>) -> Option<u32> {
        self.resolve(ctx.resources);
        None
    }

    fn draw(&self, node: NodeHandle, resources: &ResourceStore, sink: &mut dyn DrawSink) {
        let id = ResourceId::from_raw(self.model_res);
        let model = resources.model(id);
        let scale = if self.scale == 0.0 { 1.0 } else { self.scale };
        let color = if self.color[3] == 0.0 {
            model.color
        } else {
            self.color
        };
        sink.submit(DrawCommand {
            node,
            model: id,
            transform: Affine2::from_scale_angle_translation(
                Vec2::splat(scale),
                self.angle,
                self.position,
            ),
            half_extents: model.half_extents,
            color,
            layer: self.layer,
        });
    }
}
