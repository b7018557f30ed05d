use bytemuck::{Pod, Zeroable};

use crate::context::{FrameContext, LifecycleContext, ResurrectContext};
use crate::field::{FieldDesc, InlineName};
use crate::node_fields;
use crate::registry::NodeKind;
use crate::resource::{ClipResource, ResourceId, ResourceKind, ResourceStore};
use crate::storage::NodeRun;

/// Playback state of one animation clip.
///
/// Flags are stored as `0`/`1` words. A one-shot clip with
/// `remove_on_finish` set tears its whole group down once it ends.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ClipInstance {
    pub clip: InlineName,
    pub speed: f32,
    pub looping: u32,
    pub remove_on_finish: u32,
    pub time: f32,
    pub frame: u32,
    pub finished: u32,
    pub clip_res: u32,
}

impl ClipInstance {
    fn resolve(&mut self, resources: &ResourceStore) {
        self.clip_res = resources
            .resource_by_name(ResourceKind::Clip, self.clip.as_str())
            .raw();
    }

    /// Advances playback. Returns `true` on the frame a one-shot clip ends.
    fn advance(&mut self, clip: &ClipResource, dt: f32) -> bool {
        if self.finished != 0 {
            return false;
        }
        self.time += dt * self.speed;
        let mut ended = false;
        if clip.duration <= 0.0 {
            self.time = 0.0;
        } else if self.time >= clip.duration {
            if self.looping != 0 {
                self.time %= clip.duration;
            } else {
                self.time = clip.duration;
                self.finished = 1;
                ended = true;
            }
        }
        self.frame = if clip.duration > 0.0 && clip.frame_count > 0 {
            let frame = (self.time / clip.duration * clip.frame_count as f32) as u32;
            frame.min(clip.frame_count - 1)
        } else {
            0
        };
        ended
    }
}

impl NodeKind for ClipInstance {
    const NAME: &'static str = "clip_instance";

    fn fields() -> Vec<FieldDesc> {
        node_fields!(ClipInstance {
            clip,
            speed,
            looping,
            remove_on_finish,
            time,
            frame,
            finished,
            clip_res,
        })
    }

    fn update(mut run: NodeRun<'_, Self>, ctx: &mut FrameContext<'_>) {
        for (owner, node) in run.iter_mut() {
            let clip = ctx.resources.clip(ResourceId::from_raw(node.clip_res));
            if node.advance(&clip, ctx.dt) && node.remove_on_finish != 0 {
                ctx.request_group_removal(owner);
            }
        }
    }

    fn on_allocate(&mut self, ctx: &mut LifecycleContext<'_>) -> Option<u32> {
        self.resolve(ctx.resources);
        None
    }

    fn resurrect(&mut self, ctx: &ResurrectContext<'_>) -> Option<u32> {
        self.resolve(ctx.resources);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> ClipResource {
        ClipResource {
            name: "walk".to_string(),
            duration: 1.0,
            frame_count: 4,
        }
    }

    fn instance(looping: u32) -> ClipInstance {
        ClipInstance {
            clip: InlineName::new("walk"),
            speed: 1.0,
            looping,
            ..ClipInstance::zeroed()
        }
    }

    #[test]
    fn looping_clips_wrap() {
        let mut node = instance(1);
        assert!(!node.advance(&clip(), 0.6));
        assert_eq!(node.frame, 2);
        assert!(!node.advance(&clip(), 0.6));
        assert!((node.time - 0.2).abs() < 1e-5);
        assert_eq!(node.frame, 0);
        assert_eq!(node.finished, 0);
    }

    #[test]
    fn one_shot_clips_end_once() {
        let mut node = instance(0);
        assert!(node.advance(&clip(), 1.5));
        assert_eq!((node.time, node.frame, node.finished), (1.0, 3, 1));
        assert!(!node.advance(&clip(), 1.0));
    }
}
