//! Read-only resources consumed by node kinds.
//!
//! [`ResourceStore`] is a cheap, cloneable handle over shared tables so the
//! loader that performs a data reload and the simulation see the same
//! state. Lookups by name never fail: an unknown name resolves to the
//! per-kind missing sentinel stored at id 0.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec2;
use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::group::NodeGroupDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Model,
    Clip,
}

/// Index into one kind's resource table. Ids are only valid until the next
/// [`ResourceStore::reload`]; nodes keep names and re-resolve ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourceId(u32);

impl ResourceId {
    pub const MISSING: Self = Self(0);

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_missing(self) -> bool {
        self == Self::MISSING
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResource {
    pub name: String,
    pub half_extents: Vec2,
    pub color: [f32; 4],
}

impl ModelResource {
    fn missing() -> Self {
        Self {
            name: "<missing>".to_string(),
            half_extents: Vec2::splat(0.5),
            color: [1.0, 0.0, 1.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipResource {
    pub name: String,
    /// Length of the clip in seconds.
    pub duration: f32,
    pub frame_count: u32,
}

impl ClipResource {
    fn missing() -> Self {
        Self {
            name: "<missing>".to_string(),
            duration: 1.0,
            frame_count: 1,
        }
    }
}

#[derive(Debug)]
struct Table<R> {
    entries: Vec<Arc<R>>,
    by_name: HashMap<String, ResourceId>,
}

impl<R> Table<R> {
    fn with_sentinel(missing: R) -> Self {
        Self {
            entries: vec![Arc::new(missing)],
            by_name: HashMap::new(),
        }
    }

    fn insert(&mut self, name: String, resource: R) -> ResourceId {
        if let Some(&id) = self.by_name.get(&name) {
            self.entries[id.0 as usize] = Arc::new(resource);
            return id;
        }
        let id = ResourceId(self.entries.len() as u32);
        self.entries.push(Arc::new(resource));
        self.by_name.insert(name, id);
        id
    }

    fn get(&self, id: ResourceId) -> Arc<R> {
        let entry = self
            .entries
            .get(id.0 as usize)
            .unwrap_or(&self.entries[ResourceId::MISSING.0 as usize]);
        Arc::clone(entry)
    }

    fn len(&self) -> usize {
        self.entries.len() - 1
    }
}

#[derive(Debug)]
struct Tables {
    models: Table<ModelResource>,
    clips: Table<ClipResource>,
    groups: HashMap<String, Arc<NodeGroupDef>>,
    generation: u64,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            models: Table::with_sentinel(ModelResource::missing()),
            clips: Table::with_sentinel(ClipResource::missing()),
            groups: HashMap::new(),
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
    inner: Arc<RwLock<Tables>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model, replacing any model with the same name in place.
    pub fn insert_model(&self, model: ModelResource) -> ResourceId {
        self.inner.write().models.insert(model.name.clone(), model)
    }

    pub fn insert_clip(&self, clip: ClipResource) -> ResourceId {
        self.inner.write().clips.insert(clip.name.clone(), clip)
    }

    pub fn insert_group(&self, group: NodeGroupDef) -> Arc<NodeGroupDef> {
        let group = Arc::new(group);
        self.inner
            .write()
            .groups
            .insert(group.name().to_string(), Arc::clone(&group));
        group
    }

    /// Resolves a name to an id, falling back to the missing sentinel.
    pub fn resource_by_name(&self, kind: ResourceKind, name: &str) -> ResourceId {
        let tables = self.inner.read();
        let found = match kind {
            ResourceKind::Model => tables.models.by_name.get(name),
            ResourceKind::Clip => tables.clips.by_name.get(name),
        };
        match found {
            Some(&id) => id,
            None => {
                warn!("{kind:?} resource `{name}` not found; using placeholder");
                ResourceId::MISSING
            }
        }
    }

    pub fn model(&self, id: ResourceId) -> Arc<ModelResource> {
        self.inner.read().models.get(id)
    }

    pub fn clip(&self, id: ResourceId) -> Arc<ClipResource> {
        self.inner.read().clips.get(id)
    }

    pub fn group(&self, name: &str) -> Option<Arc<NodeGroupDef>> {
        self.inner.read().groups.get(name).cloned()
    }

    pub fn model_count(&self) -> usize {
        self.inner.read().models.len()
    }

    pub fn clip_count(&self) -> usize {
        self.inner.read().clips.len()
    }

    pub fn group_count(&self) -> usize {
        self.inner.read().groups.len()
    }

    /// Number of reloads performed so far.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Rebuilds the model and clip tables from scratch. Ids handed out
    /// before the reload must be re-resolved by name. Group definitions
    /// are kept.
    pub fn reload(&self, models: Vec<ModelResource>, clips: Vec<ClipResource>) {
        let mut tables = self.inner.write();
        let mut fresh_models = Table::with_sentinel(ModelResource::missing());
        for model in models {
            fresh_models.insert(model.name.clone(), model);
        }
        let mut fresh_clips = Table::with_sentinel(ClipResource::missing());
        for clip in clips {
            fresh_clips.insert(clip.name.clone(), clip);
        }
        tables.models = fresh_models;
        tables.clips = fresh_clips;
        tables.generation += 1;
        info!(
            "resources reloaded (generation {}, {} models, {} clips)",
            tables.generation,
            tables.models.len(),
            tables.clips.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(name: &str, duration: f32) -> ClipResource {
        ClipResource {
            name: name.to_string(),
            duration,
            frame_count: 4,
        }
    }

    #[test]
    fn missing_names_resolve_to_a_real_placeholder() {
        let store = ResourceStore::new();
        let id = store.resource_by_name(ResourceKind::Clip, "nope");
        assert!(id.is_missing());
        let placeholder = store.clip(id);
        assert_eq!(placeholder.name, "<missing>");
        assert!(placeholder.duration > 0.0);
        assert_eq!(store.model(ResourceId::from_raw(99)).name, "<missing>");
    }

    #[test]
    fn clones_share_tables() {
        let store = ResourceStore::new();
        let view = store.clone();
        let id = store.insert_clip(clip("walk", 0.5));
        assert_eq!(view.resource_by_name(ResourceKind::Clip, "walk"), id);
        assert_eq!(view.clip(id).duration, 0.5);
    }

    #[test]
    fn reinserting_keeps_the_id() {
        let store = ResourceStore::new();
        let first = store.insert_clip(clip("walk", 0.5));
        let second = store.insert_clip(clip("walk", 2.0));
        assert_eq!(first, second);
        assert_eq!(store.clip(first).duration, 2.0);
        assert_eq!(store.clip_count(), 1);
    }

    #[test]
    fn reload_reassigns_ids() {
        let store = ResourceStore::new();
        store.insert_clip(clip("idle", 1.0));
        let walk = store.insert_clip(clip("walk", 0.5));
        store.reload(Vec::new(), vec![clip("walk", 0.25)]);
        let fresh = store.resource_by_name(ResourceKind::Clip, "walk");
        assert_ne!(fresh, walk);
        assert_eq!(store.clip(fresh).duration, 0.25);
        assert!(store.resource_by_name(ResourceKind::Clip, "idle").is_missing());
        assert_eq!(store.generation(), 1);
    }
}
