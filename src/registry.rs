//! Node kinds and the registry that owns their storage.
//!
//! A node kind is a plain-old-data struct implementing [`NodeKind`]. The
//! registry keeps one fixed-capacity pool per kind behind a type-erased
//! interface so the world can allocate, update, route and resurrect nodes
//! without knowing their concrete types.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use bytemuck::Pod;
use log::info;

use crate::context::{FrameContext, LifecycleContext, ResurrectContext};
use crate::error::{NodeError, NodeResult};
use crate::field::FieldDesc;
use crate::render::DrawSink;
use crate::resource::ResourceStore;
use crate::storage::{ImplHandle, NodeRun, NodeStorage};
use crate::world::NodeHandle;

/// Behaviour of one registered node kind.
///
/// `update` is called zero or more times per frame, once for every
/// contiguous run of allocated instances; it must not assume it sees every
/// live instance in a single call.
pub trait NodeKind: Pod + fmt::Debug {
    /// Unique registry key, also used by group definitions and snapshots.
    const NAME: &'static str;

    /// Fields that slot values and routes may address.
    fn fields() -> Vec<FieldDesc>;

    fn update(run: NodeRun<'_, Self>, ctx: &mut FrameContext<'_>);

    /// Runs right after the node's initial values are stored. The returned
    /// value is recorded as the node's external handle.
    fn on_allocate(&mut self, _ctx: &mut LifecycleContext<'_>) -> Option<u32> {
        None
    }

    /// Runs right before the slot is zeroed and released.
    fn on_free(&mut self, _ctx: &mut LifecycleContext<'_>) {}

    /// Re-derives cached references from stable fields after a reload.
    /// Must be idempotent and touch nothing but `self`.
    fn resurrect(&mut self, _ctx: &ResurrectContext<'_>) -> Option<u32> {
        None
    }

    fn draw(&self, _node: NodeHandle, _resources: &ResourceStore, _sink: &mut dyn DrawSink) {}
}

/// Position of a kind in registration order.
pub type NodeTypeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct NodeTypeDescriptor {
    pub name: &'static str,
    pub element_size: usize,
    pub capacity: usize,
    pub fields: Vec<FieldDesc>,
}

impl NodeTypeDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDesc> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn require_field(&self, name: &str) -> NodeResult<&FieldDesc> {
        self.field(name).ok_or_else(|| NodeError::UnknownField {
            type_name: self.name.to_string(),
            field: name.to_string(),
        })
    }
}

/// Type-erased view of one kind's storage.
pub(crate) trait NodePool {
    fn descriptor(&self) -> &NodeTypeDescriptor;
    fn live(&self) -> usize;
    fn allocate(
        &mut self,
        blob: &[u8],
        owner: NodeHandle,
        ctx: &mut LifecycleContext<'_>,
    ) -> NodeResult<(ImplHandle, Option<u32>)>;
    fn free(&mut self, index: ImplHandle, ctx: &mut LifecycleContext<'_>) -> bool;
    fn update(&mut self, ctx: &mut FrameContext<'_>) -> usize;
    fn draw(&self, resources: &ResourceStore, sink: &mut dyn DrawSink);
    fn resurrect(&mut self, index: ImplHandle, ctx: &ResurrectContext<'_>) -> Option<Option<u32>>;
    fn slot_bytes(&self, index: ImplHandle) -> Option<&[u8]>;
    fn slot_bytes_mut(&mut self, index: ImplHandle) -> Option<&mut [u8]>;
    fn restore(&mut self, index: ImplHandle, bytes: &[u8], owner: NodeHandle) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedPool<T> {
    descriptor: NodeTypeDescriptor,
    storage: NodeStorage<T>,
}

impl<T: NodeKind> NodePool for TypedPool<T> {
    fn descriptor(&self) -> &NodeTypeDescriptor {
        &self.descriptor
    }

    fn live(&self) -> usize {
        self.storage.len()
    }

    fn allocate(
        &mut self,
        blob: &[u8],
        owner: NodeHandle,
        ctx: &mut LifecycleContext<'_>,
    ) -> NodeResult<(ImplHandle, Option<u32>)> {
        if blob.len() != self.descriptor.element_size {
            return Err(NodeError::LayoutMismatch {
                type_name: T::NAME.to_string(),
                expected: blob.len(),
                found: self.descriptor.element_size,
            });
        }
        let value: T = bytemuck::pod_read_unaligned(blob);
        let index = self.storage.allocate(value, Some(owner)).ok_or_else(|| {
            NodeError::CapacityExhausted {
                type_name: T::NAME.to_string(),
                capacity: self.storage.capacity(),
            }
        })?;
        let external = self
            .storage
            .get_mut(index)
            .and_then(|node| node.on_allocate(ctx));
        Ok((index, external))
    }

    fn free(&mut self, index: ImplHandle, ctx: &mut LifecycleContext<'_>) -> bool {
        match self.storage.get_mut(index) {
            Some(node) => node.on_free(ctx),
            None => return false,
        }
        self.storage.free(index)
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> usize {
        let mut runs = 0;
        let mut from = 0;
        while let Some(range) = self.storage.next_run(from) {
            from = range.end;
            T::update(self.storage.run_mut(range), ctx);
            runs += 1;
        }
        runs
    }

    fn draw(&self, resources: &ResourceStore, sink: &mut dyn DrawSink) {
        for (owner, node) in self.storage.iter_owned() {
            node.draw(owner, resources, sink);
        }
    }

    fn resurrect(&mut self, index: ImplHandle, ctx: &ResurrectContext<'_>) -> Option<Option<u32>> {
        self.storage.get_mut(index).map(|node| node.resurrect(ctx))
    }

    fn slot_bytes(&self, index: ImplHandle) -> Option<&[u8]> {
        self.storage.bytes(index)
    }

    fn slot_bytes_mut(&mut self, index: ImplHandle) -> Option<&mut [u8]> {
        self.storage.bytes_mut(index)
    }

    fn restore(&mut self, index: ImplHandle, bytes: &[u8], owner: NodeHandle) -> bool {
        if bytes.len() != self.descriptor.element_size {
            return false;
        }
        let value: T = bytemuck::pod_read_unaligned(bytes);
        self.storage.restore(index, value, Some(owner))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Registered node kinds, in registration order, plus the order in which
/// they are updated each frame.
#[derive(Default)]
pub struct NodeTypeRegistry {
    pools: Vec<Box<dyn NodePool>>,
    by_name: HashMap<&'static str, NodeTypeId>,
    update_order: Vec<NodeTypeId>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` with room for `capacity` instances. Each name may be
    /// registered once.
    pub fn register<T: NodeKind>(&mut self, capacity: usize) -> NodeResult<NodeTypeId> {
        if self.by_name.contains_key(T::NAME) {
            return Err(NodeError::DuplicateType(T::NAME.to_string()));
        }
        let element_size = std::mem::size_of::<T>();
        let fields = T::fields();
        for field in &fields {
            assert!(
                field.range().end <= element_size,
                "field `{}.{}` lies outside the node",
                T::NAME,
                field.name
            );
        }
        let id = self.pools.len();
        self.pools.push(Box::new(TypedPool::<T> {
            descriptor: NodeTypeDescriptor {
                name: T::NAME,
                element_size,
                capacity,
                fields,
            },
            storage: NodeStorage::with_capacity(capacity),
        }));
        self.by_name.insert(T::NAME, id);
        self.update_order.push(id);
        info!("registered node type `{}` ({element_size} bytes x {capacity})", T::NAME);
        Ok(id)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: NodeKind>(mut self, capacity: usize) -> NodeResult<Self> {
        self.register::<T>(capacity)?;
        Ok(self)
    }

    pub fn lookup(&self, name: &str) -> NodeResult<&NodeTypeDescriptor> {
        self.id_of(name).map(|id| self.descriptor(id))
    }

    pub fn id_of(&self, name: &str) -> NodeResult<NodeTypeId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| NodeError::UnknownType(name.to_string()))
    }

    /// Panics if `id` was not handed out by this registry.
    pub fn descriptor(&self, id: NodeTypeId) -> &NodeTypeDescriptor {
        self.pools[id].descriptor()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Live instances of the kind.
    pub fn live(&self, id: NodeTypeId) -> usize {
        self.pools[id].live()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.pools.iter().map(|pool| pool.descriptor().name)
    }

    pub fn update_order(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.update_order
            .iter()
            .map(|&id| self.pools[id].descriptor().name)
    }

    /// Replaces the update order. `names` must list every registered kind
    /// exactly once.
    pub fn set_update_order(&mut self, names: &[&str]) -> NodeResult<()> {
        if names.len() != self.pools.len() {
            return Err(NodeError::UpdateOrder(format!(
                "{} types listed, {} registered",
                names.len(),
                self.pools.len()
            )));
        }
        let mut order = Vec::with_capacity(names.len());
        for name in names {
            let id = self.id_of(name)?;
            if order.contains(&id) {
                return Err(NodeError::UpdateOrder(format!("`{name}` listed twice")));
            }
            order.push(id);
        }
        self.update_order = order;
        Ok(())
    }

    /// Typed read access to a kind's storage.
    pub fn storage<T: NodeKind>(&self) -> Option<&NodeStorage<T>> {
        let id = self.by_name.get(T::NAME)?;
        self.pools[*id]
            .as_any()
            .downcast_ref::<TypedPool<T>>()
            .map(|pool| &pool.storage)
    }

    pub(crate) fn storage_mut<T: NodeKind>(&mut self) -> Option<&mut NodeStorage<T>> {
        let id = *self.by_name.get(T::NAME)?;
        self.pools[id]
            .as_any_mut()
            .downcast_mut::<TypedPool<T>>()
            .map(|pool| &mut pool.storage)
    }

    pub(crate) fn pool(&self, id: NodeTypeId) -> &dyn NodePool {
        self.pools[id].as_ref()
    }

    pub(crate) fn pool_mut(&mut self, id: NodeTypeId) -> &mut dyn NodePool {
        self.pools[id].as_mut()
    }

    /// Runs every kind's update hook in update order.
    pub(crate) fn update_all(&mut self, ctx: &mut FrameContext<'_>) {
        for &id in &self.update_order {
            self.pools[id].update(ctx);
        }
    }

    pub(crate) fn draw_all(&self, resources: &ResourceStore, sink: &mut dyn DrawSink) {
        for &id in &self.update_order {
            self.pools[id].draw(resources, sink);
        }
    }
}

impl fmt::Debug for NodeTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTypeRegistry")
            .field("types", &self.type_names().collect::<Vec<_>>())
            .field("update_order", &self.update_order().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::Zeroable;

    use super::*;
    use crate::context::Env;
    use crate::node_fields;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Pod, Zeroable)]
    struct Counter {
        ticks: u32,
    }

    impl NodeKind for Counter {
        const NAME: &'static str = "counter";

        fn fields() -> Vec<FieldDesc> {
            node_fields!(Counter { ticks })
        }

        fn update(mut run: NodeRun<'_, Self>, _ctx: &mut FrameContext<'_>) {
            for node in run.nodes_mut() {
                node.ticks += 1;
            }
        }
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Pod, Zeroable)]
    struct Marker {
        value: f32,
    }

    impl NodeKind for Marker {
        const NAME: &'static str = "marker";

        fn fields() -> Vec<FieldDesc> {
            node_fields!(Marker { value })
        }

        fn update(_run: NodeRun<'_, Self>, _ctx: &mut FrameContext<'_>) {}
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = NodeTypeRegistry::new();
        registry.register::<Counter>(4).unwrap();
        assert_eq!(
            registry.register::<Counter>(8),
            Err(NodeError::DuplicateType("counter".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_reports_unknown_names() {
        let registry = NodeTypeRegistry::new().with::<Counter>(4).unwrap();
        let descriptor = registry.lookup("counter").unwrap();
        assert_eq!(descriptor.element_size, 4);
        assert_eq!(descriptor.capacity, 4);
        assert!(descriptor.field("ticks").is_some());
        assert_eq!(
            registry.lookup("ghost").unwrap_err(),
            NodeError::UnknownType("ghost".to_string())
        );
    }

    #[test]
    fn update_order_must_be_a_permutation() {
        let mut registry = NodeTypeRegistry::new()
            .with::<Counter>(1)
            .unwrap()
            .with::<Marker>(1)
            .unwrap();
        assert_eq!(
            registry.update_order().collect::<Vec<_>>(),
            vec!["counter", "marker"]
        );
        assert!(registry.set_update_order(&["marker"]).is_err());
        assert!(registry.set_update_order(&["marker", "marker"]).is_err());
        assert!(registry.set_update_order(&["marker", "ghost"]).is_err());
        registry.set_update_order(&["marker", "counter"]).unwrap();
        assert_eq!(
            registry.update_order().collect::<Vec<_>>(),
            vec!["marker", "counter"]
        );
    }

    #[test]
    fn pool_updates_each_contiguous_run() {
        let mut registry = NodeTypeRegistry::new().with::<Counter>(5).unwrap();
        let mut env = Env::headless();
        let id = registry.id_of("counter").unwrap();
        let blob = [0u8; 4];
        for index in 0..4 {
            let owner = NodeHandle::new(index, 0);
            let mut lifecycle = env.lifecycle();
            registry
                .pool_mut(id)
                .allocate(&blob, owner, &mut lifecycle)
                .unwrap();
        }
        let mut lifecycle = env.lifecycle();
        assert!(registry.pool_mut(id).free(1, &mut lifecycle));
        assert!(!registry.pool_mut(id).free(1, &mut lifecycle));

        let mut removals = Vec::new();
        let mut ctx = FrameContext::new(0.0, 0.0, &mut env, &mut removals);
        assert_eq!(registry.pool_mut(id).update(&mut ctx), 2);

        let storage = registry.storage::<Counter>().unwrap();
        let ticks: Vec<u32> = storage.iter().map(|(_, node)| node.ticks).collect();
        assert_eq!(ticks, vec![1, 1, 1]);
    }

    #[test]
    fn exhausted_pool_reports_capacity() {
        let mut registry = NodeTypeRegistry::new().with::<Counter>(1).unwrap();
        let mut env = Env::headless();
        let mut lifecycle = env.lifecycle();
        let pool = registry.pool_mut(0);
        pool.allocate(&[0; 4], NodeHandle::new(0, 0), &mut lifecycle)
            .unwrap();
        assert_eq!(
            pool.allocate(&[0; 4], NodeHandle::new(1, 0), &mut lifecycle),
            Err(NodeError::CapacityExhausted {
                type_name: "counter".to_string(),
                capacity: 1
            })
        );
    }
}
