//! The world: global node index, group lifecycle and per-frame dispatch.
//!
//! Every node is reachable through a [`NodeHandle`] into the world's node
//! table. The table entry ([`NodeInfo`]) names the node's kind, its slot in
//! that kind's storage, the routes it feeds and the group it belongs to.
//! Groups are created from a [`NodeGroupDef`] and torn down as a whole.
//!
//! A frame is one call to [`World::step`]:
//! 1. advance time,
//! 2. step physics, then run every kind's update hook in update order,
//! 3. copy every route once,
//! 4. tear down groups whose members asked for it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::WorldConfig;
use crate::context::{Env, FrameContext, LifecycleContext};
use crate::error::{NodeError, NodeResult};
use crate::field::{FieldDesc, FieldType, SlotVal};
use crate::group::{NodeGroupDef, NodeGroupDesc};
use crate::registry::{NodeKind, NodeTypeId, NodeTypeRegistry};
use crate::render::DrawSink;
use crate::resource::ResourceStore;
use crate::storage::{scan_free, ImplHandle, NodeStorage};

/// Stable id of a node. The generation changes every time the table slot
/// is recycled, so stale handles are detected instead of aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

impl NodeHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Caller-chosen id shared by every node of one group instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Byte copy from a field of this node into a field of `dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRouting {
    pub src_offset: usize,
    pub size: usize,
    pub dst_offset: usize,
    pub dst: NodeHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub type_id: NodeTypeId,
    pub impl_handle: ImplHandle,
    pub routes: Vec<SlotRouting>,
    pub group: GroupId,
    /// Handle returned by the kind's allocate or resurrect hook, if any.
    pub external: Option<u32>,
}

#[derive(Debug)]
pub(crate) struct NodeTable {
    pub(crate) entries: Vec<Option<NodeInfo>>,
    pub(crate) generations: Vec<u32>,
    allocated: Vec<bool>,
    cursor: usize,
    live: usize,
}

impl NodeTable {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity],
            generations: vec![0; capacity],
            allocated: vec![false; capacity],
            cursor: 0,
            live: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn free_count(&self) -> usize {
        self.capacity() - self.live
    }

    fn reserve(&mut self, info: NodeInfo) -> Option<NodeHandle> {
        if self.capacity() == 0 {
            return None;
        }
        let index = scan_free(&self.allocated, self.cursor)?;
        self.allocated[index] = true;
        self.entries[index] = Some(info);
        self.cursor = (index + 1) % self.capacity();
        self.live += 1;
        Some(NodeHandle::new(index as u32, self.generations[index]))
    }

    /// Places `info` at exactly `handle`, used when restoring a snapshot.
    pub(crate) fn restore(&mut self, handle: NodeHandle, info: NodeInfo) -> bool {
        let index = handle.index as usize;
        if index >= self.capacity() || self.allocated[index] {
            return false;
        }
        self.allocated[index] = true;
        self.entries[index] = Some(info);
        self.generations[index] = handle.generation;
        self.live += 1;
        self.cursor = (index + 1) % self.capacity();
        true
    }

    fn slot(&self, handle: NodeHandle) -> Option<usize> {
        let index = handle.index as usize;
        (self.allocated.get(index).copied().unwrap_or(false)
            && self.generations[index] == handle.generation)
            .then_some(index)
    }

    pub(crate) fn get(&self, handle: NodeHandle) -> Option<&NodeInfo> {
        self.slot(handle).and_then(|index| self.entries[index].as_ref())
    }

    pub(crate) fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut NodeInfo> {
        self.slot(handle)
            .and_then(move |index| self.entries[index].as_mut())
    }

    fn release(&mut self, handle: NodeHandle) -> Option<NodeInfo> {
        let index = self.slot(handle)?;
        self.allocated[index] = false;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.live -= 1;
        self.entries[index].take()
    }

    /// Live entries in index order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (NodeHandle, &NodeInfo)> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry
                .as_ref()
                .map(|info| (NodeHandle::new(index as u32, self.generations[index]), info))
        })
    }
}

/// Owner of every node. Pass the same [`Env`] to every call.
#[derive(Debug)]
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) registry: NodeTypeRegistry,
    pub(crate) nodes: NodeTable,
    pub(crate) groups: BTreeMap<GroupId, Vec<NodeHandle>>,
    pub(crate) next_group: u32,
    pub(crate) time: f64,
    pub(crate) dt: f32,
    removals: Vec<NodeHandle>,
    scratch: Vec<u8>,
}

impl World {
    pub fn new(registry: NodeTypeRegistry, config: WorldConfig) -> Self {
        let nodes = NodeTable::new(config.max_nodes);
        Self {
            config,
            registry,
            nodes,
            groups: BTreeMap::new(),
            next_group: 0,
            time: 0.0,
            dt: 0.0,
            removals: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Delta time of the most recent frame.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.live
    }

    pub fn node_capacity(&self) -> usize {
        self.nodes.capacity()
    }

    pub fn set_update_order(&mut self, names: &[&str]) -> NodeResult<()> {
        self.registry.set_update_order(names)
    }

    /// Resolves a group description against this world's registry and
    /// route limit.
    pub fn resolve_group(&self, desc: &NodeGroupDesc) -> NodeResult<NodeGroupDef> {
        NodeGroupDef::resolve(desc, &self.registry, self.config.max_routes_per_node)
    }

    /// Lowest-numbered unused group id at or after the last one handed out.
    pub fn next_group_id(&mut self) -> GroupId {
        while self.groups.contains_key(&GroupId(self.next_group)) {
            self.next_group = self.next_group.wrapping_add(1);
        }
        let id = GroupId(self.next_group);
        self.next_group = self.next_group.wrapping_add(1);
        id
    }

    /// Instantiates `def` as group `group`. Returns the member handles in
    /// declaration order.
    ///
    /// Every check (free table entries, per-kind capacity, caller values)
    /// runs before anything is allocated, so a failed call leaves no node
    /// behind. Members are bound to this world's kinds by name. Handles for all members are reserved before any storage
    /// is filled so routes can point at them.
    pub fn create_nodes(
        &mut self,
        def: &NodeGroupDef,
        init_vals: &[SlotVal],
        group: GroupId,
        env: &mut Env,
    ) -> NodeResult<Vec<NodeHandle>> {
        if self.groups.contains_key(&group) {
            return Err(NodeError::GroupInUse(group));
        }
        let type_ids = def.bind(&self.registry)?;
        let blobs = def.build_blobs(&self.registry, init_vals)?;

        if self.nodes.free_count() < def.len() {
            return Err(NodeError::NodeTableFull {
                capacity: self.nodes.capacity(),
            });
        }
        let mut needed: HashMap<NodeTypeId, usize> = HashMap::new();
        for &type_id in &type_ids {
            *needed.entry(type_id).or_default() += 1;
        }
        for (&type_id, &count) in &needed {
            let descriptor = self.registry.descriptor(type_id);
            if self.registry.live(type_id) + count > descriptor.capacity {
                return Err(NodeError::CapacityExhausted {
                    type_name: descriptor.name.to_string(),
                    capacity: descriptor.capacity,
                });
            }
        }

        let mut handles = Vec::with_capacity(def.len());
        for &type_id in &type_ids {
            let info = NodeInfo {
                type_id,
                impl_handle: 0,
                routes: Vec::new(),
                group,
                external: None,
            };
            match self.nodes.reserve(info) {
                Some(handle) => handles.push(handle),
                None => {
                    for &handle in &handles {
                        self.nodes.release(handle);
                    }
                    return Err(NodeError::NodeTableFull {
                        capacity: self.nodes.capacity(),
                    });
                }
            }
        }

        let mut lifecycle = env.lifecycle();
        for (index, ((&type_id, blob), &handle)) in
            type_ids.iter().zip(&blobs).zip(&handles).enumerate()
        {
            let allocated = self
                .registry
                .pool_mut(type_id)
                .allocate(blob, handle, &mut lifecycle);
            let (impl_handle, external) = match allocated {
                Ok(placed) => placed,
                Err(err) => {
                    for &done in &handles[..index] {
                        let _ = self.release_node(done, &mut lifecycle);
                    }
                    for &pending in &handles[index..] {
                        self.nodes.release(pending);
                    }
                    return Err(err);
                }
            };
            if let Some(info) = self.nodes.get_mut(handle) {
                info.impl_handle = impl_handle;
                info.external = external;
            }
        }

        for route in def.routes() {
            let routing = SlotRouting {
                src_offset: route.src_offset,
                size: route.size,
                dst_offset: route.dst_offset,
                dst: handles[route.dst],
            };
            let source = handles[route.src];
            self.nodes
                .get_mut(source)
                .ok_or(NodeError::InvalidHandle(source))?
                .routes
                .push(routing);
        }

        self.groups.insert(group, handles.clone());
        debug!(
            "group {group} (`{}`) live with {} nodes",
            def.name(),
            handles.len()
        );
        Ok(handles)
    }

    /// Instantiates `def` under a fresh group id.
    pub fn spawn(
        &mut self,
        def: &NodeGroupDef,
        init_vals: &[SlotVal],
        env: &mut Env,
    ) -> NodeResult<GroupId> {
        let group = self.next_group_id();
        self.create_nodes(def, init_vals, group, env)?;
        Ok(group)
    }

    /// Frees every member of `group`. Returns the number of nodes freed.
    pub fn free_node_group(&mut self, group: GroupId, env: &mut Env) -> NodeResult<usize> {
        let members = self
            .groups
            .remove(&group)
            .ok_or(NodeError::UnknownGroup(group))?;
        let mut lifecycle = env.lifecycle();
        for &handle in &members {
            self.release_node(handle, &mut lifecycle)?;
        }
        debug!("group {group} torn down ({} nodes)", members.len());
        Ok(members.len())
    }

    /// Frees one node. Routes from its group mates into it are dropped.
    pub fn free_node(&mut self, handle: NodeHandle, env: &mut Env) -> NodeResult<()> {
        let group = self.node_info(handle)?.group;
        self.release_node(handle, &mut env.lifecycle())?;
        if let Some(members) = self.groups.get_mut(&group) {
            members.retain(|&member| member != handle);
            for &member in members.iter() {
                if let Some(info) = self.nodes.get_mut(member) {
                    info.routes.retain(|route| route.dst != handle);
                }
            }
            if members.is_empty() {
                self.groups.remove(&group);
            }
        }
        Ok(())
    }

    fn release_node(
        &mut self,
        handle: NodeHandle,
        lifecycle: &mut LifecycleContext<'_>,
    ) -> NodeResult<()> {
        let info = self
            .nodes
            .release(handle)
            .ok_or(NodeError::InvalidHandle(handle))?;
        if !self
            .registry
            .pool_mut(info.type_id)
            .free(info.impl_handle, lifecycle)
        {
            return Err(NodeError::InvalidHandle(handle));
        }
        Ok(())
    }

    /// Advances the simulation by one frame.
    pub fn step(&mut self, dt: f32, env: &mut Env) {
        self.time += f64::from(dt);
        self.dt = dt;
        env.physics.step(dt);

        let mut ctx = FrameContext::new(self.time, dt, env, &mut self.removals);
        self.registry.update_all(&mut ctx);

        self.apply_routes();
        self.apply_removals(env);
    }

    /// Copies every route once, in node table order.
    fn apply_routes(&mut self) {
        let Self {
            nodes,
            registry,
            scratch,
            ..
        } = self;
        for (_, info) in nodes.iter() {
            for route in &info.routes {
                let Some(dst) = nodes.get(route.dst) else {
                    continue;
                };
                let Some(src) = registry.pool(info.type_id).slot_bytes(info.impl_handle) else {
                    continue;
                };
                scratch.clear();
                scratch.extend_from_slice(&src[route.src_offset..route.src_offset + route.size]);
                if let Some(dst_bytes) = registry.pool_mut(dst.type_id).slot_bytes_mut(dst.impl_handle)
                {
                    dst_bytes[route.dst_offset..route.dst_offset + route.size]
                        .copy_from_slice(scratch);
                }
            }
        }
    }

    fn apply_removals(&mut self, env: &mut Env) {
        for member in std::mem::take(&mut self.removals) {
            // Several members of one group may ask; the first one wins.
            let Some(group) = self.nodes.get(member).map(|info| info.group) else {
                continue;
            };
            if let Err(err) = self.free_node_group(group, env) {
                warn!("failed to remove group {group}: {err}");
            }
        }
    }

    /// Emits draw commands for every live node, kinds in update order.
    pub fn render(&self, resources: &ResourceStore, sink: &mut dyn DrawSink) {
        self.registry.draw_all(resources, sink);
    }

    pub fn node_info(&self, handle: NodeHandle) -> NodeResult<&NodeInfo> {
        self.nodes.get(handle).ok_or(NodeError::InvalidHandle(handle))
    }

    pub fn type_name(&self, handle: NodeHandle) -> NodeResult<&'static str> {
        let info = self.node_info(handle)?;
        Ok(self.registry.descriptor(info.type_id).name)
    }

    /// Live node handles in table order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes.iter().map(|(handle, _)| handle)
    }

    pub fn groups(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.groups.keys().copied()
    }

    pub fn group_members(&self, group: GroupId) -> NodeResult<&[NodeHandle]> {
        self.groups
            .get(&group)
            .map(Vec::as_slice)
            .ok_or(NodeError::UnknownGroup(group))
    }

    /// Typed read access to a kind's storage array.
    pub fn storage<T: NodeKind>(&self) -> Option<&NodeStorage<T>> {
        self.registry.storage::<T>()
    }

    pub fn node<T: NodeKind>(&self, handle: NodeHandle) -> NodeResult<&T> {
        let info = self.node_info(handle)?;
        self.check_kind::<T>(handle, info.type_id)?;
        self.registry
            .storage::<T>()
            .and_then(|storage| storage.get(info.impl_handle))
            .ok_or(NodeError::InvalidHandle(handle))
    }

    pub fn node_mut<T: NodeKind>(&mut self, handle: NodeHandle) -> NodeResult<&mut T> {
        let info = self.node_info(handle)?;
        let impl_handle = info.impl_handle;
        self.check_kind::<T>(handle, info.type_id)?;
        self.registry
            .storage_mut::<T>()
            .and_then(|storage| storage.get_mut(impl_handle))
            .ok_or(NodeError::InvalidHandle(handle))
    }

    fn check_kind<T: NodeKind>(&self, handle: NodeHandle, type_id: NodeTypeId) -> NodeResult<()> {
        let name = self.registry.descriptor(type_id).name;
        if name != T::NAME {
            return Err(NodeError::WrongNodeType {
                handle,
                expected: T::NAME,
                found: name,
            });
        }
        Ok(())
    }

    fn field_desc(&self, handle: NodeHandle, name: &str) -> NodeResult<(FieldDesc, &NodeInfo)> {
        let info = self.node_info(handle)?;
        let desc = *self.registry.descriptor(info.type_id).require_field(name)?;
        Ok((desc, info))
    }

    /// Reads a described field by name.
    pub fn field<F: FieldType>(&self, handle: NodeHandle, name: &str) -> NodeResult<F> {
        let (desc, info) = self.field_desc(handle, name)?;
        if desc.kind != F::KIND {
            return Err(NodeError::FieldKindMismatch {
                target: format!("{handle}.{name}"),
                expected: desc.kind,
                found: F::KIND,
            });
        }
        let bytes = self
            .registry
            .pool(info.type_id)
            .slot_bytes(info.impl_handle)
            .ok_or(NodeError::InvalidHandle(handle))?;
        Ok(bytemuck::pod_read_unaligned(&bytes[desc.range()]))
    }

    /// Writes a described field by name.
    pub fn set_field<F: FieldType>(
        &mut self,
        handle: NodeHandle,
        name: &str,
        value: F,
    ) -> NodeResult<()> {
        let (desc, info) = self.field_desc(handle, name)?;
        if desc.kind != F::KIND {
            return Err(NodeError::FieldKindMismatch {
                target: format!("{handle}.{name}"),
                expected: desc.kind,
                found: F::KIND,
            });
        }
        let (type_id, impl_handle) = (info.type_id, info.impl_handle);
        let bytes = self
            .registry
            .pool_mut(type_id)
            .slot_bytes_mut(impl_handle)
            .ok_or(NodeError::InvalidHandle(handle))?;
        bytes[desc.range()].copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    /// One-line dump of a node: kind, handle, group and every field.
    pub fn describe_node(&self, handle: NodeHandle) -> NodeResult<String> {
        let info = self.node_info(handle)?;
        let descriptor = self.registry.descriptor(info.type_id);
        let bytes = self
            .registry
            .pool(info.type_id)
            .slot_bytes(info.impl_handle)
            .ok_or(NodeError::InvalidHandle(handle))?;
        let fields: Vec<String> = descriptor
            .fields
            .iter()
            .map(|field| format!("{}={}", field.name, field.kind.format(&bytes[field.range()])))
            .collect();
        Ok(format!(
            "{} {} group={} {}",
            descriptor.name,
            handle,
            info.group,
            fields.join(" ")
        ))
    }
}
