//! Snapshot and resurrection of a world across a code or data reload.
//!
//! A [`WorldSnapshot`] keeps only what survives a reload: the node table,
//! group membership, and every live slot's raw bytes keyed by type name.
//! [`World::resurrect`] rebuilds a world from it against a freshly built
//! registry and then lets every node re-derive its cached references.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::WorldConfig;
use crate::context::Env;
use crate::error::{NodeError, NodeResult};
use crate::registry::NodeTypeRegistry;
use crate::storage::ImplHandle;
use crate::world::{GroupId, NodeHandle, NodeInfo, SlotRouting, World};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLayout {
    pub type_name: String,
    pub element_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub handle: NodeHandle,
    pub type_name: String,
    pub impl_handle: ImplHandle,
    pub routes: Vec<SlotRouting>,
    pub group: GroupId,
    pub external: Option<u32>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub config: WorldConfig,
    pub time: f64,
    pub dt: f32,
    pub next_group: u32,
    pub update_order: Vec<String>,
    pub layouts: Vec<TypeLayout>,
    pub generations: Vec<u32>,
    pub nodes: Vec<NodeRecord>,
    pub groups: Vec<(GroupId, Vec<NodeHandle>)>,
}

impl WorldSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl World {
    /// Captures every live node. The world itself is left untouched.
    pub fn snapshot(&self) -> WorldSnapshot {
        let layouts = self
            .registry
            .type_names()
            .filter_map(|name| self.registry.lookup(name).ok())
            .map(|descriptor| TypeLayout {
                type_name: descriptor.name.to_string(),
                element_size: descriptor.element_size,
            })
            .collect();

        let nodes = self
            .nodes
            .iter()
            .map(|(handle, info)| NodeRecord {
                handle,
                type_name: self.registry.descriptor(info.type_id).name.to_string(),
                impl_handle: info.impl_handle,
                routes: info.routes.clone(),
                group: info.group,
                external: info.external,
                data: self
                    .registry
                    .pool(info.type_id)
                    .slot_bytes(info.impl_handle)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default(),
            })
            .collect();

        WorldSnapshot {
            config: self.config.clone(),
            time: self.time,
            dt: self.dt,
            next_group: self.next_group,
            update_order: self.registry.update_order().map(str::to_string).collect(),
            layouts,
            generations: self.nodes.generations.clone(),
            nodes,
            groups: self
                .groups
                .iter()
                .map(|(&group, members)| (group, members.clone()))
                .collect(),
        }
    }

    /// Rebuilds a world from `snapshot` using the node kinds registered in
    /// `registry`.
    ///
    /// Every kind named by the snapshot must be registered with the same
    /// element size. Slots come back at their old indices and handles keep
    /// their generations, so handles held outside the world stay valid.
    pub fn resurrect(
        snapshot: &WorldSnapshot,
        registry: NodeTypeRegistry,
        config: WorldConfig,
        env: &Env,
    ) -> NodeResult<World> {
        for layout in &snapshot.layouts {
            let descriptor = match registry.lookup(&layout.type_name) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    // Kinds with no surviving nodes may be dropped by new code.
                    if snapshot
                        .nodes
                        .iter()
                        .any(|node| node.type_name == layout.type_name)
                    {
                        return Err(err);
                    }
                    continue;
                }
            };
            if descriptor.element_size != layout.element_size {
                return Err(NodeError::LayoutMismatch {
                    type_name: layout.type_name.clone(),
                    expected: layout.element_size,
                    found: descriptor.element_size,
                });
            }
        }

        let mut world = World::new(registry, config);
        let order: Vec<&str> = snapshot.update_order.iter().map(String::as_str).collect();
        if let Err(err) = world.registry.set_update_order(&order) {
            warn!("keeping registration order after reload: {err}");
        }

        let capacity = world.nodes.capacity();
        for (slot, &generation) in world.nodes.generations.iter_mut().zip(&snapshot.generations) {
            *slot = generation;
        }

        for record in &snapshot.nodes {
            let type_id = world.registry.id_of(&record.type_name)?;
            if !world
                .registry
                .pool_mut(type_id)
                .restore(record.impl_handle, &record.data, record.handle)
            {
                let descriptor = world.registry.descriptor(type_id);
                return Err(NodeError::CapacityExhausted {
                    type_name: descriptor.name.to_string(),
                    capacity: descriptor.capacity,
                });
            }
            let info = NodeInfo {
                type_id,
                impl_handle: record.impl_handle,
                routes: record.routes.clone(),
                group: record.group,
                external: record.external,
            };
            if !world.nodes.restore(record.handle, info) {
                return Err(NodeError::NodeTableFull { capacity });
            }
        }

        world.groups = snapshot
            .groups
            .iter()
            .map(|(group, members)| (*group, members.clone()))
            .collect::<BTreeMap<_, _>>();
        world.next_group = snapshot.next_group;
        world.time = snapshot.time;
        world.dt = snapshot.dt;

        let resurrected = world.resurrect_in_place(env);
        info!(
            "resurrected {resurrected} nodes in {} groups at t={:.3}",
            world.groups.len(),
            world.time
        );
        Ok(world)
    }

    /// Runs every live node's resurrect hook, e.g. after
    /// [`ResourceStore::reload`](crate::resource::ResourceStore::reload).
    /// Returns the number of nodes visited.
    pub fn resurrect_in_place(&mut self, env: &Env) -> usize {
        let ctx = env.resurrection();
        let live: Vec<(NodeHandle, usize, ImplHandle)> = self
            .nodes
            .iter()
            .map(|(handle, info)| (handle, info.type_id, info.impl_handle))
            .collect();
        let mut visited = 0;
        for (handle, type_id, impl_handle) in live {
            let Some(external) = self.registry.pool_mut(type_id).resurrect(impl_handle, &ctx) else {
                warn!("node {handle} has no storage slot to resurrect");
                continue;
            };
            if let Some(info) = self.nodes.get_mut(handle) {
                info.external = external;
            }
            visited += 1;
        }
        visited
    }
}
