//! Node group templates.
//!
//! A [`NodeGroupDesc`] is the declarative form authored in level files: the
//! members (role + node type), their initial slot values and the routes
//! between member fields. [`NodeGroupDef::resolve`] checks it against the
//! registry once, at load time, and produces a template the world can
//! instantiate repeatedly without further lookups.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};
use crate::field::{FieldDesc, SlotVal};
use crate::registry::{NodeTypeDescriptor, NodeTypeId, NodeTypeRegistry};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeGroupDesc {
    pub name: String,
    pub members: Vec<MemberDesc>,
    #[serde(default)]
    pub values: Vec<SlotVal>,
    #[serde(default)]
    pub routes: Vec<RouteDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDesc {
    pub role: String,
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDesc {
    pub from: FieldPath,
    pub to: FieldPath,
}

/// `role.field` address inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPath {
    pub role: String,
    pub field: String,
}

impl FieldPath {
    pub fn new(role: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            field: field.into(),
        }
    }

    /// Splits on the first dot. A path without a dot has an empty field
    /// and fails resolution.
    pub fn parse(path: &str) -> Self {
        match path.trim().split_once('.') {
            Some((role, field)) => Self::new(role, field),
            None => Self::new(path.trim(), ""),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.role, self.field)
    }
}

impl NodeGroupDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn member(mut self, role: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.members.push(MemberDesc {
            role: role.into(),
            node_type: node_type.into(),
        });
        self
    }

    pub fn value(mut self, value: SlotVal) -> Self {
        self.values.push(value);
        self
    }

    pub fn route(mut self, from: &str, to: &str) -> Self {
        self.routes.push(RouteDesc {
            from: FieldPath::parse(from),
            to: FieldPath::parse(to),
        });
        self
    }
}

/// One member of a resolved group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    pub role: String,
    pub type_name: &'static str,
    /// Zeroed node with the group's default slot values applied.
    defaults: Vec<u8>,
}

/// A field copy between two members, by member index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRoute {
    pub src: usize,
    pub src_offset: usize,
    pub size: usize,
    pub dst: usize,
    pub dst_offset: usize,
}

/// A group template validated against a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeGroupDef {
    name: String,
    members: Vec<GroupMember>,
    routes: Vec<GroupRoute>,
}

impl NodeGroupDef {
    /// Validates `desc`: every type registered, roles unique, every field
    /// known, values parse, and both ends of every route have the same kind
    /// and size.
    pub fn resolve(
        desc: &NodeGroupDesc,
        registry: &NodeTypeRegistry,
        max_routes_per_node: usize,
    ) -> NodeResult<Self> {
        let mut members: Vec<GroupMember> = Vec::with_capacity(desc.members.len());
        for member in &desc.members {
            if members.iter().any(|m| m.role == member.role) {
                return Err(NodeError::DuplicateRole {
                    group: desc.name.clone(),
                    role: member.role.clone(),
                });
            }
            let type_id = registry.id_of(&member.node_type)?;
            let descriptor = registry.descriptor(type_id);
            members.push(GroupMember {
                role: member.role.clone(),
                type_name: descriptor.name,
                defaults: vec![0; descriptor.element_size],
            });
        }

        let mut def = Self {
            name: desc.name.clone(),
            members,
            routes: Vec::with_capacity(desc.routes.len()),
        };

        for value in &desc.values {
            let (index, field) = def.locate(registry, &value.role, &value.field)?;
            let bytes = value.encode(&field)?;
            def.members[index].defaults[field.range()].copy_from_slice(&bytes);
        }

        let mut per_source = vec![0usize; def.members.len()];
        for route in &desc.routes {
            let (src, from) = def.locate(registry, &route.from.role, &route.from.field)?;
            let (dst, to) = def.locate(registry, &route.to.role, &route.to.field)?;
            if from.size() != to.size() {
                return Err(NodeError::FieldSizeMismatch {
                    from: route.from.to_string(),
                    to: route.to.to_string(),
                    from_size: from.size(),
                    to_size: to.size(),
                });
            }
            if from.kind != to.kind {
                return Err(NodeError::FieldKindMismatch {
                    target: format!("{} -> {}", route.from, route.to),
                    expected: to.kind,
                    found: from.kind,
                });
            }
            per_source[src] += 1;
            if per_source[src] > max_routes_per_node {
                return Err(NodeError::TooManyRoutes {
                    group: def.name.clone(),
                    role: route.from.role.clone(),
                    max: max_routes_per_node,
                });
            }
            def.routes.push(GroupRoute {
                src,
                src_offset: from.offset,
                size: from.size(),
                dst,
                dst_offset: to.offset,
            });
        }

        Ok(def)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    pub fn routes(&self) -> &[GroupRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_index(&self, role: &str) -> Option<usize> {
        self.members.iter().position(|member| member.role == role)
    }

    /// Looks every member's kind up by name in `registry`. A template
    /// outlives the registry it was resolved against across a hot reload,
    /// so the kinds may sit at other ids or have changed layout.
    pub fn bind(&self, registry: &NodeTypeRegistry) -> NodeResult<Vec<NodeTypeId>> {
        self.members
            .iter()
            .map(|member| {
                let id = registry.id_of(member.type_name)?;
                let element_size = registry.descriptor(id).element_size;
                if element_size != member.defaults.len() {
                    return Err(NodeError::LayoutMismatch {
                        type_name: member.type_name.to_string(),
                        expected: member.defaults.len(),
                        found: element_size,
                    });
                }
                Ok(id)
            })
            .collect()
    }

    /// Initial blobs for one instantiation: the defaults with `overrides`
    /// applied on top. Fails without side effects if any override does not
    /// resolve.
    pub fn build_blobs(
        &self,
        registry: &NodeTypeRegistry,
        overrides: &[SlotVal],
    ) -> NodeResult<Vec<Vec<u8>>> {
        let mut blobs: Vec<Vec<u8>> = self
            .members
            .iter()
            .map(|member| member.defaults.clone())
            .collect();
        for value in overrides {
            let (index, field) = self.locate(registry, &value.role, &value.field)?;
            let bytes = value.encode(&field)?;
            blobs[index][field.range()].copy_from_slice(&bytes);
        }
        Ok(blobs)
    }

    fn locate(
        &self,
        registry: &NodeTypeRegistry,
        role: &str,
        field: &str,
    ) -> NodeResult<(usize, FieldDesc)> {
        let index = self
            .member_index(role)
            .ok_or_else(|| NodeError::UnknownRole {
                group: self.name.clone(),
                role: role.to_string(),
            })?;
        let descriptor: &NodeTypeDescriptor = registry.lookup(self.members[index].type_name)?;
        let field = *descriptor.require_field(field)?;
        Ok((index, field))
    }
}
