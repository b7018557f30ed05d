use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::info;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::context::Env;
use crate::field::SlotVal;
use crate::group::NodeGroupDesc;
use crate::resource::{ClipResource, ModelResource, ResourceStore};
use crate::world::{GroupId, World};

/// Everything a level file declares: resources, group templates, and the
/// groups to spawn once those are installed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LevelDesc {
    #[serde(default)]
    pub update_order: Option<Vec<String>>,
    pub models: Vec<ModelResource>,
    pub clips: Vec<ClipResource>,
    pub groups: Vec<NodeGroupDesc>,
    pub spawns: Vec<SpawnDesc>,
}

/// `count` instances of the group named `group`, each with `values`
/// applied over the group's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnDesc {
    pub group: String,
    pub count: u32,
    #[serde(default)]
    pub values: Vec<SlotVal>,
}

impl LevelDesc {
    pub fn load(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("failed to read level {}", path.display()))?;
        Self::from_xml(&xml).with_context(|| format!("failed to parse level {}", path.display()))
    }

    /// Parses the level XML.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid level XML")?;
        let root = document.root_element();
        if !root.has_tag_name("level") {
            return Err(anyhow!("expected <level>, found <{}>", root.tag_name().name()));
        }

        let mut level = LevelDesc::default();
        for node in root.children().filter(|child| child.is_element()) {
            match node.tag_name().name() {
                "order" => {
                    let names = node.text().unwrap_or_default();
                    level.update_order = Some(names.split_whitespace().map(str::to_string).collect());
                }
                "model" => level.models.push(parse_model(&node)?),
                "clip" => level.clips.push(parse_clip(&node)?),
                "group" => level.groups.push(parse_group(&node)?),
                "spawn" => level.spawns.push(parse_spawn(&node)?),
                other => return Err(anyhow!("unexpected <{other}> in <level>")),
            }
        }
        Ok(level)
    }

    /// Stores models and clips, then resolves every group against the
    /// world's registry and stores it by name.
    pub fn install(&self, world: &mut World, resources: &ResourceStore) -> Result<()> {
        if let Some(order) = &self.update_order {
            let names: Vec<&str> = order.iter().map(String::as_str).collect();
            world.set_update_order(&names).context("invalid <order>")?;
        }
        for model in &self.models {
            resources.insert_model(model.clone());
        }
        for clip in &self.clips {
            resources.insert_clip(clip.clone());
        }
        for desc in &self.groups {
            let def = world
                .resolve_group(desc)
                .with_context(|| format!("group `{}`", desc.name))?;
            resources.insert_group(def);
        }
        info!(
            "level installed: {} models, {} clips, {} groups",
            self.models.len(),
            self.clips.len(),
            self.groups.len()
        );
        Ok(())
    }

    /// Instantiates every `<spawn>` in document order.
    pub fn spawn_all(&self, world: &mut World, env: &mut Env) -> Result<Vec<GroupId>> {
        let mut spawned = Vec::new();
        for spawn in &self.spawns {
            let def = env
                .resources
                .group(&spawn.group)
                .ok_or_else(|| anyhow!("spawn refers to unknown group `{}`", spawn.group))?;
            for _ in 0..spawn.count {
                let group = world
                    .spawn(&def, &spawn.values, env)
                    .with_context(|| format!("failed to spawn `{}`", spawn.group))?;
                spawned.push(group);
            }
        }
        Ok(spawned)
    }

    /// Replaces the data resources, leaving group templates alone.
    pub fn reload_resources(&self, resources: &ResourceStore) {
        resources.reload(self.models.clone(), self.clips.clone());
    }
}

fn parse_model(node: &Node<'_, '_>) -> Result<ModelResource> {
    let name = required_attr(node, "name")?;
    let size = parse_vec2(node.attribute("size"), Vec2::ONE)
        .with_context(|| format!("model `{name}`"))?;
    let color = parse_color(node.attribute("color"), [1.0; 4])
        .with_context(|| format!("model `{name}`"))?;
    Ok(ModelResource {
        name,
        half_extents: size * 0.5,
        color,
    })
}

fn parse_clip(node: &Node<'_, '_>) -> Result<ClipResource> {
    let name = required_attr(node, "name")?;
    let duration = parse_number(node.attribute("duration"), 1.0f32)
        .with_context(|| format!("clip `{name}`"))?;
    let frame_count = parse_number(node.attribute("frames"), 1u32)
        .with_context(|| format!("clip `{name}`"))?;
    Ok(ClipResource {
        name,
        duration,
        frame_count,
    })
}

fn parse_group(node: &Node<'_, '_>) -> Result<NodeGroupDesc> {
    let mut group = NodeGroupDesc::new(required_attr(node, "name")?);
    for child in node.children().filter(|child| child.is_element()) {
        group = match child.tag_name().name() {
            "node" => group.member(required_attr(&child, "role")?, required_attr(&child, "type")?),
            "set" => group.value(parse_set(&child)?),
            "route" => group.route(&required_attr(&child, "from")?, &required_attr(&child, "to")?),
            other => return Err(anyhow!("unexpected <{other}> in group `{}`", group.name)),
        };
    }
    Ok(group)
}

fn parse_spawn(node: &Node<'_, '_>) -> Result<SpawnDesc> {
    let group = required_attr(node, "group")?;
    let count = parse_number(node.attribute("count"), 1u32)
        .with_context(|| format!("spawn of `{group}`"))?;
    let values = node
        .children()
        .filter(|child| child.has_tag_name("set"))
        .map(|child| parse_set(&child))
        .collect::<Result<Vec<_>>>()?;
    Ok(SpawnDesc {
        group,
        count,
        values,
    })
}

/// `<set role="body" field="position">1 2</set>`
fn parse_set(node: &Node<'_, '_>) -> Result<SlotVal> {
    Ok(SlotVal::text(
        required_attr(node, "role")?,
        required_attr(node, "field")?,
        node.text().unwrap_or_default().trim(),
    ))
}

fn required_attr(node: &Node<'_, '_>, name: &str) -> Result<String> {
    node.attribute(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("<{}> is missing `{name}`", node.tag_name().name()))
}

fn parse_number<T>(value: Option<&str>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow!("failed to parse `{value}`: {err}")),
        None => Ok(default),
    }
}

fn parse_vec2(value: Option<&str>, default: Vec2) -> Result<Vec2> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("failed to parse vector `{value}`: {err}"))?;
    match numbers[..] {
        [x, y] => Ok(Vec2::new(x, y)),
        _ => Err(anyhow!("vector `{value}` needs 2 components")),
    }
}

fn parse_color(value: Option<&str>, default: [f32; 4]) -> Result<[f32; 4]> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("failed to parse color `{value}`: {err}"))?;
    match numbers[..] {
        [r, g, b] => Ok([r / 255.0, g / 255.0, b / 255.0, 1.0]),
        [r, g, b, a] => Ok([r / 255.0, g / 255.0, b / 255.0, a / 255.0]),
        _ => Err(anyhow!("color `{value}` needs 3 or 4 components")),
    }
}
