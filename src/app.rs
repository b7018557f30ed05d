//! Headless frame loop used by the binary and by integration tests.

use anyhow::{anyhow, Context, Result};
use log::info;

use crate::config::WorldConfig;
use crate::context::Env;
use crate::level::LevelDesc;
use crate::nodes::builtin_registry;
use crate::render::DrawList;
use crate::world::{GroupId, World};

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub frames: u32,
    pub dt: f32,
    /// Key or button names held for the whole run.
    pub hold: Vec<String>,
    /// Frame after which the world is snapshotted and resurrected.
    pub reload_at: Option<u32>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            frames: 60,
            dt: 1.0 / 60.0,
            hold: Vec::new(),
            reload_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub frames: u32,
    pub time: f64,
    pub live_nodes: usize,
    pub groups: usize,
    pub draw_commands: usize,
}

pub struct Simulation {
    pub world: World,
    pub env: Env,
    pub level: LevelDesc,
    pub spawned: Vec<GroupId>,
}

impl Simulation {
    /// Builds a world with the built-in node kinds, installs the level and
    /// spawns its groups.
    pub fn load(level: LevelDesc, config: WorldConfig) -> Result<Self> {
        let registry = builtin_registry(&config.capacities)?;
        let mut world = World::new(registry, config);
        let mut env = Env::headless();
        level.install(&mut world, &env.resources)?;
        let spawned = level.spawn_all(&mut world, &mut env)?;
        Ok(Self {
            world,
            env,
            level,
            spawned,
        })
    }

    pub fn run(&mut self, options: &RunOptions) -> Result<RunSummary> {
        let mut draws = DrawList::new();
        for frame in 1..=options.frames {
            self.env.input.begin_frame();
            for name in &options.hold {
                if !self.env.input.press_by_name(name) {
                    return Err(anyhow!("unknown key `{name}`"));
                }
            }
            self.world.step(options.dt, &mut self.env);
            if options.reload_at == Some(frame) {
                self.reload()
                    .with_context(|| format!("reload after frame {frame} failed"))?;
            }
            draws.clear();
            self.world.render(&self.env.resources, &mut draws);
        }
        draws.sort_by_layer();
        Ok(RunSummary {
            frames: options.frames,
            time: self.world.time(),
            live_nodes: self.world.live_nodes(),
            groups: self.world.groups().count(),
            draw_commands: draws.len(),
        })
    }

    /// Replaces node code and data as a live reload would: the world is
    /// snapshotted, rebuilt on a fresh registry, and resources reloaded
    /// before every node is resurrected.
    pub fn reload(&mut self) -> Result<usize> {
        let snapshot = self.world.snapshot();
        let config = self.world.config().clone();
        let registry = builtin_registry(&config.capacities)?;
        self.level.reload_resources(&self.env.resources);
        self.world = World::resurrect(&snapshot, registry, config, &self.env)?;
        info!("reloaded {} nodes", snapshot.node_count());
        Ok(snapshot.node_count())
    }
}

pub fn print_final_state(world: &World) {
    println!("Final node states:");
    for handle in world.nodes() {
        if let Ok(line) = world.describe_node(handle) {
            println!(" - {line}");
        }
    }
}
