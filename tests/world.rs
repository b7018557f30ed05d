use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crystal_nodes::nodes::{builtin_registry, ModelEntity};
use crystal_nodes::physics::{BodyDesc, BodyRef};
use crystal_nodes::{
    node_fields, DrawList, Env, FieldDesc, FrameContext, GroupId, InlineName, ModelResource,
    NodeError, NodeGroupDesc, NodeKind, NodeRun, NodeTypeRegistry, ResourceId, SlotVal, World,
    WorldConfig,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Body {
    x: f64,
}

impl NodeKind for Body {
    const NAME: &'static str = "body";

    fn fields() -> Vec<FieldDesc> {
        node_fields!(Body { x })
    }

    fn update(_run: NodeRun<'_, Self>, _ctx: &mut FrameContext<'_>) {}
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Visual {
    px: f64,
}

impl NodeKind for Visual {
    const NAME: &'static str = "visual";

    fn fields() -> Vec<FieldDesc> {
        node_fields!(Visual { px })
    }

    fn update(_run: NodeRun<'_, Self>, _ctx: &mut FrameContext<'_>) {}
}

/// Same name as [`Body`] with a narrower layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct NarrowBody {
    x: f32,
}

impl NodeKind for NarrowBody {
    const NAME: &'static str = "body";

    fn fields() -> Vec<FieldDesc> {
        node_fields!(NarrowBody { x })
    }

    fn update(_run: NodeRun<'_, Self>, _ctx: &mut FrameContext<'_>) {}
}

/// Counts frames and publishes the count.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Ticker {
    ticks: u32,
}

impl NodeKind for Ticker {
    const NAME: &'static str = "ticker";

    fn fields() -> Vec<FieldDesc> {
        node_fields!(Ticker { ticks })
    }

    fn update(mut run: NodeRun<'_, Self>, _ctx: &mut FrameContext<'_>) {
        for node in run.nodes_mut() {
            node.ticks += 1;
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Readout {
    shown: u32,
    narrow: f32,
}

impl NodeKind for Readout {
    const NAME: &'static str = "display";

    fn fields() -> Vec<FieldDesc> {
        node_fields!(Readout { shown, narrow })
    }

    fn update(_run: NodeRun<'_, Self>, _ctx: &mut FrameContext<'_>) {}
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Dot {
    x: f32,
}

impl NodeKind for Dot {
    const NAME: &'static str = "dot";

    fn fields() -> Vec<FieldDesc> {
        node_fields!(Dot { x })
    }

    fn update(_run: NodeRun<'_, Self>, _ctx: &mut FrameContext<'_>) {}
}

/// Leaves a trace in the physics backend so update order is observable.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct First {
    unused: u32,
}

impl NodeKind for First {
    const NAME: &'static str = "first";

    fn fields() -> Vec<FieldDesc> {
        Vec::new()
    }

    fn update(_run: NodeRun<'_, Self>, ctx: &mut FrameContext<'_>) {
        ctx.physics.create_body(&trace(1.0));
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Second {
    unused: u32,
}

impl NodeKind for Second {
    const NAME: &'static str = "second";

    fn fields() -> Vec<FieldDesc> {
        Vec::new()
    }

    fn update(_run: NodeRun<'_, Self>, ctx: &mut FrameContext<'_>) {
        ctx.physics.create_body(&trace(2.0));
    }
}

fn trace(x: f32) -> BodyDesc {
    BodyDesc {
        position: Vec2::new(x, 0.0),
        angle: 0.0,
        radius: 0.0,
        mass: 0.0,
    }
}

fn config(max_nodes: usize) -> WorldConfig {
    WorldConfig {
        max_nodes,
        ..WorldConfig::default()
    }
}

#[test]
fn routed_body_position_reaches_visual_in_the_same_step() {
    let registry = NodeTypeRegistry::new()
        .with::<Body>(4)
        .unwrap()
        .with::<Visual>(4)
        .unwrap();
    let mut world = World::new(registry, config(16));
    let mut env = Env::headless();
    let def = world
        .resolve_group(
            &NodeGroupDesc::new("thing")
                .member("body", "body")
                .member("visual", "visual")
                .route("body.x", "visual.px"),
        )
        .unwrap();
    let handles = world
        .create_nodes(&def, &[SlotVal::new("body", "x", 3.0f64)], GroupId(0), &mut env)
        .unwrap();

    world.step(0.0, &mut env);
    assert_eq!(world.field::<f64>(handles[1], "px").unwrap(), 3.0);
    assert_eq!(world.node::<Visual>(handles[1]).unwrap().px, 3.0);
}

#[test]
fn routes_copy_values_computed_this_frame() {
    let registry = NodeTypeRegistry::new()
        .with::<Ticker>(2)
        .unwrap()
        .with::<Readout>(2)
        .unwrap();
    let mut world = World::new(registry, config(8));
    let mut env = Env::headless();
    let def = world
        .resolve_group(
            &NodeGroupDesc::new("clock")
                .member("ticker", "ticker")
                .member("display", "display")
                .route("ticker.ticks", "display.shown"),
        )
        .unwrap();
    let handles = world.create_nodes(&def, &[], GroupId(0), &mut env).unwrap();
    for frame in 1..=3u32 {
        world.step(0.1, &mut env);
        assert_eq!(world.field::<u32>(handles[1], "shown").unwrap(), frame);
    }
}

#[test]
fn mismatched_route_sizes_fail_before_instantiation() {
    let registry = NodeTypeRegistry::new()
        .with::<Body>(4)
        .unwrap()
        .with::<Readout>(4)
        .unwrap();
    let world = World::new(registry, config(8));
    let err = world
        .resolve_group(
            &NodeGroupDesc::new("bad")
                .member("body", "body")
                .member("display", "display")
                .route("body.x", "display.narrow"),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        NodeError::FieldSizeMismatch {
            from_size: 8,
            to_size: 4,
            ..
        }
    ));
    assert_eq!(world.live_nodes(), 0);
}

#[test]
fn freeing_a_group_releases_every_member() {
    let registry = NodeTypeRegistry::new()
        .with::<Dot>(8)
        .unwrap()
        .with::<Ticker>(8)
        .unwrap();
    let mut world = World::new(registry, config(16));
    let mut env = Env::headless();
    let def = world
        .resolve_group(
            &NodeGroupDesc::new("trio")
                .member("a", "dot")
                .member("b", "dot")
                .member("c", "ticker"),
        )
        .unwrap();
    let keep = world.spawn(&def, &[], &mut env).unwrap();
    let gone = world.spawn(&def, &[], &mut env).unwrap();
    assert_eq!(world.live_nodes(), 6);

    assert_eq!(world.free_node_group(gone, &mut env), Ok(3));
    assert_eq!(world.live_nodes(), 3);
    assert_eq!(world.storage::<Dot>().unwrap().len(), 2);
    assert_eq!(world.storage::<Ticker>().unwrap().len(), 1);
    assert_eq!(world.groups().collect::<Vec<_>>(), vec![keep]);
}

#[test]
fn type_capacity_is_enforced() {
    let registry = NodeTypeRegistry::new().with::<Dot>(3).unwrap();
    let mut world = World::new(registry, config(16));
    let mut env = Env::headless();
    let def = world
        .resolve_group(&NodeGroupDesc::new("dot").member("dot", "dot"))
        .unwrap();
    for _ in 0..3 {
        world.spawn(&def, &[], &mut env).unwrap();
    }
    assert_eq!(
        world.spawn(&def, &[], &mut env),
        Err(NodeError::CapacityExhausted {
            type_name: "dot".to_string(),
            capacity: 3
        })
    );
    assert_eq!(world.live_nodes(), 3);
}

#[test]
fn freed_dot_slot_is_reused_and_zeroed() {
    let registry = NodeTypeRegistry::new().with::<Dot>(4).unwrap();
    let mut world = World::new(registry, config(16));
    let mut env = Env::headless();
    let def = world
        .resolve_group(&NodeGroupDesc::new("dot").member("dot", "dot"))
        .unwrap();
    let mut groups = Vec::new();
    for index in 0..4 {
        let value = SlotVal::new("dot", "x", index as f32 + 1.0);
        groups.push(world.spawn(&def, &[value], &mut env).unwrap());
    }
    world.free_node_group(groups[2], &mut env).unwrap();

    let group = world.spawn(&def, &[], &mut env).unwrap();
    let handle = world.group_members(group).unwrap()[0];
    assert_eq!(world.node_info(handle).unwrap().impl_handle, 2);
    assert_eq!(world.node::<Dot>(handle).unwrap().x, 0.0);
}

fn traced_world(order: Option<&[&str]>) -> (World, Env) {
    let registry = NodeTypeRegistry::new()
        .with::<First>(1)
        .unwrap()
        .with::<Second>(1)
        .unwrap();
    let mut world = World::new(registry, config(4));
    if let Some(order) = order {
        world.set_update_order(order).unwrap();
    }
    let mut env = Env::headless();
    let def = world
        .resolve_group(
            &NodeGroupDesc::new("pair")
                .member("a", "first")
                .member("b", "second"),
        )
        .unwrap();
    world.spawn(&def, &[], &mut env).unwrap();
    world.step(0.1, &mut env);
    (world, env)
}

#[test]
fn update_order_is_explicit_and_deterministic() {
    let x_of = |env: &Env, raw| env.physics.body_state(BodyRef(raw)).unwrap().position.x;

    let (_, env) = traced_world(None);
    assert_eq!((x_of(&env, 0), x_of(&env, 1)), (1.0, 2.0));

    let (world, env) = traced_world(Some(&["second", "first"]));
    assert_eq!((x_of(&env, 0), x_of(&env, 1)), (2.0, 1.0));

    let (again, _) = traced_world(Some(&["second", "first"]));
    assert_eq!(world.snapshot(), again.snapshot());
}

#[test]
fn missing_models_resurrect_to_the_sentinel() {
    let config = WorldConfig::default();
    let mut world = World::new(builtin_registry(&config.capacities).unwrap(), config);
    let mut env = Env::headless();
    env.resources.insert_model(ModelResource {
        name: "barrel".to_string(),
        half_extents: Vec2::ONE,
        color: [1.0; 4],
    });
    let def = world
        .resolve_group(
            &NodeGroupDesc::new("prop")
                .member("visual", "model_entity")
                .value(SlotVal::new("visual", "model", InlineName::new("barrel"))),
        )
        .unwrap();
    let group = world.spawn(&def, &[], &mut env).unwrap();
    let handle = world.group_members(group).unwrap()[0];
    assert!(!ResourceId::from_raw(world.node::<ModelEntity>(handle).unwrap().model_res).is_missing());

    env.resources.reload(Vec::new(), Vec::new());
    assert_eq!(world.resurrect_in_place(&env), 1);
    let node = world.node::<ModelEntity>(handle).unwrap();
    assert_eq!(ResourceId::from_raw(node.model_res), ResourceId::MISSING);

    let mut draws = DrawList::new();
    world.render(&env.resources, &mut draws);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws.commands()[0].model, ResourceId::MISSING);
}

#[test]
fn templates_bind_to_kinds_by_name_after_reregistration() {
    let old = NodeTypeRegistry::new()
        .with::<Body>(4)
        .unwrap()
        .with::<Dot>(4)
        .unwrap();
    let def = World::new(old, config(8))
        .resolve_group(&NodeGroupDesc::new("solo").member("b", "body"))
        .unwrap();

    let reordered = NodeTypeRegistry::new()
        .with::<Dot>(4)
        .unwrap()
        .with::<Body>(4)
        .unwrap();
    let mut world = World::new(reordered, config(8));
    let mut env = Env::headless();
    let handles = world
        .create_nodes(&def, &[SlotVal::new("b", "x", 2.0f64)], GroupId(0), &mut env)
        .unwrap();
    assert_eq!(world.type_name(handles[0]).unwrap(), "body");
    assert_eq!(world.node::<Body>(handles[0]).unwrap().x, 2.0);
    assert_eq!(world.storage::<Dot>().unwrap().len(), 0);
}

#[test]
fn templates_for_a_changed_layout_leave_no_node_behind() {
    let old = NodeTypeRegistry::new()
        .with::<Dot>(4)
        .unwrap()
        .with::<Body>(4)
        .unwrap();
    let def = World::new(old, config(8))
        .resolve_group(
            &NodeGroupDesc::new("pair")
                .member("d", "dot")
                .member("b", "body"),
        )
        .unwrap();

    let changed = NodeTypeRegistry::new()
        .with::<Dot>(4)
        .unwrap()
        .with::<NarrowBody>(4)
        .unwrap();
    let mut world = World::new(changed, config(8));
    let mut env = Env::headless();
    assert_eq!(
        world.create_nodes(&def, &[], GroupId(0), &mut env),
        Err(NodeError::LayoutMismatch {
            type_name: "body".to_string(),
            expected: 8,
            found: 4,
        })
    );
    assert_eq!(world.live_nodes(), 0);
    assert_eq!(world.groups().count(), 0);
    assert_eq!(world.storage::<Dot>().unwrap().len(), 0);
}
