//! Built-in node kinds.
//!
//! Registration order doubles as the default update order: players turn
//! input into forces, bodies integrate them and publish transforms, and
//! visuals and clips consume whatever was routed to them.

mod body;
mod clip;
mod model;
mod player;

pub use body::RigidBody;
pub use clip::ClipInstance;
pub use model::ModelEntity;
pub use player::PlayerCharacter;

use crate::config::NodeCapacities;
use crate::error::NodeResult;
use crate::registry::NodeTypeRegistry;

/// Registers every built-in kind with the capacities from `capacities`.
pub fn register_builtin(
    registry: &mut NodeTypeRegistry,
    capacities: &NodeCapacities,
) -> NodeResult<()> {
    registry.register::<PlayerCharacter>(capacities.player_characters)?;
    registry.register::<RigidBody>(capacities.rigid_bodies)?;
    registry.register::<ModelEntity>(capacities.model_entities)?;
    registry.register::<ClipInstance>(capacities.clip_instances)?;
    Ok(())
}

pub fn builtin_registry(capacities: &NodeCapacities) -> NodeResult<NodeTypeRegistry> {
    let mut registry = NodeTypeRegistry::new();
    register_builtin(&mut registry, capacities)?;
    Ok(registry)
}
