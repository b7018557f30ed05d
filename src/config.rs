use serde::{Deserialize, Serialize};

/// Fixed capacities of the world and of the built-in node kinds.
///
/// Nothing grows at runtime; every limit here is sized up front so the
/// steady state never allocates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub max_nodes: usize,
    pub max_routes_per_node: usize,
    pub capacities: NodeCapacities,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_nodes: 4096,
            max_routes_per_node: 8,
            capacities: NodeCapacities::default(),
        }
    }
}

/// Slot counts for the built-in node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeCapacities {
    pub rigid_bodies: usize,
    pub model_entities: usize,
    pub clip_instances: usize,
    pub player_characters: usize,
}

impl Default for NodeCapacities {
    fn default() -> Self {
        Self {
            rigid_bodies: 1024,
            model_entities: 1024,
            clip_instances: 512,
            player_characters: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_generous() {
        let config = WorldConfig::default();
        assert_eq!(config.max_nodes, 4096);
        assert_eq!(config.max_routes_per_node, 8);
        assert_eq!(config.capacities.player_characters, 8);
    }
}
