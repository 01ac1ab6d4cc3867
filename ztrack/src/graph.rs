use std::collections::BTreeSet;

use hashbrown::{HashMap, HashSet};
use ztrack_game::{AccessibilityLevel, ConnectionIdx, GameData, NodeId};
use ztrack_logic::GlobalState;

use crate::requirements::{Dependent, RequirementId, RequirementTable};

/// A directed edge of the world graph, gated by a shared requirement.
#[derive(Clone, Debug)]
pub struct NodeConnection {
    pub from: NodeId,
    pub to: NodeId,
    pub requirement: RequirementId,
    accessibility: AccessibilityLevel,
}

impl NodeConnection {
    /// Cached `min(from node, requirement)`.
    pub fn accessibility(&self) -> AccessibilityLevel {
        self.accessibility
    }
}

#[derive(Clone, Debug)]
pub struct RequirementNode {
    pub name: String,
    starting_always_accessible: bool,
    always_accessible: bool,
    accessibility: AccessibilityLevel,
    pub connections: Vec<ConnectionIdx>, // Incoming
    pub outgoing: Vec<ConnectionIdx>,
    pub dependents: Vec<Dependent>,
}

impl RequirementNode {
    pub fn accessibility(&self) -> AccessibilityLevel {
        self.accessibility
    }

    pub fn always_accessible(&self) -> bool {
        self.always_accessible
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NodeChange {
    pub node: NodeId,
    pub old: AccessibilityLevel,
    pub new: AccessibilityLevel,
}

#[derive(Clone, Debug, Default)]
pub struct WorldGraph {
    pub nodes: Vec<RequirementNode>,
    pub connections: Vec<NodeConnection>,
}

impl WorldGraph {
    pub fn build(
        game_data: &GameData,
        requirements: &mut RequirementTable,
        global: &GlobalState,
    ) -> WorldGraph {
        let mut graph = WorldGraph {
            nodes: game_data
                .node_isv
                .keys
                .iter()
                .zip(game_data.nodes.iter())
                .map(|(name, data)| RequirementNode {
                    name: name.clone(),
                    starting_always_accessible: data.always_accessible,
                    always_accessible: data.always_accessible,
                    accessibility: AccessibilityLevel::None,
                    connections: vec![],
                    outgoing: vec![],
                    dependents: vec![],
                })
                .collect(),
            connections: vec![],
        };
        for (to, data) in game_data.nodes.iter().enumerate() {
            for conn in &data.connections {
                let idx = graph.connections.len();
                let requirement = requirements.intern(&conn.requirement, global);
                requirements.add_dependent(requirement, Dependent::Connection(idx));
                graph.connections.push(NodeConnection {
                    from: conn.from,
                    to,
                    requirement,
                    accessibility: AccessibilityLevel::None,
                });
                graph.nodes[to].connections.push(idx);
                graph.nodes[conn.from].outgoing.push(idx);
            }
        }
        graph.recompute_all(requirements);
        graph
    }

    pub fn node_accessibility(&self, id: NodeId) -> AccessibilityLevel {
        self.nodes[id].accessibility
    }

    pub fn connection_accessibility(&self, idx: ConnectionIdx) -> AccessibilityLevel {
        self.connections[idx].accessibility
    }

    pub fn add_dependent(&mut self, id: NodeId, dependent: Dependent) {
        let dependents = &mut self.nodes[id].dependents;
        if !dependents.contains(&dependent) {
            dependents.push(dependent);
        }
    }

    /// Returns whether the flag changed. The caller is responsible for propagating.
    pub fn set_always_accessible(&mut self, id: NodeId, value: bool) -> bool {
        let changed = self.nodes[id].always_accessible != value;
        self.nodes[id].always_accessible = value;
        changed
    }

    /// Restores every node's flag to its declared value.
    pub fn reset_always_accessible(&mut self) {
        for node in &mut self.nodes {
            node.always_accessible = node.starting_always_accessible;
        }
    }

    /// Evaluates a node from its incoming connections. A node already on the current
    /// path counts as `None`, which keeps cycles from feeding themselves.
    pub fn get_node_accessibility(
        &self,
        id: NodeId,
        requirements: &RequirementTable,
        excluded: &mut HashSet<NodeId>,
    ) -> AccessibilityLevel {
        let node = &self.nodes[id];
        if node.always_accessible {
            return AccessibilityLevel::Normal;
        }
        if !excluded.insert(id) {
            return AccessibilityLevel::None;
        }
        let mut level = AccessibilityLevel::None;
        for &idx in &node.connections {
            level = level.max(self.get_connection_accessibility(idx, requirements, excluded));
            if level == AccessibilityLevel::Normal {
                break;
            }
        }
        excluded.remove(&id);
        level
    }

    pub fn get_connection_accessibility(
        &self,
        idx: ConnectionIdx,
        requirements: &RequirementTable,
        excluded: &mut HashSet<NodeId>,
    ) -> AccessibilityLevel {
        let conn = &self.connections[idx];
        let req_level = requirements.accessibility(conn.requirement);
        if req_level == AccessibilityLevel::None {
            return AccessibilityLevel::None;
        }
        req_level.min(self.get_node_accessibility(conn.from, requirements, excluded))
    }

    /// Uncached recursive evaluation of one node, independent of the propagated values.
    pub fn query_node_accessibility(
        &self,
        id: NodeId,
        requirements: &RequirementTable,
    ) -> AccessibilityLevel {
        let mut excluded = HashSet::new();
        self.get_node_accessibility(id, requirements, &mut excluded)
    }

    fn connection_value(
        &self,
        idx: ConnectionIdx,
        requirements: &RequirementTable,
    ) -> AccessibilityLevel {
        let conn = &self.connections[idx];
        self.nodes[conn.from]
            .accessibility
            .min(requirements.accessibility(conn.requirement))
    }

    fn fold_node(&self, id: NodeId, requirements: &RequirementTable) -> AccessibilityLevel {
        let node = &self.nodes[id];
        if node.always_accessible {
            return AccessibilityLevel::Normal;
        }
        let mut level = AccessibilityLevel::None;
        for &idx in &node.connections {
            level = level.max(self.connection_value(idx, requirements));
            if level == AccessibilityLevel::Normal {
                break;
            }
        }
        level
    }

    // Raises node values until nothing changes. Values only move up from where they
    // start, so starting from `None` (or from a previous fixpoint whose inputs only
    // increased) reaches the least fixpoint. The first old value of every node that
    // moves is recorded in `old_values`.
    fn settle(
        &mut self,
        requirements: &RequirementTable,
        mut modified: BTreeSet<NodeId>,
        old_values: &mut HashMap<NodeId, AccessibilityLevel>,
    ) {
        while let Some(id) = modified.pop_first() {
            let new_level = self.fold_node(id, requirements);
            let old_level = self.nodes[id].accessibility;
            if new_level == old_level {
                continue;
            }
            debug_assert!(new_level > old_level);
            old_values.entry(id).or_insert(old_level);
            self.nodes[id].accessibility = new_level;
            for &idx in &self.nodes[id].outgoing {
                modified.insert(self.connections[idx].to);
            }
        }
    }

    fn forward_closure(&self, roots: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        let mut region = roots.clone();
        let mut stack: Vec<NodeId> = roots.iter().copied().collect();
        while let Some(id) = stack.pop() {
            for &idx in &self.nodes[id].outgoing {
                let to = self.connections[idx].to;
                if region.insert(to) {
                    stack.push(to);
                }
            }
        }
        region
    }

    fn refresh_connection(&mut self, idx: ConnectionIdx, requirements: &RequirementTable) {
        self.connections[idx].accessibility = self.connection_value(idx, requirements);
    }

    fn collect_changes(
        &mut self,
        requirements: &RequirementTable,
        old_values: HashMap<NodeId, AccessibilityLevel>,
    ) -> Vec<NodeChange> {
        let mut changes: Vec<NodeChange> = old_values
            .into_iter()
            .filter(|&(node, old)| self.nodes[node].accessibility != old)
            .map(|(node, old)| NodeChange {
                node,
                old,
                new: self.nodes[node].accessibility,
            })
            .collect();
        changes.sort_by_key(|c| c.node);
        for change in &changes {
            for i in 0..self.nodes[change.node].outgoing.len() {
                let idx = self.nodes[change.node].outgoing[i];
                self.refresh_connection(idx, requirements);
            }
        }
        changes
    }

    /// Recomputes every node from scratch.
    pub fn recompute_all(&mut self, requirements: &RequirementTable) -> Vec<NodeChange> {
        let mut old_values = HashMap::new();
        for (id, node) in self.nodes.iter_mut().enumerate() {
            old_values.insert(id, node.accessibility);
            node.accessibility = AccessibilityLevel::None;
        }
        self.settle(requirements, (0..self.nodes.len()).collect(), &mut old_values);
        for idx in 0..self.connections.len() {
            self.refresh_connection(idx, requirements);
        }
        self.collect_changes(requirements, old_values)
    }

    /// Brings node values up to date after the requirements of `seeds` changed and
    /// the nodes in `touched` changed their own inputs.
    ///
    /// When every input only increased, the previous values are a valid starting
    /// point and only the nodes downstream of a change are revisited. Otherwise the
    /// whole forward closure of the change is reset to `None` and rebuilt, so that
    /// values held up only by a cycle are dropped.
    pub fn propagate(
        &mut self,
        requirements: &RequirementTable,
        seeds: &[ConnectionIdx],
        touched: &[NodeId],
        may_decrease: bool,
    ) -> Vec<NodeChange> {
        for &idx in seeds {
            self.refresh_connection(idx, requirements);
        }
        let roots: BTreeSet<NodeId> = seeds
            .iter()
            .map(|&idx| self.connections[idx].to)
            .chain(touched.iter().copied())
            .collect();
        if roots.is_empty() {
            return vec![];
        }
        let mut old_values = HashMap::new();
        if may_decrease {
            let region = self.forward_closure(&roots);
            for &id in &region {
                old_values.insert(id, self.nodes[id].accessibility);
                self.nodes[id].accessibility = AccessibilityLevel::None;
            }
            self.settle(requirements, region, &mut old_values);
        } else {
            self.settle(requirements, roots, &mut old_values);
        }
        self.collect_changes(requirements, old_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ztrack_game::{Item, Mode, Requirement, SequenceBreakType};

    fn game_data(json: &str) -> GameData {
        GameData::from_json_str(json).unwrap()
    }

    fn cycle_data() -> GameData {
        game_data(
            r#"{
            "nodes": [
                {"name": "Start", "alwaysAccessible": true},
                {"name": "A", "connections": [
                    {"from": "Start", "requirement": {"item": {"item": "Hammer"}}},
                    {"from": "B"}
                ]},
                {"name": "B", "connections": [
                    {"from": "A", "requirement": {"sequenceBreak": "BonkOverLedge"}}
                ]},
                {"name": "C", "connections": [
                    {"from": "B", "requirement": {"item": {"item": "Gloves"}}}
                ]}
            ]
        }"#,
        )
    }

    fn setup(game_data: &GameData) -> (GlobalState, RequirementTable, WorldGraph) {
        let global = GlobalState::new(0, Mode::default());
        let mut requirements = RequirementTable::new();
        let graph = WorldGraph::build(game_data, &mut requirements, &global);
        (global, requirements, graph)
    }

    fn update(
        global: &GlobalState,
        requirements: &mut RequirementTable,
        graph: &mut WorldGraph,
    ) -> Vec<NodeChange> {
        let sweep = requirements.sweep(global);
        let seeds: Vec<ConnectionIdx> = sweep
            .dependents
            .iter()
            .filter_map(|d| match d {
                Dependent::Connection(idx) => Some(*idx),
                _ => None,
            })
            .collect();
        graph.propagate(requirements, &seeds, &[], sweep.any_decrease())
    }

    fn assert_matches_recursive(requirements: &RequirementTable, graph: &WorldGraph) {
        for id in 0..graph.nodes.len() {
            assert_eq!(
                graph.node_accessibility(id),
                graph.query_node_accessibility(id, requirements),
                "node {}",
                graph.nodes[id].name
            );
        }
    }

    #[test]
    fn test_initial_values() {
        let data = cycle_data();
        let (_, requirements, graph) = setup(&data);
        assert_eq!(graph.node_accessibility(0), AccessibilityLevel::Normal);
        assert_eq!(graph.node_accessibility(1), AccessibilityLevel::None);
        assert_eq!(graph.node_accessibility(2), AccessibilityLevel::None);
        assert_matches_recursive(&requirements, &graph);
    }

    #[test]
    fn test_cycle_rises_and_falls() {
        let data = cycle_data();
        let (mut global, mut requirements, mut graph) = setup(&data);

        global.inventory.set(Item::Hammer, 1);
        requirements.mark_item(Item::Hammer);
        let changes = update(&global, &mut requirements, &mut graph);
        assert_eq!(changes.len(), 2);
        assert_eq!(graph.node_accessibility(1), AccessibilityLevel::Normal);
        assert_eq!(graph.node_accessibility(2), AccessibilityLevel::SequenceBreak);
        assert_matches_recursive(&requirements, &graph);

        global.inventory.set(Item::Gloves, 1);
        requirements.mark_item(Item::Gloves);
        update(&global, &mut requirements, &mut graph);
        assert_eq!(graph.node_accessibility(3), AccessibilityLevel::SequenceBreak);

        // A and B keep each other alive only through the cycle once Hammer is gone.
        global.inventory.set(Item::Hammer, 0);
        requirements.mark_item(Item::Hammer);
        let changes = update(&global, &mut requirements, &mut graph);
        assert_eq!(changes.len(), 3);
        for id in 1..4 {
            assert_eq!(graph.node_accessibility(id), AccessibilityLevel::None);
        }
        assert_matches_recursive(&requirements, &graph);
    }

    #[test]
    fn test_unchanged_nodes_not_reported() {
        let data = cycle_data();
        let (mut global, mut requirements, mut graph) = setup(&data);
        global
            .sequence_breaks
            .set(SequenceBreakType::BonkOverLedge, false);
        requirements.mark_sequence_break(SequenceBreakType::BonkOverLedge);
        let changes = update(&global, &mut requirements, &mut graph);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_always_accessible_toggle() {
        let data = cycle_data();
        let (_, requirements, mut graph) = setup(&data);
        assert!(graph.set_always_accessible(2, true));
        let changes = graph.propagate(&requirements, &[], &[2], false);
        assert_eq!(
            changes.iter().map(|c| c.node).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(graph.node_accessibility(1), AccessibilityLevel::Normal);
        assert_eq!(
            graph.connection_accessibility(graph.nodes[2].connections[0]),
            AccessibilityLevel::SequenceBreak
        );
        assert_matches_recursive(&requirements, &graph);

        assert!(graph.set_always_accessible(2, false));
        graph.propagate(&requirements, &[], &[2], true);
        assert_eq!(graph.node_accessibility(1), AccessibilityLevel::None);
        assert_matches_recursive(&requirements, &graph);

        graph.set_always_accessible(0, false);
        graph.reset_always_accessible();
        assert!(graph.nodes[0].always_accessible());
    }

    #[test]
    fn test_parallel_connections_take_max() {
        let data = game_data(
            r#"{
            "nodes": [
                {"name": "Start", "alwaysAccessible": true},
                {"name": "Ledge", "connections": [
                    {"from": "Start", "requirement": {"level": "Inspect"}},
                    {"from": "Start", "requirement": {"or": [
                        {"item": {"item": "Boots"}},
                        {"sequenceBreak": "FakeFlippersQirnJump"}
                    ]}}
                ]}
            ]
        }"#,
        );
        let (mut global, mut requirements, mut graph) = setup(&data);
        assert_eq!(graph.node_accessibility(1), AccessibilityLevel::SequenceBreak);
        global.inventory.set(Item::Boots, 1);
        requirements.mark_item(Item::Boots);
        update(&global, &mut requirements, &mut graph);
        assert_eq!(graph.node_accessibility(1), AccessibilityLevel::Normal);
        global
            .sequence_breaks
            .set(SequenceBreakType::FakeFlippersQirnJump, false);
        global.inventory.set(Item::Boots, 0);
        requirements.mark_item(Item::Boots);
        requirements.mark_sequence_break(SequenceBreakType::FakeFlippersQirnJump);
        update(&global, &mut requirements, &mut graph);
        assert_eq!(graph.node_accessibility(1), AccessibilityLevel::Inspect);
        assert_matches_recursive(&requirements, &graph);
    }
}
