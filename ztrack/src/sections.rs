use serde::Serialize;
use ztrack_game::{AccessibilityLevel, ItemCount, NodeId, SectionData, SectionId};
use ztrack_logic::GlobalState;

use crate::graph::WorldGraph;
use crate::requirements::{Dependent, RequirementId, RequirementTable};

/// A group of item locations in the overworld, tracked by how many are left.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub name: String,
    #[serde(skip)]
    pub node: NodeId,
    #[serde(skip)]
    pub requirement: RequirementId,
    pub total: ItemCount,
    available: ItemCount,
    accessibility: AccessibilityLevel,
    accessible: ItemCount,
}

impl Section {
    pub fn build(
        id: SectionId,
        data: &SectionData,
        requirements: &mut RequirementTable,
        global: &GlobalState,
        world: &mut WorldGraph,
    ) -> Section {
        let requirement = requirements.intern(&data.requirement, global);
        requirements.add_dependent(requirement, Dependent::Section(id));
        world.add_dependent(data.node, Dependent::Section(id));
        Section {
            name: data.name.clone(),
            node: data.node,
            requirement,
            total: data.total,
            available: data.total,
            accessibility: AccessibilityLevel::None,
            accessible: 0,
        }
    }

    pub fn available(&self) -> ItemCount {
        self.available
    }

    /// Returns whether the count changed. Counts above `total` are clamped.
    pub fn set_available(&mut self, available: ItemCount) -> bool {
        let available = available.min(self.total);
        let changed = self.available != available;
        self.available = available;
        changed
    }

    pub fn accessibility(&self) -> AccessibilityLevel {
        self.accessibility
    }

    /// Locations left that the player can get to, as of the last `update`.
    pub fn accessible(&self) -> ItemCount {
        self.accessible
    }

    pub fn reset(&mut self) {
        self.available = self.total;
    }

    /// Returns whether the accessibility or the accessible count changed.
    pub fn update(&mut self, world: &WorldGraph, requirements: &RequirementTable) -> bool {
        let accessibility = if self.available == 0 {
            AccessibilityLevel::None
        } else {
            world
                .node_accessibility(self.node)
                .min(requirements.accessibility(self.requirement))
        };
        let accessible = if accessibility.is_accessible() {
            self.available
        } else {
            0
        };
        let changed = (self.accessibility, self.accessible) != (accessibility, accessible);
        self.accessibility = accessibility;
        self.accessible = accessible;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ztrack_game::{GameData, Item, Mode};

    #[test]
    fn test_section_counts() {
        let game_data = GameData::from_json_str(
            r#"{
            "nodes": [
                {"name": "Start", "alwaysAccessible": true},
                {"name": "Island", "connections": [
                    {"from": "Start", "requirement": {"or": [
                        {"item": {"item": "Flippers"}},
                        {"sequenceBreak": "WaterWalk"}
                    ]}}
                ]}
            ],
            "sections": [
                {"name": "Island Chests", "node": "Island", "total": 3,
                 "requirement": {"level": "Partial"}}
            ]
        }"#,
        )
        .unwrap();
        let mut global = GlobalState::new(0, Mode::default());
        let mut requirements = RequirementTable::new();
        let mut world = WorldGraph::build(&game_data, &mut requirements, &global);
        let mut section = Section::build(
            0,
            &game_data.sections[0],
            &mut requirements,
            &global,
            &mut world,
        );
        assert!(section.update(&world, &requirements));
        assert_eq!(section.accessibility(), AccessibilityLevel::SequenceBreak);
        assert_eq!(section.accessible(), 3);

        global.inventory.set(Item::Flippers, 1);
        requirements.evaluate_all(&global);
        world.recompute_all(&requirements);
        assert!(section.update(&world, &requirements));
        assert_eq!(section.accessibility(), AccessibilityLevel::Partial);

        assert!(section.set_available(1));
        assert!(!section.set_available(1));
        // Same accessibility, fewer locations left.
        assert!(section.update(&world, &requirements));
        assert_eq!(section.accessibility(), AccessibilityLevel::Partial);
        assert_eq!(section.accessible(), 1);
        assert!(!section.update(&world, &requirements));
        section.set_available(0);
        assert!(section.update(&world, &requirements));
        assert_eq!(section.accessibility(), AccessibilityLevel::None);
        assert_eq!(section.accessible(), 0);

        section.reset();
        assert_eq!(section.available(), 3);
        assert!(!section.set_available(10));
    }
}
