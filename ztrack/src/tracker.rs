use anyhow::Result;
use log::info;
use serde::Serialize;
use ztrack_game::{
    AccessibilityLevel, ConnectionIdx, DungeonId, DungeonItemIdx, GameData, Item, ItemCount,
    Mode, ModeField, NodeId, SectionId, SequenceBreakType,
};
use ztrack_logic::GlobalState;

use crate::dungeon::{Dungeon, DungeonContext, DungeonResult, DungeonTemplate};
use crate::graph::{RequirementNode, WorldGraph};
use crate::prize::PrizeSection;
use crate::propagate::Pending;
use crate::requirements::RequirementTable;
use crate::sections::Section;
use crate::settings::TrackerSettings;

/// One user-visible change to tracker state. Applying a change returns its inverse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum StateChange {
    SetItem {
        item: Item,
        count: ItemCount,
    },
    SetSequenceBreak {
        sequence_break: SequenceBreakType,
        enabled: bool,
    },
    SetMode(Mode),
    SetSmallKeys {
        dungeon: DungeonId,
        count: ItemCount,
    },
    SetBigKey {
        dungeon: DungeonId,
        collected: bool,
    },
    SetAlwaysAccessible {
        node: NodeId,
        value: bool,
    },
    SetSectionAvailable {
        section: SectionId,
        available: ItemCount,
    },
    SetDungeonItemCollected {
        dungeon: DungeonId,
        item: DungeonItemIdx,
        collected: bool,
    },
    SetPrize {
        dungeon: DungeonId,
        prize: Option<Item>,
    },
    // 0 marks the prize section cleared, 1 uncleared.
    SetPrizeAvailable {
        dungeon: DungeonId,
        available: ItemCount,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TrackerEvent {
    // The state change as it was applied (item counts clamped).
    StateChanged(StateChange),
    NodeChanged {
        node: NodeId,
        old: AccessibilityLevel,
        new: AccessibilityLevel,
    },
    DungeonChanged {
        dungeon: DungeonId,
        accessibility: AccessibilityLevel,
        accessible: ItemCount,
        total: ItemCount,
    },
    SectionChanged {
        section: SectionId,
        accessibility: AccessibilityLevel,
        accessible: ItemCount,
    },
    PrizeChanged {
        dungeon: DungeonId,
        accessibility: AccessibilityLevel,
        available: ItemCount,
    },
    Reset,
}

pub type Listener = Box<dyn FnMut(&TrackerEvent)>;

// Mode fields that feed the key solver directly rather than through a requirement.
const KEY_MODE_FIELDS: [ModeField; 4] = [
    ModeField::SmallKeyShuffle,
    ModeField::BigKeyShuffle,
    ModeField::KeyDropShuffle,
    ModeField::GenericKeys,
];

/// Owns all tracker state. Every mutation goes through `apply`, which brings every
/// derived value up to date before returning.
pub struct Tracker {
    pub(crate) game_data: GameData,
    pub(crate) global: GlobalState,
    pub(crate) requirements: RequirementTable,
    pub(crate) world: WorldGraph,
    pub(crate) dungeons: Vec<Dungeon>,
    pub(crate) sections: Vec<Section>,
    pub(crate) events: Vec<TrackerEvent>,
    listeners: Vec<Listener>,
}

impl Tracker {
    pub fn new(game_data: GameData, settings: &TrackerSettings) -> Result<Tracker> {
        let mut global = GlobalState::new(game_data.dungeons.len(), Mode::default());
        settings.apply(&mut global)?;

        let mut requirements = RequirementTable::new();
        let mut world = WorldGraph::build(&game_data, &mut requirements, &global);
        let dungeons: Vec<Dungeon> = game_data
            .dungeons
            .iter()
            .enumerate()
            .map(|(id, data)| {
                Dungeon::new(DungeonTemplate::build(
                    id,
                    data,
                    &mut requirements,
                    &global,
                    &mut world,
                ))
            })
            .collect();
        let sections: Vec<Section> = game_data
            .sections
            .iter()
            .enumerate()
            .map(|(id, data)| Section::build(id, data, &mut requirements, &global, &mut world))
            .collect();
        info!(
            "Built tracker: {} nodes, {} connections, {} requirements, {} dungeons, {} sections",
            world.nodes.len(),
            world.connections.len(),
            requirements.len(),
            dungeons.len(),
            sections.len()
        );

        let mut tracker = Tracker {
            game_data,
            global,
            requirements,
            world,
            dungeons,
            sections,
            events: vec![],
            listeners: vec![],
        };
        tracker.rebuild();
        tracker.events.clear();
        Ok(tracker)
    }

    /// Applies one change and returns the change that undoes it.
    pub fn apply(&mut self, change: StateChange) -> StateChange {
        let start = self.events.len();
        let mut pending = Pending::default();
        // Inventory changes made on the player's behalf, reported after `applied`.
        let mut item_changes: Vec<StateChange> = vec![];
        let (inverse, applied) = match change {
            StateChange::SetItem { item, count } => {
                let old = self.global.inventory.count(item);
                let changed = self.global.inventory.set(item, count);
                if changed {
                    self.requirements.mark_item(item);
                }
                let new = self.global.inventory.count(item);
                (
                    StateChange::SetItem { item, count: old },
                    changed.then_some(StateChange::SetItem { item, count: new }),
                )
            }
            StateChange::SetSequenceBreak {
                sequence_break,
                enabled,
            } => {
                let old = self.global.sequence_breaks.is_enabled(sequence_break);
                let changed = self.global.sequence_breaks.set(sequence_break, enabled);
                if changed {
                    self.requirements.mark_sequence_break(sequence_break);
                }
                (
                    StateChange::SetSequenceBreak {
                        sequence_break,
                        enabled: old,
                    },
                    changed.then_some(change),
                )
            }
            StateChange::SetMode(ref mode) => {
                let old = self.global.mode.clone();
                let fields = old.changed_fields(mode);
                self.global.mode = mode.clone();
                for &field in &fields {
                    self.requirements.mark_mode_field(field);
                }
                if fields.iter().any(|f| KEY_MODE_FIELDS.contains(f)) {
                    pending.dungeons.extend(0..self.dungeons.len());
                }
                (
                    StateChange::SetMode(old),
                    (!fields.is_empty()).then_some(change),
                )
            }
            StateChange::SetSmallKeys { dungeon, count } => {
                let old = self.global.keys.small_keys(dungeon);
                let template = &self.dungeons[dungeon].template;
                let count = count.min(template.total_small_keys(&self.global));
                self.global.keys.small_keys[dungeon] = count;
                if old != count {
                    pending.dungeons.insert(dungeon);
                }
                (
                    StateChange::SetSmallKeys { dungeon, count: old },
                    (old != count).then_some(StateChange::SetSmallKeys { dungeon, count }),
                )
            }
            StateChange::SetBigKey { dungeon, collected } => {
                let old = self.global.keys.has_big_key(dungeon);
                self.global.keys.big_keys[dungeon] = collected;
                if old != collected {
                    pending.dungeons.insert(dungeon);
                }
                (
                    StateChange::SetBigKey {
                        dungeon,
                        collected: old,
                    },
                    (old != collected).then_some(change),
                )
            }
            StateChange::SetAlwaysAccessible { node, value } => {
                let old = self.world.nodes[node].always_accessible();
                let changed = self.world.set_always_accessible(node, value);
                if changed {
                    pending.touched_nodes.push(node);
                    pending.may_decrease |= !value;
                }
                (
                    StateChange::SetAlwaysAccessible { node, value: old },
                    changed.then_some(change),
                )
            }
            StateChange::SetSectionAvailable { section, available } => {
                let old = self.sections[section].available();
                let changed = self.sections[section].set_available(available);
                if changed {
                    pending.sections.insert(section);
                }
                let new = self.sections[section].available();
                (
                    StateChange::SetSectionAvailable {
                        section,
                        available: old,
                    },
                    changed.then_some(StateChange::SetSectionAvailable {
                        section,
                        available: new,
                    }),
                )
            }
            StateChange::SetDungeonItemCollected {
                dungeon,
                item,
                collected,
            } => {
                let old = self.dungeons[dungeon].is_collected(item);
                let changed = self.dungeons[dungeon].set_collected(item, collected);
                if changed {
                    pending.dungeons.insert(dungeon);
                }
                (
                    StateChange::SetDungeonItemCollected {
                        dungeon,
                        item,
                        collected: old,
                    },
                    changed.then_some(change),
                )
            }
            StateChange::SetPrize { dungeon, prize } => {
                let Some(section) = self.dungeons[dungeon].prize.as_mut() else {
                    return StateChange::SetPrize { dungeon, prize };
                };
                let old = section.prize();
                let changed = section.set_prize(prize);
                let cleared = section.is_cleared();
                if changed && cleared {
                    // The player already holds the old prize; swap it for the new one.
                    item_changes.extend(old.and_then(|item| self.shift_prize_item(item, false)));
                    item_changes.extend(prize.and_then(|item| self.shift_prize_item(item, true)));
                }
                (
                    StateChange::SetPrize {
                        dungeon,
                        prize: old,
                    },
                    changed.then_some(change),
                )
            }
            StateChange::SetPrizeAvailable { dungeon, available } => {
                let Some(section) = self.dungeons[dungeon].prize.as_mut() else {
                    return StateChange::SetPrizeAvailable { dungeon, available };
                };
                let old = section.available();
                let changed = section.set_available(available);
                let new = section.available();
                let prize = section.prize();
                if changed {
                    pending.dungeons.insert(dungeon);
                    if let Some(item) = prize {
                        item_changes.extend(self.shift_prize_item(item, new == 0));
                    }
                }
                (
                    StateChange::SetPrizeAvailable {
                        dungeon,
                        available: old,
                    },
                    changed.then_some(StateChange::SetPrizeAvailable {
                        dungeon,
                        available: new,
                    }),
                )
            }
        };
        if let Some(applied) = applied {
            self.events.push(TrackerEvent::StateChanged(applied));
            self.events.extend(item_changes.into_iter().map(TrackerEvent::StateChanged));
            self.propagate(pending);
            self.notify(start);
        }
        inverse
    }

    // Gives or takes one of a prize item. Returns the inventory change as applied.
    fn shift_prize_item(&mut self, item: Item, add: bool) -> Option<StateChange> {
        let old = self.global.inventory.count(item);
        let count = if add {
            old.saturating_add(1)
        } else {
            old.saturating_sub(1)
        };
        if !self.global.inventory.set(item, count) {
            return None;
        }
        self.requirements.mark_item(item);
        Some(StateChange::SetItem {
            item,
            count: self.global.inventory.count(item),
        })
    }

    pub fn set_item(&mut self, item: Item, count: ItemCount) -> StateChange {
        self.apply(StateChange::SetItem { item, count })
    }

    /// Counts one more of the item, wrapping to zero past its maximum.
    pub fn add_item(&mut self, item: Item) -> StateChange {
        let count = if self.global.inventory.can_add(item) {
            self.global.inventory.count(item) + 1
        } else {
            0
        };
        self.set_item(item, count)
    }

    /// Counts one less of the item, wrapping to its maximum below zero.
    pub fn remove_item(&mut self, item: Item) -> StateChange {
        let count = match self.global.inventory.count(item) {
            0 => item.maximum(),
            c => c - 1,
        };
        self.set_item(item, count)
    }

    pub fn set_sequence_break(
        &mut self,
        sequence_break: SequenceBreakType,
        enabled: bool,
    ) -> StateChange {
        self.apply(StateChange::SetSequenceBreak {
            sequence_break,
            enabled,
        })
    }

    pub fn set_mode(&mut self, mode: Mode) -> StateChange {
        self.apply(StateChange::SetMode(mode))
    }

    pub fn set_small_keys(&mut self, dungeon: DungeonId, count: ItemCount) -> StateChange {
        self.apply(StateChange::SetSmallKeys { dungeon, count })
    }

    pub fn set_big_key(&mut self, dungeon: DungeonId, collected: bool) -> StateChange {
        self.apply(StateChange::SetBigKey { dungeon, collected })
    }

    pub fn set_always_accessible(&mut self, node: NodeId, value: bool) -> StateChange {
        self.apply(StateChange::SetAlwaysAccessible { node, value })
    }

    pub fn set_section_available(
        &mut self,
        section: SectionId,
        available: ItemCount,
    ) -> StateChange {
        self.apply(StateChange::SetSectionAvailable { section, available })
    }

    pub fn set_dungeon_item_collected(
        &mut self,
        dungeon: DungeonId,
        item: DungeonItemIdx,
        collected: bool,
    ) -> StateChange {
        self.apply(StateChange::SetDungeonItemCollected {
            dungeon,
            item,
            collected,
        })
    }

    pub fn set_prize(&mut self, dungeon: DungeonId, prize: Option<Item>) -> StateChange {
        self.apply(StateChange::SetPrize { dungeon, prize })
    }

    pub fn set_prize_available(
        &mut self,
        dungeon: DungeonId,
        available: ItemCount,
    ) -> StateChange {
        self.apply(StateChange::SetPrizeAvailable { dungeon, available })
    }

    /// Marks a dungeon's prize section cleared if the logic allows it, or regardless
    /// with `force`. Returns the inverse, or `None` when the section can't be cleared.
    pub fn clear_prize(&mut self, dungeon: DungeonId, force: bool) -> Option<StateChange> {
        let section = self.dungeons[dungeon].prize.as_ref()?;
        if !section.can_be_cleared(force) {
            return None;
        }
        Some(self.set_prize_available(dungeon, 0))
    }

    /// Restores the starting state of the session. The mode is kept.
    pub fn reset(&mut self) {
        let start = self.events.len();
        self.global.reset();
        for section in &mut self.sections {
            section.reset();
        }
        for dungeon in &mut self.dungeons {
            dungeon.reset();
        }
        self.world.reset_always_accessible();
        self.events.push(TrackerEvent::Reset);
        self.rebuild();
        self.notify(start);
    }

    // Recomputes every derived value from scratch.
    fn rebuild(&mut self) {
        self.requirements.evaluate_all(&self.global);
        let node_changes = self.world.recompute_all(&self.requirements);
        for change in node_changes {
            self.events.push(TrackerEvent::NodeChanged {
                node: change.node,
                old: change.old,
                new: change.new,
            });
        }
        self.update_dungeons(0..self.dungeons.len());
        self.update_sections(0..self.sections.len());
    }

    pub(crate) fn update_dungeons(&mut self, ids: impl IntoIterator<Item = DungeonId>) {
        let cx = DungeonContext {
            world: &self.world,
            requirements: &self.requirements,
            global: &self.global,
        };
        for id in ids {
            let dungeon = &mut self.dungeons[id];
            if dungeon.update(cx) {
                let result = dungeon.result();
                self.events.push(TrackerEvent::DungeonChanged {
                    dungeon: id,
                    accessibility: result.accessibility,
                    accessible: result.accessible,
                    total: result.total,
                });
            }
            if dungeon.update_prize() {
                if let Some(prize) = &dungeon.prize {
                    self.events.push(TrackerEvent::PrizeChanged {
                        dungeon: id,
                        accessibility: prize.accessibility(),
                        available: prize.available(),
                    });
                }
            }
        }
    }

    pub(crate) fn update_sections(&mut self, ids: impl IntoIterator<Item = SectionId>) {
        for id in ids {
            let section = &mut self.sections[id];
            if section.update(&self.world, &self.requirements) {
                self.events.push(TrackerEvent::SectionChanged {
                    section: id,
                    accessibility: section.accessibility(),
                    accessible: section.accessible(),
                });
            }
        }
    }

    fn notify(&mut self, start: usize) {
        for listener in &mut self.listeners {
            for event in &self.events[start..] {
                listener(event);
            }
        }
    }

    /// Registers a callback invoked with every event, after the mutation that caused
    /// it has fully propagated.
    pub fn subscribe(&mut self, listener: impl FnMut(&TrackerEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Drains the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<TrackerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.game_data.node_id(name)
    }

    pub fn dungeon_id(&self, name: &str) -> Option<DungeonId> {
        self.game_data.dungeon_id(name)
    }

    pub fn section_id(&self, name: &str) -> Option<SectionId> {
        self.game_data.section_isv.index_by_key.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> &RequirementNode {
        &self.world.nodes[id]
    }

    pub fn num_nodes(&self) -> usize {
        self.world.nodes.len()
    }

    pub fn node_accessibility(&self, id: NodeId) -> AccessibilityLevel {
        self.world.node_accessibility(id)
    }

    /// Evaluates a node recursively, ignoring the propagated values.
    pub fn query_node_accessibility(&self, id: NodeId) -> AccessibilityLevel {
        self.world.query_node_accessibility(id, &self.requirements)
    }

    pub fn connection_accessibility(&self, idx: ConnectionIdx) -> AccessibilityLevel {
        self.world.connection_accessibility(idx)
    }

    pub fn section(&self, id: SectionId) -> &Section {
        &self.sections[id]
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn dungeon(&self, id: DungeonId) -> &Dungeon {
        &self.dungeons[id]
    }

    pub fn dungeons(&self) -> &[Dungeon] {
        &self.dungeons
    }

    pub fn dungeon_result(&self, id: DungeonId) -> &DungeonResult {
        self.dungeons[id].result()
    }

    pub fn prize(&self, dungeon: DungeonId) -> Option<&PrizeSection> {
        self.dungeons[dungeon].prize.as_ref()
    }

    pub fn global(&self) -> &GlobalState {
        &self.global
    }

    pub fn game_data(&self) -> &GameData {
        &self.game_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const GRAPH: &str = r#"{
        "nodes": [
            {"name": "Start", "alwaysAccessible": true},
            {"name": "Field", "connections": [{"from": "Start"}]},
            {"name": "Castle", "connections": [
                {"from": "Field", "requirement": {"item": {"item": "Sword"}}}
            ]},
            {"name": "Lake", "connections": [
                {"from": "Field", "requirement": {"or": [
                    {"item": {"item": "Flippers"}},
                    {"sequenceBreak": "WaterWalk"}
                ]}}
            ]},
            {"name": "Pyramid", "connections": [
                {"from": "Field", "requirement": {"item": {"item": "Crystal"}}}
            ]}
        ],
        "dungeons": [{
            "name": "Tower",
            "smallKeys": 1,
            "entries": [{"node": "Lobby", "from": "Castle"}],
            "nodes": [{"name": "Lobby"}, {"name": "Back"}],
            "keyDoors": [{"name": "Door", "kind": "Small", "from": "Lobby", "to": "Back"}],
            "items": [
                {"name": "Lobby Chest", "node": "Lobby"},
                {"name": "Back Chest", "node": "Back"}
            ],
            "prize": {"location": "Back Chest", "prize": "Crystal"}
        }],
        "sections": [
            {"name": "Castle Chest", "node": "Castle"},
            {"name": "Lake Items", "node": "Lake", "total": 2}
        ]
    }"#;

    fn tracker() -> Tracker {
        let game_data = GameData::from_json_str(GRAPH).unwrap();
        Tracker::new(game_data, &TrackerSettings::default()).unwrap()
    }

    #[test]
    fn test_sword_opens_castle() {
        let mut tracker = tracker();
        let castle = tracker.node_id("Castle").unwrap();
        assert_eq!(tracker.node_accessibility(castle), AccessibilityLevel::None);
        assert_eq!(tracker.dungeon_result(0).accessibility, AccessibilityLevel::None);

        let inverse = tracker.set_item(Item::Sword, 1);
        assert_eq!(inverse, StateChange::SetItem { item: Item::Sword, count: 0 });
        assert_eq!(tracker.node_accessibility(castle), AccessibilityLevel::Normal);
        assert_eq!(tracker.section(0).accessible(), 1);
        assert_eq!(tracker.dungeon_result(0).accessibility, AccessibilityLevel::Normal);

        let events = tracker.take_events();
        assert_eq!(
            events[0],
            TrackerEvent::StateChanged(StateChange::SetItem { item: Item::Sword, count: 1 })
        );
        assert!(events.contains(&TrackerEvent::NodeChanged {
            node: castle,
            old: AccessibilityLevel::None,
            new: AccessibilityLevel::Normal
        }));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, TrackerEvent::DungeonChanged { dungeon: 0, .. }))
        );
        assert!(
            events
                .iter()
                .any(|e| matches!(e, TrackerEvent::SectionChanged { section: 0, .. }))
        );

        tracker.apply(inverse);
        assert_eq!(tracker.node_accessibility(castle), AccessibilityLevel::None);
        assert_eq!(tracker.dungeon_result(0).accessible, 0);
    }

    #[test]
    fn test_sequence_break_toggle() {
        let mut tracker = tracker();
        let lake = tracker.node_id("Lake").unwrap();
        assert_eq!(tracker.node_accessibility(lake), AccessibilityLevel::SequenceBreak);
        tracker.set_sequence_break(SequenceBreakType::WaterWalk, false);
        assert_eq!(tracker.node_accessibility(lake), AccessibilityLevel::None);
        assert_eq!(tracker.section(1).accessible(), 0);
        tracker.set_item(Item::Flippers, 1);
        assert_eq!(tracker.node_accessibility(lake), AccessibilityLevel::Normal);
        assert_eq!(tracker.section(1).accessible(), 2);
    }

    #[test]
    fn test_no_op_change_emits_nothing() {
        let mut tracker = tracker();
        let inverse = tracker.set_item(Item::Hammer, 0);
        assert_eq!(inverse, StateChange::SetItem { item: Item::Hammer, count: 0 });
        assert!(tracker.take_events().is_empty());
    }

    #[test]
    fn test_add_and_remove_wrap() {
        let mut tracker = tracker();
        tracker.add_item(Item::Lamp);
        assert_eq!(tracker.global().inventory.count(Item::Lamp), 1);
        tracker.add_item(Item::Lamp);
        assert_eq!(tracker.global().inventory.count(Item::Lamp), 0);
        tracker.remove_item(Item::Sword);
        assert_eq!(tracker.global().inventory.count(Item::Sword), 4);
    }

    #[test]
    fn test_dungeon_keys_and_collection() {
        let mut tracker = tracker();
        tracker.set_item(Item::Sword, 1);
        tracker.set_dungeon_item_collected(0, 0, true);
        let result = tracker.dungeon_result(0);
        assert_eq!(result.items[1], AccessibilityLevel::None);
        assert_eq!(result.total, 1);
        tracker.set_small_keys(0, 1);
        assert_eq!(tracker.dungeon_result(0).items[1], AccessibilityLevel::Normal);

        let mut mode = tracker.global().mode.clone();
        mode.generic_keys = true;
        tracker.set_small_keys(0, 0);
        assert_eq!(tracker.dungeon_result(0).items[1], AccessibilityLevel::None);
        let inverse = tracker.set_mode(mode);
        assert_eq!(tracker.dungeon_result(0).items[1], AccessibilityLevel::Normal);
        tracker.apply(inverse);
        assert!(!tracker.global().mode.generic_keys);
        assert_eq!(tracker.dungeon_result(0).items[1], AccessibilityLevel::None);
    }

    #[test]
    fn test_always_accessible_and_reset() {
        let mut tracker = tracker();
        let castle = tracker.node_id("Castle").unwrap();
        tracker.set_always_accessible(castle, true);
        assert_eq!(tracker.node_accessibility(castle), AccessibilityLevel::Normal);
        tracker.set_item(Item::Flippers, 1);
        tracker.set_section_available(1, 0);
        tracker.set_sequence_break(SequenceBreakType::WaterWalk, false);

        tracker.reset();
        let fresh = tracker_with_same_mode(&tracker);
        for id in 0..tracker.num_nodes() {
            assert_eq!(tracker.node_accessibility(id), fresh.node_accessibility(id));
        }
        assert_eq!(tracker.section(1).available(), 2);
        assert_eq!(tracker.dungeon_result(0), fresh.dungeon_result(0));
        assert!(tracker.take_events().contains(&TrackerEvent::Reset));
    }

    fn tracker_with_same_mode(tracker: &Tracker) -> Tracker {
        let settings = TrackerSettings {
            mode: tracker.global().mode.clone(),
            ..TrackerSettings::default()
        };
        Tracker::new(tracker.game_data().clone(), &settings).unwrap()
    }

    #[test]
    fn test_listeners_see_events() {
        let mut tracker = tracker();
        let seen = Rc::new(RefCell::new(vec![]));
        let sink = seen.clone();
        tracker.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        tracker.set_item(Item::Sword, 2);
        let seen = seen.borrow();
        assert!(!seen.is_empty());
        assert_eq!(*seen, tracker.take_events());
    }

    #[test]
    fn test_cached_matches_recursive() {
        let mut tracker = tracker();
        for item in [Item::Sword, Item::Flippers] {
            tracker.set_item(item, 1);
            for id in 0..tracker.num_nodes() {
                assert_eq!(
                    tracker.node_accessibility(id),
                    tracker.query_node_accessibility(id)
                );
            }
        }
    }

    #[test]
    fn test_small_keys_clamped_to_dungeon_total() {
        let mut tracker = tracker();
        tracker.set_item(Item::Sword, 1);
        tracker.take_events();
        let inverse = tracker.set_small_keys(0, 7);
        assert_eq!(inverse, StateChange::SetSmallKeys { dungeon: 0, count: 0 });
        assert_eq!(tracker.global().keys.small_keys(0), 1);
        assert_eq!(
            tracker.take_events()[0],
            TrackerEvent::StateChanged(StateChange::SetSmallKeys { dungeon: 0, count: 1 })
        );

        tracker.set_small_keys(0, ItemCount::MAX);
        assert_eq!(tracker.global().keys.small_keys(0), 1);
        assert!(tracker.take_events().is_empty());
        assert_eq!(tracker.dungeon_result(0).items[1], AccessibilityLevel::Normal);
    }

    #[test]
    fn test_section_count_change_notifies() {
        let mut tracker = tracker();
        let lake = tracker.section_id("Lake Items").unwrap();
        assert_eq!(tracker.section(lake).accessible(), 2);
        tracker.take_events();

        tracker.set_section_available(lake, 1);
        assert_eq!(
            tracker.take_events(),
            vec![
                TrackerEvent::StateChanged(StateChange::SetSectionAvailable {
                    section: lake,
                    available: 1
                }),
                TrackerEvent::SectionChanged {
                    section: lake,
                    accessibility: AccessibilityLevel::SequenceBreak,
                    accessible: 1
                },
            ]
        );
        assert_eq!(tracker.section(lake).accessible(), 1);
    }

    #[test]
    fn test_prize_section_gives_prize() {
        let mut tracker = tracker();
        let pyramid = tracker.node_id("Pyramid").unwrap();
        let prize = tracker.prize(0).unwrap();
        assert_eq!(prize.prize(), Some(Item::Crystal));
        assert_eq!(prize.accessibility(), AccessibilityLevel::None);
        assert_eq!(tracker.clear_prize(0, false), None);

        tracker.set_item(Item::Sword, 1);
        assert_eq!(
            tracker.prize(0).unwrap().accessibility(),
            AccessibilityLevel::Normal
        );
        tracker.take_events();

        let inverse = tracker.clear_prize(0, false).unwrap();
        assert_eq!(inverse, StateChange::SetPrizeAvailable { dungeon: 0, available: 1 });
        assert_eq!(tracker.global().inventory.count(Item::Crystal), 1);
        assert_eq!(tracker.node_accessibility(pyramid), AccessibilityLevel::Normal);
        let events = tracker.take_events();
        assert_eq!(
            events[..2],
            [
                TrackerEvent::StateChanged(StateChange::SetPrizeAvailable {
                    dungeon: 0,
                    available: 0
                }),
                TrackerEvent::StateChanged(StateChange::SetItem {
                    item: Item::Crystal,
                    count: 1
                }),
            ]
        );
        assert!(events.contains(&TrackerEvent::PrizeChanged {
            dungeon: 0,
            accessibility: AccessibilityLevel::None,
            available: 0
        }));
        assert!(events.contains(&TrackerEvent::NodeChanged {
            node: pyramid,
            old: AccessibilityLevel::None,
            new: AccessibilityLevel::Normal
        }));
        assert_eq!(tracker.clear_prize(0, true), None);

        // A cleared section hands over whatever prize it is moved to.
        tracker.set_prize(0, Some(Item::Pendant));
        assert_eq!(tracker.global().inventory.count(Item::Crystal), 0);
        assert_eq!(tracker.global().inventory.count(Item::Pendant), 1);
        assert_eq!(tracker.node_accessibility(pyramid), AccessibilityLevel::None);

        tracker.apply(inverse);
        assert_eq!(tracker.global().inventory.count(Item::Pendant), 0);
        assert_eq!(tracker.prize(0).unwrap().available(), 1);
        assert_eq!(
            tracker.prize(0).unwrap().accessibility(),
            AccessibilityLevel::Normal
        );

        tracker.reset();
        assert_eq!(tracker.prize(0).unwrap().prize(), Some(Item::Crystal));
        assert!(tracker.clear_prize(0, true).is_some());
        assert_eq!(tracker.global().inventory.count(Item::Crystal), 1);
    }

    #[test]
    fn test_queries_are_idempotent() {
        let mut tracker = tracker();
        tracker.set_item(Item::Sword, 1);
        tracker.take_events();
        let notified = Rc::new(RefCell::new(0));
        let counter = notified.clone();
        tracker.subscribe(move |_| *counter.borrow_mut() += 1);

        let snapshot = |tracker: &Tracker| {
            let nodes: Vec<(AccessibilityLevel, AccessibilityLevel)> = (0..tracker.num_nodes())
                .map(|id| {
                    (
                        tracker.node_accessibility(id),
                        tracker.query_node_accessibility(id),
                    )
                })
                .collect();
            let sections: Vec<(AccessibilityLevel, ItemCount)> = tracker
                .sections()
                .iter()
                .map(|s| (s.accessibility(), s.accessible()))
                .collect();
            let prize = tracker.prize(0).map(|p| p.accessibility());
            (nodes, sections, tracker.dungeon_result(0).clone(), prize)
        };
        let first = snapshot(&tracker);
        let second = snapshot(&tracker);
        assert_eq!(first, second);
        assert!(tracker.take_events().is_empty());
        assert_eq!(*notified.borrow(), 0);
    }
}
