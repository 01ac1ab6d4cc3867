//! Dungeon reachability under small-key and big-key uncertainty.
//!
//! The tracker does not know which doors the player has opened or where the keys
//! are, so a dungeon is evaluated once per plausible key layout: a set of opened
//! small-key doors plus an assumption about the big key. Each layout is checked
//! by a greedy opening order on a throwaway `MutableDungeon` before its item
//! reachability is considered.

use std::collections::BTreeSet;

use arrayvec::ArrayVec;
use log::{debug, warn};
use serde::Serialize;
use ztrack_game::{
    AccessibilityLevel, DungeonData, DungeonId, DungeonItemIdx, DungeonNodeId, ItemCount,
    KeyDoorIdx, KeyDoorKind, MAX_KEY_DOORS, Requirement,
};
use ztrack_logic::GlobalState;

use crate::graph::WorldGraph;
use crate::prize::PrizeSection;
use crate::requirements::{Dependent, RequirementId, RequirementTable};

/// Read-only view of the world state a dungeon is evaluated against.
#[derive(Clone, Copy)]
pub struct DungeonContext<'a> {
    pub world: &'a WorldGraph,
    pub requirements: &'a RequirementTable,
    pub global: &'a GlobalState,
}

/// Compiled dungeon layout with its requirements interned in the shared table.
#[derive(Clone, Debug)]
pub struct DungeonTemplate {
    pub id: DungeonId,
    pub data: DungeonData,
    entry_requirements: Vec<RequirementId>,
    connection_requirements: Vec<Vec<RequirementId>>,
    door_requirements: Vec<RequirementId>,
    item_requirements: Vec<RequirementId>,
    // Nodes to revisit when a node's accessibility changes, via connections or doors.
    outgoing: Vec<Vec<DungeonNodeId>>,
}

impl DungeonTemplate {
    pub fn build(
        id: DungeonId,
        data: &DungeonData,
        requirements: &mut RequirementTable,
        global: &GlobalState,
        world: &mut WorldGraph,
    ) -> DungeonTemplate {
        let mut intern = |req: &Requirement| {
            let req_id = requirements.intern(req, global);
            requirements.add_dependent(req_id, Dependent::Dungeon(id));
            req_id
        };
        let entry_requirements = data.entries.iter().map(|e| intern(&e.requirement)).collect();
        let connection_requirements = data
            .nodes
            .iter()
            .map(|n| n.connections.iter().map(|c| intern(&c.requirement)).collect())
            .collect();
        let door_requirements = data.key_doors.iter().map(|d| intern(&d.requirement)).collect();
        let item_requirements = data.items.iter().map(|i| intern(&i.requirement)).collect();

        for entry in &data.entries {
            world.add_dependent(entry.from, Dependent::Dungeon(id));
        }

        let mut outgoing: Vec<Vec<DungeonNodeId>> = vec![vec![]; data.nodes.len()];
        for (to, node) in data.nodes.iter().enumerate() {
            for conn in &node.connections {
                outgoing[conn.from].push(to);
            }
        }
        for door in &data.key_doors {
            outgoing[door.from].push(door.to);
        }
        for targets in &mut outgoing {
            targets.sort();
            targets.dedup();
        }

        DungeonTemplate {
            id,
            data: data.clone(),
            entry_requirements,
            connection_requirements,
            door_requirements,
            item_requirements,
            outgoing,
        }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn has_big_key_doors(&self) -> bool {
        self.data.key_doors.iter().any(|d| d.kind == KeyDoorKind::Big)
    }

    /// Small keys that exist for this dungeon under the current mode.
    pub fn total_small_keys(&self, global: &GlobalState) -> ItemCount {
        if global.mode.key_drop_shuffle {
            self.data.small_keys.saturating_add(self.data.key_drops())
        } else {
            self.data.small_keys
        }
    }

    /// Most small keys the player could ever hold here. No key layout can open more
    /// small-key doors than this.
    pub fn max_small_keys(&self, global: &GlobalState) -> ItemCount {
        if global.mode.generic_keys {
            return ItemCount::MAX;
        }
        let collected = global.keys.small_keys(self.id);
        let mut keys = collected;
        if !global.mode.key_drop_shuffle {
            keys = keys.saturating_add(self.data.key_drops());
        }
        if !global.mode.small_key_shuffle {
            keys = keys.saturating_add(self.total_small_keys(global).saturating_sub(collected));
        }
        keys
    }

    /// Small-key doors that could ever be opened: starting from the entries, every
    /// reachable door is opened until no more become reachable.
    pub fn candidate_key_doors(
        &self,
        collected: &[bool],
        cx: DungeonContext,
    ) -> ArrayVec<KeyDoorIdx, MAX_KEY_DOORS> {
        let mut working = MutableDungeon::new(self, collected, cx);
        working.big_key = true;
        loop {
            working.evaluate();
            let doors = working.get_accessible_key_doors(true);
            if doors.is_empty() {
                break;
            }
            for door in doors {
                working.key_doors[door].unlocked = true;
            }
        }
        working
            .key_doors
            .iter()
            .enumerate()
            .filter(|(_, d)| d.unlocked)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn get_dungeon_result(&self, collected: &[bool], cx: DungeonContext) -> DungeonResult {
        let candidates = self.candidate_key_doors(collected, cx);
        let big_key_options: &[bool] = if cx.global.keys.has_big_key(self.id) {
            &[true]
        } else if self.has_big_key_doors() {
            &[false, true]
        } else {
            &[false]
        };

        // Subsets of the candidates as masks over door indices, fewest doors first.
        let max_keys = self.max_small_keys(cx.global);
        let mut subsets: Vec<u32> = (0..1u32 << candidates.len())
            .filter(|bits| bits.count_ones() <= max_keys)
            .map(|bits| {
                let mut mask = 0;
                for (i, &door) in candidates.iter().enumerate() {
                    if bits & (1 << i) != 0 {
                        mask |= 1 << door;
                    }
                }
                mask
            })
            .collect();
        subsets.sort_by_key(|&mask| (mask.count_ones(), mask));

        let mut working = MutableDungeon::new(self, collected, cx);
        let mut valid_states = 0;
        let mut best: [Option<PassOutcome>; 2] = [None, None];
        for (pass, sequence_break) in [false, true].into_iter().enumerate() {
            let threshold = AccessibilityLevel::threshold(sequence_break);
            for &big_key in big_key_options {
                for &unlocked in &subsets {
                    let state = DungeonState {
                        unlocked,
                        big_key,
                        sequence_break,
                    };
                    if !working.validate_key_layout(&state) {
                        continue;
                    }
                    valid_states += 1;
                    let outcome = working.outcome(threshold);
                    if best[pass]
                        .as_ref()
                        .is_none_or(|b| outcome.score() > b.score())
                    {
                        best[pass] = Some(outcome);
                    }
                }
            }
        }
        debug!(
            "{}: {} candidate doors, {} valid states",
            self.name(),
            candidates.len(),
            valid_states
        );

        let [normal, sequence_break] = best;
        let (Some(normal), Some(sequence_break)) = (normal, sequence_break) else {
            warn!("{}: no valid key layout", self.name());
            return self.unreachable_result(collected, cx.global, valid_states);
        };

        let items: Vec<AccessibilityLevel> = (0..self.data.items.len())
            .map(|i| {
                if !self.item_active(i, cx.global) {
                    AccessibilityLevel::None
                } else {
                    combine_passes(normal.items[i], sequence_break.items[i])
                }
            })
            .collect();
        let mut result = DungeonResult {
            items,
            exits_accessible: sequence_break.exits,
            valid_states,
            ..DungeonResult::default()
        };
        for i in 0..self.data.items.len() {
            if !self.item_active(i, cx.global) || collected[i] {
                continue;
            }
            result.total += 1;
            if result.items[i].is_accessible() {
                result.accessible += 1;
            }
            if result.items[i] == AccessibilityLevel::Normal {
                result.normal_accessible += 1;
            }
        }
        result.accessibility = result.aggregate(collected);
        result
    }

    fn unreachable_result(
        &self,
        collected: &[bool],
        global: &GlobalState,
        valid_states: usize,
    ) -> DungeonResult {
        DungeonResult {
            items: vec![AccessibilityLevel::None; self.data.items.len()],
            total: (0..self.data.items.len())
                .filter(|&i| self.item_active(i, global) && !collected[i])
                .count() as ItemCount,
            valid_states,
            ..DungeonResult::default()
        }
    }

    /// Key-drop locations only hold items when key drops are shuffled.
    pub fn item_active(&self, item: DungeonItemIdx, global: &GlobalState) -> bool {
        !self.data.items[item].key_drop || global.mode.key_drop_shuffle
    }
}

fn combine_passes(
    normal: AccessibilityLevel,
    sequence_break: AccessibilityLevel,
) -> AccessibilityLevel {
    if normal == AccessibilityLevel::Normal {
        AccessibilityLevel::Normal
    } else if sequence_break.is_accessible() {
        AccessibilityLevel::SequenceBreak
    } else if normal.max(sequence_break) >= AccessibilityLevel::Inspect {
        AccessibilityLevel::Inspect
    } else {
        AccessibilityLevel::None
    }
}

/// One key-layout hypothesis.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DungeonState {
    pub unlocked: u32, // Bit i set: key door i is assumed open
    pub big_key: bool,
    pub sequence_break: bool,
}

#[derive(Clone, Debug)]
pub struct KeyDoor {
    pub dungeon: DungeonId,
    pub kind: KeyDoorKind,
    pub from: DungeonNodeId,
    pub to: DungeonNodeId,
    pub requirement: RequirementId,
    pub unlocked: bool,
}

#[derive(Clone, Debug)]
pub struct DungeonNode {
    pub keys_provided: ItemCount,
    pub accessibility: AccessibilityLevel,
}

struct PassOutcome {
    items: Vec<AccessibilityLevel>,
    reachable: ItemCount,
    exits: usize,
}

impl PassOutcome {
    fn score(&self) -> (ItemCount, usize) {
        (self.reachable, self.exits)
    }
}

/// Working copy of a dungeon for evaluating one key layout.
pub struct MutableDungeon<'a> {
    template: &'a DungeonTemplate,
    collected: &'a [bool],
    cx: DungeonContext<'a>,
    pub nodes: Vec<DungeonNode>,
    pub key_doors: Vec<KeyDoor>,
    pub big_key: bool,
}

impl<'a> MutableDungeon<'a> {
    pub fn new(
        template: &'a DungeonTemplate,
        collected: &'a [bool],
        cx: DungeonContext<'a>,
    ) -> MutableDungeon<'a> {
        MutableDungeon {
            template,
            collected,
            cx,
            nodes: template
                .data
                .nodes
                .iter()
                .map(|n| DungeonNode {
                    keys_provided: n.keys_provided,
                    accessibility: AccessibilityLevel::None,
                })
                .collect(),
            key_doors: template
                .data
                .key_doors
                .iter()
                .zip(template.door_requirements.iter())
                .map(|(d, &requirement)| KeyDoor {
                    dungeon: template.id,
                    kind: d.kind,
                    from: d.from,
                    to: d.to,
                    requirement,
                    unlocked: false,
                })
                .collect(),
            big_key: false,
        }
    }

    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.accessibility = AccessibilityLevel::None;
        }
        for door in &mut self.key_doors {
            door.unlocked = false;
        }
        self.big_key = false;
    }

    pub fn apply_state(&mut self, state: &DungeonState) {
        self.reset();
        for (i, door) in self.key_doors.iter_mut().enumerate() {
            door.unlocked = state.unlocked & (1 << i) != 0;
        }
        self.big_key = state.big_key;
    }

    fn requirement(&self, id: RequirementId) -> AccessibilityLevel {
        self.cx.requirements.accessibility(id)
    }

    fn door_passable(&self, door: &KeyDoor) -> bool {
        match door.kind {
            KeyDoorKind::Small => door.unlocked || self.cx.global.mode.generic_keys,
            KeyDoorKind::Big => self.big_key,
        }
    }

    // Accessibility of the door's far side, ignoring whether it is locked.
    fn door_accessibility(&self, door: KeyDoorIdx) -> AccessibilityLevel {
        let door = &self.key_doors[door];
        self.nodes[door.from]
            .accessibility
            .min(self.requirement(door.requirement))
    }

    fn fold_node(&self, id: DungeonNodeId) -> AccessibilityLevel {
        let data = &self.template.data;
        let mut level = AccessibilityLevel::None;
        for (entry, &req) in data.entries.iter().zip(&self.template.entry_requirements) {
            if entry.node == id {
                level = level.max(
                    self.cx
                        .world
                        .node_accessibility(entry.from)
                        .min(self.requirement(req)),
                );
            }
        }
        for (conn, &req) in data.nodes[id]
            .connections
            .iter()
            .zip(&self.template.connection_requirements[id])
        {
            level = level.max(self.nodes[conn.from].accessibility.min(self.requirement(req)));
        }
        for (i, door) in self.key_doors.iter().enumerate() {
            if door.to == id && self.door_passable(door) {
                level = level.max(self.door_accessibility(i));
            }
        }
        level
    }

    /// Computes node accessibility for the current door and big-key hypothesis.
    pub fn evaluate(&mut self) {
        for node in &mut self.nodes {
            node.accessibility = AccessibilityLevel::None;
        }
        let mut modified: BTreeSet<DungeonNodeId> = (0..self.nodes.len()).collect();
        while let Some(id) = modified.pop_first() {
            let new_level = self.fold_node(id);
            if new_level == self.nodes[id].accessibility {
                continue;
            }
            self.nodes[id].accessibility = new_level;
            modified.extend(self.template.outgoing[id].iter().copied());
        }
    }

    /// Locked small-key doors whose near side is reached at the threshold.
    pub fn get_accessible_key_doors(
        &self,
        sequence_break: bool,
    ) -> ArrayVec<KeyDoorIdx, MAX_KEY_DOORS> {
        let threshold = AccessibilityLevel::threshold(sequence_break);
        self.key_doors
            .iter()
            .enumerate()
            .filter(|(i, d)| {
                d.kind == KeyDoorKind::Small
                    && !self.door_passable(d)
                    && self.door_accessibility(*i) >= threshold
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Best-case number of small keys the player can hold with what is reachable now.
    pub fn get_available_small_keys(&self, sequence_break: bool) -> ItemCount {
        let global = self.cx.global;
        if global.mode.generic_keys {
            return ItemCount::MAX;
        }
        let threshold = AccessibilityLevel::threshold(sequence_break);
        let collected = global.keys.small_keys(self.template.id);
        let mut keys = collected;
        if !global.mode.key_drop_shuffle {
            keys = keys.saturating_add(
                self.nodes
                    .iter()
                    .filter(|n| n.accessibility >= threshold)
                    .map(|n| n.keys_provided)
                    .sum::<ItemCount>(),
            );
        }
        if !global.mode.small_key_shuffle {
            let unfound = self
                .template
                .total_small_keys(global)
                .saturating_sub(collected);
            keys = keys.saturating_add(unfound.min(self.uncollected_reachable(threshold)));
        }
        keys
    }

    pub fn item_accessibility(&self, item: DungeonItemIdx) -> AccessibilityLevel {
        let data = &self.template.data.items[item];
        self.nodes[data.node]
            .accessibility
            .min(self.requirement(self.template.item_requirements[item]))
    }

    fn uncollected_reachable(&self, threshold: AccessibilityLevel) -> ItemCount {
        (0..self.template.data.items.len())
            .filter(|&i| {
                self.template.item_active(i, self.cx.global)
                    && !self.collected[i]
                    && self.item_accessibility(i) >= threshold
            })
            .count() as ItemCount
    }

    fn exits_reachable(&self, threshold: AccessibilityLevel) -> usize {
        self.template
            .data
            .exits
            .iter()
            .filter(|&&n| self.nodes[n].accessibility >= threshold)
            .count()
    }

    /// Checks that the doors of `state` can be opened in some order with keys
    /// reachable before each door, and that a big-key assumption is plausible. On
    /// success the working copy is left evaluated under `state`.
    pub fn validate_key_layout(&mut self, state: &DungeonState) -> bool {
        self.reset();
        self.big_key = state.big_key;
        let threshold = AccessibilityLevel::threshold(state.sequence_break);
        let wanted = state.unlocked.count_ones();
        let mut opened = 0;
        loop {
            self.evaluate();
            if opened == wanted {
                break;
            }
            if self.get_available_small_keys(state.sequence_break) <= opened {
                return false;
            }
            let next = self
                .get_accessible_key_doors(state.sequence_break)
                .into_iter()
                .find(|&d| state.unlocked & (1 << d) != 0);
            match next {
                Some(door) => {
                    self.key_doors[door].unlocked = true;
                    opened += 1;
                }
                None => return false,
            }
        }

        let global = self.cx.global;
        if state.big_key && !global.keys.has_big_key(self.template.id) {
            if global.mode.big_key_shuffle {
                return false;
            }
            // The big key must come from somewhere reachable without it.
            self.big_key = false;
            self.evaluate();
            let reachable = self.uncollected_reachable(threshold);
            self.big_key = true;
            self.evaluate();
            if reachable == 0 {
                return false;
            }
        }
        true
    }

    fn outcome(&self, threshold: AccessibilityLevel) -> PassOutcome {
        PassOutcome {
            items: (0..self.template.data.items.len())
                .map(|i| self.item_accessibility(i))
                .collect(),
            reachable: self.uncollected_reachable(threshold),
            exits: self.exits_reachable(threshold),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonResult {
    pub items: Vec<AccessibilityLevel>,
    pub accessible: ItemCount,
    pub normal_accessible: ItemCount,
    pub total: ItemCount,
    pub exits_accessible: usize,
    pub valid_states: usize,
    pub accessibility: AccessibilityLevel,
}

impl DungeonResult {
    fn aggregate(&self, collected: &[bool]) -> AccessibilityLevel {
        if self.total == 0 {
            AccessibilityLevel::None
        } else if self.normal_accessible == self.total {
            AccessibilityLevel::Normal
        } else if self.accessible == self.total {
            AccessibilityLevel::SequenceBreak
        } else if self.accessible > 0 {
            AccessibilityLevel::Partial
        } else if self
            .items
            .iter()
            .zip(collected)
            .any(|(&level, &c)| !c && level == AccessibilityLevel::Inspect)
        {
            AccessibilityLevel::Inspect
        } else {
            AccessibilityLevel::None
        }
    }
}

/// A dungeon's template together with the player's collection marks and the last
/// computed result.
#[derive(Clone, Debug)]
pub struct Dungeon {
    pub template: DungeonTemplate,
    pub prize: Option<PrizeSection>,
    collected: Vec<bool>,
    result: DungeonResult,
}

impl Dungeon {
    pub fn new(template: DungeonTemplate) -> Dungeon {
        let collected = vec![false; template.data.items.len()];
        Dungeon {
            prize: template.data.prize.as_ref().map(PrizeSection::new),
            template,
            collected,
            result: DungeonResult::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.template.name()
    }

    pub fn result(&self) -> &DungeonResult {
        &self.result
    }

    pub fn is_collected(&self, item: DungeonItemIdx) -> bool {
        self.collected[item]
    }

    /// Returns whether the mark changed.
    pub fn set_collected(&mut self, item: DungeonItemIdx, collected: bool) -> bool {
        let changed = self.collected[item] != collected;
        self.collected[item] = collected;
        changed
    }

    pub fn reset(&mut self) {
        self.collected.fill(false);
        if let Some(prize) = &mut self.prize {
            prize.reset();
        }
    }

    /// Re-solves the dungeon; returns whether the result changed.
    pub fn update(&mut self, cx: DungeonContext) -> bool {
        let result = self.template.get_dungeon_result(&self.collected, cx);
        let changed = result != self.result;
        self.result = result;
        changed
    }

    /// Refreshes the prize section from the current result; returns whether it changed.
    pub fn update_prize(&mut self) -> bool {
        match &mut self.prize {
            Some(prize) => prize.update(&self.result),
            None => false,
        }
    }
}
