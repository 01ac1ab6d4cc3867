//! Shared, cached requirement values.
//!
//! Every distinct requirement is interned once and shared by all connections that
//! use it. Composite requirements are interned after their children, so ascending
//! id order is a topological order of the requirement DAG and a single ascending
//! sweep over dirty entries brings every cached value up to date.

use hashbrown::HashMap;
use strum::VariantNames;
use ztrack_game::{
    AccessibilityLevel, ConnectionIdx, DungeonId, Item, ModeField, NUM_MODE_FIELDS, Requirement,
    SectionId, SequenceBreakType,
};
use ztrack_logic::GlobalState;

pub type RequirementId = usize;

/// Something whose value is derived from a requirement or node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependent {
    Requirement(RequirementId),
    Connection(ConnectionIdx),
    Dungeon(DungeonId),
    Section(SectionId),
}

#[derive(Clone, Debug)]
enum RequirementKind {
    Leaf(Requirement),
    And(Vec<RequirementId>),
    Or(Vec<RequirementId>),
}

#[derive(Clone, Debug)]
struct RequirementEntry {
    kind: RequirementKind,
    accessibility: AccessibilityLevel,
    dependents: Vec<Dependent>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RequirementChange {
    pub id: RequirementId,
    pub old: AccessibilityLevel,
    pub new: AccessibilityLevel,
}

#[derive(Clone, Debug, Default)]
pub struct RequirementSweep {
    pub changes: Vec<RequirementChange>,
    // Non-requirement dependents of changed entries, sorted and deduplicated.
    pub dependents: Vec<Dependent>,
}

impl RequirementSweep {
    pub fn any_decrease(&self) -> bool {
        self.changes.iter().any(|c| c.new < c.old)
    }
}

#[derive(Clone, Debug)]
pub struct RequirementTable {
    entries: Vec<RequirementEntry>,
    id_by_requirement: HashMap<Requirement, RequirementId>,
    by_item: Vec<Vec<RequirementId>>,
    by_sequence_break: Vec<Vec<RequirementId>>,
    by_mode_field: Vec<Vec<RequirementId>>,
    dirty: Vec<bool>,
    first_dirty: usize,
}

impl Default for RequirementTable {
    fn default() -> Self {
        RequirementTable::new()
    }
}

impl RequirementTable {
    pub fn new() -> Self {
        RequirementTable {
            entries: vec![],
            id_by_requirement: HashMap::new(),
            by_item: vec![vec![]; Item::VARIANTS.len()],
            by_sequence_break: vec![vec![]; SequenceBreakType::VARIANTS.len()],
            by_mode_field: vec![vec![]; NUM_MODE_FIELDS],
            dirty: vec![],
            first_dirty: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the shared id of a requirement, creating (and evaluating) it on first use.
    pub fn intern(&mut self, req: &Requirement, global: &GlobalState) -> RequirementId {
        if let Some(&id) = self.id_by_requirement.get(req) {
            return id;
        }
        let kind = match req {
            Requirement::And(reqs) => {
                RequirementKind::And(reqs.iter().map(|r| self.intern(r, global)).collect())
            }
            Requirement::Or(reqs) => {
                RequirementKind::Or(reqs.iter().map(|r| self.intern(r, global)).collect())
            }
            leaf => RequirementKind::Leaf(leaf.clone()),
        };
        let id = self.entries.len();
        match &kind {
            RequirementKind::Leaf(Requirement::Item { item, .. })
            | RequirementKind::Leaf(Requirement::ItemTiers { item, .. }) => {
                self.by_item[*item as usize].push(id);
            }
            RequirementKind::Leaf(Requirement::SequenceBreak(sb)) => {
                self.by_sequence_break[*sb as usize].push(id);
            }
            RequirementKind::Leaf(Requirement::Mode(mode_req)) => {
                self.by_mode_field[mode_req.field() as usize].push(id);
            }
            RequirementKind::And(children) | RequirementKind::Or(children) => {
                // Every child is subscribed, even ones an evaluation would short-circuit past.
                for &child in children {
                    self.add_dependent(child, Dependent::Requirement(id));
                }
            }
            RequirementKind::Leaf(_) => {}
        }
        self.entries.push(RequirementEntry {
            kind,
            accessibility: AccessibilityLevel::None,
            dependents: vec![],
        });
        self.dirty.push(false);
        self.entries[id].accessibility = self.compute(id, global);
        self.id_by_requirement.insert(req.clone(), id);
        id
    }

    pub fn add_dependent(&mut self, id: RequirementId, dependent: Dependent) {
        let dependents = &mut self.entries[id].dependents;
        if !dependents.contains(&dependent) {
            dependents.push(dependent);
        }
    }

    pub fn accessibility(&self, id: RequirementId) -> AccessibilityLevel {
        self.entries[id].accessibility
    }

    pub fn id(&self, req: &Requirement) -> Option<RequirementId> {
        self.id_by_requirement.get(req).copied()
    }

    fn compute(&self, id: RequirementId, global: &GlobalState) -> AccessibilityLevel {
        match &self.entries[id].kind {
            RequirementKind::Leaf(req) => global.evaluate(req),
            RequirementKind::And(children) => {
                let mut level = AccessibilityLevel::Normal;
                for &child in children {
                    level = level.min(self.entries[child].accessibility);
                    if level == AccessibilityLevel::None {
                        break;
                    }
                }
                level
            }
            RequirementKind::Or(children) => {
                let mut level = AccessibilityLevel::None;
                for &child in children {
                    level = level.max(self.entries[child].accessibility);
                    if level == AccessibilityLevel::Normal {
                        break;
                    }
                }
                level
            }
        }
    }

    fn mark(&mut self, id: RequirementId) {
        self.dirty[id] = true;
        self.first_dirty = self.first_dirty.min(id);
    }

    pub fn mark_item(&mut self, item: Item) {
        for i in 0..self.by_item[item as usize].len() {
            self.mark(self.by_item[item as usize][i]);
        }
    }

    pub fn mark_sequence_break(&mut self, sequence_break: SequenceBreakType) {
        for i in 0..self.by_sequence_break[sequence_break as usize].len() {
            self.mark(self.by_sequence_break[sequence_break as usize][i]);
        }
    }

    pub fn mark_mode_field(&mut self, field: ModeField) {
        for i in 0..self.by_mode_field[field as usize].len() {
            self.mark(self.by_mode_field[field as usize][i]);
        }
    }

    pub fn mark_all(&mut self) {
        self.dirty.fill(true);
        self.first_dirty = 0;
    }

    /// Recomputes every dirty entry in topological order, marking parents of
    /// changed entries as it goes.
    pub fn sweep(&mut self, global: &GlobalState) -> RequirementSweep {
        let mut sweep = RequirementSweep::default();
        for id in self.first_dirty..self.entries.len() {
            if !self.dirty[id] {
                continue;
            }
            self.dirty[id] = false;
            let old = self.entries[id].accessibility;
            let new = self.compute(id, global);
            if old == new {
                continue;
            }
            self.entries[id].accessibility = new;
            sweep.changes.push(RequirementChange { id, old, new });
            for i in 0..self.entries[id].dependents.len() {
                match self.entries[id].dependents[i] {
                    Dependent::Requirement(parent) => {
                        debug_assert!(parent > id);
                        self.dirty[parent] = true;
                    }
                    dependent => sweep.dependents.push(dependent),
                }
            }
        }
        self.first_dirty = self.entries.len();
        sweep.dependents.sort();
        sweep.dependents.dedup();
        sweep
    }

    pub fn evaluate_all(&mut self, global: &GlobalState) -> RequirementSweep {
        self.mark_all();
        self.sweep(global)
    }
}
