pub mod helpers;

use serde::{Deserialize, Serialize};
use strum::VariantNames;
use ztrack_game::{
    AccessibilityLevel, DungeonId, Item, ItemCount, Mode, Requirement, SequenceBreakType,
};

use crate::helpers::tier_level;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub counts: Vec<ItemCount>,
    pub starting: Vec<ItemCount>,
}

impl Default for Inventory {
    fn default() -> Self {
        Inventory::new()
    }
}

impl Inventory {
    pub fn new() -> Self {
        Inventory {
            counts: vec![0; Item::VARIANTS.len()],
            starting: vec![0; Item::VARIANTS.len()],
        }
    }

    pub fn count(&self, item: Item) -> ItemCount {
        self.counts[item as usize]
    }

    /// Sets the count, clamped to the item maximum. Returns whether it changed.
    pub fn set(&mut self, item: Item, count: ItemCount) -> bool {
        let count = count.min(item.maximum());
        let changed = self.counts[item as usize] != count;
        self.counts[item as usize] = count;
        changed
    }

    pub fn can_add(&self, item: Item) -> bool {
        self.count(item) < item.maximum()
    }

    /// Counts one more of the item, wrapping back to zero past the maximum.
    pub fn add(&mut self, item: Item) -> ItemCount {
        let new_count = if self.can_add(item) {
            self.count(item) + 1
        } else {
            0
        };
        self.counts[item as usize] = new_count;
        new_count
    }

    /// Counts one less of the item, wrapping to the maximum below zero.
    pub fn remove(&mut self, item: Item) -> ItemCount {
        let new_count = match self.count(item) {
            0 => item.maximum(),
            c => c - 1,
        };
        self.counts[item as usize] = new_count;
        new_count
    }

    pub fn set_starting(&mut self, item: Item, count: ItemCount) {
        self.starting[item as usize] = count.min(item.maximum());
    }

    pub fn reset(&mut self) {
        self.counts.clone_from(&self.starting);
    }
}

/// Small and big keys the player has found, per dungeon.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    pub small_keys: Vec<ItemCount>,
    pub big_keys: Vec<bool>,
}

impl KeyState {
    pub fn new(num_dungeons: usize) -> Self {
        KeyState {
            small_keys: vec![0; num_dungeons],
            big_keys: vec![false; num_dungeons],
        }
    }

    pub fn reset(&mut self) {
        self.small_keys.fill(0);
        self.big_keys.fill(false);
    }

    pub fn small_keys(&self, dungeon: DungeonId) -> ItemCount {
        self.small_keys[dungeon]
    }

    pub fn has_big_key(&self, dungeon: DungeonId) -> bool {
        self.big_keys[dungeon]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceBreaks {
    pub enabled: Vec<bool>,
    pub starting: Vec<bool>,
}

impl Default for SequenceBreaks {
    fn default() -> Self {
        SequenceBreaks::new()
    }
}

impl SequenceBreaks {
    pub fn new() -> Self {
        use strum::IntoEnumIterator;
        let starting: Vec<bool> = SequenceBreakType::iter()
            .map(|sb| sb.starting_enabled())
            .collect();
        SequenceBreaks {
            enabled: starting.clone(),
            starting,
        }
    }

    pub fn is_enabled(&self, sequence_break: SequenceBreakType) -> bool {
        self.enabled[sequence_break as usize]
    }

    /// Returns whether the flag changed.
    pub fn set(&mut self, sequence_break: SequenceBreakType, enabled: bool) -> bool {
        let changed = self.enabled[sequence_break as usize] != enabled;
        self.enabled[sequence_break as usize] = enabled;
        changed
    }

    pub fn set_starting(&mut self, sequence_break: SequenceBreakType, enabled: bool) {
        self.starting[sequence_break as usize] = enabled;
    }

    pub fn reset(&mut self) {
        self.enabled.clone_from(&self.starting);
    }
}

#[derive(Clone, Debug, Default)]
pub struct GlobalState {
    pub inventory: Inventory,
    pub keys: KeyState,
    pub mode: Mode,
    pub sequence_breaks: SequenceBreaks,
}

impl GlobalState {
    pub fn new(num_dungeons: usize, mode: Mode) -> Self {
        GlobalState {
            inventory: Inventory::new(),
            keys: KeyState::new(num_dungeons),
            mode,
            sequence_breaks: SequenceBreaks::new(),
        }
    }

    /// Restores items, keys and sequence breaks to their starting values. The mode is
    /// configuration and is kept.
    pub fn reset(&mut self) {
        self.inventory.reset();
        self.keys.reset();
        self.sequence_breaks.reset();
    }

    /// Evaluates a requirement directly against the current state, without caching.
    pub fn evaluate(&self, req: &Requirement) -> AccessibilityLevel {
        match req {
            Requirement::Free => AccessibilityLevel::Normal,
            Requirement::Never => AccessibilityLevel::None,
            Requirement::Level(level) => *level,
            Requirement::Item { item, count } => {
                if self.inventory.count(*item) >= *count {
                    AccessibilityLevel::Normal
                } else {
                    AccessibilityLevel::None
                }
            }
            Requirement::ItemTiers { item, tiers } => {
                tier_level(self.inventory.count(*item), tiers)
            }
            Requirement::Mode(mode_req) => {
                if mode_req.is_met(&self.mode) {
                    AccessibilityLevel::Normal
                } else {
                    AccessibilityLevel::None
                }
            }
            Requirement::SequenceBreak(sb) => {
                if self.sequence_breaks.is_enabled(*sb) {
                    AccessibilityLevel::SequenceBreak
                } else {
                    AccessibilityLevel::None
                }
            }
            Requirement::And(reqs) => {
                let mut level = AccessibilityLevel::Normal;
                for r in reqs {
                    level = level.min(self.evaluate(r));
                    if level == AccessibilityLevel::None {
                        break;
                    }
                }
                level
            }
            Requirement::Or(reqs) => {
                let mut level = AccessibilityLevel::None;
                for r in reqs {
                    level = level.max(self.evaluate(r));
                    if level == AccessibilityLevel::Normal {
                        break;
                    }
                }
                level
            }
        }
    }
}
