use serde::Serialize;
use ztrack_game::{AccessibilityLevel, DungeonItemIdx, Item, ItemCount, PrizeData};

use crate::dungeon::DungeonResult;

/// The boss/prize section at the end of a dungeon. Clearing it hands the player the
/// prize placed there (a pendant or crystal); un-clearing takes it back.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeSection {
    #[serde(skip)]
    pub location: DungeonItemIdx,
    pub always_clearable: bool,
    #[serde(skip)]
    starting_prize: Option<Item>,
    prize: Option<Item>,
    available: ItemCount,
    accessibility: AccessibilityLevel,
}

impl PrizeSection {
    pub fn new(data: &PrizeData) -> PrizeSection {
        PrizeSection {
            location: data.location,
            always_clearable: data.always_clearable,
            starting_prize: data.prize,
            prize: data.prize,
            available: 1,
            accessibility: AccessibilityLevel::None,
        }
    }

    pub fn prize(&self) -> Option<Item> {
        self.prize
    }

    /// Returns whether the placement changed. Moving the prize item in the inventory
    /// is left to the caller.
    pub fn set_prize(&mut self, prize: Option<Item>) -> bool {
        let changed = self.prize != prize;
        self.prize = prize;
        changed
    }

    pub fn available(&self) -> ItemCount {
        self.available
    }

    pub fn is_cleared(&self) -> bool {
        self.available == 0
    }

    /// Returns whether the count changed. The section holds a single prize, so counts
    /// above one are clamped.
    pub fn set_available(&mut self, available: ItemCount) -> bool {
        let available = available.min(1);
        let changed = self.available != available;
        self.available = available;
        changed
    }

    pub fn accessibility(&self) -> AccessibilityLevel {
        self.accessibility
    }

    /// Whether the player may mark the section cleared. `force` ignores the logic.
    pub fn can_be_cleared(&self, force: bool) -> bool {
        !self.is_cleared()
            && (force || self.always_clearable || self.accessibility.is_accessible())
    }

    pub fn reset(&mut self) {
        self.available = 1;
        self.prize = self.starting_prize;
    }

    /// Takes the accessibility of the prize location from a fresh dungeon result.
    /// Returns whether it changed.
    pub fn update(&mut self, result: &DungeonResult) -> bool {
        let accessibility = if self.is_cleared() {
            AccessibilityLevel::None
        } else {
            result.items[self.location]
        };
        let changed = self.accessibility != accessibility;
        self.accessibility = accessibility;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(boss: AccessibilityLevel) -> DungeonResult {
        DungeonResult {
            items: vec![AccessibilityLevel::Normal, boss],
            ..DungeonResult::default()
        }
    }

    #[test]
    fn test_prize_section() {
        let mut section = PrizeSection::new(&PrizeData {
            location: 1,
            prize: Some(Item::Crystal),
            always_clearable: false,
        });
        assert!(!section.can_be_cleared(false));
        assert!(section.can_be_cleared(true));

        assert!(section.update(&result(AccessibilityLevel::SequenceBreak)));
        assert_eq!(section.accessibility(), AccessibilityLevel::SequenceBreak);
        assert!(section.can_be_cleared(false));

        assert!(section.set_available(0));
        assert!(section.update(&result(AccessibilityLevel::Normal)));
        assert_eq!(section.accessibility(), AccessibilityLevel::None);
        assert!(!section.can_be_cleared(true));

        assert!(section.set_prize(Some(Item::Pendant)));
        assert!(!section.set_prize(Some(Item::Pendant)));
        section.reset();
        assert_eq!(section.prize(), Some(Item::Crystal));
        assert!(!section.set_available(5));
        assert_eq!(section.available(), 1);
    }

    #[test]
    fn test_always_clearable() {
        let section = PrizeSection::new(&PrizeData {
            location: 0,
            prize: None,
            always_clearable: true,
        });
        assert_eq!(section.accessibility(), AccessibilityLevel::None);
        assert!(section.can_be_cleared(false));
    }
}
