use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use ztrack_game::{Item, ItemCount, Mode, SequenceBreakType};
use ztrack_logic::GlobalState;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartingItem {
    pub item: Item,
    pub count: ItemCount,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SequenceBreakSetting {
    pub sequence_break: SequenceBreakType,
    pub enabled: bool,
}

/// Session configuration: randomizer mode plus what the player starts with.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    pub mode: Mode,
    pub starting_items: Vec<StartingItem>,
    pub sequence_breaks: Vec<SequenceBreakSetting>,
}

impl TrackerSettings {
    pub fn load(path: &Path) -> Result<TrackerSettings> {
        let json_str = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        serde_json::from_str(&json_str)
            .with_context(|| format!("unable to parse settings {}", path.display()))
    }

    /// Installs the starting values into `global` and resets it to them.
    pub fn apply(&self, global: &mut GlobalState) -> Result<()> {
        global.mode = self.mode.clone();
        for s in &self.starting_items {
            ensure!(
                s.count <= s.item.maximum(),
                "Starting count {} for {:?} exceeds its maximum {}",
                s.count,
                s.item,
                s.item.maximum()
            );
            global.inventory.set_starting(s.item, s.count);
        }
        for s in &self.sequence_breaks {
            global
                .sequence_breaks
                .set_starting(s.sequence_break, s.enabled);
        }
        global.reset();
        Ok(())
    }
}
