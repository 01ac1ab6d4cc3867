// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod graph_data;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::borrow::ToOwned;
use std::hash::Hash;
use strum_macros::{EnumIter, EnumString, VariantNames};

pub use graph_data::{
    ConnectionData, ConnectionDecl, DungeonConnectionData, DungeonData, DungeonDecl,
    DungeonEntryData, DungeonEntryDecl, DungeonItemData, DungeonItemDecl, DungeonNodeData,
    DungeonNodeDecl, GameData, GameDataDecl, KeyDoorData, KeyDoorDecl, KeyDoorKind, NodeData,
    NodeDecl, PrizeData, PrizeDecl, SectionData, SectionDecl,
};

pub type NodeId = usize; // Index into GameData.node_isv.keys: named regions of the world graph
pub type ConnectionIdx = usize; // Index into the flattened list of world connections (incoming edges, in node order)
pub type DungeonId = usize; // Index into GameData.dungeons
pub type DungeonNodeId = usize; // Index into DungeonData.node_isv.keys (only unique within a dungeon)
pub type KeyDoorIdx = usize; // Index into DungeonData.key_doors (only unique within a dungeon)
pub type DungeonItemIdx = usize; // Index into DungeonData.items (only unique within a dungeon)
pub type SectionId = usize; // Index into GameData.sections
pub type ItemCount = u32; // Data type used for item, key and section counts

// Upper bound on key doors per dungeon; the solver enumerates subsets of them.
pub const MAX_KEY_DOORS: usize = 12;

#[derive(Default, Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), self.keys.len());
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// How reachable a node, connection or section is.
///
/// The declaration order is the lattice order. Alternative paths combine with
/// `max`, requirements along one path combine with `min`.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
pub enum AccessibilityLevel {
    #[default]
    None,
    Inspect,
    SequenceBreak,
    Partial,
    Normal,
}

impl AccessibilityLevel {
    /// Whether the player can actually get there, possibly by using a sequence break.
    pub fn is_accessible(self) -> bool {
        self >= AccessibilityLevel::SequenceBreak
    }

    /// The lowest level counted as reached when sequence breaks are (or are not) allowed.
    pub fn threshold(sequence_break: bool) -> AccessibilityLevel {
        if sequence_break {
            AccessibilityLevel::SequenceBreak
        } else {
            AccessibilityLevel::Normal
        }
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    EnumIter,
    VariantNames,
    Serialize,
    Deserialize,
    PartialOrd,
    Ord,
)]
#[repr(usize)]
pub enum Item {
    Sword,
    Shield,
    Mail,
    Bow,
    SilverArrows,
    Boomerang,
    RedBoomerang,
    Hookshot,
    Bomb,
    BigBomb,
    Powder,
    Mushroom,
    FireRod,
    IceRod,
    Bombos,
    Ether,
    Quake,
    Lamp,
    Hammer,
    Shovel,
    Flute,
    FluteActivated,
    Net,
    Book,
    Bottle,
    CaneOfSomaria,
    CaneOfByrna,
    Cape,
    Mirror,
    Gloves,
    Boots,
    Flippers,
    MoonPearl,
    HalfMagic,
    Aga1,
    Aga2,
    Pendant,
    GreenPendant,
    Crystal,
    RedCrystal,
}

impl Item {
    /// Largest count the item can reach; counting past it wraps to zero.
    pub fn maximum(self) -> ItemCount {
        match self {
            Item::Sword => 4,
            Item::Shield => 3,
            Item::Mail => 2,
            Item::Gloves => 2,
            Item::Bottle => 4,
            Item::Pendant => 2,
            Item::Crystal => 5,
            Item::RedCrystal => 2,
            _ => 1,
        }
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    EnumIter,
    VariantNames,
    Serialize,
    Deserialize,
    PartialOrd,
    Ord,
)]
#[repr(usize)]
pub enum SequenceBreakType {
    BlindPedestal,
    BonkOverLedge,
    BumperCaveHookshot,
    TRLaserSkip,
    HelmasaurKingBasic,
    LanmolasBombs,
    ArrghusBasic,
    MothulaBasic,
    KholdstareBasic,
    VitreousBasic,
    TrinexxBasic,
    BombDuplicationAncillaOverload,
    BombDuplicationMirror,
    BombJumpPoDHammerJump,
    BombJumpSWBigChest,
    BombJumpIPBJ,
    BombJumpIPHookshotGap,
    BombJumpIPFreezorRoomGap,
    DarkRoomDeathMountainEntry,
    DarkRoomDeathMountainExit,
    DarkRoomHC,
    DarkRoomAT,
    DarkRoomEPRight,
    DarkRoomEPBack,
    DarkRoomPoDDarkBasement,
    DarkRoomPoDDarkMaze,
    DarkRoomPoDEnemyRoom,
    DarkRoomMMBridge,
    DarkRoomMMBigChest,
    DarkRoomTR,
    FakeFlippersFairyRevival,
    FakeFlippersQirnJump,
    FakeFlippersScreenTransition,
    FakeFlippersSplashDeletion,
    WaterWalk,
    WaterWalkFromWaterfallCave,
    SuperBunnyFallInHole,
    SuperBunnyMirror,
    DungeonRevive,
    FakeFlute,
    Hover,
    SpikeCave,
    LanmolasNoWeapon,
}

impl SequenceBreakType {
    /// Whether the break is enabled on a fresh session.
    pub fn starting_enabled(self) -> bool {
        !matches!(
            self,
            SequenceBreakType::BombDuplicationAncillaOverload
                | SequenceBreakType::BombDuplicationMirror
                | SequenceBreakType::FakeFlute
                | SequenceBreakType::Hover
                | SequenceBreakType::LanmolasNoWeapon
        )
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemPlacement {
    Basic,
    #[default]
    Advanced,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorldState {
    #[default]
    StandardOpen,
    Inverted,
}

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum EntranceShuffle {
    #[default]
    None,
    Dungeon,
    All,
    Insanity,
}

/// Randomizer configuration the logic depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Mode {
    pub item_placement: ItemPlacement,
    pub world_state: WorldState,
    pub entrance_shuffle: EntranceShuffle,
    pub map_shuffle: bool,
    pub compass_shuffle: bool,
    pub small_key_shuffle: bool,
    pub big_key_shuffle: bool,
    pub key_drop_shuffle: bool,
    pub generic_keys: bool,
    pub boss_shuffle: bool,
    pub enemy_shuffle: bool,
    pub guaranteed_boss_items: bool,
    pub shop_shuffle: bool,
    pub take_any_locations: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum ModeField {
    ItemPlacement,
    WorldState,
    EntranceShuffle,
    MapShuffle,
    CompassShuffle,
    SmallKeyShuffle,
    BigKeyShuffle,
    KeyDropShuffle,
    GenericKeys,
    BossShuffle,
    EnemyShuffle,
    GuaranteedBossItems,
    ShopShuffle,
    TakeAnyLocations,
}

pub const NUM_MODE_FIELDS: usize = 14;

impl Mode {
    pub fn changed_fields(&self, other: &Mode) -> Vec<ModeField> {
        let mut out = vec![];
        if self.item_placement != other.item_placement {
            out.push(ModeField::ItemPlacement);
        }
        if self.world_state != other.world_state {
            out.push(ModeField::WorldState);
        }
        if self.entrance_shuffle != other.entrance_shuffle {
            out.push(ModeField::EntranceShuffle);
        }
        if self.map_shuffle != other.map_shuffle {
            out.push(ModeField::MapShuffle);
        }
        if self.compass_shuffle != other.compass_shuffle {
            out.push(ModeField::CompassShuffle);
        }
        if self.small_key_shuffle != other.small_key_shuffle {
            out.push(ModeField::SmallKeyShuffle);
        }
        if self.big_key_shuffle != other.big_key_shuffle {
            out.push(ModeField::BigKeyShuffle);
        }
        if self.key_drop_shuffle != other.key_drop_shuffle {
            out.push(ModeField::KeyDropShuffle);
        }
        if self.generic_keys != other.generic_keys {
            out.push(ModeField::GenericKeys);
        }
        if self.boss_shuffle != other.boss_shuffle {
            out.push(ModeField::BossShuffle);
        }
        if self.enemy_shuffle != other.enemy_shuffle {
            out.push(ModeField::EnemyShuffle);
        }
        if self.guaranteed_boss_items != other.guaranteed_boss_items {
            out.push(ModeField::GuaranteedBossItems);
        }
        if self.shop_shuffle != other.shop_shuffle {
            out.push(ModeField::ShopShuffle);
        }
        if self.take_any_locations != other.take_any_locations {
            out.push(ModeField::TakeAnyLocations);
        }
        out
    }
}

/// A single mode field compared against an expected value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModeRequirement {
    ItemPlacement(ItemPlacement),
    WorldState(WorldState),
    EntranceShuffle(EntranceShuffle),
    // Met when entrance shuffle is at least as permissive as the given value.
    EntranceShuffleAtLeast(EntranceShuffle),
    MapShuffle(bool),
    CompassShuffle(bool),
    SmallKeyShuffle(bool),
    BigKeyShuffle(bool),
    KeyDropShuffle(bool),
    GenericKeys(bool),
    BossShuffle(bool),
    EnemyShuffle(bool),
    GuaranteedBossItems(bool),
    ShopShuffle(bool),
    TakeAnyLocations(bool),
}

impl ModeRequirement {
    pub fn field(&self) -> ModeField {
        match self {
            ModeRequirement::ItemPlacement(_) => ModeField::ItemPlacement,
            ModeRequirement::WorldState(_) => ModeField::WorldState,
            ModeRequirement::EntranceShuffle(_) => ModeField::EntranceShuffle,
            ModeRequirement::EntranceShuffleAtLeast(_) => ModeField::EntranceShuffle,
            ModeRequirement::MapShuffle(_) => ModeField::MapShuffle,
            ModeRequirement::CompassShuffle(_) => ModeField::CompassShuffle,
            ModeRequirement::SmallKeyShuffle(_) => ModeField::SmallKeyShuffle,
            ModeRequirement::BigKeyShuffle(_) => ModeField::BigKeyShuffle,
            ModeRequirement::KeyDropShuffle(_) => ModeField::KeyDropShuffle,
            ModeRequirement::GenericKeys(_) => ModeField::GenericKeys,
            ModeRequirement::BossShuffle(_) => ModeField::BossShuffle,
            ModeRequirement::EnemyShuffle(_) => ModeField::EnemyShuffle,
            ModeRequirement::GuaranteedBossItems(_) => ModeField::GuaranteedBossItems,
            ModeRequirement::ShopShuffle(_) => ModeField::ShopShuffle,
            ModeRequirement::TakeAnyLocations(_) => ModeField::TakeAnyLocations,
        }
    }

    pub fn is_met(&self, mode: &Mode) -> bool {
        match *self {
            ModeRequirement::ItemPlacement(x) => mode.item_placement == x,
            ModeRequirement::WorldState(x) => mode.world_state == x,
            ModeRequirement::EntranceShuffle(x) => mode.entrance_shuffle == x,
            ModeRequirement::EntranceShuffleAtLeast(x) => mode.entrance_shuffle >= x,
            ModeRequirement::MapShuffle(x) => mode.map_shuffle == x,
            ModeRequirement::CompassShuffle(x) => mode.compass_shuffle == x,
            ModeRequirement::SmallKeyShuffle(x) => mode.small_key_shuffle == x,
            ModeRequirement::BigKeyShuffle(x) => mode.big_key_shuffle == x,
            ModeRequirement::KeyDropShuffle(x) => mode.key_drop_shuffle == x,
            ModeRequirement::GenericKeys(x) => mode.generic_keys == x,
            ModeRequirement::BossShuffle(x) => mode.boss_shuffle == x,
            ModeRequirement::EnemyShuffle(x) => mode.enemy_shuffle == x,
            ModeRequirement::GuaranteedBossItems(x) => mode.guaranteed_boss_items == x,
            ModeRequirement::ShopShuffle(x) => mode.shop_shuffle == x,
            ModeRequirement::TakeAnyLocations(x) => mode.take_any_locations == x,
        }
    }
}

fn default_item_count() -> ItemCount {
    1
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Requirement {
    #[default]
    Free,
    Never,
    Level(AccessibilityLevel),
    Item {
        item: Item,
        #[serde(default = "default_item_count")]
        count: ItemCount,
    },
    // Thresholds in increasing count order; the highest one met gives the level.
    ItemTiers {
        item: Item,
        tiers: Vec<(ItemCount, AccessibilityLevel)>,
    },
    Mode(ModeRequirement),
    SequenceBreak(SequenceBreakType),
    And(Vec<Requirement>),
    Or(Vec<Requirement>),
}

impl Requirement {
    pub fn item(item: Item) -> Requirement {
        Requirement::Item { item, count: 1 }
    }

    pub fn item_count(item: Item, count: ItemCount) -> Requirement {
        if count == 0 {
            Requirement::Free
        } else {
            Requirement::Item { item, count }
        }
    }

    pub fn make_and(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            match req {
                Requirement::Never | Requirement::Level(AccessibilityLevel::None) => {
                    return Requirement::Never;
                }
                Requirement::Free | Requirement::Level(AccessibilityLevel::Normal) => continue,
                Requirement::And(and_reqs) => out_reqs.extend(and_reqs),
                _ => out_reqs.push(req),
            }
        }
        if out_reqs.is_empty() {
            Requirement::Free
        } else if out_reqs.len() == 1 {
            out_reqs.swap_remove(0)
        } else {
            Requirement::And(out_reqs)
        }
    }

    pub fn make_or(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            match req {
                Requirement::Never | Requirement::Level(AccessibilityLevel::None) => continue,
                Requirement::Free | Requirement::Level(AccessibilityLevel::Normal) => {
                    return Requirement::Free;
                }
                Requirement::Or(or_reqs) => out_reqs.extend(or_reqs),
                _ => out_reqs.push(req),
            }
        }
        if out_reqs.is_empty() {
            Requirement::Never
        } else if out_reqs.len() == 1 {
            out_reqs.swap_remove(0)
        } else {
            Requirement::Or(out_reqs)
        }
    }

    /// Rebuilds nested AND/OR through `make_and`/`make_or`, so that structurally
    /// equivalent requirements share one representation.
    pub fn normalize(self) -> Requirement {
        match self {
            Requirement::And(reqs) => {
                Requirement::make_and(reqs.into_iter().map(Requirement::normalize).collect())
            }
            Requirement::Or(reqs) => {
                Requirement::make_or(reqs.into_iter().map(Requirement::normalize).collect())
            }
            Requirement::Level(AccessibilityLevel::Normal) => Requirement::Free,
            Requirement::Level(AccessibilityLevel::None) => Requirement::Never,
            Requirement::Item { count: 0, .. } => Requirement::Free,
            req => req,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_level_order() {
        use AccessibilityLevel::*;
        assert!(None < Inspect);
        assert!(Inspect < SequenceBreak);
        assert!(SequenceBreak < Partial);
        assert!(Partial < Normal);
        assert_eq!(Normal.min(SequenceBreak), SequenceBreak);
        assert_eq!(None.max(Inspect), Inspect);
        assert!(!Inspect.is_accessible());
        assert!(SequenceBreak.is_accessible());
    }

    #[test]
    fn test_make_and_or() {
        let sword = Requirement::item(Item::Sword);
        assert_eq!(
            Requirement::make_and(vec![Requirement::Free, sword.clone()]),
            sword
        );
        assert_eq!(
            Requirement::make_and(vec![sword.clone(), Requirement::Never]),
            Requirement::Never
        );
        assert_eq!(
            Requirement::make_or(vec![sword.clone(), Requirement::Free]),
            Requirement::Free
        );
        assert_eq!(
            Requirement::make_or(vec![Requirement::Never, sword.clone()]),
            sword
        );
        let nested = Requirement::And(vec![
            Requirement::And(vec![sword.clone(), Requirement::item(Item::Lamp)]),
            Requirement::Level(AccessibilityLevel::Normal),
        ]);
        assert_eq!(
            nested.normalize(),
            Requirement::And(vec![sword, Requirement::item(Item::Lamp)])
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(Item::from_str("MoonPearl").unwrap(), Item::MoonPearl);
        assert_eq!(
            SequenceBreakType::from_str("WaterWalk").unwrap(),
            SequenceBreakType::WaterWalk
        );
        assert!(Item::from_str("Triforce").is_err());
    }

    #[test]
    fn test_requirement_json() {
        let req: Requirement = serde_json::from_str(
            r#"{"and": [{"item": {"item": "Gloves", "count": 2}}, {"mode": {"worldState": "Inverted"}}, {"sequenceBreak": "WaterWalk"}, "free"]}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Requirement::And(vec![
                Requirement::item_count(Item::Gloves, 2),
                Requirement::Mode(ModeRequirement::WorldState(WorldState::Inverted)),
                Requirement::SequenceBreak(SequenceBreakType::WaterWalk),
                Requirement::Free,
            ])
        );
        let req: Requirement = serde_json::from_str(r#"{"item": {"item": "Lamp"}}"#).unwrap();
        assert_eq!(req, Requirement::item(Item::Lamp));
    }

    #[test]
    fn test_mode_fields() {
        let a = Mode::default();
        let mut b = a.clone();
        assert!(a.changed_fields(&b).is_empty());
        b.world_state = WorldState::Inverted;
        b.small_key_shuffle = true;
        assert_eq!(
            a.changed_fields(&b),
            vec![ModeField::WorldState, ModeField::SmallKeyShuffle]
        );
        let req = ModeRequirement::EntranceShuffleAtLeast(EntranceShuffle::Dungeon);
        assert!(!req.is_met(&a));
        b.entrance_shuffle = EntranceShuffle::All;
        assert!(req.is_met(&b));
        assert_eq!(req.field(), ModeField::EntranceShuffle);
    }
}
