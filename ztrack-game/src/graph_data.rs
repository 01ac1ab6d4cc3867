//! Declarations of the world graph, dungeons and sections, and their compiled form.
//!
//! Declarations refer to nodes by name and may reference nodes declared later in the
//! file. `GameData::from_decl` resolves them in two passes: every node identity is
//! registered first, then connections are wired against the complete registry.

use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    DungeonId, DungeonItemIdx, DungeonNodeId, IndexedVec, Item, ItemCount, KeyDoorIdx,
    MAX_KEY_DOORS, NodeId, Requirement,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDataDecl {
    pub nodes: Vec<NodeDecl>,
    #[serde(default)]
    pub dungeons: Vec<DungeonDecl>,
    #[serde(default)]
    pub sections: Vec<SectionDecl>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDecl {
    pub name: String,
    #[serde(default)]
    pub always_accessible: bool,
    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDecl {
    pub from: String,
    #[serde(default)]
    pub requirement: Requirement,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonDecl {
    pub name: String,
    // Small keys placed among the dungeon's item locations (key drops excluded).
    #[serde(default)]
    pub small_keys: ItemCount,
    #[serde(default)]
    pub big_key: bool,
    pub entries: Vec<DungeonEntryDecl>,
    pub nodes: Vec<DungeonNodeDecl>,
    #[serde(default)]
    pub key_doors: Vec<KeyDoorDecl>,
    #[serde(default)]
    pub items: Vec<DungeonItemDecl>,
    #[serde(default)]
    pub exits: Vec<String>,
    #[serde(default)]
    pub prize: Option<PrizeDecl>,
}

/// The boss/prize section at the end of a dungeon.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeDecl {
    // Dungeon item whose accessibility the section takes (usually the boss).
    pub location: String,
    // Prize placed at the start of a session, if known.
    #[serde(default)]
    pub prize: Option<Item>,
    #[serde(default)]
    pub always_clearable: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonEntryDecl {
    // Dungeon node entered.
    pub node: String,
    // World node the entry is reached from.
    pub from: String,
    #[serde(default)]
    pub requirement: Requirement,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonNodeDecl {
    pub name: String,
    #[serde(default)]
    pub keys_provided: ItemCount,
    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyDoorKind {
    Small,
    Big,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDoorDecl {
    pub name: String,
    pub kind: KeyDoorKind,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub requirement: Requirement,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonItemDecl {
    pub name: String,
    pub node: String,
    #[serde(default)]
    pub requirement: Requirement,
    // Enemy/pot key drop; only a location when key drops are shuffled.
    #[serde(default)]
    pub key_drop: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDecl {
    pub name: String,
    pub node: String,
    #[serde(default = "default_section_total")]
    pub total: ItemCount,
    #[serde(default)]
    pub requirement: Requirement,
}

fn default_section_total() -> ItemCount {
    1
}

#[derive(Clone, Debug)]
pub struct ConnectionData {
    pub from: NodeId,
    pub requirement: Requirement,
}

#[derive(Clone, Debug)]
pub struct NodeData {
    pub always_accessible: bool,
    // Incoming connections, in declaration order.
    pub connections: Vec<ConnectionData>,
}

#[derive(Clone, Debug)]
pub struct DungeonEntryData {
    pub node: DungeonNodeId,
    pub from: NodeId,
    pub requirement: Requirement,
}

#[derive(Clone, Debug)]
pub struct DungeonConnectionData {
    pub from: DungeonNodeId,
    pub requirement: Requirement,
}

#[derive(Clone, Debug)]
pub struct DungeonNodeData {
    pub keys_provided: ItemCount,
    pub connections: Vec<DungeonConnectionData>,
}

#[derive(Clone, Debug)]
pub struct KeyDoorData {
    pub name: String,
    pub kind: KeyDoorKind,
    pub from: DungeonNodeId,
    pub to: DungeonNodeId,
    pub requirement: Requirement,
}

#[derive(Clone, Debug)]
pub struct DungeonItemData {
    pub name: String,
    pub node: DungeonNodeId,
    pub requirement: Requirement,
    pub key_drop: bool,
}

#[derive(Clone, Debug)]
pub struct PrizeData {
    pub location: DungeonItemIdx,
    pub prize: Option<Item>,
    pub always_clearable: bool,
}

#[derive(Clone, Debug)]
pub struct DungeonData {
    pub name: String,
    pub small_keys: ItemCount,
    pub big_key: bool,
    pub node_isv: IndexedVec<String>,
    pub nodes: Vec<DungeonNodeData>,
    pub entries: Vec<DungeonEntryData>,
    pub key_doors: Vec<KeyDoorData>,
    pub items: Vec<DungeonItemData>,
    pub exits: Vec<DungeonNodeId>,
    pub prize: Option<PrizeData>,
}

impl DungeonData {
    /// Small keys dropped by enemies and pots across the whole dungeon.
    pub fn key_drops(&self) -> ItemCount {
        self.nodes.iter().map(|n| n.keys_provided).sum()
    }

    pub fn small_key_doors(&self) -> impl Iterator<Item = KeyDoorIdx> + '_ {
        self.key_doors
            .iter()
            .enumerate()
            .filter(|(_, d)| d.kind == KeyDoorKind::Small)
            .map(|(i, _)| i)
    }
}

#[derive(Clone, Debug)]
pub struct SectionData {
    pub name: String,
    pub node: NodeId,
    pub total: ItemCount,
    pub requirement: Requirement,
}

#[derive(Clone, Debug, Default)]
pub struct GameData {
    pub node_isv: IndexedVec<String>,
    pub nodes: Vec<NodeData>,
    pub dungeon_isv: IndexedVec<String>,
    pub dungeons: Vec<DungeonData>,
    pub section_isv: IndexedVec<String>,
    pub sections: Vec<SectionData>,
}

fn lookup(isv: &IndexedVec<String>, name: &str, what: &str) -> Result<usize> {
    isv.index_by_key
        .get(name)
        .copied()
        .with_context(|| format!("Unknown {what} '{name}'"))
}

fn register_unique(isv: &mut IndexedVec<String>, name: &str, what: &str) -> Result<usize> {
    ensure!(
        !isv.index_by_key.contains_key(name),
        "Duplicate {what} '{name}'"
    );
    Ok(isv.add(name))
}

impl GameData {
    pub fn load(path: &Path) -> Result<GameData> {
        let json_str = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        let game_data = GameData::from_json_str(&json_str)
            .with_context(|| format!("unable to load {}", path.display()))?;
        info!(
            "Loaded {}: {} nodes, {} dungeons, {} sections",
            path.display(),
            game_data.nodes.len(),
            game_data.dungeons.len(),
            game_data.sections.len()
        );
        Ok(game_data)
    }

    pub fn from_json_str(json_str: &str) -> Result<GameData> {
        let decl: GameDataDecl = serde_json::from_str(json_str).context("unable to parse")?;
        GameData::from_decl(&decl)
    }

    pub fn from_decl(decl: &GameDataDecl) -> Result<GameData> {
        let mut game_data = GameData::default();

        // Register all node identities before wiring anything, since connections
        // may name nodes declared further down.
        for node in &decl.nodes {
            register_unique(&mut game_data.node_isv, &node.name, "node")?;
        }

        for node in &decl.nodes {
            let mut connections = vec![];
            for conn in &node.connections {
                let from = lookup(&game_data.node_isv, &conn.from, "node")
                    .with_context(|| format!("in connections of node '{}'", node.name))?;
                connections.push(ConnectionData {
                    from,
                    requirement: conn.requirement.clone().normalize(),
                });
            }
            game_data.nodes.push(NodeData {
                always_accessible: node.always_accessible,
                connections,
            });
        }

        for dungeon in &decl.dungeons {
            register_unique(&mut game_data.dungeon_isv, &dungeon.name, "dungeon")?;
            let dungeon_data = game_data
                .load_dungeon(dungeon)
                .with_context(|| format!("in dungeon '{}'", dungeon.name))?;
            game_data.dungeons.push(dungeon_data);
        }

        for section in &decl.sections {
            register_unique(&mut game_data.section_isv, &section.name, "section")?;
            let node = lookup(&game_data.node_isv, &section.node, "node")
                .with_context(|| format!("in section '{}'", section.name))?;
            game_data.sections.push(SectionData {
                name: section.name.clone(),
                node,
                total: section.total,
                requirement: section.requirement.clone().normalize(),
            });
        }

        Ok(game_data)
    }

    fn load_dungeon(&self, decl: &DungeonDecl) -> Result<DungeonData> {
        let mut node_isv: IndexedVec<String> = IndexedVec::default();
        for node in &decl.nodes {
            register_unique(&mut node_isv, &node.name, "dungeon node")?;
        }

        let mut nodes = vec![];
        for node in &decl.nodes {
            let mut connections = vec![];
            for conn in &node.connections {
                let from = lookup(&node_isv, &conn.from, "dungeon node")
                    .with_context(|| format!("in connections of node '{}'", node.name))?;
                connections.push(DungeonConnectionData {
                    from,
                    requirement: conn.requirement.clone().normalize(),
                });
            }
            nodes.push(DungeonNodeData {
                keys_provided: node.keys_provided,
                connections,
            });
        }

        ensure!(!decl.entries.is_empty(), "Dungeon has no entries");
        let mut entries = vec![];
        for entry in &decl.entries {
            entries.push(DungeonEntryData {
                node: lookup(&node_isv, &entry.node, "dungeon node")?,
                from: lookup(&self.node_isv, &entry.from, "node")?,
                requirement: entry.requirement.clone().normalize(),
            });
        }

        if decl.key_doors.len() > MAX_KEY_DOORS {
            bail!(
                "{} key doors declared, at most {} are supported",
                decl.key_doors.len(),
                MAX_KEY_DOORS
            );
        }
        let mut door_names: IndexedVec<String> = IndexedVec::default();
        let mut key_doors = vec![];
        for door in &decl.key_doors {
            register_unique(&mut door_names, &door.name, "key door")?;
            key_doors.push(KeyDoorData {
                name: door.name.clone(),
                kind: door.kind,
                from: lookup(&node_isv, &door.from, "dungeon node")
                    .with_context(|| format!("in key door '{}'", door.name))?,
                to: lookup(&node_isv, &door.to, "dungeon node")
                    .with_context(|| format!("in key door '{}'", door.name))?,
                requirement: door.requirement.clone().normalize(),
            });
        }
        if key_doors.iter().any(|d| d.kind == KeyDoorKind::Big) {
            ensure!(decl.big_key, "Big key door declared without a big key");
        }

        let mut item_names: IndexedVec<String> = IndexedVec::default();
        let mut items = vec![];
        for item in &decl.items {
            register_unique(&mut item_names, &item.name, "dungeon item")?;
            items.push(DungeonItemData {
                name: item.name.clone(),
                node: lookup(&node_isv, &item.node, "dungeon node")
                    .with_context(|| format!("in dungeon item '{}'", item.name))?,
                requirement: item.requirement.clone().normalize(),
                key_drop: item.key_drop,
            });
        }

        let mut exits = vec![];
        for exit in &decl.exits {
            exits.push(lookup(&node_isv, exit, "dungeon node").context("in exits")?);
        }

        let prize = match &decl.prize {
            Some(prize) => Some(PrizeData {
                location: lookup(&item_names, &prize.location, "dungeon item")
                    .context("in prize")?,
                prize: prize.prize,
                always_clearable: prize.always_clearable,
            }),
            None => None,
        };

        Ok(DungeonData {
            name: decl.name.clone(),
            small_keys: decl.small_keys,
            big_key: decl.big_key,
            node_isv,
            nodes,
            entries,
            key_doors,
            items,
            exits,
            prize,
        })
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_isv.index_by_key.get(name).copied()
    }

    pub fn dungeon_id(&self, name: &str) -> Option<DungeonId> {
        self.dungeon_isv.index_by_key.get(name).copied()
    }

    pub fn node_name(&self, id: NodeId) -> &str {
        &self.node_isv.keys[id]
    }

    pub fn num_connections(&self) -> usize {
        self.nodes.iter().map(|n| n.connections.len()).sum()
    }
}
