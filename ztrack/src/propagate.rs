//! Pushes a state change through requirements, the world graph, dungeons and
//! sections, in that order. Each stage only revisits what the previous stage
//! reported as changed.

use std::collections::BTreeSet;

use log::debug;
use ztrack_game::{ConnectionIdx, DungeonId, NodeId, SectionId};

use crate::requirements::Dependent;
use crate::tracker::{Tracker, TrackerEvent};

/// Work queued by a state change before propagation.
#[derive(Default, Debug)]
pub(crate) struct Pending {
    pub seeds: Vec<ConnectionIdx>,
    pub touched_nodes: Vec<NodeId>,
    pub may_decrease: bool,
    pub dungeons: BTreeSet<DungeonId>,
    pub sections: BTreeSet<SectionId>,
}

impl Pending {
    fn add(&mut self, dependent: Dependent) {
        match dependent {
            Dependent::Connection(idx) => self.seeds.push(idx),
            Dependent::Dungeon(id) => {
                self.dungeons.insert(id);
            }
            Dependent::Section(id) => {
                self.sections.insert(id);
            }
            // Requirement parents are handled inside the requirement sweep.
            Dependent::Requirement(_) => {}
        }
    }
}

impl Tracker {
    pub(crate) fn propagate(&mut self, mut pending: Pending) {
        let sweep = self.requirements.sweep(&self.global);
        pending.may_decrease |= sweep.any_decrease();
        for &dependent in &sweep.dependents {
            pending.add(dependent);
        }

        let node_changes = self.world.propagate(
            &self.requirements,
            &pending.seeds,
            &pending.touched_nodes,
            pending.may_decrease,
        );
        for change in &node_changes {
            for &dependent in &self.world.nodes[change.node].dependents {
                pending.add(dependent);
            }
            self.events.push(TrackerEvent::NodeChanged {
                node: change.node,
                old: change.old,
                new: change.new,
            });
        }

        debug!(
            "Propagated: {} requirements, {} connections, {} nodes changed; {} dungeons, {} sections to update",
            sweep.changes.len(),
            pending.seeds.len(),
            node_changes.len(),
            pending.dungeons.len(),
            pending.sections.len()
        );
        self.update_dungeons(pending.dungeons);
        self.update_sections(pending.sections);
    }
}
