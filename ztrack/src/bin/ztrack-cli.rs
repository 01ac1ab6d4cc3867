use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use ztrack::dungeon::DungeonResult;
use ztrack::prize::PrizeSection;
use ztrack::{Tracker, TrackerSettings};
use ztrack_game::{AccessibilityLevel, GameData, Item, ItemCount, SequenceBreakType};

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "data/world.json")]
    data: PathBuf,

    #[arg(long)]
    settings: Option<PathBuf>,

    /// Item to hold, as `Name` or `Name=count`
    #[arg(long)]
    item: Vec<String>,

    /// Small keys found, as `Dungeon=count`
    #[arg(long)]
    small_keys: Vec<String>,

    /// Dungeon whose big key has been found
    #[arg(long)]
    big_key: Vec<String>,

    /// Dungeon whose prize section has been cleared
    #[arg(long)]
    cleared_prize: Vec<String>,

    #[arg(long)]
    disable_sequence_break: Vec<String>,

    #[arg(long)]
    enable_sequence_break: Vec<String>,

    /// Only report these nodes
    #[arg(long)]
    node: Vec<String>,

    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeReport {
    name: String,
    accessibility: AccessibilityLevel,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SectionReport {
    name: String,
    accessibility: AccessibilityLevel,
    accessible: ItemCount,
    available: ItemCount,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DungeonReport {
    name: String,
    result: DungeonResult,
    prize: Option<PrizeSection>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    nodes: Vec<NodeReport>,
    sections: Vec<SectionReport>,
    dungeons: Vec<DungeonReport>,
}

fn parse_assignment(s: &str) -> (&str, Option<&str>) {
    match s.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (s, None),
    }
}

fn apply_args(tracker: &mut Tracker, args: &Args) -> Result<()> {
    for s in &args.item {
        let (name, count) = parse_assignment(s);
        let item = Item::from_str(name).with_context(|| format!("Unknown item '{name}'"))?;
        let count: ItemCount = match count {
            Some(c) => c
                .parse()
                .with_context(|| format!("Invalid count in '{s}'"))?,
            None => 1,
        };
        tracker.set_item(item, count);
    }
    for s in &args.small_keys {
        let (name, count) = parse_assignment(s);
        let Some(count) = count else {
            bail!("Expected Dungeon=count, got '{s}'");
        };
        let dungeon = tracker
            .dungeon_id(name)
            .with_context(|| format!("Unknown dungeon '{name}'"))?;
        let count: ItemCount = count
            .parse()
            .with_context(|| format!("Invalid count in '{s}'"))?;
        tracker.set_small_keys(dungeon, count);
    }
    for name in &args.big_key {
        let dungeon = tracker
            .dungeon_id(name)
            .with_context(|| format!("Unknown dungeon '{name}'"))?;
        tracker.set_big_key(dungeon, true);
    }
    for (names, enabled) in [
        (&args.disable_sequence_break, false),
        (&args.enable_sequence_break, true),
    ] {
        for name in names {
            let sb = SequenceBreakType::from_str(name)
                .with_context(|| format!("Unknown sequence break '{name}'"))?;
            tracker.set_sequence_break(sb, enabled);
        }
    }
    for name in &args.cleared_prize {
        let dungeon = tracker
            .dungeon_id(name)
            .with_context(|| format!("Unknown dungeon '{name}'"))?;
        if tracker.prize(dungeon).is_none() {
            bail!("Dungeon '{name}' has no prize section");
        }
        tracker.clear_prize(dungeon, true);
    }
    Ok(())
}

fn build_report(tracker: &Tracker, args: &Args) -> Result<Report> {
    let node_ids: Vec<usize> = if args.node.is_empty() {
        (0..tracker.num_nodes()).collect()
    } else {
        args.node
            .iter()
            .map(|name| {
                tracker
                    .node_id(name)
                    .with_context(|| format!("Unknown node '{name}'"))
            })
            .collect::<Result<_>>()?
    };
    Ok(Report {
        nodes: node_ids
            .into_iter()
            .map(|id| NodeReport {
                name: tracker.node(id).name.clone(),
                accessibility: tracker.node_accessibility(id),
            })
            .collect(),
        sections: tracker
            .sections()
            .iter()
            .map(|s| SectionReport {
                name: s.name.clone(),
                accessibility: s.accessibility(),
                accessible: s.accessible(),
                available: s.available(),
            })
            .collect(),
        dungeons: tracker
            .dungeons()
            .iter()
            .map(|d| DungeonReport {
                name: d.name().to_string(),
                result: d.result().clone(),
                prize: d.prize.clone(),
            })
            .collect(),
    })
}

fn print_report(report: &Report) {
    println!("Nodes:");
    for node in &report.nodes {
        println!("  {:<40} {:?}", node.name, node.accessibility);
    }
    println!("Sections:");
    for section in &report.sections {
        println!(
            "  {:<40} {:?} {}/{}",
            section.name, section.accessibility, section.accessible, section.available
        );
    }
    println!("Dungeons:");
    for dungeon in &report.dungeons {
        let r = &dungeon.result;
        println!(
            "  {:<40} {:?} {}/{} (exits {}, {} valid key layouts)",
            dungeon.name, r.accessibility, r.accessible, r.total, r.exits_accessible, r.valid_states
        );
        if let Some(prize) = &dungeon.prize {
            println!(
                "    prize {:<34} {:?} {}/1",
                format!("{:?}", prize.prize()),
                prize.accessibility(),
                prize.available()
            );
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let game_data = GameData::load(&args.data)?;
    let settings = match &args.settings {
        Some(path) => TrackerSettings::load(path)?,
        None => TrackerSettings::default(),
    };
    let mut tracker = Tracker::new(game_data, &settings)?;
    apply_args(&mut tracker, &args)?;
    info!("Applied {} item assignments", args.item.len());

    let report = build_report(&tracker, &args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}
