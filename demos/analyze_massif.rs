use anyhow;
use clap;
use tracing_subscriber;

use massif_out::{HeapNode, Profile};
use std::path;

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let app = clap::App::new("Analyze massif output")
        .arg(
            clap::Arg::with_name("file")
                .short("f")
                .long("file")
                .required(true)
                .takes_value(true)
                .help("massif.out file to read"),
        )
        .subcommand(
            clap::SubCommand::with_name("header")
                .about("Display the capture headers and derived maxima"),
        )
        .subcommand(
            clap::SubCommand::with_name("snapshots")
                .about("Display one summary row per snapshot"),
        )
        .subcommand(
            clap::SubCommand::with_name("peak")
                .about("Display the snapshot with the largest total allocation"),
        )
        .subcommand(
            clap::SubCommand::with_name("tree")
                .about("Pretty-print the allocation tree of a detailed snapshot")
                .arg(
                    clap::Arg::with_name("snapshot")
                        .short("s")
                        .long("snapshot")
                        .takes_value(true)
                        .help("Snapshot index; defaults to the last detailed snapshot"),
                )
                .arg(
                    clap::Arg::with_name("depth")
                        .long("depth")
                        .takes_value(true)
                        .default_value("4")
                        .help("How many tree levels to print"),
                ),
        );
    let matches = app.get_matches();

    let file_path = matches.value_of("file").expect("file must be specified");
    let profile = massif_out::parse_file(path::Path::new(file_path))?;

    match matches.subcommand() {
        ("header", _) => header(&profile),
        ("snapshots", _) => snapshots(&profile),
        ("peak", _) => peak(&profile),
        ("tree", arg_matches) => {
            let matches = arg_matches.expect("must provide args");
            let index = matches
                .value_of("snapshot")
                .map(|s| s.parse::<u32>())
                .transpose()?;
            let max_depth = matches
                .value_of("depth")
                .map(|s| s.parse::<u32>())
                .transpose()?
                .unwrap_or(4);
            tree(&profile, index, max_depth)?
        }
        _ => panic!("Unknown subcommand"),
    };

    Ok(())
}

fn header(profile: &Profile) {
    println!("Description: {}", profile.description());
    println!("Command: {}", profile.command());
    println!("Time unit: {}", profile.time_unit());
    println!("Snapshots: {}", profile.snapshots().len());
    println!("Max time: {}", profile.max_time());
    println!("Max total bytes: {}", profile.max_total_bytes());
}

fn snapshots(profile: &Profile) {
    println!(
        "{:>8} {:>14} {:>12} {:>12} {:>12} {:>10}",
        "snapshot", "time", "heap B", "extra B", "stacks B", "tree"
    );
    for s in profile.snapshots() {
        println!(
            "{:>8} {:>14} {:>12} {:>12} {:>12} {:>10}",
            s.index(),
            s.time(),
            s.mem_heap_bytes(),
            s.mem_heap_extra_bytes(),
            s.mem_stacks_bytes(),
            format!("{:?}", s.heap_tree_kind())
        );
    }
}

fn peak(profile: &Profile) {
    // ties go to the earliest sample
    let mut peak = &profile.snapshots()[0];
    for s in profile.snapshots() {
        if s.total_bytes() > peak.total_bytes() {
            peak = s;
        }
    }

    println!(
        "snapshot {} at time {}: {} B total ({} heap + {} extra + {} stacks)",
        peak.index(),
        peak.time(),
        peak.total_bytes(),
        peak.mem_heap_bytes(),
        peak.mem_heap_extra_bytes(),
        peak.mem_stacks_bytes()
    );
}

fn tree(profile: &Profile, index: Option<u32>, max_depth: u32) -> Result<(), anyhow::Error> {
    let snapshot = match index {
        Some(wanted) => profile.snapshots().iter().find(|s| s.index() == wanted),
        None => profile
            .snapshots()
            .iter()
            .rev()
            .find(|s| s.heap_tree().is_some()),
    };
    let snapshot =
        snapshot.ok_or_else(|| anyhow::anyhow!("no snapshot with an allocation tree"))?;
    let root = snapshot.heap_tree().as_ref().ok_or_else(|| {
        anyhow::anyhow!("snapshot {} has no allocation tree", snapshot.index())
    })?;

    println!("snapshot {} at time {}", snapshot.index(), snapshot.time());
    print_node(root, 0, max_depth);
    Ok(())
}

fn print_node(node: &HeapNode, depth: u32, max_depth: u32) {
    println!(
        "{:indent$}{} {}",
        "",
        node.total_bytes(),
        node.label(),
        indent = (depth * 2) as usize
    );
    if depth + 1 < max_depth {
        for child in node.children() {
            print_node(child, depth + 1, max_depth);
        }
    } else if !node.children().is_empty() {
        println!("{:indent$}...", "", indent = ((depth + 1) * 2) as usize);
    }
}
