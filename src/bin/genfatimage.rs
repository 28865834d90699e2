//! CLI front-end: argument parsing, the host directory walker, and
//! diagnostic printing. Everything here is an "external collaborator" per
//! the core library's spec — it only talks to `fatimage` through
//! [`fatimage::Options`] and [`fatimage::DirTree::add_file`].

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Arg, ArgAction, Command};
use log::error;

use fatimage::options::{Preset, RawOptions};
use fatimage::tree::ATTR_ARCHIVE;
use fatimage::{DirTree, Options};

fn build_cli() -> Command {
    Command::new("genfatimage")
        .about("Builds a FAT12/FAT16/FAT32 disk image from host files and directories")
        .arg(
            Arg::new("paths")
                .value_name("PATH[=IMAGE_PATH]")
                .help("host files or directories to add; optional '=image/path' suffix places it at an arbitrary path in the image")
                .num_args(0..)
                .action(ArgAction::Append),
        )
        .arg(Arg::new("output").short('o').long("output").value_name("FILE"))
        .arg(Arg::new("verbose").short('v').long("verbose").action(ArgAction::SetTrue))
        .arg(Arg::new("preset").long("preset").value_name("SIZE"))
        .arg(Arg::new("volume-size").long("volume-size").value_name("BYTES"))
        .arg(Arg::new("free-space").long("free-space").value_name("BYTES"))
        .arg(Arg::new("cluster-size").long("cluster-size").value_name("BYTES"))
        .arg(Arg::new("root-dir-size").long("root-dir-size").value_name("N"))
        .arg(Arg::new("fat").long("fat").value_name("12|16|32"))
        .arg(Arg::new("partitioned").long("partitioned").action(ArgAction::SetTrue))
        .arg(Arg::new("label").long("label").value_name("NAME"))
        .arg(Arg::new("boot-record").long("boot-record").value_name("FILE"))
        .arg(Arg::new("oem-name").long("oem-name").value_name("STR"))
        .arg(Arg::new("serial").long("serial").value_name("HHHH-HHHH"))
        .arg(Arg::new("sectors-per-track").long("sectors-per-track").value_name("N"))
        .arg(Arg::new("heads").long("heads").value_name("N"))
        .arg(Arg::new("media-descriptor").long("media-descriptor").value_name("HEX"))
        .arg(Arg::new("sector-size").long("sector-size").value_name("BYTES"))
        .arg(Arg::new("reserved-sectors").long("reserved-sectors").value_name("N"))
        .arg(Arg::new("fats").long("fats").value_name("N"))
}

fn parse_u64(matches: &clap::ArgMatches, name: &str) -> Result<Option<u64>, String> {
    match matches.get_one::<String>(name) {
        Some(s) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|_| format!("--{name} expects an integer, got '{s}'")),
        None => Ok(None),
    }
}

fn parse_u32(matches: &clap::ArgMatches, name: &str) -> Result<Option<u32>, String> {
    match matches.get_one::<String>(name) {
        Some(s) => s
            .parse::<u32>()
            .map(Some)
            .map_err(|_| format!("--{name} expects an integer, got '{s}'")),
        None => Ok(None),
    }
}

/// Number of times `name` was given on the command line. Used for flags the
/// spec requires to be rejected outright if repeated, rather than silently
/// keeping the last occurrence.
fn occurrence_count(matches: &clap::ArgMatches, name: &str) -> usize {
    matches
        .get_occurrences::<String>(name)
        .map(|occurrences| occurrences.count())
        .unwrap_or(0)
}

fn raw_options_from_matches(matches: &clap::ArgMatches) -> Result<RawOptions, String> {
    let mut raw = RawOptions::default();

    raw.output = matches.get_one::<String>("output").map(PathBuf::from);
    raw.verbose = matches.get_flag("verbose");
    raw.partitioned = matches.get_flag("partitioned");

    if occurrence_count(matches, "preset") > 1 {
        return Err("--preset may only be given once".to_string());
    }
    if let Some(s) = matches.get_one::<String>("preset") {
        let kib: u32 = s
            .parse()
            .map_err(|_| format!("invalid --preset value '{s}'"))?;
        raw.preset = Some(
            Preset::from_kib(kib)
                .ok_or_else(|| format!("unknown preset size '{s}' (expected 360/720/1200/1440/2880)"))?,
        );
    }

    raw.volume_size = parse_u64(matches, "volume-size")?;
    raw.free_space = parse_u64(matches, "free-space")?;
    raw.cluster_size = parse_u32(matches, "cluster-size")?;
    raw.root_dir_size = match parse_u32(matches, "root-dir-size")? {
        Some(n) => Some(
            u16::try_from(n)
                .map_err(|_| "--root-dir-size must fit in 16 bits".to_string())?,
        ),
        None => None,
    };

    if occurrence_count(matches, "fat") > 1 {
        return Err("--fat may only be given once".to_string());
    }
    if let Some(s) = matches.get_one::<String>("fat") {
        let width: u8 = s
            .parse()
            .map_err(|_| format!("invalid --fat value '{s}'"))?;
        raw.fat_width_forced = Some(width);
    }

    raw.label = matches.get_one::<String>("label").cloned();
    raw.boot_record = matches.get_one::<String>("boot-record").map(PathBuf::from);
    raw.oem_name = matches.get_one::<String>("oem-name").cloned();
    raw.serial = matches.get_one::<String>("serial").cloned();
    raw.sectors_per_track = parse_u32(matches, "sectors-per-track")?;
    raw.num_heads = parse_u32(matches, "heads")?;
    raw.media_desc = matches.get_one::<String>("media-descriptor").cloned();
    raw.sector_size = parse_u32(matches, "sector-size")?;
    raw.reserved_sectors = parse_u32(matches, "reserved-sectors")?;
    raw.num_fats = parse_u32(matches, "fats")?;

    Ok(raw)
}

/// One `PATH` or `PATH=IMAGE_PATH` positional argument, split on its first
/// unescaped `=`.
fn split_path_arg(arg: &str) -> (&str, &str) {
    match arg.split_once('=') {
        Some((host, image)) => (host, image),
        None => (arg, ""),
    }
}

/// Recursively walks `host_path`, adding every regular file and directory
/// under it to `tree` at the matching path under `image_path`. Special
/// files are rejected by [`DirTree::add_file`] itself; the walker does not
/// pre-filter them.
fn walk(tree: &mut DirTree, host_path: &Path, image_path: &str) -> fatimage::Result<()> {
    let meta = fs::symlink_metadata(host_path)?;
    if meta.is_dir() {
        tree.add_file(host_path, image_path, ATTR_ARCHIVE)?;
        // `add_file` falls back to the host basename when `image_path` is
        // empty; resolve the same name here so children nest under it
        // instead of landing back at the tree root.
        let resolved = if image_path.is_empty() {
            host_path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    fatimage::Error::bad_input(host_path, "cannot derive an image name")
                })?
                .to_string()
        } else {
            image_path.to_string()
        };

        let mut children: Vec<_> = fs::read_dir(host_path)?.collect::<std::io::Result<Vec<_>>>()?;
        children.sort_by_key(|e| e.file_name());
        for child in children {
            let name = child.file_name();
            let name = name.to_string_lossy();
            let child_image_path = format!("{resolved}/{name}");
            walk(tree, &child.path(), &child_image_path)?;
        }
        Ok(())
    } else {
        let attrs = if host_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
        {
            ATTR_ARCHIVE | fatimage::ATTR_HIDDEN
        } else {
            ATTR_ARCHIVE
        };
        tree.add_file(host_path, image_path, attrs)
    }
}

fn run() -> Result<(), String> {
    let matches = build_cli().get_matches();
    let path_args: Vec<&String> = matches
        .get_many::<String>("paths")
        .map(|v| v.collect())
        .unwrap_or_default();

    let raw = raw_options_from_matches(&matches)?;
    let opts: Options = raw.finalize(path_args.len()).map_err(|e| e.to_string())?;

    let log_level = if opts.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut tree = DirTree::new();
    for arg in &path_args {
        let (host, image) = split_path_arg(arg);
        walk(&mut tree, Path::new(host), image).map_err(|e| e.to_string())?;
    }

    fatimage::build_image(&mut tree, &opts).map_err(|e| e.to_string())?;

    if opts.verbose {
        println!("wrote {}", opts.output.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
