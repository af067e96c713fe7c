//! `segtool`: inspect and validate analysis archives

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use seg_core::ItemKind;
use seg_io::{parse_taxonomy, IoConfig, LoadStatus, ReadOnlyFactory, SegFile, Trace};
use seg_model::AnalysisModel;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let archive = || {
        Arg::new("archive")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Analysis archive")
    };

    Command::new("segtool")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and validate segmentation analysis archives")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("IO configuration file (TOML)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print settings, vertex counts and members")
                .arg(archive()),
        )
        .subcommand(Command::new("trace").about("Print trace.dot").arg(archive()))
        .subcommand(
            Command::new("taxonomy")
                .about("Print the category tree")
                .arg(archive()),
        )
        .subcommand(
            Command::new("validate")
                .about("Reconstruct the archive with read-only filters")
                .arg(archive()),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> Result<IoConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => IoConfig::from_file(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(IoConfig::default()),
    }
}

fn archive_arg(args: &ArgMatches) -> Result<&Path> {
    args.get_one::<PathBuf>("archive")
        .map(PathBuf::as_path)
        .context("missing archive argument")
}

fn inspect(seg_file: &mut SegFile, path: &Path) -> Result<ExitCode> {
    let contents = seg_file
        .read(path)
        .with_context(|| format!("reading {}", path.display()))?;

    println!("Archive: {}", path.display());
    match &contents.settings {
        Some(settings) => {
            println!("  Version: {}", settings.version);
            println!("  Traceable: {}", settings.traceable);
            if let Some(generator) = &settings.generator {
                println!("  Generator: {generator}");
            }
        }
        None => println!("  Settings: missing"),
    }

    if let Some(raw) = &contents.trace {
        let trace = Trace::parse(raw).context("parsing trace.dot")?;
        println!("Vertices: {}", trace.vertex_count());
        for kind in ItemKind::GRAPH_KINDS {
            let count = trace.vertices().filter(|vertex| vertex.kind == kind).count();
            println!("  {kind}: {count}");
        }
        println!("Edges: {}", trace.edge_count());
    }
    if let Some(raw) = &contents.taxonomy {
        let taxonomy = parse_taxonomy(raw).context("parsing taxonomy.xml")?;
        println!("Categories: {}", taxonomy.len());
    }

    println!("Members:");
    for member in &contents.members {
        println!("  {member}");
    }
    Ok(ExitCode::SUCCESS)
}

fn print_trace(seg_file: &mut SegFile, path: &Path) -> Result<ExitCode> {
    let contents = seg_file
        .read(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let Some(trace) = contents.trace else {
        bail!("{} has no trace.dot", path.display());
    };
    print!("{trace}");
    Ok(ExitCode::SUCCESS)
}

fn print_taxonomy(seg_file: &mut SegFile, path: &Path) -> Result<ExitCode> {
    let contents = seg_file
        .read(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let Some(raw) = contents.taxonomy else {
        bail!("{} has no taxonomy.xml", path.display());
    };
    let taxonomy = parse_taxonomy(&raw).context("parsing taxonomy.xml")?;
    for (qualified, category) in taxonomy.walk() {
        let properties: Vec<String> = category
            .properties()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        println!("{qualified}\t{}\t{}", category.color(), properties.join(" "));
    }
    Ok(ExitCode::SUCCESS)
}

fn validate(seg_file: &mut SegFile, path: &Path) -> ExitCode {
    tracing::info!(archive = %path.display(), "validating");
    let mut model = AnalysisModel::new();
    let result = seg_file.load(path, &mut model, &ReadOnlyFactory);
    let status = LoadStatus::of(&result);
    match result {
        Ok(report) => {
            println!("{status}");
            println!("  Items: {}", model.len());
            println!("  Relations: {}", model.relations().len());
            println!("  Categories: {}", model.taxonomy().len());
            println!("  Pruned channels: {}", report.reconstruction.pruned.len());
            println!("  Loose files: {}", report.loose_files.len());
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "validation failed");
            println!("{status}: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(matches: &ArgMatches) -> Result<ExitCode> {
    let mut seg_file = SegFile::new(load_config(matches)?);
    match matches.subcommand() {
        Some(("inspect", args)) => inspect(&mut seg_file, archive_arg(args)?),
        Some(("trace", args)) => print_trace(&mut seg_file, archive_arg(args)?),
        Some(("taxonomy", args)) => print_taxonomy(&mut seg_file, archive_arg(args)?),
        Some(("validate", args)) => Ok(validate(&mut seg_file, archive_arg(args)?)),
        _ => bail!("unknown command"),
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json"));

    match run(&matches) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
