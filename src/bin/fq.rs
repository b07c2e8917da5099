//! fq: FASTQ profiler
//!
//! Profiles FASTQ files, stores the results keyed by content hash and reports
//! on what has been stored.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use fastq_profiler::fastqc::FastqcRunner;
use fastq_profiler::inputs::resolve_inputs;
use fastq_profiler::profile::{BatchReport, Profiler};
use fastq_profiler::reporting::{summarize, write_json_lines, write_qc_module, write_tsv};
use fastq_profiler::settings::{default_store_root, settings_path, Settings};
use fastq_profiler::{parse_metadata, JsonStore, RecordStore};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

fn files_arg() -> Arg {
    Arg::new("files")
        .value_name("FASTQ")
        .help("FASTQ files, a pattern such as 'run1/*.fq.gz', or '-' to read paths from stdin")
        .num_args(1..)
        .required(true)
}

fn profile_args(cmd: Command) -> Command {
    cmd.arg(files_arg())
        .arg(
            Arg::new("fastqc")
                .long("fastqc")
                .help("Also run FastQC on files without a stored QC result")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fastqc_path")
                .long("fastqc-path")
                .value_name("PROGRAM")
                .help("FastQC executable")
                .default_value("fastqc"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("N")
                .help("Threads passed through to FastQC")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(meta_arg())
}

fn meta_arg() -> Arg {
    Arg::new("meta")
        .short('m')
        .long("meta")
        .value_name("KEY:VALUE")
        .help("Metadata to attach to every record; 'key:a,b' stores a list")
        .action(ArgAction::Append)
}

fn cli() -> Command {
    Command::new("fq")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Summarize FASTQ files and store associated data")
        .author("Daniel E. Cook")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Show debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("DIRECTORY")
                .help("Record store directory (defaults to the app config directory)")
                .global(true),
        )
        .subcommand(profile_args(
            Command::new("profile").about("Profile files and store the results"),
        ))
        .subcommand(
            Command::new("fetch")
                .about("Print stored records, profiling unknown files without FastQC")
                .arg(files_arg())
                .arg(meta_arg()),
        )
        .subcommand(
            Command::new("fastqc-dump")
                .about("Print one FastQC module table for the given files")
                .arg(
                    Arg::new("module")
                        .value_name("MODULE")
                        .help("Module name, e.g. per_base_sequence_quality")
                        .required(true),
                )
                .arg(files_arg()),
        )
        .subcommand(
            Command::new("dump")
                .about("Print every stored record")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("One JSON document per line instead of TSV")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("summary").about("Summarize every stored record"))
        .subcommand(
            Command::new("set")
                .about("Set the project or record kind")
                .arg(
                    Arg::new("key")
                        .value_name("KEY")
                        .value_parser(["project", "kind"])
                        .required(true),
                )
                .arg(Arg::new("value").value_name("VALUE").required(true)),
        )
}

fn main() {
    let matches = cli().get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&matches) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `false` when some files failed but the batch completed.
fn run(matches: &ArgMatches) -> Result<bool> {
    let settings_file = settings_path()?;
    let mut settings = Settings::load(&settings_file)
        .with_context(|| format!("reading {}", settings_file.display()))?;

    if let Some(("set", sub)) = matches.subcommand() {
        let key = sub.get_one::<String>("key").unwrap();
        let value = sub.get_one::<String>("value").unwrap();
        settings.set(key, value)?;
        settings.save(&settings_file)?;
        println!("{} set to {}", key, value);
        return Ok(true);
    }

    let store_root = match matches.get_one::<String>("store") {
        Some(dir) => PathBuf::from(dir),
        None => default_store_root()?,
    };
    let mut store = JsonStore::open(&store_root, &settings.project)?;

    match matches.subcommand() {
        Some(("profile", sub)) => run_profile(sub, settings, &mut store, false),
        Some(("fetch", sub)) => run_profile(sub, settings, &mut store, true),
        Some(("fastqc-dump", sub)) => {
            let module = sub.get_one::<String>("module").unwrap();
            let paths = input_paths(sub)?;
            let report = Profiler::new(settings, &mut store).fetch_all(&paths)?;
            write_qc_module(&report.records, module, stdout())?;
            Ok(finish_batch(&report))
        }
        Some(("dump", sub)) => {
            let records = store.scan(&settings.kind)?;
            if sub.get_flag("json") {
                write_json_lines(&records, stdout())?;
            } else {
                write_tsv(&records, stdout())?;
            }
            Ok(true)
        }
        Some(("summary", _)) => {
            let summary = summarize(&store.scan(&settings.kind)?);
            println!("📊 {} / {}", settings.project, settings.kind);
            println!("  Records: {}", summary.records);
            println!("  Filenames: {}", summary.filenames);
            println!("  Profiled: {}", summary.profiled);
            println!("  Total reads: {}", summary.total_reads);
            println!("  Total bases: {}", summary.total_bases);
            println!("  Mean GC: {:.4}", summary.mean_gc_content);
            println!("  FastQC reports: {}", summary.qc_reports);
            println!("  FastQC failures: {}", summary.qc_failures);
            Ok(true)
        }
        _ => unreachable!("subcommand_required"),
    }
}

fn run_profile(
    sub: &ArgMatches,
    settings: Settings,
    store: &mut JsonStore,
    fetch: bool,
) -> Result<bool> {
    let paths = input_paths(sub)?;
    let metadata: Vec<String> = sub
        .get_many::<String>("meta")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let metadata = parse_metadata(&metadata)?;

    let mut profiler = Profiler::new(settings, store).with_metadata(metadata);
    // fetch has no FastQC flags
    if !fetch && sub.get_flag("fastqc") {
        let program = sub.get_one::<String>("fastqc_path").unwrap();
        let threads = sub.get_one::<usize>("threads").copied();
        profiler = profiler.with_qc(Box::new(FastqcRunner::locate(program, threads)?));
    }

    let report = if fetch {
        profiler.fetch_all(&paths)?
    } else {
        println!("🧬 Profiling {} file(s)", paths.len());
        profiler.profile_all(&paths)?
    };

    if fetch {
        write_json_lines(&report.records, stdout())?;
    } else {
        for record in &report.records {
            let reads = record.stats.as_ref().map(|s| s.total_reads).unwrap_or(0);
            println!("✅ {}  {} reads", record.checksum, reads);
        }
        if report.qc_skipped > 0 {
            println!("FastQC skipped for {} file(s) with stored results", report.qc_skipped);
        }
    }
    Ok(finish_batch(&report))
}

fn input_paths(sub: &ArgMatches) -> Result<Vec<PathBuf>> {
    let args: Vec<String> = sub
        .get_many::<String>("files")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let stdin = io::stdin();
    Ok(resolve_inputs(&args, stdin.lock())?)
}

fn stdout() -> BufWriter<io::Stdout> {
    BufWriter::new(io::stdout())
}

/// Report per-file failures once, after the batch.
fn finish_batch(report: &BatchReport) -> bool {
    let _ = io::stdout().flush();
    if report.is_success() {
        return true;
    }
    eprintln!("\n{} file(s) could not be processed:", report.failures.len());
    for failure in &report.failures {
        eprintln!("  {}: {}", failure.path.display(), failure.error);
    }
    false
}
