use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use baar::archive::{self, Archive};
use baar::cancel::CancelFlag;
use baar::config::Config;
use baar::error::{Error, Result};
use baar::status::{StatusSink, StderrSink};
use baar::writer::{AddJob, AddOptions};
use baar::{adapter, codec, rebuild, writer};

#[derive(Parser)]
#[command(name = "baar", version = "1.0.0", about = "The BAARv1 archive engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show full paths and a spinner during long operations
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add files or directories (SRC, SRC:DEST or SRC:DEST:LEVEL)
    Add {
        archive: PathBuf,
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<String>,
        /// Compression level 0-4 (default: per-file auto-selection)
        #[arg(short, long)]
        level: Option<u8>,
        #[arg(short, long)]
        password: Option<String>,
        /// Skip files whose size, mtime and mode are unchanged
        #[arg(short, long)]
        incremental: bool,
        /// Incremental plus deletion of entries missing from the source
        #[arg(short, long)]
        mirror: bool,
        /// Glob of paths to skip (repeatable)
        #[arg(long = "ignore")]
        ignore: Vec<String>,
    },
    /// Extract the whole archive, or one entry with --entry
    Extract {
        archive: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(short, long)]
        entry: Option<String>,
        /// Exact destination path for --entry
        #[arg(short, long, requires = "entry")]
        output: Option<PathBuf>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Write one entry's plaintext to stdout
    Cat {
        archive: PathBuf,
        entry: String,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// List live entries
    List {
        archive: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show archive totals, or one entry's metadata with --entry
    Info {
        archive: PathBuf,
        #[arg(short, long)]
        entry: Option<String>,
    },
    /// Verify CRC of every live entry
    Test {
        archive: PathBuf,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// List entries matching a shell-style wildcard pattern
    Search {
        archive: PathBuf,
        pattern: String,
    },
    /// Rename one entry by id
    Rename {
        archive: PathBuf,
        id: u32,
        new_name: String,
    },
    /// Remove entries by name (rebuilds the archive)
    Rm {
        archive: PathBuf,
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },
    /// Create an explicit directory entry
    Mkdir {
        archive: PathBuf,
        name: String,
    },
    /// Rebuild the archive, dropping deleted entries
    Compact {
        archive: PathBuf,
    },
    /// Re-encode every live entry at the given level
    Recompress {
        archive: PathBuf,
        #[arg(short, long, default_value = "4")]
        level: u8,
    },
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("baar: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = Config::from_env();
    let verbose = cli.verbose || config.verbose;
    let mode = config.cipher_mode();
    let sink = StderrSink;

    let cancel = CancelFlag::new();
    {
        let flag = cancel.clone();
        // Best effort — a second handler registration (tests, embedding)
        // leaves the default disposition in place.
        let _ = ctrlc::set_handler(move || flag.cancel());
    }

    match cli.command {
        // ── Add ──────────────────────────────────────────────────────────────
        Commands::Add { archive, inputs, level, password, incremental, mirror, ignore } => {
            if let Some(level) = level {
                codec::validate_level(level)?;
            }
            let jobs = inputs
                .iter()
                .map(|spec| parse_job(spec, level))
                .collect::<Result<Vec<_>>>()?;
            let opts = AddOptions {
                password:     resolve_password(password, &config),
                // Mirror is incremental plus deletion of absent entries.
                incremental:  incremental || mirror,
                mirror,
                ignore:       parse_globs(&ignore)?,
                cipher_mode:  mode,
                verbose,
                debug_mirror: config.debug_mirror,
            };

            let spinner = Spinner::start(verbose);
            let result = writer::add(&archive, &jobs, &opts, &cancel, &sink);
            spinner.stop();

            let report = result?;
            sink.line(&format!(
                "{} added, {} skipped, {} removed",
                report.added, report.skipped, report.removed
            ));
            Ok(if report.errors > 0 { 1 } else { 0 })
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { archive, output_dir, entry, output, password } => {
            ensure_native(&archive)?;
            let password = resolve_password(password, &config);
            let mut ar = Archive::open(&archive)?;
            match entry {
                Some(name) => {
                    let written = match output {
                        Some(dest) => {
                            ar.extract_to_path(&name, &dest, &password, mode)?;
                            dest
                        }
                        None => ar.extract_single(&name, &output_dir, &password, mode)?,
                    };
                    sink.line(&format!("extracted {name} -> {}", written.display()));
                }
                None => {
                    let n = ar.extract_all(&output_dir, &password, mode, &sink)?;
                    sink.line(&format!("extracted {n} entries -> {}", output_dir.display()));
                }
            }
            Ok(0)
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { archive, entry, password } => {
            ensure_native(&archive)?;
            let password = resolve_password(password, &config);
            let mut ar = Archive::open(&archive)?;
            let stdout = std::io::stdout();
            ar.cat(&entry, &password, mode, &mut stdout.lock())?;
            Ok(0)
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { archive, json } => {
            ensure_native(&archive)?;
            let ar = Archive::open(&archive)?;
            let entries = ar.list();
            if json {
                let mut stdout = std::io::stdout().lock();
                serde_json::to_writer_pretty(&mut stdout, &entries)
                    .map_err(|e| Error::InvalidArgument(e.to_string()))?;
                writeln!(stdout)?;
            } else {
                println!(
                    "{:>6} {:>5} {:>5} {:>12} {:>12}  Name",
                    "Id", "Flags", "Level", "Size", "Stored"
                );
                for e in &entries {
                    println!(
                        "{:>6} {:>5} {:>5} {:>12} {:>12}  {}",
                        e.id, e.flags, e.comp_level, e.uncomp_size, e.comp_size, e.name
                    );
                }
            }
            Ok(0)
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { archive, entry } => {
            ensure_native(&archive)?;
            let ar = Archive::open(&archive)?;
            match entry {
                Some(name) => {
                    let e = ar.info(&name)?;
                    println!("  Name         {}", e.name);
                    println!("  Id           {}", e.id);
                    println!("  Flags        {:#04x}", e.flags);
                    println!("  Level        {}", e.comp_level);
                    println!("  Size         {} B", e.uncomp_size);
                    println!("  Stored       {} B", e.comp_size);
                    println!("  CRC-32       {:#010x}", e.crc32);
                    println!("  Mode         {:o}", e.mode);
                    println!("  Owner        {}:{}", e.uid, e.gid);
                    println!("  Mtime        {}", e.mtime);
                    for (k, v) in &e.meta {
                        println!("  meta {k} = {v}");
                    }
                }
                None => {
                    let stat = ar.stat();
                    println!("  Path         {}", archive.display());
                    println!("  Live entries {}", stat.live_entries);
                    println!("  Deleted      {}", stat.deleted_entries);
                    println!("  Data region  {} B", stat.data_bytes);
                    println!("  Index offset {} B", stat.index_offset);
                }
            }
            Ok(0)
        }

        // ── Test ─────────────────────────────────────────────────────────────
        Commands::Test { archive, password } => {
            ensure_native(&archive)?;
            let password = resolve_password(password, &config);
            let mut ar = Archive::open(&archive)?;
            let report = ar.test(&password, mode, &sink)?;
            if report.ok() {
                sink.line(&format!("{} entries OK", report.tested));
                Ok(0)
            } else {
                sink.line(&format!("{} of {} entries FAILED", report.failed, report.tested));
                Ok(2)
            }
        }

        // ── Search ───────────────────────────────────────────────────────────
        Commands::Search { archive, pattern } => {
            ensure_native(&archive)?;
            let ar = Archive::open(&archive)?;
            for e in ar.search(&pattern)? {
                println!("{:>6}  {}", e.id, e.name);
            }
            Ok(0)
        }

        // ── Rename ───────────────────────────────────────────────────────────
        Commands::Rename { archive: path, id, new_name } => {
            archive::rename(&path, id, &new_name)?;
            Ok(0)
        }

        // ── Rm ───────────────────────────────────────────────────────────────
        Commands::Rm { archive: path, names } => {
            let ids = {
                let ar = Archive::open(&path)?;
                let mut ids = BTreeSet::new();
                let mut missing = 0usize;
                for name in &names {
                    match ar.info(name) {
                        Ok(e) => {
                            ids.insert(e.id);
                        }
                        Err(_) => {
                            sink.line(&format!("no such entry: {name}"));
                            missing += 1;
                        }
                    }
                }
                if ids.is_empty() {
                    return Err(Error::NotFound(names.join(", ")));
                }
                if missing > 0 {
                    sink.line(&format!("{missing} name(s) not found"));
                }
                ids
            };
            let report = rebuild::remove(&path, &ids)?;
            sink.line(&format!("{} kept, {} dropped", report.kept, report.dropped));
            Ok(0)
        }

        // ── Mkdir ────────────────────────────────────────────────────────────
        Commands::Mkdir { archive: path, name } => {
            archive::mkdir(&path, &name)?;
            Ok(0)
        }

        // ── Compact ──────────────────────────────────────────────────────────
        Commands::Compact { archive: path } => {
            let report = rebuild::compact(&path, &BTreeSet::new())?;
            sink.line(&format!("{} kept, {} dropped", report.kept, report.dropped));
            Ok(0)
        }

        // ── Recompress ───────────────────────────────────────────────────────
        Commands::Recompress { archive: path, level } => {
            let spinner = Spinner::start(verbose);
            let result = rebuild::recompress(&path, level, &sink);
            spinner.stop();
            let report = result?;
            sink.line(&format!(
                "{} re-encoded, {} copied, {} errors",
                report.recoded, report.copied, report.errors
            ));
            Ok(if report.errors > 0 { 1 } else { 0 })
        }
    }
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// `SRC`, `SRC:DEST`, `SRC:DEST:LEVEL` or `SRC::LEVEL`.
fn parse_job(spec: &str, default_level: Option<u8>) -> Result<AddJob> {
    let mut parts = spec.splitn(3, ':');
    let src = parts.next().unwrap_or_default();
    if src.is_empty() {
        return Err(Error::InvalidArgument(format!("bad job spec {spec:?}")));
    }
    let rename = match parts.next() {
        Some("") | None => None,
        Some(dst) => Some(dst.to_string()),
    };
    let level = match parts.next() {
        None => default_level,
        Some(l) => {
            let level: u8 = l
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("bad level in {spec:?}")))?;
            codec::validate_level(level)?;
            Some(level)
        }
    };
    Ok(AddJob { source: PathBuf::from(src), rename, level })
}

fn parse_globs(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| Error::InvalidArgument(format!("bad glob {p:?}: {e}")))
        })
        .collect()
}

fn resolve_password(cli: Option<String>, config: &Config) -> String {
    cli.or_else(|| config.password.clone()).unwrap_or_default()
}

fn ensure_native(path: &std::path::Path) -> Result<()> {
    if path.exists() && !adapter::is_native(path) {
        return Err(Error::InvalidArgument(format!(
            "{}: not a BAARv1 container (foreign formats need an external adapter)",
            path.display()
        )));
    }
    Ok(())
}

/// Stderr spinner for verbose mode.  Owns no engine state; joined before
/// the surrounding command returns.
struct Spinner {
    done:   Option<Arc<AtomicBool>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Spinner {
    fn start(enabled: bool) -> Self {
        if !enabled {
            return Spinner { done: None, handle: None };
        }
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        let handle = std::thread::spawn(move || {
            let frames = ['|', '/', '-', '\\'];
            let mut i = 0usize;
            while !flag.load(Ordering::Relaxed) {
                eprint!("\r{}", frames[i % frames.len()]);
                let _ = std::io::stderr().flush();
                i += 1;
                std::thread::sleep(Duration::from_millis(120));
            }
            eprint!("\r \r");
            let _ = std::io::stderr().flush();
        });
        Spinner { done: Some(done), handle: Some(handle) }
    }

    fn stop(mut self) {
        if let Some(done) = self.done.take() {
            done.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
