//! Command-line front-end over `rix-eval`/`rix-store`/`rix-cycles`
//! (`spec.md` §6). Deliberately thin: every subcommand constructs a
//! fresh `Arena`/`EvalState`/`FsStore` and does one piece of work, the
//! same "one process per invocation" shape `nix/store/main.cc`'s
//! subcommand dispatch uses, and consistent with §5's "no in-process
//! parallel evaluation" rule.

mod errors;
mod render;

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rix_arena::{Arena, Term};
use rix_eval::{Config, EvalState};
use rix_store::{FsStore, Store, StorePath};
use tracing_subscriber::EnvFilter;

use errors::CliError;

#[derive(Parser)]
#[command(name = "rix", about = "Core evaluator and derivation-instantiation engine")]
struct Cli {
    /// Root directory for all content-addressed artifacts.
    #[arg(long, env = "RIX_STORE_DIR", default_value = "/nix/store", global = true)]
    store_dir: String,

    /// A directory searched by `import` when given a relative path.
    /// May be repeated.
    #[arg(short = 'I', long = "search-dir", global = true)]
    search_dir: Vec<String>,

    /// Platform string surfaced as `__curPlatform` and defaulted into
    /// a derivation's `system` attribute.
    #[arg(long, env = "RIX_SYSTEM", global = true)]
    system: Option<String>,

    /// Advisory parallelism limit for external builders.
    #[arg(long, env = "RIX_MAX_JOBS", default_value_t = 1, global = true)]
    max_jobs: u32,

    /// Open the store read-only; any write fails fast.
    #[arg(long, global = true)]
    read_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and evaluate an inline expression, printing its normal form.
    Eval { expr: String },

    /// Parse and evaluate a file, printing the `drvPath` of the
    /// resulting derivation attrs.
    Instantiate { file: PathBuf },

    /// Register an indirect GC root pointing at a store path.
    AddRoot { link: PathBuf },

    /// Store-level operations.
    #[command(subcommand)]
    Store(StoreCommand),

    /// Scan a built output for reference cycles against a set of
    /// store paths, printing any cycle paths found.
    FindCycles {
        dir: PathBuf,
        #[arg(required = true)]
        refs: Vec<String>,
    },
}

#[derive(Subcommand)]
enum StoreCommand {
    /// Ingest a path into the store, printing the resulting store path.
    Add {
        path: PathBuf,
        /// `nar` is accepted as a synonym over `flat` ingestion: this
        /// core doesn't define a NAR wire format, only content-addressed
        /// flat ingestion (`spec.md` non-goals; see DESIGN.md).
        #[arg(long, value_enum, default_value_t = IngestMode::Flat)]
        mode: IngestMode,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum IngestMode {
    Flat,
    Nar,
}

fn build_config(cli: &Cli) -> Config {
    let mut config = Config::default();
    config.store_dir = cli.store_dir.clone();
    config.search_dirs = cli.search_dir.clone();
    if let Some(system) = &cli.system {
        config.this_system = system.clone();
    }
    config.max_jobs = cli.max_jobs;
    config.read_only_mode = cli.read_only;
    config
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = build_config(&cli);
    let store = FsStore::new(config.store_dir.clone(), config.read_only_mode);

    match &cli.command {
        Command::Eval { expr } => cmd_eval(&config, &store, expr)?,
        Command::Instantiate { file } => cmd_instantiate(&config, &store, file)?,
        Command::AddRoot { link } => cmd_add_root(&store, link)?,
        Command::Store(StoreCommand::Add { path, mode }) => cmd_store_add(&store, path, *mode)?,
        Command::FindCycles { dir, refs } => cmd_find_cycles(&config, dir, refs)?,
    }

    Ok(())
}

fn cmd_eval(config: &Config, store: &FsStore, expr: &str) -> Result<(), CliError> {
    let arena = Arena::new();
    let term = rix_parser::parse(&arena, expr)?;
    let state = EvalState::new(&arena, store, config.clone());
    let result = state.eval(term)?;
    state.log_stats();
    println!("{}", render::format_term(&arena, result));
    Ok(())
}

fn cmd_instantiate(config: &Config, store: &FsStore, file: &PathBuf) -> Result<(), CliError> {
    let source = std::fs::read_to_string(file)?;
    let arena = Arena::new();
    let term = rix_parser::parse(&arena, &source)?;
    let state = EvalState::new(&arena, store, config.clone());
    let result = state.eval(term)?;
    state.log_stats();

    let drv_path = match arena.get(result) {
        Term::Attrs(bindings) => bindings.iter().find(|(k, _)| k.as_ref() == "drvPath").map(|(_, v)| *v),
        _ => None,
    };
    let drv_path = drv_path.ok_or(CliError::NotADerivation)?;
    match arena.get(drv_path) {
        Term::Path(s) => println!("{s}"),
        _ => return Err(CliError::NotADerivation),
    }
    Ok(())
}

fn cmd_add_root(store: &FsStore, link: &PathBuf) -> Result<(), CliError> {
    store.add_indirect_root(link)?;
    println!("{}", link.display());
    Ok(())
}

fn cmd_store_add(store: &FsStore, path: &PathBuf, mode: IngestMode) -> Result<(), CliError> {
    if matches!(mode, IngestMode::Nar) {
        tracing::debug!("`nar` mode is a synonym over flat ingestion in this core");
    }
    let store_path = store.add_to_store(path)?;
    println!("{}", store_path.to_absolute_path(store.store_dir()));
    Ok(())
}

fn cmd_find_cycles(config: &Config, dir: &PathBuf, refs: &[String]) -> Result<(), CliError> {
    let mut parsed_refs = BTreeSet::new();
    for r in refs {
        let store_path = StorePath::from_absolute_path(r, &config.store_dir)
            .map_err(|e| CliError::InvalidRef(r.clone(), e))?;
        parsed_refs.insert(store_path);
    }

    let multiedges = rix_cycles::find_cycles(dir, &parsed_refs)?;
    if multiedges.is_empty() {
        println!("no cycles found");
    }
    for edge in &multiedges {
        let rendered: Vec<&str> = edge.iter().map(String::as_str).collect();
        println!("{}", rendered.join(" -> "));
    }
    Ok(())
}
