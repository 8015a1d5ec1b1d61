//! docmap CLI - load XML documents into relational tables
//!
//! This CLI tool reconciles a database schema against a mapping descriptor and
//! materializes a directory of XML documents into it.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::mpsc;
use std::thread;
use tracing_subscriber::EnvFilter;

use docmap::config::DATABASE_URL_ENV;
use docmap::storage::Dialect;
use docmap::{
    load_descriptor, Converter, DiagnosticKind, DirectorySource, DocumentErrorPolicy, MappingTree, MemoryStore,
    OrphanPolicy, Reconciler, RunConfig, RunEvent, RunLog, RunReport, SqlStore,
};

#[derive(Parser)]
#[command(name = "docmap")]
#[command(version, about = "Descriptor-driven materialization of XML documents into relational tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a directory of documents into the target database
    Convert(ConvertArgs),

    /// Validate a mapping descriptor without touching any database
    Validate {
        /// Path to the mapping descriptor (.yaml, .yml or .json)
        #[arg(short, long)]
        mapping: PathBuf,

        /// Name of the root table column identifying the source document
        #[arg(long, default_value = "fileName")]
        file_name_column: String,
    },

    /// Print the CREATE TABLE statements a mapping descriptor implies
    Schema {
        /// Path to the mapping descriptor (.yaml, .yml or .json)
        #[arg(short, long)]
        mapping: PathBuf,

        /// SQL dialect (postgres, mysql, sqlite)
        #[arg(short, long, default_value = "sqlite")]
        dialect: Dialect,

        /// Name of the root table column identifying the source document
        #[arg(long, default_value = "fileName")]
        file_name_column: String,
    },
}

#[derive(Args)]
struct ConvertArgs {
    /// Run file (YAML); flags below override its settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the mapping descriptor (.yaml, .yml or .json)
    #[arg(short, long)]
    mapping: Option<PathBuf>,

    /// Directory containing the input documents
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// File name pattern of input documents (e.g. "*.xml")
    #[arg(short, long)]
    pattern: Option<String>,

    /// Database URL - overrides DATABASE_URL and the run file
    #[arg(short, long)]
    database_url: Option<String>,

    /// Directory for the default timestamped SQLite database
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// What to do with children of a failed row (continue_with_sentinel, skip_subtree)
    #[arg(long)]
    orphan_policy: Option<OrphanPolicy>,

    /// What to do with unreadable documents (abort_run, skip_document)
    #[arg(long)]
    document_policy: Option<DocumentErrorPolicy>,

    /// Write the run report as JSON to this file
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Convert into memory only and print what would be inserted
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert(args) => convert(args),
        Commands::Validate { mapping, file_name_column } => validate(mapping, file_name_column),
        Commands::Schema {
            mapping,
            dialect,
            file_name_column,
        } => print_schema(mapping, dialect, file_name_column),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Build the run configuration with precedence: CLI > DATABASE_URL > run file > defaults
fn run_config(args: &ConvertArgs) -> Result<RunConfig, String> {
    let mut config = match (&args.config, &args.mapping) {
        (Some(path), _) => RunConfig::from_file(path).map_err(|e| format!("Failed to load run file: {}", e))?,
        (None, Some(mapping)) => RunConfig::new(mapping),
        (None, None) => return Err("either --config or --mapping is required".to_string()),
    };

    if let Some(mapping) = &args.mapping {
        config.mapping = mapping.clone();
    }
    if let Some(input) = &args.input {
        config.input = input.clone();
    }
    if let Some(pattern) = &args.pattern {
        config.pattern = pattern.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.clone();
    }
    if let Some(policy) = args.orphan_policy {
        config.orphan_policy = policy;
    }
    if let Some(policy) = args.document_policy {
        config.document_policy = policy;
    }
    if let Some(report) = &args.report {
        config.report = Some(report.clone());
    }

    config.override_database_url(std::env::var(DATABASE_URL_ENV).ok(), args.database_url.clone());
    config.validate().map_err(|e| e.to_string())?;

    Ok(config)
}

fn load_tree(mapping: &Path) -> Result<MappingTree, String> {
    let descriptor = load_descriptor(mapping).map_err(|e| format!("Failed to load mapping: {}", e))?;
    MappingTree::build(&descriptor).map_err(|e| format!("Invalid mapping {}: {}", mapping.display(), e))
}

/// Convert every matching document in the input directory
fn convert(args: ConvertArgs) -> Result<(), String> {
    let config = run_config(&args)?;
    let tree = load_tree(&config.mapping)?;
    let source = DirectorySource::new(&config.input, &config.pattern).map_err(|e| e.to_string())?;
    let converter = Converter::with_options(&tree, config.convert_options());

    println!("🔧 Converting {} ({})...", config.input.display(), config.pattern);

    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        for event in rx {
            match event {
                RunEvent::Diagnostic(diagnostic) if diagnostic.kind == DiagnosticKind::Progress => {
                    println!("  ✓ {}", diagnostic);
                }
                RunEvent::Diagnostic(_) => {}
                RunEvent::Completed(status) => println!("  ℹ Run finished: {:?}", status),
            }
        }
    });

    let report = if args.dry_run {
        println!("  ℹ Dry run: nothing is written to a database");
        let mut store = MemoryStore::new();
        converter.convert(&mut store, source.documents(), RunLog::with_channel(tx))
    } else {
        let url = config.database_url();
        if Dialect::from_url(&url) == Dialect::Sqlite {
            std::fs::create_dir_all(&config.output_dir)
                .map_err(|e| format!("Failed to create output directory: {}", e))?;
        }
        println!("  ℹ Database: {}", redact(&url));

        let mut store = SqlStore::connect(&url).map_err(|e| format!("Failed to connect to database: {}", e))?;
        converter.convert(&mut store, source.documents(), RunLog::with_channel(tx))
    };

    printer
        .join()
        .map_err(|_| "progress printer thread panicked".to_string())?;

    print_summary(&report);

    if let Some(path) = &config.report {
        let json = report
            .to_json_pretty()
            .map_err(|e| format!("Failed to serialize report: {}", e))?;
        std::fs::write(path, json).map_err(|e| format!("Failed to write report {}: {}", path.display(), e))?;
        println!("  ✓ Report written to {}", path.display());
    }

    if report.status.is_success() {
        Ok(())
    } else {
        Err(format!("conversion did not complete ({:?})", report.status))
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!("📊 Rows inserted:");
    for (table, rows) in &report.rows_per_table {
        println!("  {:<30} {:>8}", table, rows);
    }
    if report.failed_inserts > 0 {
        println!("  ⚠ {} row(s) rejected by the database", report.failed_inserts);
    }
}

/// Hide the password of a database URL.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            match credentials.find(':') {
                Some(colon) => format!("{}{}:****{}", &url[..scheme_end + 3], &credentials[..colon], &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

/// Load and check a mapping descriptor
fn validate(mapping: PathBuf, file_name_column: String) -> Result<(), String> {
    println!("🔍 Validating {}...", mapping.display());

    let tree = load_tree(&mapping)?;
    let diagnostics = tree.lint(&file_name_column);

    for diagnostic in &diagnostics {
        println!("  ⚠ {}", diagnostic);
    }

    println!(
        "  ✓ {} table(s): {} root, {} group(s)",
        tree.group_count() + 1,
        tree.root_table(),
        tree.group_count()
    );

    if diagnostics.is_empty() {
        println!("✅ Mapping is valid");
    } else {
        println!("✅ Mapping is usable, with {} warning(s)", diagnostics.len());
    }
    Ok(())
}

/// Print DDL for every table of a mapping descriptor
fn print_schema(mapping: PathBuf, dialect: Dialect, file_name_column: String) -> Result<(), String> {
    let tree = load_tree(&mapping)?;

    for spec in Reconciler::new(&tree, &file_name_column).table_specs() {
        println!("{};\n", dialect.create_table_sql(&spec));
    }
    Ok(())
}
