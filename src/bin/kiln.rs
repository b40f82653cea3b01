//! kiln: Move newline-delimited JSON into SQLite and back
//!
//! Usage:
//!   # Infer a schema from the first 20 records
//!   kiln analyze --input data.jsonl > schema.sql
//!
//!   # Create a database and load records through a schema
//!   kiln create-db --schema schema.sql --db data.db
//!   kiln load --input data.jsonl --db data.db --schema schema.sql
//!
//!   # Reconstruct the records
//!   kiln dump --db data.db --schema schema.sql
//!
//!   # All of the above in one step
//!   kiln import --input data.jsonl --db data.db --schema schema.sql

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kiln::{AnalyzeOptions, DatabaseSchema, LoadOptions};
use std::io::{stdout, BufWriter};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Move newline-delimited JSON into SQLite and back", long_about = None)]
struct Cli {
    /// Log debug details (symbol decisions, omitted fields)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Infer a schema from a sample and print it as DDL
    Analyze {
        /// Line-delimited JSON input file
        #[arg(long)]
        input: PathBuf,

        #[command(flatten)]
        inference: InferenceArgs,
    },

    /// Create a fresh database from a DDL file
    CreateDb {
        /// SQL DDL file
        #[arg(long)]
        schema: PathBuf,

        /// SQLite database file (replaced if it exists)
        #[arg(long)]
        db: PathBuf,
    },

    /// Load records into an existing database
    Load {
        /// Line-delimited JSON input file
        #[arg(long)]
        input: PathBuf,

        /// SQLite database file
        #[arg(long)]
        db: PathBuf,

        /// SQL DDL file matching the database
        #[arg(long)]
        schema: PathBuf,

        /// Reuse an identical existing row for each nested object (slow on
        /// large child tables)
        #[arg(long)]
        reuse: bool,
    },

    /// Print every record of a database, one JSON object per line
    Dump {
        /// SQLite database file
        #[arg(long)]
        db: PathBuf,

        /// SQL DDL file matching the database
        #[arg(long)]
        schema: PathBuf,
    },

    /// Analyze, create the database and load it in one step
    Import {
        /// Line-delimited JSON input file
        #[arg(long)]
        input: PathBuf,

        /// SQLite database file (replaced if it exists)
        #[arg(long)]
        db: PathBuf,

        /// If supplied, write the inferred DDL to this file
        #[arg(long)]
        schema: Option<PathBuf>,

        #[command(flatten)]
        inference: InferenceArgs,
    },

    /// Print the schema model parsed from a DDL file as JSON
    Inspect {
        /// SQL DDL file
        #[arg(long)]
        schema: PathBuf,

        /// Compact output (no pretty-printing)
        #[arg(long)]
        compact: bool,
    },
}

#[derive(Args, Debug)]
struct InferenceArgs {
    /// How many records to sample for schema inference
    #[arg(long, default_value_t = 20)]
    sample: usize,

    /// Emit CREATE INDEX statements
    #[arg(long)]
    indexes: bool,

    /// Do not index nested-object foreign keys
    #[arg(long, requires = "indexes")]
    no_fk_indexes: bool,

    /// Do not index symbol columns and symbol values
    #[arg(long, requires = "indexes")]
    no_symbol_indexes: bool,
}

impl InferenceArgs {
    fn options(&self) -> AnalyzeOptions {
        AnalyzeOptions {
            sample_size: self.sample,
            generate_indexes: self.indexes,
            index_foreign_keys: !self.no_fk_indexes,
            index_symbol_fields: !self.no_symbol_indexes,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else if cli.quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Command::Analyze { input, inference } => {
            let analysis = kiln::analyze_path(&input, &inference.options())
                .with_context(|| format!("analyze {}", input.display()))?;
            print!("{}", analysis.ddl());
        }
        Command::CreateDb { schema, db } => {
            let ddl = read_ddl(&schema)?;
            kiln::create_database(&db, &ddl)
                .with_context(|| format!("create database {}", db.display()))?;
            info!(db = %db.display(), "wrote database");
        }
        Command::Load {
            input,
            db,
            schema,
            reuse,
        } => {
            let schema = load_schema(&schema)?;
            let options = LoadOptions {
                reuse_child_rows: reuse,
            };
            let report = kiln::load_path(&input, &db, &schema, options)
                .context("data load error")?;
            info!(
                input = %input.display(),
                db = %db.display(),
                inserted = report.inserted,
                "loaded"
            );
        }
        Command::Dump { db, schema } => {
            let schema = load_schema(&schema)?;
            let out = BufWriter::new(stdout().lock());
            kiln::dump_path(&db, &schema, out).context("dump error")?;
        }
        Command::Import {
            input,
            db,
            schema,
            inference,
        } => {
            let analysis = kiln::analyze_path(&input, &inference.options())
                .with_context(|| format!("analyze {}", input.display()))?;
            if let Some(path) = &schema {
                // Written before loading so the DDL survives a failed load
                std::fs::write(path, analysis.ddl())
                    .with_context(|| format!("write DDL {}", path.display()))?;
            }
            let import = kiln::import_analyzed(&input, &db, analysis).context("import")?;
            info!(
                input = %input.display(),
                db = %db.display(),
                inserted = import.report.inserted,
                tables = import.analysis.schema.tables.len(),
                "imported"
            );
        }
        Command::Inspect { schema, compact } => {
            let schema = load_schema(&schema)?;
            let output = if compact {
                serde_json::to_string(&schema)?
            } else {
                serde_json::to_string_pretty(&schema)?
            };
            println!("{}", output);
        }
    }

    Ok(())
}

fn read_ddl(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read DDL {}", path.display()))
}

/// Parse a DDL file into a schema that has a `main` table
fn load_schema(path: &Path) -> Result<DatabaseSchema> {
    let schema = kiln::parse_ddl(&read_ddl(path)?);
    schema
        .main_table()
        .with_context(|| format!("parse DDL {}", path.display()))?;
    Ok(schema)
}
