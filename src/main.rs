use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ormsql::ast::{validate_sql, CommandCache, Compiler, DialectKind, Node};
use ormsql::config::CompilerConfig;
use tracing_subscriber::EnvFilter;

/// Compile ORM query trees into dialect-specific SQL
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to <config dir>/ormsql/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile an IR tree stored as JSON and print the command and parameters
    Compile {
        /// Path to the IR tree (JSON)
        input: PathBuf,

        /// Target dialect: mysql, postgres, sqlite or ansi
        #[arg(long)]
        dialect: Option<DialectKind>,

        /// Inline boolean and integer constants
        #[arg(long)]
        evaluate_constants: bool,

        /// Schema prefix for table names
        #[arg(long)]
        schema: Option<String>,

        /// Lock selected rows
        #[arg(long)]
        for_update: bool,

        /// Re-parse the generated command with the dialect's SQL grammar
        #[arg(long)]
        check: bool,
    },
    /// List supported dialects and their capabilities
    Dialects,
}

fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = CompilerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Compile {
            input,
            dialect,
            evaluate_constants,
            schema,
            for_update,
            check,
        } => {
            if let Some(dialect) = dialect {
                config.dialect = dialect;
            }
            config.evaluate_constants |= evaluate_constants;
            if schema.is_some() {
                config.schema_name = schema;
            }
            let mut options = config.compile_options();
            options.for_update = for_update;

            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let ir: Node = serde_json::from_str(&content)
                .with_context(|| format!("parsing IR tree in {}", input.display()))?;

            let cache = Arc::new(CommandCache::new(config.cache_capacity));
            let compiler = Compiler::with_cache(config.dialect(), options, cache);
            let command = compiler.compile(&ir)?;

            if check {
                let statements = validate_sql(&command.text, config.dialect)?;
                if statements == 0 {
                    bail!("command text contains no statement");
                }
            }

            println!("{}", command.text);
            println!("{}", serde_json::to_string_pretty(&command.parameters)?);
        }
        Command::Dialects => {
            for kind in DialectKind::ALL {
                let dialect = config_for(&config, kind).dialect();
                let supported: Vec<String> =
                    dialect.capabilities().map(|c| format!("{:?}", c)).collect();
                println!("{:<10} {}", kind.name(), supported.join(", "));
            }
        }
    }

    Ok(())
}

fn config_for(config: &CompilerConfig, kind: DialectKind) -> CompilerConfig {
    CompilerConfig {
        dialect: kind,
        ..config.clone()
    }
}
