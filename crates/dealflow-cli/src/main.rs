use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dealflow_core::ChoiceDomain;
use dealflow_extract::{export_snapshots, ExtractConfig, ExtractionOutput, Extractor};
use dealflow_sources::CalamineReader;
use dealflow_storage::OutputStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dealflow")]
#[command(about = "Extract deal-pipeline workbooks into CRM-ready tables")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Debug, Clone, Args)]
struct SourceArgs {
    /// YAML workbook layout; the built-in layout is used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the source workbooks.
    #[arg(long, global = true, default_value = ".")]
    input_dir: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every extraction and write snapshot files.
    Extract {
        #[arg(long, default_value = "./output")]
        output_dir: PathBuf,
        /// Extract and report counts without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the distinct categorical values found in the pipelines.
    Choices,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,dealflow_core=info,dealflow_sources=info,dealflow_extract=info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ExtractConfig> {
    match path {
        Some(path) => ExtractConfig::from_yaml_file(path)
            .with_context(|| format!("loading source layout from {}", path.display())),
        None => Ok(ExtractConfig::default()),
    }
}

fn print_counts(output: &ExtractionOutput) {
    for (table, count) in output.table_counts() {
        println!("{table}: {count}");
    }
    println!("source errors: {}", output.error_count());
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.source.config.as_deref())?;
    let mut extractor = Extractor::new(CalamineReader, config, &cli.source.input_dir);

    match cli.command.unwrap_or(Commands::Extract {
        output_dir: PathBuf::from("./output"),
        dry_run: false,
    }) {
        Commands::Extract {
            output_dir,
            dry_run,
        } => {
            let output = extractor.run_all();
            print_counts(&output);
            if dry_run {
                info!(run_id = %output.run_id, "dry run, no snapshots written");
            } else {
                let store = OutputStore::new(&output_dir);
                let manifest = export_snapshots(&output, &store)
                    .with_context(|| format!("exporting snapshots to {}", output_dir.display()))?;
                println!(
                    "extraction complete: run_id={} manifest={}",
                    output.run_id,
                    manifest.display()
                );
            }
        }
        Commands::Choices => {
            extractor.extract_deals();
            let choices = extractor.choice_fields();
            let listing = ChoiceDomain::ALL
                .iter()
                .map(|d| {
                    (
                        d.as_str(),
                        choices.values(*d).map(str::to_string).collect::<Vec<_>>(),
                    )
                })
                .collect::<std::collections::BTreeMap<_, _>>();
            println!(
                "{}",
                serde_json::to_string_pretty(&listing).context("rendering choice fields")?
            );
        }
    }

    Ok(())
}
