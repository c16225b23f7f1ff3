//! survey-export: render survey registrations as CSV or ZIP
//!
//! Usage:
//!   # Latest batch of survey 7 from a blob store directory, CSV to stdout
//!   survey-export csv --store ./bucket --survey 7
//!
//!   # A batch document on disk, ZIP with subform tables
//!   survey-export zip --input batch.json --output surveys.zip
//!
//!   # Registration overview, forms list, attachments of one registration
//!   survey-export list --store ./bucket --survey 7
//!   survey-export forms --store ./bucket
//!   survey-export attachments --store ./bucket --survey 7 --registration r1

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use survey_export::source::{decode_document, list_attachments, list_forms};
use survey_export::{
    load_batch, registration_list, Batch, ExportConfig, ExportScope, FsBlobStore, SurveyExporter,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "survey-export")]
#[command(about = "Render survey registrations as CSV or ZIP", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every registration as one row of a single CSV
    Csv {
        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        format: FormatArgs,

        /// Output file (stdout if omitted)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Render a ZIP with the main table plus one CSV per subform
    Zip {
        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        format: FormatArgs,

        /// Where to copy the finished archive
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Directory for the temporary export scope (default: system temp)
        #[arg(long)]
        temp_dir: Option<PathBuf>,

        /// Export scope id (default: random)
        #[arg(long)]
        scope: Option<String>,
    },

    /// Print registration summaries per form as JSON
    List {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Print the available forms per folder as JSON
    Forms {
        /// Blob store directory
        #[arg(long, env = "SURVEY_EXPORT_STORE")]
        store: PathBuf,
    },

    /// Print the attachments of a survey or registration as JSON
    Attachments {
        /// Blob store directory
        #[arg(long, env = "SURVEY_EXPORT_STORE")]
        store: PathBuf,

        #[arg(long)]
        survey: String,

        #[arg(long)]
        registration: Option<String>,
    },
}

/// Where the batch comes from: a document on disk, or a store and survey id
#[derive(Args, Debug)]
struct BatchArgs {
    /// Batch document (`{"elements": [...]}`), `-` for stdin
    #[arg(long, short = 'i', conflicts_with_all = ["store", "survey"])]
    input: Option<String>,

    /// Blob store directory
    #[arg(long, requires = "survey")]
    store: Option<PathBuf>,

    /// Survey (form) id
    #[arg(long)]
    survey: Option<String>,
}

#[derive(Args, Debug)]
struct FormatArgs {
    /// Field delimiter of the main table (default: ';')
    #[arg(long)]
    delimiter: Option<char>,

    /// Field delimiter of subform tables (default: ',')
    #[arg(long)]
    subform_delimiter: Option<char>,

    /// Separator joining lists of scalars (default: " | ")
    #[arg(long)]
    list_separator: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Csv {
            batch,
            format,
            output,
        } => {
            let config = build_config(&format, None)?;
            let batch = read_batch(&batch)?;
            let bytes = SurveyExporter::new(config).render_csv(&batch)?;

            match output {
                Some(path) => std::fs::write(&path, &bytes)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => std::io::stdout()
                    .write_all(&bytes)
                    .context("Failed to write to stdout")?,
            }
        }
        Command::Zip {
            batch,
            format,
            output,
            temp_dir,
            scope,
        } => {
            let config = build_config(&format, temp_dir)?;
            let batch = read_batch(&batch)?;

            let scope = match scope {
                Some(id) => ExportScope::acquire(&config.temp_root, &id)?,
                None => ExportScope::fresh(&config.temp_root)?,
            };
            let archive = SurveyExporter::new(config).render_zip(&batch, &scope)?;
            std::fs::copy(&archive, &output)
                .with_context(|| format!("Failed to copy archive to {}", output.display()))?;
            // dropping the scope removes every temporary artifact
        }
        Command::List { batch } => {
            let batch = read_batch(&batch)?;
            print_json(&registration_list(&batch))?;
        }
        Command::Forms { store } => {
            print_json(&list_forms(&FsBlobStore::new(store))?)?;
        }
        Command::Attachments {
            store,
            survey,
            registration,
        } => {
            let attachments =
                list_attachments(&FsBlobStore::new(store), &survey, registration.as_deref())?;
            print_json(&attachments)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(format: &FormatArgs, temp_dir: Option<PathBuf>) -> Result<ExportConfig> {
    let mut config = ExportConfig::default();
    if let Some(delimiter) = format.delimiter {
        config.main_delimiter = ascii_delimiter(delimiter)?;
    }
    if let Some(delimiter) = format.subform_delimiter {
        config.subform_delimiter = ascii_delimiter(delimiter)?;
    }
    if let Some(separator) = &format.list_separator {
        config.list_separator = separator.clone();
    }
    if let Some(dir) = temp_dir {
        config.temp_root = dir;
    }
    Ok(config)
}

fn ascii_delimiter(delimiter: char) -> Result<u8> {
    anyhow::ensure!(
        delimiter.is_ascii(),
        "Delimiter must be a single ASCII character, got {delimiter:?}"
    );
    Ok(delimiter as u8)
}

fn read_batch(args: &BatchArgs) -> Result<Batch> {
    if let Some(input) = &args.input {
        let mut content = Vec::new();
        if input == "-" {
            std::io::stdin()
                .read_to_end(&mut content)
                .context("Failed to read stdin")?;
        } else {
            File::open(input)
                .and_then(|mut file| file.read_to_end(&mut content))
                .with_context(|| format!("Failed to read {input}"))?;
        }
        let document = decode_document(&content, input)?;
        return Ok(Batch::from_document(document, input)?);
    }

    match (&args.store, &args.survey) {
        (Some(store), Some(survey)) => Ok(load_batch(&FsBlobStore::new(store), survey)?),
        _ => anyhow::bail!("Either --input or --store with --survey is required"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", output);
    Ok(())
}
