use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use schemabound::{Registry, ResolutionCache};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::{Config, load_config, load_config_from_string};
use crate::constant::{NAME, VERSION};
use crate::document::{Direction, SpecVersion, load_document, transform_pointers};
use crate::retrieve::DocumentRetriever;
use crate::utils::init_logging;

#[derive(Parser, Debug)]
#[command(
    name = "schemabound",
    about = "Turn schemas of an Open API document into self-contained, finite JSON Schemas.",
    disable_version_flag = true,
    help_expected = true,
    max_term_width = 100
)]
pub struct Cli {
    #[arg(value_name = "DOCUMENT", help = "Open API or JSON Schema document (JSON or YAML).")]
    document: Option<PathBuf>,

    #[arg(long = "version", short = 'V', help = "Show version and exit.")]
    version: bool,

    #[arg(long, help = "Log debug information. Default: no.")]
    debug: bool,

    #[arg(
        long = "pointer",
        short = 'p',
        value_name = "POINTER",
        help = "JSON pointer of a schema to transform. Add this option multiple times to transform several schemas. Default: every schema component, or the whole document."
    )]
    pointers: Vec<String>,

    #[arg(
        long = "direction",
        value_enum,
        help = "Drop read-only properties for requests or write-only properties for responses. Default: keep both."
    )]
    direction: Option<DirectionArg>,

    #[arg(
        long = "spec-version",
        value_enum,
        default_value = "auto",
        help = "Document flavor. Default: detected from the document."
    )]
    spec_version: SpecVersionArg,

    #[arg(
        long = "config",
        value_name = "TOML_OR_JSON",
        help = "Config TOML/JSON string to load. Default: none."
    )]
    config_string: Option<String>,

    #[arg(
        long = "config-file",
        value_name = "PATH",
        help = "Config TOML/JSON file to load. Default: ~/.schemabound/config.toml."
    )]
    config_file: Option<PathBuf>,

    #[arg(long, help = "Fail unless every result compiles as a JSON Schema. Default: no.")]
    check: bool,

    #[arg(long, help = "Print compact JSON. Default: pretty-printed.")]
    compact: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DirectionArg {
    Request,
    Response,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Request => Direction::Request,
            DirectionArg::Response => Direction::Response,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SpecVersionArg {
    Auto,
    Openapi2,
    Openapi3,
}

impl SpecVersionArg {
    fn resolve(self) -> Option<SpecVersion> {
        match self {
            SpecVersionArg::Auto => None,
            SpecVersionArg::Openapi2 => Some(SpecVersion::OpenApi2),
            SpecVersionArg::Openapi3 => Some(SpecVersion::OpenApi3),
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("{NAME}, version {VERSION}");
        return Ok(());
    }

    init_logging(cli.debug)?;
    validate_cli_args(&cli).await?;
    let Some(document_path) = cli.document.as_ref() else {
        anyhow::bail!("A document is required.");
    };

    let config = resolve_config(&cli).await?;
    let document = load_document(document_path, cli.spec_version.resolve()).await?;
    info!("Loaded {} ({:?})", document.uri, document.version);

    let retriever = DocumentRetriever::new(config.retrieval.timeout())
        .context("Failed to set up document retrieval")?;
    let registry = Registry::with_retriever(Arc::new(retriever))
        .with_document(document.uri.clone(), document.contents.clone());
    let transform_config = document.transform_config(
        Arc::new(ResolutionCache::new()),
        cli.direction.map(Direction::from),
        config.inline_limits(),
    );
    let pointers = if cli.pointers.is_empty() {
        document.default_pointers()
    } else {
        cli.pointers.clone()
    };
    let total = pointers.len();

    let results = transform_pointers(
        Arc::new(document),
        pointers,
        registry,
        transform_config,
        config.workers as usize,
    )
    .await;

    let mut output = Map::new();
    let mut failures = 0;
    for (pointer, result) in results {
        let result = result.and_then(|schema| {
            if cli.check {
                check_schema(&schema)?;
            }
            Ok(schema)
        });
        match result {
            Ok(schema) => {
                output.insert(pointer, schema);
            }
            Err(err) => {
                eprintln!("{pointer}: {err:#}");
                failures += 1;
            }
        }
    }

    let output = Value::Object(output);
    let rendered = if cli.compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    println!("{rendered}");

    if failures > 0 {
        anyhow::bail!("{failures} of {total} schemas failed.");
    }
    info!("Transformed {} schemas", total);
    Ok(())
}

async fn validate_cli_args(cli: &Cli) -> Result<()> {
    if cli.config_string.is_some() && cli.config_file.is_some() {
        anyhow::bail!("Cannot combine --config, --config-file.");
    }

    if let Some(config_string) = cli.config_string.as_ref() {
        if config_string.trim().is_empty() {
            anyhow::bail!("Config cannot be empty.");
        }
    }

    if let Some(document) = cli.document.as_ref() {
        ensure_file_exists(document, "document").await?;
    }

    if let Some(config_file) = cli.config_file.as_ref() {
        ensure_file_exists(config_file, "config file").await?;
    }

    for pointer in &cli.pointers {
        if !pointer.is_empty() && !pointer.starts_with('/') {
            anyhow::bail!("Pointer must be empty or start with `/`: {pointer}");
        }
    }

    Ok(())
}

async fn resolve_config(cli: &Cli) -> Result<Config> {
    if let Some(config_string) = cli.config_string.as_ref() {
        return load_config_from_string(config_string)
            .map_err(|err| anyhow::anyhow!(err.to_string()));
    }
    load_config(cli.config_file.as_deref())
        .await
        .map_err(|err| anyhow::anyhow!(err.to_string()))
}

async fn ensure_file_exists(path: &PathBuf, label: &str) -> Result<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("{label} does not exist: {}", path.display()))?;
    if !metadata.is_file() {
        anyhow::bail!("{label} is not a file: {}", path.display());
    }
    Ok(())
}

/// Compile `schema` to make sure downstream validators accept it.
pub fn check_schema(schema: &Value) -> Result<()> {
    jsonschema::validator_for(schema)
        .map(|_| ())
        .map_err(|err| anyhow::anyhow!("Not a valid JSON Schema: {err}"))
}
