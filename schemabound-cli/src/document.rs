use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use schemabound::resolver::resolve_pointer;
use schemabound::{
    Components, InlineLimits, Registry, ResolutionCache, Resolver, TransformConfig,
    to_jsonschema,
};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::exception::DocumentError;
use crate::retrieve::parse_document;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecVersion {
    OpenApi2,
    OpenApi3,
    /// A plain JSON Schema document.
    JsonSchema,
}

impl SpecVersion {
    pub fn detect(contents: &Value) -> Self {
        let starts_with = |keyword: &str, prefix: &str| {
            contents
                .get(keyword)
                .and_then(Value::as_str)
                .is_some_and(|version| version.starts_with(prefix))
        };
        if starts_with("swagger", "2") {
            SpecVersion::OpenApi2
        } else if starts_with("openapi", "3") {
            SpecVersion::OpenApi3
        } else {
            SpecVersion::JsonSchema
        }
    }

    /// Local pointer prefix of the schema component table.
    pub fn components_prefix(self) -> Option<&'static str> {
        match self {
            SpecVersion::OpenApi2 => Some("#/definitions"),
            SpecVersion::OpenApi3 => Some("#/components/schemas"),
            SpecVersion::JsonSchema => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

#[derive(Clone, Debug)]
pub struct Document {
    pub uri: String,
    pub contents: Value,
    pub version: SpecVersion,
}

impl Document {
    pub fn new(uri: impl Into<String>, contents: Value, version: Option<SpecVersion>) -> Self {
        let version = version.unwrap_or_else(|| SpecVersion::detect(&contents));
        Self {
            uri: uri.into(),
            contents,
            version,
        }
    }

    fn component_table(&self) -> Option<(&'static str, &Value)> {
        let prefix = self.version.components_prefix()?;
        let table = resolve_pointer(&self.contents, &prefix[1..])?;
        Some((prefix, table))
    }

    pub fn components(&self) -> Components {
        match self.component_table() {
            Some((prefix, table)) => Components::new().with_table(prefix, table.clone()),
            None => Components::new(),
        }
    }

    /// Every schema of the component table, or the whole document without one.
    pub fn default_pointers(&self) -> Vec<String> {
        match self.component_table() {
            Some((prefix, Value::Object(table))) => table
                .keys()
                .map(|name| format!("{}/{}", &prefix[1..], escape_token(name)))
                .collect(),
            _ => vec![String::new()],
        }
    }

    pub fn schema_at(&self, pointer: &str) -> Result<Value, DocumentError> {
        resolve_pointer(&self.contents, pointer)
            .cloned()
            .ok_or_else(|| {
                DocumentError::new(format!("Pointer `{pointer}` does not exist in {}", self.uri))
            })
    }

    pub fn transform_config(
        &self,
        cache: Arc<ResolutionCache>,
        direction: Option<Direction>,
        limits: InlineLimits,
    ) -> TransformConfig {
        let config = TransformConfig::new(cache)
            .with_components(Arc::new(self.components()))
            .with_limits(limits);
        let config = match self.version {
            SpecVersion::OpenApi2 => config.for_openapi2(),
            SpecVersion::OpenApi3 | SpecVersion::JsonSchema => config.for_openapi3(),
        };
        match direction {
            Some(Direction::Request) => config.for_request(),
            Some(Direction::Response) => config.for_response(),
            None => config,
        }
    }
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Read a JSON or YAML document from disk.
pub async fn load_document(
    path: &Path,
    version: Option<SpecVersion>,
) -> Result<Document, DocumentError> {
    let path = tokio::fs::canonicalize(path).await.map_err(|err| {
        DocumentError::new(format!("Failed to open {}: {err}", path.display()))
    })?;
    let text = tokio::fs::read_to_string(&path).await.map_err(|err| {
        DocumentError::new(format!("Failed to read {}: {err}", path.display()))
    })?;
    let contents = parse_document(&text)
        .map_err(|err| DocumentError::new(format!("Invalid document {}: {err}", path.display())))?;
    let document = Document::new(path.to_string_lossy(), contents, version);
    debug!("Loaded {} as {:?}", document.uri, document.version);
    Ok(document)
}

/// Transform the schema at every pointer, at most `workers` at a time.
///
/// Results are returned in the order of `pointers`.
pub async fn transform_pointers(
    document: Arc<Document>,
    pointers: Vec<String>,
    registry: Registry,
    config: TransformConfig,
    workers: usize,
) -> Vec<(String, anyhow::Result<Value>)> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let resolver: Arc<dyn Resolver> = Arc::new(registry.resolver(document.uri.clone()));
    info!("Transforming {} schemas from {}", pointers.len(), document.uri);
    let tasks = pointers.into_iter().map(|pointer| {
        let semaphore = Arc::clone(&semaphore);
        let resolver = Arc::clone(&resolver);
        let config = config.clone();
        let document = Arc::clone(&document);
        async move {
            let result = transform_one(&document, &pointer, semaphore, resolver, config).await;
            (pointer, result)
        }
    });
    futures::future::join_all(tasks).await
}

async fn transform_one(
    document: &Document,
    pointer: &str,
    semaphore: Arc<Semaphore>,
    resolver: Arc<dyn Resolver>,
    config: TransformConfig,
) -> anyhow::Result<Value> {
    let _permit = semaphore.acquire_owned().await?;
    let schema = document.schema_at(pointer)?;
    let schema = tokio::task::spawn_blocking(move || to_jsonschema(schema, &resolver, &config))
        .await?
        .with_context(|| format!("Failed to transform `{pointer}`"))?;
    debug!("Transformed {}", pointer);
    Ok(schema)
}
