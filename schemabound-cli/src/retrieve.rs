//! Loading of documents that are referenced but not registered yet.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use schemabound::{ResolveError, Retrieve};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::debug;
use url::Url;

use crate::constant::user_agent;

/// Parse a JSON or YAML document.
pub fn parse_document(text: &str) -> Result<Value, String> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(json_error) => serde_yaml::from_str::<Value>(text)
            .map_err(|yaml_error| format!("not JSON ({json_error}) nor YAML ({yaml_error})")),
    }
}

/// Retrieves files from disk and `http(s)` documents over the network.
///
/// `retrieve` blocks, so it must run on a blocking thread of the runtime the
/// retriever was created in.
pub struct DocumentRetriever {
    client: reqwest::Client,
    handle: Handle,
}

impl DocumentRetriever {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&user_agent())?);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            handle: Handle::try_current()?,
        })
    }

    fn read_file(&self, uri: &str, path: PathBuf) -> Result<Value, ResolveError> {
        let text = std::fs::read_to_string(&path)
            .map_err(|err| ResolveError::unretrievable(uri, err))?;
        parse_document(&text).map_err(|err| ResolveError::unretrievable(uri, err))
    }

    fn fetch(&self, uri: &str) -> Result<Value, ResolveError> {
        let text = self.handle.block_on(async {
            let response = self.client.get(uri).send().await?.error_for_status()?;
            response.text().await
        });
        let text = text.map_err(|err| ResolveError::unretrievable(uri, err))?;
        debug!("Retrieved {}", uri);
        parse_document(&text).map_err(|err| ResolveError::unretrievable(uri, err))
    }
}

impl Retrieve for DocumentRetriever {
    fn retrieve(&self, uri: &str) -> Result<Value, ResolveError> {
        debug!("Retrieving {}", uri);
        let Ok(url) = Url::parse(uri) else {
            return self.read_file(uri, PathBuf::from(uri));
        };
        match url.scheme() {
            "http" | "https" => self.fetch(uri),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| ResolveError::unretrievable(uri, "invalid file URL"))?;
                self.read_file(uri, path)
            }
            scheme => Err(ResolveError::unretrievable(
                uri,
                format!("unsupported scheme `{scheme}`"),
            )),
        }
    }
}
