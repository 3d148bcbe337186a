//! HTTP client backend that delegates query verbs to a running
//! `wicked-search serve` gateway instead of opening the on-disk store
//! directly, over the uniform `/api/v1/data/{plugin}/{source}/{verb}`
//! surface.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

use crate::cli::VerbArgs;

/// Talks to a remote gateway on behalf of the CLI's query-verb mirror.
pub struct HttpQueryBackend {
    client: Client,
    base_url: String,
}

impl HttpQueryBackend {
    /// `base_url` is the gateway's root, e.g. `"http://127.0.0.1:18889"`.
    pub fn new<S: Into<String>>(base_url: S) -> Result<Self> {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, base_url })
    }

    /// Executes `verb` against `wicked-search/wicked-search` and returns the
    /// raw JSON body (success envelope or `{error: ...}`) along with the
    /// HTTP status code, so the caller can translate it to the CLI's
    /// process exit codes without re-parsing the gateway's error shape.
    pub fn call_verb(&self, verb: &str, args: &VerbArgs) -> Result<(u16, serde_json::Value)> {
        let url = format!(
            "{}/api/v1/data/wicked-search/wicked-search/{verb}",
            self.base_url
        );
        let mut query: Vec<(&str, String)> = vec![
            ("limit", args.limit.to_string()),
            ("offset", args.offset.to_string()),
            ("direction", args.direction.clone()),
        ];
        if let Some(project) = &args.project {
            query.push(("project", project.clone()));
        }
        if let Some(q) = &args.query {
            query.push(("query", q.clone()));
        }
        if let Some(id) = &args.id {
            query.push(("id", id.clone()));
        }
        if let Some(depth) = args.depth {
            query.push(("depth", depth.to_string()));
        }
        if let Some(layer) = &args.layer {
            query.push(("layer", layer.clone()));
        }
        if let Some(symbol_type) = &args.symbol_type {
            query.push(("type", symbol_type.clone()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status().as_u16();
        let body = response
            .json::<serde_json::Value>()
            .context("failed to decode gateway response as JSON")?;
        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_trims_trailing_slash_from_base_url() {
        let backend = HttpQueryBackend::new("http://127.0.0.1:18889/").unwrap();
        assert_eq!(backend.base_url, "http://127.0.0.1:18889");
    }
}
