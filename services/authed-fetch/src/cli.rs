//! Command-line arguments

use anyhow::{Context, Result};
use auth_client::{Method, RequestDescriptor};
use clap::Parser;

/// Execute one authenticated API call and print the result as JSON.
#[derive(Parser, Debug)]
#[command(name = "authed-fetch", version)]
pub struct Args {
    /// Config file (falls back to CONFIG_PATH, then authed-fetch.toml)
    #[arg(long)]
    pub config: Option<String>,

    /// Send without credentials and never refresh
    #[arg(long)]
    pub no_auth: bool,

    /// Do not raise a notice on failure
    #[arg(long)]
    pub silent: bool,

    /// Exit with an error instead of printing a failure result
    #[arg(long)]
    pub throw: bool,

    /// Path variable for a `:name` placeholder
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_pair)]
    pub vars: Vec<(String, String)>,

    /// Query parameter
    #[arg(long, value_name = "NAME=VALUE", value_parser = parse_pair)]
    pub query: Vec<(String, String)>,

    /// JSON request body
    #[arg(long, value_name = "JSON", value_parser = parse_json)]
    pub data: Option<serde_json::Value>,

    /// HTTP method
    #[arg(value_parser = parse_method)]
    pub method: Method,

    /// Path relative to base_url, or an absolute URL
    pub url: String,
}

impl Args {
    pub fn descriptor(&self) -> Result<RequestDescriptor> {
        let mut descriptor = RequestDescriptor::new(self.method.clone(), self.url.as_str());
        for (name, value) in &self.vars {
            descriptor = descriptor.path_var(name.as_str(), value);
        }
        for (name, value) in &self.query {
            descriptor = descriptor.query(name.as_str(), value);
        }
        if let Some(body) = &self.data {
            descriptor = descriptor.json(body.clone());
        }
        if self.no_auth {
            descriptor = descriptor.ignore_auth();
        }
        if self.silent {
            descriptor = descriptor.silent_error();
        }
        if self.throw {
            descriptor = descriptor.throw_error();
        }
        // Surface placeholder and header problems before any I/O
        descriptor
            .prepare()
            .with_context(|| format!("invalid request {} {}", self.method, self.url))?;
        Ok(descriptor)
    }
}

fn parse_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got: {raw}")),
    }
}

fn parse_json(raw: &str) -> std::result::Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("not valid JSON: {e}"))
}

fn parse_method(raw: &str) -> std::result::Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {raw}"))
}
