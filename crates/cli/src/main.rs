//! revisit command-line entry point.
//!
//! Issues one conditional fetch and prints the outcome as a JSON line on
//! stdout. Logging goes to stderr so stdout carries only the result.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use futures_util::StreamExt;
use revisit_client::{Content, FetchOutcome, FetchRequest, Fetcher, Format, Payload};
use revisit_core::{AppConfig, Error};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

/// Fetch a resource only when it changed since the last run.
#[derive(Debug, Parser)]
#[command(name = "revisit", version)]
struct Cli {
    /// URL or filesystem path to fetch.
    locator: String,

    /// Decode format (csv, tsv, ssv, json, yaml, toml, ndjson, html, ...).
    #[arg(long)]
    format: Option<Format>,

    /// Explicit cache identifier (defaults to a hash of the request).
    #[arg(long)]
    cache_id: Option<String>,

    /// Ignore the prior cache record for comparisons.
    #[arg(long)]
    no_cache: bool,

    /// Skip the fetch when the last evaluation is more recent than this.
    #[arg(long, value_name = "MS")]
    cooldown_ms: Option<u64>,

    /// Treat an unchanged content length as unchanged content.
    #[arg(long)]
    size_only: bool,

    /// Follow HTML meta-refresh redirects.
    #[arg(long)]
    meta_redirects: bool,

    /// Transcode the body from this charset to UTF-8.
    #[arg(long)]
    charset: Option<String>,

    /// Request method.
    #[arg(long, default_value = "GET")]
    method: String,

    /// Extra request header, `Name: value`. Repeatable.
    #[arg(long = "header", value_name = "K:V", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Accepted response status. Repeatable (default: 200).
    #[arg(long = "success-status", value_name = "N")]
    success_statuses: Vec<u16>,

    /// Write the body to stdout as it arrives instead of decoding it.
    #[arg(long)]
    stream: bool,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl Cli {
    fn request(&self) -> Result<FetchRequest, Error> {
        let mut builder = FetchRequest::builder(&self.locator)
            .method(&self.method)
            .cache(!self.no_cache)
            .size_only(self.size_only)
            .meta_redirects(self.meta_redirects)
            .stream(self.stream);

        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        if !self.success_statuses.is_empty() {
            builder = builder.success_codes(self.success_statuses.iter().copied());
        }
        if let Some(format) = self.format {
            builder = builder.format(format);
        }
        if let Some(id) = &self.cache_id {
            builder = builder.cache_id(id);
        }
        if let Some(ms) = self.cooldown_ms {
            builder = builder.cooldown(Duration::from_millis(ms));
        }
        if let Some(charset) = &self.charset {
            builder = builder.charset(charset);
        }

        builder.build()
    }
}

/// JSON form of a decoded value.
fn content_json(content: &Content) -> Value {
    match content {
        Content::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => json!({ "bytes": bytes.len() }),
        },
        Content::Text(text) => Value::String(text.clone()),
        Content::Json(value) => value.clone(),
        Content::Markup(doc) => Value::String(doc.html().to_string()),
    }
}

fn unchanged_line<T>(outcome: &FetchOutcome<T>) -> Option<Value> {
    outcome
        .reason()
        .map(|reason| json!({ "status": "unchanged", "reason": reason }))
}

fn failure_line(error: &Error) -> Value {
    json!({ "status": "failed", "error": error.code(), "message": error.to_string() })
}

async fn run(cli: Cli) -> Result<Result<(), Error>> {
    let config = AppConfig::load()?;
    let request = match cli.request() {
        Ok(request) => request,
        Err(e) => return Ok(Err(e)),
    };
    let fetcher = match Fetcher::from_config(&config).await {
        Ok(fetcher) => fetcher,
        Err(e) => return Ok(Err(e)),
    };

    tracing::debug!(?request, "fetching");
    let outcome = match fetcher.fetch(&request).await {
        Ok(outcome) => outcome,
        Err(e) => return Ok(Err(e)),
    };

    if let Some(line) = unchanged_line(&outcome) {
        println!("{line}");
        return Ok(Ok(()));
    }

    match outcome.into_changed() {
        Some(Payload::Content(content)) => {
            println!("{}", json!({ "status": "changed", "reason": null, "value": content_json(&content) }));
        }
        Some(Payload::Stream(mut stream)) => {
            tracing::info!(url = %stream.meta().url, status = stream.meta().status, "streaming body");
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(chunk) => stdout.write_all(&chunk).await?,
                    Err(e) => return Ok(Err(e)),
                }
            }
            stdout.flush().await?;
        }
        None => {}
    }

    Ok(Ok(()))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    match run(cli).await? {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "fetch failed");
            println!("{}", failure_line(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use revisit_client::{MarkupDoc, UnchangedReason};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("Accept: text/csv").unwrap(), ("Accept".into(), "text/csv".into()));
        assert_eq!(parse_header("X-Time:12:30").unwrap(), ("X-Time".into(), "12:30".into()));
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_request_from_args() {
        let cli = Cli::parse_from([
            "revisit",
            "https://example.com/data.csv",
            "--format",
            "csv",
            "--cache-id",
            "prices",
            "--cooldown-ms",
            "1500",
            "--header",
            "Accept: text/csv",
            "--success-status",
            "200",
            "--success-status",
            "203",
        ]);
        let request = cli.request().unwrap();
        assert_eq!(request.format(), Some(Format::Csv));
        assert_eq!(request.cache_id(), "prices");
        assert_eq!(request.cooldown(), Some(Duration::from_millis(1500)));
        assert_eq!(request.success_codes(), &[200, 203]);
        assert_eq!(request.headers(), &[("Accept".to_string(), "text/csv".to_string())]);
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(Cli::try_parse_from(["revisit", "https://example.com", "--format", "docx"]).is_err());
    }

    #[test]
    fn test_output_lines() {
        let outcome: FetchOutcome<()> = FetchOutcome::Unchanged(UnchangedReason::NoChange);
        assert_eq!(unchanged_line(&outcome).unwrap(), json!({"status": "unchanged", "reason": "no-change"}));

        let failed = failure_line(&Error::StatusCode(404));
        assert_eq!(failed["error"], "STATUS_CODE");
    }

    #[test]
    fn test_content_json() {
        assert_eq!(content_json(&Content::Bytes(b"plain".to_vec().into())), json!("plain"));
        assert_eq!(content_json(&Content::Bytes(vec![0xff, 0x00].into())), json!({"bytes": 2}));
        assert_eq!(content_json(&Content::Json(json!([1]))), json!([1]));
        let doc = MarkupDoc::parse("<p>x</p>");
        assert!(content_json(&Content::Markup(doc)).as_str().unwrap().contains("<p>x</p>"));
    }
}
