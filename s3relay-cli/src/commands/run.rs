//! Run command - relay the configured source into S3 once.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde_json::Value;
use tracing::info;

use s3relay::config::RelayConfig;
use s3relay::handler::{HandlerResponse, InvocationContext, RelayHandler};
use s3relay::relay::RelayError;
use s3relay::source::HttpSource;
use s3relay::storage::MemoryBackend;

use crate::error::CliError;

/// Arguments for the run command. Every flag overrides the config file and
/// the environment.
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// URL of the file to download
    #[arg(long)]
    pub url: Option<String>,

    /// Destination S3 bucket
    #[arg(long)]
    pub bucket: Option<String>,

    /// File name used to derive the key (source_folder/<file-name>)
    #[arg(long)]
    pub file_name: Option<String>,

    /// Explicit object key (overrides --file-name)
    #[arg(long)]
    pub key: Option<String>,

    /// Network read size in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Part size in bytes (at least 5 MiB)
    #[arg(long)]
    pub part_size: Option<usize>,

    /// Tries per part (1 = no retry)
    #[arg(long)]
    pub max_part_attempts: Option<u32>,

    /// AWS region
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3 endpoint (MinIO, LocalStack, ...)
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Source connect and read timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Invocation event as JSON (logged, otherwise unused)
    #[arg(long)]
    pub event: Option<String>,

    /// Upload into an in-memory backend instead of S3
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Apply the flags over a loaded configuration.
    pub fn apply(&self, mut config: RelayConfig) -> RelayConfig {
        if let Some(url) = &self.url {
            config = config.with_source_url(url);
        }
        if let Some(bucket) = &self.bucket {
            config = config.with_bucket(bucket);
        }
        if let Some(file_name) = &self.file_name {
            config = config.with_file_name(file_name);
        }
        if let Some(key) = &self.key {
            config = config.with_object_key(key);
        }
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        if let Some(part_size) = self.part_size {
            config = config.with_part_size(part_size);
        }
        if let Some(attempts) = self.max_part_attempts {
            config = config.with_max_part_attempts(attempts);
        }
        if let Some(region) = &self.region {
            config = config.with_region(region);
        }
        if let Some(endpoint) = &self.endpoint_url {
            config = config.with_endpoint_url(endpoint);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        config
    }

    fn parse_event(&self) -> Result<Value, CliError> {
        match &self.event {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| CliError::Config(format!("--event is not valid JSON: {}", e))),
            None => Ok(Value::Object(Default::default())),
        }
    }
}

/// Run the run command.
///
/// Prints the handler response as JSON on stdout. Returns
/// `CliError::RelayFailed` when the response is an error.
pub fn run(args: RunArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let event = args.parse_event()?;

    let config = RelayConfig::load(config_path)
        .map(|config| args.apply(config))
        .and_then(|config| config.validate().map(|_| config));
    let config = match config {
        Ok(config) => config,
        Err(e) => return report(HandlerResponse::from_error(&RelayError::from(e))),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let context = InvocationContext::new(format!("cli-{}", std::process::id()));
    let response = runtime.block_on(execute(config, args.dry_run, &event, &context));
    report(response)
}

async fn execute(
    config: RelayConfig,
    dry_run: bool,
    event: &Value,
    context: &InvocationContext,
) -> HandlerResponse {
    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        info!("Interrupted, cancelling relay");
    };

    if dry_run {
        let source = match HttpSource::with_timeout(config.chunk_size, config.timeout) {
            Ok(source) => source,
            Err(e) => return HandlerResponse::from_error(&e),
        };
        let bucket = config.bucket.clone();
        let key = config.resolved_key();
        let backend = Arc::new(MemoryBackend::default().with_bucket(bucket.as_str()));

        let handler = RelayHandler::new(config, Arc::new(source), backend.clone());
        let response = handler.handle_until(event, context, cancel).await;

        if let Some(object) = backend.object(&bucket, &key) {
            eprintln!(
                "dry run: s3://{}/{} would be {} bytes in {} parts (etag {})",
                bucket,
                key,
                object.data.len(),
                object.part_sizes.len(),
                object.etag
            );
        }
        return response;
    }

    match RelayHandler::from_config(config).await {
        Ok(handler) => handler.handle_until(event, context, cancel).await,
        Err(e) => HandlerResponse::from_error(&e),
    }
}

fn report(response: HandlerResponse) -> Result<(), CliError> {
    println!("{}", response.to_json());
    if response.is_success() {
        Ok(())
    } else {
        Err(CliError::RelayFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = RunArgs {
            bucket: Some("cli-bucket".to_string()),
            key: Some("a/b.csv".to_string()),
            part_size: Some(8 * 1024 * 1024),
            timeout: Some(30),
            ..Default::default()
        };
        let config = args.apply(RelayConfig::default().with_bucket("file-bucket"));

        assert_eq!(config.bucket, "cli-bucket");
        assert_eq!(config.resolved_key(), "a/b.csv");
        assert_eq!(config.part_size, 8 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let base = RelayConfig::default().with_bucket("file-bucket");
        let config = RunArgs::default().apply(base.clone());
        assert_eq!(config, base);
    }

    #[test]
    fn test_event_parsing() {
        let args = RunArgs {
            event: Some(r#"{"source":"cron"}"#.to_string()),
            ..Default::default()
        };
        assert_eq!(args.parse_event().unwrap()["source"], "cron");

        let args = RunArgs {
            event: Some("{not json".to_string()),
            ..Default::default()
        };
        assert!(matches!(args.parse_event(), Err(CliError::Config(_))));

        assert!(RunArgs::default().parse_event().unwrap().is_object());
    }
}
