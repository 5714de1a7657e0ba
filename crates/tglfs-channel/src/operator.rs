//! OpenDAL Operator factory for mailbox backends

use std::path::Path;

use anyhow::{Context, Result};
use opendal::Operator;

use tglfs_core::config::{ChannelBackend, ChannelConfig};

/// Minimal settings needed to build an S3 operator
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    /// Key prefix all conversations live under
    pub root: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for an S3-compatible endpoint
///
/// Uses path-style addressing (default in opendal 0.55), which SeaweedFS and
/// MinIO require.
pub fn build_operator(cfg: &S3Settings) -> Result<Operator> {
    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .root(&cfg.root)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

fn build_fs(root: &Path) -> Result<Operator> {
    let root = root
        .to_str()
        .with_context(|| format!("mailbox root is not valid UTF-8: {}", root.display()))?;
    let op = Operator::new(opendal::services::Fs::default().root(root))
        .context("creating OpenDAL fs operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

fn build_memory() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .finish())
}

/// Build the mailbox operator named by `[channel]` config.
///
/// `root` must already be tilde-expanded. S3 credentials are only consulted
/// for the s3 backend. If `enforce_tls` is set and the S3 endpoint uses
/// HTTP, this returns an error; otherwise a warning is logged for non-HTTPS
/// endpoints.
pub fn build_from_config(
    channel: &ChannelConfig,
    root: &Path,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    match channel.backend {
        ChannelBackend::Fs => build_fs(root),
        ChannelBackend::Memory => {
            tracing::warn!("memory mailbox selected: stored chunks are lost when the process exits");
            build_memory()
        }
        ChannelBackend::S3 => {
            if channel.endpoint.starts_with("http://") {
                if channel.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set channel.enforce_tls = false for local development.",
                        channel.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %channel.endpoint,
                    "S3 endpoint uses plaintext HTTP, credentials are transmitted unencrypted. \
                     Set channel.enforce_tls = true and use HTTPS in production."
                );
            }

            build_operator(&S3Settings {
                endpoint: channel.endpoint.clone(),
                region: channel.region.clone(),
                bucket: channel.bucket.clone(),
                root: root.to_string_lossy().into_owned(),
                access_key_id: access_key_id.to_string(),
                secret_access_key: secret_access_key.to_string(),
            })
        }
    }
}
