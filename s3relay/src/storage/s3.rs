//! Amazon S3 backend built on `aws-sdk-s3`.

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use super::error::StorageError;
use super::traits::{BoxFuture, MultipartBackend, PartRecord, UploadSession};

/// S3 backend.
///
/// Wraps an explicit `aws_sdk_s3::Client`; build one with [`S3Backend::connect`]
/// to use the ambient AWS credential chain.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
}

impl S3Backend {
    /// Wrap an already configured client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient AWS configuration.
    ///
    /// # Arguments
    ///
    /// * `region` - Overrides the region from the environment/profile
    /// * `endpoint_url` - Custom endpoint (MinIO, LocalStack); forces path-style URLs
    pub async fn connect(region: Option<String>, endpoint_url: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

/// Turn an SDK error into a classified `StorageError`.
///
/// Service errors keep their S3 error code. Errors without a code fall back to
/// the HTTP status: 403 is access denied, and 404 maps to `not_found_code`
/// when the call site knows what a missing resource means there.
fn classify_sdk_error<E>(err: SdkError<E>, not_found_code: Option<&str>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();

    if let Some(code) = err.code() {
        let detail = err.message().map(str::to_string).unwrap_or(message);
        return StorageError::from_code(code, detail);
    }

    let status = err.raw_response().map(|r| r.status().as_u16());
    classify_status(status, message, not_found_code)
}

fn classify_status(
    status: Option<u16>,
    message: String,
    not_found_code: Option<&str>,
) -> StorageError {
    match (status, not_found_code) {
        (Some(403), _) => StorageError::from_code("AccessDenied", message),
        (Some(404), Some(code)) => StorageError::from_code(code, message),
        _ => StorageError::unclassified(message),
    }
}

impl MultipartBackend for S3Backend {
    fn name(&self) -> &str {
        "s3"
    }

    fn create_multipart<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(async move {
            let output = self
                .client
                .create_multipart_upload()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| classify_sdk_error(e, Some("NoSuchBucket")))?;

            output.upload_id().map(str::to_string).ok_or_else(|| {
                StorageError::unclassified("CreateMultipartUpload returned no upload id")
            })
        })
    }

    fn upload_part<'a>(
        &'a self,
        session: &'a UploadSession,
        part_number: i32,
        body: Bytes,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(async move {
            let size = body.len();
            let output = self
                .client
                .upload_part()
                .bucket(&session.bucket)
                .key(&session.key)
                .upload_id(&session.upload_id)
                .part_number(part_number)
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(|e| classify_sdk_error(e, None))?;

            let etag = output.e_tag().map(str::to_string).ok_or_else(|| {
                StorageError::unclassified(format!("UploadPart {} returned no ETag", part_number))
            })?;

            debug!(part_number, size, etag = %etag, "S3 part stored");
            Ok(etag)
        })
    }

    fn complete_multipart<'a>(
        &'a self,
        session: &'a UploadSession,
        parts: &'a [PartRecord],
    ) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
        Box::pin(async move {
            let completed: Vec<CompletedPart> = parts
                .iter()
                .map(|part| {
                    CompletedPart::builder()
                        .e_tag(&part.etag)
                        .part_number(part.part_number)
                        .build()
                })
                .collect();

            let output = self
                .client
                .complete_multipart_upload()
                .bucket(&session.bucket)
                .key(&session.key)
                .upload_id(&session.upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(completed))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| classify_sdk_error(e, None))?;

            Ok(output.e_tag().map(str::to_string))
        })
    }

    fn abort_multipart<'a>(
        &'a self,
        session: &'a UploadSession,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.client
                .abort_multipart_upload()
                .bucket(&session.bucket)
                .key(&session.key)
                .upload_id(&session.upload_id)
                .send()
                .await
                .map_err(|e| classify_sdk_error(e, None))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage::StorageErrorKind;

    #[test]
    fn test_bare_404_is_missing_bucket_only_where_given() {
        let on_create = classify_status(Some(404), "not found".to_string(), Some("NoSuchBucket"));
        assert_eq!(on_create.kind, StorageErrorKind::ContainerMissing);

        let on_part = classify_status(Some(404), "not found".to_string(), None);
        assert_eq!(on_part.kind, StorageErrorKind::Other);
        assert!(!on_part.is_container_missing());
    }

    #[test]
    fn test_bare_403_is_access_denied_everywhere() {
        for not_found in [Some("NoSuchBucket"), None] {
            let err = classify_status(Some(403), "forbidden".to_string(), not_found);
            assert!(err.is_access_denied());
        }
        let err = classify_status(None, "dispatch failure".to_string(), None);
        assert_eq!(err.kind, StorageErrorKind::Other);
    }

    #[tokio::test]
    async fn test_backend_name() {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        let backend = S3Backend::new(Client::from_conf(config));
        assert_eq!(backend.name(), "s3");
    }
}
