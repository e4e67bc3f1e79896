//! A simplified S3 client that supports uploading archives.
//! It attempts to hide the complexities of working with the AWS SDK for S3.

use crate::error::SpnetError;

use aws_credential_types::Credentials;
use aws_sdk_s3::config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use bytes::Bytes;
use tracing::Instrument;
use url::Url;

#[derive(Clone, Eq, Hash, PartialEq)]
pub enum S3Credentials {
    AccessKey {
        access_key: String,
        secret_key: String,
    },
    None,
}

impl S3Credentials {
    /// Create an access key credential.
    pub fn access_key(access_key: &str, secret_key: &str) -> Self {
        S3Credentials::AccessKey {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }
}

/// S3 client object.
///
/// Created once by the caller and passed to whatever needs object storage access.
#[derive(Clone)]
pub struct S3Client {
    /// Underlying AWS SDK S3 client object.
    client: Client,
}

impl S3Client {
    /// Creates an S3Client object
    ///
    /// # Arguments
    ///
    /// * `url`: Object storage API URL
    /// * `credentials`: Object storage account credentials
    pub async fn new(url: &Url, credentials: S3Credentials) -> Self {
        let region = Region::new("us-east-1");
        let builder = aws_sdk_s3::Config::builder().behavior_version(BehaviorVersion::latest());
        let builder = match credentials {
            S3Credentials::AccessKey {
                access_key,
                secret_key,
            } => {
                let credentials = Credentials::from_keys(access_key, secret_key, None);
                builder.credentials_provider(credentials)
            }
            S3Credentials::None => builder,
        };
        let s3_config = builder
            .region(Some(region))
            .endpoint_url(url.to_string())
            .force_path_style(true)
            .build();
        let client = Client::from_conf(s3_config);
        Self { client }
    }

    /// Uploads data to an object in object storage, replacing any existing object.
    ///
    /// # Arguments
    ///
    /// * `bucket`: Name of the bucket
    /// * `key`: Name of the object in the bucket
    /// * `body`: Object data
    pub async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<(), SpnetError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .instrument(tracing::Span::current())
            .await?;
        Ok(())
    }
}

/// Return the object key for a file under an optional prefix.
///
/// Slashes around the prefix are normalised so that `summary`, `summary/` and `/summary/` all
/// produce `summary/<filename>`.
///
/// # Arguments
///
/// * `prefix`: Optional "directory" within the bucket
/// * `filename`: Name of the file
pub fn object_key(prefix: Option<&str>, filename: &str) -> String {
    match prefix.map(|prefix| prefix.trim_matches('/')) {
        Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, filename),
        _ => filename.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn make_access_key() -> S3Credentials {
        S3Credentials::access_key("user", "password")
    }

    #[tokio::test]
    async fn new() {
        let url = Url::parse("http://example.com").unwrap();
        S3Client::new(&url, make_access_key()).await;
    }

    #[tokio::test]
    async fn new_no_auth() {
        let url = Url::parse("http://example.com").unwrap();
        S3Client::new(&url, S3Credentials::None).await;
    }

    #[test]
    fn access_key() {
        assert!(make_access_key() != S3Credentials::None);
        assert!(make_access_key() == S3Credentials::access_key("user", "password"));
    }

    #[test]
    fn object_key_none() {
        assert_eq!("a.gz", object_key(None, "a.gz"));
    }

    #[test]
    fn object_key_empty() {
        assert_eq!("a.gz", object_key(Some("/"), "a.gz"));
    }

    #[test]
    fn object_key_prefix() {
        assert_eq!("summary/a.gz", object_key(Some("summary"), "a.gz"));
        assert_eq!("summary/a.gz", object_key(Some("/summary/"), "a.gz"));
        assert_eq!("out/summary/a.gz", object_key(Some("out/summary"), "a.gz"));
    }
}
