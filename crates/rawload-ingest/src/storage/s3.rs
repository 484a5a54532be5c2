use super::{ListPage, ObjectStore};
use crate::config::StorageConfig;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{config::Region, error::DisplayErrorContext, primitives::ByteStream, Client};
use tracing::{debug, info, instrument};

/// S3 (or S3-compatible) bucket
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from `config`
    ///
    /// Static keys win when both are configured; otherwise the default AWS
    /// credential chain (env, profile, instance role) is used.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        debug!("Initializing storage with config: {:?}", config);

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "rawload-static",
            ));
        }

        let shared = loader.load().await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "Storage client initialized"
        );

        Ok(Self::from_client(client, config.bucket.clone()))
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn location(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    #[instrument(skip(self))]
    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(continuation.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                IngestError::enumeration(
                    format!("s3://{}/{}", self.bucket, prefix),
                    DisplayErrorContext(&e),
                )
            })?;

        let keys: Vec<String> = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect();

        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        debug!(
            "Listed {} keys in s3://{}/{} (more: {})",
            keys.len(),
            self.bucket,
            prefix,
            next_token.is_some()
        );

        Ok(ListPage { keys, next_token })
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| IngestError::transfer(key, DisplayErrorContext(&e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| IngestError::transfer(key, e))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(data)
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));

        if key.ends_with(".csv") {
            request = request.content_type("text/csv");
        }

        request
            .send()
            .await
            .map_err(|e| IngestError::transfer(key, DisplayErrorContext(&e)))?;

        debug!("Uploaded to s3://{}/{}", self.bucket, key);

        Ok(())
    }
}
