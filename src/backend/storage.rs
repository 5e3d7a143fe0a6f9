//! Object storage: uploads and public URL retrieval

use reqwest::{multipart, Client};

use crate::backend::CLIENT_INFO;
use crate::error::Error;

/// Content types accepted for image uploads
const IMAGE_CONTENT_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/webp", "image/gif"];

/// Options for a file upload
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Overwrite an existing object at the same path
    pub upsert: bool,

    /// Cache-Control header value; defaults to one hour
    pub cache_control: Option<String>,
}

/// Client for object storage operations
pub struct StorageClient {
    /// The base URL for the project
    url: String,

    /// The anonymous API key
    key: String,

    /// HTTP client used for requests
    client: Client,

    /// Bearer token of the current session, if any
    token: Option<String>,
}

impl StorageClient {
    pub(crate) fn new(url: &str, key: &str, client: Client, token: Option<String>) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            client,
            token,
        }
    }

    fn get_url(&self, path: &str) -> String {
        format!("{}/storage/v1{}", self.url, path)
    }

    /// Upload an object to a bucket
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
        options: UploadOptions,
    ) -> Result<(), Error> {
        let url = self.get_url(&format!("/object/{}/{}", bucket, path));

        let file_name = path.rsplit('/').next().unwrap_or("file").to_string();
        let part = multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str(content_type)?;
        let form = multipart::Form::new().part("file", part);

        let mut request = self
            .client
            .post(&url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .header(
                "Cache-Control",
                options.cache_control.unwrap_or_else(|| "3600".to_string()),
            )
            .header("x-upsert", options.upsert.to_string());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.multipart(form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::storage(format!(
                "upload failed with status {}: {}",
                status, text
            )));
        }

        Ok(())
    }

    /// The public URL for an object in a public bucket
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.url, bucket, path)
    }
}

/// Check an image upload before any network call.
///
/// Rejections carry user-facing messages.
pub fn validate_image(data: &[u8], content_type: &str, max_bytes: usize) -> Result<(), Error> {
    if !IMAGE_CONTENT_TYPES.contains(&content_type) {
        return Err(Error::validation(
            "Avatar must be a PNG, JPEG, WebP or GIF image.",
        ));
    }
    if data.len() > max_bytes {
        return Err(Error::validation(format!(
            "Avatar exceeds the maximum size of {} MB.",
            max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}
