use crate::auth::Session;
use crate::error::ApiError;
use crate::image_processing;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAvatarRequest {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub file_data: String, // base64 encoded
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAvatarResponse {
    pub image_url: String,
}

pub fn avatar_key(identity_id: &str, image_id: &str) -> String {
    format!("avatars/{}/{}.jpg", identity_id, image_id)
}

pub fn public_url(bucket: &str, key: &str) -> String {
    format!("https://{}.s3.amazonaws.com/{}", bucket, key)
}

/// Check the declared type and decode the payload, stripping any
/// `data:image/...;base64,` prefix.
pub fn decode_upload(request: &UploadAvatarRequest) -> Result<Vec<u8>, ApiError> {
    let extension = request
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let content_type = request.content_type.to_ascii_lowercase();
    let allowed_type = content_type.is_empty()
        || content_type == "image/jpeg"
        || content_type == "image/jpg"
        || content_type == "image/png";
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) || !allowed_type {
        return Err(ApiError::Validation("Images only (jpg, jpeg, png)".to_string()));
    }

    let data = match request.file_data.split_once(";base64,") {
        Some((_, payload)) => payload,
        None => request.file_data.as_str(),
    };
    if data.trim().is_empty() {
        return Err(ApiError::Validation("No file uploaded".to_string()));
    }
    STANDARD
        .decode(data.trim())
        .map_err(|e| ApiError::Validation(format!("Failed to decode base64: {}", e)))
}

/// Resize the uploaded image and store it under the caller's avatar prefix.
pub async fn upload_avatar(
    s3_client: &S3Client,
    bucket: &str,
    session: &Session,
    request: UploadAvatarRequest,
) -> Result<UploadAvatarResponse, ApiError> {
    let bytes = decode_upload(&request)?;
    let (width, height, jpeg) =
        image_processing::prepare_avatar(&bytes).map_err(ApiError::Validation)?;

    let key = avatar_key(session.id(), &uuid::Uuid::new_v4().to_string());
    s3_client
        .put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(jpeg))
        .content_type("image/jpeg")
        .send()
        .await
        .map_err(|e| ApiError::Upstream(format!("Failed to upload to S3: {}", e)))?;

    tracing::info!(
        "Avatar {} ({}x{}) uploaded for user {}",
        key,
        width,
        height,
        session.id()
    );
    Ok(UploadAvatarResponse {
        image_url: public_url(bucket, &key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(file_name: &str, content_type: &str, file_data: &str) -> UploadAvatarRequest {
        UploadAvatarRequest {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            file_data: file_data.to_string(),
        }
    }

    #[test]
    fn test_avatar_key_layout() {
        assert_eq!(avatar_key("u1", "img"), "avatars/u1/img.jpg");
        assert_eq!(
            public_url("patajob-avatars", "avatars/u1/img.jpg"),
            "https://patajob-avatars.s3.amazonaws.com/avatars/u1/img.jpg"
        );
    }

    #[test]
    fn test_decode_upload_accepts_data_urls() {
        let encoded = STANDARD.encode(b"raw-bytes");
        let plain = decode_upload(&request("me.PNG", "image/png", &encoded)).unwrap();
        assert_eq!(plain, b"raw-bytes");

        let data_url = format!("data:image/png;base64,{}", encoded);
        let stripped = decode_upload(&request("me.png", "", &data_url)).unwrap();
        assert_eq!(stripped, b"raw-bytes");
    }

    #[test]
    fn test_decode_upload_rejects_other_types() {
        let encoded = STANDARD.encode(b"GIF89a");
        assert!(matches!(
            decode_upload(&request("anim.gif", "image/gif", &encoded)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            decode_upload(&request("photo.jpg", "application/pdf", &encoded)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            decode_upload(&request("photo.jpg", "image/jpeg", "")),
            Err(ApiError::Validation(_))
        ));
    }
}
