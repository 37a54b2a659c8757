use actix_multipart::Multipart;
use futures_util::StreamExt;

use crate::error::{BlogError, BlogResult};

/// A file pulled out of a multipart body
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Read the first file field whose name is in `field_names`.
///
/// Reading stops with `PayloadTooLarge` as soon as `max_bytes` is exceeded.
pub async fn read_file_field(
    payload: &mut Multipart,
    field_names: &[&str],
    max_bytes: usize,
) -> BlogResult<UploadedFile> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| BlogError::bad_request(format!("上传数据无效: {}", e)))?;
        if !field_names.contains(&field.name()) {
            // Drain fields we do not care about
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| BlogError::bad_request(e.to_string()))?;
            }
            continue;
        }

        let filename = field
            .content_disposition()
            .get_filename()
            .unwrap_or("upload")
            .to_string();
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| BlogError::bad_request(e.to_string()))?;
            if data.len() + chunk.len() > max_bytes {
                return Err(BlogError::PayloadTooLarge);
            }
            data.extend_from_slice(&chunk);
        }
        return Ok(UploadedFile { filename, data });
    }

    Err(BlogError::bad_request("未找到上传的文件"))
}
