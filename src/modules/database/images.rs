use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::{BlogError, BlogResult};
use crate::pagination::PageQuery;
use crate::schema::{now, open_connection, placeholders};

pub const IMAGE_SORTABLE: &[&str] = &["created_at", "size", "original_name", "id"];

/// Public URL prefix of stored uploads
pub const UPLOADS_URL: &str = "/uploads";

/// 已上传图片
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub url: String,
    pub size: i64,
    pub mime_type: String,
    pub width: i64,
    pub height: i64,
    pub uploaded_by: Option<i64>,
    pub created_at: String,
}

const IMAGE_SELECT: &str = "SELECT id, filename, original_name, url, size, mime_type, width, height,
        uploaded_by, created_at
     FROM images";

fn row_to_image(row: &Row) -> Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        filename: row.get(1)?,
        original_name: row.get(2)?,
        url: row.get(3)?,
        size: row.get(4)?,
        mime_type: row.get(5)?,
        width: row.get(6)?,
        height: row.get(7)?,
        uploaded_by: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// MIME type for an accepted image extension
pub fn image_mime(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// 图片数据库
pub struct ImageDB {
    conn: Connection,
}

impl ImageDB {
    pub fn new(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: open_connection(db_path)?,
        })
    }

    /// Store an uploaded image as `<uuid>.<ext>` and record it
    pub fn save_upload(
        &self,
        uploads_dir: &Path,
        limits: &UploadConfig,
        original_name: &str,
        data: &[u8],
        uploaded_by: Option<i64>,
    ) -> BlogResult<Image> {
        let extension = extension_of(original_name)
            .filter(|ext| image_mime(ext).is_some())
            .ok_or_else(|| BlogError::bad_request("只支持 jpg、png、gif、webp、svg 格式的图片"))?;
        let mime_type = image_mime(&extension).unwrap_or("application/octet-stream");
        if data.is_empty() {
            return Err(BlogError::bad_request("上传文件为空"));
        }
        if data.len() > limits.max_size_bytes {
            return Err(BlogError::PayloadTooLarge);
        }

        let (width, height) = if extension == "svg" {
            (0, 0)
        } else {
            match imagesize::blob_size(data) {
                Ok(size) => (size.width as i64, size.height as i64),
                Err(e) => {
                    log::warn!("无法读取图片尺寸 {}: {}", original_name, e);
                    return Err(BlogError::bad_request("无法识别的图片文件"));
                }
            }
        };

        std::fs::create_dir_all(uploads_dir)?;
        let filename = format!("{}.{}", Uuid::new_v4().simple(), extension);
        std::fs::write(uploads_dir.join(&filename), data)?;

        let url = format!("{}/{}", UPLOADS_URL, filename);
        let original_name = Path::new(original_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(original_name);
        let inserted = self.conn.execute(
            "INSERT INTO images (filename, original_name, url, size, mime_type, width, height, uploaded_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                filename,
                original_name,
                url,
                data.len() as i64,
                mime_type,
                width,
                height,
                uploaded_by,
                now()
            ],
        );
        if let Err(e) = inserted {
            // 记录没写进去, 文件也不留
            Self::remove_file(uploads_dir, &filename);
            return Err(e.into());
        }
        let id = self.conn.last_insert_rowid();
        log::info!("保存上传图片 {} -> {}", original_name, filename);

        self.get(id)?.ok_or_else(|| BlogError::not_found("图片"))
    }

    pub fn list(&self, page: &PageQuery) -> Result<(Vec<Image>, i64)> {
        let mut where_clause = String::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(pattern) = page.like_pattern() {
            where_clause.push_str(" WHERE original_name LIKE ? ESCAPE '\\'");
            values.push(Value::Text(pattern));
        }
        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM images{}", where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        let mut stmt = self.conn.prepare(&format!(
            "{}{} ORDER BY {} LIMIT {} OFFSET {}",
            IMAGE_SELECT,
            where_clause,
            page.order_clause(),
            page.page_size,
            page.offset()
        ))?;
        let images = stmt
            .query_map(params_from_iter(values.iter()), row_to_image)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((images, total))
    }

    pub fn get(&self, id: i64) -> Result<Option<Image>> {
        self.conn
            .query_row(&format!("{} WHERE id = ?", IMAGE_SELECT), params![id], row_to_image)
            .optional()
    }

    fn remove_file(uploads_dir: &Path, filename: &str) {
        if let Err(e) = std::fs::remove_file(uploads_dir.join(filename)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("删除图片文件失败 {}: {}", filename, e);
            }
        }
    }

    /// Remove the row and the stored file
    pub fn delete(&self, uploads_dir: &Path, id: i64) -> Result<bool> {
        let Some(image) = self.get(id)? else {
            return Ok(false);
        };
        self.conn
            .execute("DELETE FROM images WHERE id = ?", params![id])?;
        Self::remove_file(uploads_dir, &image.filename);
        Ok(true)
    }

    pub fn batch_delete(&self, uploads_dir: &Path, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let in_clause = placeholders(ids.len());
        let filenames: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT filename FROM images WHERE id IN ({})", in_clause))?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter()), |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute(
            &format!("DELETE FROM images WHERE id IN ({})", in_clause),
            params_from_iter(ids.iter()),
        )?;
        tx.commit()?;

        for filename in &filenames {
            Self::remove_file(uploads_dir, filename);
        }
        Ok(rows)
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaginationConfig;
    use crate::pagination::PageParams;

    /// Smallest valid GIF: 1x1 pixel
    const GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
    ];

    fn setup() -> (tempfile::TempDir, ImageDB, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let db = ImageDB::new(&dir.path().join("images.db").to_string_lossy()).unwrap();
        let uploads = dir.path().join("uploads");
        (dir, db, uploads)
    }

    fn limits() -> UploadConfig {
        UploadConfig {
            max_size_bytes: 1024,
        }
    }

    #[test]
    fn test_save_upload_records_dimensions() {
        let (_dir, db, uploads) = setup();
        let image = db
            .save_upload(&uploads, &limits(), "dir/pixel.GIF", GIF, None)
            .unwrap();
        assert_eq!((image.width, image.height), (1, 1));
        assert_eq!(image.mime_type, "image/gif");
        assert_eq!(image.original_name, "pixel.GIF");
        assert!(image.filename.ends_with(".gif"));
        assert_eq!(image.url, format!("/uploads/{}", image.filename));
        assert!(uploads.join(&image.filename).exists());
    }

    #[test]
    fn test_svg_has_zero_dimensions() {
        let (_dir, db, uploads) = setup();
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"/>"#;
        let image = db.save_upload(&uploads, &limits(), "logo.svg", svg, None).unwrap();
        assert_eq!((image.width, image.height), (0, 0));
    }

    #[test]
    fn test_rejections() {
        let (_dir, db, uploads) = setup();
        assert!(matches!(
            db.save_upload(&uploads, &limits(), "notes.txt", b"hello", None),
            Err(BlogError::BadRequest(_))
        ));
        assert!(matches!(
            db.save_upload(&uploads, &limits(), "big.png", &[0u8; 2048], None),
            Err(BlogError::PayloadTooLarge)
        ));
        assert!(matches!(
            db.save_upload(&uploads, &limits(), "fake.png", b"not a png", None),
            Err(BlogError::BadRequest(_))
        ));
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_removes_files() {
        let (_dir, db, uploads) = setup();
        let a = db.save_upload(&uploads, &limits(), "a.gif", GIF, None).unwrap();
        let b = db.save_upload(&uploads, &limits(), "b.gif", GIF, None).unwrap();
        let c = db.save_upload(&uploads, &limits(), "c.gif", GIF, None).unwrap();

        let page = PageQuery::from_params(
            &PageParams {
                search: Some("b.".into()),
                ..Default::default()
            },
            &PaginationConfig::default(),
            IMAGE_SORTABLE,
        );
        let (found, total) = db.list(&page).unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].id, b.id);

        assert!(db.delete(&uploads, a.id).unwrap());
        assert!(!uploads.join(&a.filename).exists());
        assert!(!db.delete(&uploads, a.id).unwrap());

        assert_eq!(db.batch_delete(&uploads, &[b.id, c.id]).unwrap(), 2);
        assert!(!uploads.join(&c.filename).exists());
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_failed_insert_removes_file() {
        let (_dir, db, uploads) = setup();
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_images BEFORE INSERT ON images
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let err = db.save_upload(&uploads, &limits(), "pixel.gif", GIF, None).unwrap_err();
        assert!(matches!(err, BlogError::Database(_)));
        assert_eq!(std::fs::read_dir(&uploads).unwrap().count(), 0);
    }
}
