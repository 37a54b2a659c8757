use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Errors surfaced by request handlers
#[derive(Debug, Error)]
pub enum BlogError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("未授权访问，请先登录")]
    Unauthorized,
    #[error("没有权限执行该操作")]
    Forbidden,
    #[error("{0}")]
    Conflict(String),
    #[error("上传文件过大")]
    PayloadTooLarge,
}

pub type BlogResult<T> = Result<T, BlogError>;

impl BlogError {
    pub fn not_found(what: &str) -> Self {
        BlogError::NotFound(format!("{}不存在", what))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        BlogError::BadRequest(message.into())
    }

    /// Message safe to hand back to the client
    pub fn public_message(&self) -> String {
        match self {
            BlogError::Database(_) => "数据库错误".to_string(),
            BlogError::Io(_) => "服务器内部错误".to_string(),
            BlogError::Template(_) => "页面渲染失败".to_string(),
            BlogError::Upstream(_) => "上游服务请求失败".to_string(),
            other => other.to_string(),
        }
    }
}

/// Unique-constraint violations become conflicts instead of 500s
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl ResponseError for BlogError {
    fn status_code(&self) -> StatusCode {
        match self {
            BlogError::Database(_) | BlogError::Io(_) | BlogError::Template(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BlogError::Upstream(_) | BlogError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            BlogError::NotFound(_) => StatusCode::NOT_FOUND,
            BlogError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BlogError::Unauthorized => StatusCode::UNAUTHORIZED,
            BlogError::Forbidden => StatusCode::FORBIDDEN,
            BlogError::Conflict(_) => StatusCode::CONFLICT,
            BlogError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        }
        HttpResponse::build(status).json(serde_json::json!({
            "code": status.as_u16(),
            "message": self.public_message(),
            "data": null
        }))
    }
}
