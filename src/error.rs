use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 字段级校验错误（对外 JSON 为 {field, code, message}）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// 字段名（camelCase，与查询参数一致）
    pub field: String,
    /// 稳定错误码，用于程序化处理
    pub code: String,
    /// 人类可读的错误信息
    pub message: String,
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// 应用统一错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 参数校验错误（携带字段级明细，映射 400）
    #[error("参数校验失败")]
    Validation(Vec<FieldError>),

    /// 字体资源不可用
    #[error("字体资源不可用: {0}")]
    FontUnavailable(String),

    /// 图像渲染错误
    #[error("图像渲染失败: {0}")]
    Render(String),

    /// 内部错误（含 panic 等非常规失败的兜底归类）
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一错误响应体。
///
/// 设计目标：
/// - 所有失败（校验/字体/渲染/未知）都收敛为同一结构，便于调用方稳定处理
/// - `details` 仅在有字段级明细时出现；错误体不携带堆栈等内部信息
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    /// 恒为 false
    pub success: bool,
    /// 分类后的错误信息
    pub error: String,
    /// 可选：字段级校验错误明细
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
    /// HTTP 状态码（与响应 status 一致）
    pub status: u16,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::FontUnavailable(_) | AppError::Render(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = self.to_string();
        let details = match self {
            AppError::Validation(fields) => Some(fields),
            _ => None,
        };

        let envelope = ErrorEnvelope {
            success: false,
            error,
            details,
            status: status.as_u16(),
        };

        let mut res = Json(envelope).into_response();
        *res.status_mut() = status;
        // 错误响应不可被中间缓存
        res.headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        res
    }
}

/// 将路由内逃逸的 panic 归一化为统一错误响应（由 CatchPanicLayer 调用）。
///
/// panic 载荷只进日志，不回显给调用方。
pub fn panic_to_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    tracing::error!(target: "ogen_backend::panic", "请求处理发生 panic: {detail}");

    AppError::Internal("未知错误".to_string()).into_response()
}
