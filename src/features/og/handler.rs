//! OG 图像 HTTP 入口。
//!
//! 请求流水线固定：校验 → 清洗 → 布局 → 取字体 → 渲染 → 组装响应。
//! 任一环节失败即短路为统一错误响应，单次请求内不重试。

use axum::{
    Router, async_trait,
    extract::{FromRequestParts, Query, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use tokio::task::spawn_blocking;

use super::params::RawOgQuery;
use super::renderer;
use super::sanitize::sanitize_params;
use super::templates::{self, TemplateId};
use crate::error::{AppError, FieldError};
use crate::state::AppState;

/// Query 提取器包装：查询串本身反序列化失败（重复键、编码损坏等）
/// 同样收敛为统一错误信封，不走 axum 默认的纯文本 400。
struct EnvelopeQuery<T>(T);

#[async_trait]
impl<S, T> FromRequestParts<S> for EnvelopeQuery<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                AppError::Validation(vec![FieldError::new(
                    "query",
                    "MALFORMED_QUERY",
                    rejection.body_text(),
                )])
            })?;
        Ok(Self(value))
    }
}

/// 输出格式。未知值回退 PNG，不产生错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Png,
    Svg,
}

impl OutputFormat {
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.eq_ignore_ascii_case("svg") => OutputFormat::Svg,
            _ => OutputFormat::Png,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Svg => "image/svg+xml; charset=utf-8",
        }
    }

    /// 成功响应的缓存策略。
    ///
    /// SVG 输出确定性强，按不可变资源长缓存；PNG 按天缓存并允许
    /// 过期后一周内先用旧值再后台刷新。两套策略不可混用。
    pub fn cache_control(self) -> &'static str {
        match self {
            OutputFormat::Png => {
                "public, max-age=86400, s-maxage=86400, stale-while-revalidate=604800"
            }
            OutputFormat::Svg => "public, max-age=31536000, immutable",
        }
    }
}

/// GET /og：由查询参数生成 OG 图像
async fn generate_og(
    State(state): State<AppState>,
    EnvelopeQuery(raw): EnvelopeQuery<RawOgQuery>,
) -> Result<Response, AppError> {
    let t0 = std::time::Instant::now();

    let params = raw.validate().map_err(AppError::Validation)?;
    let sanitized = sanitize_params(&params);
    let format = OutputFormat::resolve(raw.format.as_deref());

    let template = TemplateId::resolve(sanitized.template.as_deref());
    let tree = templates::build(template, &sanitized);

    let fonts = state.font_cache.get_fonts().await?;

    // 远程头像内嵌为 data URI；失败降级为无头像，不影响整图
    let tree = renderer::inline_remote_images(&tree, &state.icon_client, state.icon_max_bytes).await;
    let svg = renderer::layout_to_svg(&tree, state.font_cache.family())?;
    let t_svg = t0.elapsed();

    let body: Vec<u8> = match format {
        OutputFormat::Svg => svg.into_bytes(),
        OutputFormat::Png => {
            // 栅格化是 CPU 密集操作：许可限流 + 阻塞线程池
            let permit = state
                .render_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Internal(format!("渲染许可获取失败: {e}")))?;
            let fontdb = fonts.fontdb.clone();
            let family = state.font_cache.family().to_string();
            let optimize_speed = state.optimize_speed;
            let png = spawn_blocking(move || {
                let _permit = permit;
                renderer::rasterize_to_png(&svg, fontdb, &family, optimize_speed)
            })
            .await
            .map_err(|e| AppError::Internal(format!("阻塞渲染任务执行失败: {e}")))??;
            png
        }
    };

    tracing::debug!(
        target: "ogen_backend::og",
        ?template,
        ?format,
        svg = ?t_svg,
        total = ?t0.elapsed(),
        bytes = body.len(),
        "OG 图像生成完成"
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(format.cache_control()),
    );
    Ok((headers, body).into_response())
}

/// GET /：便捷重定向到带示例参数的生成端点
async fn redirect_to_og(State(state): State<AppState>) -> Redirect {
    let target = format!("{}/og?title=OGen&username=example", state.api_prefix);
    Redirect::temporary(&target)
}

/// OG 功能路由
pub fn create_og_router() -> Router<AppState> {
    Router::new()
        .route("/og", get(generate_og))
        .route("/", get(redirect_to_og))
}
