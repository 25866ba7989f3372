use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::og::fonts::FontCache;

/// 应用共享状态。
///
/// 除字体缓存（single-flight 协调）与渲染许可外，请求之间无共享可变状态。
#[derive(Clone)]
pub struct AppState {
    /// 进程级字体缓存
    pub font_cache: Arc<FontCache>,
    /// 头像抓取用的共享 HTTP 客户端
    pub icon_client: reqwest::Client,
    /// 栅格化并发许可
    pub render_semaphore: Arc<Semaphore>,
    /// 渲染是否优先速度
    pub optimize_speed: bool,
    /// 头像内嵌的最大字节数
    pub icon_max_bytes: usize,
    /// API 路由前缀（重定向拼接用）
    pub api_prefix: String,
}

impl AppState {
    /// 按配置构建共享状态
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let max_parallel = if config.image.max_parallel == 0 {
            num_cpus::get()
        } else {
            config.image.max_parallel as usize
        };

        let icon_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(
                config.image.icon_fetch_timeout_ms,
            ))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP 客户端初始化失败: {e}")))?;

        Ok(Self {
            font_cache: Arc::new(FontCache::new(
                config.fonts.family.clone(),
                config.normal_font_path(),
                config.bold_font_path(),
            )),
            icon_client,
            render_semaphore: Arc::new(Semaphore::new(max_parallel)),
            optimize_speed: config.image.optimize_speed,
            icon_max_bytes: config.image.icon_max_bytes,
            api_prefix: config.api.prefix.clone(),
        })
    }
}
