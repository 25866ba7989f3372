use axum::{Router, http::StatusCode, response::Json, routing::get};
use ogen_backend::config::AppConfig;
use ogen_backend::error::panic_to_response;
use ogen_backend::features::og::create_og_router;
use ogen_backend::state::AppState;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;

fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    // 明确排除不该压缩的响应：PNG 已自带压缩，再压只浪费 CPU；
    // SVG/JSON 文本仍走 gzip/brotli。保留默认最小大小阈值。
    SizeAbove::default()
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::const_new("application/octet-stream"))
}


async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "ogen-backend",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ogen_backend=info,tower_http=info".into()),
        )
        .init();

    if let Err(e) = AppConfig::init_global() {
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();

    let app_state = match AppState::from_config(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("应用状态初始化失败: {}", e);
            std::process::exit(1);
        }
    };

    // 字体是硬依赖，启动时提前暴露配置问题；失败仍可启动，首个请求会重试
    if let Err(e) = app_state.font_cache.get_fonts().await {
        tracing::warn!("字体预热失败（首个请求将重试）: {}", e);
    }

    let mut app = Router::<AppState>::new()
        .route("/health", get(health_check))
        .nest(&config.api.prefix, create_og_router())
        .with_state(app_state);

    // 路由内逃逸的 panic 统一转为 JSON 错误响应
    app = app.layer(CatchPanicLayer::custom(panic_to_response));
    app = app.layer(CompressionLayer::new().compress_when(compression_predicate()));

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("OG API: http://{}{}/og", addr, config.api.prefix);

    let graceful = axum::serve(listener, app).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("退出信号监听失败: {}", e);
        }
        tracing::info!("开始优雅关闭HTTP服务器...");
    });

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    tracing::info!("服务器已优雅关闭");
}
