use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API 路由前缀
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/api".to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 日志格式
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

/// 字体资源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontsConfig {
    /// 字体文件目录
    pub dir: String,
    /// 字体族名称（SVG 中的 font-family）
    pub family: String,
    /// 常规字重（400）文件名
    pub normal_file: String,
    /// 粗体字重（700）文件名
    pub bold_file: String,
}

impl Default for FontsConfig {
    fn default() -> Self {
        Self {
            dir: "resources/fonts".to_string(),
            family: "Noto Sans JP".to_string(),
            normal_file: "NotoSansJP-Regular.ttf".to_string(),
            bold_file: "NotoSansJP-Bold.ttf".to_string(),
        }
    }
}

/// 图片渲染配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRenderConfig {
    /// 是否优先速度渲染（OptimizeSpeed），提升栅格化性能，可能略降画质
    #[serde(default)]
    pub optimize_speed: bool,
    /// 并发渲染许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// 头像抓取超时（毫秒）
    #[serde(default = "ImageRenderConfig::default_icon_fetch_timeout_ms")]
    pub icon_fetch_timeout_ms: u64,
    /// 头像内嵌的最大字节数，超过则放弃内嵌
    #[serde(default = "ImageRenderConfig::default_icon_max_bytes")]
    pub icon_max_bytes: usize,
}

impl ImageRenderConfig {
    fn default_icon_fetch_timeout_ms() -> u64 {
        3_000
    }

    fn default_icon_max_bytes() -> usize {
        2 * 1024 * 1024
    }
}

impl Default for ImageRenderConfig {
    fn default() -> Self {
        Self {
            optimize_speed: false,
            max_parallel: 0,
            icon_fetch_timeout_ms: Self::default_icon_fetch_timeout_ms(),
            icon_max_bytes: Self::default_icon_max_bytes(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub fonts: FontsConfig,
    /// 图片渲染配置
    #[serde(default)]
    pub image: ImageRenderConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖。
    ///
    /// config.toml 允许缺省（全部走默认值 + 环境变量），便于容器化部署。
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            .add_source(File::from(config_path).required(false))
            // 支持环境变量覆盖，例如：APP_SERVER_PORT
            .add_source(
                Environment::with_prefix("APP")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 常规字重字体文件完整路径
    pub fn normal_font_path(&self) -> PathBuf {
        PathBuf::from(&self.fonts.dir).join(&self.fonts.normal_file)
    }

    /// 粗体字重字体文件完整路径
    pub fn bold_font_path(&self) -> PathBuf {
        PathBuf::from(&self.fonts.dir).join(&self.fonts.bold_file)
    }
}
