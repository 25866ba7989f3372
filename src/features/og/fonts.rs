//! 字体缓存：两档字重懒加载、进程级共享、并发冷启动 single-flight。
//!
//! 使用 moka 的 `try_get_with` 合并并发加载：同一键同时只执行一次底层读取，
//! 所有等待者共享同一次结果（成功或失败）；失败不落缓存，下一请求重试。

use axum::body::Bytes;
use moka::future::Cache;
use resvg::usvg::fontdb;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::OnceCell;

use crate::error::AppError;

/// 字体字重（仅支持常规/粗体两档）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontWeight {
    Normal,
    Bold,
}

impl FontWeight {
    /// CSS 数值字重
    pub fn css_value(self) -> u16 {
        match self {
            FontWeight::Normal => 400,
            FontWeight::Bold => 700,
        }
    }
}

/// 字体样式（当前只有 normal，保留枚举以固定缓存键形状）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontStyle {
    Normal,
}

/// 缓存键：同一 (名称, 字重, 样式) 至多保留一份字体
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FontKey {
    name: String,
    weight: FontWeight,
    style: FontStyle,
}

/// 已加载的字体资产（进程生命周期内只读共享，无失效路径）
#[derive(Debug, Clone)]
pub struct FontAsset {
    pub name: String,
    pub weight: FontWeight,
    pub style: FontStyle,
    pub data: Bytes,
}

/// 渲染所需的全套字体：两档字重 + 已构建的字体数据库
#[derive(Clone)]
pub struct RenderFonts {
    pub normal: FontAsset,
    pub bold: FontAsset,
    pub fontdb: Arc<fontdb::Database>,
}

/// 进程级字体缓存
pub struct FontCache {
    family: String,
    normal_path: PathBuf,
    bold_path: PathBuf,
    cache: Cache<FontKey, FontAsset>,
    db: OnceCell<Arc<fontdb::Database>>,
    disk_loads: AtomicU64,
}

impl FontCache {
    pub fn new(
        family: impl Into<String>,
        normal_path: impl Into<PathBuf>,
        bold_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            family: family.into(),
            normal_path: normal_path.into(),
            bold_path: bold_path.into(),
            // 容量远大于键空间（两档字重），不会发生淘汰
            cache: Cache::builder().max_capacity(8).build(),
            db: OnceCell::new(),
            disk_loads: AtomicU64::new(0),
        }
    }

    /// 字体族名称
    pub fn family(&self) -> &str {
        &self.family
    }

    /// 磁盘读取次数（观测用；并发冷启动下每档字重应恰好读取一次）
    pub fn disk_load_count(&self) -> u64 {
        self.disk_loads.load(Ordering::Relaxed)
    }

    /// 获取两档字重与共享字体数据库。
    ///
    /// 懒加载 + single-flight；任一字重加载失败则整体失败，缓存保持冷态。
    pub async fn get_fonts(&self) -> Result<RenderFonts, AppError> {
        let (normal, bold) = tokio::try_join!(
            self.load_weight(FontWeight::Normal),
            self.load_weight(FontWeight::Bold),
        )?;

        // 两档字重都已就绪后，字体数据库只构建一次
        let db = self
            .db
            .get_or_init(|| {
                let normal = normal.clone();
                let bold = bold.clone();
                async move { build_font_db(&normal, &bold) }
            })
            .await
            .clone();

        Ok(RenderFonts {
            normal,
            bold,
            fontdb: db,
        })
    }

    async fn load_weight(&self, weight: FontWeight) -> Result<FontAsset, AppError> {
        let key = FontKey {
            name: self.family.clone(),
            weight,
            style: FontStyle::Normal,
        };
        let path: &Path = match weight {
            FontWeight::Normal => &self.normal_path,
            FontWeight::Bold => &self.bold_path,
        };

        self.cache
            .try_get_with(key, async {
                self.disk_loads.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target: "ogen_backend::fonts",
                    weight = weight.css_value(),
                    path = %path.display(),
                    "加载字体文件"
                );
                let data = tokio::fs::read(path).await.map_err(|e| {
                    AppError::FontUnavailable(format!(
                        "读取字体文件失败 '{}': {e}",
                        path.display()
                    ))
                })?;
                Ok(FontAsset {
                    name: self.family.clone(),
                    weight,
                    style: FontStyle::Normal,
                    data: Bytes::from(data),
                })
            })
            .await
            .map_err(|e: Arc<AppError>| match &*e {
                AppError::FontUnavailable(msg) => AppError::FontUnavailable(msg.clone()),
                other => AppError::FontUnavailable(other.to_string()),
            })
    }
}

/// 由字体字节构建 usvg 字体数据库
fn build_font_db(normal: &FontAsset, bold: &FontAsset) -> Arc<fontdb::Database> {
    let mut db = fontdb::Database::new();
    db.load_font_data(normal.data.to_vec());
    db.load_font_data(bold.data.to_vec());
    Arc::new(db)
}

#[cfg(test)]
mod tests {
    use super::{FontCache, FontWeight};
    use crate::error::AppError;
    use std::sync::Arc;

    fn cache_with_files(dir: &tempfile::TempDir) -> FontCache {
        let normal = dir.path().join("regular.ttf");
        let bold = dir.path().join("bold.ttf");
        std::fs::write(&normal, b"regular-font-bytes").unwrap();
        std::fs::write(&bold, b"bold-font-bytes").unwrap();
        FontCache::new("Test Sans", normal, bold)
    }

    #[tokio::test]
    async fn cold_concurrent_requests_load_each_weight_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache_with_files(&dir));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_fonts().await }));
        }
        for handle in handles {
            let fonts = handle.await.unwrap().expect("all callers succeed");
            assert_eq!(fonts.normal.data.as_ref(), b"regular-font-bytes");
            assert_eq!(fonts.bold.data.as_ref(), b"bold-font-bytes");
            assert_eq!(fonts.bold.weight.css_value(), 700);
        }

        assert_eq!(cache.disk_load_count(), 2, "每档字重恰好一次磁盘读取");
    }

    #[tokio::test]
    async fn warm_cache_does_not_reload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_files(&dir);

        cache.get_fonts().await.expect("first load");
        cache.get_fonts().await.expect("second load");
        assert_eq!(cache.disk_load_count(), 2);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached_and_next_request_retries() {
        let dir = tempfile::tempdir().unwrap();
        let normal = dir.path().join("regular.ttf");
        let bold = dir.path().join("bold.ttf");
        let cache = FontCache::new("Test Sans", &normal, &bold);

        match cache.get_fonts().await {
            Err(AppError::FontUnavailable(_)) => {}
            Err(other) => panic!("unexpected error kind: {other}"),
            Ok(_) => panic!("load should fail while files are missing"),
        }

        // 补齐文件后无需重启即可恢复
        std::fs::write(&normal, b"regular-font-bytes").unwrap();
        std::fs::write(&bold, b"bold-font-bytes").unwrap();
        cache.get_fonts().await.expect("retry succeeds");
    }

    #[tokio::test]
    async fn concurrent_cold_failure_is_shared_by_all_waiters() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FontCache::new(
            "Test Sans",
            dir.path().join("missing-regular.ttf"),
            dir.path().join("missing-bold.ttf"),
        ));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_fonts().await }));
        }
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(AppError::FontUnavailable(_))));
        }
    }

    #[tokio::test]
    async fn load_weight_is_keyed_per_weight() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_files(&dir);

        let normal = cache.load_weight(FontWeight::Normal).await.unwrap();
        let bold = cache.load_weight(FontWeight::Bold).await.unwrap();
        assert_ne!(normal.data, bold.data);
        assert_eq!(normal.name, bold.name);
    }
}
