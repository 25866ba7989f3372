//! OG 社交预览图生成：参数校验、清洗、模板布局、字体缓存与渲染。

pub mod fonts;
pub mod handler;
pub mod layout;
pub mod params;
pub mod renderer;
pub mod sanitize;
pub mod templates;

pub use handler::create_og_router;
