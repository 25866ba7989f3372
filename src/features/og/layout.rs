//! 布局树：模板输出、渲染器输入的契约数据结构。
//!
//! 每次请求由模板函数全新构造，构造后不再修改；坐标一律为画布绝对坐标，
//! Box 的子节点嵌套仅表达绘制顺序与归组。

use super::fonts::FontWeight;

/// OG 画布固定宽度
pub const CANVAS_WIDTH: u32 = 1200;
/// OG 画布固定高度
pub const CANVAS_HEIGHT: u32 = 630;

/// 填充方式
#[derive(Debug, Clone, PartialEq)]
pub enum Fill {
    /// 纯色（hex 颜色字符串）
    Solid(String),
    /// 对角线性渐变（左上到右下）
    DiagonalGradient { from: String, to: String },
}

/// 文本锚点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    End,
}

/// 文本节点。`y` 为基线坐标；`max_width` 超出时由渲染器压缩排布。
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub x: f64,
    pub y: f64,
    pub content: String,
    pub size: f64,
    pub weight: FontWeight,
    pub color: String,
    pub anchor: TextAnchor,
    pub max_width: Option<f64>,
}

/// 图片节点（头像等）。`circle` 为真时按内切圆裁剪。
#[derive(Debug, Clone, PartialEq)]
pub struct ImageNode {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub href: String,
    pub circle: bool,
    /// 可选描边：(颜色, 宽度)
    pub border: Option<(String, f64)>,
}

/// 盒节点（卡片/背景块）
#[derive(Debug, Clone, PartialEq)]
pub struct BoxNode {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub fill: Fill,
    pub corner_radius: f64,
    pub shadow: bool,
    pub children: Vec<LayoutNode>,
}

/// 布局节点
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutNode {
    Box(BoxNode),
    Text(TextNode),
    Image(ImageNode),
}

/// 布局树：渲染器的契约输入
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutTree {
    pub width: u32,
    pub height: u32,
    pub background: Fill,
    pub nodes: Vec<LayoutNode>,
}

impl LayoutTree {
    /// 在固定 1200×630 画布上新建布局树
    pub fn new(background: Fill, nodes: Vec<LayoutNode>) -> Self {
        Self {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            background,
            nodes,
        }
    }
}
