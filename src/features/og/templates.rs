//! 模板注册表：封闭枚举 + 编译期静态查找表。
//!
//! 模板函数必须是纯函数：相同输入产出相同布局树，不做 IO。
//! 未知模板名静默回退 modern，不产生错误。

use super::fonts::FontWeight;
use super::layout::{
    BoxNode, CANVAS_HEIGHT, CANVAS_WIDTH, Fill, ImageNode, LayoutNode, LayoutTree, TextAnchor,
    TextNode,
};
use super::sanitize::SanitizedOgParams;

/// 模板标识（封闭集合，不支持动态加载）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateId {
    #[default]
    Modern,
    Simple,
}

impl TemplateId {
    /// 由外部字符串解析模板标识，未知值回退 Modern
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.eq_ignore_ascii_case("simple") => TemplateId::Simple,
            _ => TemplateId::Modern,
        }
    }
}

type TemplateFn = fn(&SanitizedOgParams) -> LayoutTree;

/// 静态查找表：TemplateId -> 构建函数
static TEMPLATES: &[(TemplateId, TemplateFn)] = &[
    (TemplateId::Modern, build_modern),
    (TemplateId::Simple, build_simple),
];

/// 按模板标识构建布局树
pub fn build(id: TemplateId, params: &SanitizedOgParams) -> LayoutTree {
    let builder = TEMPLATES
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, f)| *f)
        .unwrap_or(build_modern);
    builder(params)
}

fn text(
    x: f64,
    y: f64,
    content: &str,
    size: f64,
    weight: FontWeight,
    color: &str,
) -> TextNode {
    TextNode {
        x,
        y,
        content: content.to_string(),
        size,
        weight,
        color: color.to_string(),
        anchor: TextAnchor::Start,
        max_width: None,
    }
}

/// modern 模板：对角渐变背景上叠白色圆角卡片。
///
/// 头像行整体可选：iconUrl 缺失时不渲染头像也不渲染用户名行。
fn build_modern(params: &SanitizedOgParams) -> LayoutTree {
    let card_x = 36.0;
    let card_y = 36.0;
    let card_w = f64::from(CANVAS_WIDTH) - card_x * 2.0;
    let card_h = f64::from(CANVAS_HEIGHT) - card_y * 2.0;
    let padding = 60.0;

    let mut children = Vec::new();

    let mut title = text(
        card_x + padding,
        card_y + padding + 64.0,
        &params.title,
        64.0,
        FontWeight::Bold,
        "#333333",
    );
    title.max_width = Some(card_w - padding * 2.0);
    children.push(LayoutNode::Text(title));

    if let Some(icon_url) = &params.icon_url {
        let avatar_size = 80.0;
        let row_y = card_y + card_h - padding - avatar_size;
        children.push(LayoutNode::Image(ImageNode {
            x: card_x + padding,
            y: row_y,
            width: avatar_size,
            height: avatar_size,
            href: icon_url.clone(),
            circle: true,
            border: Some(("#EEEEEE".to_string(), 2.0)),
        }));
        children.push(LayoutNode::Text(text(
            card_x + padding + avatar_size + 24.0,
            row_y + avatar_size / 2.0 + 13.0,
            &params.username,
            36.0,
            FontWeight::Bold,
            "#333333",
        )));
    }

    children.push(LayoutNode::Text(TextNode {
        anchor: TextAnchor::End,
        ..text(
            card_x + card_w - padding,
            card_y + card_h - padding + 8.0,
            "Powered by OGen",
            24.0,
            FontWeight::Normal,
            "#9CA3AF",
        )
    }));

    LayoutTree::new(
        Fill::DiagonalGradient {
            from: params.gradient_from.clone(),
            to: params.gradient_to.clone(),
        },
        vec![LayoutNode::Box(BoxNode {
            x: card_x,
            y: card_y,
            width: card_w,
            height: card_h,
            fill: Fill::Solid("#FFFFFF".to_string()),
            corner_radius: 16.0,
            shadow: true,
            children,
        })],
    )
}

/// simple 模板：纯色背景上的单列标题 + "by username" 署名行
fn build_simple(params: &SanitizedOgParams) -> LayoutTree {
    let padding = 40.0;
    let mut nodes = Vec::new();

    let mut title = text(
        padding,
        padding + 64.0,
        &params.title,
        64.0,
        FontWeight::Bold,
        "#111111",
    );
    title.max_width = Some(f64::from(CANVAS_WIDTH) - padding * 2.0);
    nodes.push(LayoutNode::Text(title));

    let byline_y = f64::from(CANVAS_HEIGHT) - padding - 16.0;
    let mut byline_x = padding;

    if let Some(icon_url) = &params.icon_url {
        let avatar_size = 48.0;
        nodes.push(LayoutNode::Image(ImageNode {
            x: padding,
            y: byline_y - avatar_size + 14.0,
            width: avatar_size,
            height: avatar_size,
            href: icon_url.clone(),
            circle: true,
            border: None,
        }));
        byline_x += avatar_size + 16.0;
    }

    nodes.push(LayoutNode::Text(text(
        byline_x,
        byline_y,
        &format!("by {}", params.username),
        24.0,
        FontWeight::Normal,
        "#555555",
    )));

    LayoutTree::new(Fill::Solid("#FFFFFF".to_string()), nodes)
}
