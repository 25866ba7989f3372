//! 渲染器：布局树 → SVG 标记 → PNG 字节。
//!
//! 分三个阶段：
//! 1. `layout_to_svg`：纯函数，把布局树序列化为 SVG 文本
//! 2. `inline_remote_images`：尽力而为地把远程头像抓取并内嵌为 data URI，
//!    抓取失败直接丢弃该图片节点，不影响整图
//! 3. `rasterize_to_png`：usvg/resvg 栅格化 + png 编码（CPU 密集，
//!    调用方负责放入 spawn_blocking）

use base64::{Engine as _, engine::general_purpose::STANDARD as base64_engine};
use resvg::usvg::{self, Options as UsvgOptions, fontdb};
use resvg::{
    render,
    tiny_skia::{Pixmap, Transform},
};
use std::fmt::Write;
use std::sync::Arc;

use super::layout::{BoxNode, Fill, ImageNode, LayoutNode, LayoutTree, TextAnchor, TextNode};
use crate::error::AppError;

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// 判断字符是否为全角（覆盖常见中日韩表意文字、假名与全角符号）
fn is_full_width(ch: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&ch)
        || ('\u{3040}'..='\u{30FF}').contains(&ch)
        || ('\u{FF00}'..='\u{FFEF}').contains(&ch)
}

/// 估算文本渲染宽度：全角按字号计，半角按略高于半字号计
fn estimate_text_width(content: &str, font_size: f64) -> f64 {
    let mut estimated = 0.0;
    for ch in content.chars() {
        if is_full_width(ch) {
            estimated += font_size;
        } else {
            estimated += font_size * 0.55;
        }
    }
    estimated
}

/// SVG 序列化状态：输出缓冲 + defs 引用 id 计数
struct SvgWriter {
    out: String,
    family: String,
    next_id: usize,
}

impl SvgWriter {
    fn fresh_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}{}", self.next_id);
        self.next_id += 1;
        id
    }
}

fn fmt_err(e: std::fmt::Error) -> AppError {
    AppError::Render(format!("SVG 格式化失败: {e}"))
}

/// 将布局树序列化为完整 SVG 文档
pub fn layout_to_svg(tree: &LayoutTree, font_family: &str) -> Result<String, AppError> {
    let mut w = SvgWriter {
        out: String::with_capacity(4 * 1024),
        family: font_family.to_string(),
        next_id: 0,
    };

    writeln!(
        w.out,
        r#"<svg width="{}" height="{}" viewBox="0 0 {} {}" xmlns="http://www.w3.org/2000/svg">"#,
        tree.width, tree.height, tree.width, tree.height,
    )
    .map_err(fmt_err)?;

    // 背景铺满整个画布
    let background_fill = write_fill_def(&mut w, &tree.background)?;
    writeln!(
        w.out,
        r#"<rect x="0" y="0" width="{}" height="{}" fill="{background_fill}" />"#,
        tree.width, tree.height,
    )
    .map_err(fmt_err)?;

    for node in &tree.nodes {
        write_node(&mut w, node)?;
    }

    writeln!(w.out, "</svg>").map_err(fmt_err)?;
    Ok(w.out)
}

/// 输出填充所需的 defs（渐变），返回可直接用于 fill 属性的值
fn write_fill_def(w: &mut SvgWriter, fill: &Fill) -> Result<String, AppError> {
    match fill {
        Fill::Solid(color) => Ok(escape_xml(color)),
        Fill::DiagonalGradient { from, to } => {
            let id = w.fresh_id("grad");
            writeln!(
                w.out,
                r##"<defs><linearGradient id="{id}" x1="0%" y1="0%" x2="100%" y2="100%"><stop offset="0%" stop-color="{}" /><stop offset="100%" stop-color="{}" /></linearGradient></defs>"##,
                escape_xml(from),
                escape_xml(to),
            )
            .map_err(fmt_err)?;
            Ok(format!("url(#{id})"))
        }
    }
}

fn write_node(w: &mut SvgWriter, node: &LayoutNode) -> Result<(), AppError> {
    match node {
        LayoutNode::Box(b) => write_box(w, b),
        LayoutNode::Text(t) => write_text(w, t),
        LayoutNode::Image(i) => write_image(w, i),
    }
}

fn write_box(w: &mut SvgWriter, b: &BoxNode) -> Result<(), AppError> {
    let fill = write_fill_def(w, &b.fill)?;

    let filter_attr = if b.shadow {
        let id = w.fresh_id("shadow");
        writeln!(
            w.out,
            r##"<defs><filter id="{id}" x="-20%" y="-20%" width="140%" height="140%"><feDropShadow dx="0" dy="8" stdDeviation="12" flood-color="#000000" flood-opacity="0.12" /></filter></defs>"##,
        )
        .map_err(fmt_err)?;
        format!(r#" filter="url(#{id})""#)
    } else {
        String::new()
    };

    writeln!(
        w.out,
        r#"<rect x="{}" y="{}" width="{}" height="{}" rx="{}" ry="{}" fill="{fill}"{filter_attr} />"#,
        b.x, b.y, b.width, b.height, b.corner_radius, b.corner_radius,
    )
    .map_err(fmt_err)?;

    for child in &b.children {
        write_node(w, child)?;
    }
    Ok(())
}

fn write_text(w: &mut SvgWriter, t: &TextNode) -> Result<(), AppError> {
    let content = escape_xml(&t.content);
    let anchor = match t.anchor {
        TextAnchor::Start => "start",
        TextAnchor::End => "end",
    };
    let family = escape_xml(&w.family);
    let weight = t.weight.css_value();
    let color = escape_xml(&t.color);

    // 估算宽度超出可用空间时启用 textLength 压缩，否则正常排布
    let length_attr = match t.max_width {
        Some(max_width) if estimate_text_width(&t.content, t.size) > max_width => {
            format!(r#" textLength="{max_width:.1}" lengthAdjust="spacingAndGlyphs""#)
        }
        _ => String::new(),
    };

    writeln!(
        w.out,
        r#"<text x="{}" y="{}" font-family="{family}" font-size="{}" font-weight="{weight}" fill="{color}" text-anchor="{anchor}"{length_attr}>{content}</text>"#,
        t.x, t.y, t.size,
    )
    .map_err(fmt_err)?;
    Ok(())
}

fn write_image(w: &mut SvgWriter, i: &ImageNode) -> Result<(), AppError> {
    let href = escape_xml(&i.href);

    let clip_attr = if i.circle {
        let id = w.fresh_id("clip");
        let cx = i.x + i.width / 2.0;
        let cy = i.y + i.height / 2.0;
        let r = i.width.min(i.height) / 2.0;
        writeln!(
            w.out,
            r#"<defs><clipPath id="{id}"><circle cx="{cx}" cy="{cy}" r="{r}" /></clipPath></defs>"#,
        )
        .map_err(fmt_err)?;
        format!(r#" clip-path="url(#{id})""#)
    } else {
        String::new()
    };

    writeln!(
        w.out,
        r#"<image href="{href}" x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="xMidYMid slice"{clip_attr} />"#,
        i.x, i.y, i.width, i.height,
    )
    .map_err(fmt_err)?;

    if let Some((color, stroke_width)) = &i.border {
        let cx = i.x + i.width / 2.0;
        let cy = i.y + i.height / 2.0;
        let r = i.width.min(i.height) / 2.0;
        writeln!(
            w.out,
            r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="none" stroke="{}" stroke-width="{stroke_width}" />"#,
            escape_xml(color),
        )
        .map_err(fmt_err)?;
    }
    Ok(())
}

/// 抓取远程头像并内嵌为 data URI，返回重建后的布局树。
///
/// 尽力而为：抓取失败或超限时丢弃该图片节点；data: 引用原样保留；
/// 非 http(s) 引用一律丢弃。
pub async fn inline_remote_images(
    tree: &LayoutTree,
    client: &reqwest::Client,
    max_bytes: usize,
) -> LayoutTree {
    let mut rebuilt = tree.clone();
    let mut nodes = Vec::with_capacity(rebuilt.nodes.len());
    for node in rebuilt.nodes {
        if let Some(node) = inline_node(node, client, max_bytes).await {
            nodes.push(node);
        }
    }
    rebuilt.nodes = nodes;
    rebuilt
}

/// Box 递归、Image 抓取、Text 原样
async fn inline_node(
    node: LayoutNode,
    client: &reqwest::Client,
    max_bytes: usize,
) -> Option<LayoutNode> {
    match node {
        LayoutNode::Box(mut b) => {
            let mut children = Vec::with_capacity(b.children.len());
            for child in b.children {
                if let Some(child) = Box::pin(inline_node(child, client, max_bytes)).await {
                    children.push(child);
                }
            }
            b.children = children;
            Some(LayoutNode::Box(b))
        }
        LayoutNode::Text(t) => Some(LayoutNode::Text(t)),
        LayoutNode::Image(mut i) => {
            if i.href.starts_with("data:") {
                return Some(LayoutNode::Image(i));
            }
            if !(i.href.starts_with("http://") || i.href.starts_with("https://")) {
                tracing::debug!(target: "ogen_backend::og", href = %i.href, "丢弃非 http(s) 图片引用");
                return None;
            }
            match fetch_as_data_uri(client, &i.href, max_bytes).await {
                Ok(uri) => {
                    i.href = uri;
                    Some(LayoutNode::Image(i))
                }
                Err(reason) => {
                    tracing::warn!(target: "ogen_backend::og", href = %i.href, %reason, "头像抓取失败，降级为无头像");
                    None
                }
            }
        }
    }
}

async fn fetch_as_data_uri(
    client: &reqwest::Client,
    href: &str,
    max_bytes: usize,
) -> Result<String, String> {
    let resp = client
        .get(href)
        .send()
        .await
        .map_err(|e| format!("请求失败: {e}"))?
        .error_for_status()
        .map_err(|e| format!("非成功状态: {e}"))?;

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("image/"))
        .unwrap_or("image/png")
        .to_string();

    let body = resp.bytes().await.map_err(|e| format!("读取失败: {e}"))?;
    if body.len() > max_bytes {
        return Err(format!("图片超过 {max_bytes} 字节上限"));
    }

    let b64 = base64_engine.encode(&body);
    Ok(format!("data:{content_type};base64,{b64}"))
}

/// 将 SVG 文本栅格化并编码为 PNG。
///
/// CPU 密集型同步函数，调用方负责 spawn_blocking 与并发许可。
pub fn rasterize_to_png(
    svg_data: &str,
    font_db: Arc<fontdb::Database>,
    font_family: &str,
    optimize_speed: bool,
) -> Result<Vec<u8>, AppError> {
    let t0 = std::time::Instant::now();

    let opts = UsvgOptions {
        fontdb: font_db,
        font_family: font_family.to_string(),
        font_size: 16.0,
        languages: vec!["ja".to_string(), "en".to_string()],
        shape_rendering: if optimize_speed {
            usvg::ShapeRendering::OptimizeSpeed
        } else {
            usvg::ShapeRendering::GeometricPrecision
        },
        text_rendering: if optimize_speed {
            usvg::TextRendering::OptimizeSpeed
        } else {
            usvg::TextRendering::OptimizeLegibility
        },
        image_rendering: if optimize_speed {
            usvg::ImageRendering::OptimizeSpeed
        } else {
            usvg::ImageRendering::OptimizeQuality
        },
        ..Default::default()
    };

    let tree = usvg::Tree::from_data(svg_data.as_bytes(), &opts)
        .map_err(|e| AppError::Render(format!("SVG 解析失败: {e}")))?;
    let t_parse = t0.elapsed();

    let pixmap_size = tree.size().to_int_size();
    let mut pixmap = Pixmap::new(pixmap_size.width(), pixmap_size.height())
        .ok_or_else(|| AppError::Render("创建像素缓冲失败".to_string()))?;

    render(&tree, Transform::default(), &mut pixmap.as_mut());
    let t_raster = t0.elapsed();

    let mut out = Vec::with_capacity((pixmap_size.width() * pixmap_size.height() * 4) as usize);
    {
        let mut encoder = png::Encoder::new(&mut out, pixmap_size.width(), pixmap_size.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if optimize_speed {
            encoder.set_compression(png::Compression::Fast);
            encoder.set_filter(png::FilterType::NoFilter);
        } else {
            encoder.set_compression(png::Compression::Default);
            encoder.set_filter(png::FilterType::Paeth);
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::Render(format!("PNG 写头失败: {e}")))?;
        writer
            .write_image_data(pixmap.data())
            .map_err(|e| AppError::Render(format!("PNG 写像素失败: {e}")))?;
        writer
            .finish()
            .map_err(|e| AppError::Render(format!("PNG 收尾失败: {e}")))?;
    }
    let t_encode = t0.elapsed();

    tracing::debug!(
        target: "ogen_backend::og",
        parse = ?t_parse,
        raster = ?(t_raster - t_parse),
        encode = ?(t_encode - t_raster),
        total = ?t_encode,
        "PNG 渲染分段耗时"
    );

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::og::fonts::FontWeight;

    fn text_node(content: &str, max_width: Option<f64>) -> TextNode {
        TextNode {
            x: 100.0,
            y: 160.0,
            content: content.to_string(),
            size: 64.0,
            weight: FontWeight::Bold,
            color: "#333333".to_string(),
            anchor: TextAnchor::Start,
            max_width,
        }
    }

    #[test]
    fn escapes_xml_special_chars() {
        assert_eq!(
            escape_xml(r#"a & <b> "c" 'd'"#),
            "a &amp; &lt;b&gt; &quot;c&quot; &apos;d&apos;"
        );
    }

    #[test]
    fn full_width_chars_estimate_wider_than_ascii() {
        let cjk = estimate_text_width("ああああ", 64.0);
        let ascii = estimate_text_width("aaaa", 64.0);
        assert!(cjk > ascii);
    }

    #[test]
    fn svg_document_has_fixed_viewbox_and_background() {
        let tree = LayoutTree::new(
            Fill::DiagonalGradient {
                from: "#EEF0FF".into(),
                to: "#FFF0F8".into(),
            },
            vec![],
        );
        let svg = layout_to_svg(&tree, "Test Sans").unwrap();
        assert!(svg.contains(r#"viewBox="0 0 1200 630""#));
        assert!(svg.contains("linearGradient"));
        assert!(svg.contains(r##"stop-color="#EEF0FF""##));
        assert!(svg.contains(r#"fill="url(#grad0)""#));
    }

    #[test]
    fn text_content_is_escaped_in_output() {
        let tree = LayoutTree::new(
            Fill::Solid("#FFFFFF".into()),
            vec![LayoutNode::Text(text_node("a<b>&c", None))],
        );
        let svg = layout_to_svg(&tree, "Test Sans").unwrap();
        assert!(svg.contains("a&lt;b&gt;&amp;c"));
        assert!(!svg.contains("a<b>&c"));
    }

    #[test]
    fn long_text_gets_text_length_compression() {
        let long = "x".repeat(60);
        let tree = LayoutTree::new(
            Fill::Solid("#FFFFFF".into()),
            vec![LayoutNode::Text(text_node(&long, Some(1000.0)))],
        );
        let svg = layout_to_svg(&tree, "Test Sans").unwrap();
        assert!(svg.contains("textLength"));
        assert!(svg.contains("lengthAdjust"));

        let short_tree = LayoutTree::new(
            Fill::Solid("#FFFFFF".into()),
            vec![LayoutNode::Text(text_node("short", Some(1000.0)))],
        );
        let short_svg = layout_to_svg(&short_tree, "Test Sans").unwrap();
        assert!(!short_svg.contains("textLength"));
    }

    #[test]
    fn circle_image_emits_clip_path_and_border() {
        let tree = LayoutTree::new(
            Fill::Solid("#FFFFFF".into()),
            vec![LayoutNode::Image(ImageNode {
                x: 96.0,
                y: 400.0,
                width: 80.0,
                height: 80.0,
                href: "data:image/png;base64,AAAA".into(),
                circle: true,
                border: Some(("#EEEEEE".into(), 2.0)),
            })],
        );
        let svg = layout_to_svg(&tree, "Test Sans").unwrap();
        assert!(svg.contains("clipPath"));
        assert!(svg.contains(r#"clip-path="url(#clip0)""#));
        assert!(svg.contains(r##"stroke="#EEEEEE""##));
    }

    #[test]
    fn box_shadow_emits_drop_shadow_filter() {
        let tree = LayoutTree::new(
            Fill::Solid("#EEF0FF".into()),
            vec![LayoutNode::Box(BoxNode {
                x: 36.0,
                y: 36.0,
                width: 1128.0,
                height: 558.0,
                fill: Fill::Solid("#FFFFFF".into()),
                corner_radius: 16.0,
                shadow: true,
                children: vec![],
            })],
        );
        let svg = layout_to_svg(&tree, "Test Sans").unwrap();
        assert!(svg.contains("feDropShadow"));
        assert!(svg.contains(r#"rx="16""#));
    }

    #[tokio::test]
    async fn unreachable_remote_image_is_dropped() {
        let client = reqwest::Client::new();
        let tree = LayoutTree::new(
            Fill::Solid("#FFFFFF".into()),
            vec![
                LayoutNode::Image(ImageNode {
                    x: 0.0,
                    y: 0.0,
                    width: 80.0,
                    height: 80.0,
                    href: "http://127.0.0.1:1/avatar.png".into(),
                    circle: true,
                    border: None,
                }),
                LayoutNode::Text(text_node("kept", None)),
            ],
        );
        let rebuilt = inline_remote_images(&tree, &client, 1024).await;
        assert_eq!(rebuilt.nodes.len(), 1);
        assert!(matches!(rebuilt.nodes[0], LayoutNode::Text(_)));
    }

    #[tokio::test]
    async fn data_uri_images_pass_through_untouched() {
        let client = reqwest::Client::new();
        let tree = LayoutTree::new(
            Fill::Solid("#FFFFFF".into()),
            vec![LayoutNode::Image(ImageNode {
                x: 0.0,
                y: 0.0,
                width: 80.0,
                height: 80.0,
                href: "data:image/png;base64,AAAA".into(),
                circle: false,
                border: None,
            })],
        );
        let rebuilt = inline_remote_images(&tree, &client, 1024).await;
        match &rebuilt.nodes[0] {
            LayoutNode::Image(i) => assert_eq!(i.href, "data:image/png;base64,AAAA"),
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn rasterizes_shapes_to_valid_png() {
        let svg = r##"<svg width="64" height="32" viewBox="0 0 64 32" xmlns="http://www.w3.org/2000/svg"><rect width="64" height="32" fill="#EEF0FF" /></svg>"##;
        let db = Arc::new(fontdb::Database::new());
        let bytes = rasterize_to_png(svg, db, "Test Sans", true).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn invalid_svg_is_a_render_error() {
        let db = Arc::new(fontdb::Database::new());
        let err = rasterize_to_png("not svg at all", db, "Test Sans", true).unwrap_err();
        assert!(matches!(err, AppError::Render(_)));
    }
}
