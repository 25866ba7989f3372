//! 自由文本与 URL 字段的安全清洗。
//!
//! 固定四步顺序，每一步都循环剥离到不动点，保证整体幂等：
//! `sanitize(sanitize(x)) == sanitize(x)`。单次替换不幂等，
//! 例如 "javajavascript:script:" 剥一层后恰好拼出 "javascript:"。
//! 清洗从不报错，只做删除。

use once_cell::sync::Lazy;
use regex::Regex;

use super::params::{DEFAULT_GRADIENT_FROM, DEFAULT_GRADIENT_TO, OgParams};

/// title 展示长度上限（字符数），超出则截断加省略号
pub const TITLE_CLIP_CHARS: usize = 48;

/// `<...>` 标签片段
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
/// `onerror="..."` 属性片段（大小写不敏感）
static ONERROR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)onerror\s*=\s*['"][^'"]*['"]"#).unwrap());
/// `javascript:` 协议前缀（大小写不敏感，容忍内部空白）
static JS_SCHEME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)javascript\s*:").unwrap());
/// `on<word>="..."` 事件处理器片段（大小写不敏感）
static EVENT_HANDLER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)on\w+\s*=\s*['"][^'"]*['"]"#).unwrap());

/// 清洗完成的参数：无标记片段，hex 颜色保证合法，title 已按展示限长截断。
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedOgParams {
    pub title: String,
    pub username: String,
    pub gradient_from: String,
    pub gradient_to: String,
    pub icon_url: Option<String>,
    pub template: Option<String>,
}

/// 单条正则剥离到不动点
fn strip_to_fixpoint(re: &Regex, input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = re.replace_all(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// 清洗单个字符串字段
pub fn sanitize_text(input: &str) -> String {
    let mut current = input.to_string();
    // 步骤间也存在拼接逃逸（剥标签可能拼出新的协议前缀），外层同样收敛到不动点
    loop {
        let mut next = strip_to_fixpoint(&TAG_RE, &current);
        next = strip_to_fixpoint(&ONERROR_RE, &next);
        next = strip_to_fixpoint(&JS_SCHEME_RE, &next);
        next = strip_to_fixpoint(&EVENT_HANDLER_RE, &next);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// 展示用 title 截断：超过 48 字符取前 47 字符加 "..."
pub fn format_title(title: &str) -> String {
    if title.chars().count() > TITLE_CLIP_CHARS {
        let clipped: String = title.chars().take(TITLE_CLIP_CHARS - 1).collect();
        format!("{clipped}...")
    } else {
        title.to_string()
    }
}

/// 整组参数清洗。清洗可能破坏原本合法的颜色值，事后重新校验并回退默认。
pub fn sanitize_params(params: &OgParams) -> SanitizedOgParams {
    let gradient_from = sanitize_text(&params.gradient_from);
    let gradient_to = sanitize_text(&params.gradient_to);

    let hex_or = |value: String, default: &str| {
        if super::params::is_valid_hex_color(&value) {
            value
        } else {
            default.to_string()
        }
    };

    let icon_url = params
        .icon_url
        .as_deref()
        .map(sanitize_text)
        .filter(|v| !v.is_empty());

    SanitizedOgParams {
        title: format_title(&sanitize_text(&params.title)),
        username: sanitize_text(&params.username),
        gradient_from: hex_or(gradient_from, DEFAULT_GRADIENT_FROM),
        gradient_to: hex_or(gradient_to, DEFAULT_GRADIENT_TO),
        icon_url,
        template: params.template.clone(),
    }
}
