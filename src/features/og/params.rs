//! OG 查询参数的类型化校验。
//!
//! 字段策略分两类并以显式组合子表达：
//! - `or_default`：宽松回退（渐变色），非法值静默替换为默认值
//! - `reject_if_invalid`：严格拒绝（头像 URL），非法值产生字段级错误
//!
//! 两类策略不可混用；title/username 为必填硬校验。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::error::FieldError;

/// title 最大长度（字符数）
pub const TITLE_MAX_CHARS: usize = 100;
/// username 最大长度（字符数）
pub const USERNAME_MAX_CHARS: usize = 50;
/// iconUrl 最大长度（字符数）
pub const ICON_URL_MAX_CHARS: usize = 500;
/// 渐变起始色默认值
pub const DEFAULT_GRADIENT_FROM: &str = "#EEF0FF";
/// 渐变结束色默认值
pub const DEFAULT_GRADIENT_TO: &str = "#FFF0F8";

/// 合法 hex 颜色：#RRGGBB 或 #RGB
static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#([0-9A-Fa-f]{6}|[0-9A-Fa-f]{3})$").unwrap());

/// 原始查询参数（对外 camelCase，与前端约定一致）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOgQuery {
    pub title: Option<String>,
    pub username: Option<String>,
    pub gradient_from: Option<String>,
    pub gradient_to: Option<String>,
    pub icon_url: Option<String>,
    pub template: Option<String>,
    pub format: Option<String>,
}

/// 校验通过后的类型化参数。不存在部分合法的中间态。
#[derive(Debug, Clone, PartialEq)]
pub struct OgParams {
    pub title: String,
    pub username: String,
    pub gradient_from: String,
    pub gradient_to: String,
    pub icon_url: Option<String>,
    pub template: Option<String>,
}

/// 宽松回退：值缺失或未通过检查时静默使用默认值
fn or_default(value: Option<&str>, is_valid: impl Fn(&str) -> bool, default: &str) -> String {
    match value {
        Some(v) if is_valid(v) => v.to_string(),
        _ => default.to_string(),
    }
}

/// 严格拒绝：值存在但未通过检查时产生字段级错误
fn reject_if_invalid(
    value: Option<&str>,
    field: &str,
    check: impl Fn(&str) -> Option<FieldError>,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let v = value?;
    match check(v) {
        Some(err) => {
            debug_assert_eq!(err.field, field);
            errors.push(err);
            None
        }
        None => Some(v.to_string()),
    }
}

/// 空字符串视作缺省（查询串里 `iconUrl=` 等同于未提供）
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// 颜色值是否为合法 hex 形式
pub fn is_valid_hex_color(value: &str) -> bool {
    HEX_COLOR_RE.is_match(value)
}

fn check_icon_url(value: &str) -> Option<FieldError> {
    if value.chars().count() > ICON_URL_MAX_CHARS {
        return Some(FieldError::new(
            "iconUrl",
            "URL_TOO_LONG",
            format!("iconUrl 长度不能超过 {ICON_URL_MAX_CHARS} 个字符"),
        ));
    }
    // Url::parse 只接受绝对 URL，相对路径会解析失败
    if Url::parse(value).is_err() {
        return Some(FieldError::new(
            "iconUrl",
            "INVALID_URL",
            "iconUrl 必须是合法的绝对 URL",
        ));
    }
    None
}

fn check_required_text(
    value: Option<&str>,
    field: &str,
    max_chars: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        None => {
            errors.push(FieldError::new(
                field,
                "REQUIRED",
                format!("{field} 不能为空"),
            ));
            None
        }
        Some(v) if v.chars().count() > max_chars => {
            errors.push(FieldError::new(
                field,
                "TOO_LONG",
                format!("{field} 长度不能超过 {max_chars} 个字符"),
            ));
            None
        }
        Some(v) => Some(v.to_string()),
    }
}

impl RawOgQuery {
    /// 校验并转换为类型化参数。
    ///
    /// 所有字段错误一次性收集返回，而非遇错即停。
    pub fn validate(&self) -> Result<OgParams, Vec<FieldError>> {
        let mut errors = Vec::new();

        let title = check_required_text(
            non_empty(&self.title),
            "title",
            TITLE_MAX_CHARS,
            &mut errors,
        );
        let username = check_required_text(
            non_empty(&self.username),
            "username",
            USERNAME_MAX_CHARS,
            &mut errors,
        );

        let gradient_from = or_default(
            non_empty(&self.gradient_from),
            is_valid_hex_color,
            DEFAULT_GRADIENT_FROM,
        );
        let gradient_to = or_default(
            non_empty(&self.gradient_to),
            is_valid_hex_color,
            DEFAULT_GRADIENT_TO,
        );

        let icon_url = reject_if_invalid(
            non_empty(&self.icon_url),
            "iconUrl",
            check_icon_url,
            &mut errors,
        );

        if !errors.is_empty() {
            return Err(errors);
        }

        // title/username 无错误时必然已填充
        Ok(OgParams {
            title: title.unwrap_or_default(),
            username: username.unwrap_or_default(),
            gradient_from,
            gradient_to,
            icon_url,
            template: non_empty(&self.template).map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(title: Option<&str>, username: Option<&str>) -> RawOgQuery {
        RawOgQuery {
            title: title.map(str::to_string),
            username: username.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_valid_query_gets_default_gradient() {
        let params = query(Some("Hello"), Some("world")).validate().unwrap();
        assert_eq!(params.title, "Hello");
        assert_eq!(params.username, "world");
        assert_eq!(params.gradient_from, DEFAULT_GRADIENT_FROM);
        assert_eq!(params.gradient_to, DEFAULT_GRADIENT_TO);
        assert!(params.icon_url.is_none());
    }

    #[test]
    fn missing_required_fields_collect_both_errors() {
        let errors = RawOgQuery::default().validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "username"]);
        assert!(errors.iter().all(|e| e.code == "REQUIRED"));
    }

    #[test]
    fn empty_string_counts_as_missing() {
        let errors = query(Some(""), Some("world")).validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "title");
        assert_eq!(errors[0].code, "REQUIRED");
    }

    #[test]
    fn over_length_title_is_too_long() {
        let long = "あ".repeat(TITLE_MAX_CHARS + 1);
        let errors = query(Some(&long), Some("world")).validate().unwrap_err();
        assert_eq!(errors[0].code, "TOO_LONG");

        // 恰好到上限则通过
        let limit = "あ".repeat(TITLE_MAX_CHARS);
        assert!(query(Some(&limit), Some("world")).validate().is_ok());
    }

    #[test]
    fn invalid_gradient_falls_back_silently() {
        let mut raw = query(Some("Hello"), Some("world"));
        raw.gradient_from = Some("red".to_string());
        raw.gradient_to = Some("#ABC".to_string());
        let params = raw.validate().unwrap();
        assert_eq!(params.gradient_from, DEFAULT_GRADIENT_FROM);
        assert_eq!(params.gradient_to, "#ABC");
    }

    #[test]
    fn valid_six_digit_hex_is_kept() {
        let mut raw = query(Some("Hello"), Some("world"));
        raw.gradient_from = Some("#1a2B3c".to_string());
        let params = raw.validate().unwrap();
        assert_eq!(params.gradient_from, "#1a2B3c");
    }

    #[test]
    fn relative_icon_url_is_rejected() {
        let mut raw = query(Some("Hello"), Some("world"));
        raw.icon_url = Some("/avatar.png".to_string());
        let errors = raw.validate().unwrap_err();
        assert_eq!(errors[0].field, "iconUrl");
        assert_eq!(errors[0].code, "INVALID_URL");
    }

    #[test]
    fn over_length_icon_url_is_rejected() {
        let mut raw = query(Some("Hello"), Some("world"));
        raw.icon_url = Some(format!("https://a.example/{}", "x".repeat(600)));
        let errors = raw.validate().unwrap_err();
        assert_eq!(errors[0].code, "URL_TOO_LONG");
    }

    #[test]
    fn absolute_icon_url_passes_through() {
        let mut raw = query(Some("Hello"), Some("world"));
        raw.icon_url = Some("https://example.com/avatar.png".to_string());
        let params = raw.validate().unwrap();
        assert_eq!(
            params.icon_url.as_deref(),
            Some("https://example.com/avatar.png")
        );
    }

    #[test]
    fn camel_case_query_names_deserialize() {
        let raw: RawOgQuery = serde_urlencoded::from_str(
            "title=Hello&username=world&gradientFrom=%23FFFFFF&iconUrl=https://e.com/a.png",
        )
        .unwrap();
        assert_eq!(raw.gradient_from.as_deref(), Some("#FFFFFF"));
        assert_eq!(raw.icon_url.as_deref(), Some("https://e.com/a.png"));
    }
}
