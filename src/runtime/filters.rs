//! Modifiers (`{$x|upper}`), escaping and the output filters used by
//! `{spaceless}`.

use std::{fmt::Write, rc::Rc, sync::LazyLock};

use indexmap::IndexMap;
use regex::Regex;

use crate::{
    config::ContentType,
    error::{RenderError, RenderResult},
    script::Value,
};

/// A modifier: receives the value and the `:`-separated arguments.
pub type Filter = Rc<dyn Fn(Value, &[Value]) -> RenderResult<Value>>;

static HTML_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used, reason = "static pattern")]
    Regex::new(r"(?s)<[^>]*>").unwrap()
});

static HTML_GAPS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used, reason = "static pattern")]
    Regex::new(r">\s+<").unwrap()
});

static PRESERVED_ELEMENTS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used, reason = "static pattern")]
    Regex::new(r"(?is)<(pre|textarea|script|style)\b.*?</(pre|textarea|script|style)>").unwrap()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used, reason = "static pattern")]
    Regex::new(r"\s+").unwrap()
});

/// Named modifier registry.
#[derive(Clone, Default)]
pub struct Filters {
    filters: IndexMap<String, Filter>,
}

impl std::fmt::Debug for Filters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.filters.keys()).finish()
    }
}

impl Filters {
    pub fn with_builtins() -> Self {
        let mut filters = Self::default();
        filters.insert("upper", |v, _| Ok(Value::from(v.to_string().to_uppercase())));
        filters.insert("lower", |v, _| Ok(Value::from(v.to_string().to_lowercase())));
        filters.insert("trim", |v, _| Ok(Value::from(v.to_string().trim())));
        filters.insert("capitalize", |v, _| {
            let s = v.to_string();
            let mut chars = s.chars();
            Ok(Value::from(chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })))
        });
        filters.insert("length", |v, _| {
            Ok(match &v {
                Value::Str(s) | Value::Html(s) => Value::from(s.chars().count()),
                _ => Value::from(v.count()),
            })
        });
        filters.insert("default", |v, args| {
            let empty = v.is_null() || v.as_str().is_some_and(str::is_empty);
            Ok(if empty {
                args.first().cloned().unwrap_or_default()
            } else {
                v
            })
        });
        filters.insert("escape", |v, args| {
            let kind = args.first().map(ToString::to_string).unwrap_or_default();
            let text = v.to_string();
            Ok(Value::from(match kind.as_str() {
                "javascript" | "js" => escape_js(&text),
                "url" => escape_url(&text),
                _ => escape_html(&text),
            }))
        });
        filters.insert("striptags", |v, _| Ok(Value::from(strip_tags(&v.to_string()))));
        filters.insert("replace", |v, args| {
            let from = args.first().map(ToString::to_string).unwrap_or_default();
            let to = args.get(1).map(ToString::to_string).unwrap_or_default();
            let text = v.to_string();
            if from.is_empty() {
                return Ok(Value::from(text));
            }
            Ok(Value::from(text.replace(&from, &to)))
        });
        filters.insert("truncate", |v, args| {
            let text = v.to_string();
            let length = args
                .first()
                .map_or(80, |n| usize::try_from(n.to_int()).unwrap_or(0));
            let suffix = args.get(1).map_or_else(|| "...".to_string(), ToString::to_string);
            Ok(Value::from(truncate(&text, length, &suffix)))
        });
        filters.insert("spaceless", |v, _| Ok(Value::from(spaceless_text(&v.to_string()))));
        filters.insert("nl2br", |v, _| {
            Ok(Value::html(escape_html(&v.to_string()).replace('\n', "<br>\n")))
        });
        filters
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(Value, &[Value]) -> RenderResult<Value> + 'static,
    {
        self.filters.insert(name.into(), Rc::new(filter));
    }

    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.filters.get(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    /// Applies `name`, failing with a suggestion when it is unknown.
    ///
    /// # Errors
    /// - If no filter of that name is registered.
    /// - If the filter itself fails.
    pub fn apply(&self, name: &str, value: Value, args: &[Value]) -> RenderResult<Value> {
        let filter = self.get(name).ok_or_else(|| RenderError::UnknownFilter {
            name: name.to_string(),
            suggestion: suggest(name, self.names()),
            line: None,
        })?;
        filter(value, args)
    }
}

/// Closest candidate by Jaro-Winkler similarity, if any is close enough.
pub fn suggest<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    candidates
        .filter(|candidate| *candidate != name)
        .map(|candidate| (strsim::jaro_winkler(name, candidate), candidate))
        .filter(|(score, _)| *score > 0.8)
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, candidate)| candidate.to_string())
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes a value for use inside a JavaScript string literal, quotes
/// included.
pub fn escape_js(text: &str) -> String {
    let mut out = String::with_capacity(text.len().saturating_add(2));
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn escape_url(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte) {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

pub fn strip_tags(html: &str) -> String {
    let text = HTML_TAGS.replace_all(html, "");
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn truncate(text: &str, length: usize, suffix: &str) -> String {
    if text.chars().count() <= length {
        return text.to_string();
    }
    let keep = length.saturating_sub(suffix.chars().count());
    // One extra char tells whether the cut falls inside a word.
    let mut cut: String = text.chars().take(keep.saturating_add(1)).collect();
    match cut.rfind(char::is_whitespace) {
        Some(space) if space > 0 => cut.truncate(space),
        _ => cut = text.chars().take(keep).collect(),
    }
    let mut cut = cut.trim_end().to_string();
    cut.push_str(suffix);
    cut
}

/// Collapses runs of whitespace to one space and trims the ends.
pub fn spaceless_text(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Removes whitespace between tags and collapses it elsewhere, leaving the
/// content of `pre`, `textarea`, `script` and `style` untouched.
pub fn spaceless_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for preserved in PRESERVED_ELEMENTS.find_iter(html) {
        out.push_str(&collapse_markup(html.get(last..preserved.start()).unwrap_or_default()));
        out.push_str(preserved.as_str());
        last = preserved.end();
    }
    out.push_str(&collapse_markup(html.get(last..).unwrap_or_default()));
    out.trim().to_string()
}

fn collapse_markup(html: &str) -> String {
    let html = HTML_GAPS.replace_all(html, "><");
    WHITESPACE.replace_all(&html, " ").into_owned()
}

/// Converts block output between content types, when a conversion exists.
pub fn convertor(from: ContentType, to: ContentType) -> Option<fn(&str) -> String> {
    match (from, to) {
        (ContentType::Text, ContentType::Html | ContentType::Xhtml | ContentType::Xml) => {
            Some(escape_html)
        }
        (ContentType::Html | ContentType::Xhtml, ContentType::Text) => Some(strip_tags),
        (ContentType::Html, ContentType::Xhtml) | (ContentType::Xhtml, ContentType::Html) => {
            Some(str::to_string)
        }
        _ => None,
    }
}

/// Escapes `value` for printing into a template of `content_type`.
/// Markup values pass through unchanged in HTML and XML contexts.
pub fn escape_for(content_type: ContentType, value: &Value) -> Value {
    match (content_type, value) {
        (ContentType::Html | ContentType::Xhtml | ContentType::Xml, Value::Html(_)) => {
            value.clone()
        }
        (ContentType::Html | ContentType::Xhtml | ContentType::Xml, _) => {
            Value::html(escape_html(&value.to_string()))
        }
        (ContentType::Js, Value::Str(_)) => Value::from(escape_js(&value.to_string())),
        (ContentType::Js | ContentType::Css | ContentType::Text, _) => {
            Value::from(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_builtin_filters() {
        let filters = Filters::with_builtins();
        let apply = |name: &str, value: &str, args: &[Value]| {
            filters.apply(name, Value::from(value), args).unwrap().to_string()
        };
        assert_eq!(apply("upper", "abc", &[]), "ABC");
        assert_eq!(apply("capitalize", "hello world", &[]), "Hello world");
        assert_eq!(apply("length", "héllo", &[]), "5");
        assert_eq!(apply("default", "", &[Value::from("x")]), "x");
        assert_eq!(apply("replace", "a-b-c", &[Value::from("-"), Value::from("+")]), "a+b+c");
        assert_eq!(
            apply("truncate", "the quick brown fox", &[Value::Int(12)]),
            "the quick..."
        );
        assert_eq!(apply("striptags", "<b>a &amp; b</b>", &[]), "a & b");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unknown_filter_suggests() {
        let error = Filters::with_builtins()
            .apply("uper", Value::Null, &[])
            .unwrap_err();
        assert_eq!(
            error,
            RenderError::UnknownFilter {
                name: "uper".to_string(),
                suggestion: Some("upper".to_string()),
                line: None,
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_escaping() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#039;&amp;&#039;&lt;/a&gt;");
        assert_eq!(escape_js("a\"b</script>"), r#""a\"b\u003C/script\u003E""#);
        assert_eq!(
            escape_for(ContentType::Html, &Value::html("<b>")),
            Value::html("<b>")
        );
        assert_eq!(
            escape_for(ContentType::Html, &Value::from("<b>")),
            Value::html("&lt;b&gt;")
        );
        assert_eq!(escape_for(ContentType::Text, &Value::from("<b>")), Value::from("<b>"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_spaceless() {
        assert_eq!(
            spaceless_html("  <ul>\n  <li> a  b </li>\n</ul>\n<pre>  keep\n  this </pre> "),
            "<ul><li> a b </li></ul> <pre>  keep\n  this </pre>"
        );
        assert_eq!(spaceless_text("  a \n\t b  "), "a b");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_convertors() {
        let to_html = convertor(ContentType::Text, ContentType::Html).unwrap();
        assert_eq!(to_html("a<b"), "a&lt;b");
        let to_text = convertor(ContentType::Html, ContentType::Text).unwrap();
        assert_eq!(to_text("<p>a &amp; b</p>"), "a & b");
        assert!(convertor(ContentType::Css, ContentType::Js).is_none());
    }
}
