//! Helpers that read tag attributes and rewrite dotted variable paths.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

static ANY_KEY_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used, reason = "static pattern")]
    Regex::new(r"(\w+)=([^\s}]+)").unwrap()
});

/// Extracts `key=value` pairs from raw tag arguments.
///
/// Keys are limited to `allowed` when given, otherwise any run of word
/// characters is accepted. A value runs until whitespace or `}`. Values that
/// start with `$` are target expressions and are returned untouched, anything
/// else loses one layer of matching surrounding quotes. A repeated key keeps its
/// first-seen position and takes the last value.
///
/// ```
/// let params = smartee::parse_macro_args(r#"file="header.tpl" title=$page.title"#, None);
/// assert_eq!(params["file"], "header.tpl");
/// assert_eq!(params["title"], "$page.title");
/// ```
pub fn parse_macro_args(args: &str, allowed: Option<&[&str]>) -> IndexMap<String, String> {
    let restricted;
    let pattern: &Regex = match allowed {
        Some(keys) if !keys.is_empty() => {
            let alternation = keys
                .iter()
                .map(|key| regex::escape(key))
                .collect::<Vec<_>>()
                .join("|");
            match Regex::new(&format!(r"(?i)\b({alternation})=([^\s}}]+)")) {
                Ok(regex) => {
                    restricted = regex;
                    &restricted
                }
                Err(_) => &ANY_KEY_ARGS,
            }
        }
        _ => &ANY_KEY_ARGS,
    };

    let mut params = IndexMap::new();
    for captures in pattern.captures_iter(args) {
        let (Some(key), Some(value)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let value = value.as_str();
        let value = if value.starts_with('$') {
            value.to_string()
        } else {
            strip_quotes(value).to_string()
        };
        params.insert(key.as_str().to_string(), value);
    }
    params
}

/// Removes exactly one layer of matching `'` or `"` quotes.
pub(crate) fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Rewrites `a.b.c` into associative indexing, `a['b']['c']`.
///
/// `$smarty.foreach.<name>.<property>` is the one exception: it reads a
/// property of the loop tracker registered under `<name>`.
pub fn expand_dotted_var(var: &str) -> String {
    let mut parts = var.split('.');
    let Some(head) = parts.next() else {
        return var.to_string();
    };
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return var.to_string();
    }

    if let ("$smarty", ["foreach", name, property, ..]) = (head, rest.as_slice()) {
        return format!("{head}['foreach'][{name}]->{property}");
    }

    let mut expanded = head.to_string();
    for part in rest {
        expanded.push_str("['");
        expanded.push_str(part);
        expanded.push_str("']");
    }
    expanded
}
