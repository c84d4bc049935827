//! Turns tag argument text into target code.

use std::{borrow::Cow, sync::LazyLock};

use regex::{Captures, Regex};

use crate::{
    args::expand_dotted_var,
    script::{TokenKind, tokenize},
};

/// Words the quoting pass leaves alone.
const RESERVED: [&str; 12] = [
    "true", "false", "null", "and", "or", "xor", "as", "array", "isset", "empty", "new", "clone",
];

/// Comparison words accepted by `{if}` and `{elseif}`, longest first.
const IF_KEYWORDS: [(&str, &str); 11] = [
    ("neq", "!="),
    ("gte", ">="),
    ("lte", "<="),
    ("not", "!"),
    ("mod", "%"),
    ("eq", "=="),
    ("ne", "!="),
    ("gt", ">"),
    ("lt", "<"),
    ("ge", ">="),
    ("le", "<="),
];

static DOTTED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used, reason = "static pattern")]
    Regex::new(r"\$\w+(?:\.\w+)+").unwrap()
});

/// Single-quoted literal of `text`.
pub fn export_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Quotes bare words that are neither reserved, called, nor property names,
/// so `file=menu` style values read as strings.
///
/// Code the lexer rejects comes back unchanged; parsing the compiled
/// program reports it later with a line number.
pub fn quoting_pass(code: &str) -> String {
    let Ok(tokens) = tokenize(code) else {
        return code.to_string();
    };
    let significant = |i: usize| {
        tokens
            .get(i)
            .is_some_and(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Comment | TokenKind::Line))
    };

    let mut out = String::with_capacity(code.len());
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Symbol
            || RESERVED.iter().any(|word| token.text.eq_ignore_ascii_case(word))
        {
            out.push_str(&token.text);
            continue;
        }
        let previous = (0..i).rev().find(|&j| significant(j)).and_then(|j| tokens.get(j));
        let next = (i.saturating_add(1)..tokens.len()).find(|&j| significant(j)).and_then(|j| tokens.get(j));
        let is_member = previous.is_some_and(|t| t.is_char("->") || t.is_char("::"));
        let is_call = next.is_some_and(|t| t.is_char("(") || t.is_char("::"));
        if is_member || is_call {
            out.push_str(&token.text);
        } else {
            out.push_str(&export_string(&token.text));
        }
    }
    out
}

/// Replaces the `{if}` comparison words by operators. The replacement is a
/// plain substring scan, so it also hits words inside identifiers.
pub fn replace_if_keywords(args: &str) -> String {
    let mut out = String::with_capacity(args.len());
    let mut rest = args;
    'scan: while let Some(c) = rest.chars().next() {
        for (word, operator) in IF_KEYWORDS {
            if let Some(after) = rest.strip_prefix(word) {
                out.push_str(operator);
                rest = after;
                continue 'scan;
            }
        }
        out.push(c);
        rest = rest.get(c.len_utf8()..).unwrap_or_default();
    }
    out
}

/// Rewrites every `$a.b.c` path in an expression into indexing.
pub fn expand_paths(expr: &str) -> Cow<'_, str> {
    DOTTED_PATH.replace_all(expr, |caps: &Captures<'_>| {
        caps.get(0)
            .map(|m| expand_dotted_var(m.as_str()))
            .unwrap_or_default()
    })
}

pub fn is_noescape(modifier: &str) -> bool {
    modifier.trim().eq_ignore_ascii_case("noescape")
}

/// Wraps `expr` in one `filter()` call per modifier, innermost first.
/// `name:arg:arg` passes the arguments after the value.
pub fn apply_modifiers(expr: &str, modifiers: &[String]) -> String {
    let mut code = expr.to_string();
    for modifier in modifiers.iter().filter(|m| !is_noescape(m)) {
        let mut parts = split_top_level(modifier.trim(), ':').into_iter();
        let Some(name) = parts.next() else {
            continue;
        };
        let mut call = format!("filter({}, {code}", export_string(name.trim()));
        for arg in parts {
            call.push_str(", ");
            call.push_str(&quoting_pass(arg.trim()));
        }
        call.push(')');
        code = call;
    }
    code
}

/// Modifiers applied, then escaped for the content type unless one of them
/// is `noescape`.
pub fn modify(expr: &str, modifiers: &[String]) -> String {
    let code = apply_modifiers(expr, modifiers);
    if modifiers.iter().any(|m| is_noescape(m)) {
        code
    } else {
        format!("escape({code})")
    }
}

/// Splits on `separator` outside quotes and brackets.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth = depth.saturating_add(1),
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(text.get(start..i).unwrap_or_default());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(text.get(start..).unwrap_or_default());
    parts
}
