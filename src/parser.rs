use crate::error::{CompileError, CompileErrorKind, CompileResult};

/// A piece of template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Text { text: &'a str, line: usize },
    Tag(Tag),
}

/// A `{...}` tag split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tag {
    /// Macro name; `=` for expression tags such as `{$x}`. Empty for the
    /// anonymous closing tag `{/}`.
    pub name: String,
    pub args: String,
    pub modifiers: Vec<String>,
    pub closing: bool,
    pub line: usize,
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
}

impl<'a> Parser<'a> {
    const fn new(input: &'a str) -> Self {
        Parser {
            input,
            pos: 0,
            line: 1,
        }
    }

    fn make_error(&self, line: usize, kind: CompileErrorKind) -> CompileError {
        CompileError::new(line, None, kind)
    }

    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Advances past `current_char`, counting newlines.
    #[inline]
    fn advance_by_char(&mut self, current_char: char) {
        if current_char == '\n' {
            self.line += 1;
        }
        self.pos += current_char.len_utf8();
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peek if the remaining input starts with `s`
    fn peek(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    /// Consume `s` if the remaining input starts with it.
    /// Assumes `s` does not contain newlines.
    fn consume(&mut self, s: &str) -> bool {
        if self.peek(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    /// A `{` starts a tag unless whitespace, `}` or the end of input follows.
    fn at_tag(&self) -> bool {
        let mut chars = self.rest().chars();
        chars.next() == Some('{') && chars.next().is_some_and(|c| !c.is_whitespace() && c != '}')
    }

    /// Skips a `{* ... *}` comment.
    fn skip_comment(&mut self) -> CompileResult<()> {
        let line = self.line;
        self.consume("{*");
        while !self.eof() {
            if self.consume("*}") {
                return Ok(());
            }
            if let Some(c) = self.current_char() {
                self.advance_by_char(c);
            }
        }
        Err(self.make_error(
            line,
            CompileErrorKind::Unclosed {
                expected: "*}".to_string(),
            },
        ))
    }

    /// Reads the text between `{` and its matching `}`. Quoted strings and
    /// nested braces do not end the tag.
    fn tag_body(&mut self) -> CompileResult<&'a str> {
        let line = self.line;
        self.consume("{");
        let start = self.pos;
        let mut depth = 0_usize;
        let mut quote: Option<char> = None;
        let mut escaped = false;

        while let Some(c) = self.current_char() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            } else {
                match c {
                    '\'' | '"' => quote = Some(c),
                    '{' => depth += 1,
                    '}' if depth == 0 => {
                        let body = self.input.get(start..self.pos).unwrap_or_default();
                        self.advance_by_char(c);
                        return Ok(body);
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            self.advance_by_char(c);
        }

        Err(self.make_error(
            line,
            CompileErrorKind::MalformedTag {
                message: "unclosed tag".to_string(),
            },
        ))
    }

    /// Everything up to `{/literal}`, which is left for the next tag read.
    fn literal_body(&mut self, line: usize) -> CompileResult<Segment<'a>> {
        let start_line = self.line;
        let start = self.pos;
        while !self.peek("{/literal}") {
            let Some(c) = self.current_char() else {
                return Err(self.make_error(
                    line,
                    CompileErrorKind::Unclosed {
                        expected: "{/literal}".to_string(),
                    },
                ));
            };
            self.advance_by_char(c);
        }
        Ok(Segment::Text {
            text: self.input.get(start..self.pos).unwrap_or_default(),
            line: start_line,
        })
    }
}

fn flush<'a>(segments: &mut Vec<Segment<'a>>, input: &'a str, start: usize, end: usize, line: usize) {
    if let Some(text) = input.get(start..end).filter(|t| !t.is_empty()) {
        segments.push(Segment::Text { text, line });
    }
}

/// Splits template source into text and tag segments.
pub(crate) fn tokenize(input: &str) -> CompileResult<Vec<Segment<'_>>> {
    let mut parser = Parser::new(input);
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut text_line = 1;

    while let Some(c) = parser.current_char() {
        if parser.peek("{*") {
            flush(&mut segments, input, text_start, parser.pos, text_line);
            parser.skip_comment()?;
        } else if parser.at_tag() {
            flush(&mut segments, input, text_start, parser.pos, text_line);
            let line = parser.line;
            let body = parser.tag_body()?;
            let tag = split_tag(body, line)?;
            let is_literal = tag.name == "literal" && !tag.closing;
            segments.push(Segment::Tag(tag));
            if is_literal {
                let text = parser.literal_body(line)?;
                if matches!(text, Segment::Text { text, .. } if !text.is_empty()) {
                    segments.push(text);
                }
            }
        } else {
            parser.advance_by_char(c);
            continue;
        }
        text_start = parser.pos;
        text_line = parser.line;
    }
    flush(&mut segments, input, text_start, parser.pos, text_line);

    Ok(segments)
}

/// Splits the inside of a tag into name, arguments and modifiers.
fn split_tag(body: &str, line: usize) -> CompileResult<Tag> {
    let text = body.trim();
    let (closing, text) = match text.strip_prefix('/') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text),
    };

    let (name, rest) = if text.starts_with('$') {
        ("=", text)
    } else if let Some(rest) = text.strip_prefix('=') {
        ("=", rest)
    } else {
        let len = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(text.len());
        let (name, rest) = text.split_at(len);
        // `{name(...)}` and `{Name::x}` are calls, not macros.
        if !closing && !name.is_empty() && (rest.starts_with('(') || rest.starts_with("::")) {
            ("=", text)
        } else {
            (name, rest)
        }
    };

    if name.is_empty() && !(closing && rest.trim().is_empty()) {
        return Err(CompileError::new(
            line,
            None,
            CompileErrorKind::MalformedTag {
                message: format!("{{{body}}}"),
            },
        ));
    }

    let mut parts = split_modifiers(rest).into_iter();
    let args = parts.next().unwrap_or_default().trim().to_string();
    let modifiers = parts
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();

    Ok(Tag {
        name: name.to_string(),
        args,
        modifiers,
        closing,
        line,
    })
}

/// Splits on `|` outside quotes and brackets; `||` is an operator, not a
/// modifier separator.
fn split_modifiers(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
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
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '|' if chars.peek().is_some_and(|&(_, next)| next == '|') => {
                chars.next();
            }
            '|' if depth == 0 => {
                parts.push(text.get(start..i).unwrap_or_default());
                start = i.saturating_add(1);
            }
            _ => {}
        }
    }
    parts.push(text.get(start..).unwrap_or_default());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str, args: &str, line: usize) -> Segment<'static> {
        Segment::Tag(Tag {
            name: name.to_string(),
            args: args.to_string(),
            modifiers: Vec::new(),
            closing: false,
            line,
        })
    }

    fn close(name: &str, line: usize) -> Segment<'static> {
        Segment::Tag(Tag {
            name: name.to_string(),
            args: String::new(),
            modifiers: Vec::new(),
            closing: true,
            line,
        })
    }

    macro_rules! text {
        ($text:expr, $line:expr) => {
            Segment::Text {
                text: $text,
                line: $line,
            }
        };
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_input() {
        assert_eq!(tokenize("").unwrap(), vec![]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_text_and_tags() {
        assert_eq!(
            tokenize("a {if $x}b{/if}").unwrap(),
            vec![text!("a ", 1), tag("if", "$x", 1), text!("b", 1), close("if", 1)]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_text_borrows_from_source() {
        let source = String::from("head {$x} tail");
        let segments = tokenize(&source).unwrap();
        let texts: Vec<&str> = segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Text { text, .. } => Some(*text),
                Segment::Tag(_) => None,
            })
            .collect();
        assert_eq!(texts, vec!["head ", " tail"]);
        let range = source.as_bytes().as_ptr_range();
        assert!(
            texts.iter().all(|text| range.contains(&text.as_ptr())),
            "text segments should point into the source"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_variable_shorthand_and_modifiers() {
        let segments = tokenize("{$name|upper|truncate:5:'|'}").unwrap();
        let Segment::Tag(tag) = &segments[0] else {
            panic!("expected a tag");
        };
        assert_eq!(tag.name, "=");
        assert_eq!(tag.args, "$name");
        assert_eq!(tag.modifiers, vec!["upper", "truncate:5:'|'"]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_call_is_an_expression() {
        assert_eq!(tokenize("{count($a)}").unwrap(), vec![tag("=", "count($a)", 1)]);
        assert_eq!(tokenize("{count $a}").unwrap(), vec![tag("count", "$a", 1)]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_logical_or_is_not_a_modifier() {
        let segments = tokenize("{if $a || $b}").unwrap();
        assert_eq!(segments, vec![tag("if", "$a || $b", 1)]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_brace_followed_by_space_is_text() {
        assert_eq!(
            tokenize("a { b } {}").unwrap(),
            vec![text!("a { b } {}", 1)]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_comments_are_dropped() {
        assert_eq!(
            tokenize("a{* {if} \n *}b").unwrap(),
            vec![text!("a", 1), text!("b", 2)]
        );
        assert!(tokenize("{* open").is_err());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_literal_body_is_raw() {
        assert_eq!(
            tokenize("{literal}{$x}{/literal}").unwrap(),
            vec![tag("literal", "", 1), text!("{$x}", 1), close("literal", 1)]
        );
        let error = tokenize("{literal}{$x}").unwrap_err();
        assert_eq!(error.to_string(), "Missing {/literal} (line 1)");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_quoted_braces_and_lines() {
        let segments = tokenize("\n\n{var $x = '}'}\n{/}").unwrap();
        assert_eq!(
            segments,
            vec![
                text!("\n\n", 1),
                tag("var", "$x = '}'", 3),
                text!("\n", 3),
                close("", 4),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_tag() {
        let error = tokenize("ok\n{if $x").unwrap_err();
        assert_eq!(error.line, 2);
        assert_eq!(error.kind, CompileErrorKind::MalformedTag { message: "unclosed tag".to_string() });
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_malformed_tag() {
        assert!(tokenize("{+}").is_err());
    }
}
