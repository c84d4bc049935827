use super::ScriptError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `$name`
    Variable,
    /// Bare word: keyword, function name or constant.
    Symbol,
    Number,
    /// Quoted string, quotes included.
    String,
    Whitespace,
    Comment,
    /// `/* line N */` marker carrying a template source line.
    Line,
    /// Operators and punctuation.
    Char,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

impl Token {
    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    pub fn is_char(&self, text: &str) -> bool {
        self.is(TokenKind::Char, text)
    }

    /// Source line carried by a [`TokenKind::Line`] marker.
    pub fn line_number(&self) -> Option<usize> {
        if self.kind != TokenKind::Line {
            return None;
        }
        self.text
            .trim_start_matches("/*")
            .trim_end_matches("*/")
            .trim()
            .trim_start_matches("line")
            .trim()
            .parse()
            .ok()
    }

    /// Symbols compare case-insensitively, like keywords of the target script.
    pub fn is_symbol(&self, text: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text.eq_ignore_ascii_case(text)
    }
}

const OPERATORS: [&str; 22] = [
    "===", "!==", "==", "!=", ">=", "<=", "&&", "||", "=>", "->", "++", "--", "+=", "-=", ".=",
    "*=", "/=", "??", "::", "<>", "**", "%=",
];

/// Splits target code into tokens without dropping anything, so joining the
/// token texts gives back the input.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(current) = source.get(pos..).and_then(|rest| rest.chars().next()) {
        let rest = source.get(pos..).unwrap_or_default();
        let start = pos;

        let (kind, len) = if current.is_whitespace() {
            let len = rest
                .find(|c: char| !c.is_whitespace())
                .unwrap_or(rest.len());
            (TokenKind::Whitespace, len)
        } else if rest.starts_with("/*") {
            let end = rest
                .find("*/")
                .ok_or_else(|| ScriptError::new("Unterminated comment", start))?;
            let len = end + 2;
            let body = rest.get(2..end).unwrap_or_default().trim();
            let is_line = body
                .strip_prefix("line ")
                .is_some_and(|n| !n.is_empty() && n.trim().chars().all(|c| c.is_ascii_digit()));
            if is_line {
                (TokenKind::Line, len)
            } else {
                (TokenKind::Comment, len)
            }
        } else if current == '$' && rest.chars().nth(1).is_some_and(is_ident_start) {
            let len = 1 + ident_len(rest.get(1..).unwrap_or_default());
            (TokenKind::Variable, len)
        } else if is_ident_start(current) {
            (TokenKind::Symbol, ident_len(rest))
        } else if current.is_ascii_digit() {
            (TokenKind::Number, number_len(rest))
        } else if current == '\'' || current == '"' {
            (TokenKind::String, string_len(rest, current, start)?)
        } else if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            (TokenKind::Char, op.len())
        } else {
            (TokenKind::Char, current.len_utf8())
        };

        tokens.push(Token {
            kind,
            text: rest.get(..len).unwrap_or_default().to_string(),
            offset: start,
        });
        pos += len;
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn ident_len(s: &str) -> usize {
    s.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len())
}

fn number_len(s: &str) -> usize {
    let digits = |s: &str| s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let int = digits(s);
    let after = s.get(int..).unwrap_or_default();
    match after.strip_prefix('.') {
        Some(fraction) if fraction.starts_with(|c: char| c.is_ascii_digit()) => {
            int.saturating_add(1).saturating_add(digits(fraction))
        }
        _ => int,
    }
}

fn string_len(s: &str, quote: char, offset: usize) -> Result<usize, ScriptError> {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok(i + c.len_utf8());
        }
    }
    Err(ScriptError::new("Unterminated string", offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_tokens_round_trip_text() {
        let source = "foreach ($a['b'] as $k => $v) { echo \"x\\\"y\"; }";
        let joined: String = tokenize(source).unwrap().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(joined, source);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_token_kinds() {
        assert_eq!(
            kinds("$x >= 1.5 && foo('a')"),
            vec![
                (TokenKind::Variable, "$x".to_string()),
                (TokenKind::Char, ">=".to_string()),
                (TokenKind::Number, "1.5".to_string()),
                (TokenKind::Char, "&&".to_string()),
                (TokenKind::Symbol, "foo".to_string()),
                (TokenKind::Char, "(".to_string()),
                (TokenKind::String, "'a'".to_string()),
                (TokenKind::Char, ")".to_string()),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_line_markers() {
        let tokens = tokenize("/* line 12 */ echo 1; /* note */").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Line);
        assert_eq!(tokens[0].line_number(), Some(12));
        let tokens = kinds("/* line 12 */ echo 1; /* note */");
        assert_eq!(tokens[4], (TokenKind::Comment, "/* note */".to_string()));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unterminated_string() {
        assert!(tokenize("echo 'abc").is_err());
    }
}
