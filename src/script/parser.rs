use super::{
    ScriptError,
    ast::{BinaryOp, Expr, Program, Stmt, UnaryOp},
    lexer::{Token, TokenKind, tokenize},
};

type ParseResult<T> = Result<T, ScriptError>;

/// Parses compiled target code into a [`Program`].
pub fn parse(source: &str) -> ParseResult<Program> {
    let tokens = tokenize(source)?
        .into_iter()
        .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Comment))
        .collect();
    let mut parser = Parser {
        tokens,
        pos: 0,
        line: None,
    };
    let stmts = parser.statements(false)?;
    Ok(Program { stmts })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Most recent `/* line N */` marker seen.
    line: Option<usize>,
}

impl Parser {
    fn skip_lines(&mut self) {
        while let Some(token) = self.tokens.get(self.pos) {
            if token.kind != TokenKind::Line {
                break;
            }
            if let Some(line) = token.line_number() {
                self.line = Some(line);
            }
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        self.skip_lines();
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        self.skip_lines();
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check_char(&mut self, c: &str) -> bool {
        self.peek().is_some_and(|t| t.is_char(c))
    }

    fn check_symbol(&mut self, s: &str) -> bool {
        self.peek().is_some_and(|t| t.is_symbol(s))
    }

    fn eat_char(&mut self, c: &str) -> bool {
        let found = self.check_char(c);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_symbol(&mut self, s: &str) -> bool {
        let found = self.check_symbol(s);
        if found {
            self.pos += 1;
        }
        found
    }

    fn error(&mut self, message: impl Into<String>) -> ScriptError {
        let offset = self.peek().map_or(usize::MAX, |t| t.offset);
        ScriptError::new(message, offset).with_line(self.line)
    }

    fn unexpected(&mut self, expected: &str) -> ScriptError {
        let found = self
            .peek()
            .map_or_else(|| "end of code".to_string(), |t| format!("'{}'", t.text));
        self.error(format!("Unexpected {found}, expecting {expected}"))
    }

    fn expect_char(&mut self, c: &str) -> ParseResult<()> {
        if self.eat_char(c) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{c}'")))
        }
    }

    fn expect_symbol(&mut self, s: &str) -> ParseResult<()> {
        if self.eat_symbol(s) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{s}'")))
        }
    }

    // --- Statements ---

    fn statements(&mut self, until_brace: bool) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while let Some(token) = self.tokens.get(self.pos) {
                if token.kind != TokenKind::Line {
                    break;
                }
                if let Some(line) = token.line_number() {
                    self.line = Some(line);
                    stmts.push(Stmt::Line(line));
                }
                self.pos += 1;
            }

            match self.tokens.get(self.pos) {
                None if until_brace => return Err(self.unexpected("'}'")),
                None => break,
                Some(token) if token.is_char("}") => {
                    if until_brace {
                        self.pos += 1;
                        break;
                    }
                    return Err(self.error("Unexpected '}'"));
                }
                Some(_) => {}
            }

            if let Some(stmt) = self.statement()? {
                stmts.push(stmt);
            }
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> ParseResult<Option<Stmt>> {
        if self.eat_char(";") {
            return Ok(None);
        }
        if self.eat_char("{") {
            return Ok(Some(Stmt::Block(self.statements(true)?)));
        }

        let keyword = match self.peek() {
            Some(token) if token.kind == TokenKind::Symbol => token.text.to_ascii_lowercase(),
            _ => String::new(),
        };
        let stmt = match keyword.as_str() {
            "echo" => {
                self.pos += 1;
                let mut exprs = vec![self.expression()?];
                while self.eat_char(",") {
                    exprs.push(self.expression()?);
                }
                self.expect_char(";")?;
                Stmt::Echo(exprs)
            }
            "if" => {
                self.pos += 1;
                self.if_statement()?
            }
            "while" => {
                self.pos += 1;
                let condition = self.paren_expression()?;
                let body = self.body()?;
                Stmt::While { condition, body }
            }
            "do" => {
                self.pos += 1;
                let body = self.body()?;
                self.expect_symbol("while")?;
                let condition = self.paren_expression()?;
                self.expect_char(";")?;
                Stmt::DoWhile { body, condition }
            }
            "for" => {
                self.pos += 1;
                self.for_statement()?
            }
            "foreach" => {
                self.pos += 1;
                self.foreach_statement()?
            }
            _ => {
                let expr = self.expression()?;
                self.expect_char(";")?;
                Stmt::Expr(expr)
            }
        };
        Ok(Some(stmt))
    }

    /// A braced block or a single statement.
    fn body(&mut self) -> ParseResult<Vec<Stmt>> {
        if self.eat_char("{") {
            return self.statements(true);
        }
        Ok(self.statement()?.into_iter().collect())
    }

    fn paren_expression(&mut self) -> ParseResult<Expr> {
        self.expect_char("(")?;
        let expr = self.expression()?;
        self.expect_char(")")?;
        Ok(expr)
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let condition = self.paren_expression()?;
        let body = self.body()?;
        let mut branches = vec![(condition, body)];
        let mut otherwise = None;

        loop {
            if self.eat_symbol("elseif") {
                let condition = self.paren_expression()?;
                branches.push((condition, self.body()?));
            } else if self.eat_symbol("else") {
                if self.eat_symbol("if") {
                    let condition = self.paren_expression()?;
                    branches.push((condition, self.body()?));
                } else {
                    otherwise = Some(self.body()?);
                    break;
                }
            } else {
                break;
            }
        }

        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }

    fn expression_list(&mut self, terminator: &str) -> ParseResult<Vec<Expr>> {
        let mut exprs = Vec::new();
        if self.check_char(terminator) {
            return Ok(exprs);
        }
        exprs.push(self.expression()?);
        while self.eat_char(",") {
            exprs.push(self.expression()?);
        }
        Ok(exprs)
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.expect_char("(")?;
        let init = self.expression_list(";")?;
        self.expect_char(";")?;
        let condition = self.expression_list(";")?;
        self.expect_char(";")?;
        let step = self.expression_list(")")?;
        self.expect_char(")")?;
        let body = self.body()?;
        Ok(Stmt::For {
            init,
            condition,
            step,
            body,
        })
    }

    fn foreach_statement(&mut self) -> ParseResult<Stmt> {
        self.expect_char("(")?;
        let source = self.expression()?;
        self.expect_symbol("as")?;
        let first = self.loop_variable()?;
        let (key, value) = if self.eat_char("=>") {
            (Some(first), self.loop_variable()?)
        } else {
            (None, first)
        };
        self.expect_char(")")?;
        let body = self.body()?;
        Ok(Stmt::Foreach {
            source,
            key,
            value,
            body,
        })
    }

    fn loop_variable(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Variable => {
                let name = token.text.trim_start_matches('$').to_string();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("loop variable")),
        }
    }

    // --- Expressions ---
    // Precedence: assignment -> ternary -> ?? -> || -> && -> equality ->
    // relational -> additive -> multiplicative -> unary -> postfix -> primary

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let target = self.ternary()?;
        if !target.is_lvalue() {
            return Ok(target);
        }

        let op = match self.peek() {
            Some(t) if t.is_char("=") => None,
            Some(t) if t.is_char("+=") => Some(BinaryOp::Add),
            Some(t) if t.is_char("-=") => Some(BinaryOp::Sub),
            Some(t) if t.is_char(".=") => Some(BinaryOp::Concat),
            Some(t) if t.is_char("*=") => Some(BinaryOp::Mul),
            Some(t) if t.is_char("/=") => Some(BinaryOp::Div),
            Some(t) if t.is_char("%=") => Some(BinaryOp::Mod),
            _ => return Ok(target),
        };
        self.pos += 1;
        let value = self.assignment()?;
        Ok(Expr::Assign {
            target: Box::new(target),
            op,
            value: Box::new(value),
        })
    }

    fn ternary(&mut self) -> ParseResult<Expr> {
        let condition = self.coalesce()?;
        if !self.eat_char("?") {
            return Ok(condition);
        }
        let then = if self.eat_char(":") {
            None
        } else {
            let then = self.assignment()?;
            self.expect_char(":")?;
            Some(Box::new(then))
        };
        let otherwise = self.assignment()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then,
            otherwise: Box::new(otherwise),
        })
    }

    fn coalesce(&mut self) -> ParseResult<Expr> {
        let left = self.or()?;
        if self.eat_char("??") {
            let right = self.coalesce()?;
            return Ok(Expr::Binary(BinaryOp::Coalesce, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut left = self.and()?;
        while self.eat_char("||") || self.eat_symbol("or") {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut left = self.equality()?;
        while self.eat_char("&&") || self.eat_symbol("and") {
            let right = self.equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        operators: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut left = next(self)?;
        loop {
            let op = operators
                .iter()
                .find(|(text, _)| self.check_char(text))
                .map(|(_, op)| *op);
            let Some(op) = op else {
                return Ok(left);
            };
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::NotEq),
                ("<>", BinaryOp::NotEq),
                ("===", BinaryOp::Identical),
                ("!==", BinaryOp::NotIdentical),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                ("+", BinaryOp::Add),
                ("-", BinaryOp::Sub),
                (".", BinaryOp::Concat),
            ],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Mod),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.eat_char("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat_char("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        if self.eat_char("+") {
            return Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.unary()?)));
        }
        if self.eat_char("@") {
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_char("[") {
                if self.eat_char("]") {
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: None,
                    };
                    continue;
                }
                let index = self.expression()?;
                self.expect_char("]")?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Some(Box::new(index)),
                };
            } else if self.eat_char("->") {
                let name = match self.advance() {
                    Some(t) if t.kind == TokenKind::Symbol => t.text,
                    _ => return Err(self.error("Expected property name after '->'")),
                };
                expr = Expr::Prop {
                    base: Box::new(expr),
                    name,
                };
            } else if expr.is_lvalue() && self.eat_char("++") {
                expr = Expr::Step {
                    target: Box::new(expr),
                    delta: 1,
                };
            } else if expr.is_lvalue() && self.eat_char("--") {
                expr = Expr::Step {
                    target: Box::new(expr),
                    delta: -1,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let Some(token) = self.advance() else {
            return Err(self.unexpected("expression"));
        };

        match token.kind {
            TokenKind::Variable => Ok(Expr::Var(token.text.trim_start_matches('$').to_string())),
            TokenKind::Number => Ok(parse_number(&token.text)),
            TokenKind::String => Ok(Expr::Str(decode_string(&token.text))),
            TokenKind::Char if token.text == "(" => {
                let expr = self.expression()?;
                self.expect_char(")")?;
                Ok(expr)
            }
            TokenKind::Char if token.text == "[" => self.array_items("]"),
            TokenKind::Symbol => self.symbol(token),
            TokenKind::Char
            | TokenKind::Whitespace
            | TokenKind::Comment
            | TokenKind::Line => {
                self.pos -= 1;
                Err(self.unexpected("expression"))
            }
        }
    }

    fn symbol(&mut self, token: Token) -> ParseResult<Expr> {
        let lower = token.text.to_ascii_lowercase();
        match lower.as_str() {
            "true" => return Ok(Expr::Bool(true)),
            "false" => return Ok(Expr::Bool(false)),
            "null" => return Ok(Expr::Null),
            _ => {}
        }

        if !self.check_char("(") {
            // Bare words fall back to their own name as a string.
            return Ok(Expr::Str(token.text));
        }
        self.pos += 1;

        if lower == "array" {
            return self.array_items(")");
        }
        let args = self.expression_list(")")?;
        self.expect_char(")")?;
        Ok(Expr::Call { name: lower, args })
    }

    fn array_items(&mut self, close: &str) -> ParseResult<Expr> {
        let mut items = Vec::new();
        while !self.eat_char(close) {
            let first = self.expression()?;
            if self.eat_char("=>") {
                let value = self.expression()?;
                items.push((Some(first), value));
            } else {
                items.push((None, first));
            }
            if !self.eat_char(",") {
                self.expect_char(close)?;
                break;
            }
        }
        Ok(Expr::Array(items))
    }
}

fn parse_number(text: &str) -> Expr {
    if text.contains('.') {
        return Expr::Float(text.parse().unwrap_or_default());
    }
    text.parse::<i64>()
        .map_or_else(|_| Expr::Float(text.parse().unwrap_or_default()), Expr::Int)
}

/// Decodes a quoted string token. Single quotes only know `\'` and `\\`.
fn decode_string(text: &str) -> String {
    let mut chars = text.chars();
    let quote = chars.next().unwrap_or('\'');
    let inner: Vec<char> = chars.collect();
    let inner = inner.split_last().map_or(&[][..], |(_, rest)| rest);

    let mut out = String::with_capacity(inner.len());
    let mut iter = inner.iter().copied().peekable();
    while let Some(c) = iter.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(&next) = iter.peek() else {
            out.push(c);
            break;
        };
        let decoded = match (quote, next) {
            (_, '\\') => Some('\\'),
            ('\'', '\'') => Some('\''),
            ('"', '"') => Some('"'),
            ('"', 'n') => Some('\n'),
            ('"', 't') => Some('\t'),
            ('"', 'r') => Some('\r'),
            ('"', '$') => Some('$'),
            ('"', '0') => Some('\0'),
            _ => None,
        };
        match decoded {
            Some(d) => {
                out.push(d);
                iter.next();
            }
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        let program = parse(&format!("{source};")).unwrap();
        match program.stmts.into_iter().next() {
            Some(Stmt::Expr(expr)) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_precedence() {
        assert_eq!(
            expr("$a || $b && $c"),
            Expr::Binary(
                BinaryOp::Or,
                Box::new(Expr::Var("a".into())),
                Box::new(Expr::Binary(
                    BinaryOp::And,
                    Box::new(Expr::Var("b".into())),
                    Box::new(Expr::Var("c".into())),
                )),
            )
        );
        assert_eq!(
            expr("!$a == $b"),
            Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::Unary(UnaryOp::Not, Box::new(Expr::Var("a".into())))),
                Box::new(Expr::Var("b".into())),
            )
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_index_and_property() {
        assert_eq!(
            expr("$smarty['foreach'][rows]->first"),
            Expr::Prop {
                base: Box::new(Expr::Index {
                    base: Box::new(Expr::Index {
                        base: Box::new(Expr::Var("smarty".into())),
                        index: Some(Box::new(Expr::Str("foreach".into()))),
                    }),
                    index: Some(Box::new(Expr::Str("rows".into()))),
                }),
                name: "first".into(),
            }
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_chained_assignment() {
        let parsed = expr("$x = $y['a'] = 1");
        let Expr::Assign { target, value, .. } = parsed else {
            panic!("expected assignment");
        };
        assert_eq!(*target, Expr::Var("x".into()));
        assert!(matches!(*value, Expr::Assign { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_statements() {
        let program = parse(
            "/* line 1 */ foreach ($items as $k => $v) { echo $v; } if (!count($items)) { echo 'none'; }",
        )
        .unwrap();
        assert_eq!(program.stmts.len(), 3);
        assert_eq!(program.stmts[0], Stmt::Line(1));
        assert!(matches!(
            &program.stmts[1],
            Stmt::Foreach { key: Some(k), value, .. } if k == "k" && value == "v"
        ));
        assert!(matches!(&program.stmts[2], Stmt::If { .. }));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_do_while_and_single_statement_body() {
        let program = parse("do { $i++; } while ($i < 3); if ($x) debugbreak();").unwrap();
        assert!(matches!(&program.stmts[0], Stmt::DoWhile { .. }));
        let Stmt::If { branches, .. } = &program.stmts[1] else {
            panic!("expected if");
        };
        assert_eq!(branches[0].1.len(), 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_string_decoding() {
        assert_eq!(expr(r"'it\'s \n'"), Expr::Str("it's \\n".into()));
        assert_eq!(expr(r#""a\tb\"c""#), Expr::Str("a\tb\"c".into()));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_syntax_error_reports_line() {
        let error = parse("/* line 7 */ if ($a == ) {}").unwrap_err();
        assert_eq!(error.line, Some(7));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unbalanced_braces() {
        assert!(parse("if ($a) { echo 1;").is_err());
        assert!(parse("echo 1; }").is_err());
    }
}
