use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path { root: String, segments: Vec<Segment> },
    Range(Box<Expr>, Box<Expr>),
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
}

/// `expr | filter: arg, ... | filter`
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub expr: Expr,
    pub filters: Vec<FilterCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForSpec {
    pub variable: String,
    pub collection: Expr,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub reversed: bool,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{:?}", v),
            Expr::Path { root, segments } => {
                f.write_str(root)?;
                for seg in segments {
                    match seg {
                        Segment::Key(k) => write!(f, ".{}", k)?,
                        Segment::Index(e) => write!(f, "[{}]", e)?,
                    }
                }
                Ok(())
            }
            Expr::Range(a, b) => write!(f, "({}..{})", a, b),
            Expr::Compare { op, left, right } => write!(f, "{} {:?} {}", left, op, right),
            Expr::And(a, b) => write!(f, "{} and {}", a, b),
            Expr::Or(a, b) => write!(f, "{} or {}", a, b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Dot,
    DotDot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pipe,
    Colon,
    Comma,
    Assign,
    Cmp(CmpOp),
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' | '"' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| "unterminated string literal".to_string())?;
                tokens.push(Token::Str(chars[start..start + end].iter().collect()));
                i = start + end + 1;
            }
            '.' if chars.get(i + 1) == Some(&'.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Cmp(CmpOp::Eq), 2),
                    ('!', Some('=')) => (Token::Cmp(CmpOp::Ne), 2),
                    ('<', Some('>')) => (Token::Cmp(CmpOp::Ne), 2),
                    ('<', Some('=')) => (Token::Cmp(CmpOp::Le), 2),
                    ('>', Some('=')) => (Token::Cmp(CmpOp::Ge), 2),
                    ('<', _) => (Token::Cmp(CmpOp::Lt), 1),
                    ('>', _) => (Token::Cmp(CmpOp::Gt), 1),
                    ('=', _) => (Token::Assign, 1),
                    _ => return Err(format!("unexpected character '{}'", c)),
                };
                tokens.push(token);
                i += width;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let is_float = chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let f = text
                        .parse::<f64>()
                        .map_err(|_| format!("invalid number '{}'", text))?;
                    tokens.push(Token::Float(f));
                } else {
                    let n = text
                        .parse::<i64>()
                        .map_err(|_| format!("invalid number '{}'", text))?;
                    tokens.push(Token::Int(n));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                if chars.get(i) == Some(&'?') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => return Err(format!("unexpected character '{}'", c)),
        }
    }
    Ok(tokens)
}

struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    fn new(src: &str) -> Result<Self, String> {
        Ok(Self {
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected {:?}, found {}", token, self.describe()))
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(format!("expected identifier, found {:?}", other)),
        }
    }

    fn describe(&self) -> String {
        match self.peek() {
            Some(t) => format!("{:?}", t),
            None => "end of input".to_string(),
        }
    }

    fn finish(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(format!("unexpected trailing {:?}", t)),
        }
    }

    /// `and` / `or` bind right to left, as in Liquid.
    fn logical(&mut self) -> Result<Expr, String> {
        let left = self.comparison()?;
        if self.eat_keyword("and") {
            let right = self.logical()?;
            return Ok(Expr::And(Box::new(left), Box::new(right)));
        }
        if self.eat_keyword("or") {
            let right = self.logical()?;
            return Ok(Expr::Or(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let left = self.primary()?;
        let op = match self.peek() {
            Some(Token::Cmp(op)) => *op,
            Some(Token::Ident(w)) if w == "contains" => CmpOp::Contains,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.primary()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::LParen) => {
                let start = self.primary()?;
                self.expect(&Token::DotDot)?;
                let end = self.primary()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::Range(Box::new(start), Box::new(end)))
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "nil" | "null" => Ok(Expr::Literal(Value::Nil)),
                _ => self.path(word),
            },
            other => Err(format!("expected a value, found {:?}", other)),
        }
    }

    fn path(&mut self, root: String) -> Result<Expr, String> {
        let mut segments = Vec::new();
        loop {
            if self.eat(&Token::Dot) {
                segments.push(Segment::Key(self.ident()?));
            } else if self.eat(&Token::LBracket) {
                let index = self.logical()?;
                self.expect(&Token::RBracket)?;
                segments.push(Segment::Index(index));
            } else {
                return Ok(Expr::Path { root, segments });
            }
        }
    }

    fn filters(&mut self) -> Result<Vec<FilterCall>, String> {
        let mut filters = Vec::new();
        while self.eat(&Token::Pipe) {
            let name = self.ident()?;
            let mut args = Vec::new();
            if self.eat(&Token::Colon) {
                loop {
                    args.push(self.primary()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            filters.push(FilterCall { name, args });
        }
        Ok(filters)
    }

    fn output(&mut self) -> Result<Output, String> {
        let expr = self.logical()?;
        let filters = self.filters()?;
        Ok(Output { expr, filters })
    }
}

/// Body of `{{ ... }}`.
pub fn parse_output(src: &str) -> Result<Output, String> {
    let mut ts = TokenStream::new(src)?;
    let output = ts.output()?;
    ts.finish()?;
    Ok(output)
}

/// Condition of `if`, `elsif` and `unless`.
pub fn parse_condition(src: &str) -> Result<Expr, String> {
    let mut ts = TokenStream::new(src)?;
    if ts.peek().is_none() {
        return Err("missing condition".to_string());
    }
    let expr = ts.logical()?;
    ts.finish()?;
    Ok(expr)
}

/// `name = expr | filters`
pub fn parse_assign(src: &str) -> Result<(String, Output), String> {
    let mut ts = TokenStream::new(src)?;
    let name = ts.ident()?;
    ts.expect(&Token::Assign)?;
    let output = ts.output()?;
    ts.finish()?;
    Ok((name, output))
}

/// `item in collection [limit: n] [offset: n] [reversed]`
pub fn parse_for(src: &str) -> Result<ForSpec, String> {
    let mut ts = TokenStream::new(src)?;
    let variable = ts.ident()?;
    if !ts.eat_keyword("in") {
        return Err(format!("expected 'in', found {}", ts.describe()));
    }
    let collection = ts.primary()?;
    let mut spec = ForSpec {
        variable,
        collection,
        limit: None,
        offset: None,
        reversed: false,
    };
    while ts.peek().is_some() {
        ts.eat(&Token::Comma);
        match ts.ident()?.as_str() {
            "reversed" => spec.reversed = true,
            "limit" => {
                ts.expect(&Token::Colon)?;
                spec.limit = Some(ts.primary()?);
            }
            "offset" => {
                ts.expect(&Token::Colon)?;
                spec.offset = Some(ts.primary()?);
            }
            other => return Err(format!("unknown for parameter '{}'", other)),
        }
    }
    Ok(spec)
}

/// Splits `'file' key: expr, ...` into the raw file reference (quotes
/// kept, exactly as written) and the trailing `key: expr` arguments.
pub fn parse_file_ref(src: &str) -> Result<(String, Vec<(String, Expr)>), String> {
    let src = src.trim();
    let end = match src.chars().next() {
        None => return Err("missing file name".to_string()),
        Some(q @ ('\'' | '"')) => {
            let close = src[1..]
                .find(q)
                .ok_or_else(|| "unterminated file name".to_string())?;
            close + 2
        }
        Some(_) => src
            .find(|c: char| c.is_whitespace() || c == ',')
            .unwrap_or(src.len()),
    };
    let raw = src[..end].to_string();

    let mut ts = TokenStream::new(&src[end..])?;
    let mut args = Vec::new();
    while ts.peek().is_some() {
        ts.eat(&Token::Comma);
        let key = ts.ident()?;
        ts.expect(&Token::Colon)?;
        args.push((key, ts.logical()?));
    }
    Ok((raw, args))
}

/// Parses the unquoted form of an include reference as a variable path.
pub fn parse_path(src: &str) -> Result<Expr, String> {
    let mut ts = TokenStream::new(src)?;
    let root = ts.ident()?;
    let expr = ts.path(root)?;
    ts.finish()?;
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(root: &str) -> Expr {
        Expr::Path {
            root: root.to_string(),
            segments: vec![],
        }
    }

    #[test]
    fn test_output_with_filters() {
        let out = parse_output("page.title | append: '!', 'x' | upcase").unwrap();
        assert_eq!(
            out.expr,
            Expr::Path {
                root: "page".to_string(),
                segments: vec![Segment::Key("title".to_string())],
            }
        );
        assert_eq!(out.filters.len(), 2);
        assert_eq!(out.filters[0].name, "append");
        assert_eq!(out.filters[0].args.len(), 2);
        assert_eq!(out.filters[1].name, "upcase");
    }

    #[test]
    fn test_index_segments() {
        let out = parse_output("items[0].name").unwrap();
        let Expr::Path { segments, .. } = out.expr else {
            panic!("Expected Path");
        };
        assert_eq!(segments[0], Segment::Index(Expr::Literal(Value::Int(0))));
        assert_eq!(segments[1], Segment::Key("name".to_string()));
    }

    #[test]
    fn test_condition_is_right_associative() {
        let expr = parse_condition("a and b or c").unwrap();
        assert_eq!(
            expr,
            Expr::And(
                Box::new(path("a")),
                Box::new(Expr::Or(Box::new(path("b")), Box::new(path("c"))))
            )
        );
    }

    #[test]
    fn test_comparisons() {
        let expr = parse_condition("x >= -2.5").unwrap();
        assert_eq!(
            expr,
            Expr::Compare {
                op: CmpOp::Ge,
                left: Box::new(path("x")),
                right: Box::new(Expr::Literal(Value::Float(-2.5))),
            }
        );
        assert!(matches!(
            parse_condition("tags contains 'rust'").unwrap(),
            Expr::Compare {
                op: CmpOp::Contains,
                ..
            }
        ));
    }

    #[test]
    fn test_for_spec() {
        let spec = parse_for("i in (1..3) limit: 2 reversed").unwrap();
        assert_eq!(spec.variable, "i");
        assert!(matches!(spec.collection, Expr::Range(..)));
        assert_eq!(spec.limit, Some(Expr::Literal(Value::Int(2))));
        assert!(spec.reversed);
        assert!(parse_for("i of items").is_err());
    }

    #[test]
    fn test_file_ref_keeps_quotes() {
        let (raw, args) = parse_file_ref("'partial' title: page.title, n: 1").unwrap();
        assert_eq!(raw, "'partial'");
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].0, "title");

        let (raw, args) = parse_file_ref("\"nav bar\"").unwrap();
        assert_eq!(raw, "\"nav bar\"");
        assert!(args.is_empty());

        let (raw, _) = parse_file_ref("partial_name").unwrap();
        assert_eq!(raw, "partial_name");
    }

    #[test]
    fn test_errors() {
        assert!(parse_output("'open").is_err());
        assert!(parse_output("a b").is_err());
        assert!(parse_condition("").is_err());
        assert!(parse_assign("x 1").is_err());
        assert!(parse_file_ref("").is_err());
    }
}
