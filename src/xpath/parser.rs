//! XPath expression parser
//!
//! Recursive descent over the XPath 1.0 grammar. Operator names (`and`, `or`,
//! `div`, `mod`) and `*` are disambiguated by position: they are only read as
//! operators where the parser already holds a complete operand.

use super::lexer::{tokenize, Spanned, Token};
use crate::error::XPathError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Path(LocationPath),
    /// Primary expression with predicates, optionally continued by a relative path
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Literal(String),
    Number(f64),
    Call(Function, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum CmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }

    /// Reverse axes number their proximity positions backwards
    pub(crate) fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeTest {
    /// `*`: any element, or any attribute on the attribute axis
    Any,
    Name(String),
    Text,
    Node,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Function {
    Last,
    Position,
    Count,
    Not,
    True,
    False,
    Boolean,
    String,
    Number,
    Concat,
    Contains,
    StartsWith,
    EndsWith,
    NormalizeSpace,
    StringLength,
    Substring,
    SubstringBefore,
    SubstringAfter,
    Translate,
    Name,
    LocalName,
    Sum,
    Floor,
    Ceiling,
    Round,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "last" => Function::Last,
            "position" => Function::Position,
            "count" => Function::Count,
            "not" => Function::Not,
            "true" => Function::True,
            "false" => Function::False,
            "boolean" => Function::Boolean,
            "string" => Function::String,
            "number" => Function::Number,
            "concat" => Function::Concat,
            "contains" => Function::Contains,
            "starts-with" => Function::StartsWith,
            "ends-with" => Function::EndsWith,
            "normalize-space" => Function::NormalizeSpace,
            "string-length" => Function::StringLength,
            "substring" => Function::Substring,
            "substring-before" => Function::SubstringBefore,
            "substring-after" => Function::SubstringAfter,
            "translate" => Function::Translate,
            "name" => Function::Name,
            "local-name" => Function::LocalName,
            "sum" => Function::Sum,
            "floor" => Function::Floor,
            "ceiling" => Function::Ceiling,
            "round" => Function::Round,
            _ => return None,
        })
    }

    /// Accepted argument counts, inclusive; `None` upper bound is variadic
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Last | Function::Position | Function::True | Function::False => (0, Some(0)),
            Function::Count
            | Function::Not
            | Function::Boolean
            | Function::Sum
            | Function::Floor
            | Function::Ceiling
            | Function::Round => (1, Some(1)),
            Function::String
            | Function::Number
            | Function::NormalizeSpace
            | Function::StringLength
            | Function::Name
            | Function::LocalName => (0, Some(1)),
            Function::Contains
            | Function::StartsWith
            | Function::EndsWith
            | Function::SubstringBefore
            | Function::SubstringAfter => (2, Some(2)),
            Function::Substring => (2, Some(3)),
            Function::Translate => (3, Some(3)),
            Function::Concat => (2, None),
        }
    }
}

pub(crate) fn parse(input: &str) -> Result<Expr, XPathError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(XPathError::new("empty expression", 0));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(parser.error(format!("unexpected token {token:?}"))),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, p)| *p).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> XPathError {
        XPathError::new(message, self.offset())
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), XPathError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}")))
        }
    }

    fn eat_operator_name(&mut self, name: &str) -> bool {
        match self.peek() {
            Some(Token::Name(n)) if n == name => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_and()?;
        while self.eat_operator_name("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_equality()?;
        while self.eat_operator_name("and") {
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::Neq) => CmpOp::Neq,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Ge) => CmpOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Name(n)) if n == "div" => ArithOp::Div,
                Some(Token::Name(n)) if n == "mod" => ArithOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_path_expr()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_path_expr(&mut self) -> Result<Expr, XPathError> {
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let steps = if self.starts_step() {
                    self.parse_relative_steps()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path(LocationPath {
                    absolute: true,
                    steps,
                }))
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![Step::descendant_or_self()];
                steps.extend(self.parse_relative_steps()?);
                Ok(Expr::Path(LocationPath {
                    absolute: true,
                    steps,
                }))
            }
            _ if self.starts_step() => Ok(Expr::Path(LocationPath {
                absolute: false,
                steps: self.parse_relative_steps()?,
            })),
            _ => self.parse_filter_expr(),
        }
    }

    fn starts_step(&self) -> bool {
        match self.peek() {
            Some(Token::At | Token::Dot | Token::DotDot | Token::Star) => true,
            Some(Token::Name(name)) => match self.peek_at(1) {
                Some(Token::ColonColon) => true,
                Some(Token::LParen) => is_node_type(name),
                _ => true,
            },
            _ => false,
        }
    }

    fn parse_relative_steps(&mut self) -> Result<Vec<Step>, XPathError> {
        let mut steps = vec![self.parse_step()?];
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.parse_step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.parse_step()?);
            } else {
                return Ok(steps);
            }
        }
    }

    fn parse_step(&mut self) -> Result<Step, XPathError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) =
            (self.peek(), self.peek_at(1))
        {
            let axis = Axis::from_name(name)
                .ok_or_else(|| self.error(format!("unknown axis '{name}'")))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket)?;
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, XPathError> {
        let start = self.pos;
        match self.advance() {
            Some(Token::Star) => Ok(NodeTest::Any),
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) && is_node_type(&name) {
                    self.pos += 1;
                    self.expect(Token::RParen)?;
                    return Ok(match name.as_str() {
                        "text" => NodeTest::Text,
                        "comment" => NodeTest::Comment,
                        _ => NodeTest::Node,
                    });
                }
                Ok(NodeTest::Name(name))
            }
            _ => {
                self.pos = start;
                Err(self.error("expected node test"))
            }
        }
    }

    fn parse_filter_expr(&mut self) -> Result<Expr, XPathError> {
        let primary = self.parse_primary()?;
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket)?;
        }

        let mut steps = Vec::new();
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.parse_step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }

        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        let start = self.pos;
        match self.advance() {
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name)) if self.peek() == Some(&Token::LParen) => {
                let function = Function::from_name(&name).ok_or_else(|| {
                    self.pos = start;
                    self.error(format!("unknown function '{name}'"))
                })?;
                self.pos += 1;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RParen)?;
                        break;
                    }
                }
                let (min, max) = function.arity();
                if args.len() < min || max.is_some_and(|max| args.len() > max) {
                    self.pos = start;
                    return Err(self.error(format!(
                        "wrong number of arguments for '{name}': {}",
                        args.len()
                    )));
                }
                Ok(Expr::Call(function, args))
            }
            _ => {
                self.pos = start;
                Err(self.error("expected expression"))
            }
        }
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "text" | "node" | "comment")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_abbreviated_path() {
        let expr = parse("//table[@class='itemlist']/tbody/tr").unwrap();
        let Expr::Path(path) = expr else {
            panic!("expected a location path");
        };
        assert!(path.absolute);
        assert_eq!(path.steps.len(), 4);
        assert_eq!(path.steps[0].axis, Axis::DescendantOrSelf);
        assert_eq!(path.steps[1].test, NodeTest::Name("table".into()));
        assert_eq!(path.steps[1].predicates.len(), 1);
        assert_eq!(path.steps[3].test, NodeTest::Name("tr".into()));
    }

    #[test]
    fn test_parse_operators_by_position() {
        // `div` is an element name first, then an operator
        let expr = parse("count(div) div 2").unwrap();
        assert!(matches!(expr, Expr::Arith(ArithOp::Div, _, _)));

        let expr = parse("@id and not(@hidden)").unwrap();
        assert!(matches!(expr, Expr::And(_, _)));
    }

    #[test]
    fn test_parse_text_node_test() {
        let expr = parse("p/text()").unwrap();
        let Expr::Path(path) = expr else {
            panic!("expected a location path");
        };
        assert_eq!(path.steps[1].test, NodeTest::Text);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("//div[").is_err());
        assert!(parse("bogus(1)").is_err());
        assert!(parse("contains('a')").is_err());
        assert!(parse("sideways::div").is_err());
        assert!(parse("//div]").is_err());
    }

    #[test]
    fn test_parse_filter_expression() {
        let expr = parse("(//li)[last()]/a").unwrap();
        assert!(matches!(expr, Expr::Filter { .. }));
    }
}
