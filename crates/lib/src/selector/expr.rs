//! Selector expressions.
//!
//! A small boolean language: `and`, `or`, `not`, comparisons (`==`, `!=`,
//! `<`, `<=`, `>`, `>=`, `in`, `not in`), parentheses, tuples, integer and
//! string literals, `True`/`False`/`None`, and bare identifiers. Parsing
//! produces an [`Expr`] tree; identifiers are resolved at evaluation time
//! through a lookup function, never by executing code.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use super::namespace::Value;

/// A parse or evaluation failure, with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SelectorError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  In,
  NotIn,
}

impl fmt::Display for CmpOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      CmpOp::Eq => "==",
      CmpOp::Ne => "!=",
      CmpOp::Lt => "<",
      CmpOp::Le => "<=",
      CmpOp::Gt => ">",
      CmpOp::Ge => ">=",
      CmpOp::In => "in",
      CmpOp::NotIn => "not in",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Literal(Value),
  Name(String),
  Tuple(Vec<Expr>),
  Not(Box<Expr>),
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
  /// `first op1 second op2 third ...`, evaluated pairwise like a chain.
  Compare { first: Box<Expr>, rest: Vec<(CmpOp, Expr)> },
}

impl Expr {
  /// Every identifier referenced anywhere in the tree.
  pub fn free_identifiers(&self) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    self.collect_identifiers(&mut names);
    names
  }

  fn collect_identifiers(&self, names: &mut BTreeSet<String>) {
    match self {
      Expr::Literal(_) => {}
      Expr::Name(name) => {
        names.insert(name.clone());
      }
      Expr::Tuple(items) => items.iter().for_each(|e| e.collect_identifiers(names)),
      Expr::Not(inner) => inner.collect_identifiers(names),
      Expr::And(a, b) | Expr::Or(a, b) => {
        a.collect_identifiers(names);
        b.collect_identifiers(names);
      }
      Expr::Compare { first, rest } => {
        first.collect_identifiers(names);
        rest.iter().for_each(|(_, e)| e.collect_identifiers(names));
      }
    }
  }

  /// Evaluate the tree, resolving identifiers through `lookup`.
  pub fn eval(&self, lookup: &dyn Fn(&str) -> Value) -> Result<Value, SelectorError> {
    match self {
      Expr::Literal(v) => Ok(v.clone()),
      Expr::Name(name) => Ok(lookup(name)),
      Expr::Tuple(items) => Ok(Value::List(
        items.iter().map(|e| e.eval(lookup)).collect::<Result<_, _>>()?,
      )),
      Expr::Not(inner) => Ok(Value::Bool(!inner.eval(lookup)?.truthy())),
      Expr::And(a, b) => {
        let left = a.eval(lookup)?;
        if left.truthy() { b.eval(lookup) } else { Ok(left) }
      }
      Expr::Or(a, b) => {
        let left = a.eval(lookup)?;
        if left.truthy() { Ok(left) } else { b.eval(lookup) }
      }
      Expr::Compare { first, rest } => {
        let mut left = first.eval(lookup)?;
        for (op, rhs) in rest {
          let right = rhs.eval(lookup)?;
          if !compare(*op, &left, &right)? {
            return Ok(Value::Bool(false));
          }
          left = right;
        }
        Ok(Value::Bool(true))
      }
    }
  }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, SelectorError> {
  match op {
    CmpOp::Eq => Ok(left.loose_eq(right)),
    CmpOp::Ne => Ok(!left.loose_eq(right)),
    CmpOp::In | CmpOp::NotIn => {
      let found = match (left, right) {
        (_, Value::List(items)) => items.iter().any(|item| left.loose_eq(item)),
        (Value::Str(needle), Value::Str(hay)) => hay.contains(needle.as_str()),
        _ => {
          return Err(SelectorError(format!(
            "'{}' requires a tuple or string on the right, got {}",
            op,
            right.type_name()
          )));
        }
      };
      Ok(if op == CmpOp::In { found } else { !found })
    }
    CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
      let ordering = left.partial_order(right).ok_or_else(|| {
        SelectorError(format!(
          "'{}' not supported between {} and {}",
          op,
          left.type_name(),
          right.type_name()
        ))
      })?;
      Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
      })
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Ident(String),
  Int(i64),
  Str(String),
  LParen,
  RParen,
  Comma,
  Op(CmpOp),
  Minus,
  Not,
  And,
  Or,
}

fn tokenize(input: &str) -> Result<Vec<Token>, SelectorError> {
  let mut tokens = Vec::new();
  let mut chars: Peekable<CharIndices<'_>> = input.char_indices().peekable();

  while let Some((pos, c)) = chars.next() {
    match c {
      c if c.is_whitespace() => {}
      '(' => tokens.push(Token::LParen),
      ')' => tokens.push(Token::RParen),
      ',' => tokens.push(Token::Comma),
      '-' => tokens.push(Token::Minus),
      '=' | '!' | '<' | '>' => {
        let followed_by_eq = matches!(chars.peek(), Some((_, '=')));
        if followed_by_eq {
          chars.next();
        }
        let op = match (c, followed_by_eq) {
          ('=', true) => CmpOp::Eq,
          ('!', true) => CmpOp::Ne,
          ('<', false) => CmpOp::Lt,
          ('<', true) => CmpOp::Le,
          ('>', false) => CmpOp::Gt,
          ('>', true) => CmpOp::Ge,
          _ => return Err(SelectorError(format!("unexpected '{}' at offset {}", c, pos))),
        };
        tokens.push(Token::Op(op));
      }
      '\'' | '"' => {
        let quote = c;
        let mut value = String::new();
        let mut closed = false;
        while let Some((_, ch)) = chars.next() {
          match ch {
            '\\' => {
              if let Some((_, escaped)) = chars.next() {
                value.push(escaped);
              }
            }
            ch if ch == quote => {
              closed = true;
              break;
            }
            ch => value.push(ch),
          }
        }
        if !closed {
          return Err(SelectorError(format!("unterminated string starting at offset {}", pos)));
        }
        tokens.push(Token::Str(value));
      }
      c if c.is_ascii_digit() => {
        let mut end = pos + c.len_utf8();
        while let Some(&(i, ch)) = chars.peek() {
          if !ch.is_ascii_digit() {
            break;
          }
          end = i + ch.len_utf8();
          chars.next();
        }
        let number = input[pos..end]
          .parse::<i64>()
          .map_err(|e| SelectorError(format!("invalid integer '{}': {}", &input[pos..end], e)))?;
        if let Some(&(_, ch)) = chars.peek()
          && (ch.is_alphanumeric() || ch == '_' || ch == '.')
        {
          return Err(SelectorError(format!("unexpected '{}' after number at offset {}", ch, end)));
        }
        tokens.push(Token::Int(number));
      }
      c if c.is_alphabetic() || c == '_' => {
        let mut end = pos + c.len_utf8();
        while let Some(&(i, ch)) = chars.peek() {
          if !(ch.is_alphanumeric() || ch == '_') {
            break;
          }
          end = i + ch.len_utf8();
          chars.next();
        }
        let word = &input[pos..end];
        tokens.push(match word {
          "not" => Token::Not,
          "and" => Token::And,
          "or" => Token::Or,
          "in" => Token::Op(CmpOp::In),
          _ => Token::Ident(word.to_string()),
        });
      }
      other => {
        return Err(SelectorError(format!("unexpected character '{}' at offset {}", other, pos)));
      }
    }
  }

  Ok(tokens)
}

struct Parser {
  tokens: Vec<Token>,
  pos: usize,
}

impl Parser {
  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_at(&self, offset: usize) -> Option<&Token> {
    self.tokens.get(self.pos + offset)
  }

  fn advance(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.pos).cloned();
    if token.is_some() {
      self.pos += 1;
    }
    token
  }

  fn expect(&mut self, expected: Token) -> Result<(), SelectorError> {
    match self.advance() {
      Some(t) if t == expected => Ok(()),
      Some(t) => Err(SelectorError(format!("expected {:?}, found {:?}", expected, t))),
      None => Err(SelectorError(format!("expected {:?}, found end of expression", expected))),
    }
  }

  fn parse_or(&mut self) -> Result<Expr, SelectorError> {
    let mut left = self.parse_and()?;
    while self.peek() == Some(&Token::Or) {
      self.advance();
      let right = self.parse_and()?;
      left = Expr::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn parse_and(&mut self) -> Result<Expr, SelectorError> {
    let mut left = self.parse_not()?;
    while self.peek() == Some(&Token::And) {
      self.advance();
      let right = self.parse_not()?;
      left = Expr::And(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn parse_not(&mut self) -> Result<Expr, SelectorError> {
    if self.peek() == Some(&Token::Not) {
      self.advance();
      return Ok(Expr::Not(Box::new(self.parse_not()?)));
    }
    self.parse_comparison()
  }

  fn comparison_op(&mut self) -> Option<CmpOp> {
    match self.peek() {
      Some(Token::Op(op)) => {
        let op = *op;
        self.advance();
        Some(op)
      }
      Some(Token::Not) if self.peek_at(1) == Some(&Token::Op(CmpOp::In)) => {
        self.pos += 2;
        Some(CmpOp::NotIn)
      }
      _ => None,
    }
  }

  fn parse_comparison(&mut self) -> Result<Expr, SelectorError> {
    let first = self.parse_atom()?;
    let mut rest = Vec::new();
    while let Some(op) = self.comparison_op() {
      rest.push((op, self.parse_atom()?));
    }
    if rest.is_empty() {
      Ok(first)
    } else {
      Ok(Expr::Compare {
        first: Box::new(first),
        rest,
      })
    }
  }

  fn parse_atom(&mut self) -> Result<Expr, SelectorError> {
    match self.advance() {
      Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
      Some(Token::Minus) => match self.advance() {
        Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(-n))),
        other => Err(SelectorError(format!("expected integer after '-', found {:?}", other))),
      },
      Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
      Some(Token::Ident(name)) => Ok(match name.as_str() {
        "True" => Expr::Literal(Value::Bool(true)),
        "False" => Expr::Literal(Value::Bool(false)),
        "None" => Expr::Literal(Value::None),
        _ => Expr::Name(name),
      }),
      Some(Token::LParen) => self.parse_parenthesized(),
      Some(t) => Err(SelectorError(format!("unexpected token {:?}", t))),
      None => Err(SelectorError("unexpected end of expression".to_string())),
    }
  }

  fn parse_parenthesized(&mut self) -> Result<Expr, SelectorError> {
    if self.peek() == Some(&Token::RParen) {
      self.advance();
      return Ok(Expr::Tuple(Vec::new()));
    }
    let first = self.parse_or()?;
    if self.peek() != Some(&Token::Comma) {
      self.expect(Token::RParen)?;
      return Ok(first);
    }
    let mut items = vec![first];
    while self.peek() == Some(&Token::Comma) {
      self.advance();
      if self.peek() == Some(&Token::RParen) {
        break;
      }
      items.push(self.parse_or()?);
    }
    self.expect(Token::RParen)?;
    Ok(Expr::Tuple(items))
  }
}

/// Parse a selector expression (the text between the brackets).
pub fn parse(input: &str) -> Result<Expr, SelectorError> {
  let tokens = tokenize(input)?;
  if tokens.is_empty() {
    return Err(SelectorError("empty selector".to_string()));
  }
  let mut parser = Parser { tokens, pos: 0 };
  let expr = parser.parse_or()?;
  if let Some(extra) = parser.peek() {
    return Err(SelectorError(format!("unexpected trailing token {:?}", extra)));
  }
  Ok(expr)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn eval_with(expr: &str, vars: &[(&str, Value)]) -> bool {
    let parsed = parse(expr).unwrap();
    parsed
      .eval(&|name| {
        vars
          .iter()
          .find(|(k, _)| *k == name)
          .map(|(_, v)| v.clone())
          .unwrap_or(Value::Bool(false))
      })
      .unwrap()
      .truthy()
  }

  mod parsing {
    use super::*;

    #[test]
    fn precedence_binds_and_tighter_than_or() {
      let expr = parse("a or b and c").unwrap();
      assert!(matches!(expr, Expr::Or(_, _)));
    }

    #[test]
    fn not_in_is_a_single_operator() {
      let expr = parse("x not in (1, 2)").unwrap();
      match expr {
        Expr::Compare { rest, .. } => assert_eq!(rest[0].0, CmpOp::NotIn),
        other => panic!("unexpected tree {:?}", other),
      }
    }

    #[test]
    fn rejects_code_constructs() {
      assert!(parse("__import__('os').system('x')").is_err());
      assert!(parse("a.b").is_err());
      assert!(parse("a = 1").is_err());
      assert!(parse("").is_err());
      assert!(parse("(a").is_err());
      assert!(parse("a b").is_err());
    }

    #[test]
    fn collects_free_identifiers() {
      let expr = parse("linux and (py >= 27 or not foo) and 'x' in (bar, 1)").unwrap();
      let names: Vec<_> = expr.free_identifiers().into_iter().collect();
      assert_eq!(names, vec!["bar", "foo", "linux", "py"]);
    }
  }

  mod evaluation {
    use super::*;

    #[test]
    fn boolean_connectives() {
      let vars = [("linux", Value::Bool(true)), ("win", Value::Bool(false))];
      assert!(eval_with("linux", &vars));
      assert!(!eval_with("win", &vars));
      assert!(eval_with("linux or win", &vars));
      assert!(!eval_with("linux and win", &vars));
      assert!(eval_with("not win", &vars));
    }

    #[test]
    fn integer_comparisons_chain() {
      let vars = [("py", Value::Int(36))];
      assert!(eval_with("py >= 35", &vars));
      assert!(eval_with("py == 36", &vars));
      assert!(eval_with("27 < py < 40", &vars));
      assert!(!eval_with("py < 30", &vars));
      assert!(eval_with("py != 27", &vars));
    }

    #[test]
    fn membership() {
      let vars = [("py", Value::Int(27)), ("plat", Value::Str("linux-64".to_string()))];
      assert!(eval_with("py in (27, 35)", &vars));
      assert!(eval_with("py not in (35, 36)", &vars));
      assert!(eval_with("'linux' in plat", &vars));
    }

    #[test]
    fn ordering_mismatched_types_is_an_error() {
      let expr = parse("py < 'x'").unwrap();
      let err = expr.eval(&|_| Value::Int(1)).unwrap_err();
      assert!(err.0.contains("not supported"));
    }

    #[test]
    fn unknown_names_behave_as_false() {
      // The lookup falls back to False for anything it does not know.
      assert!(eval_with("foo or linux", &[("linux", Value::Bool(true))]));
      assert_eq!(eval_with("foo", &[]), eval_with("False", &[]));
      assert_eq!(eval_with("not foo and True", &[]), eval_with("not False and True", &[]));
    }
  }
}
