//! Expression evaluation for key extraction and partition selection.
//!
//! The partitioning layer treats expressions as opaque: an [`ExpressionParser`]
//! compiles a source string once, at binding creation, into an [`Expression`]
//! that is evaluated per message against an [`EvaluationContext`].
//!
//! [`PathExpressionParser`] is the built-in language. It navigates the JSON view
//! of a message:
//!
//! | Expression          | Value                                   |
//! |---------------------|-----------------------------------------|
//! | `payload`           | the whole payload                       |
//! | `payload.a.b`       | nested field                            |
//! | `payload['a'][0]`   | bracketed field, array element          |
//! | `headers.id`        | header value (string), `null` if absent |
//! | `headers['x-id']`   | header with a non-identifier name       |
//! | `key`, `key.field`  | the extracted partition key (selectors) |
//! | `42`, `'fixed'`     | literals                                |
//!
//! Any other parser can be plugged into the [`Binder`](crate::binder::Binder).

use crate::error::ExpressionError;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// What an expression can see while it is evaluated.
///
/// Key expressions see the payload and headers of the outbound message.
/// Selector expressions see only the raw partition key, as root `key`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EvaluationContext<'a> {
  payload: Option<&'a Value>,
  headers: Option<&'a [(String, String)]>,
  key: Option<&'a Value>,
}

impl<'a> EvaluationContext<'a> {
  /// Context for a key expression over a message.
  ///
  /// `payload` is `None` when the expression does not read it and the payload
  /// was therefore never serialized.
  #[must_use]
  pub fn message(payload: Option<&'a Value>, headers: &'a [(String, String)]) -> Self {
    Self {
      payload,
      headers: Some(headers),
      key: None,
    }
  }

  /// Context for a selector expression over an extracted key.
  #[must_use]
  pub fn key(key: &'a Value) -> Self {
    Self {
      key: Some(key),
      ..Default::default()
    }
  }

  /// The JSON view of the payload, when visible.
  #[must_use]
  pub fn payload(&self) -> Option<&'a Value> {
    self.payload
  }

  /// A header value by name. Later headers shadow earlier ones.
  #[must_use]
  pub fn header(&self, name: &str) -> Option<&'a str> {
    self
      .headers?
      .iter()
      .rev()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }

  /// The partition key, when visible.
  #[must_use]
  pub fn partition_key(&self) -> Option<&'a Value> {
    self.key
  }
}

/// A compiled expression.
///
/// Implementations must be pure: the same context always yields the same value.
pub trait Expression: Send + Sync + Debug {
  /// The source text the expression was compiled from.
  fn source(&self) -> &str;

  /// Evaluates the expression.
  fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<Value, ExpressionError>;

  /// Whether evaluation reads the payload. When `false`, callers may skip
  /// building the payload view.
  fn reads_payload(&self) -> bool {
    true
  }
}

/// Compiles expression source into an [`Expression`].
pub trait ExpressionParser: Send + Sync {
  /// Parses `source`. Called once per expression property at binding creation.
  fn parse(&self, source: &str) -> Result<Arc<dyn Expression>, ExpressionError>;
}

/// Human-readable JSON type name, used in type-mismatch errors.
#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

/// Parser for the built-in path language.
#[derive(Clone, Copy, Debug, Default)]
pub struct PathExpressionParser;

impl PathExpressionParser {
  /// Creates the parser.
  #[must_use]
  pub fn new() -> Self {
    Self
  }
}

impl ExpressionParser for PathExpressionParser {
  fn parse(&self, source: &str) -> Result<Arc<dyn Expression>, ExpressionError> {
    Ok(Arc::new(PathExpression::parse(source)?))
  }
}

#[derive(Clone, Debug, PartialEq)]
enum Root {
  Payload,
  Headers,
  Key,
  Literal(Value),
}

#[derive(Clone, Debug, PartialEq)]
enum Segment {
  Field(String),
  Index(usize),
}

/// A compiled path expression.
#[derive(Clone, Debug, PartialEq)]
pub struct PathExpression {
  source: String,
  root: Root,
  segments: Vec<Segment>,
}

impl PathExpression {
  /// Compiles `source`.
  pub fn parse(source: &str) -> Result<Self, ExpressionError> {
    PathParser::new(source).parse()
  }

  fn fail(&self, reason: impl Into<String>) -> ExpressionError {
    ExpressionError::Evaluation {
      expression: self.source.clone(),
      reason: reason.into(),
    }
  }

  fn walk(&self, mut current: &Value) -> Result<Value, ExpressionError> {
    for segment in &self.segments {
      current = match (segment, current) {
        (_, Value::Null) => return Ok(Value::Null),
        (Segment::Field(name), Value::Object(map)) => match map.get(name) {
          Some(v) => v,
          None => return Ok(Value::Null),
        },
        (Segment::Index(i), Value::Array(items)) => match items.get(*i) {
          Some(v) => v,
          None => return Ok(Value::Null),
        },
        (Segment::Field(name), other) => {
          return Err(self.fail(format!(
            "cannot read field `{}` of {}",
            name,
            json_type_name(other)
          )));
        }
        (Segment::Index(i), other) => {
          return Err(self.fail(format!(
            "cannot index [{}] into {}",
            i,
            json_type_name(other)
          )));
        }
      };
    }
    Ok(current.clone())
  }
}

impl Expression for PathExpression {
  fn source(&self) -> &str {
    &self.source
  }

  fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<Value, ExpressionError> {
    match &self.root {
      Root::Literal(value) => Ok(value.clone()),
      Root::Payload => {
        let payload = context
          .payload()
          .ok_or_else(|| self.fail("payload is not visible in this context"))?;
        self.walk(payload)
      }
      Root::Key => {
        let key = context
          .partition_key()
          .ok_or_else(|| self.fail("key is not visible in this context"))?;
        self.walk(key)
      }
      Root::Headers => {
        if context.headers.is_none() {
          return Err(self.fail("headers are not visible in this context"));
        }
        // parser guarantees exactly one field segment
        let Some(Segment::Field(name)) = self.segments.first() else {
          return Err(self.fail("headers requires a header name"));
        };
        Ok(
          context
            .header(name)
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        )
      }
    }
  }

  fn reads_payload(&self) -> bool {
    self.root == Root::Payload
  }
}

struct PathParser<'a> {
  source: &'a str,
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> PathParser<'a> {
  fn new(source: &'a str) -> Self {
    Self {
      source,
      bytes: source.as_bytes(),
      pos: 0,
    }
  }

  fn error(&self, reason: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
      expression: self.source.to_string(),
      offset: self.pos,
      reason: reason.into(),
    }
  }

  fn peek(&self) -> Option<u8> {
    self.bytes.get(self.pos).copied()
  }

  fn skip_whitespace(&mut self) {
    while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
      self.pos += 1;
    }
  }

  fn expect(&mut self, byte: u8) -> Result<(), ExpressionError> {
    if self.peek() == Some(byte) {
      self.pos += 1;
      Ok(())
    } else {
      Err(self.error(format!("expected `{}`", byte as char)))
    }
  }

  fn parse(mut self) -> Result<PathExpression, ExpressionError> {
    self.skip_whitespace();
    let root = match self.peek() {
      None => return Err(self.error("expression is empty")),
      Some(b'\'') => Root::Literal(Value::String(self.quoted()?)),
      Some(b) if b == b'-' || b.is_ascii_digit() => Root::Literal(Value::from(self.integer()?)),
      Some(_) => {
        let start = self.pos;
        let ident = self.identifier()?;
        match ident.as_str() {
          "payload" => Root::Payload,
          "headers" => Root::Headers,
          "key" => Root::Key,
          other => {
            self.pos = start;
            return Err(self.error(format!(
              "unknown root `{}`, expected payload, headers or key",
              other
            )));
          }
        }
      }
    };

    let mut segments = Vec::new();
    loop {
      self.skip_whitespace();
      match self.peek() {
        None => break,
        Some(b'.') => {
          self.pos += 1;
          segments.push(Segment::Field(self.identifier()?));
        }
        Some(b'[') => {
          self.pos += 1;
          self.skip_whitespace();
          let segment = if self.peek() == Some(b'\'') {
            Segment::Field(self.quoted()?)
          } else {
            let index = self.integer()?;
            let index = usize::try_from(index).map_err(|_| self.error("index must be >= 0"))?;
            Segment::Index(index)
          };
          self.skip_whitespace();
          self.expect(b']')?;
          segments.push(segment);
        }
        Some(_) => return Err(self.error("expected `.`, `[` or end of expression")),
      }
    }

    match &root {
      Root::Literal(_) if !segments.is_empty() => {
        return Err(self.error("literals cannot be navigated"));
      }
      Root::Headers => match segments.as_slice() {
        [Segment::Field(_)] => {}
        _ => return Err(self.error("headers takes exactly one header name")),
      },
      _ => {}
    }

    Ok(PathExpression {
      source: self.source.trim().to_string(),
      root,
      segments,
    })
  }

  fn identifier(&mut self) -> Result<String, ExpressionError> {
    let start = self.pos;
    match self.peek() {
      Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.pos += 1,
      _ => return Err(self.error("expected an identifier")),
    }
    while self
      .peek()
      .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
      self.pos += 1;
    }
    Ok(self.source[start..self.pos].to_string())
  }

  fn quoted(&mut self) -> Result<String, ExpressionError> {
    self.expect(b'\'')?;
    let start = self.pos;
    while let Some(b) = self.peek() {
      if b == b'\'' {
        let text = self.source[start..self.pos].to_string();
        self.pos += 1;
        return Ok(text);
      }
      self.pos += 1;
    }
    Err(self.error("unterminated string literal"))
  }

  fn integer(&mut self) -> Result<i64, ExpressionError> {
    let start = self.pos;
    if self.peek() == Some(b'-') {
      self.pos += 1;
    }
    while self.peek().is_some_and(|b| b.is_ascii_digit()) {
      self.pos += 1;
    }
    self.source[start..self.pos]
      .parse()
      .map_err(|_| self.error("expected an integer"))
  }
}
