use std::sync::OnceLock;

use regex::{Captures, Regex};

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
  PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern is valid"))
}

/// Result of interpolating a `Fn::Sub` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolation {
  pub text: String,
  pub placeholders: usize,
  pub unresolved: usize,
}

impl Interpolation {
  pub fn is_complete(&self) -> bool {
    self.placeholders > 0 && self.unresolved == 0
  }
}

/// Substitute every `${...}` placeholder that `resolve` knows.
///
/// Literal escapes (`${!Name}`) and engine pseudo parameters (`${AWS::Region}`)
/// are never handed to `resolve`.
pub fn interpolate<F>(text: &str, mut resolve: F) -> Interpolation
where
  F: FnMut(&str) -> Option<String>,
{
  let mut placeholders = 0;
  let mut unresolved = 0;

  let replaced = placeholder_re().replace_all(text, |caps: &Captures| {
    placeholders += 1;
    let expression = caps[1].trim();
    let value = if expression.starts_with('!') || expression.contains("::") {
      None
    } else {
      resolve(expression)
    };
    match value {
      Some(v) => v,
      None => {
        unresolved += 1;
        caps[0].to_string()
      }
    }
  });

  Interpolation {
    text: replaced.into_owned(),
    placeholders,
    unresolved,
  }
}
