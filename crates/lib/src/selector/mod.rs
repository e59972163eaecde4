//! Line selectors.
//!
//! A recipe line may end in `[expr]`, optionally after a `#` comment:
//!
//! ```text
//!   - pywin32          # [win]
//!   - readline         [not win]
//! ```
//!
//! [`select_lines`] keeps a line (minus its selector) when the expression is
//! truthy, drops it otherwise, and drops comment-only lines outright.

pub mod expr;
pub mod namespace;

use tracing::{trace, warn};

use crate::error::{RenderError, Result};
pub use expr::{Expr, SelectorError, parse};
pub use namespace::{Namespace, Value};

/// A line split into its kept content and its selector expression.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectorLine<'a> {
  content: &'a str,
  expr: &'a str,
}

/// Find the `[expr]` on a line whose brackets enclose no other brackets,
/// ending at byte offset `close` of `text`.
fn bracket_ending_at(text: &str, close: usize) -> Option<(usize, &str)> {
  let open = text[..close].rfind('[')?;
  let inner = &text[open + 1..close];
  if inner.is_empty() || inner.contains(']') {
    return None;
  }
  Some((open, inner))
}

fn split_selector(line: &str) -> Option<SelectorLine<'_>> {
  // `content  # comment [expr] trailing`; trailing text may not hold parens
  if let Some(hash) = line.find('#') {
    let content = line[..hash].trim_end();
    let comment = &line[hash..];
    let found = comment
      .match_indices(']')
      .rev()
      .filter(|(close, _)| !comment[close + 1..].contains(['(', ')']))
      .find_map(|(close, _)| bracket_ending_at(comment, close));
    if let Some((_, expr)) = found
      && !content.is_empty()
    {
      return Some(SelectorLine { content, expr });
    }
  }

  // `content [expr]` at end of line
  let close = line.strip_suffix(']').map(str::len)?;
  let (open, expr) = bracket_ending_at(line, close)?;
  let content = line[..open].trim_end();
  if content.is_empty() {
    return None;
  }
  Some(SelectorLine { content, expr })
}

/// Evaluate one selector expression. Identifiers missing from the namespace
/// count as `False`.
pub fn eval_selector(expr: &str, ns: &Namespace, variants_active: bool) -> std::result::Result<bool, SelectorError> {
  let parsed = parse(expr)?;
  let missing: Vec<String> = parsed
    .free_identifiers()
    .into_iter()
    .filter(|name| !ns.contains(name))
    .collect();
  if !missing.is_empty() && variants_active {
    warn!(
      selector = expr,
      missing = %missing.join(", "),
      "selector references names outside the namespace; treating them as False"
    );
  }
  let value = parsed.eval(&|name| ns.get(name).cloned().unwrap_or(Value::Bool(false)))?;
  Ok(value.truthy())
}

/// Apply selectors to every line of `text`.
///
/// The result always ends in a newline. `origin` only labels errors.
pub fn select_lines(text: &str, ns: &Namespace, variants_active: bool, origin: &str) -> Result<String> {
  let mut lines: Vec<String> = Vec::new();

  for (index, raw) in text.lines().enumerate() {
    let line = raw.trim_end();
    if line.trim_start().starts_with('#') {
      continue;
    }
    let trailing_quote = match line.chars().last() {
      Some(c @ ('\'' | '"')) => Some(c),
      _ => None,
    };

    match split_selector(line) {
      Some(selector) => {
        let keep = eval_selector(selector.expr, ns, variants_active).map_err(|e| RenderError::SelectorSyntax {
          path: origin.to_string(),
          line_no: index + 1,
          line: line.to_string(),
          message: e.to_string(),
        })?;
        trace!(line_no = index + 1, expr = selector.expr, keep, "selector");
        if keep {
          let mut kept = selector.content.to_string();
          kept.extend(trailing_quote);
          lines.push(kept);
        }
      }
      None => lines.push(line.to_string()),
    }
  }

  let mut out = lines.join("\n");
  out.push('\n');
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ns() -> Namespace {
    let mut ns = Namespace::new();
    ns.insert("linux", Value::Bool(true));
    ns.insert("win", Value::Bool(false));
    ns.insert("py", Value::Int(36));
    ns
  }

  mod splitting {
    use super::*;

    #[test]
    fn trailing_selector() {
      let sel = split_selector("  - readline [not win]").unwrap();
      assert_eq!(sel.content, "  - readline");
      assert_eq!(sel.expr, "not win");
    }

    #[test]
    fn commented_selector() {
      let sel = split_selector("  - pywin32  # windows only [win]").unwrap();
      assert_eq!(sel.content, "  - pywin32");
      assert_eq!(sel.expr, "win");
    }

    #[test]
    fn commented_selector_allows_trailing_text_without_parens() {
      let sel = split_selector("  - foo # [py>=35] trailing").unwrap();
      assert_eq!(sel.expr, "py>=35");
      assert!(split_selector("  - foo # [py>=35] call()").is_none());
    }

    #[test]
    fn brackets_inside_content_are_kept() {
      let sel = split_selector("  - foo[extra] [linux]").unwrap();
      assert_eq!(sel.content, "  - foo[extra]");
      assert_eq!(sel.expr, "linux");
    }

    #[test]
    fn plain_lines_have_no_selector() {
      assert!(split_selector("name: foo").is_none());
      assert!(split_selector("  - [a, b]x").is_none());
      assert!(split_selector("[linux]").is_none());
    }
  }

  mod selecting {
    use super::*;

    #[test]
    fn false_selector_drops_line() {
      let out = select_lines("a: 1\nb: 2  # [win]\nc: 3 [linux]\n", &ns(), false, "meta.yaml").unwrap();
      assert_eq!(out, "a: 1\nc: 3\n");
    }

    #[test]
    fn comment_only_lines_are_dropped() {
      let out = select_lines("# header\n  # indented\nkey: v\n", &ns(), false, "meta.yaml").unwrap();
      assert_eq!(out, "key: v\n");
    }

    #[test]
    fn trailing_quote_is_preserved() {
      let out = select_lines("  - \"foo  # [linux] \"\n", &ns(), false, "meta.yaml").unwrap();
      assert_eq!(out, "  - \"foo\"\n");
    }

    #[test]
    fn unknown_names_degrade_to_false() {
      let text = "a: 1 [foo or py == 36]\nb: 2 [foo]\nc: 3 [not foo]\n";
      let with_unknown = select_lines(text, &ns(), true, "meta.yaml").unwrap();
      let substituted = select_lines(
        &text.replace("foo", "False"),
        &ns(),
        true,
        "meta.yaml",
      )
      .unwrap();
      assert_eq!(with_unknown, substituted);
      assert_eq!(with_unknown, "a: 1\nc: 3\n");
    }

    #[test]
    fn syntax_errors_name_the_line() {
      let err = select_lines("ok: 1\nbad: 2 [py >>= 3]\n", &ns(), false, "recipe/meta.yaml").unwrap_err();
      match err {
        RenderError::SelectorSyntax { path, line_no, line, .. } => {
          assert_eq!(path, "recipe/meta.yaml");
          assert_eq!(line_no, 2);
          assert_eq!(line, "bad: 2 [py >>= 3]");
        }
        other => panic!("unexpected error {:?}", other),
      }
    }

    #[test]
    fn output_always_ends_with_newline() {
      assert_eq!(select_lines("", &ns(), false, "m").unwrap(), "\n");
      assert_eq!(select_lines("a: 1", &ns(), false, "m").unwrap(), "a: 1\n");
    }
  }
}
