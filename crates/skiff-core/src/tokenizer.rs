//! Line tokenizer for skiff scripts.
//!
//! Every non-blank, non-comment line becomes one [`LineStatement`]: an
//! uppercase keyword followed by its raw argument tokens. Tokenizing is
//! fail-fast; the first malformed line aborts with its line number.

use crate::action::Keyword;
use crate::error::SkiffError;

/// One keyword line with its raw argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineStatement {
    pub keyword: String,
    pub arguments: Vec<String>,
    /// 1-based physical line number in the source.
    pub line: usize,
}

impl LineStatement {
    pub fn new(keyword: impl Into<String>, arguments: Vec<String>, line: usize) -> Self {
        Self {
            keyword: keyword.into(),
            arguments,
            line,
        }
    }
}

/// Tokenizes a whole script.
///
/// Full-line comments (`#` as the first non-blank character) are dropped
/// without looking at their content. A `#` that starts a token begins a
/// trailing comment. `\#` is a literal `#`, and `#` inside quotes never
/// starts a comment.
///
/// `ENV` and `VAR` lines are normalized to exactly two arguments,
/// `[KEY, VALUE]`, with the `=` removed.
pub fn tokenize(source: &str) -> Result<Vec<LineStatement>, SkiffError> {
    let mut statements = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;

        if raw.trim_start().starts_with('#') {
            continue;
        }

        let tokens = split_line(raw, line)?;
        let Some((keyword, arguments)) = tokens.split_first() else {
            continue;
        };

        if !keyword.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(SkiffError::grammar(
                line,
                format!("invalid grammar near `{}`", keyword),
            ));
        }

        let kind: Keyword = keyword.parse().map_err(|_| {
            SkiffError::grammar(line, format!("invalid action `{}`", keyword))
        })?;

        if arguments.is_empty() {
            return Err(SkiffError::grammar(
                line,
                format!("`{}` requires at least one argument", keyword),
            ));
        }

        let arguments = if kind.is_assignment() {
            split_assignment(keyword, arguments, line)?
        } else {
            arguments.to_vec()
        };

        statements.push(LineStatement::new(keyword.clone(), arguments, line));
    }

    Ok(statements)
}

/// Splits one physical line into whitespace-separated tokens, dropping any
/// trailing comment.
fn split_line(raw: &str, line: usize) -> Result<Vec<String>, SkiffError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '\\' if chars.peek() == Some(&'#') => {
                chars.next();
                current.push('#');
            }
            '#' if current.is_empty() => break,
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(SkiffError::grammar(line, "unterminated quote"));
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}

/// Normalizes `KEY = VALUE` (with or without spaces around `=`) into
/// `[KEY, VALUE]`.
fn split_assignment(
    keyword: &str,
    arguments: &[String],
    line: usize,
) -> Result<Vec<String>, SkiffError> {
    let text = arguments.join(" ");
    let Some((key, value)) = text.split_once('=') else {
        return Err(SkiffError::grammar(
            line,
            format!("`{}` expects `KEY = VALUE`", keyword),
        ));
    };

    let key = key.trim();
    let value = value.trim();

    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(SkiffError::grammar(
            line,
            format!("`{}` has an invalid key `{}`", keyword, key),
        ));
    }
    if value.is_empty() {
        return Err(SkiffError::grammar(
            line,
            format!("`{} {}` is missing a value", keyword, key),
        ));
    }

    Ok(vec![key.to_string(), value.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(statement: &LineStatement) -> Vec<&str> {
        statement.arguments.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_basic() {
        let out = tokenize("RUN 192.168.0.1").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].keyword, "RUN");
        assert_eq!(args(&out[0]), ["192.168.0.1"]);
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        let a = tokenize("RUN 192.168.0.1").unwrap();
        let b = tokenize("RUN     192.168.0.1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_full_line_comment() {
        let out = tokenize("# server host address\nRUN     192.168.0.1").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].line, 2);
    }

    #[test]
    fn test_trailing_comment() {
        let out = tokenize("RUN 192.168.0.1 # set your server address").unwrap();
        assert_eq!(args(&out[0]), ["192.168.0.1"]);
    }

    #[test]
    fn test_comment_absorbs_invalid_content() {
        assert!(tokenize("# HOST 192.168.0.1").unwrap().is_empty());
        assert!(tokenize("# INVALID KEYWORD").unwrap().is_empty());
        assert!(tokenize("   # (abc)").unwrap().is_empty());
    }

    #[test]
    fn test_multiple_lines_and_blanks() {
        let out = tokenize("CONNECT axetroy@192.168.0.1:22\nRUN ls -lh\n\n").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].keyword, "CONNECT");
        assert_eq!(args(&out[0]), ["axetroy@192.168.0.1:22"]);
        assert_eq!(out[1].keyword, "RUN");
        assert_eq!(args(&out[1]), ["ls", "-lh"]);
    }

    #[test]
    fn test_multiple_values_keep_order() {
        let out = tokenize("UPLOAD ./README.md ./start.py ./dist").unwrap();
        assert_eq!(args(&out[0]), ["./README.md", "./start.py", "./dist"]);
    }

    #[test]
    fn test_invalid_keyword() {
        let err = tokenize("INVALID KEYWORD").unwrap_err();
        assert!(err.to_string().contains("invalid action `INVALID`"));
    }

    #[test]
    fn test_invalid_grammar() {
        assert!(tokenize("(abc)").is_err());
        assert!(tokenize("run ls").is_err());
    }

    #[test]
    fn test_keyword_without_arguments() {
        assert!(tokenize("CONNECT").is_err());
    }

    #[test]
    fn test_env_rules() {
        assert!(tokenize("ENV PRIVATE_KEY").is_err());
        assert!(tokenize("ENV PRIVATE_KEY = ").is_err());
        assert!(tokenize("ENV = xxx").is_err());

        let out = tokenize("ENV PRIVATE_KEY = xxx").unwrap();
        assert_eq!(out[0].keyword, "ENV");
        assert_eq!(args(&out[0]), ["PRIVATE_KEY", "xxx"]);
    }

    #[test]
    fn test_env_without_spaces() {
        let out = tokenize("ENV NODE_ENV=production").unwrap();
        assert_eq!(args(&out[0]), ["NODE_ENV", "production"]);
    }

    #[test]
    fn test_var_value_keeps_inner_words() {
        let out = tokenize("VAR REV = CMD(git rev-parse HEAD)").unwrap();
        assert_eq!(args(&out[0]), ["REV", "CMD(git rev-parse HEAD)"]);
    }

    #[test]
    fn test_escaped_hash_and_quotes() {
        let out = tokenize(r#"RUN echo \#1 "a # b"  # comment"#).unwrap();
        assert_eq!(args(&out[0]), ["echo", "#1", "\"a # b\""]);
    }

    #[test]
    fn test_hash_inside_token_is_literal() {
        let out = tokenize("RUN echo a#b").unwrap();
        assert_eq!(args(&out[0]), ["echo", "a#b"]);
    }

    #[test]
    fn test_unterminated_quote() {
        let err = tokenize("RUN echo 'oops").unwrap_err();
        assert!(matches!(err, SkiffError::Grammar { line: 1, .. }));
    }

    #[test]
    fn test_error_reports_failing_line() {
        let err = tokenize("RUN ls\nRUN pwd\nBOGUS x").unwrap_err();
        assert!(matches!(err, SkiffError::Grammar { line: 3, .. }));
    }
}
