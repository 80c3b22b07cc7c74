//! Turns line statements into typed [`Action`]s.
//!
//! [`parse`] tokenizes and parses a whole script up front, so a typo on the
//! last line stops the run before the first remote side effect.

use crate::action::*;
use crate::error::SkiffError;
use crate::tokenizer::{tokenize, LineStatement};

const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarFormKind {
    Env,
    Command,
}

/// One `VAR` wrapper, e.g. `REMOTE_CMD(...)`.
struct VarForm {
    prefix: &'static str,
    kind: VarFormKind,
    local: bool,
}

/// Wrapper forms recognized on the right-hand side of `VAR`. Anything that
/// matches none of them is a literal.
const VAR_FORMS: &[VarForm] = &[
    VarForm { prefix: "ENV(", kind: VarFormKind::Env, local: true },
    VarForm { prefix: "REMOTE_ENV(", kind: VarFormKind::Env, local: false },
    VarForm { prefix: "CMD(", kind: VarFormKind::Command, local: true },
    VarForm { prefix: "REMOTE_CMD(", kind: VarFormKind::Command, local: false },
];

/// Parses a complete script.
pub fn parse(source: &str) -> Result<Script, SkiffError> {
    let statements = tokenize(source)?;
    let steps = statements
        .iter()
        .map(|statement| {
            Ok(Step {
                action: parse_statement(statement)?,
                line: statement.line,
            })
        })
        .collect::<Result<Vec<_>, SkiffError>>()?;
    Ok(Script { steps })
}

/// Parses one line statement into an action.
pub fn parse_statement(statement: &LineStatement) -> Result<Action, SkiffError> {
    let line = statement.line;
    let args = statement.arguments.as_slice();
    let keyword: Keyword = statement.keyword.parse().map_err(|_| {
        SkiffError::grammar(line, format!("invalid action `{}`", statement.keyword))
    })?;

    match keyword {
        Keyword::Connect => {
            expect_exactly(keyword, args, 1, line)?;
            parse_connect(&args[0], line).map(Action::Connect)
        }
        Keyword::Var => {
            expect_exactly(keyword, args, 2, line)?;
            let source = parse_var_source(&args[1], line)?;
            Ok(Action::Var(VarAction {
                key: args[0].clone(),
                source,
            }))
        }
        Keyword::Env => {
            expect_exactly(keyword, args, 2, line)?;
            Ok(Action::Env(EnvAction {
                key: args[0].clone(),
                value: args[1].clone(),
            }))
        }
        Keyword::Cd => {
            expect_exactly(keyword, args, 1, line)?;
            Ok(Action::Cd(CdAction {
                target: args[0].clone(),
            }))
        }
        Keyword::Cmd => {
            expect_at_least(keyword, args, 1, line)?;
            let mut argv = args.iter().map(|a| strip_quotes(a));
            let command = argv.next().unwrap_or_default();
            Ok(Action::Cmd(CmdAction {
                command,
                args: argv.collect(),
            }))
        }
        Keyword::Run => {
            expect_at_least(keyword, args, 1, line)?;
            Ok(Action::Run(RunAction {
                command: args.join(" "),
            }))
        }
        Keyword::Move | Keyword::Copy => {
            expect_exactly(keyword, args, 2, line)?;
            let pair = PairAction {
                source: args[0].clone(),
                destination: args[1].clone(),
            };
            Ok(if keyword == Keyword::Move {
                Action::Move(pair)
            } else {
                Action::Copy(pair)
            })
        }
        Keyword::Delete => {
            expect_at_least(keyword, args, 1, line)?;
            Ok(Action::Delete(DeleteAction {
                targets: args.to_vec(),
            }))
        }
        Keyword::Upload | Keyword::Download => {
            let (destination, sources) = match args.split_last() {
                Some((destination, sources)) if !sources.is_empty() => (destination, sources),
                _ => return Err(too_few_arguments(keyword, args, 2, line)),
            };
            let transfer = TransferAction {
                sources: sources.to_vec(),
                destination_dir: destination.clone(),
            };
            Ok(if keyword == Keyword::Upload {
                Action::Upload(transfer)
            } else {
                Action::Download(transfer)
            })
        }
    }
}

fn expect_exactly(
    keyword: Keyword,
    args: &[String],
    count: usize,
    line: usize,
) -> Result<(), SkiffError> {
    if args.len() == count {
        return Ok(());
    }
    Err(SkiffError::grammar(
        line,
        format!(
            "`{}` takes exactly {} argument{}, got {}",
            keyword,
            count,
            if count == 1 { "" } else { "s" },
            args.len()
        ),
    ))
}

fn expect_at_least(
    keyword: Keyword,
    args: &[String],
    count: usize,
    line: usize,
) -> Result<(), SkiffError> {
    if args.len() >= count {
        return Ok(());
    }
    Err(too_few_arguments(keyword, args, count, line))
}

fn too_few_arguments(keyword: Keyword, args: &[String], count: usize, line: usize) -> SkiffError {
    SkiffError::grammar(
        line,
        format!(
            "`{}` takes at least {} argument{}, got {}",
            keyword,
            count,
            if count == 1 { "" } else { "s" },
            args.len()
        ),
    )
}

/// `user[:password]@host[:port]`
fn parse_connect(target: &str, line: usize) -> Result<ConnectAction, SkiffError> {
    let Some((credentials, address)) = target.rsplit_once('@') else {
        return Err(SkiffError::grammar(
            line,
            format!("`CONNECT {}` expects user[:password]@host[:port]", target),
        ));
    };

    let (username, password) = match credentials.split_once(':') {
        Some((user, password)) => (user, Some(password.to_string())),
        None => (credentials, None),
    };

    let (host, port) = match address.split_once(':') {
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| {
                SkiffError::grammar(line, format!("invalid port `{}`", port))
            })?;
            (host, port)
        }
        None => (address, DEFAULT_SSH_PORT),
    };

    if username.is_empty() {
        return Err(SkiffError::grammar(line, "`CONNECT` is missing a username"));
    }
    if host.is_empty() {
        return Err(SkiffError::grammar(line, "`CONNECT` is missing a host"));
    }

    Ok(ConnectAction {
        username: username.to_string(),
        host: host.to_string(),
        port,
        password,
    })
}

fn parse_var_source(expr: &str, line: usize) -> Result<VarSource, SkiffError> {
    let Some(form) = VAR_FORMS.iter().find(|form| expr.starts_with(form.prefix)) else {
        return Ok(VarSource::Literal {
            value: expr.to_string(),
        });
    };
    if !expr.ends_with(')') {
        return Err(SkiffError::grammar(
            line,
            format!("`{}` is missing its closing `)`", form.prefix),
        ));
    }

    let body = expr[form.prefix.len()..expr.len() - 1].trim();
    if body.is_empty() {
        return Err(SkiffError::grammar(
            line,
            format!("`{})` needs a value inside the parentheses", form.prefix),
        ));
    }

    match form.kind {
        VarFormKind::Env => {
            if body.contains(char::is_whitespace) {
                return Err(SkiffError::grammar(
                    line,
                    format!("invalid environment variable name `{}`", body),
                ));
            }
            Ok(VarSource::Env {
                key: body.to_string(),
                local: form.local,
            })
        }
        VarFormKind::Command => {
            // Local commands are spawned directly, so quotes are removed here.
            // Remote commands go through the remote shell and keep them.
            let argv = if form.local {
                split_words(body)
            } else {
                body.split_whitespace().map(String::from).collect()
            };
            Ok(VarSource::Command {
                argv,
                local: form.local,
            })
        }
    }
}

/// Removes quote characters from one token, keeping the quoted text.
fn strip_quotes(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut quote: Option<char> = None;
    for ch in token.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => out.push(ch),
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None => out.push(ch),
        }
    }
    out
}

/// Splits on whitespace outside quotes and removes the quotes.
fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for ch in text.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
