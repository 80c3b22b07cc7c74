//! Typed actions produced by the parser.
//!
//! A skiff script is a flat list of [`Step`]s, each wrapping one
//! [`Action`]. Actions are validated when they are built, so the runner only
//! ever resolves values; it never re-checks shape.
//!
//! # Action Types
//!
//! - **Connection**: [`Action::Connect`]
//! - **State**: [`Action::Var`], [`Action::Env`], [`Action::Cd`]
//! - **Commands**: [`Action::Cmd`] (local), [`Action::Run`] (remote)
//! - **Remote files**: [`Action::Move`], [`Action::Copy`], [`Action::Delete`]
//! - **Transfers**: [`Action::Upload`], [`Action::Download`]
//!
//! # Example
//!
//! ```
//! use skiff_core::action::{Action, CdAction};
//! use skiff_core::variable::VariableTable;
//!
//! let mut vars = VariableTable::new();
//! vars.set("APP", "web");
//!
//! let action = Action::Cd(CdAction { target: "/srv/{{APP}}".to_string() });
//! assert_eq!(action.substitute(&vars).to_string(), "CD /srv/web");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::variable::{substitute, substitute_all, VariableTable};

/// The eleven statement keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Keyword {
    Connect,
    Var,
    Env,
    Cd,
    Cmd,
    Run,
    Move,
    Copy,
    Delete,
    Upload,
    Download,
}

impl Keyword {
    pub const ALL: [Keyword; 11] = [
        Keyword::Connect,
        Keyword::Var,
        Keyword::Env,
        Keyword::Cd,
        Keyword::Cmd,
        Keyword::Run,
        Keyword::Move,
        Keyword::Copy,
        Keyword::Delete,
        Keyword::Upload,
        Keyword::Download,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Connect => "CONNECT",
            Keyword::Var => "VAR",
            Keyword::Env => "ENV",
            Keyword::Cd => "CD",
            Keyword::Cmd => "CMD",
            Keyword::Run => "RUN",
            Keyword::Move => "MOVE",
            Keyword::Copy => "COPY",
            Keyword::Delete => "DELETE",
            Keyword::Upload => "UPLOAD",
            Keyword::Download => "DOWNLOAD",
        }
    }

    /// `ENV` and `VAR` take a `KEY = VALUE` argument.
    pub fn is_assignment(self) -> bool {
        matches!(self, Keyword::Env | Keyword::Var)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a word is not one of the eleven keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKeyword(pub String);

impl FromStr for Keyword {
    type Err = UnknownKeyword;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Keyword::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKeyword(s.to_string()))
    }
}

/// `CONNECT user[:password]@host[:port]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectAction {
    pub username: String,
    pub host: String,
    pub port: u16,
    /// `None` means the password is prompted for at run time.
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

/// Where a `VAR` gets its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VarSource {
    /// Stored verbatim.
    Literal { value: String },
    /// An environment variable, read locally or on the remote host.
    Env { key: String, local: bool },
    /// Trimmed output of a command, run locally or on the remote host.
    Command { argv: Vec<String>, local: bool },
}

impl VarSource {
    /// Whether resolving this source needs a live connection.
    pub fn is_remote(&self) -> bool {
        match self {
            VarSource::Literal { .. } => false,
            VarSource::Env { local, .. } | VarSource::Command { local, .. } => !local,
        }
    }
}

/// `VAR NAME = <expr>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarAction {
    pub key: String,
    pub source: VarSource,
}

/// `ENV KEY = VALUE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvAction {
    pub key: String,
    pub value: String,
}

/// `CD path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CdAction {
    pub target: String,
}

/// `CMD executable [args...]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CmdAction {
    pub command: String,
    pub args: Vec<String>,
}

impl CmdAction {
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.command.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// `RUN command text...`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunAction {
    pub command: String,
}

/// `MOVE src dst` and `COPY src dst`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairAction {
    pub source: String,
    pub destination: String,
}

/// `DELETE path [path...]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteAction {
    pub targets: Vec<String>,
}

/// `UPLOAD src... dir` and `DOWNLOAD src... dir`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferAction {
    pub sources: Vec<String>,
    pub destination_dir: String,
}

/// One validated script action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "params")]
pub enum Action {
    Connect(ConnectAction),
    Var(VarAction),
    Env(EnvAction),
    Cd(CdAction),
    Cmd(CmdAction),
    Run(RunAction),
    Move(PairAction),
    Copy(PairAction),
    Delete(DeleteAction),
    Upload(TransferAction),
    Download(TransferAction),
}

impl Action {
    pub fn keyword(&self) -> Keyword {
        match self {
            Action::Connect(_) => Keyword::Connect,
            Action::Var(_) => Keyword::Var,
            Action::Env(_) => Keyword::Env,
            Action::Cd(_) => Keyword::Cd,
            Action::Cmd(_) => Keyword::Cmd,
            Action::Run(_) => Keyword::Run,
            Action::Move(_) => Keyword::Move,
            Action::Copy(_) => Keyword::Copy,
            Action::Delete(_) => Keyword::Delete,
            Action::Upload(_) => Keyword::Upload,
            Action::Download(_) => Keyword::Download,
        }
    }

    /// Whether this action can only run after a successful CONNECT.
    pub fn requires_connection(&self) -> bool {
        match self {
            Action::Connect(_) | Action::Env(_) | Action::Cmd(_) => false,
            Action::Var(var) => var.source.is_remote(),
            Action::Cd(_)
            | Action::Run(_)
            | Action::Move(_)
            | Action::Copy(_)
            | Action::Delete(_)
            | Action::Upload(_)
            | Action::Download(_) => true,
        }
    }

    /// Returns a copy with every `{{NAME}}` placeholder resolved.
    ///
    /// Literal `VAR` values are stored verbatim and left untouched.
    pub fn substitute(&self, vars: &VariableTable) -> Action {
        match self {
            Action::Connect(c) => Action::Connect(ConnectAction {
                username: substitute(&c.username, vars),
                host: substitute(&c.host, vars),
                port: c.port,
                password: c.password.as_deref().map(|p| substitute(p, vars)),
            }),
            Action::Var(v) => {
                let source = match &v.source {
                    VarSource::Literal { value } => VarSource::Literal {
                        value: value.clone(),
                    },
                    VarSource::Env { key, local } => VarSource::Env {
                        key: substitute(key, vars),
                        local: *local,
                    },
                    VarSource::Command { argv, local } => VarSource::Command {
                        argv: substitute_all(argv, vars),
                        local: *local,
                    },
                };
                Action::Var(VarAction {
                    key: v.key.clone(),
                    source,
                })
            }
            Action::Env(e) => Action::Env(EnvAction {
                key: e.key.clone(),
                value: substitute(&e.value, vars),
            }),
            Action::Cd(c) => Action::Cd(CdAction {
                target: substitute(&c.target, vars),
            }),
            Action::Cmd(c) => Action::Cmd(CmdAction {
                command: substitute(&c.command, vars),
                args: substitute_all(&c.args, vars),
            }),
            Action::Run(r) => Action::Run(RunAction {
                command: substitute(&r.command, vars),
            }),
            Action::Move(p) => Action::Move(substitute_pair(p, vars)),
            Action::Copy(p) => Action::Copy(substitute_pair(p, vars)),
            Action::Delete(d) => Action::Delete(DeleteAction {
                targets: substitute_all(&d.targets, vars),
            }),
            Action::Upload(t) => Action::Upload(substitute_transfer(t, vars)),
            Action::Download(t) => Action::Download(substitute_transfer(t, vars)),
        }
    }
}

fn substitute_pair(pair: &PairAction, vars: &VariableTable) -> PairAction {
    PairAction {
        source: substitute(&pair.source, vars),
        destination: substitute(&pair.destination, vars),
    }
}

fn substitute_transfer(transfer: &TransferAction, vars: &VariableTable) -> TransferAction {
    TransferAction {
        sources: substitute_all(&transfer.sources, vars),
        destination_dir: substitute(&transfer.destination_dir, vars),
    }
}

/// Short human-readable description, used for progress lines and errors.
/// Never includes a password.
impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = self.keyword();
        match self {
            Action::Connect(c) => write!(f, "{} {}@{}:{}", keyword, c.username, c.host, c.port),
            Action::Var(v) => match &v.source {
                VarSource::Literal { value } => write!(f, "{} {} = {}", keyword, v.key, value),
                VarSource::Env { key, local } => {
                    let side = if *local { "local" } else { "remote" };
                    write!(f, "{} {} = {} env {}", keyword, v.key, side, key)
                }
                VarSource::Command { argv, local } => {
                    let side = if *local { "local" } else { "remote" };
                    write!(f, "{} {} = {} command `{}`", keyword, v.key, side, argv.join(" "))
                }
            },
            Action::Env(e) => write!(f, "{} {}={}", keyword, e.key, e.value),
            Action::Cd(c) => write!(f, "{} {}", keyword, c.target),
            Action::Cmd(c) => write!(f, "{} {}", keyword, c.argv().join(" ")),
            Action::Run(r) => write!(f, "{} {}", keyword, r.command),
            Action::Move(p) | Action::Copy(p) => {
                write!(f, "{} {} to {}", keyword, p.source, p.destination)
            }
            Action::Delete(d) => write!(f, "{} {}", keyword, d.targets.join(", ")),
            Action::Upload(t) | Action::Download(t) => write!(
                f,
                "{} {} to {}",
                keyword,
                t.sources.join(", "),
                t.destination_dir
            ),
        }
    }
}

/// An action together with the line it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub action: Action,
    pub line: usize,
}

/// A parsed script. Order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.steps.iter().map(|s| &s.action)
    }
}
