//! Script runner: walks a parsed [`Script`] and drives a remote session.
//!
//! The runner keeps all mutable run state in an [`ExecutionContext`]: the
//! active connection, the local and remote working directories, the `ENV`
//! map and the `VAR` table. Steps run strictly in order and the first
//! failure aborts the run. Whatever happens, the connection is closed
//! before [`Runner::run`] returns.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use skiff_core::parser::parse;
//! use skiff_core::runner::Runner;
//! use skiff_core::ssh::SshConnector;
//!
//! # async fn example() -> Result<(), skiff_core::error::SkiffError> {
//! let script = parse("CONNECT deploy:secret@10.0.0.5\nRUN uptime\n")?;
//! let mut runner = Runner::new(Arc::new(SshConnector::default()));
//! runner.run(&script).await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::action::{
    Action, CmdAction, ConnectAction, DeleteAction, PairAction, Script, TransferAction, VarAction,
    VarSource,
};
use crate::error::{ActionError, SkiffError};
use crate::guard::ProtectedPaths;
use crate::local::LocalShell;
use crate::paths::{resolve_local, resolve_remote};
use crate::report::{Reporter, SilentReporter, SkipReason};
use crate::session::{
    CommandOptions, ConnectTarget, Connector, Environment, NoPrompt, PasswordPrompt,
    RemoteSession, SessionError,
};
use crate::transfer;
use crate::variable::VariableTable;

/// Shown when `CONNECT` carries no password.
pub const PASSWORD_PROMPT: &str = "Please type remote server's password";

/// Mutable state of one run.
#[derive(Default)]
pub struct ExecutionContext {
    pub connection: Option<Box<dyn RemoteSession>>,
    pub local_working_dir: PathBuf,
    pub remote_working_dir: String,
    /// `ENV` entries, exported into every remote command.
    pub environment: Environment,
    /// `VAR` entries, substituted into later steps.
    pub variables: VariableTable,
    /// Number of the step currently running (1-based).
    pub step: usize,
}

impl ExecutionContext {
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

/// Executes scripts against sessions obtained from a [`Connector`].
pub struct Runner {
    connector: Arc<dyn Connector>,
    prompt: Arc<dyn PasswordPrompt>,
    reporter: Arc<dyn Reporter>,
    protected: ProtectedPaths,
    local_dir: Option<PathBuf>,
    context: ExecutionContext,
}

impl Runner {
    /// A runner with no password prompt, no output and the default
    /// protected paths.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            prompt: Arc::new(NoPrompt),
            reporter: Arc::new(SilentReporter),
            protected: ProtectedPaths::default(),
            local_dir: None,
            context: ExecutionContext::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn PasswordPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_protected_paths(mut self, protected: ProtectedPaths) -> Self {
        self.protected = protected;
        self
    }

    /// Resolve local paths and run `CMD` from `dir` instead of the process
    /// working directory.
    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = Some(dir.into());
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Run every step of `script` in order, starting from a fresh context.
    pub async fn run(&mut self, script: &Script) -> Result<(), SkiffError> {
        self.context = ExecutionContext::default();
        let result = self.run_steps(script).await;
        self.disconnect().await;
        result
    }

    async fn run_steps(&mut self, script: &Script) -> Result<(), SkiffError> {
        for step in &script.steps {
            self.context.step += 1;
            let number = self.context.step;
            // Reports and errors show the script text; values pulled in
            // through VAR may be secrets.
            info!(step = number, line = step.line, action = %step.action, "executing step");
            let action = step.action.substitute(&self.context.variables);

            if let Err(source) = self.execute(&action).await {
                debug!(step = number, error = %source, "step failed");
                return Err(SkiffError::Step {
                    step: number,
                    action: step.action.to_string(),
                    source,
                });
            }
            self.reporter.step_completed(number, &step.action);
        }

        self.reporter.run_finished(self.context.step + 1);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut session) = self.context.connection.take() {
            debug!("closing session");
            if let Err(e) = session.close().await {
                warn!(error = %e, "failed to close session cleanly");
            }
        }
    }

    async fn execute(&mut self, action: &Action) -> Result<(), ActionError> {
        if action.requires_connection() && !self.context.is_connected() {
            return Err(ActionError::NotConnected);
        }

        match action {
            Action::Connect(connect) => self.connect(connect).await,
            Action::Var(var) => self.assign(var).await,
            Action::Env(env) => {
                self.context
                    .environment
                    .insert(env.key.clone(), env.value.clone());
                Ok(())
            }
            Action::Cd(cd) => {
                self.context.remote_working_dir = self.remote_path(&cd.target);
                debug!(cwd = %self.context.remote_working_dir, "remote working directory changed");
                Ok(())
            }
            Action::Cmd(cmd) => self.run_local(cmd).await,
            Action::Run(run) => {
                self.session()?
                    .run_command(&run.command, &self.command_options())
                    .await?;
                Ok(())
            }
            Action::Move(pair) => self.rename(pair).await,
            Action::Copy(pair) => self.copy(pair).await,
            Action::Delete(delete) => self.delete(delete).await,
            Action::Upload(upload) => self.upload(upload).await,
            Action::Download(download) => self.download(download).await,
        }
    }

    fn session(&self) -> Result<&dyn RemoteSession, ActionError> {
        self.context
            .connection
            .as_deref()
            .ok_or(ActionError::NotConnected)
    }

    fn local_shell(&self) -> LocalShell {
        match &self.local_dir {
            Some(dir) => LocalShell::with_cwd(dir),
            None => LocalShell::new(),
        }
    }

    fn remote_path(&self, path: &str) -> String {
        resolve_remote(&self.context.remote_working_dir, path)
    }

    fn command_options(&self) -> CommandOptions {
        CommandOptions {
            cwd: Some(self.context.remote_working_dir.clone()),
            env: self.context.environment.clone(),
        }
    }

    async fn connect(&mut self, connect: &ConnectAction) -> Result<(), ActionError> {
        self.disconnect().await;

        let password = match &connect.password {
            Some(password) => password.clone(),
            None => self.ask_password().await?,
        };
        let target = ConnectTarget {
            host: connect.host.clone(),
            port: connect.port,
            username: connect.username.clone(),
            password,
        };

        info!(target = %target, "connecting");
        let session = self
            .connector
            .dial(&target)
            .await
            .map_err(ActionError::Connection)?;
        self.context.connection = Some(session);

        let remote_dir = self
            .session()?
            .initial_working_dir()
            .await
            .map_err(ActionError::Connection)?;
        let local_dir = match &self.local_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| ActionError::Connection(SessionError::Io(e)))?,
        };

        debug!(remote = %remote_dir, local = %local_dir.display(), "working directories");
        self.context.remote_working_dir = remote_dir;
        self.context.local_working_dir = local_dir;
        Ok(())
    }

    async fn ask_password(&self) -> Result<String, ActionError> {
        let prompt = Arc::clone(&self.prompt);
        tokio::task::spawn_blocking(move || prompt.prompt(PASSWORD_PROMPT))
            .await
            .map_err(|e| ActionError::Prompt(std::io::Error::other(e.to_string())))?
            .map_err(ActionError::Prompt)
    }

    async fn assign(&mut self, var: &VarAction) -> Result<(), ActionError> {
        let value = match &var.source {
            VarSource::Literal { value } => value.clone(),
            VarSource::Env { key, local: true } => std::env::var(key).unwrap_or_default(),
            VarSource::Env { key, local: false } => {
                self.session()?
                    .read_env(key, &self.context.environment)
                    .await?
            }
            VarSource::Command { argv, local: true } => {
                self.local_shell().run_captured(argv).await?.trim().to_string()
            }
            VarSource::Command { argv, local: false } => self
                .session()?
                .run_command_captured(&argv.join(" "), &self.command_options())
                .await?
                .trim()
                .to_string(),
        };

        debug!(name = %var.key, "variable set");
        self.context.variables.set(var.key.clone(), value);
        Ok(())
    }

    async fn run_local(&self, cmd: &CmdAction) -> Result<(), ActionError> {
        self.local_shell().run_streaming(&cmd.argv()).await?;
        Ok(())
    }

    async fn rename(&self, pair: &PairAction) -> Result<(), ActionError> {
        let source = self.remote_path(&pair.source);
        let destination = self.remote_path(&pair.destination);
        self.session()?.rename(&source, &destination).await?;
        Ok(())
    }

    async fn copy(&self, pair: &PairAction) -> Result<(), ActionError> {
        let session = self.session()?;
        let source = self.remote_path(&pair.source);
        let destination = self.remote_path(&pair.destination);

        let metadata = session.stat(&source).await?;
        session.copy_file(&source, &destination).await?;
        session.chmod(&destination, metadata.mode).await?;
        Ok(())
    }

    async fn delete(&self, delete: &DeleteAction) -> Result<(), ActionError> {
        let session = self.session()?;
        for target in &delete.targets {
            let path = self.remote_path(target);

            if self.protected.contains(&path) {
                warn!(path = %path, "refusing to delete protected path");
                self.reporter.delete_skipped(&path, SkipReason::Protected);
                continue;
            }

            match session.stat(&path).await {
                Ok(_) => {}
                Err(SessionError::NotFound(_)) => {
                    debug!(path = %path, "nothing to delete");
                    self.reporter.delete_skipped(&path, SkipReason::Missing);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            session.remove(&path).await?;
        }
        Ok(())
    }

    async fn upload(&self, upload: &TransferAction) -> Result<(), ActionError> {
        let session = self.session()?;
        let destination = self.remote_path(&upload.destination_dir);
        for source in &upload.sources {
            let local = resolve_local(&self.context.local_working_dir, source);
            let sent =
                transfer::upload(session, &local, &destination, self.reporter.as_ref()).await?;
            debug!(source = %local.display(), destination = %destination, bytes = sent, "uploaded");
        }
        Ok(())
    }

    async fn download(&self, download: &TransferAction) -> Result<(), ActionError> {
        let session = self.session()?;
        let destination = resolve_local(&self.context.local_working_dir, &download.destination_dir);
        for source in &download.sources {
            let remote = self.remote_path(source);
            let received =
                transfer::download(session, &remote, &destination, self.reporter.as_ref()).await?;
            debug!(source = %remote, destination = %destination.display(), bytes = received, "downloaded");
        }
        Ok(())
    }
}
