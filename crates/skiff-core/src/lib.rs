//! # skiff-core
//!
//! Core library for a small line-oriented scripting language that provisions
//! servers and deploys files over SSH.
//!
//! A script is tokenized and fully validated before anything runs, then
//! executed step by step against one remote session at a time.
//!
//! ## Modules
//!
//! - [`tokenizer`] - Splits source text into keyword/argument statements
//! - [`parser`] - Turns statements into typed [`action::Action`]s
//! - [`action`] - The action model and the parsed [`action::Script`]
//! - [`variable`] - `VAR` table and `{{NAME}}` substitution
//! - [`runner`] - Executes a script and owns the run state
//! - [`session`] - Backend-agnostic remote session trait
//! - [`ssh`] - `ssh2`-based session and connector
//! - [`local`] - Local process execution for `CMD`
//! - [`transfer`] - Recursive `UPLOAD` and `DOWNLOAD`
//! - [`guard`] - Paths `DELETE` refuses to touch
//! - [`report`] - Progress reporting hooks
//! - [`config`] - Persistent settings in `~/.skiff/config.json`
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use skiff_core::parser::parse;
//! use skiff_core::runner::Runner;
//! use skiff_core::ssh::SshConnector;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), skiff_core::error::SkiffError> {
//! let script = parse(
//!     "CONNECT deploy:secret@10.0.0.5\n\
//!      ENV RELEASE=42\n\
//!      UPLOAD ./dist /srv/app\n\
//!      RUN systemctl restart app\n",
//! )?;
//!
//! let mut runner = Runner::new(Arc::new(SshConnector::default()));
//! runner.run(&script).await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod config;
pub mod error;
pub mod guard;
pub mod local;
pub mod parser;
pub mod paths;
pub mod report;
pub mod runner;
pub mod session;
pub mod ssh;
pub mod tokenizer;
pub mod transfer;
pub mod variable;
