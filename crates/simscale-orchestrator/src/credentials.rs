//! Simulator credential resolution.
//!
//! Every replica receives a workspace id and access key through its
//! environment. They come from one of three providers, selected by
//! configuration:
//!
//! - [`StaticCredentials`]: values given explicitly (flags or config file).
//! - [`EnvFileStore`]: load `SIM_WORKSPACE` / `SIM_ACCESS_KEY` from a
//!   dotenv-style secret store.
//! - [`PromptingStore`]: like `EnvFileStore`, but asks for missing values
//!   interactively and persists the answers.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info};

use simscale_core::{Credentials, Secret};

use crate::config::CredentialsSection;

/// Errors resolving credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential '{key}' not found in {}", path.display())]
    Missing { key: &'static str, path: PathBuf },

    #[error("credential store {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("empty value entered for {0}")]
    EmptyInput(&'static str),

    #[error("credential prompt unavailable")]
    PromptUnavailable,
}

/// Source of simulator credentials.
pub trait CredentialProvider: Send + Sync {
    fn resolve(&self) -> Result<Credentials, CredentialError>;
}

/// Credentials supplied up front.
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

impl CredentialProvider for StaticCredentials {
    fn resolve(&self) -> Result<Credentials, CredentialError> {
        Ok(self.0.clone())
    }
}

/// Parse a dotenv-style line into `(key, value)`.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let value = value.trim();
    let value = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .unwrap_or(value);
    Some((key.trim(), value))
}

/// Dotenv-style secret store on disk.
#[derive(Debug, Clone)]
pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<String>, CredentialError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CredentialError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Value of `key`, if the store exists and holds a non-empty value.
    pub fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        let Some(content) = self.read()? else {
            return Ok(None);
        };
        Ok(content
            .lines()
            .filter_map(parse_line)
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
            .last()
            .filter(|v| !v.is_empty()))
    }

    /// Set `key`, replacing an existing entry or appending a new one.
    pub fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        let content = self.read()?.unwrap_or_default();
        let entry = format!("{key}='{value}'");

        let mut replaced = false;
        let mut lines: Vec<String> = content
            .lines()
            .map(|line| match parse_line(line) {
                Some((k, _)) if k == key && !replaced => {
                    replaced = true;
                    entry.clone()
                }
                _ => line.to_string(),
            })
            .collect();
        if !replaced {
            lines.push(entry);
        }

        let mut out = lines.join("\n");
        out.push('\n');
        fs::write(&self.path, out).map_err(|source| CredentialError::Io {
            path: self.path.clone(),
            source,
        })
    }

}

impl CredentialProvider for EnvFileStore {
    fn resolve(&self) -> Result<Credentials, CredentialError> {
        let workspace = self
            .get(Credentials::WORKSPACE_VAR)?
            .ok_or_else(|| CredentialError::Missing {
                key: Credentials::WORKSPACE_VAR,
                path: self.path.clone(),
            })?;
        let access_key = self
            .get(Credentials::ACCESS_KEY_VAR)?
            .ok_or_else(|| CredentialError::Missing {
                key: Credentials::ACCESS_KEY_VAR,
                path: self.path.clone(),
            })?;
        debug!(path = %self.path.display(), workspace = %workspace, "Loaded credentials from store");
        Ok(Credentials::new(workspace, access_key))
    }
}

/// Secret store that prompts for missing credentials and persists them.
pub struct PromptingStore<R, W> {
    store: EnvFileStore,
    io: Mutex<(R, W)>,
}

impl<R: BufRead, W: Write> PromptingStore<R, W> {
    pub fn new(store: EnvFileStore, input: R, output: W) -> Self {
        Self {
            store,
            io: Mutex::new((input, output)),
        }
    }

    fn ask(
        input: &mut R,
        output: &mut W,
        prompt: &str,
        key: &'static str,
    ) -> Result<String, CredentialError> {
        let io_err = |source| CredentialError::Io {
            path: PathBuf::from("<terminal>"),
            source,
        };
        write!(output, "{prompt}").map_err(io_err)?;
        output.flush().map_err(io_err)?;

        let mut line = String::new();
        input.read_line(&mut line).map_err(io_err)?;
        let value = line.trim().to_string();
        if value.is_empty() {
            return Err(CredentialError::EmptyInput(key));
        }
        Ok(value)
    }
}

impl PromptingStore<io::BufReader<io::Stdin>, io::Stdout> {
    /// Prompt on the process terminal.
    pub fn stdio(store: EnvFileStore) -> Self {
        Self::new(store, io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R, W> CredentialProvider for PromptingStore<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn resolve(&self) -> Result<Credentials, CredentialError> {
        let stored_workspace = self.store.get(Credentials::WORKSPACE_VAR)?;
        let stored_key = self.store.get(Credentials::ACCESS_KEY_VAR)?;
        if let (Some(workspace), Some(access_key)) = (&stored_workspace, &stored_key) {
            return Ok(Credentials::new(workspace.clone(), access_key.clone()));
        }

        let mut guard = self
            .io
            .lock()
            .map_err(|_| CredentialError::PromptUnavailable)?;
        let (input, output) = &mut *guard;

        // Only the values the store lacks are asked for and written back.
        let workspace = match stored_workspace {
            Some(workspace) => workspace,
            None => {
                let workspace = Self::ask(
                    input,
                    output,
                    "Please enter your workspace id: ",
                    Credentials::WORKSPACE_VAR,
                )?;
                self.store.set(Credentials::WORKSPACE_VAR, &workspace)?;
                workspace
            }
        };
        let access_key = match stored_key {
            Some(access_key) => access_key,
            None => {
                let access_key = Self::ask(
                    input,
                    output,
                    "Please enter your access key: ",
                    Credentials::ACCESS_KEY_VAR,
                )?;
                self.store.set(Credentials::ACCESS_KEY_VAR, &access_key)?;
                access_key
            }
        };

        let access_key = Secret::new(access_key);
        info!(
            path = %self.store.path().display(),
            workspace = %workspace,
            access_key = %access_key.fingerprint(),
            "Saved credentials to store"
        );
        Ok(Credentials::new(workspace, access_key))
    }
}

/// Pick the provider the configuration asks for.
pub fn provider_from_config(section: &CredentialsSection) -> Box<dyn CredentialProvider> {
    match (&section.workspace, &section.access_key) {
        (Some(workspace), Some(access_key)) => Box::new(StaticCredentials::new(Credentials::new(
            workspace.clone(),
            access_key.clone(),
        ))),
        _ if section.prompt() => Box::new(PromptingStore::stdio(EnvFileStore::new(
            section.env_file(),
        ))),
        _ => Box::new(EnvFileStore::new(section.env_file())),
    }
}
