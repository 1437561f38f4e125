//! Command templates and the values substituted into them.

use std::env;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use svcwrap_params::shell_quote;

use crate::error::{RunnerError, RunnerResult};

/// Username substituted when no user is known.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Tokens recognised in a command template.
pub const TOKENS: &[&str] = &[
    "INPUTDIRECTORY",
    "OUTPUTDIRECTORY",
    "TMPDIRECTORY",
    "STATUSFILE",
    "DATAFILE",
    "PARAMETERS",
    "USERNAME",
];

/// Values for one invocation of the wrapped program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub status_file: PathBuf,
    pub data_file: PathBuf,
    /// Compiled parameter arguments, already quoted
    pub parameters: Vec<String>,
    pub user: Option<String>,
}

impl CommandContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_dir = path.into();
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    pub fn tmp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.tmp_dir = path.into();
        self
    }

    pub fn status_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_file = path.into();
        self
    }

    pub fn data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = path.into();
        self
    }

    pub fn parameters(mut self, args: Vec<String>) -> Self {
        self.parameters = args;
        self
    }

    pub fn user(mut self, user: Option<impl Into<String>>) -> Self {
        self.user = user.map(Into::into);
        self
    }

    fn value(&self, token: &str) -> Option<String> {
        let path = |p: &Path| shell_quote(&p.to_string_lossy());
        match token {
            "INPUTDIRECTORY" => Some(path(&self.input_dir)),
            "OUTPUTDIRECTORY" => Some(path(&self.output_dir)),
            "TMPDIRECTORY" => Some(path(&self.tmp_dir)),
            "STATUSFILE" => Some(path(&self.status_file)),
            "DATAFILE" => Some(path(&self.data_file)),
            "PARAMETERS" => Some(self.parameters.join(" ")),
            "USERNAME" => Some(shell_quote(self.user.as_deref().unwrap_or(ANONYMOUS_USER))),
            _ => None,
        }
    }
}

/// A shell command line with `$TOKEN` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandTemplate {
    template: String,
    token_pattern: Regex,
}

impl CommandTemplate {
    pub fn new(template: impl Into<String>) -> RunnerResult<Self> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(RunnerError::InvalidCommand("empty command".to_string()));
        }
        let token_pattern = Regex::new(&format!(r"\$({})\b", TOKENS.join("|")))
            .expect("valid token regex");
        Ok(Self {
            template,
            token_pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// The program the template invokes, if it is not itself a token.
    pub fn program(&self) -> Option<&str> {
        self.template
            .split_whitespace()
            .next()
            .filter(|word| !word.starts_with('$'))
    }

    /// Verify the program exists, either as a path or on `PATH`.
    pub fn check_resolvable(&self) -> RunnerResult<()> {
        let Some(program) = self.program() else {
            return Ok(());
        };
        if resolve_program(program).is_some() {
            Ok(())
        } else {
            Err(RunnerError::CommandNotFound(program.to_string()))
        }
    }

    /// Substitute every known token. Unknown `$WORDS` are left for the shell.
    pub fn compile(&self, context: &CommandContext) -> String {
        let compiled = self
            .token_pattern
            .replace_all(&self.template, |caps: &regex::Captures| {
                context
                    .value(&caps[1])
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .to_string();
        debug!("Compiled command: {}", compiled);
        compiled
    }
}

impl PartialEq for CommandTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

impl Eq for CommandTemplate {}

impl TryFrom<String> for CommandTemplate {
    type Error = RunnerError;

    fn try_from(template: String) -> RunnerResult<Self> {
        Self::new(template)
    }
}

impl From<CommandTemplate> for String {
    fn from(template: CommandTemplate) -> Self {
        template.template
    }
}

/// Locate `program` as an explicit path or in one of the `PATH` entries.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
