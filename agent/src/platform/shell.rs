//! Command templates for shell based platform hooks

use std::process::Output;

use tokio::process::Command;
use tracing::debug;

use crate::errors::AgentError;

/// A whitespace separated command line with `{name}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn parse(template: &str) -> Result<Self, AgentError> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| AgentError::ConfigError("empty command template".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Parse an optional template from settings
    pub fn parse_opt(template: Option<&String>) -> Result<Option<Self>, AgentError> {
        template.map(|t| Self::parse(t)).transpose()
    }

    /// A copy with extra trailing arguments
    pub fn with_args(&self, extra: &[&str]) -> Self {
        let mut next = self.clone();
        next.args.extend(extra.iter().map(|arg| arg.to_string()));
        next
    }

    /// Substitute placeholders; each argument stays a single argv entry
    pub fn render(&self, vars: &[(&str, &str)]) -> (String, Vec<String>) {
        let args = self
            .args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{}}}", name), value)
                })
            })
            .collect();
        (self.program.clone(), args)
    }

    /// Run the command and capture its output
    pub async fn output(&self, vars: &[(&str, &str)]) -> Result<Output, AgentError> {
        let (program, args) = self.render(vars);
        debug!("Running hook: {} {:?}", program, args);
        let output = Command::new(&program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(output)
    }

    /// Run the command, failing on a non-zero exit status
    pub async fn run(&self, vars: &[(&str, &str)]) -> Result<String, AgentError> {
        let output = self.output(vars).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Internal(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
