//! Package manager driven by command templates

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::errors::AgentError;
use crate::platform::shell::CommandTemplate;
use crate::platform::PackageManager;
use crate::storage::settings::PackageCommands;

/// Package manager backed by the `platform.packages` command templates
pub struct CommandPackageManager {
    list: Option<CommandTemplate>,
    install: Option<CommandTemplate>,
    install_interactive: Option<CommandTemplate>,
    uninstall: Option<CommandTemplate>,
    uninstall_interactive: Option<CommandTemplate>,
    marketplace: Option<CommandTemplate>,
    launch: Option<CommandTemplate>,
}

impl CommandPackageManager {
    pub fn from_settings(commands: &PackageCommands) -> Result<Self, AgentError> {
        Ok(Self {
            list: CommandTemplate::parse_opt(commands.list.as_ref())?,
            install: CommandTemplate::parse_opt(commands.install.as_ref())?,
            install_interactive: CommandTemplate::parse_opt(commands.install_interactive.as_ref())?,
            uninstall: CommandTemplate::parse_opt(commands.uninstall.as_ref())?,
            uninstall_interactive: CommandTemplate::parse_opt(commands.uninstall_interactive.as_ref())?,
            marketplace: CommandTemplate::parse_opt(commands.marketplace.as_ref())?,
            launch: CommandTemplate::parse_opt(commands.launch.as_ref())?,
        })
    }

    async fn listing(&self) -> Result<BTreeMap<String, Option<String>>, AgentError> {
        let list = self
            .list
            .as_ref()
            .ok_or_else(|| AgentError::ConfigError("no package list command configured".to_string()))?;
        Ok(parse_listing(&list.run(&[]).await?))
    }

    /// Run a package command, mapping every failure to a platform install error
    async fn run_for(
        &self,
        template: Option<&CommandTemplate>,
        action: &str,
        package: &str,
        vars: &[(&str, &str)],
    ) -> Result<(), AgentError> {
        let template = template.ok_or_else(|| {
            AgentError::install_failed(package, format!("no {} command configured", action))
        })?;
        template
            .run(vars)
            .await
            .map_err(|e| AgentError::install_failed(package, e))?;
        info!("{} {} done", action, package);
        Ok(())
    }
}

/// Parse `<package> [version]` lines
fn parse_listing(output: &str) -> BTreeMap<String, Option<String>> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let package = parts.next()?;
            Some((package.to_string(), parts.next().map(str::to_string)))
        })
        .collect()
}

#[async_trait]
impl PackageManager for CommandPackageManager {
    async fn installed_packages(&self) -> Result<BTreeSet<String>, AgentError> {
        Ok(self.listing().await?.into_keys().collect())
    }

    async fn package_version(&self, package: &str) -> Result<Option<String>, AgentError> {
        Ok(self.listing().await?.remove(package).flatten())
    }

    async fn install_silently(&self, file: &Path, package: &str) -> Result<(), AgentError> {
        let file = file.to_string_lossy();
        self.run_for(
            self.install.as_ref(),
            "install",
            package,
            &[("file", &file), ("package", package)],
        )
        .await
    }

    async fn install_interactive(&self, file: &Path, package: &str) -> Result<(), AgentError> {
        let file = file.to_string_lossy();
        self.run_for(
            self.install_interactive.as_ref().or(self.install.as_ref()),
            "interactive install",
            package,
            &[("file", &file), ("package", package)],
        )
        .await
    }

    async fn uninstall_silently(&self, package: &str) -> Result<(), AgentError> {
        self.run_for(self.uninstall.as_ref(), "uninstall", package, &[("package", package)])
            .await
    }

    async fn uninstall_interactive(&self, package: &str) -> Result<(), AgentError> {
        self.run_for(
            self.uninstall_interactive.as_ref().or(self.uninstall.as_ref()),
            "interactive uninstall",
            package,
            &[("package", package)],
        )
        .await
    }

    async fn install_from_marketplace(&self, uri: &str, package: &str) -> Result<(), AgentError> {
        self.run_for(
            self.marketplace.as_ref(),
            "marketplace install",
            package,
            &[("uri", uri), ("package", package)],
        )
        .await
    }

    async fn launch(&self, package: &str) -> Result<(), AgentError> {
        self.run_for(self.launch.as_ref(), "launch", package, &[("package", package)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing() {
        let listing = parse_listing("com.foo 1.2.0\ncom.bar\n\n  com.baz 3 extra\n");
        assert_eq!(listing.len(), 3);
        assert_eq!(listing["com.foo"].as_deref(), Some("1.2.0"));
        assert_eq!(listing["com.bar"], None);
        assert_eq!(listing["com.baz"].as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_missing_command_is_platform_error() {
        let manager = CommandPackageManager::from_settings(&PackageCommands::default()).unwrap();
        let err = manager.uninstall_silently("com.foo").await.unwrap_err();
        assert!(err.requires_operator());
        assert!(manager.installed_packages().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_command() {
        let commands = PackageCommands {
            list: Some("echo com.foo 2.0".to_string()),
            ..Default::default()
        };
        let manager = CommandPackageManager::from_settings(&commands).unwrap();
        assert!(manager.installed_packages().await.unwrap().contains("com.foo"));
        assert_eq!(manager.package_version("com.foo").await.unwrap().as_deref(), Some("2.0"));
        assert_eq!(manager.package_version("com.bar").await.unwrap(), None);
    }
}
