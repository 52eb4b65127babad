use std::io::IsTerminal;
use std::sync::Arc;

use async_trait::async_trait;
use dialoguer::{Select, theme::ColorfulTheme};
use fleetos_shared::os::OsVersion;

use super::{OsError, catalog::VersionCatalog};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub name: String,
    pub value: String,
}

/// A single-selection list prompt.
#[async_trait]
pub trait Prompt: Send + Sync {
    /// Returns the `value` of the chosen entry, or `None` if the user aborted.
    async fn select(
        &self,
        message: &str,
        choices: Vec<Choice>,
        default: usize,
    ) -> Result<Option<String>, OsError>;
}

/// Prompt rendered on the controlling terminal.
pub struct TerminalPrompt;

/// Check if we're in an interactive terminal
pub fn is_interactive() -> bool {
    if std::env::var("CI").is_ok() || std::env::var("FLEETOS_NO_INTERACT").is_ok() {
        return false;
    }
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

#[async_trait]
impl Prompt for TerminalPrompt {
    async fn select(
        &self,
        message: &str,
        choices: Vec<Choice>,
        default: usize,
    ) -> Result<Option<String>, OsError> {
        if !is_interactive() {
            return Err(OsError::Prompt(
                "cannot show the version menu in non-interactive mode, pass an explicit --version"
                    .to_string(),
            ));
        }

        let message = message.to_string();
        let names: Vec<String> = choices.iter().map(|c| c.name.clone()).collect();
        let selection = tokio::task::spawn_blocking(move || {
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt(message)
                .items(&names)
                .default(default)
                .interact_opt()
        })
        .await
        .map_err(|e| OsError::Prompt(e.to_string()))?
        .map_err(|e| OsError::Prompt(e.to_string()))?;

        Ok(selection.and_then(|idx| choices.into_iter().nth(idx).map(|c| c.value)))
    }
}

/// Menu-driven version selection for `--version menu` and `--version menu-esr`.
pub struct InteractiveVersionPicker {
    catalog: VersionCatalog,
    prompt: Arc<dyn Prompt>,
}

impl InteractiveVersionPicker {
    pub fn new(catalog: VersionCatalog, prompt: Arc<dyn Prompt>) -> Self {
        Self { catalog, prompt }
    }

    pub async fn pick(&self, device_type: &str, esr: bool) -> Result<String, OsError> {
        let versions = self.catalog.fetch(device_type, esr).await?;
        let (choices, default) = build_choices(&versions);
        self.prompt
            .select("Select the OS version:", choices, default)
            .await?
            .ok_or(OsError::PromptCancelled)
    }
}

/// Choices in catalog order, plus the index of the first recommended entry (or 0).
pub fn build_choices(versions: &[OsVersion]) -> (Vec<Choice>, usize) {
    let default = versions.iter().position(|v| v.is_recommended).unwrap_or(0);
    let choices = versions
        .iter()
        .map(|v| Choice {
            name: v.formatted_version.clone(),
            value: v.raw_version.clone(),
        })
        .collect();
    (choices, default)
}
