//! Module extensions
//!
//! An extension patches an existing module without copying it: labels,
//! variables and metrics are added, overwritten or removed by exposed name.
//! Commands are matched by identical command text, sub commands recursively.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Label, Metric, Module, ModuleCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionAction {
    /// Append the item
    Add,
    /// Replace every item with the same name in place
    Overwrite,
    /// Delete every item with the same name
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelExtension {
    #[serde(flatten)]
    pub label: Label,
    pub extension_action: ExtensionAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricExtension {
    #[serde(flatten)]
    pub metric: Metric,
    pub extension_action: ExtensionAction,
}

/// Patches for every module command with the same command text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandExtension {
    pub command: String,
    #[serde(default)]
    pub labels: Vec<LabelExtension>,
    #[serde(default)]
    pub variables: Vec<LabelExtension>,
    #[serde(default)]
    pub metrics: Vec<MetricExtension>,
    #[serde(default)]
    pub sub_commands: Vec<CommandExtension>,
}

trait Named {
    fn name(&self) -> String;
}

impl Named for Label {
    fn name(&self) -> String {
        self.exposed_name()
    }
}

impl Named for Metric {
    fn name(&self) -> String {
        self.exposed_name()
    }
}

/// Apply `patches` to a module, returning the patched copy
pub fn merge(original: &[ModuleCommand], patches: &[CommandExtension]) -> Module {
    original
        .iter()
        .map(|command| {
            patches
                .iter()
                .filter(|patch| patch.command == command.command)
                .fold(command.clone(), |acc, patch| merge_command(acc, patch))
        })
        .collect()
}

fn merge_command(mut command: ModuleCommand, patch: &CommandExtension) -> ModuleCommand {
    debug!(command = %command.command, "extending command");

    apply_items(
        &mut command.labels,
        patch
            .labels
            .iter()
            .map(|ext| (ext.extension_action, &ext.label)),
        "label",
    );
    apply_items(
        &mut command.variables,
        patch
            .variables
            .iter()
            .map(|ext| (ext.extension_action, &ext.label)),
        "variable",
    );
    apply_items(
        &mut command.metrics,
        patch
            .metrics
            .iter()
            .map(|ext| (ext.extension_action, &ext.metric)),
        "metric",
    );

    if !patch.sub_commands.is_empty() {
        command.sub_commands = merge(&command.sub_commands, &patch.sub_commands);
    }

    command
}

fn apply_items<'a, T, I>(items: &mut Vec<T>, patches: I, kind: &str)
where
    T: Named + Clone + 'a,
    I: IntoIterator<Item = (ExtensionAction, &'a T)>,
{
    for (action, patch) in patches {
        let name = patch.name();
        match action {
            ExtensionAction::Add => {
                debug!(kind, name = %name, "add item");
                items.push(patch.clone());
            }
            ExtensionAction::Overwrite => {
                let mut found = false;
                for item in items.iter_mut().filter(|item| item.name() == name) {
                    *item = patch.clone();
                    found = true;
                }
                if found {
                    debug!(kind, name = %name, "overwrite item");
                } else {
                    info!(kind, name = %name, "no item found to overwrite");
                }
            }
            ExtensionAction::Remove => {
                let before = items.len();
                items.retain(|item| item.name() != name);
                if items.len() == before {
                    info!(kind, name = %name, "no item found to remove");
                } else {
                    debug!(kind, name = %name, "remove item");
                }
            }
        }
    }
}
