//! Bindings and settings files.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use voicetag_core::{Settings, StaticBindings, VoiceBinding, validate_settings};

/// Load a JSON object of `speaker -> binding`. Speaker names are
/// normalized the same way tags are.
pub fn load_bindings(path: &Path) -> anyhow::Result<StaticBindings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bindings file {}", path.display()))?;
    let entries: HashMap<String, VoiceBinding> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid bindings file {}", path.display()))?;

    let mut bindings = StaticBindings::new();
    for (speaker, binding) in &entries {
        if binding.references.is_empty() {
            anyhow::bail!("Binding for '{speaker}' has no reference audio");
        }
        bindings.insert(speaker, binding.clone());
    }
    Ok(bindings)
}

/// Load settings, falling back to defaults when no file is given.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid settings file {}", path.display()))?;
    validate_settings(&settings).context("Invalid settings")?;
    Ok(settings)
}
