//! `voicetag key`: print the fingerprint of a speaker and utterance.

use voicetag_core::{TaskKey, normalize_speaker, normalize_utterance, task_key};

pub fn execute(speaker: &str, text: &str) -> anyhow::Result<TaskKey> {
    if normalize_speaker(speaker).is_empty() {
        anyhow::bail!("Speaker cannot be empty");
    }
    if normalize_utterance(text).is_empty() {
        anyhow::bail!("Utterance cannot be empty");
    }
    Ok(task_key(speaker, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_markup_and_spacing() {
        let plain = execute("Alice", "Hello there").unwrap();
        let noisy = execute(" Alice ", "Hello <b>there</b>").unwrap();
        assert_eq!(plain, noisy);
        assert_eq!(plain.as_str().len(), 64);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(execute("", "Hello").is_err());
        assert!(execute("Alice", "  <br> ").is_err());
    }
}
