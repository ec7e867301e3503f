// Display text cleanup
// Strips configured regex patterns from names before they are shown

use crate::config::CleanupConfig;
use regex::Regex;

#[derive(Debug, Default)]
pub struct TextCleaner {
    patterns: Vec<Regex>,
}

impl TextCleaner {
    /// Compile the configured patterns; a disabled config yields a no-op cleaner
    pub fn new(config: &CleanupConfig) -> Self {
        if !config.enabled {
            return Self::default();
        }

        let patterns = config
            .patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Ignoring invalid cleanup pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    pub fn is_noop(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Remove every pattern from `text`, in order
    pub fn clean(&self, text: &str) -> String {
        if self.is_noop() {
            return text.to_string();
        }

        let cleaned = self
            .patterns
            .iter()
            .fold(text.to_string(), |acc, re| re.replace_all(&acc, "").into_owned());

        cleaned.trim().to_string()
    }

    pub fn clean_option(&self, text: Option<&str>) -> Option<String> {
        text.map(|s| self.clean(s))
    }

    pub fn clean_all(&self, texts: &[String]) -> Vec<String> {
        texts.iter().map(|s| self.clean(s)).collect()
    }
}
