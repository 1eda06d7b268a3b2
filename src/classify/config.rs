//! Rule document for the classifier.
//!
//! ```toml
//! [cache]
//! enabled = true
//! max_size = 10000
//! ttl_seconds = 600
//!
//! [[rules]]
//! type = "google"
//! name = "Googlebot"
//! enabled = true
//! patterns = ["googlebot", "google-inspectiontool"]
//! aux_domains = ["googlebot.com", "google.com"]
//! ```

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ClassifyError;

const DEFAULT_CACHE_MAX_SIZE: usize = 10_000;
const DEFAULT_CACHE_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub max_size: usize,
    pub ttl_seconds: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: DEFAULT_CACHE_MAX_SIZE,
            ttl_seconds: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CacheSection {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Entry bound, clamped to at least one.
    pub fn max_size_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_size).unwrap_or(NonZeroUsize::MIN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuleConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default, alias = "auxDomains")]
    pub aux_domains: Vec<String>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub cache: CacheSection,
    pub rules: Vec<RuleConfig>,
}

impl ClassifierConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ClassifyError> {
        toml::from_str(source).map_err(|err| ClassifyError::Parse(err.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ClassifyError> {
        let source = std::fs::read_to_string(path).map_err(|source| ClassifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Small crawler rule set used when no rule document can be loaded.
    pub fn builtin() -> Self {
        let rule = |kind: &str, name: &str, patterns: &[&str], aux: &[&str]| RuleConfig {
            kind: kind.to_string(),
            name: name.to_string(),
            enabled: true,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            aux_domains: aux.iter().map(|d| d.to_string()).collect(),
        };

        Self {
            cache: CacheSection::default(),
            rules: vec![
                rule(
                    "google",
                    "Googlebot",
                    &["googlebot", "google-inspectiontool", "adsbot-google"],
                    &["googlebot.com", "google.com"],
                ),
                rule("bing", "Bingbot", &["bingbot", "msnbot"], &["search.msn.com"]),
                rule(
                    "baidu",
                    "Baiduspider",
                    &["baiduspider"],
                    &["baidu.com", "baidu.jp"],
                ),
                rule("yandex", "YandexBot", &["yandex(bot|images)"], &["yandex.ru", "yandex.com"]),
                rule("sogou", "Sogou", &["sogou"], &["sogou.com"]),
                rule("so360", "360Spider", &["360spider", "haosouspider"], &[]),
                rule("bytedance", "Bytespider", &["bytespider"], &[]),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rule_document() {
        let config = ClassifierConfig::from_toml_str(
            r#"
            [cache]
            enabled = false
            ttl_seconds = 5

            [[rules]]
            type = "google"
            name = "Googlebot"
            patterns = ["googlebot"]
            auxDomains = ["googlebot.com"]

            [[rules]]
            type = "bing"
            enabled = false
            "#,
        )
        .expect("valid document");

        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl(), Duration::from_secs(5));
        assert_eq!(config.cache.max_size, DEFAULT_CACHE_MAX_SIZE);
        assert_eq!(config.rules.len(), 2);
        assert!(config.rules[0].enabled);
        assert_eq!(config.rules[0].aux_domains, vec!["googlebot.com".to_string()]);
        assert!(!config.rules[1].enabled);
        assert!(config.rules[1].patterns.is_empty());
    }

    #[test]
    fn rejects_malformed_document() {
        let err = ClassifierConfig::from_toml_str("[[rules]]\nname = 3").expect_err("bad");
        assert!(matches!(err, ClassifyError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ClassifierConfig::from_file(Path::new("/nonexistent/rules.toml"))
            .expect_err("missing");
        assert!(matches!(err, ClassifyError::Io { .. }));
    }

    #[test]
    fn zero_max_size_clamps_to_one() {
        let section = CacheSection {
            max_size: 0,
            ..Default::default()
        };
        assert_eq!(section.max_size_non_zero().get(), 1);
    }
}
