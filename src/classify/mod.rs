//! Rule-driven request classification with a bounded result cache.
//!
//! Rules are evaluated in document order; the first enabled rule with a
//! matching pattern decides the result. Negative results are cached too.

mod cache;
pub mod config;
mod detector;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use self::cache::ResultCache;
pub use self::config::{CacheSection, ClassifierConfig, RuleConfig};
use self::detector::Detector;
pub use self::detector::{ClassificationResult, RuleInfo};

const METRIC_CLASSIFY_HIT: &str = "pagepool_classify_hit_total";
const METRIC_CLASSIFY_MISS: &str = "pagepool_classify_miss_total";

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to read rules from `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rules: {0}")]
    Parse(String),
    #[error("rule `{rule}` has an invalid pattern `{pattern}`: {source}")]
    Pattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifierStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_size: u64,
}

impl ClassifierStats {
    pub fn as_map(&self) -> BTreeMap<&'static str, u64> {
        BTreeMap::from([
            ("cache_hits", self.cache_hits),
            ("cache_misses", self.cache_misses),
            ("cache_size", self.cache_size),
        ])
    }
}

pub struct Classifier {
    detector: Detector,
    cache: Option<ResultCache>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifyError> {
        let detector = Detector::compile(&config.rules)?;
        let cache = config
            .cache
            .enabled
            .then(|| ResultCache::new(config.cache.max_size_non_zero(), config.cache.ttl()));

        info!(
            rules = detector.rules().len(),
            enabled_rules = detector.enabled_count(),
            cache_enabled = cache.is_some(),
            "Classifier ready"
        );

        Ok(Self {
            detector,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ClassifyError> {
        Self::new(&ClassifierConfig::from_file(path)?)
    }

    /// Loads the configured rules file, or the built-in rules when none is set.
    ///
    /// Unlike [`load_or_builtin`](Self::load_or_builtin), a configured file
    /// that cannot be read or compiled is an error.
    pub fn from_settings(path: Option<&Path>) -> Result<Self, ClassifyError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::load_or_builtin(None)),
        }
    }

    /// Loads `path` when given, falling back to the built-in crawler rules.
    pub fn load_or_builtin(path: Option<&Path>) -> Self {
        if let Some(path) = path {
            match Self::from_file(path) {
                Ok(classifier) => return classifier,
                Err(err) => warn!(
                    path = %path.display(),
                    error = %err,
                    "Falling back to built-in classifier rules"
                ),
            }
        }

        Self::new(&ClassifierConfig::builtin()).unwrap_or_else(|err| {
            warn!(error = %err, "Built-in classifier rules failed to compile");
            Self {
                detector: Detector::empty(),
                cache: None,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }
        })
    }

    pub fn detect(&self, input: &str) -> ClassificationResult {
        let Some(cache) = &self.cache else {
            return self.detector.evaluate(input);
        };

        if let Some(result) = cache.get(input) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_CLASSIFY_HIT).increment(1);
            return result;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CLASSIFY_MISS).increment(1);
        let result = self.detector.evaluate(input);
        cache.put(input, result.clone());
        result
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.detect(input).is_match
    }

    pub fn stats(&self) -> ClassifierStats {
        ClassifierStats {
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
            cache_size: self.cache.as_ref().map_or(0, |cache| cache.len() as u64),
        }
    }

    /// Every registered rule of `kind`, disabled ones included.
    pub fn rules_by_type(&self, kind: &str) -> Vec<RuleInfo> {
        self.detector
            .rules()
            .iter()
            .filter(|rule| rule.kind == kind)
            .cloned()
            .collect()
    }

    pub fn rule_types(&self) -> BTreeSet<String> {
        self.detector
            .rules()
            .iter()
            .map(|rule| rule.kind.clone())
            .collect()
    }

    pub fn aux_domains(&self, kind: &str) -> Vec<String> {
        let mut domains = Vec::new();
        for rule in self.detector.rules().iter().filter(|rule| rule.kind == kind) {
            for domain in &rule.aux_domains {
                if !domains.contains(domain) {
                    domains.push(domain.clone());
                }
            }
        }
        domains
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use metrics_util::debugging::DebuggingRecorder;

    use super::*;

    fn rule(kind: &str, name: &str, patterns: &[&str]) -> RuleConfig {
        RuleConfig {
            kind: kind.to_string(),
            name: name.to_string(),
            enabled: true,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            aux_domains: Vec::new(),
        }
    }

    fn config(cache: CacheSection, rules: Vec<RuleConfig>) -> ClassifierConfig {
        ClassifierConfig { cache, rules }
    }

    fn google() -> Vec<RuleConfig> {
        vec![rule("google", "Googlebot", &["googlebot"])]
    }

    #[test]
    fn negative_results_are_cached() {
        let classifier = Classifier::new(&config(CacheSection::default(), google())).unwrap();

        assert!(!classifier.is_match("Mozilla/5.0 (Windows NT 10.0)"));
        assert!(!classifier.is_match("Mozilla/5.0 (Windows NT 10.0)"));

        let stats = classifier.stats();
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_size, 1);
    }

    #[test]
    fn positive_result_names_the_rule() {
        let classifier = Classifier::new(&config(CacheSection::default(), google())).unwrap();
        let result = classifier.detect("Mozilla/5.0 (compatible; Googlebot/2.1)");

        assert!(result.is_match);
        assert_eq!(result.match_type.as_deref(), Some("google"));
        assert_eq!(result.match_name.as_deref(), Some("Googlebot"));
        assert_eq!(result.input, "Mozilla/5.0 (compatible; Googlebot/2.1)");
    }

    #[test]
    fn expired_entries_are_recomputed() {
        let cache = CacheSection {
            ttl_seconds: 1,
            ..Default::default()
        };
        let classifier = Classifier::new(&config(cache, google())).unwrap();

        classifier.detect("curl/8.0");
        assert_eq!(classifier.stats().cache_misses, 1);
        classifier.detect("curl/8.0");
        assert_eq!(classifier.stats().cache_misses, 1);

        thread::sleep(Duration::from_millis(1_100));
        classifier.detect("curl/8.0");
        assert_eq!(classifier.stats().cache_misses, 2);
    }

    #[test]
    fn huge_ttl_from_rules_document_does_not_panic() {
        let document = "[cache]\nttl_seconds = 9223372036854775807\n\n[[rules]]\ntype = \"google\"\npatterns = [\"googlebot\"]\n";
        let loaded = ClassifierConfig::from_toml_str(document).expect("valid document");
        let classifier = Classifier::new(&loaded).unwrap();

        assert!(!classifier.detect("curl/8.0").is_match);
        assert!(!classifier.detect("curl/8.0").is_match);
        assert_eq!(classifier.stats().cache_hits, 1);
    }

    #[test]
    fn disabled_cache_is_bypassed() {
        let cache = CacheSection {
            enabled: false,
            ..Default::default()
        };
        let classifier = Classifier::new(&config(cache, google())).unwrap();

        assert!(classifier.is_match("googlebot"));
        assert!(classifier.is_match("googlebot"));
        assert_eq!(classifier.stats(), ClassifierStats::default());
    }

    #[test]
    fn cache_respects_max_size() {
        let cache = CacheSection {
            max_size: 2,
            ..Default::default()
        };
        let classifier = Classifier::new(&config(cache, google())).unwrap();
        for input in ["a", "b", "c", "d"] {
            classifier.detect(input);
        }
        assert_eq!(classifier.stats().cache_size, 2);
    }

    #[test]
    fn concurrent_detection_keeps_counters_consistent() {
        let classifier = Arc::new(Classifier::new(&config(CacheSection::default(), google())).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let classifier = Arc::clone(&classifier);
                thread::spawn(move || {
                    for i in 0..50 {
                        classifier.detect(&format!("agent-{}", (worker + i) % 10));
                        let _ = classifier.stats();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker");
        }

        let stats = classifier.stats();
        assert_eq!(stats.cache_hits + stats.cache_misses, 400);
        assert_eq!(stats.cache_size, 10);
        assert!(stats.cache_misses >= 10);
    }

    #[test]
    fn registry_queries_include_disabled_rules() {
        let mut rules = google();
        rules[0].aux_domains = vec!["googlebot.com".into(), "google.com".into()];
        let mut inspector = rule("google", "Google-InspectionTool", &["google-inspectiontool"]);
        inspector.enabled = false;
        inspector.aux_domains = vec!["google.com".into()];
        rules.push(inspector);
        rules.push(rule("bing", "Bingbot", &["bingbot"]));

        let classifier = Classifier::new(&config(CacheSection::default(), rules)).unwrap();

        assert_eq!(classifier.rules_by_type("google").len(), 2);
        assert_eq!(
            classifier.rule_types().into_iter().collect::<Vec<_>>(),
            vec!["bing".to_string(), "google".to_string()]
        );
        assert_eq!(
            classifier.aux_domains("google"),
            vec!["googlebot.com".to_string(), "google.com".to_string()]
        );
        assert!(!classifier.is_match("Google-InspectionTool/1.0"));
    }

    #[test]
    fn invalid_pattern_in_file_fails_to_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[rules]]\ntype = \"broken\"\npatterns = [\"(oops\"]").unwrap();

        let err = Classifier::from_file(file.path()).err().expect("invalid");
        assert!(matches!(err, ClassifyError::Pattern { .. }));
    }

    #[test]
    fn configured_rules_file_must_load() {
        let err = Classifier::from_settings(Some(Path::new("/nonexistent/rules.toml")))
            .err()
            .expect("missing file");
        assert!(matches!(err, ClassifyError::Io { .. }));

        let classifier = Classifier::from_settings(None).expect("built-in rules");
        assert!(classifier.rule_types().contains("google"));
    }

    #[test]
    fn falls_back_to_builtin_rules() {
        let classifier = Classifier::load_or_builtin(Some(Path::new("/nonexistent/rules.toml")));
        assert!(classifier.is_match("Mozilla/5.0 (compatible; bingbot/2.0)"));
        assert!(classifier.rule_types().contains("google"));
    }

    #[test]
    fn as_map_exposes_all_counters() {
        let stats = ClassifierStats {
            cache_hits: 3,
            cache_misses: 2,
            cache_size: 1,
        };
        let map = stats.as_map();
        assert_eq!(map["cache_hits"], 3);
        assert_eq!(map["cache_misses"], 2);
        assert_eq!(map["cache_size"], 1);
    }

    #[test]
    fn emits_hit_and_miss_counters() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let classifier = Classifier::new(&config(CacheSection::default(), google())).unwrap();

        metrics::with_local_recorder(&recorder, || {
            classifier.detect("googlebot");
            classifier.detect("googlebot");
        });

        let names: Vec<String> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
            .collect();
        assert!(names.contains(&"pagepool_classify_hit_total".to_string()));
        assert!(names.contains(&"pagepool_classify_miss_total".to_string()));
    }
}
