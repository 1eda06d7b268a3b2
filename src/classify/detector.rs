use regex::{Regex, RegexBuilder};
use serde::Serialize;

use super::ClassifyError;
use super::config::RuleConfig;

/// Outcome of classifying one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub is_match: bool,
    pub match_type: Option<String>,
    pub match_name: Option<String>,
    pub input: String,
}

impl ClassificationResult {
    fn miss(input: &str) -> Self {
        Self {
            is_match: false,
            match_type: None,
            match_name: None,
            input: input.to_string(),
        }
    }
}

/// Registry view of a rule, disabled ones included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleInfo {
    pub kind: String,
    pub name: String,
    pub enabled: bool,
    pub patterns: Vec<String>,
    pub aux_domains: Vec<String>,
}

struct CompiledRule {
    kind: String,
    name: String,
    patterns: Vec<Regex>,
}

/// Ordered, compiled rule list. First matching rule wins.
pub(crate) struct Detector {
    compiled: Vec<CompiledRule>,
    registry: Vec<RuleInfo>,
}

impl Detector {
    pub(crate) fn compile(rules: &[RuleConfig]) -> Result<Self, ClassifyError> {
        let mut compiled = Vec::new();
        let mut registry = Vec::with_capacity(rules.len());

        for rule in rules {
            let name = if rule.name.is_empty() {
                rule.kind.clone()
            } else {
                rule.name.clone()
            };

            if rule.enabled {
                let patterns = rule
                    .patterns
                    .iter()
                    .map(|pattern| {
                        RegexBuilder::new(pattern)
                            .case_insensitive(true)
                            .build()
                            .map_err(|source| ClassifyError::Pattern {
                                rule: rule.kind.clone(),
                                pattern: pattern.clone(),
                                source,
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                compiled.push(CompiledRule {
                    kind: rule.kind.clone(),
                    name: name.clone(),
                    patterns,
                });
            }

            registry.push(RuleInfo {
                kind: rule.kind.clone(),
                name,
                enabled: rule.enabled,
                patterns: rule.patterns.clone(),
                aux_domains: rule.aux_domains.clone(),
            });
        }

        Ok(Self { compiled, registry })
    }

    pub(crate) fn empty() -> Self {
        Self {
            compiled: Vec::new(),
            registry: Vec::new(),
        }
    }

    pub(crate) fn evaluate(&self, input: &str) -> ClassificationResult {
        self.compiled
            .iter()
            .find(|rule| rule.patterns.iter().any(|pattern| pattern.is_match(input)))
            .map(|rule| ClassificationResult {
                is_match: true,
                match_type: Some(rule.kind.clone()),
                match_name: Some(rule.name.clone()),
                input: input.to_string(),
            })
            .unwrap_or_else(|| ClassificationResult::miss(input))
    }

    pub(crate) fn rules(&self) -> &[RuleInfo] {
        &self.registry
    }

    pub(crate) fn enabled_count(&self) -> usize {
        self.compiled.len()
    }
}
