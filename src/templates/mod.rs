//! Permanent template cache.
//!
//! Templates are keyed by `(name, site_group_id)` and stay cached until a
//! reload or invalidation replaces or removes them. Lookups fall back to the
//! default site group so new groups render with shared templates until an
//! override exists.

mod analyzer;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use metrics::gauge;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::application::repos::{RepoError, TemplateFilter, TemplatesRepo};
use crate::domain::entities::TemplateRecord;
use crate::domain::types::{GroupId, fallback_chain};

pub use analyzer::Analyzer;

const METRIC_TEMPLATE_COUNT: &str = "pagepool_template_count";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template repository failed: {0}")]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub name: String,
    pub site_group_id: GroupId,
}

impl TemplateKey {
    pub fn new(name: &str, site_group_id: GroupId) -> Self {
        Self {
            name: name.to_string(),
            site_group_id,
        }
    }

    fn of(template: &TemplateRecord) -> Self {
        Self::new(&template.name, template.site_group_id)
    }
}

/// Approximate for display; may lag a concurrent reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateCacheStats {
    pub templates: usize,
    pub names: usize,
}

pub struct TemplateCache {
    repo: Arc<dyn TemplatesRepo>,
    entries: DashMap<TemplateKey, Arc<TemplateRecord>>,
    analyzer: Option<Arc<dyn Analyzer>>,
}

impl TemplateCache {
    pub fn new(repo: Arc<dyn TemplatesRepo>) -> Self {
        Self {
            repo,
            entries: DashMap::new(),
            analyzer: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Load every active template, returning how many were cached.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<usize, TemplateError> {
        let (templates, total) = self.repo.list(&TemplateFilter::active()).await?;
        let count = templates.len();
        for template in templates {
            self.store(template);
        }
        self.record_size();
        info!(count, total, "Templates loaded");
        Ok(count)
    }

    /// Cache-only lookup: exact key, then the default group.
    pub fn get(&self, name: &str, site_group_id: GroupId) -> Option<Arc<TemplateRecord>> {
        fallback_chain(site_group_id).find_map(|group_id| {
            self.entries
                .get(&TemplateKey::new(name, group_id))
                .map(|entry| Arc::clone(entry.value()))
        })
    }

    /// Like [`get`](Self::get), but reads through to the store on a miss and
    /// caches whatever it finds.
    pub async fn get_with_fallback(
        &self,
        name: &str,
        site_group_id: GroupId,
    ) -> Result<Option<Arc<TemplateRecord>>, TemplateError> {
        if let Some(template) = self.get(name, site_group_id) {
            return Ok(Some(template));
        }

        for group_id in fallback_chain(site_group_id) {
            if let Some(template) = self.fetch_active(name, group_id).await? {
                debug!(name, site_group_id = group_id, "Template read through");
                let cached = self.store(template);
                self.record_size();
                return Ok(Some(cached));
            }
        }
        Ok(None)
    }

    /// Re-fetch one key; a missing or inactive row evicts it.
    #[instrument(skip(self))]
    pub async fn reload(&self, name: &str, site_group_id: GroupId) -> Result<(), TemplateError> {
        match self.fetch_active(name, site_group_id).await? {
            Some(template) => {
                self.store(template);
            }
            None => {
                self.entries.remove(&TemplateKey::new(name, site_group_id));
                if let Some(analyzer) = &self.analyzer {
                    analyzer.remove(name, site_group_id);
                }
                debug!(name, site_group_id, "Template evicted on reload");
            }
        }
        self.record_size();
        Ok(())
    }

    /// Re-fetch every site-group variant of `name`.
    ///
    /// Fresh rows are swapped in before stale keys are evicted, so readers
    /// never observe a gap for a template that is still active.
    #[instrument(skip(self))]
    pub async fn reload_by_name(&self, name: &str) -> Result<usize, TemplateError> {
        let (templates, _) = self.repo.list(&TemplateFilter::named(name)).await?;
        let fresh: HashSet<TemplateKey> = templates.iter().map(TemplateKey::of).collect();

        let stale: Vec<TemplateKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().name == name && !fresh.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let count = templates.len();
        for template in templates {
            self.store(template);
        }
        self.evict(&stale);
        self.record_size();
        Ok(count)
    }

    /// Replace the whole cache with the store's active templates.
    ///
    /// The store is read first so a failing query leaves the cache intact.
    /// Entries are upserted in place and only vanished keys are evicted.
    #[instrument(skip(self))]
    pub async fn reload_all(&self) -> Result<usize, TemplateError> {
        let (templates, _) = self.repo.list(&TemplateFilter::active()).await?;
        let fresh: HashSet<TemplateKey> = templates.iter().map(TemplateKey::of).collect();
        let stale: Vec<TemplateKey> = self
            .entries
            .iter()
            .filter(|entry| !fresh.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let count = templates.len();
        for template in templates {
            self.store(template);
        }
        self.evict(&stale);
        self.record_size();
        info!(count, evicted = stale.len(), "Templates reloaded");
        Ok(count)
    }

    pub fn invalidate(&self, name: &str, site_group_id: GroupId) {
        self.entries.remove(&TemplateKey::new(name, site_group_id));
        self.record_size();
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
        self.record_size();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct cached template names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.key().name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> TemplateCacheStats {
        TemplateCacheStats {
            templates: self.len(),
            names: self.names().len(),
        }
    }

    async fn fetch_active(
        &self,
        name: &str,
        site_group_id: GroupId,
    ) -> Result<Option<TemplateRecord>, TemplateError> {
        let (templates, _) = self
            .repo
            .list(&TemplateFilter::exact(name, site_group_id))
            .await?;
        Ok(templates.into_iter().find(TemplateRecord::is_active))
    }

    fn store(&self, template: TemplateRecord) -> Arc<TemplateRecord> {
        let template = Arc::new(template);
        self.entries
            .insert(TemplateKey::of(&template), Arc::clone(&template));
        if let Some(analyzer) = &self.analyzer {
            analyzer::dispatch(analyzer, Arc::clone(&template));
        }
        template
    }

    fn evict(&self, keys: &[TemplateKey]) {
        for key in keys {
            self.entries.remove(key);
            if let Some(analyzer) = &self.analyzer {
                analyzer.remove(&key.name, key.site_group_id);
            }
        }
    }

    fn record_size(&self) {
        gauge!(METRIC_TEMPLATE_COUNT).set(self.entries.len() as f64);
    }
}
