//! Hook for post-load template analysis.

use std::sync::Arc;

use tracing::debug;

use crate::domain::entities::TemplateRecord;
use crate::domain::types::GroupId;

/// Consumer notified whenever a template enters or leaves the cache.
///
/// `analyze` runs on the blocking pool and is never awaited by the cache, so
/// implementations may be slow but must not assume ordering between calls.
pub trait Analyzer: Send + Sync + 'static {
    fn analyze(&self, template: &TemplateRecord);

    fn remove(&self, name: &str, site_group_id: GroupId);
}

/// Detach an analysis run for `template`.
pub(crate) fn dispatch(analyzer: &Arc<dyn Analyzer>, template: Arc<TemplateRecord>) {
    let analyzer = Arc::clone(analyzer);
    debug!(
        template = %template.name,
        site_group_id = template.site_group_id,
        "Dispatching template analysis"
    );
    // The handle is dropped on purpose; the caller never waits on analysis.
    drop(tokio::task::spawn_blocking(move || {
        analyzer.analyze(&template);
    }));
}
