use std::future::Future;

use pagelet_cache::{LoadResult, ResourceCache, ResourceError, ResourceKey};

use crate::boundary::{Frame, RecoveryBoundary, ResetHandle, ResetScope, SuspenseBoundary};
use crate::renderer::Render;

/// One independently loading, independently failing panel of a page.
///
/// A section bundles a cache key, its producer, and the presentation
/// callbacks, wrapped in its own suspension and recovery boundaries. The
/// producer is re-invoked whenever the section's entry is recreated after a
/// reset.
pub struct Section<V> {
    name: String,
    root: Box<dyn Render<V> + Send>,
    reset: ResetHandle,
}

impl<V: 'static> Section<V> {
    #[allow(clippy::too_many_arguments)]
    pub fn new<T, P, Fut>(
        name: impl Into<String>,
        cache: &ResourceCache<T>,
        key: impl Into<ResourceKey>,
        producer: P,
        view: impl Fn(T) -> V + Send + 'static,
        placeholder: impl Fn() -> V + Send + 'static,
        fallback: impl Fn(&ResourceError, ResetHandle) -> V + Send + 'static,
    ) -> Self
    where
        T: Clone + Send + Sync + 'static,
        P: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = LoadResult<T>> + Send + 'static,
    {
        let key = key.into();
        let child = {
            let cache = cache.clone();
            let key = key.clone();
            move || cache.read(&key, &producer).map(&view)
        };
        let suspense = SuspenseBoundary::new(child, placeholder);
        let scope = ResetScope::new().with_key(cache.clone(), key);
        let recovery = RecoveryBoundary::new(suspense, scope, fallback);
        let reset = recovery.reset_handle();

        Section {
            name: name.into(),
            root: Box::new(recovery),
            reset,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for this section's local reset; siblings are unaffected.
    pub fn reset_handle(&self) -> ResetHandle {
        self.reset.clone()
    }
}

/// Composes independent sections so a page's panels load and fail on their
/// own schedules.
///
/// Sections are never synchronized against each other: a fast section's
/// value renders while slow siblings still show placeholders, and a failed
/// section renders its fallback without blanking anything else.
pub struct SectionCoordinator<V> {
    sections: Vec<Section<V>>,
    assemble: Box<dyn Fn(Vec<V>) -> V + Send>,
    generation: u64,
}

impl<V> SectionCoordinator<V> {
    pub fn new(sections: Vec<Section<V>>, assemble: impl Fn(Vec<V>) -> V + Send + 'static) -> Self {
        SectionCoordinator {
            sections,
            assemble: Box::new(assemble),
            generation: 0,
        }
    }

    pub fn section(&self, name: &str) -> Option<&Section<V>> {
        self.sections.iter().find(|section| section.name == name)
    }

    /// Resets every section's scope at once, as opposed to a single
    /// section's local reset, and bumps the generation so the whole
    /// composite renders as freshly mounted.
    pub fn reset_all(&mut self) {
        self.generation += 1;
        for section in &self.sections {
            section.reset.reset();
        }
        tracing::debug!(generation = self.generation, "all sections reset");
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<V> Render<V> for SectionCoordinator<V> {
    fn render(&mut self) -> Frame<V> {
        let mut views = Vec::with_capacity(self.sections.len());
        let mut settlements = Vec::new();
        for section in &mut self.sections {
            match section.root.render() {
                Frame::Complete(view) => views.push(view),
                Frame::Suspended {
                    view,
                    settlements: mut pending,
                } => {
                    views.push(view);
                    settlements.append(&mut pending);
                }
            }
        }

        let view = (self.assemble)(views);
        if settlements.is_empty() {
            Frame::Complete(view)
        } else {
            Frame::Suspended { view, settlements }
        }
    }
}
