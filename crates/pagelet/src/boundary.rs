use std::sync::{Arc, Mutex};

use pagelet_cache::{Interrupt, Invalidate, ResourceError, ResourceKey, Settlement};

use crate::component::Component;

/// The result of rendering a boundary-wrapped subtree.
pub enum Frame<V> {
    /// The subtree rendered fully.
    Complete(V),
    /// At least one descendant read is pending.
    ///
    /// `view` holds placeholders in place of the suspended parts;
    /// `settlements` are the handles to wait on before re-invoking the
    /// subtree.
    Suspended {
        view: V,
        settlements: Vec<Settlement>,
    },
}

impl<V> Frame<V> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Frame::Complete(_))
    }

    /// The current view, placeholder or not.
    pub fn into_view(self) -> V {
        match self {
            Frame::Complete(view) => view,
            Frame::Suspended { view, .. } => view,
        }
    }
}

/// Subtree wrapper intercepting pending reads.
///
/// While a descendant read is pending, the boundary renders its placeholder
/// and carries the settlement handle upward so the driver can re-invoke the
/// subtree once the operation settles. Re-invocation may suspend again on a
/// further dependent read; the cycle repeats until the subtree renders
/// fully. Failed reads pass through untouched: they belong to the nearest
/// [`RecoveryBoundary`], never to a suspension boundary.
pub struct SuspenseBoundary<C, V> {
    child: C,
    placeholder: Box<dyn Fn() -> V + Send>,
}

impl<C, V> SuspenseBoundary<C, V>
where
    C: Component<V>,
{
    pub fn new(child: C, placeholder: impl Fn() -> V + Send + 'static) -> Self {
        SuspenseBoundary {
            child,
            placeholder: Box::new(placeholder),
        }
    }

    /// Renders the child, converting a pending interrupt into a suspended
    /// frame.
    ///
    /// Both interrupt kinds are consumed here: pending ones become frames,
    /// failed ones become the plain error, so the enclosing recovery
    /// boundary only ever sees failures.
    pub fn render(&mut self) -> Result<Frame<V>, ResourceError> {
        match self.child.render() {
            Ok(view) => Ok(Frame::Complete(view)),
            Err(Interrupt::Pending(settlement)) => {
                tracing::debug!(key = %settlement.key(), "subtree suspended");
                Ok(Frame::Suspended {
                    view: (self.placeholder)(),
                    settlements: vec![settlement],
                })
            }
            Err(Interrupt::Failed(error)) => Err(error),
        }
    }
}

#[derive(Debug, Default)]
struct RecoveryState {
    failed: Option<ResourceError>,
    /// Incremented on every reset; readable through
    /// [`RecoveryBoundary::reset_epoch`] to tell apart attempts.
    reset_epoch: u64,
}

/// Subtree wrapper intercepting failed reads.
///
/// On a failure signal the boundary captures the error and renders its
/// fallback, parameterized by the error and a [`ResetHandle`]. It keeps
/// rendering the fallback until an explicit reset, which invalidates
/// exactly the keys in the boundary's [`ResetScope`] and re-attempts the
/// subtree. Sibling boundaries and cache entries outside the scope are
/// never affected.
///
/// The child is a [`SuspenseBoundary`] by construction: a pending signal
/// must never be mistaken for a failure, so the suspension boundary is
/// always the inner of the two.
pub struct RecoveryBoundary<C, V> {
    child: SuspenseBoundary<C, V>,
    fallback: Box<dyn Fn(&ResourceError, ResetHandle) -> V + Send>,
    scope: ResetScope,
    state: Arc<Mutex<RecoveryState>>,
}

impl<C, V> RecoveryBoundary<C, V>
where
    C: Component<V>,
{
    pub fn new(
        child: SuspenseBoundary<C, V>,
        scope: ResetScope,
        fallback: impl Fn(&ResourceError, ResetHandle) -> V + Send + 'static,
    ) -> Self {
        RecoveryBoundary {
            child,
            fallback: Box::new(fallback),
            scope,
            state: Arc::new(Mutex::new(RecoveryState::default())),
        }
    }

    pub fn render(&mut self) -> Frame<V> {
        let failed = self.state.lock().unwrap().failed.clone();
        if let Some(error) = failed {
            // Failed subtrees stay on their fallback until an explicit
            // reset; the child is not consulted.
            return Frame::Complete((self.fallback)(&error, self.reset_handle()));
        }
        match self.child.render() {
            Ok(frame) => frame,
            Err(error) => {
                tracing::debug!(error = %error, "subtree failed");
                self.state.lock().unwrap().failed = Some(error.clone());
                Frame::Complete((self.fallback)(&error, self.reset_handle()))
            }
        }
    }

    /// Handle for resetting this boundary from outside, typically wired
    /// into the fallback view's retry affordance.
    pub fn reset_handle(&self) -> ResetHandle {
        ResetHandle {
            state: Arc::clone(&self.state),
            scope: self.scope.clone(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state.lock().unwrap().failed.is_some()
    }

    pub fn reset_epoch(&self) -> u64 {
        self.state.lock().unwrap().reset_epoch
    }
}

impl<C, V> crate::renderer::Render<V> for RecoveryBoundary<C, V>
where
    C: Component<V>,
{
    fn render(&mut self) -> Frame<V> {
        RecoveryBoundary::render(self)
    }
}

/// The cache entries a recovery boundary owns and will invalidate on reset.
#[derive(Clone, Default)]
pub struct ResetScope {
    targets: Vec<(Arc<dyn Invalidate>, ResourceKey)>,
}

impl ResetScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key owned by this scope.
    ///
    /// The cache is type-erased so one scope can span differently-typed
    /// caches.
    pub fn with_key<I>(mut self, cache: I, key: impl Into<ResourceKey>) -> Self
    where
        I: Invalidate + 'static,
    {
        self.targets.push((Arc::new(cache), key.into()));
        self
    }

    fn invalidate_all(&self) {
        for (cache, key) in &self.targets {
            cache.invalidate_key(key);
        }
    }
}

/// Clears a recovery boundary's captured failure and invalidates its owned
/// keys, so the next render re-attempts the operations with fresh cache
/// entries.
#[derive(Clone)]
pub struct ResetHandle {
    state: Arc<Mutex<RecoveryState>>,
    scope: ResetScope,
}

impl ResetHandle {
    /// Re-attempts exactly once: the reset may fail again, surfacing the
    /// new error through the same boundary.
    pub fn reset(&self) {
        self.scope.invalidate_all();
        let mut state = self.state.lock().unwrap();
        state.failed = None;
        state.reset_epoch += 1;
        tracing::debug!(epoch = state.reset_epoch, "boundary reset");
    }
}
