use pagelet_cache::RenderResult;

/// A unit of UI evaluated during a render pass.
///
/// Rendering either produces a view, or is interrupted by a pending or
/// failed read somewhere in the subtree. Any `FnMut` closure returning a
/// [`RenderResult`] is a component, so a subtree is typically a closure
/// over one or more [`read`](pagelet_cache::ResourceCache::read) calls.
pub trait Component<V> {
    fn render(&mut self) -> RenderResult<V>;
}

impl<V, F> Component<V> for F
where
    F: FnMut() -> RenderResult<V>,
{
    fn render(&mut self) -> RenderResult<V> {
        self()
    }
}
