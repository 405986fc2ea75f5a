/// Passes the item through while performing a side effect.
pub fn inspect<T>(mut f: impl FnMut(&T)) -> impl FnMut(&T) -> Option<T>
where
    T: bytemuck::Pod + Send,
{
    move |item: &T| {
        f(item);
        Some(*item)
    }
}
