use std::convert::Infallible;

use async_trait::async_trait;

/// Access to the children of a tree item.
#[async_trait]
pub trait ChildSource<T>: Send + Sync
where
    T: Send + Sync,
{
    type Error: Send;

    /// Children already in memory. `None` means "not loaded yet", which is
    /// different from `Some(vec![])` ("loaded, no children").
    fn resident(&self, item: &T) -> Option<Vec<T>>;

    /// Load the children of `item` now.
    ///
    /// # Errors
    /// Returns the source's error when the load fails.
    async fn fetch(&self, item: &T) -> Result<Vec<T>, Self::Error>;
}

/// Source whose children are always resident, computed by a closure.
pub struct ResidentChildren<F> {
    children_of: F,
}

impl<F> ResidentChildren<F> {
    #[must_use]
    pub fn new(children_of: F) -> Self {
        Self { children_of }
    }
}

#[async_trait]
impl<T, F> ChildSource<T> for ResidentChildren<F>
where
    T: Send + Sync,
    F: Fn(&T) -> Vec<T> + Send + Sync,
{
    type Error = Infallible;

    fn resident(&self, item: &T) -> Option<Vec<T>> {
        Some((self.children_of)(item))
    }

    async fn fetch(&self, item: &T) -> Result<Vec<T>, Self::Error> {
        Ok((self.children_of)(item))
    }
}
