//! Single-owner resource slots keyed by an invalidation key.

/// Holds at most one resource together with the key it was created for.
///
/// [`ResourceSlot::ensure_with`] replaces the resource only when the
/// requested key differs from the cached one. The old resource is dropped
/// before the new one is created, so two generations never coexist.
#[derive(Debug)]
pub struct ResourceSlot<K, T> {
    entry: Option<(K, T)>,
}

impl<K, T> Default for ResourceSlot<K, T> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<K: PartialEq, T> ResourceSlot<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current resource, if any.
    pub fn get(&self) -> Option<&T> {
        self.entry.as_ref().map(|(_, value)| value)
    }

    /// The key the current resource was created for.
    pub fn key(&self) -> Option<&K> {
        self.entry.as_ref().map(|(key, _)| key)
    }

    /// Whether the slot holds a resource created for `key`.
    pub fn is_current(&self, key: &K) -> bool {
        self.key().is_some_and(|cached| cached == key)
    }

    /// Makes the slot hold a resource for `key`, calling `create` only when
    /// the cached key differs or the slot is empty.
    ///
    /// Returns `Ok(true)` when the resource was (re)created. When `create`
    /// fails the slot is left empty.
    pub fn ensure_with<E>(
        &mut self,
        key: K,
        create: impl FnOnce(&K) -> Result<T, E>,
    ) -> Result<bool, E> {
        if self.is_current(&key) {
            return Ok(false);
        }
        self.entry = None;
        let value = create(&key)?;
        self.entry = Some((key, value));
        Ok(true)
    }

    /// Drops the held resource.
    pub fn clear(&mut self) {
        self.entry = None;
    }
}
