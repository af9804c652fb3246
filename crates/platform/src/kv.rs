//! Namespaced key/value store (NVS) abstraction.
//!
//! Only string values are modelled; numeric and blob entries of the
//! underlying store are invisible through this trait.

/// Persistent string key/value storage grouped by namespace.
pub trait KvStore {
    /// Error type
    type Error: core::fmt::Debug;

    /// Copy the value of `key` into `buf` and return it as text.
    ///
    /// `Ok(None)` when the key is absent or its value does not fit `buf`.
    fn get<'b>(
        &self,
        namespace: &str,
        key: &str,
        buf: &'b mut [u8],
    ) -> Result<Option<&'b str>, Self::Error>;

    /// Stage `value` for `key` in `namespace`. Not durable until
    /// [`KvStore::commit`].
    fn set(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Make every staged write in `namespace` durable.
    fn commit(&mut self, namespace: &str) -> Result<(), Self::Error>;

    /// Call `visit(key, value)` for every string entry of `namespace`,
    /// in the store's iteration order.
    fn for_each(
        &self,
        namespace: &str,
        visit: &mut dyn FnMut(&str, &str),
    ) -> Result<(), Self::Error>;
}
