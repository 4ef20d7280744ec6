use anyhow::Result;
use async_trait::async_trait;

/// Revisioned key/value store backing the store-based control plane.
///
/// Revisions are store-wide and strictly increasing; a missing key has
/// revision 0.
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64>;
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>>;

    /// All entries under `prefix`, in key order.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>, u64)>>;

    /// Write `value` only if the key's current revision is `expected_revision`.
    /// Returns `(swapped, revision)` where `revision` is the new revision on
    /// success and the current one on failure.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Vec<u8>,
    ) -> Result<(bool, u64)>;

    /// Atomic create: succeeds only when the key does not exist yet.
    async fn create_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        let (created, _) = self.compare_and_swap(key, 0, value).await?;
        Ok(created)
    }
}
