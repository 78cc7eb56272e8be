use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use marquee_core::TenantId;

/// Tenant-partitioned in-memory map. A key is only visible to the tenant it
/// was written under.
#[derive(Debug)]
pub(crate) struct TenantMap<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> Default for TenantMap<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> TenantMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(tenant_id, key.clone())).cloned()
    }

    pub(crate) fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((tenant_id, key), value);
        }
    }

    /// Apply `f` to the entry, inserting `V::default()` first if absent.
    pub(crate) fn modify(&self, tenant_id: TenantId, key: K, f: impl FnOnce(&mut V))
    where
        V: Default,
    {
        if let Ok(mut map) = self.inner.write() {
            f(map.entry((tenant_id, key)).or_default());
        }
    }
}
