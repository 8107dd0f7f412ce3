//! Named locks
//!
//! Serializes operations that modify the same parent object, e.g. two
//! network interfaces joining one subnet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type LockTable = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

#[derive(Clone, Default)]
pub struct Locks {
    table: Arc<Mutex<LockTable>>,
}

/// Held lock; released on drop
///
/// The last holder of a name removes it from the table.
pub struct LockGuard {
    key: String,
    table: Arc<Mutex<LockTable>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        tracing::debug!("Unlocking {:?}", self.key);
        drop(self.guard.take());

        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // Waiters hold their own clone of the mutex
        if table.get(&self.key).is_some_and(|m| Arc::strong_count(m) == 1) {
            table.remove(&self.key);
        }
    }
}

impl Locks {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.entry(key.to_string()).or_default().clone()
    }

    /// Lock `name` within `kind` (e.g. `("subnet1", "azurerm_subnet")`)
    pub async fn by_name(&self, name: &str, kind: &str) -> LockGuard {
        let key = format!("{}.{}", kind, name);
        tracing::debug!("Locking {:?}", key);
        let guard = self.mutex_for(&key).lock_owned().await;
        LockGuard {
            key,
            table: Arc::clone(&self.table),
            guard: Some(guard),
        }
    }

    /// Lock several names in sorted order so concurrent callers cannot deadlock
    pub async fn by_names(&self, names: &[String], kind: &str) -> Vec<LockGuard> {
        let mut sorted: Vec<&String> = names.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for name in sorted {
            guards.push(self.by_name(name, kind).await);
        }
        guards
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_serializes() {
        let locks = Locks::new();
        let guard = locks.by_name("subnet1", "azurerm_subnet").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.by_name("subnet1", "azurerm_subnet").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let locks = Locks::new();
        let _a = locks.by_name("x", "azurerm_subnet").await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.by_name("x", "azurerm_virtual_network"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_by_names_deduplicates() {
        let locks = Locks::new();
        let names = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        let guards = locks.by_names(&names, "azurerm_subnet").await;
        assert_eq!(guards.len(), 2);
        assert_eq!(locks.len(), 2);
        drop(guards);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_released_names_leave_the_table() {
        let locks = Locks::new();
        for i in 0..100 {
            let _g = locks.by_name(&format!("subnet{}", i), "azurerm_subnet").await;
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_entry_kept_while_someone_waits() {
        let locks = Locks::new();
        let guard = locks.by_name("subnet1", "azurerm_subnet").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.by_name("subnet1", "azurerm_subnet").await;
            other.len()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        let len_while_held = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(len_while_held, 1);
        assert_eq!(locks.len(), 0);
    }
}
