//! In-memory repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Repository, StorageError};

struct Slot<T> {
    order: u64,
    value: T,
}

struct Inner<T> {
    items: HashMap<String, Slot<T>>,
    next_order: u64,
}

/// `RwLock`-protected map keyed by id.
pub struct MemoryRepository<T> {
    inner: RwLock<Inner<T>>,
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                items: HashMap::new(),
                next_order: 0,
            }),
        }
    }
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Repository<T> for MemoryRepository<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn save(&self, id: &str, value: T) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if let Some(slot) = inner.items.get_mut(id) {
            slot.value = value;
            return Ok(());
        }
        let order = inner.next_order;
        inner.next_order += 1;
        inner.items.insert(id.to_string(), Slot { order, value });
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<T>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.items.get(id).map(|slot| slot.value.clone()))
    }

    async fn list(&self) -> Result<Vec<T>, StorageError> {
        let inner = self.inner.read().await;
        let mut slots: Vec<&Slot<T>> = inner.items.values().collect();
        slots.sort_by_key(|slot| slot.order);
        Ok(slots.into_iter().map(|slot| slot.value.clone()).collect())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.items.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_save_get_list() {
        let repo: MemoryRepository<String> = MemoryRepository::new();
        repo.save("b", "second".to_string()).await.unwrap();
        repo.save("a", "first".to_string()).await.unwrap();

        assert_eq!(repo.get("a").await.unwrap(), Some("first".to_string()));
        assert_eq!(repo.get("missing").await.unwrap(), None);
        assert_eq!(repo.list().await.unwrap(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_replace_keeps_position() {
        let repo: MemoryRepository<u32> = MemoryRepository::new();
        repo.save("x", 1).await.unwrap();
        repo.save("y", 2).await.unwrap();
        repo.save("x", 10).await.unwrap();

        assert_eq!(repo.list().await.unwrap(), vec![10, 2]);
    }

    #[tokio::test]
    async fn test_clear() {
        let repo: MemoryRepository<u32> = MemoryRepository::new();
        repo.save("x", 1).await.unwrap();
        repo.clear().await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let repo: Arc<MemoryRepository<usize>> = Arc::new(MemoryRepository::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.save(&format!("k{i}"), i).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(repo.list().await.unwrap().len(), 32);
    }
}
