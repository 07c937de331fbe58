use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per user, so writers for different users never contend.
#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock is released when the returned guard is dropped.
    pub async fn lock(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        // The map shard guard is gone before we wait on the mutex.
        mutex.lock_owned().await
    }

    /// Drops entries nobody is holding or waiting on.
    pub fn cleanup(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let locks = UserLocks::new();
        let user = Uuid::new_v4();

        let guard = locks.lock(user).await;
        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = contender.lock(user).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::new();
        let _first = locks.lock(Uuid::new_v4()).await;

        tokio::time::timeout(Duration::from_secs(1), locks.lock(Uuid::new_v4()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_keeps_held_locks() {
        let locks = UserLocks::new();
        let held = Uuid::new_v4();

        let guard = locks.lock(held).await;
        drop(locks.lock(Uuid::new_v4()).await);
        assert_eq!(locks.len(), 2);

        locks.cleanup();
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.cleanup();
        assert!(locks.is_empty());
    }
}
