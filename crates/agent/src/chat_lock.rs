use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per chat. Waiters are served in arrival order, so events for a chat are
/// handled one at a time and in order; different chats never contend.
#[derive(Default)]
pub struct ChatLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(chat_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_chat_is_serialized_in_arrival_order() {
        let locks = Arc::new(ChatLocks::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = locks.lock(1).await;
        let mut handles = Vec::new();
        for i in 0..3 {
            let locks = locks.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(1).await;
                log.lock().unwrap().push(i);
            }));
            // Let each task reach the lock queue before spawning the next.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(log.lock().unwrap().is_empty());
        drop(first);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_different_chats_do_not_block() {
        let locks = ChatLocks::new();
        let _a = locks.lock(1).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(2)).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
