use moka::future::Cache;
use std::time::Duration;
use uuid::Uuid;

/// Live login sessions. An entry expires after `idle_timeout` without use,
/// which logs the user out even if their token has not yet expired.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<Uuid, i32>, // session id → Users.id
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        let sessions = Cache::builder()
            .time_to_idle(idle_timeout)
            .max_capacity(100_000)
            .build();

        Self { sessions }
    }

    pub async fn open(&self, user_id: i32) -> Uuid {
        let sid = Uuid::new_v4();
        self.sessions.insert(sid, user_id).await;
        sid
    }

    /// Check that `sid` is live for `user_id`, refreshing its idle timer.
    pub async fn touch(&self, sid: &Uuid, user_id: i32) -> bool {
        matches!(self.sessions.get(sid).await, Some(owner) if owner == user_id)
    }

    pub async fn close(&self, sid: &Uuid) {
        self.sessions.invalidate(sid).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_touch_close() {
        let store = SessionStore::new(Duration::from_secs(60));
        let sid = store.open(7).await;

        assert!(store.touch(&sid, 7).await);
        assert!(!store.touch(&sid, 8).await);

        store.close(&sid).await;
        assert!(!store.touch(&sid, 7).await);
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let store = SessionStore::new(Duration::from_millis(50));
        let sid = store.open(7).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!store.touch(&sid, 7).await);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert!(!store.touch(&Uuid::new_v4(), 1).await);
    }
}
