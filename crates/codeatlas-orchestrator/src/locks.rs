//! Per-repo mutual exclusion (spec §5 "Shared-resource policy": concurrent
//! `index()` calls for the same repo name are serialized; calls for
//! different repos proceed independently).

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct RepoLockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RepoLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `repo_name`, creating its entry on first use.
    /// Holding the returned guard for the lifetime of one `index()` call is
    /// what actually enforces serialization; the table itself is never
    /// locked for longer than the entry lookup/insert.
    pub async fn acquire(&self, repo_name: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(repo_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_repo_name_serializes() {
        let table = Arc::new(RepoLockTable::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let t1 = {
            let table = table.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _guard = table.acquire("repo-a").await;
                tokio::time::sleep(Duration::from_millis(30)).await;
                order.lock().await.push(1);
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let t2 = {
            let table = table.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _guard = table.acquire("repo-a").await;
                order.lock().await.push(2);
            })
        };

        t1.await.unwrap();
        t2.await.unwrap();
        assert_eq!(*order.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn different_repo_names_do_not_block_each_other() {
        let table = Arc::new(RepoLockTable::new());
        let g1 = table.acquire("repo-a").await;
        let acquired = tokio::time::timeout(Duration::from_millis(50), table.acquire("repo-b")).await;
        assert!(acquired.is_ok());
        drop(g1);
    }
}
