//! Background tasks keyed by file, each new task cancelling its predecessor

use codesight_types::{FileHandle, ProjectId};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
struct TaskSlot {
    generation: Uuid,
    token: CancellationToken,
}

/// At most one running task per file.
///
/// Spawning for a key cancels the task already registered under it. A task
/// unregisters itself on completion unless a newer one has taken its slot.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    slots: Arc<DashMap<FileHandle, TaskSlot>>,
}

impl BackgroundTasks {
    /// Create an empty task registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` for `key` on the current runtime.
    ///
    /// `task` receives the token it must watch for cancellation.
    pub fn spawn<F, Fut>(&self, key: FileHandle, task: F) -> JoinHandle<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = Uuid::new_v4();
        let token = CancellationToken::new();

        let previous = self.slots.insert(
            key.clone(),
            TaskSlot {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            debug!(file = %key, "Cancelled previous background sync");
        }

        let slots = Arc::clone(&self.slots);
        let future = task(token);
        tokio::spawn(async move {
            future.await;
            slots.remove_if(&key, |_, slot| slot.generation == generation);
        })
    }

    /// Cancel the task registered for `key`
    pub fn cancel(&self, key: &FileHandle) -> bool {
        match self.slots.remove(key) {
            Some((_, slot)) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every task belonging to a project
    pub fn cancel_project(&self, project: &ProjectId) {
        self.slots.retain(|file, slot| {
            if file.project() == project {
                slot.token.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Cancel every task
    pub fn cancel_all(&self) {
        self.slots.retain(|_, slot| {
            slot.token.cancel();
            false
        });
    }

    /// Whether a task is registered for `key`
    pub fn is_running(&self, key: &FileHandle) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no task is registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(path: &str) -> FileHandle {
        FileHandle::new(ProjectId::new("p"), path)
    }

    #[tokio::test]
    async fn test_new_task_cancels_predecessor() {
        let tasks = BackgroundTasks::new();
        let cancelled = Arc::new(AtomicUsize::new(0));

        let first = tasks.spawn(key("/a.py"), |token| {
            let cancelled = cancelled.clone();
            async move {
                token.cancelled().await;
                cancelled.fetch_add(1, Ordering::SeqCst);
            }
        });

        let release = CancellationToken::new();
        let second = tasks.spawn(key("/a.py"), |_token| {
            let release = release.clone();
            async move { release.cancelled().await }
        });

        first.await.unwrap();
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        // The finished predecessor must not unregister its successor.
        assert!(tasks.is_running(&key("/a.py")));

        release.cancel();
        second.await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_run_side_by_side() {
        let tasks = BackgroundTasks::new();
        let a = tasks.spawn(key("/a.py"), |token| async move { token.cancelled().await });
        let b = tasks.spawn(key("/b.py"), |token| async move { token.cancelled().await });
        assert_eq!(tasks.len(), 2);

        assert!(tasks.cancel(&key("/a.py")));
        a.await.unwrap();
        assert!(tasks.is_running(&key("/b.py")));

        tasks.cancel_all();
        b.await.unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_project_leaves_other_projects() {
        let tasks = BackgroundTasks::new();
        let other = FileHandle::new(ProjectId::new("q"), "/a.py");
        let mine = tasks.spawn(key("/a.py"), |token| async move { token.cancelled().await });
        let theirs = tasks.spawn(other.clone(), |token| async move { token.cancelled().await });

        tasks.cancel_project(&ProjectId::new("p"));
        mine.await.unwrap();
        assert!(tasks.is_running(&other));

        tasks.cancel(&other);
        theirs.await.unwrap();
    }
}
