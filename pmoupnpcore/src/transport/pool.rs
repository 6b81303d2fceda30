use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Borne le nombre de messages entrants traités simultanément.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Places libres
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Exécute `task` dès qu'une place se libère ; `None` si le pool est
    /// fermé.
    pub async fn run<F: Future>(&self, task: F) -> Option<F::Output> {
        let _permit = self.permits.acquire().await.ok()?;
        Some(task.await)
    }

    /// Lance `task` dans une tâche tokio soumise à la même borne.
    pub fn spawn<F>(&self, task: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            if let Ok(_permit) = permits.acquire_owned().await {
                task.await;
            }
        })
    }

    /// Refuse tout nouveau travail
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
