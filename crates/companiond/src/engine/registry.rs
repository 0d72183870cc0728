use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing::warn;

use super::entity::Entity;

/// Owns every live entity so they can be shut down together.
#[derive(Default)]
pub struct EntityRegistry {
    entities: Vec<Arc<dyn Entity>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity: Arc<dyn Entity>) {
        self.entities.push(entity);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Entity>> {
        self.entities.iter().find(|e| e.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Entity>> {
        self.entities.iter()
    }

    /// Ask every entity to stop without waiting.
    pub fn stop_all(&self) {
        for entity in &self.entities {
            entity.stop();
        }
    }

    /// Stop every entity and wait for their pollers to exit.
    ///
    /// Pollers still busy after `grace` (a hung command) are aborted.
    /// Returns how many entities had to be aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        info!("Stopping {} entities", self.entities.len());
        self.stop_all();

        let joined = tokio::time::timeout(grace, async {
            for entity in &self.entities {
                entity.join().await;
            }
        })
        .await;

        if joined.is_ok() {
            info!("All entities stopped");
            return 0;
        }

        let mut aborted = 0;
        for entity in &self.entities {
            // Anything that finishes within a moment was merely slow
            if tokio::time::timeout(Duration::from_millis(10), entity.join())
                .await
                .is_err()
            {
                warn!(
                    "[{}] Did not stop within {:?}, aborting",
                    entity.id(),
                    grace
                );
                entity.abort();
                entity.join().await;
                aborted += 1;
            }
        }
        aborted
    }
}
