use std::path::PathBuf;

use async_trait::async_trait;
use tracing::error;
use tracing::info;

use super::bus::CommandHandler;
use super::entity::Entity;
use super::entity::EntityKind;
use super::error::ExecError;
use super::executor;

/// Fire-and-forget actuator: every press runs the command once.
pub struct Button {
    id: String,
    command: String,
    shell: PathBuf,
}

impl Button {
    pub fn new(id: impl Into<String>, command: impl Into<String>, shell: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            shell: shell.into(),
        }
    }

    pub async fn press(&self) -> Result<(), ExecError> {
        info!("[{}] Pressed", self.id);
        executor::run(&self.command, &self.shell).await?;
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for Button {
    /// Any payload counts as a press
    async fn handle_command(&self, _payload: &str) {
        if let Err(e) = self.press().await {
            error!("[{}] {}", self.id, e);
        }
    }
}

#[async_trait]
impl Entity for Button {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Button
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_press_runs_command_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("presses");
        let button = Button::new("test", format!("echo press >> '{}'", log.display()), "sh");

        button.press().await.unwrap();
        button.handle_command("PRESS").await;
        button.handle_command("").await;

        let presses = std::fs::read_to_string(&log).unwrap();
        assert_eq!(presses.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_press_with_missing_shell_fails() {
        let button = Button::new("test", "true", "/nonexistent/shell");
        assert!(button.press().await.is_err());
        // Logged, not propagated
        button.handle_command("PRESS").await;
        button.stop();
        button.join().await;
    }
}
