use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// Applies goose SQL migrations by shelling out to the goose binary.
pub struct MigrationRunner {
    goose_binary_path: String,
    migrations_dir: String,
    /// goose driver name, e.g. "postgres"
    driver: String,
    dsn: String,
}

impl MigrationRunner {
    pub fn new(
        goose_binary_path: String,
        migrations_dir: String,
        driver: String,
        dsn: String,
    ) -> Self {
        Self {
            goose_binary_path,
            migrations_dir,
            driver,
            dsn,
        }
    }

    /// `goose up`
    pub async fn run_migrations(&self) -> Result<()> {
        debug!(migrations_dir = %self.migrations_dir, "running migrations");
        let stdout = self.goose("up").await.context("migration failed")?;
        info!("migrations applied");
        debug!("goose output:\n{}", stdout);
        Ok(())
    }

    /// `goose down`: rolls back the most recent migration
    pub async fn rollback_migration(&self) -> Result<()> {
        debug!("rolling back most recent migration");
        let stdout = self.goose("down").await.context("rollback failed")?;
        debug!("goose output:\n{}", stdout);
        Ok(())
    }

    /// `goose status`
    pub async fn migration_status(&self) -> Result<String> {
        self.goose("status")
            .await
            .context("failed to get migration status")
    }

    fn command(&self, action: &str) -> Command {
        let mut cmd = Command::new(&self.goose_binary_path);
        cmd.arg("-dir")
            .arg(&self.migrations_dir)
            .arg(&self.driver)
            .arg(&self.dsn)
            .arg(action);
        cmd
    }

    async fn goose(&self, action: &str) -> Result<String> {
        let output = self
            .command(action)
            .output()
            .await
            .with_context(|| format!("failed to spawn goose at '{}'", self.goose_binary_path))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("goose {} exited with {}\nstdout: {}\nstderr: {}", action, output.status, stdout, stderr);
        }

        Ok(stdout)
    }
}
