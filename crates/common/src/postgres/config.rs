use serde::{Deserialize, Serialize};

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_pool_size: usize,
    pub migrations_dir: String,
    pub goose_binary_path: String,
}

impl PostgresConfig {
    /// Connection string in the key/value form goose accepts
    pub fn goose_dsn(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode=disable",
            self.host, self.port, self.username, self.password, self.database
        )
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "herald".to_string(),
            username: "herald".to_string(),
            password: "herald".to_string(),
            max_pool_size: 10,
            migrations_dir: "crates/herald_all_in_one/migrations/postgres".to_string(),
            goose_binary_path: "goose".to_string(),
        }
    }
}
