use serde::Deserialize;

pub const DEFAULT_NAMESPACE: &str = "rsmq";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;
pub const DEFAULT_QUEUE_CACHE_TTL_MS: u64 = 1000;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Database file. An in-memory database is used when unset.
    pub db_path: Option<String>,
    /// Prefix scoping every queue name.
    pub namespace: Option<String>,
    pub max_connections: Option<u32>,
    /// How long resolved queue attributes are reused before refetching.
    pub queue_cache_ttl_ms: Option<u64>,
    /// Publish a notification on every sent message.
    pub realtime: Option<bool>,
}

impl Config {
    /// Reads `SIMPLEMQ_`-prefixed environment variables.
    pub fn load() -> eyre::Result<Self> {
        Ok(envy::prefixed("SIMPLEMQ_").from_env::<Self>()?)
    }

    pub fn db_path(&self) -> Option<&str> {
        self.db_path.as_deref()
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn queue_cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(
            self.queue_cache_ttl_ms
                .unwrap_or(DEFAULT_QUEUE_CACHE_TTL_MS),
        )
    }

    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.db_path(), None);
        assert_eq!(config.namespace(), "rsmq");
        assert_eq!(config.max_connections(), 8);
        assert_eq!(config.queue_cache_ttl().as_millis(), 1000);
        assert!(!config.realtime());
    }

    #[test]
    fn test_deserialize_from_env_pairs() {
        let config: Config = envy::prefixed("SIMPLEMQ_")
            .from_iter(vec![
                ("SIMPLEMQ_DB_PATH".to_owned(), "queues.db".to_owned()),
                ("SIMPLEMQ_NAMESPACE".to_owned(), "jobs".to_owned()),
                ("SIMPLEMQ_QUEUE_CACHE_TTL_MS".to_owned(), "0".to_owned()),
                ("SIMPLEMQ_REALTIME".to_owned(), "true".to_owned()),
            ])
            .unwrap();

        assert_eq!(config.db_path(), Some("queues.db"));
        assert_eq!(config.namespace(), "jobs");
        assert!(config.queue_cache_ttl().is_zero());
        assert!(config.realtime());
    }
}
