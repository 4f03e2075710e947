pub mod schema;

pub use schema::{
    Config, ConfigError, GatewayConfig, MentionConfig, RelayConfig, StorageConfig, TeamworkConfig,
};
