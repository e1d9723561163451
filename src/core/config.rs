mod parsing;
mod secret;
mod settings;
mod types;

pub(crate) use types::{
    AdminSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, Environment,
    GeneratorSettings, ProblemPoolSettings, RedisSettings, RuntimeSettings, SecuritySettings,
    Settings, TelemetrySettings,
};
