use super::parsing::{
    env_optional, env_or_default, is_valid_cache_prefix, parse_bool, parse_cors_origins,
    parse_environment, parse_u16, parse_u32, parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AdminSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, GeneratorSettings,
    ProblemPoolSettings, RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("PHYSEXAM_HOST", "0.0.0.0");
        let port = env_or_default("PHYSEXAM_PORT", "5000");

        let environment = parse_environment(
            env_optional("PHYSEXAM_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config =
            env_optional("PHYSEXAM_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Physics Exam API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };

        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "1440"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "physexam");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "physexam");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("POSTGRES_MAX_CONNECTIONS", env_or_default("POSTGRES_MAX_CONNECTIONS", "30"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let target_size = parse_u64(
            "PROBLEM_POOL_TARGET_SIZE",
            env_or_default("PROBLEM_POOL_TARGET_SIZE", "50"),
        )?;
        let low_water =
            parse_u64("PROBLEM_POOL_LOW_WATER", env_or_default("PROBLEM_POOL_LOW_WATER", "25"))?;
        let refill_batch = parse_u64(
            "PROBLEM_POOL_REFILL_BATCH",
            env_or_default("PROBLEM_POOL_REFILL_BATCH", "10"),
        )?;
        let ttl_seconds =
            parse_u64("PROBLEM_TTL_SECONDS", env_or_default("PROBLEM_TTL_SECONDS", "900"))?;
        let cache_prefix = env_or_default("PROBLEM_CACHE_PREFIX", "exam");
        let prewarm_on_startup =
            env_optional("PREWARM").map(|value| parse_bool(&value)).unwrap_or(false);

        let max_attempts =
            parse_u32("GENERATOR_MAX_ATTEMPTS", env_or_default("GENERATOR_MAX_ATTEMPTS", "10"))?;

        let first_superuser_username = env_or_default("FIRST_SUPERUSER_USERNAME", "admin");
        let first_superuser_password = env_or_default("FIRST_SUPERUSER_PASSWORD", "");

        let log_level = env_or_default("PHYSEXAM_LOG_LEVEL", "info");
        let json = env_optional("PHYSEXAM_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            problem_pool: ProblemPoolSettings {
                target_size,
                low_water,
                refill_batch,
                ttl_seconds,
                cache_prefix,
                prewarm_on_startup,
            },
            generator: GeneratorSettings { max_attempts },
            admin: AdminSettings { first_superuser_username, first_superuser_password },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn problem_pool(&self) -> &ProblemPoolSettings {
        &self.problem_pool
    }

    pub(crate) fn generator(&self) -> &GeneratorSettings {
        &self.generator
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let pool = &self.problem_pool;

        if pool.target_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PROBLEM_POOL_TARGET_SIZE",
                value: "0".to_string(),
            });
        }

        if pool.low_water > pool.target_size {
            return Err(ConfigError::InvalidValue {
                field: "PROBLEM_POOL_LOW_WATER",
                value: pool.low_water.to_string(),
            });
        }

        if pool.refill_batch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PROBLEM_POOL_REFILL_BATCH",
                value: "0".to_string(),
            });
        }

        if pool.ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PROBLEM_TTL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !is_valid_cache_prefix(&pool.cache_prefix) {
            return Err(ConfigError::InvalidValue {
                field: "PROBLEM_CACHE_PREFIX",
                value: pool.cache_prefix.clone(),
            });
        }

        if self.generator.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GENERATOR_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.admin.first_superuser_password.is_empty() {
            return Err(ConfigError::MissingSecret("FIRST_SUPERUSER_PASSWORD"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    async fn loaded() -> (Settings, tokio::sync::OwnedMutexGuard<()>) {
        let guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");
        (settings, guard)
    }

    #[tokio::test]
    async fn defaults_match_documented_pool_sizing() {
        let (settings, _guard) = loaded().await;
        let pool = settings.problem_pool();

        assert_eq!(settings.server_port(), 5000);
        assert_eq!(pool.target_size, 50);
        assert_eq!(pool.low_water, 25);
        assert_eq!(pool.refill_batch, 10);
        assert_eq!(pool.ttl_seconds, 900);
        assert_eq!(pool.cache_prefix, "exam");
        assert_eq!(settings.generator().max_attempts, 10);
    }

    #[tokio::test]
    async fn rejects_low_water_above_target() {
        let (mut settings, _guard) = loaded().await;
        settings.problem_pool.low_water = 60;

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { field: "PROBLEM_POOL_LOW_WATER", .. })
        ));
    }

    #[tokio::test]
    async fn rejects_zero_batch_ttl_and_attempts() {
        let (settings, _guard) = loaded().await;

        let mut zero_batch = settings.clone();
        zero_batch.problem_pool.refill_batch = 0;
        assert!(zero_batch.validate().is_err());

        let mut zero_ttl = settings.clone();
        zero_ttl.problem_pool.ttl_seconds = 0;
        assert!(zero_ttl.validate().is_err());

        let mut zero_attempts = settings;
        zero_attempts.generator.max_attempts = 0;
        assert!(zero_attempts.validate().is_err());
    }

    #[tokio::test]
    async fn strict_mode_requires_superuser_password() {
        let (mut settings, _guard) = loaded().await;
        settings.runtime.strict_config = true;
        settings.admin.first_superuser_password.clear();

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingSecret("FIRST_SUPERUSER_PASSWORD"))
        ));
    }

    #[tokio::test]
    async fn invalid_port_is_reported() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("PHYSEXAM_PORT", "not-a-port");

        let result = Settings::load();
        std::env::remove_var("PHYSEXAM_PORT");

        assert!(matches!(result, Err(ConfigError::InvalidPort(_))));
    }
}
