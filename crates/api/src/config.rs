/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `600`; a generation
    /// request stays open until its job settles).
    pub request_timeout_secs: u64,
    /// Base URL of the generation backend service.
    pub backend_url: String,
    /// Postgres connection string. When unset, the server runs on the
    /// in-memory store (single-process, non-durable).
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `8080`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `600`                      |
    /// | `BACKEND_URL`          | `http://localhost:9100`    |
    /// | `DATABASE_URL`         | (unset: in-memory store)   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let backend_url =
            std::env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:9100".into());

        let database_url = std::env::var("DATABASE_URL").ok();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            backend_url,
            database_url,
        }
    }
}
