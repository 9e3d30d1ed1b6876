const HOST: &str = "0.0.0.0";
const PORT: u16 = 8080;
const DATABASE: &str = "SuperOffers";
const MAX_CSV_BYTES: usize = 5 * 1024 * 1024;

/// Server settings read from the environment. Unparseable values fall back
/// to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
    pub max_csv_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HOST.to_string(),
            port: PORT,
            mongodb_uri: None,
            mongodb_database: DATABASE.to_string(),
            max_csv_bytes: MAX_CSV_BYTES,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            mongodb_uri: std::env::var("MONGODB_URI")
                .ok()
                .filter(|uri| !uri.trim().is_empty()),
            mongodb_database: std::env::var("MONGODB_DATABASE")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(defaults.mongodb_database),
            max_csv_bytes: std::env::var("MAX_CSV_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|bytes| *bytes > 0)
                .unwrap_or(defaults.max_csv_bytes),
        }
    }
}
