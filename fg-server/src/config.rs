use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load the configuration from a YAML file.
    pub fn load(yml_path: &str) -> anyhow::Result<Self> {
        let yml = std::fs::read_to_string(yml_path)?;
        Self::from_yaml(&yml)
    }

    pub fn from_yaml(yml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yml)?;
        Ok(config)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub tls: Option<TLSConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:3000".into(),
            tls: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TLSConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/foodgram.db".into(),
        }
    }
}

/// Limits applied by the API layer.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Page size when the caller does not pass `limit`
    pub page_size: u32,
    pub max_page_size: u32,
    pub ingredient_min_amount: i64,
    pub ingredient_max_amount: i64,
    pub cooking_time_min: i64,
    pub cooking_time_max: i64,
    /// Upper bound on a decoded recipe image, in bytes
    pub max_image_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            page_size: 6,
            max_page_size: 100,
            ingredient_min_amount: 1,
            ingredient_max_amount: 32767,
            cooking_time_min: 1,
            cooking_time_max: 32767,
            max_image_bytes: 20_000_000,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Where `access.log` goes. Defaults to the working directory.
    pub directory: Option<String>,
}
