use bigdecimal::BigDecimal;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub tolerance: ToleranceConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 为空时使用内存单据库
    #[serde(default)]
    pub url: Option<String>,
}

/// 容差带 (比率), 以及录入金额校验容差 (货币单位)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToleranceConfig {
    pub quantity: f64,
    pub price: f64,
    pub epsilon: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 单据库调用超时 (秒)
    pub timeout_secs: u64,
    /// 批量核验时并发加载单据的上限
    pub batch_concurrency: usize,
}

/// 分类使用的精确十进制容差
#[derive(Debug, Clone, PartialEq)]
pub struct Tolerances {
    pub quantity: BigDecimal,
    pub price: BigDecimal,
    pub epsilon: BigDecimal,
    pub amount: BigDecimal,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            quantity: BigDecimal::new(10.into(), 2),
            price: BigDecimal::new(5.into(), 2),
            epsilon: BigDecimal::new(1.into(), 4),
            amount: BigDecimal::new(1.into(), 2),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            tolerance: ToleranceConfig {
                quantity: 0.10,
                price: 0.05,
                epsilon: 0.0001,
                amount: 0.01,
            },
            store: StoreConfig {
                timeout_secs: 10,
                batch_concurrency: 8,
            },
        }
    }
}

impl AppConfig {
    /// 加载配置: 默认值 → matcher.toml (可选) → MATCHER__* 环境变量 → 兼容旧环境变量
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080_i64)?
            .set_default("tolerance.quantity", 0.10)?
            .set_default("tolerance.price", 0.05)?
            .set_default("tolerance.epsilon", 0.0001)?
            .set_default("tolerance.amount", 0.01)?
            .set_default("store.timeout_secs", 10_i64)?
            .set_default("store.batch_concurrency", 8_i64)?
            .add_source(File::with_name("matcher").required(false))
            .add_source(
                Environment::with_prefix("MATCHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .build()?
            .try_deserialize()
    }

    /// 非空的数据库地址
    pub fn database_url(&self) -> Option<&str> {
        self.database
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs)
    }

    /// 转换为精确十进制容差并校验
    pub fn tolerances(&self) -> Result<Tolerances, ConfigError> {
        let t = &self.tolerance;
        let tolerances = Tolerances {
            quantity: to_decimal("tolerance.quantity", t.quantity)?,
            price: to_decimal("tolerance.price", t.price)?,
            epsilon: to_decimal("tolerance.epsilon", t.epsilon)?,
            amount: to_decimal("tolerance.amount", t.amount)?,
        };
        if tolerances.epsilon >= tolerances.quantity || tolerances.epsilon >= tolerances.price {
            return Err(ConfigError::Message(
                "tolerance.epsilon must be smaller than the quantity and price bands".to_string(),
            ));
        }
        Ok(tolerances)
    }
}

fn to_decimal(key: &str, value: f64) -> Result<BigDecimal, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Message(format!(
            "{} must be a finite, non-negative number (got {})",
            key, value
        )));
    }
    // f64 的 Display 输出最短表示, 0.1 => "0.1"
    BigDecimal::from_str(&value.to_string())
        .map_err(|e| ConfigError::Message(format!("{}: {}", key, e)))
}
