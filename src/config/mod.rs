use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub groq: GroqConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub eval: EvalConfig,
}

/// Groq chat-completions API configuration
#[derive(Debug, Clone)]
pub struct GroqConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Artifact store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Sqlite,
}

/// Artifact store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub output_dir: PathBuf,
    pub database: DatabaseConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    /// Fixed backoff before the single retry of a rate-limited call.
    pub retry_delay_ms: u64,
}

/// Relative weights of the persona difficulty tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonaMix {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

/// Evaluation loop configuration
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub num_personas: usize,
    pub max_iterations: u32,
    pub threshold: f64,
    pub max_turns: usize,
    pub persona_mix: PersonaMix,
    pub temperature_conversation: f64,
    pub temperature_evaluation: f64,
    pub temperature_structured: f64,
    pub temperature_rewrite: f64,
    pub pacing_delay_ms: u64,
    pub seed_script_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let groq = GroqConfig {
            api_key: env::var("GROQ_API_KEY").map_err(|_| AppError::Config {
                message: "GROQ_API_KEY is required".to_string(),
            })?,
            base_url: env::var("GROQ_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai".to_string()),
            model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string()),
        };

        let backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "file".to_string())
            .to_lowercase()
            .as_str()
        {
            "file" => StoreBackend::File,
            "sqlite" => StoreBackend::Sqlite,
            other => {
                return Err(AppError::Config {
                    message: format!("STORE_BACKEND must be 'file' or 'sqlite', got '{}'", other),
                })
            }
        };

        let store = StoreConfig {
            backend,
            output_dir: PathBuf::from(
                env::var("OUTPUT_DIR").unwrap_or_else(|_| "./output".to_string()),
            ),
            database: DatabaseConfig {
                path: PathBuf::from(
                    env::var("DATABASE_PATH")
                        .unwrap_or_else(|_| "./data/artifacts.db".to_string()),
                ),
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            },
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 60_000)?,
            retry_delay_ms: parse_or("RETRY_DELAY_MS", 5_000)?,
        };

        let persona_mix = match env::var("PERSONA_MIX") {
            Ok(raw) => PersonaMix::parse(&raw)?,
            Err(_) => PersonaMix::default(),
        };

        let eval = EvalConfig {
            num_personas: parse_or("NUM_PERSONAS", 6)?,
            max_iterations: parse_or("MAX_ITERATIONS", 4)?,
            threshold: parse_or("SCORE_THRESHOLD", 7.5)?,
            max_turns: parse_or("MAX_TURNS", 20)?,
            persona_mix,
            temperature_conversation: parse_or("TEMPERATURE_CONVERSATION", 0.7)?,
            temperature_evaluation: parse_or("TEMPERATURE_EVALUATION", 0.2)?,
            temperature_structured: parse_or("TEMPERATURE_STRUCTURED", 0.3)?,
            temperature_rewrite: parse_or("TEMPERATURE_REWRITE", 0.4)?,
            pacing_delay_ms: parse_or("PACING_DELAY_MS", 500)?,
            seed_script_path: env::var("SEED_SCRIPT_PATH").ok().map(PathBuf::from),
        };
        eval.validate()?;

        Ok(Config {
            groq,
            store,
            logging,
            request,
            eval,
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| AppError::Config {
            message: format!("{} has an invalid value: '{}'", key, raw),
        }),
        Err(_) => Ok(default),
    }
}

impl EvalConfig {
    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.num_personas == 0 {
            return Err(AppError::Config {
                message: "NUM_PERSONAS must be at least 1".to_string(),
            });
        }
        if self.max_iterations == 0 {
            return Err(AppError::Config {
                message: "MAX_ITERATIONS must be at least 1".to_string(),
            });
        }
        if !(1.0..=10.0).contains(&self.threshold) {
            return Err(AppError::Config {
                message: format!("SCORE_THRESHOLD must be within 1-10, got {}", self.threshold),
            });
        }
        if self.max_turns < 2 {
            return Err(AppError::Config {
                message: "MAX_TURNS must be at least 2".to_string(),
            });
        }
        Ok(())
    }
}

impl PersonaMix {
    /// Parse `easy,medium,hard` weights, e.g. `1,2,3`.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let parts: Vec<u32> = raw
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|_| AppError::Config {
                message: format!("PERSONA_MIX must be three integers, got '{}'", raw),
            })?;

        match parts.as_slice() {
            [easy, medium, hard] if easy + medium + hard > 0 => Ok(Self {
                easy: *easy,
                medium: *medium,
                hard: *hard,
            }),
            _ => Err(AppError::Config {
                message: format!("PERSONA_MIX must be three non-zero-sum integers, got '{}'", raw),
            }),
        }
    }

    /// Split `count` personas across tiers in proportion to the weights.
    ///
    /// Largest-remainder apportionment; ties go to the harder tier.
    /// Returns `(easy, medium, hard)`.
    pub fn apportion(&self, count: usize) -> (usize, usize, usize) {
        let weights = [self.easy as usize, self.medium as usize, self.hard as usize];
        let total: usize = weights.iter().sum();
        if total == 0 {
            return (0, 0, count);
        }

        let mut shares = [0usize; 3];
        let mut remainders = [0usize; 3];
        for (i, w) in weights.iter().enumerate() {
            shares[i] = count * w / total;
            remainders[i] = count * w % total;
        }

        let mut left = count - shares.iter().sum::<usize>();
        // hardest first so ties resolve upward
        let mut order = [2usize, 1, 0];
        order.sort_by(|a, b| remainders[*b].cmp(&remainders[*a]));
        for i in order {
            if left == 0 {
                break;
            }
            shares[i] += 1;
            left -= 1;
        }

        (shares[0], shares[1], shares[2])
    }
}

impl Default for PersonaMix {
    fn default() -> Self {
        Self {
            easy: 1,
            medium: 2,
            hard: 3,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            retry_delay_ms: 5_000,
        }
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            num_personas: 6,
            max_iterations: 4,
            threshold: 7.5,
            max_turns: 20,
            persona_mix: PersonaMix::default(),
            temperature_conversation: 0.7,
            temperature_evaluation: 0.2,
            temperature_structured: 0.3,
            temperature_rewrite: 0.4,
            pacing_delay_ms: 500,
            seed_script_path: None,
        }
    }
}
