//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → converted into breaker options / retry policy at the composition root
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; breakers keep the options they were created with
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BatchConfig, CircuitBreakerConfig, CircuitBreakerSettings, IdempotencyConfig,
    ObservabilityConfig, OptimisticLockConfig, ResilienceConfig, RetryConfig,
};
pub use validation::{validate_config, ValidationError};
