#![doc(html_root_url = "https://docs.rs/freshcheck/0.1.0")]
#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

//! # freshcheck
//!
//! Decide whether a photographed food item is fresh or rotten by comparing its
//! image embedding against user-supplied reference images, blended with a
//! pixel-color heuristic.
//!
//! ## Features
//!
//! - **Similarity scoring**: cosine similarity of a test embedding against fresh
//!   and rotten reference sets
//! - **Color heuristic**: share of brown or dark pixels on a downsampled canvas
//! - **Verdicts**: a fixed weighted blend of both, clamped to `[0, 1]`, with a
//!   human-readable reason
//! - **Embeddings**: a libtorch ResNet feature extractor (`torch` feature)
//! - **Web API**: per-session HTTP endpoints for references and checks (`api`
//!   feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use freshcheck::{load_image, load_model, FoodClass, FreshnessChecker, ModelConfig, Result};
//!
//! # async fn run() -> Result<()> {
//! let model = load_model(&ModelConfig::default()).await?;
//! let mut checker = FreshnessChecker::new();
//!
//! checker.add_references(model.as_ref(), FoodClass::Fresh, &[load_image("fresh.jpg")?])?;
//! let verdict = checker.check(model.as_ref(), &load_image("test.jpg")?)?;
//! println!("{}", verdict);
//! # Ok(())
//! # }
//! ```

// Internal modules
#[cfg(feature = "api")]
pub mod api;
pub mod checker;
pub mod core;
/// Defines the application's error types and result aliases.
pub mod error;
pub mod models;
mod state;
mod utils;

/// Package and build metadata generated by `build.rs`.
#[allow(dead_code, missing_docs, unreachable_pub)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// Public API exports
pub use crate::{
    checker::{evaluate, FreshnessChecker},
    core::{
        color::color_ratio,
        embeddings::{load_model, Embedding, EmbeddingProvider},
        scoring::{aggregate, ROTTEN_THRESHOLD},
        similarity::{average_similarity, cosine_similarity},
    },
    error::{AppError, Result, ResultExt},
    models::{
        references::{FoodClass, ReferenceSet, ReferenceState},
        verdict::Verdict,
    },
    state::{
        Activity, ActivityGuard, AppState, Config, ModelConfig, ModelState, ModelStatus, Session,
    },
    utils::{decode_image, load_image},
};

#[cfg(feature = "api")]
pub use crate::api::{create_router, health_check};

/// Initialize the application with default settings
///
/// This function loads a `.env` file if present and sets up logging.
/// It should be called early in the application startup process.
///
/// # Errors
///
/// Returns an error if logging initialization fails.
///
/// # Example
///
/// ```no_run
/// use freshcheck::init;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     init()?;
///     // Application code here
///     Ok(())
/// }
/// ```
pub fn init() -> Result<()> {
    // A missing .env file is normal
    let dotenv_path = dotenv::dotenv().ok();

    // Initialize logging with sensible defaults
    let env = env_logger::Env::default()
        .default_filter_or("info")
        .default_write_style_or("auto");

    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .map_err(|e| AppError::Internal(format!("logger already initialized: {}", e)))?;

    if let Some(path) = dotenv_path {
        log::debug!("Loaded environment from {}", path.display());
    }
    log::info!(
        "Initializing freshcheck {} (built {})",
        built_info::PKG_VERSION,
        built_info::BUILT_TIME_UTC
    );
    Ok(())
}
