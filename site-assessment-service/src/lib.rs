pub mod config;
pub mod errors;
pub mod models;
pub mod prompt;
pub mod rate_limit;
pub mod relay;
pub mod service;
pub mod validation;

pub use config::{AllowedOrigins, Config};
pub use errors::AssessError;
pub use models::*;
pub use prompt::{AnalysisRequest, ContentPart, build_analysis_request};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use relay::{AnalysisRelay, CompletionService, OpenAiClient, OpenAiSettings, RelayError};
pub use service::{AppState, build_router};
pub use validation::{UploadPolicy, ValidationError};
