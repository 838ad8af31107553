/// Time source shared by the cache and the evaluator.
pub mod clock;
/// TOML configuration loading and validation.
pub mod toml_config;
