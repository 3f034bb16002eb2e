//! Global default model pricing
//!
//! Rows are `(hosting_provider, model_name, input_price_per_million,
//! output_price_per_million)` in USD. The PostgreSQL schema seeds the same
//! rows in `DEFAULT_DATA`.

pub const DEFAULT_MODEL_PRICING: &[(&str, &str, &str, &str)] = &[
    ("openai", "gpt-4-turbo", "10", "30"),
    ("openai", "gpt-4", "30", "60"),
    ("openai", "gpt-3.5-turbo", "0.5", "1.5"),
    ("openai", "gpt-4o", "2.5", "10"),
    ("openai", "gpt-4o-mini", "0.15", "0.6"),
    ("anthropic", "claude-3-opus-20240229", "15", "75"),
    ("anthropic", "claude-3-sonnet-20240229", "3", "15"),
    ("anthropic", "claude-3-haiku-20240307", "0.25", "1.25"),
    ("anthropic", "claude-3-5-sonnet-20241022", "3", "15"),
    ("azure", "gpt-4-turbo", "10", "30"),
    ("azure", "gpt-4", "30", "60"),
    ("azure", "gpt-35-turbo", "0.5", "1.5"),
];
