pub mod retry;

use alloy_primitives::U256;
use anyhow::{Context, Result, bail};
use bigdecimal::BigDecimal;
use bigdecimal::num_bigint::{BigInt, Sign};
use std::path::Path;
use tracing::info;

use crate::models::common::Config;

const ENV_PREFIX: &str = "LEDGER";

pub fn load_config<P: AsRef<Path>>(file_name: P) -> Result<Config> {
    let config_path = file_name.as_ref();
    info!("Config path: {}", config_path.to_string_lossy());

    // File first, then LEDGER__SECTION__KEY style environment overrides
    let settings = config::Config::builder()
        .add_source(config::File::from(config_path))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .context("failed to read config file")?;

    let config: Config = settings
        .try_deserialize()
        .context("failed to parse config YAML")?;

    for transformer in &config.transformers {
        // -1 is the only negative ending block, meaning open-ended
        if transformer.ending_block_number < -1 {
            bail!(
                "transformer {}: ending_block_number must be -1 or a block number, got {}",
                transformer.event_name,
                transformer.ending_block_number
            );
        }
    }

    Ok(config)
}

/// Exact decimal rendering of a 256-bit integer scaled by `10^-scale`.
pub fn u256_to_decimal(value: U256, scale: i64) -> BigDecimal {
    let digits = BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>());
    BigDecimal::new(digits, scale)
}

pub(crate) fn strip_html(error: &str) -> String {
    // If the error contains HTML tags, extract just the text content
    if error.contains("<!doctype html>") || error.contains("<html>") {
        // Remove all HTML tags and return the first non-empty line of text
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && !line.starts_with("<!")
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        // Return original error if no HTML
        error.to_string()
    }
}
