use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::{
	filter::LevelFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
	EnvFilter,
};

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
	pub level: String,
}

impl Default for LogSettings {
	fn default() -> Self {
		Self { level: String::from("info") }
	}
}

/// `trace` additionally records rendered messages and downstream responses
pub fn setup_logging(settings: &LogSettings) -> Result<()> {
	let level = tracing::Level::from_str(settings.level.as_str())
		.context(format!("invalid log level {}", settings.level))?;

	let fmt_layer = fmt::layer();

	let filter_layer = EnvFilter::default()
		.add_directive(LevelFilter::from_level(level).into())
		.add_directive("hyper=warn".parse()?)
		.add_directive("reqwest=warn".parse()?)
		.add_directive("tera=warn".parse()?);

	tracing_subscriber::registry()
		.with(filter_layer)
		.with(fmt_layer)
		.try_init()
		.context("a global subscriber is already installed")?;

	Ok(())
}
