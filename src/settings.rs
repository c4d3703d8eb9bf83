use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment};
use serde::Deserialize;

use crate::{
	alertmanager_webhook_receiver::AlertReceiverSettings, log::LogSettings,
	receiver::ReceiverConfig, telemetry_endpoint::TelemetryEndpointSettings,
};

/// prefix of environment variables overriding config file options
const ENV_PREFIX: &str = "ALERTRELAY";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	/// globs of template files shared by all receivers
	#[serde(default)]
	pub templates: Vec<String>,
	#[serde(default)]
	pub receivers: Vec<ReceiverConfig>,
	/// reject receivers without body template instead of forwarding the
	/// inbound payload as is
	#[serde(default)]
	pub require_body_template: bool,
	#[serde(default)]
	pub alert_webhook_receiver: AlertReceiverSettings,
	#[serde(default)]
	pub telemetry_endpoint: Option<TelemetryEndpointSettings>,
	#[serde(default)]
	pub log: LogSettings,
}

impl Settings {
	/// load settings from the config file and environment, then apply command
	/// line overrides
	pub fn load() -> Result<Self> {
		let opts = Command::new(clap::crate_name!())
			.version(clap::crate_version!())
			.about(clap::crate_description!())
			.author(clap::crate_authors!())
			.args(&[
				Arg::new("config")
					.help("path of config file")
					.takes_value(true)
					.short('c')
					.long("config")
					.default_value("./config.yaml"),
				Arg::new("level")
					.help("log level")
					.possible_values(["error", "warn", "info", "debug", "trace"])
					.ignore_case(true)
					.takes_value(true)
					.long("log"),
				Arg::new("verbose")
					.help("log rendered messages and downstream responses, same as --log trace")
					.short('v')
					.long("verbose"),
				Arg::new("address")
					.help("listen address of the alert webhook receiver, e.g. 0.0.0.0:41357")
					.takes_value(true)
					.long("address"),
			])
			.get_matches();

		let config_path = opts.value_of("config").context("no config path")?;

		let builder = Config::builder().add_source(config::File::with_name(config_path));
		let mut settings = Self::from_builder(builder).context("can't load config")?;

		settings.apply_overrides(&opts)?;

		Ok(settings)
	}

	/// deserialize settings from `builder` overlaid with `ALERTRELAY__*`
	/// environment variables
	pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
		let settings = builder
			.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
			.build()?
			.try_deserialize()?;

		Ok(settings)
	}

	fn apply_overrides(&mut self, opts: &ArgMatches) -> Result<()> {
		if let Some(level) = opts.value_of("level") {
			self.log.level = level.to_string();
		}

		if opts.is_present("verbose") {
			self.log.level = String::from("trace");
		}

		if let Some(address) = opts.value_of("address") {
			let address: SocketAddr =
				address.parse().context(format!("invalid listen address {address}"))?;
			self.alert_webhook_receiver.bind_address = address.ip();
			self.alert_webhook_receiver.port = address.port();
		}

		Ok(())
	}
}
