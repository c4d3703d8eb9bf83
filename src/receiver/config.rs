//! config file options for a receiver

use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
/// one downstream destination
pub struct ReceiverConfig {
	/// route segment and log identity, a dns label
	#[serde(default)]
	pub name: String,
	/// where rendered messages are posted to
	#[serde(default)]
	pub url: Option<Url>,
	/// template reference, either a template name or inline template source.
	/// Empty forwards messages untouched.
	#[serde(default)]
	pub body: String,
	/// headers added to every downstream request
	#[serde(default)]
	pub additional_headers: HashMap<String, String>,
	/// upper bound of a single downstream request in seconds. Zero or
	/// negative values fall back to the default timeout.
	#[serde(default)]
	pub downstream_timeout: Option<f64>,
}

/// Whether receivers must configure a body template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyPolicy {
	/// an empty body forwards the inbound payload as is
	#[default]
	Optional,
	/// an empty body is a configuration error
	Required,
}

impl From<bool> for BodyPolicy {
	fn from(required: bool) -> Self {
		if required {
			BodyPolicy::Required
		} else {
			BodyPolicy::Optional
		}
	}
}
