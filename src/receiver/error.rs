//! errors of receiver construction and message handling

use http::header::{InvalidHeaderName, InvalidHeaderValue};
use thiserror::Error;

/// A receiver configuration was rejected. Fatal to startup.
#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("invalid receiver name {0:?}, expected 1 to 63 letters, digits or hyphens")]
	InvalidName(String),
	#[error("no url in receiver configuration")]
	MissingUrl,
	#[error("no template engine")]
	MissingTemplateEngine,
	/// only raised if body templates are required by policy
	#[error("no body template in receiver configuration")]
	MissingBody,
	/// the body neither names a loaded template nor is inline template source
	#[error("body template {0:?} is not defined")]
	UnknownTemplate(String),
	#[error("downstream timeout of {0} seconds is out of range")]
	InvalidTimeout(f64),
	#[error("invalid additional header name {0:?}")]
	InvalidHeaderName(String, #[source] InvalidHeaderName),
	#[error("invalid value for additional header {0:?}")]
	InvalidHeaderValue(String, #[source] InvalidHeaderValue),
	#[error("could not build http client")]
	HttpClient(#[source] reqwest::Error),
}

/// A single message could not be relayed. Reported to the sender of the
/// message, other messages are unaffected.
#[derive(Error, Debug)]
pub enum MessageError {
	#[error("decode message of {size} bytes")]
	Decode {
		/// size of the undecodable input
		size: usize,
		#[source]
		source: serde_json::Error,
	},
	#[error("execute template")]
	Render(#[source] tera::Error),
	/// unreachable for validated receivers
	#[error("build downstream request")]
	RequestBuild(#[source] reqwest::Error),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
}

impl MessageError {
	/// short name of the failed stage, used as metric label
	pub fn kind(&self) -> &'static str {
		match self {
			MessageError::Decode { .. } => "decode",
			MessageError::Render(_) => "render",
			MessageError::RequestBuild(_) => "request",
			MessageError::Delivery(_) => "delivery",
		}
	}
}

/// The downstream could not be reached or the request was aborted.
/// Responses with an error status code are not delivery errors.
#[derive(Error, Debug)]
pub enum DeliveryError {
	#[error("post request cancelled")]
	Cancelled(#[source] Cancelled),
	#[error("post request failed")]
	Transport(#[source] reqwest::Error),
}

impl DeliveryError {
	pub fn is_cancelled(&self) -> bool {
		matches!(self, DeliveryError::Cancelled(_))
	}

	/// check if the receiver's downstream timeout elapsed
	pub fn is_timeout(&self) -> bool {
		matches!(self, DeliveryError::Transport(err) if err.is_timeout())
	}
}

/// the request was cancelled before the downstream answered
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("request cancelled")]
pub struct Cancelled;
