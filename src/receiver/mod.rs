//! A receiver forwards alertmanager notifications to one downstream url.
//!
//! Each message is rendered through the receiver's body template (or passed
//! through untouched if it has none) and posted downstream. There are no
//! retries, a failed message is reported back to the sender of the message.

pub mod config;
pub mod error;

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};
use url::Url;

pub use self::{
	config::{BodyPolicy, ReceiverConfig},
	error::{Cancelled, ConfigError, DeliveryError, MessageError},
};
use crate::{alert::AlertData, renderer::TemplateEngine};

/// used if no positive downstream timeout is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[allow(clippy::expect_used)]
static NAME_PATTERN: Lazy<Regex> =
	Lazy::new(|| Regex::new("^[a-zA-Z0-9-]{1,63}$").expect("receiver name pattern is valid"));

/// check if `name` can be used as receiver name
pub fn is_valid_name(name: &str) -> bool {
	NAME_PATTERN.is_match(name)
}

/// Checks the parts of `config` that don't need the template engine, in the
/// order name, url, engine presence, body policy.
pub fn validate(
	config: &ReceiverConfig,
	has_engine: bool,
	policy: BodyPolicy,
) -> Result<(), ConfigError> {
	if !is_valid_name(&config.name) {
		return Err(ConfigError::InvalidName(config.name.clone()));
	}
	if config.url.is_none() {
		return Err(ConfigError::MissingUrl);
	}
	if !has_engine {
		return Err(ConfigError::MissingTemplateEngine);
	}
	if policy == BodyPolicy::Required && config.body.is_empty() {
		return Err(ConfigError::MissingBody);
	}

	Ok(())
}

/// `seconds` as duration, [DEFAULT_TIMEOUT] if unset or not positive
fn effective_timeout(seconds: Option<f64>) -> Result<Duration, ConfigError> {
	match seconds {
		Some(seconds) if seconds > 0.0 => {
			Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::InvalidTimeout(seconds))
		}
		_ => Ok(DEFAULT_TIMEOUT),
	}
}

/// the downstream accepted the request, whatever it answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
	/// status code the downstream answered with
	pub status: StatusCode,
	/// time from sending the request until the response was drained
	pub elapsed: Duration,
}

#[derive(Debug)]
pub struct Receiver {
	client: reqwest::Client,
	engine: Arc<TemplateEngine>,
	config: ReceiverConfig,
	url: Url,
	timeout: Duration,
	/// `None` if no additional headers are configured
	headers: Option<HeaderMap>,
	span: Span,
}

impl Receiver {
	/// Validates `config` and constructs the receiver.
	///
	/// # Arguments
	///
	/// * `engine` - templates shared by all receivers
	///
	/// * `config` - the receiver's configuration
	///
	/// * `policy` - whether an empty body template is allowed
	///
	/// * `span` - span all events of this receiver are recorded in
	pub fn new(
		engine: Option<Arc<TemplateEngine>>,
		config: ReceiverConfig,
		policy: BodyPolicy,
		span: Span,
	) -> Result<Self, ConfigError> {
		validate(&config, engine.is_some(), policy)?;
		let url = config.url.clone().ok_or(ConfigError::MissingUrl)?;
		let engine = engine.ok_or(ConfigError::MissingTemplateEngine)?;
		let timeout = effective_timeout(config.downstream_timeout)?;

		let headers = if config.additional_headers.is_empty() {
			None
		} else {
			let mut headers = HeaderMap::with_capacity(config.additional_headers.len());
			for (name, value) in config.additional_headers.iter() {
				let key = HeaderName::from_bytes(name.as_bytes())
					.map_err(|err| ConfigError::InvalidHeaderName(name.clone(), err))?;
				let value = HeaderValue::from_str(value)
					.map_err(|err| ConfigError::InvalidHeaderValue(name.clone(), err))?;
				headers.append(key, value);
			}
			Some(headers)
		};

		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(ConfigError::HttpClient)?;

		Ok(Self { client, engine, config, url, timeout, headers, span })
	}

	pub fn name(&self) -> &str {
		&self.config.name
	}

	pub fn url(&self) -> &Url {
		&self.url
	}

	/// the effective downstream timeout
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Relays one inbound message: [transform](Self::transform) followed by
	/// [send](Self::send). The first failing stage ends the attempt.
	///
	/// # Arguments
	///
	/// * `cancel` - aborts the downstream request when cancelled
	///
	/// * `input` - the raw inbound request body
	pub async fn new_message(
		&self,
		cancel: &CancellationToken,
		input: Bytes,
	) -> Result<Ack, MessageError> {
		let body = self.transform(input)?;
		self.send(cancel, body).instrument(self.span.clone()).await
	}

	/// Renders `input` through the body template. Without a body template the
	/// input is returned as is and never parsed.
	pub fn transform(&self, input: Bytes) -> Result<Bytes, MessageError> {
		if self.config.body.is_empty() {
			return Ok(input);
		}

		let _enter = self.span.enter();

		let data: AlertData = serde_json::from_slice(&input)
			.map_err(|source| MessageError::Decode { size: input.len(), source })?;

		let text = self.engine.render(&self.config.body, &data).map_err(MessageError::Render)?;

		tracing::trace!(body = %text, "rendered message");

		Ok(Bytes::from(text))
	}

	/// Posts `body` to the downstream url. Only transport failures, the
	/// downstream timeout and cancellation are errors. The response body is
	/// always drained so the connection can be reused.
	pub async fn send(&self, cancel: &CancellationToken, body: Bytes) -> Result<Ack, MessageError> {
		let mut request = self.client.post(self.url.clone()).body(body);
		if let Some(headers) = &self.headers {
			request = request.headers(headers.clone());
		}
		let request = request.build().map_err(MessageError::RequestBuild)?;

		let started = Instant::now();

		let delivery = async {
			let response = self.client.execute(request).await.map_err(DeliveryError::Transport)?;

			Ok::<_, DeliveryError>(drain(response).await)
		};

		let result = tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(DeliveryError::Cancelled(Cancelled)),
			result = delivery => result,
		};

		let status = match result {
			Ok(status) => status,
			Err(err) => {
				tracing::warn!(error = ?err, "request downstream failed");
				return Err(err.into());
			}
		};

		let ack = Ack { status, elapsed: started.elapsed() };

		if status.is_success() {
			tracing::info!(status = %status, "new message delivered");
		} else {
			tracing::warn!(status = %status, "downstream answered with error status");
		}

		Ok(ack)
	}
}

/// Reads the complete response body, which releases the connection back to
/// the pool. The content is only looked at for trace logging.
async fn drain(response: reqwest::Response) -> StatusCode {
	let status = response.status();

	match response.bytes().await {
		Ok(content) => {
			tracing::trace!(
				status = %status,
				response = %String::from_utf8_lossy(&content),
				"downstream response"
			);
		}
		Err(err) => {
			tracing::debug!("failed to drain downstream response: {err}");
		}
	}

	status
}
