//! The alertmanager webhook endpoint. Each configured receiver is reachable
//! at `POST /<receiver name>`.

use std::{
	collections::{HashMap, HashSet},
	net::{IpAddr, SocketAddr},
	sync::Arc,
};

use anyhow::{bail, Context, Result};
use axum::{
	body::Bytes,
	extract::{Extension, Path},
	http::StatusCode,
	routing::post,
	Router,
};
use prometheus::{HistogramVec, IntCounterVec, Registry};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
	receiver::{self, BodyPolicy, ConfigError, Receiver, ReceiverConfig},
	renderer::TemplateEngine,
};

#[derive(Debug, Deserialize, Clone)]
pub struct AlertReceiverSettings {
	pub bind_address: IpAddr,
	pub port: u16,
}

impl Default for AlertReceiverSettings {
	fn default() -> Self {
		Self { bind_address: IpAddr::from([0, 0, 0, 0]), port: 41357 }
	}
}

impl AlertReceiverSettings {
	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind_address, self.port)
	}
}

/// prometheus meters of the webhook endpoint
#[derive(Debug, Clone)]
struct Metrics {
	/// relayed messages by receiver and outcome
	messages: IntCounterVec,
	/// time spent waiting for the downstream
	downstream_duration: HistogramVec,
}

impl Metrics {
	fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		use prometheus::{exponential_buckets, histogram_opts, opts};

		let messages = IntCounterVec::new(
			opts!("messages_total", "total number of received messages by outcome")
				.namespace("alertrelay")
				.subsystem("webhook"),
			&["receiver", "outcome"],
		)?;

		let downstream_duration = HistogramVec::new(
			histogram_opts!(
				"downstream_duration_seconds",
				"time until the downstream response was drained",
				exponential_buckets(0.01, 2., 12)?
			)
			.namespace("alertrelay")
			.subsystem("webhook"),
			&["receiver"],
		)?;

		registry.register(Box::new(messages.clone()))?;
		registry.register(Box::new(downstream_duration.clone()))?;

		Ok(Self { messages, downstream_duration })
	}
}

/// Makes `body` renderable: inline template source is compiled into `engine`,
/// anything else has to name a loaded template.
fn resolve_body(engine: &mut TemplateEngine, body: &str) -> Result<()> {
	if body.is_empty() {
		return Ok(());
	}

	if TemplateEngine::is_inline(body) {
		engine.register_inline(body)
	} else if engine.contains(body) {
		Ok(())
	} else {
		Err(ConfigError::UnknownTemplate(body.to_owned()).into())
	}
}

/// One [Receiver] per configured name
#[derive(Debug)]
pub struct DispatchTable {
	receivers: HashMap<String, Receiver>,
}

impl DispatchTable {
	/// Constructs all receivers. Any invalid receiver fails the whole table,
	/// a partially registered route set is never served.
	///
	/// # Arguments
	///
	/// * `engine` - the loaded templates, inline body templates get added to it
	///
	/// * `configs` - the configured receivers
	///
	/// * `policy` - whether receivers need a body template
	pub fn new(
		mut engine: TemplateEngine,
		configs: &[ReceiverConfig],
		policy: BodyPolicy,
	) -> Result<Self> {
		let mut names = HashSet::with_capacity(configs.len());

		for config in configs.iter() {
			if !names.insert(config.name.as_str()) {
				bail!("config receiver {}: duplicate receiver name", config.name);
			}
			receiver::validate(config, true, policy)
				.context(format!("config receiver {}", config.name))?;
			resolve_body(&mut engine, &config.body)
				.context(format!("config receiver {}", config.name))?;
		}

		let engine = Arc::new(engine);
		let mut receivers = HashMap::with_capacity(configs.len());

		for config in configs.iter() {
			let span = tracing::info_span!("receiver", name = %config.name);
			let receiver = Receiver::new(Some(Arc::clone(&engine)), config.clone(), policy, span)
				.context(format!("config receiver {}", config.name))?;

			tracing::info!(receiver = %receiver.name(), url = %receiver.url(), "receiver registered");
			receivers.insert(receiver.name().to_owned(), receiver);
		}

		Ok(Self { receivers })
	}

	pub fn get(&self, name: &str) -> Option<&Receiver> {
		self.receivers.get(name)
	}

	pub fn len(&self) -> usize {
		self.receivers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.receivers.is_empty()
	}

	/// Routes `POST /:name` to the receiver called `name`.
	///
	/// # Arguments
	///
	/// * `registry` - where the endpoint's meters are registered
	///
	/// * `shutdown` - cancelling it aborts all in-flight downstream requests
	pub fn router(self, registry: &Registry, shutdown: CancellationToken) -> Result<Router> {
		let metrics = Metrics::new(registry).context("failed to register prometheus meters")?;
		let state = Arc::new(State { receivers: self, metrics, shutdown });

		Ok(Router::new().route("/:name", post(relay_message)).layer(Extension(state)))
	}
}

struct State {
	receivers: DispatchTable,
	metrics: Metrics,
	shutdown: CancellationToken,
}

async fn relay_message(
	Extension(state): Extension<Arc<State>>,
	Path(name): Path<String>,
	body: Bytes,
) -> (StatusCode, String) {
	let State { receivers, metrics, shutdown } = &*state;

	let receiver = match receivers.get(&name) {
		Some(receiver) => receiver,
		None => {
			metrics.messages.with_label_values(&["", "unknown_receiver"]).inc();
			return (StatusCode::NOT_FOUND, format!("no receiver {name}"));
		}
	};

	tracing::info!(receiver = %name, "new message");

	let cancel = shutdown.child_token();
	match receiver.new_message(&cancel, body).await {
		Ok(ack) => {
			metrics.messages.with_label_values(&[name.as_str(), "delivered"]).inc();
			metrics
				.downstream_duration
				.with_label_values(&[name.as_str()])
				.observe(ack.elapsed.as_secs_f64());

			(StatusCode::OK, String::new())
		}
		Err(err) => {
			metrics.messages.with_label_values(&[name.as_str(), err.kind()]).inc();

			let err = anyhow::Error::new(err);
			tracing::error!(receiver = %name, "send message to downstream: {err:#}");

			(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
		}
	}
}

/// serve `router` until `shutdown` is cancelled
pub async fn run_alert_receiver(
	settings: &AlertReceiverSettings,
	router: Router,
	shutdown: CancellationToken,
) -> Result<()> {
	let addr = settings.to_socket_addr();

	tracing::info!("listening for alerts on {addr}");

	axum::Server::try_bind(&addr)
		.context(format!("could not bind {addr}"))?
		.serve(router.into_make_service())
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await
		.context("alertmanager webhook endpoint crashed")?;

	Ok(())
}
