//! prometheus alertmanager webhook relay
//!
//! Features:
//! - one webhook url path per configured receiver
//! - alerts are rendered through tera templates before being forwarded
//! - receivers without template forward the webhook payload as is
//! - per receiver downstream timeout and additional headers

use anyhow::{Context, Result};
use prometheus::Registry;
use settings::Settings;
use tokio_util::sync::CancellationToken;

use crate::{alertmanager_webhook_receiver::DispatchTable, renderer::TemplateEngine};

mod alert;
mod alertmanager_webhook_receiver;
mod log;
mod receiver;
mod renderer;
mod settings;
mod telemetry_endpoint;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// cancel `shutdown` on SIGINT or SIGTERM
async fn shutdown_signal(shutdown: CancellationToken) {
	#[cfg(unix)]
	let terminate = async {
		use tokio::signal::unix::{signal, SignalKind};

		match signal(SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(err) => {
				tracing::warn!("could not listen for SIGTERM: {err}");
				std::future::pending::<()>().await;
			}
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		result = tokio::signal::ctrl_c() => {
			if let Err(err) = result {
				tracing::warn!("could not listen for SIGINT: {err}");
				return;
			}
		}
		_ = terminate => {}
	}

	tracing::info!("shutting down");
	shutdown.cancel();
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let settings = Settings::load().context("failed to load config and command line arguments")?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	let engine =
		TemplateEngine::from_globs(&settings.templates).context("parse global templates")?;

	let receivers =
		DispatchTable::new(engine, &settings.receivers, settings.require_body_template.into())
			.context("failed to configure receivers")?;

	if receivers.is_empty() {
		tracing::warn!("no receivers configured");
	}

	let registry = Registry::new();
	let shutdown = CancellationToken::new();

	let router = receivers.router(&registry, shutdown.clone())?;

	tokio::spawn(shutdown_signal(shutdown.clone()));

	if let Some(telemetry) = settings.telemetry_endpoint.clone() {
		let shutdown = shutdown.clone();
		tokio::spawn(async move {
			if let Err(err) =
				telemetry_endpoint::run_telemetry_endpoint(&telemetry, registry, shutdown).await
			{
				tracing::error!("{err:#}");
			}
		});
	}

	alertmanager_webhook_receiver::run_alert_receiver(
		&settings.alert_webhook_receiver,
		router,
		shutdown,
	)
	.await
}
