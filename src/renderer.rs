//! Renders alerts via tera templates.
//!
//! Templates are loaded once at startup from the configured globs. Receivers
//! reference a template either by name or by inline source, which is compiled
//! into the same [Tera] instance with [TemplateEngine::register_inline]. After
//! startup the engine is only read, so one instance is shared by all receivers.

use anyhow::{Context, Result};
use tera::Tera;

use crate::alert::AlertData;

/// the shared template set
#[derive(Debug)]
pub struct TemplateEngine {
	tera: Tera,
}

impl Default for TemplateEngine {
	fn default() -> Self {
		let mut tera = Tera::default();
		// rendered bodies are forwarded verbatim, whatever format they are in
		tera.autoescape_on(vec![]);

		Self { tera }
	}
}

impl TemplateEngine {
	/// Loads every template file matched by `globs`. A template is named by its
	/// path relative to the directory its glob starts in.
	///
	/// # Arguments
	///
	/// * `globs` - e.g. `["./templates/*.tmpl", "/etc/alertrelay/**/*"]`
	pub fn from_globs<S: AsRef<str>>(globs: &[S]) -> Result<Self> {
		let mut engine = Self::default();

		for glob in globs {
			let glob = glob.as_ref();
			tracing::info!("load templates from {glob}");

			let tera = Tera::new(glob).context(format!("could not parse templates {glob}"))?;
			engine
				.tera
				.extend(&tera)
				.context(format!("could not merge templates {glob}"))?;
		}

		Ok(engine)
	}

	/// Compiles an inline template source and makes it available under its own
	/// source text. References that already name a loaded template are left
	/// untouched.
	pub fn register_inline(&mut self, source: &str) -> Result<()> {
		if self.contains(source) {
			return Ok(());
		}

		self.tera
			.add_raw_template(source, source)
			.context(format!("could not compile inline template {source:?}"))
	}

	/// check if `reference` is template source rather than a template name
	pub fn is_inline(reference: &str) -> bool {
		["{{", "{%", "{#"].iter().any(|delimiter| reference.contains(delimiter))
	}

	/// check if `reference` resolves to a template
	pub fn contains(&self, reference: &str) -> bool {
		self.tera.templates.contains_key(reference)
	}

	/// Renders `data` with the template named by `reference`. Unknown
	/// references and undefined variables are errors.
	pub fn render(&self, reference: &str, data: &AlertData) -> Result<String, tera::Error> {
		let context = tera::Context::from_serialize(data)?;

		self.tera.render(reference, &context)
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use std::{fs, path::Path};

	use super::*;
	use crate::alert::tests::echo_yaml_data;

	/// yaml projection of an [AlertData], shipped in `demos/templates`
	pub(crate) const ECHO_YAML: &str = "receiver: {{ receiver }}
status: {{ status }}
alerts:{% for alert in alerts %}
- status: {{ alert.status }}
  labels:{% for key, value in alert.labels %}
    {{ key }}: {{ value }}{% endfor %}
  annotations:{% for key, value in alert.annotations %}
    {{ key }}: {{ value }}{% endfor %}{% endfor %}
groupLabels:{% for key, value in groupLabels %}
  {{ key }}: {{ value }}{% endfor %}
commonLabels:{% for key, value in commonLabels %}
  {{ key }}: {{ value }}{% endfor %}
commonAnnotations:{% for key, value in commonAnnotations %}
  {{ key }}: {{ value }}{% endfor %}";

	pub(crate) const ECHO_YAML_OUTPUT: &str = "receiver: deliver-to-echo-yaml
status: firing
alerts:
- status: firing
  labels:
    key1: val1
  annotations:
    key2: val2
groupLabels:
  key3: val3
commonLabels:
  key4: val4
commonAnnotations:
  key5: val5";

	/// engine with `example.echo-yaml` loaded from a temporary template directory
	pub(crate) fn echo_yaml_engine(dir: &Path) -> TemplateEngine {
		fs::write(dir.join("example.echo-yaml"), ECHO_YAML).unwrap();

		let glob = format!("{}/*", dir.display());
		TemplateEngine::from_globs(&[glob]).unwrap()
	}

	#[test]
	fn renders_named_template() {
		let dir = tempfile::tempdir().unwrap();
		let engine = echo_yaml_engine(dir.path());

		assert!(engine.contains("example.echo-yaml"));
		assert_eq!(engine.render("example.echo-yaml", &echo_yaml_data()).unwrap(), ECHO_YAML_OUTPUT);
	}

	#[test]
	fn renders_inline_template_including_named_one() {
		let dir = tempfile::tempdir().unwrap();
		let mut engine = echo_yaml_engine(dir.path());
		let inline = r#"{% include "example.echo-yaml" %}"#;

		engine.register_inline(inline).unwrap();

		assert_eq!(engine.render(inline, &echo_yaml_data()).unwrap(), ECHO_YAML_OUTPUT);
	}

	#[test]
	fn inline_reference_does_not_shadow_named_template() {
		let dir = tempfile::tempdir().unwrap();
		let mut engine = echo_yaml_engine(dir.path());

		engine.register_inline("example.echo-yaml").unwrap();

		assert_eq!(engine.render("example.echo-yaml", &echo_yaml_data()).unwrap(), ECHO_YAML_OUTPUT);
	}

	#[test]
	fn does_not_escape_output() {
		let mut engine = TemplateEngine::default();
		engine.register_inline("{{ externalURL }}").unwrap();

		let mut data = echo_yaml_data();
		data.external_url = "http://am/#/alerts?a=<b>&c".to_owned();

		assert_eq!(engine.render("{{ externalURL }}", &data).unwrap(), data.external_url);
	}

	#[test]
	fn unknown_reference_fails() {
		let engine = TemplateEngine::default();

		assert!(engine.render("nope", &echo_yaml_data()).is_err());
	}

	#[test]
	fn undefined_variable_fails() {
		let mut engine = TemplateEngine::default();
		engine.register_inline("{{ alerts.0.nonexistent }}").unwrap();

		assert!(engine.render("{{ alerts.0.nonexistent }}", &echo_yaml_data()).is_err());
	}

	#[test]
	fn invalid_inline_template_is_rejected() {
		let mut engine = TemplateEngine::default();

		assert!(engine.register_inline("{% for %}").is_err());
	}

	#[test]
	fn loads_demo_templates() {
		let glob = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/templates/*");
		let engine = TemplateEngine::from_globs(&[glob]).unwrap();

		let rendered = engine.render("example.echo-yaml", &echo_yaml_data()).unwrap();
		assert_eq!(rendered.trim_end(), ECHO_YAML_OUTPUT);

		let rendered = engine.render("example.chat-json", &echo_yaml_data()).unwrap();
		assert_eq!(rendered.trim_end(), r#"{"text": "[FIRING] alert"}"#);
	}

	#[test]
	fn demo_chat_template_uses_summary() {
		let glob = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/templates/*");
		let engine = TemplateEngine::from_globs(&[glob]).unwrap();

		let mut data = echo_yaml_data();
		data.status = "resolved".to_owned();
		data.common_annotations.insert("summary".to_owned(), "disk \"full\"".to_owned());

		let rendered = engine.render("example.chat-json", &data).unwrap();
		assert_eq!(rendered.trim_end(), r#"{"text": "[RESOLVED] disk \"full\""}"#);
	}

	#[test]
	fn detects_inline_source() {
		assert!(TemplateEngine::is_inline("{{ status }}"));
		assert!(TemplateEngine::is_inline(r#"{% include "example.echo-yaml" %}"#));
		assert!(TemplateEngine::is_inline("{# nothing #}"));
		assert!(!TemplateEngine::is_inline("example.echo-yml"));
		assert!(!TemplateEngine::is_inline(""));
	}
}
