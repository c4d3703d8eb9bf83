//! data structures for deserializing incoming alerts
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// label and annotation sets, sorted by key so templates render them in a
/// stable order
pub type KV = BTreeMap<String, String>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
/// data from prometheus received by the alertmanager webhook receiver
pub struct AlertData {
	/// webhook payload version
	#[serde(skip_serializing_if = "String::is_empty")]
	pub version: String,
	/// key identifying the alert group
	#[serde(skip_serializing_if = "String::is_empty")]
	pub group_key: String,
	/// number of alerts alertmanager left out of this notification
	#[serde(skip_serializing_if = "is_zero")]
	pub truncated_alerts: u64,

	/// name of the alertmanager receiver this notification was sent to
	pub receiver: String,
	/// `firing` or `resolved`
	pub status: String,
	/// the individual alerts of this group
	pub alerts: Vec<Alert>,
	/// labels the alerts were grouped by
	pub group_labels: KV,
	/// labels shared by all alerts
	pub common_labels: KV,
	/// annotations shared by all alerts
	pub common_annotations: KV,
	/// backlink to the alertmanager
	#[serde(rename = "externalURL")]
	pub external_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// a single alert of an [AlertData] group
pub struct Alert {
	/// `firing` or `resolved`
	pub status: String,
	/// identifying labels of the alert
	#[serde(default)]
	pub labels: KV,
	/// additional information attached to the alert
	#[serde(default)]
	pub annotations: KV,
	/// point in time the alert started firing
	pub starts_at: DateTime<Utc>,
	/// point in time the alert was resolved, zero time while firing
	pub ends_at: DateTime<Utc>,
	/// link to the expression that produced the alert
	#[serde(rename = "generatorURL", default)]
	pub generator_url: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub fingerprint: String,
}

fn is_zero(n: &u64) -> bool {
	*n == 0
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;

	/// the notification used across the receiver tests
	pub(crate) fn echo_yaml_data() -> AlertData {
		let now = Utc::now();

		AlertData {
			receiver: "deliver-to-echo-yaml".to_owned(),
			status: "firing".to_owned(),
			alerts: vec![Alert {
				status: "firing".to_owned(),
				labels: KV::from([("key1".to_owned(), "val1".to_owned())]),
				annotations: KV::from([("key2".to_owned(), "val2".to_owned())]),
				starts_at: now,
				ends_at: now,
				generator_url: "fake/generator".to_owned(),
				fingerprint: String::new(),
			}],
			group_labels: KV::from([("key3".to_owned(), "val3".to_owned())]),
			common_labels: KV::from([("key4".to_owned(), "val4".to_owned())]),
			common_annotations: KV::from([("key5".to_owned(), "val5".to_owned())]),
			external_url: "fake/external".to_owned(),
			..Default::default()
		}
	}

	#[test]
	fn decodes_alertmanager_payload() {
		let payload = r#"{
			"version": "4",
			"groupKey": "{}:{alertname=\"InstanceDown\"}",
			"truncatedAlerts": 0,
			"status": "resolved",
			"receiver": "relay",
			"groupLabels": {"alertname": "InstanceDown"},
			"commonLabels": {"alertname": "InstanceDown", "job": "node"},
			"commonAnnotations": {},
			"externalURL": "http://alertmanager:9093",
			"alerts": [{
				"status": "resolved",
				"labels": {"alertname": "InstanceDown", "instance": "a:9100"},
				"annotations": {"summary": "down"},
				"startsAt": "2022-05-01T10:00:00.000Z",
				"endsAt": "2022-05-01T10:05:00.000Z",
				"generatorURL": "http://prometheus/graph",
				"fingerprint": "c4f8e4f1b2a3d5e6"
			}]
		}"#;

		let data: AlertData = serde_json::from_str(payload).unwrap();

		assert_eq!(data.version, "4");
		assert_eq!(data.status, "resolved");
		assert_eq!(data.alerts.len(), 1);
		assert_eq!(data.alerts[0].labels["instance"], "a:9100");
		assert_eq!(data.alerts[0].fingerprint, "c4f8e4f1b2a3d5e6");
		assert_eq!(data.external_url, "http://alertmanager:9093");
		assert!(data.common_annotations.is_empty());
	}

	#[test]
	fn missing_top_level_fields_default() {
		let data: AlertData = serde_json::from_str(r#"{"receiver": "relay"}"#).unwrap();

		assert_eq!(data.receiver, "relay");
		assert!(data.alerts.is_empty());
	}

	#[test]
	fn wrong_shape_is_rejected() {
		assert!(serde_json::from_str::<AlertData>(r#"{"alerts": "none"}"#).is_err());
		assert!(serde_json::from_str::<AlertData>(r#""firing""#).is_err());
	}

	#[test]
	fn json_projection_roundtrips() {
		let data = echo_yaml_data();
		let json = serde_json::to_string(&data).unwrap();

		assert!(json.contains(r#""externalURL":"fake/external""#));
		assert!(json.contains(r#""generatorURL":"fake/generator""#));
		assert!(!json.contains("groupKey"));
		assert_eq!(serde_json::from_str::<AlertData>(&json).unwrap(), data);
	}
}
