//! Emergency reports and the outbound dispatcher.
//!
//! A tourist's emergency action turns into an [`EmergencyReport`] that is handed
//! to a [`Dispatcher`] together with a [`Channel`]. Delivery is a single
//! attempt bounded by a request timeout. A failed or timed-out dispatch is
//! reported back to the caller and leaves no record behind.
//!
//! A missing location never fails the report: [`LocationFix::describe`]
//! degrades to placeholder text.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::Role;
use crate::error::{Error, Result};

/// Outcome of the device's geolocation lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationFix {
    Coordinates { latitude: f64, longitude: f64 },
    /// The device has no geolocation support.
    Unsupported,
    /// Lookup failed, was denied or timed out.
    Denied,
}

impl LocationFix {
    pub fn describe(&self) -> String {
        match self {
            LocationFix::Coordinates {
                latitude,
                longitude,
            } => format!(
                "Current Latitude: {}\nCurrent Longitude: {}",
                latitude, longitude
            ),
            LocationFix::Unsupported => "Geolocation not supported by this device.".to_string(),
            LocationFix::Denied => "Location not available (GPS disabled or denied).".to_string(),
        }
    }
}

/// Where a report is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Channel {
    Email { to: String },
}

/// Request body for POST /emergency.
#[derive(Debug, Clone, Deserialize)]
pub struct EmergencyRequest {
    pub name: String,
    pub email: String,
    pub profile_location: String,
    pub joined: String,
    pub location: LocationFix,
}

/// Rendered emergency report.
#[derive(Debug, Clone, Serialize)]
pub struct EmergencyReport {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub profile_location: String,
    pub joined: String,
    pub location: LocationFix,
    pub timestamp: DateTime<Utc>,
}

impl EmergencyReport {
    pub fn from_request(request: EmergencyRequest, role: Role, now: DateTime<Utc>) -> Result<Self> {
        if request.name.trim().is_empty() {
            return Err(Error::validation("name", "is required"));
        }
        if request.email.trim().is_empty() {
            return Err(Error::validation("email", "is required"));
        }

        Ok(Self {
            name: request.name,
            email: request.email,
            role,
            profile_location: request.profile_location,
            joined: request.joined,
            location: request.location,
            timestamp: now,
        })
    }

    pub fn subject(&self) -> &'static str {
        "Emergency FIR Report"
    }

    /// Plain-text message body.
    pub fn render(&self) -> String {
        format!(
            "Emergency Report\n\
             Name: {}\n\
             Email: {}\n\
             Role: {}\n\
             Profile Location: {}\n\
             Joined: {}\n\
             \n\
             Location:\n\
             {}\n\
             \n\
             Time: {}\n",
            self.name,
            self.email,
            self.role.as_str(),
            self.profile_location,
            self.joined,
            self.location.describe(),
            self.timestamp.to_rfc3339(),
        )
    }
}

/// Webhook payload.
#[derive(Debug, Serialize)]
struct DispatchPayload<'a> {
    channel: &'a Channel,
    subject: &'a str,
    message: String,
    report: &'a EmergencyReport,
}

/// Hands reports to the outside world.
#[derive(Clone)]
pub enum Dispatcher {
    /// POST the report as JSON to a delivery webhook.
    Webhook { client: reqwest::Client, url: String },
    /// Only log the report. Used when no webhook is configured.
    Log,
}

impl Dispatcher {
    /// A webhook dispatcher whose requests give up after `timeout`.
    pub fn webhook(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Dispatch(format!("cannot build webhook client: {}", e)))?;

        Ok(Dispatcher::Webhook {
            client,
            url: url.to_string(),
        })
    }

    /// Deliver once. Transport errors and non-success responses both fail.
    pub async fn dispatch(&self, report: &EmergencyReport, channel: &Channel) -> Result<()> {
        match self {
            Dispatcher::Webhook { client, url } => {
                let payload = DispatchPayload {
                    channel,
                    subject: report.subject(),
                    message: report.render(),
                    report,
                };

                let response = client
                    .post(url)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| {
                        if e.is_timeout() {
                            warn!("Report webhook timed out");
                            Error::Dispatch("webhook timed out".to_string())
                        } else {
                            Error::Dispatch(e.to_string())
                        }
                    })?;

                let status = response.status();
                if !status.is_success() {
                    warn!(status = %status, "Report webhook rejected the report");
                    return Err(Error::Dispatch(format!("webhook answered {}", status)));
                }

                info!(role = report.role.as_str(), "Emergency report delivered");
                Ok(())
            }
            Dispatcher::Log => {
                info!(
                    role = report.role.as_str(),
                    channel = ?channel,
                    "Emergency report accepted (log-only dispatcher)"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(location: LocationFix) -> EmergencyRequest {
        EmergencyRequest {
            name: "John Doe".into(),
            email: "johndoe@example.com".into(),
            profile_location: "Mumbai, India".into(),
            joined: "Aug 2025".into(),
            location,
        }
    }

    #[test]
    fn test_location_descriptions() {
        let fix = LocationFix::Coordinates {
            latitude: 27.0415,
            longitude: 88.2636,
        };
        assert_eq!(
            fix.describe(),
            "Current Latitude: 27.0415\nCurrent Longitude: 88.2636"
        );
        assert!(LocationFix::Unsupported.describe().contains("not supported"));
        assert!(LocationFix::Denied.describe().contains("GPS disabled or denied"));
    }

    #[test]
    fn test_render_includes_identity_and_placeholder() {
        let report =
            EmergencyReport::from_request(request(LocationFix::Denied), Role::Tourist, Utc::now())
                .unwrap();

        let body = report.render();

        assert!(body.contains("Name: John Doe"));
        assert!(body.contains("Role: tourist"));
        assert!(body.contains("Profile Location: Mumbai, India"));
        assert!(body.contains("Location not available"));
    }

    #[test]
    fn test_report_requires_name() {
        let mut r = request(LocationFix::Unsupported);
        r.name = String::new();
        assert!(matches!(
            EmergencyReport::from_request(r, Role::Tourist, Utc::now()),
            Err(Error::Validation { field: "name", .. })
        ));
    }

    #[test]
    fn test_location_fix_wire_format() {
        let fix: LocationFix =
            serde_json::from_str(r#"{"kind":"coordinates","latitude":1.5,"longitude":2.5}"#)
                .unwrap();
        assert_eq!(
            fix,
            LocationFix::Coordinates {
                latitude: 1.5,
                longitude: 2.5
            }
        );
        let denied: LocationFix = serde_json::from_str(r#"{"kind":"denied"}"#).unwrap();
        assert_eq!(denied, LocationFix::Denied);
    }

    #[tokio::test]
    async fn test_log_dispatcher_accepts() {
        let report =
            EmergencyReport::from_request(request(LocationFix::Denied), Role::Tourist, Utc::now())
                .unwrap();
        let channel = Channel::Email {
            to: "control-room@example.org".into(),
        };
        assert!(Dispatcher::Log.dispatch(&report, &channel).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_webhook_fails() {
        let report =
            EmergencyReport::from_request(request(LocationFix::Denied), Role::Tourist, Utc::now())
                .unwrap();
        let channel = Channel::Email {
            to: "control-room@example.org".into(),
        };
        // Nothing listens on port 9 (discard) locally.
        let dispatcher =
            Dispatcher::webhook("http://127.0.0.1:9/reports", Duration::from_secs(5)).unwrap();

        let err = dispatcher.dispatch(&report, &channel).await.unwrap_err();

        assert!(matches!(err, Error::Dispatch(_)));
    }

    #[tokio::test]
    async fn test_silent_webhook_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let report =
            EmergencyReport::from_request(request(LocationFix::Denied), Role::Tourist, Utc::now())
                .unwrap();
        let channel = Channel::Email {
            to: "control-room@example.org".into(),
        };
        let dispatcher =
            Dispatcher::webhook(&format!("http://{}/reports", addr), Duration::from_millis(200))
                .unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.dispatch(&report, &channel),
        )
        .await
        .expect("dispatch should give up on its own");

        match outcome {
            Err(Error::Dispatch(message)) => assert_eq!(message, "webhook timed out"),
            other => panic!("expected a dispatch timeout, got {:?}", other),
        }
    }
}
