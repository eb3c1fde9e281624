#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! The completion notifier posts a metadata record to the out-of-scope
//! metadata/auth HTTP service once an upload reaches `offset == filesize`.
//! It is invoked exactly once per upload id — the caller (the session
//! manager) is responsible for that guarantee by invoking it only on the
//! transition into completion, before the session record is deleted; this
//! crate's job is solely to perform the POST without blocking the caller.
//!
//! # Design
//!
//! [`Notifier`] is a trait so the connection handler and session manager can
//! be tested without a real metadata service listening on the network.
//! [`HttpNotifier`] is the production implementation: it builds a blocking
//! [`reqwest::blocking::Client`] with a short request timeout and performs
//! the POST on a dedicated background thread, so a slow or unreachable
//! metadata service never stalls the socket worker that triggered the
//! notification. Both success and failure are logged; failure is otherwise
//! silent, matching the spec's documented trade-off (an unreachable
//! metadata service orphans the uploaded file with no document row).

use std::time::Duration;

use serde::Serialize;
use upload_core::UploadMetadata;

/// Performs the exactly-once-per-upload completion notification.
pub trait Notifier: Send + Sync {
    /// Notifies the metadata service that `upload_id` completed and its
    /// bytes are durable at `file_path`.
    ///
    /// Implementations must not block the caller on the network round trip;
    /// [`HttpNotifier`] achieves this by handing the request to a background
    /// thread.
    fn notify_completion(&self, upload_id: &str, file_path: &str, metadata: &UploadMetadata);
}

/// Body posted to the metadata service on upload completion.
#[derive(Debug, Serialize)]
struct CompletionPayload<'a> {
    filename: &'a str,
    file_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    visibility: upload_core::Visibility,
    tags: &'a [String],
}

/// Posts completion notifications to a configured backend URL.
#[derive(Clone)]
pub struct HttpNotifier {
    backend_url: String,
    client: reqwest::blocking::Client,
}

impl HttpNotifier {
    /// Request timeout applied to the outbound completion POST.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Builds a notifier that posts to `backend_url`.
    pub fn new(backend_url: impl Into<String>) -> Result<Self, NotifierError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(NotifierError::ClientBuild)?;
        Ok(Self {
            backend_url: backend_url.into(),
            client,
        })
    }
}

impl Notifier for HttpNotifier {
    fn notify_completion(&self, upload_id: &str, file_path: &str, metadata: &UploadMetadata) {
        let payload = CompletionPayload {
            filename: &metadata.filename,
            file_path,
            description: metadata.description.as_deref(),
            visibility: metadata.visibility,
            tags: &metadata.tags,
        };
        let body = match serde_json::to_value(&payload) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(upload_id, error = %err, "failed to serialize completion payload");
                return;
            }
        };

        let client = self.client.clone();
        let url = self.backend_url.clone();
        let token = metadata.token.clone();
        let upload_id = upload_id.to_owned();

        std::thread::spawn(move || {
            let result = client
                .post(&url)
                .bearer_auth(&token)
                .json(&body)
                .send();

            match result {
                Ok(response) if response.status().as_u16() == 201 => {
                    tracing::info!(upload_id, "completion notification accepted");
                }
                Ok(response) => {
                    tracing::warn!(
                        upload_id,
                        status = response.status().as_u16(),
                        "completion notification rejected by metadata service"
                    );
                }
                Err(err) => {
                    tracing::warn!(upload_id, error = %err, "completion notification failed");
                }
            }
        });
    }
}

/// Errors returned while constructing a [`HttpNotifier`].
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    /// The underlying HTTP client could not be built.
    #[error("failed to build notifier HTTP client: {0}")]
    ClientBuild(reqwest::Error),
}

/// A [`Notifier`] used in tests that records every call it receives instead
/// of performing network I/O.
#[cfg(any(test, feature = "test-support"))]
pub mod recording {
    use std::sync::Mutex;

    use super::Notifier;
    use upload_core::UploadMetadata;

    /// One recorded call to [`Notifier::notify_completion`].
    #[derive(Clone, Debug, PartialEq)]
    pub struct RecordedCall {
        /// The upload id the notifier was invoked for.
        pub upload_id: String,
        /// The file path passed to the notifier.
        pub file_path: String,
        /// The metadata passed to the notifier.
        pub metadata: UploadMetadata,
    }

    /// A [`Notifier`] that stores every call for later assertion.
    #[derive(Default)]
    pub struct RecordingNotifier {
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl RecordingNotifier {
        /// Returns a clone of every call recorded so far.
        #[must_use]
        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify_completion(&self, upload_id: &str, file_path: &str, metadata: &UploadMetadata) {
            self.calls.lock().unwrap().push(RecordedCall {
                upload_id: upload_id.to_owned(),
                file_path: file_path.to_owned(),
                metadata: metadata.clone(),
            });
        }
    }
}
