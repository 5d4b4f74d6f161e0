use std::time::Duration;
use tokio::sync::watch;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::policy::InputPolicy;
use super::request::{build_request, has_no_body, read_error_message, reason_phrase, status_line};
use super::state::{NO_RESULT_PLACEHOLDER, RequestState, RewriteOutcome};
use super::stream::read_text_stream;
use crate::auth::IdentityProvider;
use crate::config::Config;
use crate::error::{Error, Result, StreamError, TransportError};
use crate::http::HttpClient;

/// Streaming client for the rewrite endpoint.
///
/// Owns one [`RequestState`] and allows a single request in flight at a time.
/// Every state change is published on a `watch` channel so a display can
/// render partial output while the response is still streaming.
pub struct RewriteClient<P> {
    identity: P,
    http_client: HttpClient,
    url: String,
    authorization_scheme: Option<String>,
    /// Bound on the wait for response headers; `None` waits indefinitely.
    timeout: Option<Duration>,
    policy: InputPolicy,
    state: watch::Sender<RequestState>,
}

impl<P: IdentityProvider> RewriteClient<P> {
    pub fn new(identity: P, http_client: HttpClient, config: &Config) -> Self {
        Self {
            identity,
            http_client,
            url: config.api.rewrite_url(),
            authorization_scheme: config.api.authorization_scheme.clone(),
            timeout: (config.api.timeout_secs > 0)
                .then(|| Duration::from_secs(config.api.timeout_secs)),
            policy: InputPolicy::from_config(&config.rewrite),
            state: watch::Sender::new(RequestState::default()),
        }
    }

    pub fn identity(&self) -> &P {
        &self.identity
    }

    pub fn state(&self) -> RequestState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.state.subscribe()
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.borrow().in_flight
    }

    /// Whether a submit control for `input` should be enabled right now.
    pub fn can_submit(&self, input: &str) -> bool {
        !self.is_in_flight()
            && self.identity.auth_state().principal().is_some()
            && self.policy.is_submittable(input)
    }

    /// Rewrite `input`, streaming the result into the published state.
    ///
    /// Returns [`Error::Busy`] without touching the state while another
    /// request is in flight. Validation failures set `error_message` and do
    /// no I/O. Any later failure is recorded in `error_message` as well.
    pub async fn submit(&self, input: &str) -> Result<RewriteOutcome> {
        let identity_ready = self.identity.auth_state().principal().is_some();

        let mut accepted: Result<String> = Err(Error::Busy);
        self.state.send_if_modified(|state| {
            if state.in_flight {
                return false;
            }
            state.input_text = input.to_string();
            match self.policy.check(identity_ready, input) {
                Ok(text) => {
                    accepted = Ok(text.to_string());
                    state.in_flight = true;
                    state.error_message = None;
                    state.result_text.clear();
                }
                Err(e) => {
                    state.error_message = Some(e.to_string());
                    accepted = Err(e.into());
                }
            }
            true
        });

        let text = match accepted {
            Ok(text) => text,
            Err(e) => {
                debug!(error = %e, "Rewrite not submitted");
                return Err(e);
            }
        };

        let guard = InFlight::new(&self.state);
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("rewrite", request_id = %request_id);

        let result = self.run(&text).instrument(span).await;
        guard.finish(&result);

        if let Err(e) = &result {
            warn!(request_id = %request_id, error = %e, "Rewrite request failed");
        }
        result
    }

    /// Reset the result and error. Leaves the input and any in-flight request alone.
    pub fn clear(&self) {
        self.state.send_modify(|state| {
            state.result_text.clear();
            state.error_message = None;
        });
    }

    async fn run(&self, text: &str) -> Result<RewriteOutcome> {
        info!(chars = text.chars().count(), "Submitting rewrite");

        let credential = self.identity.mint_token().await?;
        let request = build_request(
            &self.url,
            text,
            &credential,
            self.authorization_scheme.as_deref(),
        )?;

        let dispatch = self.http_client.send(request);
        let sent = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, dispatch)
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => dispatch.await,
        };
        let response = sent.map_err(|e| TransportError::Connect(error_chain(&e)))?;

        let status = response.status();
        debug!(status = status.as_u16(), "Response headers received");

        if !status.is_success() {
            let fallback = status_line(status, &reason_phrase(&response));
            let message = read_error_message(response.into_body(), fallback).await;
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        if has_no_body(status) {
            return Err(StreamError::MissingBody.into());
        }

        let text = read_text_stream(response.into_body(), |partial| self.publish(partial)).await?;

        if text.trim().is_empty() {
            info!("Rewrite finished without content");
            Ok(RewriteOutcome::Empty)
        } else {
            info!(chars = text.chars().count(), "Rewrite finished");
            Ok(RewriteOutcome::Completed(text))
        }
    }

    fn publish(&self, partial: &str) {
        self.state.send_modify(|state| {
            state.result_text.clear();
            state.result_text.push_str(partial);
        });
    }
}

/// Holds `in_flight` for one accepted submission.
///
/// `finish` settles the state with the outcome. If the submission future is
/// dropped before that, `Drop` still clears the flag.
struct InFlight<'a> {
    state: &'a watch::Sender<RequestState>,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(state: &'a watch::Sender<RequestState>) -> Self {
        Self { state, armed: true }
    }

    fn finish(mut self, result: &Result<RewriteOutcome>) {
        self.armed = false;
        self.state.send_modify(|state| {
            match result {
                Ok(RewriteOutcome::Empty) => {
                    state.result_text = NO_RESULT_PLACEHOLDER.to_string();
                }
                Ok(RewriteOutcome::Completed(_)) => {}
                Err(e) => state.error_message = Some(e.to_string()),
            }
            state.in_flight = false;
        });
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Rewrite abandoned before completion");
            self.state.send_modify(|state| state.in_flight = false);
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
