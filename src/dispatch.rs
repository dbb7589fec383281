//! Call execution logic for the TUI dashboard.

use std::time::{Duration, Instant};

use hedging_client::{HedgeConfig, HedgedError, HttpResponse, InstanceAddress, LogicalRequest};
use tokio::sync::mpsc;

use crate::app::{App, AppEvent, Method, Mode};

const POST_PAYLOAD: &str = r#"{"source":"hedge-dash"}"#;

/// Spawns a call based on the current app configuration.
///
/// The call is executed in a background task and sends the result via the provided channel.
pub fn spawn_call(app: &App, tx: mpsc::UnboundedSender<AppEvent>) {
    let mode = app.mode;
    let method = app.method;
    let client = app.client.clone();
    let uri = app.target.logical_uri();
    let width = app.width;
    let direct = app.direct.get(app.selected_idx).cloned();

    tokio::spawn(async move {
        let start = Instant::now();

        let result: (Option<InstanceAddress>, Result<String, String>) =
            match build_request(method, &uri) {
                Err(e) => (None, Err(e)),
                Ok(request) => match mode {
                    Mode::Hedged => {
                        let cfg = HedgeConfig::with_width(width).timeout(Duration::from_secs(3));
                        summarize(client.hedge_with(request, &cfg).await)
                    }
                    Mode::SingleInstance => match direct {
                        Some(direct) => summarize(direct.hedge(request).await),
                        None => (None, Err("No instance selected".to_string())),
                    },
                },
            };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let (instance, ok, message) = match result {
            (instance, Ok(msg)) => (instance, true, msg),
            (instance, Err(msg)) => (instance, false, msg),
        };

        let _ = tx.send(AppEvent::CallFinished {
            instance,
            latency_ms: elapsed_ms,
            ok,
            message,
        });
    });
}

fn build_request(method: Method, uri: &str) -> Result<LogicalRequest, String> {
    let uri = uri.parse().map_err(|e| format!("invalid target URI: {e}"))?;
    let request = LogicalRequest::new(method.as_http(), uri);

    Ok(match method {
        Method::Get => request,
        Method::Post => request
            .header(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            )
            .body(POST_PAYLOAD),
    })
}

fn summarize(
    outcome: Result<(InstanceAddress, HttpResponse), HedgedError>,
) -> (Option<InstanceAddress>, Result<String, String>) {
    match outcome {
        Ok((address, response)) => (
            Some(address),
            Ok(format!(
                "status={}, bytes={}",
                response.status,
                response.body.len()
            )),
        ),
        Err(HedgedError::AllFailed(failures)) => {
            let first = failures.first().map(|(address, _)| address.clone());
            (first, Err(format!("all {} attempts failed", failures.len())))
        }
        Err(e) => (None, Err(e.to_string())),
    }
}
