//! Interactive authorization-code flow for obtaining a refresh token.
//!
//! The user opens the partner-connections URL, grants access, and the
//! vendor redirects the browser to a one-shot local listener carrying the
//! authorization code. The listener is an axum router that accepts exactly
//! one callback and is shut down as soon as the code arrives or the
//! deadline passes.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use reqwest::Url;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::nest::TokenResponse;

pub const AUTH_SCOPE: &str = "https://www.googleapis.com/auth/sdm.service";
pub const PARTNER_CONNECTIONS_BASE: &str = "https://nestservices.google.com/partnerconnections";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080";

/// Port used when the redirect URI does not name one.
pub const DEFAULT_CALLBACK_PORT: u16 = 8080;

/// How long the listener waits for the browser redirect.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = "<html><body>\
<h1>Authorization successful!</h1>\
<p>You can close this window and return to the terminal.</p>\
</body></html>";

// ---

/// Random nonce carried through the redirect and checked on the callback.
pub fn new_state() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Consent URL the user opens in a browser.
pub fn authorization_url(
    project_id: &str,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<Url> {
    // ---
    let base = format!("{PARTNER_CONNECTIONS_BASE}/{project_id}/auth");
    Url::parse_with_params(
        &base,
        &[
            ("redirect_uri", redirect_uri),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("client_id", client_id),
            ("response_type", "code"),
            ("scope", AUTH_SCOPE),
            ("state", state),
        ],
    )
    .map_err(|e| Error::Oauth(format!("invalid authorization URL: {e}")))
}

/// Local port the callback listener binds for `redirect_uri`.
///
/// A tunnel URL without an explicit port still forwards to the default
/// local port.
pub fn callback_port(redirect_uri: &str) -> Result<u16> {
    // ---
    let url = Url::parse(redirect_uri)
        .map_err(|e| Error::Oauth(format!("invalid redirect URI '{redirect_uri}': {e}")))?;
    Ok(url.port().unwrap_or(DEFAULT_CALLBACK_PORT))
}

/// Bind the callback listener on the loopback interface.
pub async fn bind_callback_listener(port: u16) -> Result<TcpListener> {
    // ---
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Callback listener on {}", listener.local_addr()?);
    Ok(listener)
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Option<String>,
    sender: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

async fn callback(
    Query(query): Query<CallbackQuery>,
    State(state): State<CallbackState>,
) -> Response {
    // ---
    if let Some(error) = query.error.as_deref() {
        tracing::warn!(error, "Authorization was denied");
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Html("<h1>Error: No authorization code received</h1>"),
        )
            .into_response();
    };

    if let Some(expected) = state.expected_state.as_deref() {
        if query.state.as_deref() != Some(expected) {
            tracing::warn!("Callback state does not match");
            return (
                StatusCode::BAD_REQUEST,
                Html("<h1>Error: State mismatch</h1>"),
            )
                .into_response();
        }
    }

    let sender = state
        .sender
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    match sender {
        Some(tx) => {
            let _ = tx.send(code);
            tracing::info!("Authorization code received");
        }
        None => tracing::debug!("Ignoring repeated callback"),
    }

    (StatusCode::OK, Html(SUCCESS_PAGE)).into_response()
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn callback_router(expected_state: Option<String>, sender: oneshot::Sender<String>) -> Router {
    // ---
    let state = CallbackState {
        expected_state,
        sender: Arc::new(Mutex::new(Some(sender))),
    };
    Router::new()
        .route("/", get(callback))
        .fallback(not_found)
        .with_state(state)
}

/// Serve `listener` until one valid callback arrives or `timeout` passes.
///
/// The listener is shut down in both cases.
pub async fn wait_for_code(
    listener: TcpListener,
    expected_state: Option<String>,
    timeout: Duration,
) -> Result<String> {
    // ---
    let (code_tx, code_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = callback_router(expected_state, code_tx);

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let received = tokio::time::timeout(timeout, code_rx).await;

    let _ = shutdown_tx.send(());
    let stopped = tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await;
    match stopped {
        Ok(Ok(Ok(()))) => tracing::debug!("Callback listener stopped"),
        Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Callback listener failed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Callback listener task failed"),
        Err(_) => server.abort(),
    }

    match received {
        Ok(Ok(code)) => Ok(code),
        Ok(Err(_)) => Err(Error::Oauth("callback listener stopped unexpectedly".into())),
        Err(_) => Err(Error::Oauth("Authorization timed out or failed".into())),
    }
}

/// `.env` lines for the obtained credentials.
pub fn env_lines(
    client_id: &str,
    client_secret: &str,
    project_id: &str,
    tokens: &TokenResponse,
) -> Result<String> {
    // ---
    let refresh_token = tokens
        .refresh_token
        .as_deref()
        .ok_or_else(|| Error::Oauth("token response carries no refresh token".into()))?;

    Ok(format!(
        "NEST_CLIENT_ID={client_id}\n\
         NEST_CLIENT_SECRET={client_secret}\n\
         NEST_REFRESH_TOKEN={refresh_token}\n\
         NEST_PROJECT_ID={project_id}\n"
    ))
}
