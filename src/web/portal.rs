//! Captive provisioning portal.
//!
//! Every unknown path redirects to the credential form so a freshly
//! associated client lands on it regardless of what its OS probes.

use axum::{
    Form, Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::core::provisioning::{ProvisioningChannel, ProvisioningSubmission, SubmissionError};

const PORTAL_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Shelf Setup</title>
</head>
<body>
  <h1>Connect your shelf</h1>
  <p>Enter the Wi-Fi network this device should join. It restarts once the
  credentials are saved.</p>
  <form method="post" action="/provision">
    <label>Network name <input name="network_name" required></label><br>
    <label>Password <input name="secret" type="password"></label><br>
    <button type="submit">Save and restart</button>
  </form>
</body>
</html>
"#;

const SAVED_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Shelf Setup</title></head>
<body>
  <h1>Credentials saved</h1>
  <p>The device is restarting and will join your network shortly.</p>
</body>
</html>
"#;

pub fn router(channel: ProvisioningChannel) -> Router {
    Router::new()
        .route("/", get(form))
        .route("/provision", post(provision))
        .fallback(captive_redirect)
        .with_state(channel)
}

async fn form() -> Html<&'static str> {
    Html(PORTAL_HTML)
}

#[derive(Serialize)]
struct PortalError {
    error: String,
}

async fn provision(
    State(channel): State<ProvisioningChannel>,
    Form(submission): Form<ProvisioningSubmission>,
) -> Response {
    match channel.submit(submission).await {
        Ok(()) => Html(SAVED_HTML).into_response(),
        Err(e @ (SubmissionError::EmptyNetworkName | SubmissionError::SecretTooShort)) => (
            StatusCode::BAD_REQUEST,
            Json(PortalError {
                error: e.to_string(),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(PortalError {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn captive_redirect() -> Redirect {
    Redirect::temporary("/")
}
