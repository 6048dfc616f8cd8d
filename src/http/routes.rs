//! Handlers for each endpoint in the router.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use url::Url;

use crate::authorization::{Approval, AuthRequest};
use crate::error::{Error, Result};
use crate::middleware::AuthContext;
use crate::model::UpstreamCredentials;
use crate::registration::RegistrationRequest;
use crate::state::{AppState, ApprovalEnvelope};
use crate::token_service::TokenRequest;
use crate::{registration, well_known};

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// `axum`'s query deserializer collapses repeated keys to the last
    /// occurrence, so multiple resource indicators aren't representable
    /// here; this server validates the single value it receives.
    pub resource: Option<String>,
}

fn resource_request_url(state: &AppState) -> Url {
    Url::parse(&format!("{}/mcp", state.config.issuer)).expect("issuer is a valid URL")
}

pub async fn authorize_get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Html<String>> {
    let request_url = resource_request_url(&state);
    let resource = query.resource.clone().into_iter().collect::<Vec<_>>();
    let request = state
        .authorization
        .parse_auth_request(
            &query.response_type,
            &query.client_id,
            query.redirect_uri.as_deref(),
            query.scope.as_deref(),
            query.state.as_deref(),
            query.code_challenge.as_deref(),
            query.code_challenge_method.as_deref(),
            &resource,
            &request_url,
        )
        .await?;

    let signed_request = state.sign_redirect_state(&request)?;
    Ok(Html(approval_form(&query.client_id, &signed_request)))
}

/// A minimal approval form. The real consent UI is external to this
/// server; this renders just enough to carry the signed request through
/// a user's "Approve" click.
fn approval_form(client_id: &str, signed_request: &str) -> String {
    format!(
        "<html><body><form method=\"post\" action=\"/oauth/authorize\">\
         <p>Approve access for client {client_id}?</p>\
         <input type=\"hidden\" name=\"request\" value=\"{signed_request}\">\
         <button type=\"submit\">Approve</button>\
         </form></body></html>"
    )
}

#[derive(Debug, Deserialize)]
pub struct ApproveForm {
    pub request: String,
}

pub async fn authorize_post(
    State(state): State<Arc<AppState>>,
    axum::Form(form): axum::Form<ApproveForm>,
) -> Result<Response> {
    let request: AuthRequest = state.verify_redirect_state(&form.request)?;

    let client = state
        .storage
        .get_client(&request.client_id)
        .await?
        .ok_or_else(|| Error::invalid_request("Invalid request"))?;
    if let Some(uri) = &request.redirect_uri
        && !client.redirect_uris.iter().any(|r| r == uri)
    {
        return Err(Error::invalid_request("redirect_uri does not match client"));
    }

    let resigned = state.sign_redirect_state(&request)?;
    let mut upstream_url = Url::parse(state.config.upstream.authorize_url())
        .map_err(|e| Error::server_error(format!("invalid upstream authorize URL: {e}")))?;
    upstream_url
        .query_pairs_mut()
        .append_pair("client_id", &state.config.upstream.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &format!("{}/oauth/callback", state.config.issuer))
        .append_pair("state", &resigned);

    Ok(Redirect::to(upstream_url.as_str()).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let request: AuthRequest = state.verify_redirect_state(&query.state)?;

    let approval_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| find_cookie(cookies, "approval"))
        .ok_or_else(|| Error::invalid_client("Authorization failed: Client not approved"))?;
    let approval: ApprovalEnvelope = state
        .verify_approval(&approval_cookie)
        .map_err(|_| Error::invalid_client("Authorization failed: Client not approved"))?;
    if approval.client_id != request.client_id {
        return Err(Error::invalid_client("Authorization failed: Client not approved"));
    }

    let upstream_response = state
        .upstream
        .exchange_code_for_access_token(&query.code, Some(&format!("{}/oauth/callback", state.config.issuer)))
        .await?;

    let credentials = UpstreamCredentials {
        access_token: upstream_response.access_token,
        refresh_token: upstream_response.refresh_token.unwrap_or_default(),
        access_token_expires_at: upstream_response.expires_in.map(|secs| now() + secs),
    };

    let redirect_url = state
        .authorization
        .complete_authorization(
            &request,
            Approval {
                user_id: approval.user_id,
                credentials,
            },
        )
        .await?;

    Ok(Redirect::to(&redirect_url).into_response())
}

fn find_cookie(cookies: &str, name: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub async fn token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Form(form): axum::Form<HashMap<String, String>>,
) -> Result<Response> {
    let basic_auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(decode_basic_auth);

    let request = TokenRequest {
        grant_type: form
            .get("grant_type")
            .cloned()
            .ok_or_else(|| Error::invalid_request("grant_type is required"))?,
        code: form.get("code").cloned(),
        redirect_uri: form.get("redirect_uri").cloned(),
        code_verifier: form.get("code_verifier").cloned(),
        refresh_token: form.get("refresh_token").cloned(),
        client_id: form.get("client_id").cloned(),
        client_secret: form.get("client_secret").cloned(),
        basic_auth,
    };

    let response = state.token_service.handle(request).await?;
    let mut http_response = Json(response).into_response();
    http_response
        .headers_mut()
        .insert(header::CACHE_CONTROL, "no-store".parse().unwrap());
    http_response
        .headers_mut()
        .insert(header::PRAGMA, "no-cache".parse().unwrap());
    Ok(http_response)
}

fn decode_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegistrationRequest>,
) -> Result<Response> {
    let response = registration::register_client(state.storage.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

pub async fn authorization_server_metadata(State(state): State<Arc<AppState>>) -> Response {
    Json(well_known::authorization_server_metadata(&state.config)).into_response()
}

pub async fn protected_resource_metadata(State(state): State<Arc<AppState>>) -> Response {
    Json(well_known::protected_resource_metadata(&state.config)).into_response()
}

/// A tiny example of a resource-server route guarded by bearer-token
/// middleware; the MCP transport itself is out of scope for this server.
pub async fn protected_resource_probe(auth: AuthContext) -> Response {
    Json(serde_json::json!({
        "user_id": auth.user_id,
        "client_id": auth.client_id,
        "scope": auth.scope,
    }))
    .into_response()
}

fn now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}
