use std::collections::HashMap;

use axum::body::Body;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::gateway::{Envelope, GatewayReply, Method, OperationGateway};

#[derive(Clone)]
pub struct AppState {
    pub gateway: OperationGateway,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/backup",
            get(read_action).post(write_action).fallback(method_not_allowed),
        )
        .route("/api/v1/healthz", get(healthz))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
}

async fn healthz() -> Json<HealthzResponse> {
    Json(HealthzResponse { status: "ok" })
}

impl IntoResponse for GatewayReply {
    fn into_response(self) -> Response {
        match self {
            GatewayReply::Envelope(envelope) => Json(envelope).into_response(),
            GatewayReply::Download {
                filename,
                file,
                len,
            } => (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_owned()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{filename}\""),
                    ),
                    (header::CONTENT_LENGTH, len.to_string()),
                ],
                Body::from_stream(ReaderStream::new(file)),
            )
                .into_response(),
        }
    }
}

fn rejected(message: String) -> Response {
    Json(Envelope::failure(message)).into_response()
}

async fn read_action(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Response {
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => return rejected(rejection.body_text()),
    };
    let action = params.get("action").cloned().unwrap_or_default();
    state
        .gateway
        .dispatch(Method::Read, &action, &params)
        .await
        .into_response()
}

/// Form fields are merged over the query string, so `?action=delete` with a
/// `file` form field works as well as an all-form body.
async fn write_action(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response {
    let mut params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => return rejected(rejection.body_text()),
    };
    match form {
        Ok(Form(fields)) => params.extend(fields),
        // body-less POST carrying everything in the query string
        Err(FormRejection::InvalidFormContentType(_)) if params.contains_key("action") => {}
        Err(rejection) => return rejected(rejection.body_text()),
    }
    let action = params.get("action").cloned().unwrap_or_default();
    state
        .gateway
        .dispatch(Method::Write, &action, &params)
        .await
        .into_response()
}

async fn method_not_allowed() -> Json<Envelope> {
    Json(Envelope::failure("Method not allowed"))
}
