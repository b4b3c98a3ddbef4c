// Status route handler

use hyper::{Body, Response, StatusCode};
use std::convert::Infallible;

use crate::web::models::StatusResponse;
use crate::web::response_helpers::json_response;
use crate::web::server::AppState;

pub async fn handle_get_status(state: &AppState) -> Result<Response<Body>, Infallible> {
    let status = StatusResponse::from(state.manager.status());
    Ok(json_response(StatusCode::OK, &status))
}
