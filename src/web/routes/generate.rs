// Text generation route handler

use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;

use crate::web::models::{GenerateRequest, GenerateResponse};
use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{error_response, json_response};
use crate::web::server::AppState;

pub async fn handle_post_generate(
    req: Request<Body>,
    state: &AppState,
) -> Result<Response<Body>, Infallible> {
    let generate_request: GenerateRequest = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };

    let request = match generate_request.into_generation_request(state.generation.defaults()) {
        Ok(request) => request,
        Err(e) => return Ok(error_response(&e)),
    };

    match state.generation.generate(request).await {
        Ok(result) => Ok(json_response(StatusCode::OK, &GenerateResponse::from(result))),
        Err(e) => Ok(error_response(&e)),
    }
}
