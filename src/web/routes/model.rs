// Model lifecycle route handlers: /load and /unload

use hyper::{Body, Request, Response, StatusCode};
use log::info;
use std::convert::Infallible;

use crate::web::models::{LoadRequest, LoadResponse, StatusResponse, UnloadRequest};
use crate::web::request_parsing::{parse_json_body, parse_optional_json_body};
use crate::web::response_helpers::{error_response, json_response};
use crate::web::server::AppState;

pub async fn handle_post_load(
    req: Request<Body>,
    state: &AppState,
) -> Result<Response<Body>, Infallible> {
    let load_request: LoadRequest = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };
    let model_path = match load_request.validate() {
        Ok(path) => path,
        Err(e) => return Ok(error_response(&e)),
    };

    info!("/load requested for {model_path}");
    match state.manager.load(model_path).await {
        Ok(()) => Ok(json_response(
            StatusCode::OK,
            &LoadResponse {
                status: "loaded".to_string(),
                model_path: model_path.to_string(),
            },
        )),
        Err(e) => Ok(error_response(&e)),
    }
}

pub async fn handle_post_unload(
    req: Request<Body>,
    state: &AppState,
) -> Result<Response<Body>, Infallible> {
    if let Err(error_response) = parse_optional_json_body::<UnloadRequest>(req.into_body()).await {
        return Ok(error_response);
    }

    let outcome = state.manager.unload().await;
    Ok(json_response(
        StatusCode::OK,
        &StatusResponse {
            status: outcome.status.as_str().to_string(),
            model_loaded: false,
            model_path: None,
        },
    ))
}
