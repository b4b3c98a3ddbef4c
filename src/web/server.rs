// HTTP boundary: routing, shared state and the server loop

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use log::{debug, info};
use std::convert::Infallible;
use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;

use super::backend::ModelLoader;
use super::chat::GenerationService;
use super::config::GenerationDefaults;
use super::model_manager::ModelLifecycleManager;
use super::response_helpers::{cors_preflight, json_error};
use super::routes;

const KNOWN_ROUTES: &[&str] = &["/status", "/load", "/generate", "/unload"];

/// Everything the handlers share. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    pub manager: Arc<ModelLifecycleManager>,
    pub generation: Arc<GenerationService>,
}

impl AppState {
    pub fn new(loader: Arc<dyn ModelLoader>, defaults: GenerationDefaults) -> Self {
        let manager = Arc::new(ModelLifecycleManager::new(loader));
        let generation = Arc::new(GenerationService::new(manager.clone(), defaults));
        Self {
            manager,
            generation,
        }
    }
}

pub async fn handle_request(
    req: Request<Body>,
    state: Arc<AppState>,
) -> Result<Response<Body>, Infallible> {
    debug!("{} {}", req.method(), req.uri().path());

    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/status") => routes::status::handle_get_status(&state).await?,
        (&Method::POST, "/load") => routes::model::handle_post_load(req, &state).await?,
        (&Method::POST, "/generate") => {
            routes::generate::handle_post_generate(req, &state).await?
        }
        (&Method::POST, "/unload") => routes::model::handle_post_unload(req, &state).await?,
        (&Method::OPTIONS, _) => cors_preflight(),
        (_, path) if KNOWN_ROUTES.contains(&path) => {
            json_error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }
        _ => json_error(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), hyper::Error>
where
    F: Future<Output = ()>,
{
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone())))
        }
    });

    let server = Server::from_tcp(listener)?.serve(make_svc);
    info!("Sidecar listening on http://{}", server.local_addr());

    server.with_graceful_shutdown(shutdown).await
}
