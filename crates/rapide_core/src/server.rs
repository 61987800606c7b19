//! HTTP front-end and the hot-update socket.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tower_http::trace::TraceLayer;

use crate::hmr::{self, ChangeEvent, ErrorPayload, HmrPayload};
use crate::module_graph::ModuleGraph;
use crate::options::{DevServerOptions, NormalizedOptions};
use crate::pipeline::{Pipeline, PipelineError, PipelineOutput};
use crate::plugin::{default_plugins, Plugin, PluginDriver};
use crate::prebundle::{DepBundler, EsbuildBundler, PreBundler};

/// Well-known path serving the injected client runtime.
pub const CLIENT_PATH: &str = "/@rapide/client";
/// Well-known upgrade endpoint for the hot-update transport.
pub const HMR_PATH: &str = "/__hmr";

pub const CLIENT_RUNTIME: &str = include_str!("client/runtime.js");

const HMR_CHANNEL_CAPACITY: usize = 64;

pub struct DevServer {
    pipeline: Arc<Pipeline>,
    hmr_tx: broadcast::Sender<HmrPayload>,
    options: Arc<NormalizedOptions>,
}

impl DevServer {
    pub async fn new(options: DevServerOptions) -> anyhow::Result<Self> {
        Self::with_parts(options, default_plugins(), Arc::new(EsbuildBundler)).await
    }

    /// Explicit-instance construction: plugins and the bundling capability
    /// are injected, nothing lives in process-wide state.
    pub async fn with_parts(
        options: DevServerOptions,
        plugins: Vec<Box<dyn Plugin>>,
        bundler: Arc<dyn DepBundler>,
    ) -> anyhow::Result<Self> {
        let options = Arc::new(options.normalize());
        let graph = Arc::new(Mutex::new(ModuleGraph::new(options.root.clone())));
        let prebundler = Arc::new(PreBundler::new(&options, bundler));
        prebundler.load_manifest().await;

        let pipeline = Arc::new(Pipeline::new(
            options.clone(),
            graph,
            prebundler,
            PluginDriver::new(plugins),
        ));
        let (hmr_tx, _) = broadcast::channel(HMR_CHANNEL_CAPACITY);
        Ok(Self {
            pipeline,
            hmr_tx,
            options,
        })
    }

    pub fn options(&self) -> &NormalizedOptions {
        &self.options
    }

    pub fn graph(&self) -> Arc<Mutex<ModuleGraph>> {
        self.pipeline.graph.clone()
    }

    /// A receiver on the hot-update broadcast; every connected socket holds
    /// one of these.
    pub fn subscribe(&self) -> broadcast::Receiver<HmrPayload> {
        self.hmr_tx.subscribe()
    }

    pub async fn transform_request(&self, url: &str) -> Result<PipelineOutput, PipelineError> {
        self.pipeline.transform_request(url).await
    }

    /// Entry point for the file-watcher collaborator.
    pub async fn on_file_change(&self, event: &ChangeEvent) {
        hmr::handle_file_change(&self.pipeline.graph, &self.hmr_tx, event).await;
    }

    pub fn router(&self) -> Router {
        let state = ServerState {
            pipeline: self.pipeline.clone(),
            hmr_tx: self.hmr_tx.clone(),
        };
        Router::new()
            .route(CLIENT_PATH, get(client_runtime))
            .route(HMR_PATH, get(ws_upgrade))
            .fallback(serve_request)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub async fn listen(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(("127.0.0.1", self.options.port)).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!("dev server listening on http://{}", listener.local_addr()?);
        let router = self.router();
        axum::serve(listener, router).await?;
        Ok(())
    }
}

#[derive(Clone)]
struct ServerState {
    pipeline: Arc<Pipeline>,
    hmr_tx: broadcast::Sender<HmrPayload>,
}

async fn client_runtime() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        CLIENT_RUNTIME,
    )
}

async fn serve_request(State(state): State<ServerState>, uri: Uri) -> Response {
    let raw_url = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    match state.pipeline.transform_request(raw_url).await {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, output.content_type)],
            output.body,
        )
            .into_response(),
        Err(err @ (PipelineError::Unresolved { .. } | PipelineError::Read { .. })) => {
            tracing::debug!("{}", err);
            (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                format!("404 Not Found: {}", raw_url),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!("{}", err);
            let _ = state.hmr_tx.send(HmrPayload::Error {
                err: ErrorPayload {
                    message: err.to_string(),
                    stack: String::new(),
                },
            });
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                format!("Internal Server Error: {}", err),
            )
                .into_response()
        }
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    tracing::debug!("hmr client connected");
    let (mut sender, mut receiver) = socket.split();

    if let Ok(connected) = serde_json::to_string(&HmrPayload::Connected) {
        if sender.send(Message::Text(connected.into())).await.is_err() {
            return;
        }
    }

    let mut payloads = state.hmr_tx.subscribe();
    let mut send_task = tokio::spawn(async move {
        while let Ok(payload) = payloads.recv().await {
            let Ok(json) = serde_json::to_string(&payload) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    // Custom client events are informational only; no replay
                    // or queuing happens on this channel.
                    tracing::debug!("client message: {}", text.as_str());
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::debug!("hmr client disconnected");
}
