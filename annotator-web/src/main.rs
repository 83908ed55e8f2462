//! Servidor Axum (HTTP + WebSocket) que expõe uma sessão de anotação NER.
//!
//! A superfície de exibição é o cliente: consulta o exemplo atual, envia as
//! frases de cada rótulo e recebe os eventos da sessão.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};

use annotator_core::{
    label_input::{instructions, template},
    sampling::load_examples,
    session::{ExampleView, Progress},
    span::render_inline,
    AnnotationSession, AnnotationStore, AnnotatorConfig, AnnotatorError, LabelInput, SessionEvent,
    SessionState, Span,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Capacidade do canal de eventos; clientes mais lentos perdem os mais antigos
const EVENT_CAPACITY: usize = 64;

/// Estado compartilhado da aplicação
struct AppState {
    session: Mutex<AnnotationSession>,
    /// Onde gravar as anotações quando a sessão termina
    output: Option<PathBuf>,
    /// Eventos da sessão repassados a todos os WebSockets conectados
    events: broadcast::Sender<SessionEvent>,
}

impl AppState {
    /// Assina a sessão e repassa seus eventos para o canal `broadcast`.
    ///
    /// Precisa rodar dentro do runtime tokio.
    fn new(mut session: AnnotationSession, output: Option<PathBuf>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let rx = session.subscribe();
        let tx = events.clone();
        // O receptor std::mpsc bloqueia: fica numa thread de bloqueio até a
        // sessão ser descartada
        tokio::task::spawn_blocking(move || forward_events(rx, tx));
        Arc::new(Self {
            session: Mutex::new(session),
            output,
            events,
        })
    }

    fn lock(&self) -> MutexGuard<'_, AnnotationSession> {
        // um handler que entrou em pânico não invalida o estado da sessão
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Salva o store se a sessão acabou e há destino configurado.
    fn persist_if_finished(&self, session: &AnnotationSession) {
        if !session.state().is_finished {
            return;
        }
        if let Some(path) = &self.output {
            if let Err(err) = session.store().save(path) {
                error!("Falha ao salvar anotações em {}: {}", path.display(), err);
            }
        }
    }
}

/// Frases do usuário: texto estruturado ou um campo por rótulo
#[derive(Deserialize, Default)]
struct LabelRequest {
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    fields: Option<HashMap<String, String>>,
}

impl LabelRequest {
    fn parse(&self, session: &AnnotationSession) -> Result<LabelInput, AnnotatorError> {
        match (&self.input, &self.fields) {
            (Some(text), None) => {
                LabelInput::parse_structured(text, session.labels(), session.delimiter())
            }
            (None, Some(fields)) => {
                LabelInput::from_fields(fields, session.labels(), session.delimiter())
            }
            (None, None) => Ok(LabelInput::empty(session.labels())),
            (Some(_), Some(_)) => Err(AnnotatorError::MalformedInput(
                "envie 'input' ou 'fields', não ambos".into(),
            )),
        }
    }
}

/// Comando recebido pelo WebSocket
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    Submit {
        #[serde(flatten)]
        request: LabelRequest,
    },
    Preview {
        #[serde(flatten)]
        request: LabelRequest,
    },
    Skip,
    Finish,
}

#[derive(Serialize)]
struct StateResponse {
    state: SessionState,
    progress: Progress,
    progress_text: String,
    current: Option<ExampleView>,
    labels: Vec<String>,
    template: String,
    include_skip: bool,
}

impl StateResponse {
    fn from_session(session: &AnnotationSession) -> Self {
        let progress = session.progress();
        Self {
            state: session.state(),
            progress,
            progress_text: progress.to_string(),
            current: session.current(),
            labels: session.labels().iter().map(str::to_string).collect(),
            template: template(session.labels()),
            include_skip: session.include_skip(),
        }
    }
}

#[derive(Serialize)]
struct PreviewResponse {
    entities: Vec<Span>,
    rendered: String,
}

/// Erro da sessão convertido em resposta JSON
struct ApiError(AnnotatorError);

impl From<AnnotatorError> for ApiError {
    fn from(err: AnnotatorError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AnnotatorError::SessionFinished | AnnotatorError::SkipDisabled => StatusCode::CONFLICT,
            AnnotatorError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        warn!("Requisição rejeitada: {}", self.0);
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("ANNOTATOR_CONFIG").unwrap_or_else(|_| "annotator.json".into());
    let input_path = std::env::var("ANNOTATOR_INPUT").unwrap_or_else(|_| "examples.txt".into());
    let output = std::env::var("ANNOTATOR_OUTPUT").ok().map(PathBuf::from);
    let addr = std::env::var("ANNOTATOR_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let config = AnnotatorConfig::load(&config_path)?;
    let examples = load_examples(&input_path)?;

    // Um arquivo de saída existente retoma a sessão anterior
    let session = match &output {
        Some(path) if path.exists() => {
            info!("Retomando anotações de {}", path.display());
            let store = AnnotationStore::load(path, examples.len())?;
            config.resume_session(examples, store)?
        }
        _ => config.build_session(examples)?,
    };

    let state = AppState::new(session, output);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Servidor de anotação iniciado em http://{}", addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/state", get(state_handler))
        .route("/submit", post(submit_handler))
        .route("/preview", post(preview_handler))
        .route("/skip", post(skip_handler))
        .route("/finish", post(finish_handler))
        .route("/annotations", get(annotations_handler))
        .route("/ws", get(ws_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

/// Instruções de uso em texto puro
async fn index_handler(State(state): State<Arc<AppState>>) -> String {
    let session = state.lock();
    format!(
        "{}\n{}\n",
        instructions(session.delimiter()),
        template(session.labels())
    )
}

async fn state_handler(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    Json(StateResponse::from_session(&state.lock()))
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LabelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut session = state.lock();
    let input = req.parse(&session)?;
    let record = session.submit(&input)?;
    state.persist_if_finished(&session);
    Ok(Json(serde_json::json!({
        "record": record,
        "state": StateResponse::from_session(&session),
    })))
}

async fn preview_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LabelRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let session = state.lock();
    let input = req.parse(&session)?;
    let entities = session.preview(&input)?;
    let rendered = session
        .current()
        .map(|view| render_inline(&view.text, &entities))
        .unwrap_or_default();
    Ok(Json(PreviewResponse { entities, rendered }))
}

async fn skip_handler(State(state): State<Arc<AppState>>) -> Result<Json<StateResponse>, ApiError> {
    let mut session = state.lock();
    session.skip()?;
    state.persist_if_finished(&session);
    Ok(Json(StateResponse::from_session(&session)))
}

async fn finish_handler(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let mut session = state.lock();
    session.finish();
    state.persist_if_finished(&session);
    Json(StateResponse::from_session(&session))
}

/// Registros no formato de dados de treinamento
async fn annotations_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.lock().store().to_json_array())
}

/// Upgrade HTTP → WebSocket
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Aplica um comando à sessão; erros viram um evento de erro para o cliente
fn apply_command(state: &AppState, command: WsCommand) -> Option<serde_json::Value> {
    let mut session = state.lock();
    let result = match command {
        WsCommand::Submit { request } => request
            .parse(&session)
            .and_then(|input| session.submit(&input))
            .map(|_| None),
        WsCommand::Preview { request } => request
            .parse(&session)
            .and_then(|input| session.preview(&input))
            .map(|entities| {
                let rendered = session
                    .current()
                    .map(|view| render_inline(&view.text, &entities))
                    .unwrap_or_default();
                Some(serde_json::json!({
                    "type": "Preview",
                    "data": {"entities": entities, "rendered": rendered},
                }))
            }),
        WsCommand::Skip => session.skip().map(|_| None),
        WsCommand::Finish => {
            session.finish();
            Ok(None)
        }
    };
    state.persist_if_finished(&session);
    result.unwrap_or_else(|err| {
        warn!("Comando WebSocket rejeitado: {}", err);
        Some(serde_json::json!({"type": "Error", "data": {"message": err.to_string()}}))
    })
}

/// Repassa os eventos da sessão até ela ser descartada.
fn forward_events(rx: mpsc::Receiver<SessionEvent>, tx: broadcast::Sender<SessionEvent>) {
    for event in rx {
        // sem WebSockets conectados o evento é descartado
        let _ = tx.send(event);
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(err) => {
            error!("Falha ao serializar evento: {}", err);
            true
        }
    }
}

/// Recebe comandos e envia cada evento da sessão assim que ele acontece,
/// inclusive transições feitas por outros clientes.
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket conectado");
    let mut events = state.events.subscribe();
    let snapshot = state.lock().snapshot();
    if !send_json(&mut socket, &snapshot).await {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !send_json(&mut socket, &event).await {
                        return; // cliente desconectou
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("WebSocket atrasado, {} eventos descartados", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else {
                    info!("WebSocket encerrado");
                    return;
                };
                match msg {
                    Message::Text(text) => {
                        let reply = match serde_json::from_str::<WsCommand>(&text) {
                            Ok(command) => apply_command(&state, command),
                            Err(err) => Some(serde_json::json!({
                                "type": "Error",
                                "data": {"message": format!("Comando inválido: {err}")},
                            })),
                        };
                        if let Some(reply) = reply {
                            if !send_json(&mut socket, &reply).await {
                                return;
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("WebSocket desconectado");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotator_core::{Example, LabelSet, SpanProducer};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state(texts: &[&str]) -> Arc<AppState> {
        let labels = LabelSet::new(["FRUIT", "COLOR"]).unwrap();
        let examples = texts.iter().map(|t| Example::new(*t)).collect();
        let session = AnnotationSession::new(examples, SpanProducer::default(), labels);
        AppState::new(session, None)
    }

    async fn call(
        state: &Arc<AppState>,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app(state.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_state_shows_first_example() {
        let state = test_state(&["Apple and Orange are fruit"]);
        let (status, json) = call(&state, "GET", "/state", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["current"]["text"], "Apple and Orange are fruit");
        assert_eq!(json["template"], "FRUIT: insert;\nCOLOR: insert;");
    }

    #[tokio::test]
    async fn test_submit_structured_input() {
        let state = test_state(&["Apple and Orange are fruit", "red"]);
        let body = serde_json::json!({"input": "FRUIT: Apple, Apple and Orange;"});
        let (status, json) = call(&state, "POST", "/submit", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["record"],
            serde_json::json!(["Apple and Orange are fruit", {"entities": [[0, 16, "FRUIT"]]}])
        );
        assert_eq!(json["state"]["current"]["text"], "red");
    }

    #[tokio::test]
    async fn test_submit_fields_and_annotations() {
        let state = test_state(&["a red Apple"]);
        let body = serde_json::json!({"fields": {"FRUIT": "Apple", "COLOR": "red"}});
        let (status, json) = call(&state, "POST", "/submit", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"]["state"]["is_finished"], true);

        let (_, annotations) = call(&state, "GET", "/annotations", None).await;
        let entities = annotations[0][1]["entities"].as_array().unwrap();
        assert_eq!(entities.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_label_is_bad_request() {
        let state = test_state(&["Apple"]);
        let body = serde_json::json!({"input": "ANIMAL: cat;"});
        let (status, json) = call(&state, "POST", "/submit", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("ANIMAL"));
    }

    #[tokio::test]
    async fn test_preview_renders_without_storing() {
        let state = test_state(&["Apple pie"]);
        let body = serde_json::json!({"input": "FRUIT: Apple;"});
        let (status, json) = call(&state, "POST", "/preview", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["rendered"], "[Apple](FRUIT) pie");
        assert_eq!(state.lock().store().annotated_count(), 0);
    }

    #[tokio::test]
    async fn test_finish_then_skip_conflicts() {
        let state = test_state(&["Apple", "Pear"]);
        let (status, json) = call(&state, "POST", "/finish", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"]["is_finished"], true);
        let (status, _) = call(&state, "POST", "/skip", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_apply_command_reports_errors() {
        let state = test_state(&["Apple"]);
        let reply = apply_command(
            &state,
            WsCommand::Submit {
                request: LabelRequest {
                    input: Some("broken".into()),
                    fields: None,
                },
            },
        )
        .unwrap();
        assert_eq!(reply["type"], "Error");

        assert!(apply_command(&state, WsCommand::Skip).is_none());
        assert!(state.lock().state().is_finished);
    }

    #[tokio::test]
    async fn test_http_transitions_reach_event_subscribers() {
        let state = test_state(&["Apple", "Pear"]);
        let mut events = state.events.subscribe();

        let (status, _) = call(&state, "POST", "/skip", None).await;
        assert_eq!(status, StatusCode::OK);

        let next = tokio::time::timeout(Duration::from_secs(5), async {
            let mut kinds = Vec::new();
            while let Ok(event) = events.recv().await {
                match event {
                    SessionEvent::Skipped { index } => kinds.push(format!("skipped {index}")),
                    SessionEvent::ExampleShown { view } => {
                        // o snapshot inicial pode chegar antes do skip
                        if !kinds.is_empty() {
                            kinds.push(format!("shown {}", view.text));
                            break;
                        }
                    }
                    _ => {}
                }
            }
            kinds
        })
        .await
        .unwrap();
        assert_eq!(next, vec!["skipped 0".to_string(), "shown Pear".to_string()]);
    }

    #[test]
    fn test_ws_command_shape() {
        let cmd: WsCommand =
            serde_json::from_str(r#"{"type": "submit", "input": "FRUIT: Apple;"}"#).unwrap();
        assert!(matches!(cmd, WsCommand::Submit { request } if request.input.is_some()));
        let cmd: WsCommand = serde_json::from_str(r#"{"type": "skip"}"#).unwrap();
        assert!(matches!(cmd, WsCommand::Skip));
    }
}
