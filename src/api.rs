//! REST API server
//!
//! Statement upload, conversation management and the streaming chat
//! endpoint, all under `/api`.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::conversational::{ConversationOrchestrator, TurnOutcome};
use crate::error::AssistantError;
use crate::ingest::IngestionPipeline;

const UPLOAD_FIELD: &str = "statementDoc";
const UPLOAD_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const CHUNK_BUFFER: usize = 1;

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub error: String,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn error(message: String) -> Self {
        Self {
            error: message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error reply with its status code
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<AssistantError> for ApiError {
    fn from(e: AssistantError) -> Self {
        let status = match e {
            AssistantError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", e);
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::error(self.message))).into_response()
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub ingestion: Arc<IngestionPipeline>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatQuery {
    #[serde(alias = "query")]
    pub question: Option<String>,
    pub conversation_id: Option<String>,
}

fn parse_conversation_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::bad_request(format!("invalid conversation id '{}'", raw)))
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn upload_statement(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut statement = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed upload: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?;
        statement = Some(String::from_utf8_lossy(&bytes).into_owned());
        break;
    }

    let Some(statement) = statement else {
        return Err(ApiError::bad_request(format!(
            "missing multipart field '{}'",
            UPLOAD_FIELD
        )));
    };

    info!(bytes = statement.len(), "Statement upload received");
    let report = state.ingestion.ingest(&statement).await;

    Ok(Json(serde_json::json!({
        "done": true,
        "report": report,
    })))
}

async fn new_conversation(
    State(state): State<ApiState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conversation = state.orchestrator.store().create_conversation().await?;
    info!(conversation_id = %conversation.id, "Conversation created");

    Ok(Json(serde_json::json!({ "conversation": conversation })))
}

async fn conversation_messages(
    State(state): State<ApiState>,
    Path(chat_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_conversation_id(&chat_id)?;
    let messages = state.orchestrator.store().list_messages(id).await?;

    Ok(Json(serde_json::json!({
        "count": messages.len(),
        "data": messages,
    })))
}

/// SSE fields cannot carry carriage returns
fn sse_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn tail_events(result: Option<crate::Result<TurnOutcome>>) -> Vec<Event> {
    let mut events = Vec::with_capacity(2);

    match result {
        Some(Ok(_)) => {}
        Some(Err(AssistantError::ClientDisconnected)) => {}
        Some(Err(e)) => {
            let message = sse_text(&e.to_string());
            events.push(Event::default().event("error").data(message));
        }
        None => events.push(Event::default().event("error").data("turn aborted")),
    }

    events.push(Event::default().event("end").data("done"));
    events
}

async fn chat(
    State(state): State<ApiState>,
    Query(params): Query<ChatQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let question = params
        .question
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing question"))?;
    let conversation_id = params
        .conversation_id
        .ok_or_else(|| ApiError::bad_request("missing conversationId"))
        .and_then(|raw| parse_conversation_id(&raw))?;

    let turn = state
        .orchestrator
        .start_turn(conversation_id, &question)
        .await?;

    let (chunk_tx, chunk_rx) = mpsc::channel::<String>(CHUNK_BUFFER);
    let (done_tx, done_rx) = oneshot::channel();
    let orchestrator = state.orchestrator.clone();

    tokio::spawn(async move {
        let result = orchestrator.complete_turn(turn, &chunk_tx).await;
        drop(chunk_tx);
        if done_tx.send(result).is_err() {
            warn!(%conversation_id, "Client went away before the turn finished");
        }
    });

    let chunks = ReceiverStream::new(chunk_rx)
        .map(|chunk| Ok::<_, Infallible>(Event::default().event("message").data(sse_text(&chunk))));
    let tail = stream::once(async move { tail_events(done_rx.await.ok()) })
        .flat_map(|events| stream::iter(events.into_iter().map(Ok::<_, Infallible>)));

    Ok(Sse::new(chunks.chain(tail)).keep_alive(KeepAlive::default()))
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/upload", post(upload_statement))
        .route("/api/chat", get(chat))
        .route("/api/chat/new", post(new_conversation))
        .route("/api/chat/:chat_id", get(conversation_messages))
        .with_state(state)
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TransactionClassifier;
    use crate::graph::{GraphPersistence, MemoryGraph};
    use crate::memory::{ConversationStore, InMemoryConversationStore};
    use crate::statement::StatementParser;
    use crate::testing::{ScriptedGraph, ScriptedModel, ScriptedStream};
    use crate::translator::QueryTranslator;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        model: Arc<ScriptedModel>,
        store: Arc<InMemoryConversationStore>,
        graph: Arc<MemoryGraph>,
    }

    fn app() -> TestApp {
        let model = Arc::new(ScriptedModel::new());
        let store = Arc::new(InMemoryConversationStore::new());
        let graph = Arc::new(MemoryGraph::new());

        let orchestrator = ConversationOrchestrator::new(
            model.clone(),
            Arc::new(QueryTranslator::new(model.clone(), false)),
            Arc::new(ScriptedGraph::returning(vec![])),
            store.clone(),
        );
        let ingestion = IngestionPipeline::new(
            StatementParser::default(),
            Arc::new(TransactionClassifier::new(model.clone(), Duration::ZERO)),
            GraphPersistence::new(graph.clone()),
        );

        TestApp {
            router: create_router(ApiState {
                orchestrator: Arc::new(orchestrator),
                ingestion: Arc::new(ingestion),
            }),
            model,
            store,
            graph,
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_sse_text_drops_carriage_returns() {
        assert_eq!(sse_text("a\r\nb\rc\nd"), "a\nb\nc\nd");
    }

    #[tokio::test]
    async fn test_health() {
        let response = app().router.oneshot(get_request("/api/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "OK");
    }

    #[tokio::test]
    async fn test_new_conversation_then_empty_history() {
        let app = app();
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat/new")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = body_json(response).await["conversation"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .router
            .oneshot(get_request(&format!("/api/chat/{}", id)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["count"], 0);
        assert_eq!(json["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_404() {
        let app = app();
        let uri = format!("/api/chat/{}", Uuid::new_v4());

        let response = app.router.clone().oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let uri = format!("/api/chat?question=hi&conversationId={}", Uuid::new_v4());
        let response = app.router.oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(app.model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_chat_requires_question_and_id() {
        let app = app();

        let missing_question = format!("/api/chat?conversationId={}", Uuid::new_v4());
        let response = app.router.clone().oneshot(get_request(&missing_question)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .router
            .clone()
            .oneshot(get_request("/api/chat?question=hi"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .router
            .oneshot(get_request("/api/chat?question=hi&conversationId=nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid conversation id 'nope'");
        assert!(json.get("success").is_none());
    }

    #[tokio::test]
    async fn test_chat_streams_chunks_then_end() {
        let app = app();
        let id = app.store.create_conversation().await.unwrap().id;
        app.model.push_completion(Ok("MATCH (t:Transaction) RETURN t".into()));
        app.model.push_stream(ScriptedStream::Chunks(vec!["Hello", " there"]));

        let uri = format!("/api/chat?query=hi&conversationId={}", id);
        let response = app.router.oneshot(get_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_text(response).await;
        let hello = body.find("event: message\ndata: Hello\n\n").unwrap();
        let there = body.find("event: message\ndata:  there\n\n").unwrap();
        let end = body.find("event: end\n").unwrap();
        assert!(hello < there && there < end);
        assert!(!body.contains("event: error"));

        let messages = app.store.list_messages(id).await.unwrap();
        assert_eq!(messages[1].content, "Hello there");
    }

    #[tokio::test]
    async fn test_chat_stream_failure_emits_error_before_end() {
        let app = app();
        let id = app.store.create_conversation().await.unwrap().id;
        app.model.push_completion(Ok("MATCH (t) RETURN t".into()));
        app.model.push_stream(ScriptedStream::FailAfter(vec!["one", "two"], "reset"));

        let uri = format!("/api/chat?question=hi&conversationId={}", id);
        let body = body_text(app.router.oneshot(get_request(&uri)).await.unwrap()).await;

        assert_eq!(body.matches("event: message").count(), 2);
        let error = body.find("event: error").unwrap();
        let end = body.find("event: end").unwrap();
        assert!(error < end);
        assert!(app.store.list_messages(id).await.unwrap().is_empty());
    }

    fn multipart_request(field: &str, content: &str) -> Request<Body> {
        let boundary = "X-STATEMENT-BOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"statement.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
            b = boundary,
            f = field,
            c = content
        );

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("content-type", format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_runs_pipeline() {
        let app = app();
        app.model.push_completion(Ok("Clothing".into()));
        let line = [
            "16/05/24 10:22:31\t",
            "\t",
            "₦5,000.00\t",
            "\t",
            "clothes shop\t",
            "shirts\t",
            "₦12,300.00",
        ]
        .join("\t");

        let response = app
            .router
            .oneshot(multipart_request("statementDoc", &line))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["done"], true);
        assert_eq!(json["report"]["linesParsed"], 1);
        assert_eq!(json["report"]["persisted"], 1);
        assert_eq!(app.graph.links().await, vec!["Clothing"]);
    }

    #[tokio::test]
    async fn test_upload_without_statement_field_is_400() {
        let response = app()
            .router
            .oneshot(multipart_request("somethingElse", "data"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
