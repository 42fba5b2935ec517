use crate::config::ClientConfig;
use crate::error::{RemoteCause, RemoteError, RemoteOperation};
use crate::models::{PublishReceipt, PublishRequest, QuizDraft, QuizId, StudentRef, ValidationIssue};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

/// The remote side of quiz authoring: create, update and publish.
pub trait QuizService: Send + Sync {
    fn create_quiz(&self, draft: QuizDraft) -> BoxFuture<'static, Result<QuizDraft, RemoteError>>;

    fn update_quiz(&self, id: QuizId, draft: QuizDraft) -> BoxFuture<'static, Result<QuizDraft, RemoteError>>;

    fn publish_quiz(
        &self,
        id: QuizId,
        audience: Vec<StudentRef>,
    ) -> BoxFuture<'static, Result<PublishReceipt, RemoteError>>;
}

/// In-process quiz service: the reference store answers the calls directly,
/// without HTTP in between.
pub type InMemoryQuizService = crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorFields,
}

#[derive(Debug, Deserialize)]
struct ErrorFields {
    code: Option<String>,
    message: String,
    #[serde(default)]
    details: Vec<ValidationIssue>,
}

#[derive(Clone)]
pub struct HttpQuizService {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl HttpQuizService {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    fn request(&self, method: reqwest::Method, segments: &[&str]) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.config.endpoint(segments));
        match self.config.token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn send_json<T: DeserializeOwned>(
    operation: RemoteOperation,
    request: reqwest::RequestBuilder,
) -> Result<T, RemoteError> {
    let response = request
        .send()
        .await
        .map_err(|e| RemoteError::new(operation, e))?;
    let status = response.status();
    if !status.is_success() {
        let raw = response.text().await.unwrap_or_default();
        let cause = match serde_json::from_str::<ErrorEnvelope>(&raw) {
            Ok(env) => RemoteCause::Rejected {
                status: status.as_u16(),
                code: env.error.code,
                message: env.error.message,
                details: env.error.details,
            },
            Err(_) => RemoteCause::Rejected {
                status: status.as_u16(),
                code: None,
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
                details: Vec::new(),
            },
        };
        return Err(RemoteError::new(operation, cause));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| RemoteError::new(operation, e))?;
    serde_json::from_slice(&body).map_err(|e| RemoteError::new(operation, e))
}

impl QuizService for HttpQuizService {
    fn create_quiz(&self, draft: QuizDraft) -> BoxFuture<'static, Result<QuizDraft, RemoteError>> {
        let request = self.request(reqwest::Method::POST, &["quizzes"]).json(&draft);
        Box::pin(send_json(RemoteOperation::Create, request))
    }

    fn update_quiz(&self, id: QuizId, draft: QuizDraft) -> BoxFuture<'static, Result<QuizDraft, RemoteError>> {
        let request = self
            .request(reqwest::Method::PUT, &["quizzes", id.0.as_str()])
            .json(&draft);
        Box::pin(send_json(RemoteOperation::Update, request))
    }

    fn publish_quiz(
        &self,
        id: QuizId,
        audience: Vec<StudentRef>,
    ) -> BoxFuture<'static, Result<PublishReceipt, RemoteError>> {
        let request = self
            .request(reqwest::Method::POST, &["quizzes", id.0.as_str(), "publish"])
            .json(&PublishRequest { students: audience });
        Box::pin(send_json(RemoteOperation::Publish, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn garbled_success_body_is_a_decode_failure() {
        let app = Router::new().route("/api/v1/quizzes", post(|| async { "<html>maintenance</html>" }));
        let base = serve(app).await;
        let service = HttpQuizService::new(ClientConfig::new(&base).unwrap()).unwrap();

        let err = service.create_quiz(QuizDraft::default()).await.unwrap_err();
        assert_eq!(err.operation, RemoteOperation::Create);
        assert!(matches!(err.cause, RemoteCause::Decode(_)), "got {:?}", err.cause);
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn in_memory_service_assigns_identifiers() {
        let service = InMemoryQuizService::new(None);
        let mut draft = QuizDraft::default();
        draft.title = "  Decimals ".into();
        draft.questions.push(crate::models::Question::new(
            crate::models::QuestionType::TrueFalse,
            "0.5 = 1/2",
            1.0,
        ));

        let saved = QuizService::create_quiz(&service, draft).await.unwrap();
        assert_eq!(saved.title, "Decimals");
        let id = saved.identifier.unwrap();
        let receipt = QuizService::publish_quiz(&service, id.clone(), vec![StudentRef::from("s1")])
            .await
            .unwrap();
        assert_eq!(receipt.quiz_id, id);
        assert_eq!(receipt.audience_size, 1);
    }
}
