use crate::error::{RemoteCause, RemoteError, RemoteOperation};
use crate::models::{collect_issues, PublishReceipt, QuizDraft, QuizId, StudentRef, ValidationIssue};
use crate::service::QuizService;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::{fs, path::Path};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRecord {
    pub draft: QuizDraft,
    #[serde(default)]
    pub audience: Vec<StudentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("quiz {0} not found")]
    NotFound(QuizId),
    #[error("quiz validation failed")]
    Invalid(Vec<ValidationIssue>),
}

impl StoreError {
    pub fn status(&self) -> u16 {
        match self {
            StoreError::NotFound(_) => 404,
            StoreError::Invalid(_) => 400,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Invalid(_) => "VALIDATION_ERROR",
        }
    }

    fn into_remote(self, operation: RemoteOperation) -> RemoteError {
        let status = self.status();
        let code = Some(self.code().to_string());
        let message = self.to_string();
        let details = match self {
            StoreError::Invalid(issues) => issues,
            StoreError::NotFound(_) => Vec::new(),
        };
        RemoteError::new(
            operation,
            RemoteCause::Rejected {
                status,
                code,
                message,
                details,
            },
        )
    }
}

#[derive(Default)]
pub struct InMemoryDb {
    pub quizzes: RwLock<HashMap<QuizId, QuizRecord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistentSnapshot {
    quizzes: HashMap<QuizId, QuizRecord>,
}

impl InMemoryDb {
    pub fn new(snapshot_path: Option<&str>) -> Self {
        let quizzes = snapshot_path
            .and_then(|path| {
                let raw = fs::read_to_string(path).ok()?;
                match serde_json::from_str::<PersistentSnapshot>(&raw) {
                    Ok(s) => Some(s.quizzes),
                    Err(err) => {
                        warn!("failed to read local snapshot {}: {}", path, err);
                        None
                    }
                }
            })
            .unwrap_or_default();
        Self {
            quizzes: RwLock::new(quizzes),
        }
    }

    async fn snapshot(&self) -> PersistentSnapshot {
        PersistentSnapshot {
            quizzes: self.quizzes.read().await.clone(),
        }
    }
}

fn normalize(mut draft: QuizDraft) -> Result<QuizDraft, StoreError> {
    draft.title = draft.title.trim().to_string();
    draft.description = draft.description.trim().to_string();
    draft.subject = draft.subject.trim().to_string();
    draft.grade_level = draft.grade_level.trim().to_string();
    draft
        .validate()
        .map_err(|errors| StoreError::Invalid(collect_issues(&errors)))?;
    draft.updated_at = Some(Utc::now());
    Ok(draft)
}

/// The quiz store behind the HTTP surface. It also serves the controller
/// in-process through its [`QuizService`] impl.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<InMemoryDb>,
    pub local_state_path: Option<String>,
}

impl AppState {
    pub fn new(local_state_path: Option<String>) -> Self {
        Self {
            db: Arc::new(InMemoryDb::new(local_state_path.as_deref())),
            local_state_path,
        }
    }

    pub async fn create_quiz(&self, draft: QuizDraft) -> Result<QuizDraft, StoreError> {
        let mut draft = normalize(draft)?;
        let id = QuizId(uuid::Uuid::new_v4().to_string());
        draft.identifier = Some(id.clone());
        draft.is_published = false;
        let record = QuizRecord {
            draft: draft.clone(),
            audience: Vec::new(),
            published_at: None,
        };
        self.db.quizzes.write().await.insert(id, record);
        if let Err(err) = self.persist_core_data().await {
            warn!("failed to persist local state after create_quiz: {}", err);
        }
        Ok(draft)
    }

    pub async fn get_quiz(&self, id: &QuizId) -> Result<QuizDraft, StoreError> {
        self.db
            .quizzes
            .read()
            .await
            .get(id)
            .map(|record| record.draft.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Full replace of the authored content. Identity and publication state
    /// stay with the store.
    pub async fn update_quiz(&self, id: &QuizId, draft: QuizDraft) -> Result<QuizDraft, StoreError> {
        let mut draft = normalize(draft)?;
        let mut quizzes = self.db.quizzes.write().await;
        let record = quizzes
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        draft.identifier = Some(id.clone());
        draft.is_published = record.draft.is_published;
        record.draft = draft.clone();
        drop(quizzes);
        if let Err(err) = self.persist_core_data().await {
            warn!("failed to persist local state after update_quiz: {}", err);
        }
        Ok(draft)
    }

    pub async fn publish_quiz(&self, id: &QuizId, audience: Vec<StudentRef>) -> Result<PublishReceipt, StoreError> {
        let mut quizzes = self.db.quizzes.write().await;
        let record = quizzes
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut audience = audience;
        audience.sort();
        audience.dedup();
        let audience_size = audience.len();
        record.draft.is_published = true;
        record.audience = audience;
        record.published_at = Some(Utc::now());
        drop(quizzes);
        if let Err(err) = self.persist_core_data().await {
            warn!("failed to persist local state after publish_quiz: {}", err);
        }
        Ok(PublishReceipt {
            published: true,
            quiz_id: id.clone(),
            audience_size,
        })
    }

    pub async fn audience_of(&self, id: &QuizId) -> Option<Vec<StudentRef>> {
        self.db
            .quizzes
            .read()
            .await
            .get(id)
            .map(|record| record.audience.clone())
    }

    pub async fn persist_core_data(&self) -> anyhow::Result<()> {
        let Some(path) = self.local_state_path.as_ref() else {
            return Ok(());
        };
        let snapshot = self.db.snapshot().await;
        let serialized = serde_json::to_vec_pretty(&snapshot)?;
        if let Some(parent) = Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serialized).await?;
        Ok(())
    }
}

impl QuizService for AppState {
    fn create_quiz(&self, draft: QuizDraft) -> BoxFuture<'static, Result<QuizDraft, RemoteError>> {
        let state = self.clone();
        Box::pin(async move {
            AppState::create_quiz(&state, draft)
                .await
                .map_err(|e| e.into_remote(RemoteOperation::Create))
        })
    }

    fn update_quiz(&self, id: QuizId, draft: QuizDraft) -> BoxFuture<'static, Result<QuizDraft, RemoteError>> {
        let state = self.clone();
        Box::pin(async move {
            AppState::update_quiz(&state, &id, draft)
                .await
                .map_err(|e| e.into_remote(RemoteOperation::Update))
        })
    }

    fn publish_quiz(
        &self,
        id: QuizId,
        audience: Vec<StudentRef>,
    ) -> BoxFuture<'static, Result<PublishReceipt, RemoteError>> {
        let state = self.clone();
        Box::pin(async move {
            AppState::publish_quiz(&state, &id, audience)
                .await
                .map_err(|e| e.into_remote(RemoteOperation::Publish))
        })
    }
}
