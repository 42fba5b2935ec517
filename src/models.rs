use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use validator::Validate;

pub const SUBJECTS: [&str; 10] = [
    "Mathematics",
    "Science",
    "English",
    "History",
    "Geography",
    "Computer Science",
    "Languages",
    "Arts",
    "Physical Education",
    "Other",
];

pub const GRADE_LEVELS: [&str; 5] = [
    "Elementary (K-5)",
    "Middle School (6-8)",
    "High School (9-12)",
    "College",
    "Professional",
];

pub const DEFAULT_TIME_LIMIT_MINUTES: i64 = 30;
pub const DEFAULT_PASSING_SCORE_PERCENT: i64 = 70;

/// Server-assigned quiz identity. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuizId(pub String);

impl fmt::Display for QuizId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuizId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentRef(pub String);

impl From<&str> for StudentRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    ShortAnswer,
    SelectAll,
    FillInTheBlank,
    Essay,
    TrueFalse,
    Matching,
    Ordering,
}

impl QuestionType {
    pub const ALL: [QuestionType; 8] = [
        QuestionType::MultipleChoice,
        QuestionType::ShortAnswer,
        QuestionType::SelectAll,
        QuestionType::FillInTheBlank,
        QuestionType::Essay,
        QuestionType::TrueFalse,
        QuestionType::Matching,
        QuestionType::Ordering,
    ];

    pub fn label(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "Multiple Choice",
            QuestionType::ShortAnswer => "Short Answer",
            QuestionType::SelectAll => "Select All That Apply",
            QuestionType::FillInTheBlank => "Fill in the Blank",
            QuestionType::Essay => "Essay",
            QuestionType::TrueFalse => "True/False",
            QuestionType::Matching => "Matching",
            QuestionType::Ordering => "Ordering",
        }
    }
}

fn default_points() -> f64 {
    1.0
}

/// A question as the draft stores it. Everything beyond type, prompt and points
/// belongs to the question editor and is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Question {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(rename = "question", alias = "prompt", default)]
    pub prompt: String,
    #[serde(default = "default_points")]
    #[validate(range(exclusive_min = 0.0, message = "must be positive"))]
    pub points: f64,
    #[serde(flatten)]
    pub answer_data: Map<String, Value>,
}

impl Question {
    pub fn new(question_type: QuestionType, prompt: impl Into<String>, points: f64) -> Self {
        Self {
            question_type,
            prompt: prompt.into(),
            points,
            answer_data: Map::new(),
        }
    }

    /// The blank question handed to the editor when adding: multiple choice,
    /// two empty options, no correct answer, one point.
    pub fn blank() -> Self {
        let mut answer_data = Map::new();
        answer_data.insert("options".into(), Value::from(vec!["", ""]));
        answer_data.insert("correctAnswer".into(), Value::from(""));
        Self {
            question_type: QuestionType::MultipleChoice,
            prompt: String::new(),
            points: default_points(),
            answer_data,
        }
    }
}

impl Default for Question {
    fn default() -> Self {
        Self::blank()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizSettings {
    pub randomize_questions: bool,
    #[serde(rename = "showResults")]
    pub show_results_after_completion: bool,
    pub allow_multiple_attempts: bool,
    #[serde(rename = "passingScore")]
    #[validate(range(min = 0, max = 100, message = "must be between 0 and 100"))]
    pub passing_score_percent: i64,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            randomize_questions: false,
            show_results_after_completion: true,
            allow_multiple_attempts: false,
            passing_score_percent: DEFAULT_PASSING_SCORE_PERCENT,
        }
    }
}

fn default_time_limit() -> i64 {
    DEFAULT_TIME_LIMIT_MINUTES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuizDraft {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<QuizId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub grade_level: String,
    #[serde(rename = "timeLimit", default = "default_time_limit")]
    #[validate(range(min = 1, max = 180, message = "must be between 1 and 180 minutes"))]
    pub time_limit_minutes: i64,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<Question>,
    #[serde(default)]
    #[validate(nested)]
    pub settings: QuizSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for QuizDraft {
    fn default() -> Self {
        Self {
            identifier: None,
            title: String::new(),
            description: String::new(),
            subject: String::new(),
            grade_level: String::new(),
            time_limit_minutes: DEFAULT_TIME_LIMIT_MINUTES,
            is_published: false,
            questions: Vec::new(),
            settings: QuizSettings::default(),
            updated_at: None,
        }
    }
}

/// Top-level scalar fields an author may set directly. Identity and the
/// published flag are owned by the save/publish workflow and are not listed.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftField {
    Title(String),
    Description(String),
    Subject(String),
    GradeLevel(String),
    TimeLimitMinutes(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    RandomizeQuestions(bool),
    ShowResultsAfterCompletion(bool),
    AllowMultipleAttempts(bool),
    PassingScorePercent(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub issue: String,
}

impl ValidationIssue {
    fn new(field: &str, issue: &str) -> Self {
        Self {
            field: field.into(),
            issue: issue.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub can_save: bool,
    pub can_publish: bool,
}

impl QuizDraft {
    pub fn with_field(mut self, field: DraftField) -> Self {
        match field {
            DraftField::Title(v) => self.title = v,
            DraftField::Description(v) => self.description = v,
            DraftField::Subject(v) => self.subject = v,
            DraftField::GradeLevel(v) => self.grade_level = v,
            DraftField::TimeLimitMinutes(v) => self.time_limit_minutes = v,
        }
        self
    }

    pub fn with_setting(mut self, field: SettingField) -> Self {
        let settings = &mut self.settings;
        match field {
            SettingField::RandomizeQuestions(v) => settings.randomize_questions = v,
            SettingField::ShowResultsAfterCompletion(v) => settings.show_results_after_completion = v,
            SettingField::AllowMultipleAttempts(v) => settings.allow_multiple_attempts = v,
            SettingField::PassingScorePercent(v) => settings.passing_score_percent = v,
        }
        self
    }

    pub fn with_question_appended(mut self, question: Question) -> Self {
        self.questions.push(question);
        self
    }

    pub fn with_question_replaced(mut self, index: usize, question: Question) -> Result<Self, ControllerError> {
        let len = self.questions.len();
        let slot = self
            .questions
            .get_mut(index)
            .ok_or(ControllerError::IndexOutOfRange { index, len })?;
        *slot = question;
        Ok(self)
    }

    pub fn with_question_removed(mut self, index: usize) -> Result<Self, ControllerError> {
        let len = self.questions.len();
        if index >= len {
            return Err(ControllerError::IndexOutOfRange { index, len });
        }
        self.questions.remove(index);
        Ok(self)
    }

    pub fn total_points(&self) -> f64 {
        self.questions.iter().map(|q| q.points).sum()
    }

    pub fn check_saveable(&self) -> Result<(), Vec<ValidationIssue>> {
        if self.questions.is_empty() {
            return Err(vec![ValidationIssue::new(
                "questions",
                "must contain at least one question",
            )]);
        }
        Ok(())
    }

    pub fn check_publishable(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        if self.title.trim().is_empty() {
            issues.push(ValidationIssue::new("title", "must not be empty"));
        }
        if let Err(mut more) = self.check_saveable() {
            issues.append(&mut more);
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            can_save: self.check_saveable().is_ok(),
            can_publish: self.check_publishable().is_ok(),
        }
    }
}

/// Flattens validator output into `field` paths such as `questions[2].points`.
pub fn collect_issues(errors: &validator::ValidationErrors) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    push_issues("", errors, &mut issues);
    issues.sort_by(|a, b| a.field.cmp(&b.field));
    issues
}

fn push_issues(prefix: &str, errors: &validator::ValidationErrors, out: &mut Vec<ValidationIssue>) {
    use validator::ValidationErrorsKind;

    for (name, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                for err in list {
                    let issue = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    out.push(ValidationIssue {
                        field: path.clone(),
                        issue,
                    });
                }
            }
            ValidationErrorsKind::Struct(inner) => push_issues(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    push_issues(&format!("{path}[{idx}]"), inner, out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub students: Vec<StudentRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub published: bool,
    pub quiz_id: QuizId,
    pub audience_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(prompt: &str) -> Question {
        Question::new(QuestionType::ShortAnswer, prompt, 2.0)
    }

    #[test]
    fn fresh_draft_matches_form_defaults() {
        let draft = QuizDraft::default();
        assert_eq!(draft.identifier, None);
        assert_eq!(draft.time_limit_minutes, 30);
        assert!(!draft.is_published);
        assert!(draft.questions.is_empty());
        assert!(draft.settings.show_results_after_completion);
        assert_eq!(draft.settings.passing_score_percent, 70);
    }

    #[test]
    fn blank_question_is_two_option_multiple_choice() {
        let q = Question::blank();
        assert_eq!(q.question_type, QuestionType::MultipleChoice);
        assert_eq!(q.points, 1.0);
        assert_eq!(q.answer_data["options"], json!(["", ""]));
        assert_eq!(q.answer_data["correctAnswer"], json!(""));
    }

    #[test]
    fn setting_update_leaves_siblings_alone() {
        let draft = QuizDraft::default()
            .with_setting(SettingField::PassingScorePercent(55))
            .with_setting(SettingField::RandomizeQuestions(true));
        assert_eq!(draft.settings.passing_score_percent, 55);
        assert!(draft.settings.randomize_questions);
        assert!(draft.settings.show_results_after_completion);
        assert!(!draft.settings.allow_multiple_attempts);
    }

    #[test]
    fn out_of_range_time_limit_is_stored_as_is() {
        let draft = QuizDraft::default().with_field(DraftField::TimeLimitMinutes(-5));
        assert_eq!(draft.time_limit_minutes, -5);
    }

    #[test]
    fn remove_rejects_out_of_bounds_index() {
        let draft = QuizDraft::default().with_question_appended(question("a"));
        let err = draft.with_question_removed(1).unwrap_err();
        assert!(matches!(err, ControllerError::IndexOutOfRange { index: 1, len: 1 }));
    }

    #[test]
    fn replace_keeps_neighbours_in_order() {
        let draft = QuizDraft::default()
            .with_question_appended(question("a"))
            .with_question_appended(question("b"))
            .with_question_appended(question("c"))
            .with_question_replaced(1, question("B"))
            .unwrap();
        let prompts: Vec<_> = draft.questions.iter().map(|q| q.prompt.as_str()).collect();
        assert_eq!(prompts, ["a", "B", "c"]);
    }

    #[test]
    fn publish_gate_requires_title_and_questions() {
        let draft = QuizDraft::default();
        let issues = draft.check_publishable().unwrap_err();
        assert_eq!(issues.len(), 2);
        assert_eq!(draft.readiness(), Readiness { can_save: false, can_publish: false });

        let draft = draft.with_question_appended(question("a"));
        assert_eq!(draft.readiness(), Readiness { can_save: true, can_publish: false });

        let draft = draft.with_field(DraftField::Title("   ".into()));
        assert!(!draft.readiness().can_publish);

        let draft = draft.with_field(DraftField::Title("Fractions".into()));
        assert_eq!(draft.readiness(), Readiness { can_save: true, can_publish: true });
    }

    #[test]
    fn wire_format_uses_form_field_names() {
        let raw = json!({
            "_id": "Q1",
            "title": "Fractions",
            "timeLimit": 45,
            "isPublished": false,
            "questions": [{
                "type": "true-false",
                "question": "1/2 > 1/3",
                "points": 1,
                "correctAnswer": true
            }],
            "settings": { "showResults": false, "passingScore": 80 }
        });
        let draft: QuizDraft = serde_json::from_value(raw).unwrap();
        assert_eq!(draft.identifier, Some(QuizId::from("Q1")));
        assert_eq!(draft.time_limit_minutes, 45);
        assert_eq!(draft.questions[0].question_type, QuestionType::TrueFalse);
        assert_eq!(draft.questions[0].answer_data["correctAnswer"], json!(true));
        assert!(!draft.settings.show_results_after_completion);
        assert_eq!(draft.settings.passing_score_percent, 80);

        let back = serde_json::to_value(&draft).unwrap();
        assert_eq!(back["questions"][0]["correctAnswer"], json!(true));
        assert_eq!(back["settings"]["passingScore"], json!(80));
        assert!(back.get("updatedAt").is_none());
    }

    #[test]
    fn validator_paths_point_into_nested_questions() {
        let mut draft = QuizDraft::default()
            .with_question_appended(question("a"))
            .with_field(DraftField::TimeLimitMinutes(0))
            .with_setting(SettingField::PassingScorePercent(101));
        draft.questions[0].points = 0.0;
        let errors = draft.validate().unwrap_err();
        let fields: Vec<_> = collect_issues(&errors).into_iter().map(|i| i.field).collect();
        assert!(fields.contains(&"time_limit_minutes".to_string()));
        assert!(fields.contains(&"settings.passing_score_percent".to_string()));
        assert!(fields.contains(&"questions[0].points".to_string()));
    }
}
