//! Request bodies and query parameters, with boundary validation.
//!
//! ## FlexibleDateTime
//!
//! Due dates arrive from browser forms in several shapes. Accepted:
//! - RFC 3339 (`2025-11-22T16:18:00Z`, `2025-11-22T16:18:00+02:00`)
//! - `datetime-local` (`2025-11-22T16:18`, with optional seconds/millis)
//! - `22-11-2025 16:18` and `22/11/2025 16:18`
//!
//! Values without an offset are read as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer};
use uuid::Uuid;

use taskflow_core::{
    Error, Priority, Result, TaskDraft, TaskListFilter, TaskPatch, TaskSort, TaskStatus,
    MAX_USER_NAME_LEN,
};

/// Maximum length for a name changed through `PATCH /users/me`.
pub const MAX_PROFILE_NAME_LEN: usize = 50;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d-%m-%Y %H:%M",
    "%d-%m-%YT%H:%M",
    "%d/%m/%Y %H:%M",
    "%d/%m/%YT%H:%M",
];

/// A timestamp that deserializes from any of the supported date shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexibleDateTime(pub DateTime<Utc>);

impl FlexibleDateTime {
    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl<'de> Deserialize<'de> for FlexibleDateTime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_flexible_datetime(&s).map_err(de::Error::custom)
    }
}

fn parse_flexible_datetime(s: &str) -> std::result::Result<FlexibleDateTime, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("dueDate is required".to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(FlexibleDateTime(dt.with_timezone(&Utc)));
    }
    let naive = s.strip_suffix('Z').unwrap_or(s);
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|n| FlexibleDateTime(n.and_utc()))
        .ok_or_else(|| {
            format!(
                "Invalid dueDate '{}' (use a valid datetime, e.g. 2025-11-22T16:18)",
                s
            )
        })
}

/// Reads `assignedToId` into `Some(None)` for `null`/`""` and `Some(Some(id))`
/// for a uuid. Pair with `#[serde(default)]` so an absent key stays `None`.
fn assignee_field<'de, D>(deserializer: D) -> std::result::Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(Some(None)),
        Some(s) => Uuid::parse_str(s)
            .map(|id| Some(Some(id)))
            .map_err(|_| de::Error::custom(format!("assignedToId is not a valid id: {}", s))),
    }
}

// =============================================================================
// TASKS
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub due_date: FlexibleDateTime,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "assignee_field")]
    pub assigned_to_id: Option<Option<Uuid>>,
}

impl CreateTaskRequest {
    pub fn into_draft(self) -> Result<TaskDraft> {
        let draft = TaskDraft {
            title: self.title,
            description: self.description,
            due_date: self.due_date.into_inner(),
            priority: self.priority,
            status: self.status,
            assigned_to_id: self.assigned_to_id.flatten(),
        };
        draft.validate()?;
        Ok(draft)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<FlexibleDateTime>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "assignee_field")]
    pub assigned_to_id: Option<Option<Uuid>>,
    /// Version the client last saw; enables the stale-write check.
    pub version: Option<i32>,
}

impl UpdateTaskRequest {
    pub fn into_patch(self) -> Result<TaskPatch> {
        let patch = TaskPatch {
            title: self.title,
            description: self.description,
            due_date: self.due_date.map(FlexibleDateTime::into_inner),
            priority: self.priority,
            status: self.status,
            assigned_to_id: self.assigned_to_id,
            expected_version: self.version,
        };
        patch.validate()?;
        Ok(patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskView {
    Assigned,
    Created,
    Overdue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortParam {
    DueDateAsc,
    DueDateDesc,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub view: Option<TaskView>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub sort: Option<SortParam>,
}

impl TaskListQuery {
    /// Resolve the view relative to the caller and the current time.
    pub fn to_filter(&self, actor_id: Uuid, now: DateTime<Utc>) -> TaskListFilter {
        let mut filter = TaskListFilter {
            status: self.status,
            priority: self.priority,
            sort: match self.sort {
                Some(SortParam::DueDateDesc) => TaskSort::DueDateDesc,
                _ => TaskSort::DueDateAsc,
            },
            ..Default::default()
        };
        match self.view {
            Some(TaskView::Assigned) => filter.assigned_to = Some(actor_id),
            Some(TaskView::Created) => filter.created_by = Some(actor_id),
            Some(TaskView::Overdue) => filter.due_before = Some(now),
            None => {}
        }
        filter
    }
}

// =============================================================================
// ACCOUNTS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<()> {
        validate_email(&self.email)?;
        validate_name(&self.name, MAX_USER_NAME_LEN)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNameRequest {
    pub name: String,
}

impl UpdateNameRequest {
    /// Profile renames allow up to `max` characters.
    pub fn validate(&self, max: usize) -> Result<()> {
        validate_name(&self.name, max)
    }
}

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(Error::InvalidInput("Invalid email".to_string())),
    }
}

fn validate_name(name: &str, max: usize) -> Result<()> {
    let len = name.trim().chars().count();
    if len == 0 {
        return Err(Error::InvalidInput("Name is required".to_string()));
    }
    if len > max {
        return Err(Error::InvalidInput(format!("Max {} chars", max)));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(8..=100).contains(&len) {
        return Err(Error::InvalidInput(
            "Password must be 8-100 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn parse(s: &str) -> DateTime<Utc> {
        parse_flexible_datetime(s).unwrap().into_inner()
    }

    #[test]
    fn test_due_date_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 11, 22, 16, 18, 0).unwrap();
        assert_eq!(parse("2025-11-22T16:18:00Z"), expected);
        assert_eq!(parse("2025-11-22T18:18:00+02:00"), expected);
        assert_eq!(parse("2025-11-22T16:18"), expected);
        assert_eq!(parse("2025-11-22T16:18:00"), expected);
        assert_eq!(parse("2025-11-22T16:18:00.000Z"), expected);
        assert_eq!(parse("22-11-2025 16:18"), expected);
        assert_eq!(parse("22/11/2025 16:18"), expected);
        assert_eq!(parse("  22/11/2025T16:18 "), expected);
    }

    #[test]
    fn test_due_date_rejects_garbage() {
        assert!(parse_flexible_datetime("").is_err());
        assert!(parse_flexible_datetime("tomorrow-ish").is_err());
        assert!(parse_flexible_datetime("31/02/2025 10:00").is_err());
    }

    #[test]
    fn test_create_defaults_and_validation() {
        let req: CreateTaskRequest = serde_json::from_value(json!({
            "title": "Write docs",
            "description": "All of them",
            "dueDate": "2030-01-01T09:00"
        }))
        .unwrap();
        assert_eq!(req.priority, Priority::Medium);
        assert_eq!(req.status, TaskStatus::Todo);
        assert_eq!(req.assigned_to_id, None);
        let draft = req.into_draft().unwrap();
        assert_eq!(draft.assigned_to_id, None);

        let long: CreateTaskRequest = serde_json::from_value(json!({
            "title": "x".repeat(101),
            "description": "d",
            "dueDate": "2030-01-01T09:00"
        }))
        .unwrap();
        assert!(matches!(long.into_draft(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_create_rejects_unknown_enum() {
        let res: std::result::Result<CreateTaskRequest, _> = serde_json::from_value(json!({
            "title": "t",
            "description": "d",
            "dueDate": "2030-01-01T09:00",
            "priority": "CRITICAL"
        }));
        assert!(res.is_err());
    }

    #[test]
    fn test_assignee_absent_null_empty_and_id() {
        let absent: UpdateTaskRequest = serde_json::from_value(json!({"title": "t"})).unwrap();
        assert_eq!(absent.assigned_to_id, None);

        let null: UpdateTaskRequest =
            serde_json::from_value(json!({"assignedToId": null})).unwrap();
        assert_eq!(null.assigned_to_id, Some(None));

        let empty: UpdateTaskRequest = serde_json::from_value(json!({"assignedToId": ""})).unwrap();
        assert_eq!(empty.assigned_to_id, Some(None));

        let id = Uuid::now_v7();
        let set: UpdateTaskRequest =
            serde_json::from_value(json!({"assignedToId": id.to_string()})).unwrap();
        assert_eq!(set.assigned_to_id, Some(Some(id)));

        let bad: std::result::Result<UpdateTaskRequest, _> =
            serde_json::from_value(json!({"assignedToId": "not-a-uuid"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_update_patch_carries_version() {
        let req: UpdateTaskRequest =
            serde_json::from_value(json!({"status": "REVIEW", "version": 3})).unwrap();
        let patch = req.into_patch().unwrap();
        assert_eq!(patch.status, Some(TaskStatus::Review));
        assert_eq!(patch.expected_version, Some(3));

        let blank: UpdateTaskRequest = serde_json::from_value(json!({"title": "  "})).unwrap();
        assert!(blank.into_patch().is_err());
    }

    #[test]
    fn test_list_query_views() {
        let me = Uuid::now_v7();
        let now = Utc::now();

        let q = TaskListQuery {
            view: Some(TaskView::Assigned),
            ..Default::default()
        };
        let f = q.to_filter(me, now);
        assert_eq!(f.assigned_to, Some(me));
        assert_eq!(f.sort, TaskSort::DueDateAsc);

        let q = TaskListQuery {
            view: Some(TaskView::Overdue),
            sort: Some(SortParam::DueDateDesc),
            ..Default::default()
        };
        let f = q.to_filter(me, now);
        assert_eq!(f.due_before, Some(now));
        assert_eq!(f.sort, TaskSort::DueDateDesc);

        let f = TaskListQuery {
            view: Some(TaskView::Created),
            ..Default::default()
        }
        .to_filter(me, now);
        assert_eq!(f.created_by, Some(me));
    }

    #[test]
    fn test_account_validation() {
        let ok = RegisterRequest {
            email: "a@example.com".into(),
            name: "Ann".into(),
            password: "longenough".into(),
        };
        assert!(ok.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "nope".into(),
            ..ok
        };
        assert!(bad_email.validate().is_err());

        let short = RegisterRequest {
            email: "a@example.com".into(),
            name: "Ann".into(),
            password: "short".into(),
        };
        assert!(short.validate().is_err());

        let rename = UpdateNameRequest {
            name: "x".repeat(51),
        };
        assert!(rename.validate(MAX_PROFILE_NAME_LEN).is_err());
        assert!(UpdateNameRequest { name: "Bo".into() }
            .validate(MAX_PROFILE_NAME_LEN)
            .is_ok());
    }
}
