//! Result lifecycle: submission, correction and the one-way verification lock.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::grading::{self, Grade};
use crate::models::{NewResultRecord, ResultRecord, Subject};
use crate::store::{MarksUpdate, RecordStore, ResultFilter, UpsertOutcome, WriteOutcome};

pub const STATUS_UNVERIFIED: &str = "unverified";
pub const STATUS_VERIFIED: &str = "verified";
pub const SESSIONAL_MAX: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Verified,
}

impl VerificationStatus {
    pub fn from_column(value: &str) -> Self {
        if value == STATUS_VERIFIED {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Unverified
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Unverified => STATUS_UNVERIFIED,
            VerificationStatus::Verified => STATUS_VERIFIED,
        }
    }

    /// The only transition; verifying a verified record is a no-op.
    pub fn verify(self) -> Self {
        VerificationStatus::Verified
    }

    pub fn is_locked(self) -> bool {
        self == VerificationStatus::Verified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Registrar,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "teacher" => Some(Role::Teacher),
            "registrar" => Some(Role::Registrar),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Registrars and admins see every subject and may act on behalf of teachers.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Registrar | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::Teacher => "teacher",
            Role::Registrar => "registrar",
            Role::Admin => "admin",
        };
        f.write_str(label)
    }
}

/// The caller of a result operation, as resolved by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Marks {
    #[serde(default)]
    pub sessional_mark: Option<f64>,
    pub end_term_mark: f64,
    #[serde(default)]
    pub overall_mark: Option<f64>,
}

/// Marks checked against the subject's limits, with the overall mark settled and graded.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedMarks {
    pub sessional_mark: Option<f64>,
    pub end_term_mark: f64,
    pub overall_mark: f64,
    pub grade: Grade,
}

impl GradedMarks {
    fn into_update(self) -> MarksUpdate {
        MarksUpdate {
            sessional_mark: self.sessional_mark,
            end_term_mark: self.end_term_mark,
            overall_mark: self.overall_mark,
            grade: self.grade.as_str().to_string(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn check_range(label: &str, value: f64, max: f64) -> ServiceResult<()> {
    if !value.is_finite() || value < 0.0 || value > max {
        return Err(ServiceError::Validation(format!(
            "{label} must be between 0 and {max}, got {value}"
        )));
    }
    Ok(())
}

/// Validates marks for `subject` and snapshots the grade. When no overall mark is given it is
/// the obtained share of the applicable maximum, as a percentage.
pub fn grade_marks(marks: &Marks, subject: &Subject) -> ServiceResult<GradedMarks> {
    let subject_max = f64::from(subject.max_marks.max(0));
    if let Some(sessional) = marks.sessional_mark {
        check_range("sessional mark", sessional, SESSIONAL_MAX)?;
    }
    check_range("end-term mark", marks.end_term_mark, subject_max)?;

    let overall_mark = match marks.overall_mark {
        Some(overall) => {
            check_range("overall mark", overall, 100.0)?;
            overall
        }
        None => {
            let max = subject_max + marks.sessional_mark.map_or(0.0, |_| SESSIONAL_MAX);
            let obtained = marks.sessional_mark.unwrap_or(0.0) + marks.end_term_mark;
            if max > 0.0 {
                round2(obtained / max * 100.0)
            } else {
                0.0
            }
        }
    };

    Ok(GradedMarks {
        sessional_mark: marks.sessional_mark,
        end_term_mark: marks.end_term_mark,
        overall_mark,
        grade: grading::grade(overall_mark),
    })
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitResult {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    #[serde(flatten)]
    pub marks: Marks,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub result: ResultRecord,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct VerifySummary {
    pub teacher_id: Uuid,
    pub verified: usize,
}

#[derive(Clone)]
pub struct ResultService {
    store: Arc<dyn RecordStore>,
}

impl ResultService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Subjects the actor may read and write results for. `None` means every subject.
    pub async fn visible_subject_ids(&self, actor: &Actor) -> ServiceResult<Option<HashSet<Uuid>>> {
        if actor.role.is_privileged() {
            return Ok(None);
        }
        Ok(Some(self.store.allotted_subject_ids(actor.id).await?))
    }

    pub async fn list_visible_subjects(&self, actor: &Actor) -> ServiceResult<Vec<Subject>> {
        let subjects = self.store.list_subjects().await?;
        match self.visible_subject_ids(actor).await? {
            None => Ok(subjects),
            Some(allowed) => Ok(subjects
                .into_iter()
                .filter(|subject| allowed.contains(&subject.id))
                .collect()),
        }
    }

    pub async fn list_visible_results(
        &self,
        actor: &Actor,
        mut filter: ResultFilter,
    ) -> ServiceResult<Vec<ResultRecord>> {
        filter.subject_ids = self.visible_subject_ids(actor).await?;
        Ok(self.store.list_results(filter).await?)
    }

    pub async fn submit_result(
        &self,
        actor: &Actor,
        request: SubmitResult,
    ) -> ServiceResult<SubmitOutcome> {
        if actor.role != Role::Teacher {
            return Err(ServiceError::Forbidden(format!(
                "only teachers submit results, not {}",
                actor.role
            )));
        }

        let allotted = self.store.allotted_subject_ids(actor.id).await?;
        if !allotted.contains(&request.subject_id) {
            warn!(teacher_id = %actor.id, subject_id = %request.subject_id, "result submission for subject outside allotment");
            return Err(ServiceError::NotAllotted {
                teacher_id: actor.id,
                subject_id: request.subject_id,
            });
        }

        let subject = self
            .store
            .get_subject(request.subject_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("subject", request.subject_id))?;
        if self.store.get_student(request.student_id).await?.is_none() {
            return Err(ServiceError::not_found("student", request.student_id));
        }

        let graded = grade_marks(&request.marks, &subject)?;
        let record = NewResultRecord {
            id: Uuid::new_v4(),
            student_id: request.student_id,
            subject_id: request.subject_id,
            teacher_id: actor.id,
            sessional_mark: graded.sessional_mark,
            end_term_mark: graded.end_term_mark,
            overall_mark: graded.overall_mark,
            grade: graded.grade.as_str().to_string(),
            status: STATUS_UNVERIFIED.to_string(),
        };

        match self.store.upsert_result(record).await? {
            UpsertOutcome::Created(result) => Ok(SubmitOutcome {
                result,
                created: true,
            }),
            UpsertOutcome::Updated(result) => Ok(SubmitOutcome {
                result,
                created: false,
            }),
            UpsertOutcome::Locked(existing) => Err(ServiceError::ResultLocked(existing.id)),
            UpsertOutcome::NotOwner(existing) => {
                warn!(teacher_id = %actor.id, result_id = %existing.id, "submission over another teacher's result");
                Err(ServiceError::Forbidden(
                    "results can only be changed by their author".to_string(),
                ))
            }
        }
    }

    async fn load_owned(&self, actor: &Actor, result_id: Uuid) -> ServiceResult<ResultRecord> {
        let result = self
            .store
            .get_result(result_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("result", result_id))?;
        if actor.role != Role::Admin && result.teacher_id != actor.id {
            return Err(ServiceError::Forbidden(
                "results can only be changed by their author".to_string(),
            ));
        }
        if result.status().is_locked() {
            return Err(ServiceError::ResultLocked(result.id));
        }
        Ok(result)
    }

    pub async fn update_result(
        &self,
        actor: &Actor,
        result_id: Uuid,
        marks: Marks,
    ) -> ServiceResult<ResultRecord> {
        let existing = self.load_owned(actor, result_id).await?;
        let subject = self
            .store
            .get_subject(existing.subject_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("subject", existing.subject_id))?;
        let graded = grade_marks(&marks, &subject)?;

        match self
            .store
            .update_result_marks(result_id, graded.into_update())
            .await?
        {
            WriteOutcome::Applied(result) => Ok(result),
            WriteOutcome::Locked => Err(ServiceError::ResultLocked(result_id)),
            WriteOutcome::Missing => Err(ServiceError::not_found("result", result_id)),
        }
    }

    pub async fn delete_result(&self, actor: &Actor, result_id: Uuid) -> ServiceResult<()> {
        self.load_owned(actor, result_id).await?;
        match self.store.delete_result(result_id).await? {
            WriteOutcome::Applied(()) => Ok(()),
            WriteOutcome::Locked => Err(ServiceError::ResultLocked(result_id)),
            WriteOutcome::Missing => Err(ServiceError::not_found("result", result_id)),
        }
    }

    /// Locks every unverified result authored by `teacher_id`. Teachers may only lock their
    /// own results; registrars and admins may lock on a teacher's behalf.
    pub async fn verify_results(
        &self,
        actor: &Actor,
        teacher_id: Uuid,
    ) -> ServiceResult<VerifySummary> {
        if actor.id != teacher_id && !actor.role.is_privileged() {
            return Err(ServiceError::Forbidden(
                "teachers can only verify their own results".to_string(),
            ));
        }

        let verified = self.store.verify_results_for_teacher(teacher_id).await?;
        info!(teacher_id = %teacher_id, actor_id = %actor.id, verified, "results verified");
        Ok(VerifySummary {
            teacher_id,
            verified,
        })
    }
}
