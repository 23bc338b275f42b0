//! Data-access seam between the result pipeline and persisted records.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Branch, NewExportArchive, NewResultRecord, NewStudent, NewSubject, ResultRecord, Semester,
    Student, Subject,
};

pub mod postgres;

pub use postgres::PgRecordStore;

#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub student_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    /// Restricts results to these subjects; `None` means no restriction.
    pub subject_ids: Option<HashSet<Uuid>>,
}

impl ResultFilter {
    pub fn matches(&self, result: &ResultRecord) -> bool {
        self.student_id.map_or(true, |id| result.student_id == id)
            && self.subject_id.map_or(true, |id| result.subject_id == id)
            && self
                .subject_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&result.subject_id))
    }
}

/// New marks for an existing result, graded by the caller before the write.
#[derive(Debug, Clone)]
pub struct MarksUpdate {
    pub sessional_mark: Option<f64>,
    pub end_term_mark: f64,
    pub overall_mark: f64,
    pub grade: String,
}

#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    Created(ResultRecord),
    Updated(ResultRecord),
    /// The existing record is verified and was left untouched.
    Locked(ResultRecord),
    /// The existing record belongs to another teacher and was left untouched.
    NotOwner(ResultRecord),
}

#[derive(Debug, Clone)]
pub enum WriteOutcome<T> {
    Applied(T),
    Locked,
    Missing,
}

/// Every result write is a single atomic statement (or transaction) per record, and
/// writes against verified records are refused here rather than by callers.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn get_student(&self, id: Uuid) -> Result<Option<Student>>;

    async fn list_students(&self) -> Result<Vec<Student>>;

    /// Students currently in `semester_id` with at least one result, ordered by roll number.
    async fn cohort_for_semester(&self, semester_id: Uuid) -> Result<Vec<Student>>;

    /// Inserts students, skipping roll numbers that already exist. Returns the inserted count.
    async fn insert_students(&self, students: Vec<NewStudent>) -> Result<usize>;

    async fn list_branches(&self) -> Result<Vec<Branch>>;

    async fn get_semester(&self, id: Uuid) -> Result<Option<Semester>>;

    async fn list_semesters(&self) -> Result<Vec<Semester>>;

    async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>>;

    async fn list_subjects(&self) -> Result<Vec<Subject>>;

    /// Inserts subjects, skipping duplicates of an existing code in the same branch and semester.
    async fn insert_subjects(&self, subjects: Vec<NewSubject>) -> Result<usize>;

    async fn allotted_subject_ids(&self, teacher_id: Uuid) -> Result<HashSet<Uuid>>;

    async fn get_result(&self, id: Uuid) -> Result<Option<ResultRecord>>;

    async fn list_results(&self, filter: ResultFilter) -> Result<Vec<ResultRecord>>;

    /// All results of a student, each joined to its subject when the subject still exists.
    async fn results_with_subjects(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<(ResultRecord, Option<Subject>)>>;

    /// Creates or replaces the result for `(student_id, subject_id)` unless it is verified or
    /// authored by a different teacher. The author never changes.
    async fn upsert_result(&self, result: NewResultRecord) -> Result<UpsertOutcome>;

    async fn update_result_marks(
        &self,
        id: Uuid,
        marks: MarksUpdate,
    ) -> Result<WriteOutcome<ResultRecord>>;

    async fn delete_result(&self, id: Uuid) -> Result<WriteOutcome<()>>;

    /// Marks every unverified result authored by the teacher as verified in one statement.
    async fn verify_results_for_teacher(&self, teacher_id: Uuid) -> Result<usize>;

    async fn record_export_archive(&self, archive: NewExportArchive) -> Result<()>;
}
