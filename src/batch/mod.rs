//! Cohort-wide document export: one archive per batch, with live progress.

pub mod archive;
pub mod progress;
pub mod registry;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::documents::{DocumentGenerator, DocumentRequest};
use crate::error::{ServiceError, ServiceResult};
use crate::layout::DocumentKind;
use crate::models::{NewExportArchive, Semester, Student};
use crate::storage::ObjectStorage;
use crate::store::{RecordStore, ResultFilter};
use crate::verification::Actor;
use archive::{entry_name, ArchiveBuilder};
use progress::ProgressTracker;
use registry::BatchRegistry;

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CohortSelector {
    pub semester_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct Cohort {
    pub semester: Semester,
    pub students: Vec<Student>,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub selector: CohortSelector,
    pub kind: DocumentKind,
    /// Subjects the requester may see; `None` for unrestricted access.
    pub visible_subjects: Option<HashSet<Uuid>>,
    pub requested_by: Actor,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedStudent {
    pub student_id: Uuid,
    pub roll_number: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub storage_key: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    pub skipped: Vec<SkippedStudent>,
    /// Absent when no student produced a document.
    pub archive: Option<ArchiveInfo>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchStarted {
    pub batch_id: Uuid,
    pub total: usize,
}

pub fn archive_key(semester_id: Uuid, batch_id: Uuid) -> String {
    format!("exports/{semester_id}/{batch_id}.zip")
}

pub struct BatchPipeline {
    store: Arc<dyn RecordStore>,
    documents: DocumentGenerator,
    storage: Arc<dyn ObjectStorage>,
}

impl BatchPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        documents: DocumentGenerator,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            store,
            documents,
            storage,
        }
    }

    /// Students in the semester with at least one result the requester can see.
    pub async fn resolve_cohort(
        &self,
        selector: CohortSelector,
        visible_subjects: Option<&HashSet<Uuid>>,
    ) -> ServiceResult<Cohort> {
        let semester = self
            .store
            .get_semester(selector.semester_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("semester", selector.semester_id))?;
        let mut students = self.store.cohort_for_semester(semester.id).await?;

        if let Some(visible) = visible_subjects {
            let with_visible_results: HashSet<Uuid> = self
                .store
                .list_results(ResultFilter {
                    subject_ids: Some(visible.clone()),
                    ..ResultFilter::default()
                })
                .await?
                .into_iter()
                .map(|result| result.student_id)
                .collect();
            students.retain(|student| with_visible_results.contains(&student.id));
        }

        if students.is_empty() {
            return Err(ServiceError::EmptyCohort(semester.id));
        }
        Ok(Cohort { semester, students })
    }

    /// Generates every student's document in cohort order. A student whose document fails is
    /// skipped and reported; storage failures end the batch.
    pub async fn run(
        &self,
        batch_id: Uuid,
        request: &BatchRequest,
        cohort: Cohort,
        tracker: &ProgressTracker,
    ) -> ServiceResult<BatchSummary> {
        let total = cohort.students.len();
        let document = DocumentRequest {
            kind: request.kind,
            semester: Some(cohort.semester.number),
        };
        let mut builder = ArchiveBuilder::create()?;
        let mut skipped = Vec::new();

        for student in &cohort.students {
            match self
                .documents
                .render(student.id, document, request.visible_subjects.as_ref())
                .await
            {
                Ok(rendered) => {
                    let name = entry_name(&student.name, &student.username, rendered.extension);
                    builder.append(&name, &rendered.bytes)?;
                    tracker.record(true);
                }
                Err(err) => {
                    warn!(
                        batch_id = %batch_id,
                        student_id = %student.id,
                        error = %err,
                        "skipping student in export batch"
                    );
                    skipped.push(SkippedStudent {
                        student_id: student.id,
                        roll_number: student.username.clone(),
                        reason: err.to_string(),
                    });
                    tracker.record(false);
                }
            }
        }

        let succeeded = total - skipped.len();
        let archive = if succeeded > 0 {
            let finished = builder.finish()?;
            let storage_key = archive_key(cohort.semester.id, batch_id);
            let disposition = format!(
                "attachment; filename=\"semester-{}-{}.zip\"",
                cohort.semester.number, request.kind
            );
            self.storage
                .put_file(
                    &storage_key,
                    finished.path(),
                    Some("application/zip".to_string()),
                    Some(disposition),
                )
                .await?;
            self.store
                .record_export_archive(NewExportArchive {
                    id: batch_id,
                    semester_id: cohort.semester.id,
                    document_kind: request.kind.as_str().to_string(),
                    total: total as i32,
                    succeeded: succeeded as i32,
                    skipped: skipped.len() as i32,
                    storage_key: storage_key.clone(),
                    size_bytes: finished.size_bytes as i64,
                    checksum: finished.checksum.clone(),
                })
                .await?;
            Some(ArchiveInfo {
                storage_key,
                size_bytes: finished.size_bytes,
                checksum: finished.checksum,
                entries: finished.entries,
            })
        } else {
            None
        };

        info!(
            batch_id = %batch_id,
            total,
            succeeded,
            skipped = skipped.len(),
            "export batch finished"
        );

        Ok(BatchSummary {
            batch_id,
            total,
            succeeded,
            skipped,
            archive,
        })
    }

    /// Resolves the cohort, registers the batch and runs it in the background. An empty cohort
    /// fails here, before any progress channel or archive exists.
    pub async fn start(
        self: &Arc<Self>,
        registry: &Arc<BatchRegistry>,
        request: BatchRequest,
    ) -> ServiceResult<BatchStarted> {
        let cohort = self
            .resolve_cohort(request.selector, request.visible_subjects.as_ref())
            .await?;
        let batch_id = Uuid::new_v4();
        let total = cohort.students.len();
        let tracker = ProgressTracker::new(total);
        registry.register(
            batch_id,
            cohort.semester.id,
            request.kind,
            request.requested_by,
            tracker.subscribe(),
        );
        info!(
            batch_id = %batch_id,
            semester_id = %cohort.semester.id,
            kind = %request.kind,
            total,
            "export batch started"
        );

        let pipeline = Arc::clone(self);
        let registry = Arc::clone(registry);
        tokio::spawn(async move {
            let outcome = pipeline
                .run(batch_id, &request, cohort, &tracker)
                .await
                .map_err(|err| {
                    error!(batch_id = %batch_id, error = %err, "export batch failed");
                    err.to_string()
                });
            registry.complete(batch_id, outcome);
            tracker.finish();
            // closes the progress channel for any remaining subscribers
            drop(tracker);
        });

        Ok(BatchStarted { batch_id, total })
    }
}
