//! Single-student document generation: aggregate, lay out, render.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::aggregate::{AggregatedRecord, RecordAggregator};
use crate::error::{ServiceError, ServiceResult};
use crate::layout::{DocumentKind, DocumentLayout, LayoutEngine};
use crate::models::Student;
use crate::render::{DocumentRenderer, RenderError};
use crate::store::RecordStore;

/// What a document covers: its template and, optionally, the semester it is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentRequest {
    pub kind: DocumentKind,
    pub semester: Option<i32>,
}

pub struct RenderedDocument {
    pub student: Student,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub extension: &'static str,
}

#[derive(Clone)]
pub struct DocumentGenerator {
    store: Arc<dyn RecordStore>,
    aggregator: RecordAggregator,
    engine: Arc<LayoutEngine>,
    renderer: Arc<dyn DocumentRenderer>,
}

impl DocumentGenerator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        engine: Arc<LayoutEngine>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        Self {
            aggregator: RecordAggregator::new(store.clone()),
            store,
            engine,
            renderer,
        }
    }

    pub fn renderer(&self) -> &Arc<dyn DocumentRenderer> {
        &self.renderer
    }

    pub async fn record(
        &self,
        student_id: Uuid,
        request: DocumentRequest,
        visible_subjects: Option<&HashSet<Uuid>>,
    ) -> ServiceResult<AggregatedRecord> {
        self.aggregator
            .aggregate(
                student_id,
                request.kind.scope(request.semester),
                request.kind.subject_cap(),
                visible_subjects,
            )
            .await
    }

    pub async fn layout(
        &self,
        student_id: Uuid,
        request: DocumentRequest,
        visible_subjects: Option<&HashSet<Uuid>>,
    ) -> ServiceResult<DocumentLayout> {
        let record = self.record(student_id, request, visible_subjects).await?;
        let branch_name = self
            .store
            .list_branches()
            .await?
            .into_iter()
            .find(|branch| branch.id == record.student.branch_id)
            .map(|branch| branch.name);
        let ctx = self
            .engine
            .context(record, branch_name, Utc::now().date_naive());
        Ok(self.engine.layout(request.kind, &ctx))
    }

    pub async fn render(
        &self,
        student_id: Uuid,
        request: DocumentRequest,
        visible_subjects: Option<&HashSet<Uuid>>,
    ) -> ServiceResult<RenderedDocument> {
        let student = self
            .store
            .get_student(student_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("student", student_id))?;
        let layout = self.layout(student_id, request, visible_subjects).await?;

        let renderer = self.renderer.clone();
        let bytes = tokio::task::spawn_blocking(move || renderer.render(&layout))
            .await
            .map_err(|err| RenderError::Backend(format!("render task failed: {err}")))??;

        Ok(RenderedDocument {
            student,
            bytes,
            content_type: self.renderer.content_type(),
            extension: self.renderer.extension(),
        })
    }
}
