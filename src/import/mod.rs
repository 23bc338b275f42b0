//! Bulk spreadsheet import of results, subjects and students.

pub mod reconcile;
pub mod sheet;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::store::RecordStore;
use crate::verification::{Actor, ResultService, Role};
use reconcile::{
    reconcile, AcceptedRecord, DuplicatePolicy, ImportKind, ReferenceIndex, RejectReason,
    RejectedRow,
};
use sheet::{parse_sheet, SheetError, SheetFormat};

impl From<SheetError> for ServiceError {
    fn from(value: SheetError) -> Self {
        match value {
            SheetError::MissingColumn(column) => ServiceError::MissingColumn(column),
            other => ServiceError::Validation(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowWarning {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub kind: ImportKind,
    pub rows: usize,
    pub accepted: usize,
    /// Accepted rows that changed stored data.
    pub applied: usize,
    pub rejected: Vec<RejectedRow>,
    pub warnings: Vec<RowWarning>,
}

#[derive(Clone)]
pub struct Importer {
    store: Arc<dyn RecordStore>,
    results: ResultService,
}

impl Importer {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            results: ResultService::new(store.clone()),
            store,
        }
    }

    async fn reference_index(&self) -> ServiceResult<ReferenceIndex> {
        Ok(ReferenceIndex::new(
            self.store.list_students().await?,
            self.store.list_subjects().await?,
            self.store.list_branches().await?,
            self.store.list_semesters().await?,
        ))
    }

    /// Parses and reconciles an upload, then applies accepted rows. Results go through the
    /// verification rules one row at a time, so a refused row never blocks the rest.
    pub async fn import(
        &self,
        actor: &Actor,
        kind: ImportKind,
        bytes: &[u8],
        format: SheetFormat,
        policy: DuplicatePolicy,
    ) -> ServiceResult<ImportReport> {
        match kind {
            ImportKind::Results if actor.role != Role::Teacher => {
                return Err(ServiceError::Forbidden(
                    "only teachers import results".to_string(),
                ))
            }
            ImportKind::Subjects | ImportKind::Students if !actor.role.is_privileged() => {
                return Err(ServiceError::Forbidden(format!(
                    "{} cannot import {kind:?}",
                    actor.role
                )))
            }
            _ => {}
        }

        let sheet = parse_sheet(bytes, format)?;
        sheet.require_columns(kind.required_columns())?;

        let index = self.reference_index().await?;
        let outcome = reconcile(&sheet, kind, &index, policy);
        let accepted = outcome.accepted.len();
        let mut rejected = outcome.rejected;
        let mut warnings = Vec::new();
        let mut applied = 0;

        let mut subjects = Vec::new();
        let mut students = Vec::new();
        for record in outcome.accepted {
            match record {
                AcceptedRecord::Result(row) => {
                    if let Some(message) = row.warning.clone() {
                        warnings.push(RowWarning {
                            line: row.line,
                            message,
                        });
                    }
                    match self.results.submit_result(actor, row.submit).await {
                        Ok(_) => applied += 1,
                        Err(err) => {
                            let reason = match err {
                                ServiceError::NotAllotted { .. } => RejectReason::NotAllotted {
                                    subject_code: row.subject_code,
                                },
                                ServiceError::ResultLocked(result_id) => {
                                    RejectReason::ResultLocked { result_id }
                                }
                                ServiceError::Storage(err) => return Err(ServiceError::Storage(err)),
                                other => RejectReason::Refused {
                                    message: other.to_string(),
                                },
                            };
                            rejected.push(RejectedRow {
                                line: row.line,
                                reason,
                            });
                        }
                    }
                }
                AcceptedRecord::Subject { subject, .. } => subjects.push(subject),
                AcceptedRecord::Student { student, .. } => students.push(student),
            }
        }
        applied += self.store.insert_subjects(subjects).await?;
        applied += self.store.insert_students(students).await?;
        rejected.sort_by_key(|row| row.line);

        if !rejected.is_empty() {
            warn!(actor_id = %actor.id, ?kind, rejected = rejected.len(), "import rows rejected");
        }
        info!(
            actor_id = %actor.id,
            ?kind,
            rows = sheet.rows.len(),
            accepted,
            applied,
            "import finished"
        );

        Ok(ImportReport {
            kind,
            rows: sheet.rows.len(),
            accepted,
            applied,
            rejected,
            warnings,
        })
    }
}
