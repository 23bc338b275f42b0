use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::select;
use uuid::Uuid;

use super::{MarksUpdate, RecordStore, ResultFilter, UpsertOutcome, WriteOutcome};
use crate::db::{self, PgPool};
use crate::models::{
    Branch, NewExportArchive, NewResultRecord, NewStudent, NewSubject, ResultRecord, Semester,
    Student, Subject,
};
use crate::schema::{
    branches, export_archives, results, semesters, students, subjects, teacher_subjects,
};
use crate::verification::{STATUS_UNVERIFIED, STATUS_VERIFIED};

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        db::run_blocking(&self.pool, f).await
    }
}

fn apply_marks(
    conn: &mut PgConnection,
    id: Uuid,
    marks: &MarksUpdate,
) -> QueryResult<Option<ResultRecord>> {
    let target = results::table
        .filter(results::id.eq(id))
        .filter(results::status.eq(STATUS_UNVERIFIED));

    diesel::update(target)
        .set((
            results::sessional_mark.eq(marks.sessional_mark),
            results::end_term_mark.eq(marks.end_term_mark),
            results::overall_mark.eq(marks.overall_mark),
            results::grade.eq(marks.grade.as_str()),
            results::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result::<ResultRecord>(conn)
        .optional()
}

fn locked_or_missing<T>(conn: &mut PgConnection, id: Uuid) -> QueryResult<WriteOutcome<T>> {
    let present: bool = select(exists(results::table.filter(results::id.eq(id)))).get_result(conn)?;
    Ok(if present {
        WriteOutcome::Locked
    } else {
        WriteOutcome::Missing
    })
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
        self.with_conn(move |conn| {
            Ok(students::table
                .find(id)
                .first::<Student>(conn)
                .optional()?)
        })
        .await
    }

    async fn list_students(&self) -> Result<Vec<Student>> {
        self.with_conn(|conn| {
            Ok(students::table
                .order(students::username.asc())
                .load::<Student>(conn)?)
        })
        .await
    }

    async fn cohort_for_semester(&self, semester_id: Uuid) -> Result<Vec<Student>> {
        self.with_conn(move |conn| {
            Ok(students::table
                .filter(students::semester_id.eq(semester_id))
                .filter(exists(
                    results::table.filter(results::student_id.eq(students::id)),
                ))
                .order(students::username.asc())
                .load::<Student>(conn)?)
        })
        .await
    }

    async fn insert_students(&self, rows: Vec<NewStudent>) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.with_conn(move |conn| {
            Ok(diesel::insert_into(students::table)
                .values(&rows)
                .on_conflict(students::username)
                .do_nothing()
                .execute(conn)?)
        })
        .await
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        self.with_conn(|conn| Ok(branches::table.order(branches::name.asc()).load(conn)?))
            .await
    }

    async fn get_semester(&self, id: Uuid) -> Result<Option<Semester>> {
        self.with_conn(move |conn| Ok(semesters::table.find(id).first(conn).optional()?))
            .await
    }

    async fn list_semesters(&self) -> Result<Vec<Semester>> {
        self.with_conn(|conn| {
            Ok(semesters::table
                .order(semesters::number.asc())
                .load(conn)?)
        })
        .await
    }

    async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
        self.with_conn(move |conn| Ok(subjects::table.find(id).first(conn).optional()?))
            .await
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>> {
        self.with_conn(|conn| Ok(subjects::table.order(subjects::name.asc()).load(conn)?))
            .await
    }

    async fn insert_subjects(&self, rows: Vec<NewSubject>) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.with_conn(move |conn| {
            Ok(diesel::insert_into(subjects::table)
                .values(&rows)
                .on_conflict_do_nothing()
                .execute(conn)?)
        })
        .await
    }

    async fn allotted_subject_ids(&self, teacher_id: Uuid) -> Result<HashSet<Uuid>> {
        self.with_conn(move |conn| {
            let ids: Vec<Uuid> = teacher_subjects::table
                .filter(teacher_subjects::teacher_id.eq(teacher_id))
                .select(teacher_subjects::subject_id)
                .load(conn)?;
            Ok(ids.into_iter().collect())
        })
        .await
    }

    async fn get_result(&self, id: Uuid) -> Result<Option<ResultRecord>> {
        self.with_conn(move |conn| Ok(results::table.find(id).first(conn).optional()?))
            .await
    }

    async fn list_results(&self, filter: ResultFilter) -> Result<Vec<ResultRecord>> {
        self.with_conn(move |conn| {
            let mut query = results::table.into_boxed();
            if let Some(student_id) = filter.student_id {
                query = query.filter(results::student_id.eq(student_id));
            }
            if let Some(subject_id) = filter.subject_id {
                query = query.filter(results::subject_id.eq(subject_id));
            }
            if let Some(subject_ids) = filter.subject_ids {
                let ids: Vec<Uuid> = subject_ids.into_iter().collect();
                query = query.filter(results::subject_id.eq_any(ids));
            }
            Ok(query
                .order(results::created_at.asc())
                .load::<ResultRecord>(conn)?)
        })
        .await
    }

    async fn results_with_subjects(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<(ResultRecord, Option<Subject>)>> {
        self.with_conn(move |conn| {
            Ok(results::table
                .left_join(subjects::table)
                .filter(results::student_id.eq(student_id))
                .order(results::created_at.asc())
                .load::<(ResultRecord, Option<Subject>)>(conn)?)
        })
        .await
    }

    async fn upsert_result(&self, result: NewResultRecord) -> Result<UpsertOutcome> {
        self.with_conn(move |conn| {
            let outcome = conn.transaction::<_, diesel::result::Error, _>(|conn| {
                let marks = MarksUpdate {
                    sessional_mark: result.sessional_mark,
                    end_term_mark: result.end_term_mark,
                    overall_mark: result.overall_mark,
                    grade: result.grade.clone(),
                };

                let existing = results::table
                    .filter(results::student_id.eq(result.student_id))
                    .filter(results::subject_id.eq(result.subject_id))
                    .for_update()
                    .first::<ResultRecord>(conn)
                    .optional()?;

                let existing = match existing {
                    Some(row) => row,
                    None => {
                        let inserted = diesel::insert_into(results::table)
                            .values(&result)
                            .on_conflict((results::student_id, results::subject_id))
                            .do_nothing()
                            .get_result::<ResultRecord>(conn)
                            .optional()?;
                        if let Some(row) = inserted {
                            return Ok(UpsertOutcome::Created(row));
                        }
                        // lost an insert race; lock the winner's row
                        results::table
                            .filter(results::student_id.eq(result.student_id))
                            .filter(results::subject_id.eq(result.subject_id))
                            .for_update()
                            .first::<ResultRecord>(conn)?
                    }
                };

                if existing.status == STATUS_VERIFIED {
                    return Ok(UpsertOutcome::Locked(existing));
                }
                if existing.teacher_id != result.teacher_id {
                    return Ok(UpsertOutcome::NotOwner(existing));
                }

                match apply_marks(conn, existing.id, &marks)? {
                    Some(row) => Ok(UpsertOutcome::Updated(row)),
                    None => Ok(UpsertOutcome::Locked(existing)),
                }
            })?;
            Ok(outcome)
        })
        .await
    }

    async fn update_result_marks(
        &self,
        id: Uuid,
        marks: MarksUpdate,
    ) -> Result<WriteOutcome<ResultRecord>> {
        self.with_conn(move |conn| match apply_marks(conn, id, &marks)? {
            Some(row) => Ok(WriteOutcome::Applied(row)),
            None => Ok(locked_or_missing(conn, id)?),
        })
        .await
    }

    async fn delete_result(&self, id: Uuid) -> Result<WriteOutcome<()>> {
        self.with_conn(move |conn| {
            let deleted = diesel::delete(
                results::table
                    .filter(results::id.eq(id))
                    .filter(results::status.eq(STATUS_UNVERIFIED)),
            )
            .execute(conn)?;
            if deleted > 0 {
                Ok(WriteOutcome::Applied(()))
            } else {
                Ok(locked_or_missing(conn, id)?)
            }
        })
        .await
    }

    async fn verify_results_for_teacher(&self, teacher_id: Uuid) -> Result<usize> {
        self.with_conn(move |conn| {
            let now = Utc::now().naive_utc();
            Ok(diesel::update(
                results::table
                    .filter(results::teacher_id.eq(teacher_id))
                    .filter(results::status.eq(STATUS_UNVERIFIED)),
            )
            .set((
                results::status.eq(STATUS_VERIFIED),
                results::verified_at.eq(Some(now)),
                results::updated_at.eq(now),
            ))
            .execute(conn)?)
        })
        .await
    }

    async fn record_export_archive(&self, archive: NewExportArchive) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(export_archives::table)
                .values(&archive)
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
