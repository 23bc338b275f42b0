use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use marksheet::auth::jwt::JwtService;
use marksheet::config::{AppConfig, CertificateWording};
use marksheet::db;
use marksheet::layout::{BlockContent, DocumentLayout};
use marksheet::models::{
    Branch, NewExportArchive, NewResultRecord, NewStudent, NewSubject, ResultRecord, Semester,
    Student, Subject,
};
use marksheet::render::{DocumentRenderer, RenderError};
use marksheet::routes;
use marksheet::state::AppState;
use marksheet::storage::ObjectStorage;
use marksheet::store::{
    MarksUpdate, RecordStore, ResultFilter, UpsertOutcome, WriteOutcome,
};
use marksheet::verification::{Role, STATUS_UNVERIFIED, STATUS_VERIFIED};
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    branches: Vec<Branch>,
    semesters: Vec<Semester>,
    students: Vec<Student>,
    subjects: Vec<Subject>,
    allotments: HashSet<(Uuid, Uuid)>,
    results: Vec<ResultRecord>,
    archives: Vec<NewExportArchive>,
}

/// In-process `RecordStore` with the same write rules as the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[allow(dead_code)]
impl MemoryStore {
    pub async fn add_branch(&self, name: &str) -> Branch {
        let branch = Branch {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now().naive_utc(),
        };
        self.tables.lock().await.branches.push(branch.clone());
        branch
    }

    pub async fn add_semester(&self, branch_id: Uuid, number: i32) -> Semester {
        let semester = Semester {
            id: Uuid::new_v4(),
            number,
            branch_id: Some(branch_id),
            created_at: Utc::now().naive_utc(),
        };
        self.tables.lock().await.semesters.push(semester.clone());
        semester
    }

    pub async fn add_student(
        &self,
        name: &str,
        roll_number: &str,
        sex: &str,
        branch_id: Uuid,
        semester_id: Uuid,
    ) -> Student {
        let now = Utc::now().naive_utc();
        let student = Student {
            id: Uuid::new_v4(),
            name: name.to_string(),
            father_name: format!("{name} Senior"),
            mother_name: format!("{name} Mother"),
            username: roll_number.to_string(),
            sex: sex.to_string(),
            branch_id,
            semester_id,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.students.push(student.clone());
        student
    }

    pub async fn add_subject(
        &self,
        name: &str,
        code: Option<&str>,
        kind: &str,
        branch_id: Uuid,
        semester_id: Option<Uuid>,
        max_marks: i32,
    ) -> Subject {
        let now = Utc::now().naive_utc();
        let subject = Subject {
            id: Uuid::new_v4(),
            name: name.to_string(),
            subject_code: code.map(str::to_string),
            kind: kind.to_string(),
            semester_id,
            branch_id,
            max_marks,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.subjects.push(subject.clone());
        subject
    }

    pub async fn allot(&self, teacher_id: Uuid, subject_id: Uuid) {
        self.tables
            .lock()
            .await
            .allotments
            .insert((teacher_id, subject_id));
    }

    pub async fn results(&self) -> Vec<ResultRecord> {
        self.tables.lock().await.results.clone()
    }

    pub async fn students(&self) -> Vec<Student> {
        self.tables.lock().await.students.clone()
    }

    pub async fn subjects(&self) -> Vec<Subject> {
        self.tables.lock().await.subjects.clone()
    }

    pub async fn archives(&self) -> Vec<NewExportArchive> {
        self.tables.lock().await.archives.clone()
    }
}

fn apply(record: &mut ResultRecord, marks: &MarksUpdate) {
    record.sessional_mark = marks.sessional_mark;
    record.end_term_mark = marks.end_term_mark;
    record.overall_mark = marks.overall_mark;
    record.grade = marks.grade.clone();
    record.updated_at = Utc::now().naive_utc();
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
        let tables = self.tables.lock().await;
        Ok(tables.students.iter().find(|s| s.id == id).cloned())
    }

    async fn list_students(&self) -> Result<Vec<Student>> {
        let tables = self.tables.lock().await;
        let mut students = tables.students.clone();
        students.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(students)
    }

    async fn cohort_for_semester(&self, semester_id: Uuid) -> Result<Vec<Student>> {
        let tables = self.tables.lock().await;
        let mut students: Vec<Student> = tables
            .students
            .iter()
            .filter(|s| s.semester_id == semester_id)
            .filter(|s| tables.results.iter().any(|r| r.student_id == s.id))
            .cloned()
            .collect();
        students.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(students)
    }

    async fn insert_students(&self, rows: Vec<NewStudent>) -> Result<usize> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now().naive_utc();
        let mut inserted = 0;
        for row in rows {
            if tables.students.iter().any(|s| s.username == row.username) {
                continue;
            }
            tables.students.push(Student {
                id: row.id,
                name: row.name,
                father_name: row.father_name,
                mother_name: row.mother_name,
                username: row.username,
                sex: row.sex,
                branch_id: row.branch_id,
                semester_id: row.semester_id,
                created_at: now,
                updated_at: now,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        Ok(self.tables.lock().await.branches.clone())
    }

    async fn get_semester(&self, id: Uuid) -> Result<Option<Semester>> {
        let tables = self.tables.lock().await;
        Ok(tables.semesters.iter().find(|s| s.id == id).cloned())
    }

    async fn list_semesters(&self) -> Result<Vec<Semester>> {
        Ok(self.tables.lock().await.semesters.clone())
    }

    async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
        let tables = self.tables.lock().await;
        Ok(tables.subjects.iter().find(|s| s.id == id).cloned())
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>> {
        Ok(self.tables.lock().await.subjects.clone())
    }

    async fn insert_subjects(&self, rows: Vec<NewSubject>) -> Result<usize> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now().naive_utc();
        let mut inserted = 0;
        for row in rows {
            let duplicate = tables.subjects.iter().any(|s| {
                s.branch_id == row.branch_id
                    && s.semester_id == row.semester_id
                    && s.subject_code.is_some()
                    && s.subject_code == row.subject_code
            });
            if duplicate {
                continue;
            }
            tables.subjects.push(Subject {
                id: row.id,
                name: row.name,
                subject_code: row.subject_code,
                kind: row.kind,
                semester_id: row.semester_id,
                branch_id: row.branch_id,
                max_marks: row.max_marks,
                created_at: now,
                updated_at: now,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn allotted_subject_ids(&self, teacher_id: Uuid) -> Result<HashSet<Uuid>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .allotments
            .iter()
            .filter(|(teacher, _)| *teacher == teacher_id)
            .map(|(_, subject)| *subject)
            .collect())
    }

    async fn get_result(&self, id: Uuid) -> Result<Option<ResultRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.results.iter().find(|r| r.id == id).cloned())
    }

    async fn list_results(&self, filter: ResultFilter) -> Result<Vec<ResultRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .results
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn results_with_subjects(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<(ResultRecord, Option<Subject>)>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .results
            .iter()
            .filter(|r| r.student_id == student_id)
            .map(|r| {
                let subject = tables.subjects.iter().find(|s| s.id == r.subject_id).cloned();
                (r.clone(), subject)
            })
            .collect())
    }

    async fn upsert_result(&self, result: NewResultRecord) -> Result<UpsertOutcome> {
        let mut tables = self.tables.lock().await;
        let existing = tables
            .results
            .iter_mut()
            .find(|r| r.student_id == result.student_id && r.subject_id == result.subject_id);
        match existing {
            Some(record) if record.status == STATUS_VERIFIED => {
                Ok(UpsertOutcome::Locked(record.clone()))
            }
            Some(record) if record.teacher_id != result.teacher_id => {
                Ok(UpsertOutcome::NotOwner(record.clone()))
            }
            Some(record) => {
                apply(
                    record,
                    &MarksUpdate {
                        sessional_mark: result.sessional_mark,
                        end_term_mark: result.end_term_mark,
                        overall_mark: result.overall_mark,
                        grade: result.grade.clone(),
                    },
                );
                Ok(UpsertOutcome::Updated(record.clone()))
            }
            None => {
                let now = Utc::now().naive_utc();
                let record = ResultRecord {
                    id: result.id,
                    student_id: result.student_id,
                    subject_id: result.subject_id,
                    teacher_id: result.teacher_id,
                    sessional_mark: result.sessional_mark,
                    end_term_mark: result.end_term_mark,
                    overall_mark: result.overall_mark,
                    grade: result.grade,
                    status: result.status,
                    verified_at: None,
                    created_at: now,
                    updated_at: now,
                };
                tables.results.push(record.clone());
                Ok(UpsertOutcome::Created(record))
            }
        }
    }

    async fn update_result_marks(
        &self,
        id: Uuid,
        marks: MarksUpdate,
    ) -> Result<WriteOutcome<ResultRecord>> {
        let mut tables = self.tables.lock().await;
        match tables.results.iter_mut().find(|r| r.id == id) {
            None => Ok(WriteOutcome::Missing),
            Some(record) if record.status == STATUS_VERIFIED => Ok(WriteOutcome::Locked),
            Some(record) => {
                apply(record, &marks);
                Ok(WriteOutcome::Applied(record.clone()))
            }
        }
    }

    async fn delete_result(&self, id: Uuid) -> Result<WriteOutcome<()>> {
        let mut tables = self.tables.lock().await;
        match tables.results.iter().position(|r| r.id == id) {
            None => Ok(WriteOutcome::Missing),
            Some(idx) if tables.results[idx].status == STATUS_VERIFIED => Ok(WriteOutcome::Locked),
            Some(idx) => {
                tables.results.remove(idx);
                Ok(WriteOutcome::Applied(()))
            }
        }
    }

    async fn verify_results_for_teacher(&self, teacher_id: Uuid) -> Result<usize> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now().naive_utc();
        let mut verified = 0;
        for record in tables
            .results
            .iter_mut()
            .filter(|r| r.teacher_id == teacher_id && r.status == STATUS_UNVERIFIED)
        {
            record.status = STATUS_VERIFIED.to_string();
            record.verified_at = Some(now);
            record.updated_at = now;
            verified += 1;
        }
        Ok(verified)
    }

    async fn record_export_archive(&self, archive: NewExportArchive) -> Result<()> {
        self.tables.lock().await.archives.push(archive);
        Ok(())
    }
}

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
            content_disposition,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

/// Writes the layout as JSON so tests can inspect what a document would contain. Layouts
/// whose text mentions `fail_on` are refused.
#[derive(Default)]
pub struct FakeRenderer {
    pub fail_on: Option<String>,
}

impl DocumentRenderer for FakeRenderer {
    fn render(&self, layout: &DocumentLayout) -> Result<Vec<u8>, RenderError> {
        if let Some(marker) = &self.fail_on {
            let mentions = layout.blocks.iter().any(|block| match &block.content {
                BlockContent::Text { text, .. } | BlockContent::Cell { text, .. } => {
                    text.contains(marker.as_str())
                }
            });
            if mentions {
                return Err(RenderError::Backend(format!("refusing layout with `{marker}`")));
            }
        }
        serde_json::to_vec(layout).map_err(|err| RenderError::Backend(err.to_string()))
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/marksheet_test".to_string(),
        database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "test-audience".to_string(),
        cors_allowed_origin: None,
        aws_endpoint_url: None,
        aws_access_key_id: None,
        aws_secret_access_key: None,
        aws_region: "us-east-1".to_string(),
        s3_bucket: "test-bucket".to_string(),
        institution_name: "Test Institute of Technology".to_string(),
        program_years: 4,
        certificate_wording: CertificateWording::Standard,
        progress_interval_ms: 50,
        batch_retention_minutes: 60,
        archive_url_expiry_seconds: 300,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    router: Router,
    storage: Arc<FakeStorage>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_renderer(FakeRenderer::default())
    }

    pub fn with_renderer(renderer: FakeRenderer) -> Result<Self> {
        let config = test_config();
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(FakeStorage::default());
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(
            store.clone(),
            config,
            storage.clone(),
            jwt,
            Arc::new(renderer),
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            store,
            router,
            storage,
        })
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub fn token(&self, user_id: Uuid, role: Role) -> Result<String> {
        self.state
            .jwt
            .generate_token(user_id, &role.to_string(), chrono::Duration::minutes(30))
    }

    pub async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .map_err(|err| anyhow!("router failed: {err}"))
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body))?).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::DELETE).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn upload_sheet(
        &self,
        path: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        self.send(request).await
    }
}

/// A small cohort: one branch, semesters 1 and 2, two students in semester 2 and two
/// semester-2 subjects allotted to `teacher_id`.
#[allow(dead_code)]
pub struct Fixture {
    pub teacher_id: Uuid,
    pub branch: Branch,
    pub first: Semester,
    pub second: Semester,
    pub students: Vec<Student>,
    pub theory: Subject,
    pub practical: Subject,
}

#[allow(dead_code)]
pub async fn seed(store: &MemoryStore) -> Fixture {
    let teacher_id = Uuid::new_v4();
    let branch = store.add_branch("Computer Science").await;
    let first = store.add_semester(branch.id, 1).await;
    let second = store.add_semester(branch.id, 2).await;
    let students = vec![
        store
            .add_student("Asha Verma", "CS-001", "female", branch.id, second.id)
            .await,
        store
            .add_student("Ravi Kumar", "CS-002", "male", branch.id, second.id)
            .await,
    ];
    let theory = store
        .add_subject(
            "Data Structures",
            Some("CS201"),
            "THEORY",
            branch.id,
            Some(second.id),
            100,
        )
        .await;
    let practical = store
        .add_subject(
            "Data Structures Lab",
            Some("CS201P"),
            "PRACTICAL",
            branch.id,
            Some(second.id),
            50,
        )
        .await;
    store.allot(teacher_id, theory.id).await;
    store.allot(teacher_id, practical.id).await;

    Fixture {
        teacher_id,
        branch,
        first,
        second,
        students,
        theory,
        practical,
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn json_body<T: serde::de::DeserializeOwned>(
    response: hyper::Response<Body>,
) -> Result<T> {
    let bytes = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[allow(dead_code)]
pub fn assert_status(response: &hyper::Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected response status");
}
