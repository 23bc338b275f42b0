use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grading::Grade;
use crate::schema::*;
use crate::verification::VerificationStatus;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = branches)]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = semesters)]
pub struct Semester {
    pub id: Uuid,
    pub number: i32,
    pub branch_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

/// Tri-state sex field; anything other than male/female reads as `Unspecified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
    Unspecified,
}

impl Sex {
    pub fn from_column(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Sex::Male,
            "female" | "f" => Sex::Female,
            _ => Sex::Unspecified,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
            Sex::Unspecified => "unspecified",
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = students)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub father_name: String,
    pub mother_name: String,
    /// Roll number.
    pub username: String,
    pub sex: String,
    pub branch_id: Uuid,
    pub semester_id: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Student {
    pub fn sex(&self) -> Sex {
        Sex::from_column(&self.sex)
    }
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = students)]
pub struct NewStudent {
    pub id: Uuid,
    pub name: String,
    pub father_name: String,
    pub mother_name: String,
    pub username: String,
    pub sex: String,
    pub branch_id: Uuid,
    pub semester_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubjectKind {
    Theory,
    Practical,
}

impl SubjectKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "THEORY" => Some(SubjectKind::Theory),
            "PRACTICAL" => Some(SubjectKind::Practical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubjectKind::Theory => "THEORY",
            SubjectKind::Practical => "PRACTICAL",
        }
    }

    pub fn default_max_marks(self) -> i32 {
        match self {
            SubjectKind::Theory => 100,
            SubjectKind::Practical => 50,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = subjects)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub subject_code: Option<String>,
    pub kind: String,
    pub semester_id: Option<Uuid>,
    pub branch_id: Uuid,
    pub max_marks: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = subjects)]
pub struct NewSubject {
    pub id: Uuid,
    pub name: String,
    pub subject_code: Option<String>,
    pub kind: String,
    pub semester_id: Option<Uuid>,
    pub branch_id: Uuid,
    pub max_marks: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = results)]
#[diesel(belongs_to(Student))]
#[diesel(belongs_to(Subject))]
pub struct ResultRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Uuid,
    pub sessional_mark: Option<f64>,
    pub end_term_mark: f64,
    pub overall_mark: f64,
    pub grade: String,
    pub status: String,
    pub verified_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ResultRecord {
    pub fn status(&self) -> VerificationStatus {
        VerificationStatus::from_column(&self.status)
    }

    /// The grade snapshotted at write time; an unreadable value is reported as `E`.
    pub fn grade(&self) -> Grade {
        self.grade.parse().unwrap_or(Grade::E)
    }

    /// Sessional plus end-term marks as printed on documents.
    pub fn obtained_marks(&self) -> f64 {
        self.sessional_mark.unwrap_or(0.0) + self.end_term_mark
    }
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = results)]
pub struct NewResultRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Uuid,
    pub sessional_mark: Option<f64>,
    pub end_term_mark: f64,
    pub overall_mark: f64,
    pub grade: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = export_archives)]
pub struct ExportArchive {
    pub id: Uuid,
    pub semester_id: Uuid,
    pub document_kind: String,
    pub total: i32,
    pub succeeded: i32,
    pub skipped: i32,
    pub storage_key: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = export_archives)]
pub struct NewExportArchive {
    pub id: Uuid,
    pub semester_id: Uuid,
    pub document_kind: String,
    pub total: i32,
    pub succeeded: i32,
    pub skipped: i32,
    pub storage_key: String,
    pub size_bytes: i64,
    pub checksum: String,
}
