//! Natural-key resolution and row validation for spreadsheet imports.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sheet::{Sheet, SheetRow};
use crate::aggregate::subject_code;
use crate::grading::{self, Grade};
use crate::models::{Branch, NewStudent, NewSubject, Semester, Sex, Student, Subject, SubjectKind};
use crate::verification::{grade_marks, Marks, SubmitResult, SESSIONAL_MAX};

pub const ROLL_NO: &str = "Roll No";
pub const SUBJECT_CODE: &str = "Subject Code";
pub const OVERALL_MARK: &str = "Overall Mark";
pub const GRADE: &str = "Grade";
pub const SESSIONAL: &str = "Sessional Exam";
pub const END_TERM: &str = "End Term";
pub const NAME: &str = "Name";
pub const SUBJECT_CODE_COMPACT: &str = "SubjectCode";
pub const TYPE: &str = "Type";
pub const BRANCH_NAME: &str = "BranchName";
pub const SEMESTER_NUMBER: &str = "SemesterNumber";
pub const FATHER_NAME: &str = "Father Name";
pub const MOTHER_NAME: &str = "Mother Name";
pub const SEX: &str = "Sex";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Results,
    Subjects,
    Students,
}

impl ImportKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "results" => Some(ImportKind::Results),
            "subjects" => Some(ImportKind::Subjects),
            "students" => Some(ImportKind::Students),
            _ => None,
        }
    }

    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            ImportKind::Results => &[ROLL_NO, SUBJECT_CODE, OVERALL_MARK, GRADE],
            ImportKind::Subjects => &[NAME, SUBJECT_CODE_COMPACT, TYPE, BRANCH_NAME, SEMESTER_NUMBER],
            ImportKind::Students => &[
                NAME,
                ROLL_NO,
                FATHER_NAME,
                MOTHER_NAME,
                SEX,
                BRANCH_NAME,
                SEMESTER_NUMBER,
            ],
        }
    }
}

/// What happens when two rows of one upload share a natural key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Later rows with an already-seen key are rejected.
    #[default]
    Reject,
    /// The last row with a key wins; earlier rows are reported as superseded.
    Allow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    MissingColumn { column: String },
    InvalidValue { column: String, message: String },
    UnresolvedReference { column: String, value: String },
    Duplicate { key: String },
    Superseded { key: String, by_line: usize },
    NotAllotted { subject_code: String },
    ResultLocked { result_id: Uuid },
    Refused { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    pub line: usize,
    #[serde(flatten)]
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedResult {
    pub line: usize,
    pub roll_number: String,
    pub subject_code: String,
    pub submit: SubmitResult,
    pub grade: Grade,
    /// Set when the sheet's grade column disagrees with the computed grade.
    pub warning: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AcceptedRecord {
    Result(AcceptedResult),
    Subject { line: usize, subject: NewSubject },
    Student { line: usize, student: NewStudent },
}

impl AcceptedRecord {
    pub fn line(&self) -> usize {
        match self {
            AcceptedRecord::Result(result) => result.line,
            AcceptedRecord::Subject { line, .. } | AcceptedRecord::Student { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub accepted: Vec<AcceptedRecord>,
    pub rejected: Vec<RejectedRow>,
}

/// Lookup tables for natural keys, built once per import.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    students: HashMap<String, Student>,
    subjects: HashMap<(Uuid, String), Vec<Subject>>,
    branches: HashMap<String, Uuid>,
    semesters: Vec<Semester>,
}

fn normalize_key(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

impl ReferenceIndex {
    pub fn new(
        students: Vec<Student>,
        subjects: Vec<Subject>,
        branches: Vec<Branch>,
        semesters: Vec<Semester>,
    ) -> Self {
        let mut subject_map: HashMap<(Uuid, String), Vec<Subject>> = HashMap::new();
        for subject in subjects {
            subject_map
                .entry((subject.branch_id, normalize_key(&subject_code(&subject))))
                .or_default()
                .push(subject);
        }
        Self {
            students: students
                .into_iter()
                .map(|student| (normalize_key(&student.username), student))
                .collect(),
            subjects: subject_map,
            branches: branches
                .into_iter()
                .map(|branch| (normalize_key(&branch.name), branch.id))
                .collect(),
            semesters,
        }
    }

    pub fn student(&self, roll_number: &str) -> Option<&Student> {
        self.students.get(&normalize_key(roll_number))
    }

    /// Subject codes are unique per branch and semester. A code shared by several semesters
    /// of the branch resolves to the one in the student's current semester.
    pub fn subject_for(&self, student: &Student, code: &str) -> Option<&Subject> {
        let candidates = self
            .subjects
            .get(&(student.branch_id, normalize_key(code)))?;
        match candidates.as_slice() {
            [only] => Some(only),
            many => {
                let mut in_semester = many
                    .iter()
                    .filter(|subject| subject.semester_id == Some(student.semester_id));
                match (in_semester.next(), in_semester.next()) {
                    (Some(subject), None) => Some(subject),
                    _ => None,
                }
            }
        }
    }

    /// Whether a subject with this explicit code already exists in the branch and semester.
    pub fn has_subject(&self, branch_id: Uuid, semester_id: Uuid, code: &str) -> bool {
        let code = normalize_key(code);
        self.subjects.get(&(branch_id, code.clone())).map_or(false, |subjects| {
            subjects.iter().any(|subject| {
                subject.semester_id == Some(semester_id)
                    && subject
                        .subject_code
                        .as_deref()
                        .map_or(false, |existing| normalize_key(existing) == code)
            })
        })
    }

    pub fn branch(&self, name: &str) -> Option<Uuid> {
        self.branches.get(&normalize_key(name)).copied()
    }

    /// A branch-scoped semester wins over a shared one with the same number.
    pub fn semester(&self, branch_id: Uuid, number: i32) -> Option<Uuid> {
        let mut shared = None;
        for semester in self.semesters.iter().filter(|semester| semester.number == number) {
            match semester.branch_id {
                Some(id) if id == branch_id => return Some(semester.id),
                None => shared = Some(semester.id),
                Some(_) => {}
            }
        }
        shared
    }
}

fn required<'a>(row: &'a SheetRow, column: &str) -> Result<&'a str, RejectReason> {
    row.get(column).ok_or_else(|| RejectReason::MissingColumn {
        column: column.to_string(),
    })
}

fn parse_number(row: &SheetRow, column: &str) -> Result<Option<f64>, RejectReason> {
    match row.get(column) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Some)
            .ok_or_else(|| RejectReason::InvalidValue {
                column: column.to_string(),
                message: format!("`{raw}` is not a number"),
            }),
    }
}

fn parse_semester_number(row: &SheetRow) -> Result<i32, RejectReason> {
    let raw = required(row, SEMESTER_NUMBER)?;
    raw.parse::<i32>()
        .ok()
        .filter(|number| *number > 0)
        .ok_or_else(|| RejectReason::InvalidValue {
            column: SEMESTER_NUMBER.to_string(),
            message: format!("`{raw}` is not a semester number"),
        })
}

fn unresolved(column: &str, value: &str) -> RejectReason {
    RejectReason::UnresolvedReference {
        column: column.to_string(),
        value: value.to_string(),
    }
}

fn resolve_branch_semester(
    row: &SheetRow,
    index: &ReferenceIndex,
) -> Result<(Uuid, Uuid), RejectReason> {
    let branch_name = required(row, BRANCH_NAME)?;
    let number = parse_semester_number(row)?;
    let branch_id = index
        .branch(branch_name)
        .ok_or_else(|| unresolved(BRANCH_NAME, branch_name))?;
    let semester_id = index
        .semester(branch_id, number)
        .ok_or_else(|| unresolved(SEMESTER_NUMBER, &number.to_string()))?;
    Ok((branch_id, semester_id))
}

/// Per-kind natural-key resolution: turns one row into its duplicate key and normalized record.
pub trait RowResolver {
    fn resolve(
        &self,
        row: &SheetRow,
        index: &ReferenceIndex,
    ) -> Result<(String, AcceptedRecord), RejectReason>;
}

pub struct ResultRows;
pub struct SubjectRows;
pub struct StudentRows;

impl RowResolver for ResultRows {
    fn resolve(
        &self,
        row: &SheetRow,
        index: &ReferenceIndex,
    ) -> Result<(String, AcceptedRecord), RejectReason> {
        let roll_number = required(row, ROLL_NO)?;
        let code = required(row, SUBJECT_CODE)?;
        let overall = parse_number(row, OVERALL_MARK)?.ok_or_else(|| RejectReason::MissingColumn {
            column: OVERALL_MARK.to_string(),
        })?;
        let sheet_grade = required(row, GRADE)?;
        let sessional = parse_number(row, SESSIONAL)?;
        let end_term = parse_number(row, END_TERM)?;

        let student = index
            .student(roll_number)
            .ok_or_else(|| unresolved(ROLL_NO, roll_number))?;
        let subject = index
            .subject_for(student, code)
            .ok_or_else(|| unresolved(SUBJECT_CODE, code))?;

        // Without an end-term column the end-term share is backed out of the overall mark.
        let end_term = end_term.unwrap_or_else(|| {
            let subject_max = f64::from(subject.max_marks.max(0));
            let applicable = subject_max + sessional.map_or(0.0, |_| SESSIONAL_MAX);
            let derived = grading::clamp_mark(overall) / 100.0 * applicable - sessional.unwrap_or(0.0);
            (derived.clamp(0.0, subject_max) * 100.0).round() / 100.0
        });

        let marks = Marks {
            sessional_mark: sessional,
            end_term_mark: end_term,
            overall_mark: Some(overall),
        };
        let graded = grade_marks(&marks, subject).map_err(|err| RejectReason::InvalidValue {
            column: OVERALL_MARK.to_string(),
            message: err.to_string(),
        })?;

        let warning = match sheet_grade.parse::<Grade>() {
            Ok(parsed) if parsed == graded.grade => None,
            _ => Some(format!(
                "sheet grade `{sheet_grade}` replaced by computed grade {}",
                graded.grade
            )),
        };

        let key = format!("{}/{}", normalize_key(roll_number), subject.id);
        Ok((
            key,
            AcceptedRecord::Result(AcceptedResult {
                line: row.line,
                roll_number: student.username.clone(),
                subject_code: code.to_string(),
                submit: SubmitResult {
                    student_id: student.id,
                    subject_id: subject.id,
                    marks,
                },
                grade: graded.grade,
                warning,
            }),
        ))
    }
}

impl RowResolver for SubjectRows {
    fn resolve(
        &self,
        row: &SheetRow,
        index: &ReferenceIndex,
    ) -> Result<(String, AcceptedRecord), RejectReason> {
        let name = required(row, NAME)?;
        let code = required(row, SUBJECT_CODE_COMPACT)?;
        let raw_kind = required(row, TYPE)?;
        let kind = SubjectKind::parse(raw_kind).ok_or_else(|| RejectReason::InvalidValue {
            column: TYPE.to_string(),
            message: format!("`{raw_kind}` must be THEORY or PRACTICAL"),
        })?;
        let (branch_id, semester_id) = resolve_branch_semester(row, index)?;

        let key = format!("{branch_id}/{semester_id}/{}", normalize_key(code));
        if index.has_subject(branch_id, semester_id, code) {
            return Err(RejectReason::Duplicate { key });
        }
        Ok((
            key,
            AcceptedRecord::Subject {
                line: row.line,
                subject: NewSubject {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    subject_code: Some(code.to_string()),
                    kind: kind.as_str().to_string(),
                    semester_id: Some(semester_id),
                    branch_id,
                    max_marks: kind.default_max_marks(),
                },
            },
        ))
    }
}

impl RowResolver for StudentRows {
    fn resolve(
        &self,
        row: &SheetRow,
        index: &ReferenceIndex,
    ) -> Result<(String, AcceptedRecord), RejectReason> {
        let name = required(row, NAME)?;
        let roll_number = required(row, ROLL_NO)?;
        let father_name = required(row, FATHER_NAME)?;
        let mother_name = required(row, MOTHER_NAME)?;
        let sex = Sex::from_column(row.get(SEX).unwrap_or_default());
        let (branch_id, semester_id) = resolve_branch_semester(row, index)?;

        let key = normalize_key(roll_number);
        if index.student(roll_number).is_some() {
            return Err(RejectReason::Duplicate { key });
        }
        Ok((
            key,
            AcceptedRecord::Student {
                line: row.line,
                student: NewStudent {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    father_name: father_name.to_string(),
                    mother_name: mother_name.to_string(),
                    username: roll_number.to_string(),
                    sex: sex.as_str().to_string(),
                    branch_id,
                    semester_id,
                },
            },
        ))
    }
}

pub fn resolver_for(kind: ImportKind) -> Box<dyn RowResolver + Send + Sync> {
    match kind {
        ImportKind::Results => Box::new(ResultRows),
        ImportKind::Subjects => Box::new(SubjectRows),
        ImportKind::Students => Box::new(StudentRows),
    }
}

/// Resolves every row independently; a bad row is rejected without affecting the others.
/// At most one row per natural key is accepted, whichever the policy.
pub fn reconcile(
    sheet: &Sheet,
    kind: ImportKind,
    index: &ReferenceIndex,
    policy: DuplicatePolicy,
) -> Reconciliation {
    let resolver = resolver_for(kind);
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut outcome = Reconciliation::default();

    for row in &sheet.rows {
        match resolver.resolve(row, index) {
            Ok((key, record)) => match (seen.get(&key).copied(), policy) {
                (None, _) => {
                    seen.insert(key, outcome.accepted.len());
                    outcome.accepted.push(record);
                }
                (Some(_), DuplicatePolicy::Reject) => outcome.rejected.push(RejectedRow {
                    line: row.line,
                    reason: RejectReason::Duplicate { key },
                }),
                (Some(slot), DuplicatePolicy::Allow) => {
                    let earlier = std::mem::replace(&mut outcome.accepted[slot], record);
                    outcome.rejected.push(RejectedRow {
                        line: earlier.line(),
                        reason: RejectReason::Superseded {
                            key,
                            by_line: row.line,
                        },
                    });
                }
            },
            Err(reason) => outcome.rejected.push(RejectedRow {
                line: row.line,
                reason,
            }),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;

    struct Fixture {
        index: ReferenceIndex,
        cs: Uuid,
        sem3: Uuid,
        dbms: Uuid,
        student: Uuid,
    }

    fn fixture() -> Fixture {
        let now = Utc::now().naive_utc();
        let created = NaiveDate::from_ymd_opt(2022, 8, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let cs = Uuid::new_v4();
        let ee = Uuid::new_v4();
        let sem3 = Uuid::new_v4();
        let sem4 = Uuid::new_v4();
        let student = Student {
            id: Uuid::new_v4(),
            name: "Neha Singh".to_string(),
            father_name: "Arun Singh".to_string(),
            mother_name: "Kavita Singh".to_string(),
            username: "22CS031".to_string(),
            sex: "female".to_string(),
            branch_id: cs,
            semester_id: sem3,
            created_at: created,
            updated_at: created,
        };
        let subject = |name: &str, code: &str, branch: Uuid, semester: Uuid| Subject {
            id: Uuid::new_v4(),
            name: name.to_string(),
            subject_code: Some(code.to_string()),
            kind: "THEORY".to_string(),
            semester_id: Some(semester),
            branch_id: branch,
            max_marks: 100,
            created_at: now,
            updated_at: now,
        };
        let dbms = subject("Database Systems", "DBMS", cs, sem3);
        let dbms_id = dbms.id;
        let subjects = vec![
            dbms,
            subject("Operating Systems", "OS", cs, sem3),
            subject("Computer Networks", "CN", cs, sem3),
            subject("Theory of Computation", "TOC", cs, sem3),
            subject("Operating Systems Lab", "OS", cs, sem4),
            subject("Electrical Machines", "EM", ee, sem3),
        ];
        let branches = vec![
            Branch {
                id: cs,
                name: "Computer Science".to_string(),
                created_at: now,
            },
            Branch {
                id: ee,
                name: "Electrical".to_string(),
                created_at: now,
            },
        ];
        let semesters = vec![
            Semester {
                id: sem3,
                number: 3,
                branch_id: None,
                created_at: now,
            },
            Semester {
                id: sem4,
                number: 4,
                branch_id: None,
                created_at: now,
            },
        ];
        let student_id = student.id;
        Fixture {
            index: ReferenceIndex::new(vec![student], subjects, branches, semesters),
            cs,
            sem3,
            dbms: dbms_id,
            student: student_id,
        }
    }

    fn sheet(headers: &[&str], rows: &[&[&str]]) -> Sheet {
        Sheet::from_records(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    const RESULT_HEADERS: &[&str] = &["Roll No", "Subject Code", "Sessional Exam", "End Term", "Overall Mark", "Grade"];

    #[test]
    fn unknown_subject_code_rejects_only_that_row() {
        let fx = fixture();
        let sheet = sheet(
            RESULT_HEADERS,
            &[
                &["22CS031", "DBMS", "40", "65", "70", "B+"],
                &["22CS031", "OS", "30", "60", "60", "B"],
                &["22CS031", "CN", "25", "50", "50", "C+"],
                &["22CS031", "XYZ", "20", "40", "40", "D"],
                &["22CS031", "TOC", "45", "90", "90", "A+"],
            ],
        );

        let outcome = reconcile(&sheet, ImportKind::Results, &fx.index, DuplicatePolicy::Reject);
        assert_eq!(outcome.accepted.len(), 4);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].line, 5);
        assert_eq!(
            outcome.rejected[0].reason,
            RejectReason::UnresolvedReference {
                column: "Subject Code".to_string(),
                value: "XYZ".to_string()
            }
        );
        let lines: Vec<usize> = outcome.accepted.iter().map(AcceptedRecord::line).collect();
        assert_eq!(lines, vec![2, 3, 4, 6]);
        match &outcome.accepted[0] {
            AcceptedRecord::Result(result) => {
                assert_eq!(result.submit.subject_id, fx.dbms);
                assert_eq!(result.submit.student_id, fx.student);
                assert_eq!(result.grade, Grade::BPlus);
                assert!(result.warning.is_none());
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn shared_code_resolves_to_students_semester() {
        let fx = fixture();
        let sheet = sheet(RESULT_HEADERS, &[&["22cs031", "os", "", "55", "55", "C+"]]);
        let outcome = reconcile(&sheet, ImportKind::Results, &fx.index, DuplicatePolicy::Reject);
        assert_eq!(outcome.accepted.len(), 1);
        let AcceptedRecord::Result(result) = &outcome.accepted[0] else {
            panic!("expected a result row");
        };
        let subject = fx.index.subject_for(fx.index.student("22CS031").unwrap(), "OS").unwrap();
        assert_eq!(result.submit.subject_id, subject.id);
        assert_eq!(subject.semester_id, Some(fx.sem3));
    }

    #[test]
    fn codes_from_other_branches_do_not_resolve() {
        let fx = fixture();
        let sheet = sheet(RESULT_HEADERS, &[&["22CS031", "EM", "", "50", "50", "C+"]]);
        let outcome = reconcile(&sheet, ImportKind::Results, &fx.index, DuplicatePolicy::Reject);
        assert!(outcome.accepted.is_empty());
        assert!(matches!(
            outcome.rejected[0].reason,
            RejectReason::UnresolvedReference { .. }
        ));
    }

    #[test]
    fn duplicate_policy_is_explicit() {
        let fx = fixture();
        let rows: &[&[&str]] = &[
            &["22CS031", "DBMS", "40", "65", "70", "B+"],
            &["22CS031", "DBMS", "45", "70", "77", "B+"],
        ];
        let sheet = sheet(RESULT_HEADERS, rows);

        let rejecting = reconcile(&sheet, ImportKind::Results, &fx.index, DuplicatePolicy::Reject);
        assert_eq!(rejecting.accepted.len(), 1);
        assert!(matches!(
            rejecting.rejected[0].reason,
            RejectReason::Duplicate { .. }
        ));

        let allowing = reconcile(&sheet, ImportKind::Results, &fx.index, DuplicatePolicy::Allow);
        assert_eq!(allowing.accepted.len(), 1);
        let kept = allowing.accepted[0].line();
        assert_eq!(allowing.rejected.len(), 1);
        assert!(matches!(
            allowing.rejected[0].reason,
            RejectReason::Superseded { by_line, .. } if by_line == kept
        ));
        assert!(allowing.rejected[0].line < kept);
    }

    #[test]
    fn grade_column_mismatch_is_a_warning() {
        let fx = fixture();
        let sheet = sheet(RESULT_HEADERS, &[&["22CS031", "DBMS", "40", "65", "70", "A"]]);
        let outcome = reconcile(&sheet, ImportKind::Results, &fx.index, DuplicatePolicy::Reject);
        let AcceptedRecord::Result(result) = &outcome.accepted[0] else {
            panic!("expected a result row");
        };
        assert_eq!(result.grade, Grade::BPlus);
        assert!(result.warning.as_deref().unwrap_or_default().contains("`A`"));
    }

    #[test]
    fn blank_required_cell_and_bad_numbers_are_row_failures() {
        let fx = fixture();
        let sheet = sheet(
            RESULT_HEADERS,
            &[
                &["", "DBMS", "40", "65", "70", "B+"],
                &["22CS031", "DBMS", "forty", "65", "70", "B+"],
                &["22CS031", "DBMS", "40", "65", "170", "B+"],
            ],
        );
        let outcome = reconcile(&sheet, ImportKind::Results, &fx.index, DuplicatePolicy::Reject);
        assert!(outcome.accepted.is_empty());
        assert!(matches!(
            &outcome.rejected[0].reason,
            RejectReason::MissingColumn { column } if column == ROLL_NO
        ));
        assert!(matches!(
            &outcome.rejected[1].reason,
            RejectReason::InvalidValue { column, .. } if column == SESSIONAL
        ));
        assert!(matches!(
            &outcome.rejected[2].reason,
            RejectReason::InvalidValue { column, .. } if column == OVERALL_MARK
        ));
    }

    #[test]
    fn end_term_backed_out_of_overall_when_absent() {
        let fx = fixture();
        let sheet = sheet(
            &["Roll No", "Subject Code", "Overall Mark", "Grade"],
            &[&["22CS031", "DBMS", "80", "A"]],
        );
        let outcome = reconcile(&sheet, ImportKind::Results, &fx.index, DuplicatePolicy::Reject);
        let AcceptedRecord::Result(result) = &outcome.accepted[0] else {
            panic!("expected a result row");
        };
        assert_eq!(result.submit.marks.end_term_mark, 80.0);
        assert_eq!(result.submit.marks.sessional_mark, None);
    }

    #[test]
    fn subject_rows_resolve_branch_and_semester() {
        let fx = fixture();
        let sheet = sheet(
            &["Name", "SubjectCode", "Type", "BranchName", "SemesterNumber"],
            &[
                &["Compiler Design", "CD", "theory", "computer science", "3"],
                &["Workshop", "WS", "lab", "Computer Science", "3"],
                &["Robotics", "RB", "PRACTICAL", "Mechanical", "3"],
            ],
        );
        let outcome = reconcile(&sheet, ImportKind::Subjects, &fx.index, DuplicatePolicy::Reject);
        assert_eq!(outcome.accepted.len(), 1);
        let AcceptedRecord::Subject { subject, .. } = &outcome.accepted[0] else {
            panic!("expected a subject row");
        };
        assert_eq!(subject.branch_id, fx.cs);
        assert_eq!(subject.semester_id, Some(fx.sem3));
        assert_eq!(subject.kind, "THEORY");
        assert!(matches!(
            outcome.rejected[0].reason,
            RejectReason::InvalidValue { .. }
        ));
        assert!(matches!(
            outcome.rejected[1].reason,
            RejectReason::UnresolvedReference { .. }
        ));
    }

    #[test]
    fn existing_roll_numbers_are_duplicates_for_student_import() {
        let fx = fixture();
        let sheet = sheet(
            &["Name", "Roll No", "Father Name", "Mother Name", "Sex", "BranchName", "SemesterNumber"],
            &[
                &["Neha Singh", "22CS031", "Arun", "Kavita", "F", "Computer Science", "3"],
                &["Ishaan Roy", "22CS040", "Amit", "Rita", "", "Computer Science", "3"],
            ],
        );
        let outcome = reconcile(&sheet, ImportKind::Students, &fx.index, DuplicatePolicy::Allow);
        assert_eq!(outcome.accepted.len(), 1);
        assert!(matches!(
            outcome.rejected[0].reason,
            RejectReason::Duplicate { .. }
        ));
    }

    #[test]
    fn repeated_roll_numbers_keep_the_last_row_when_allowed() {
        let fx = fixture();
        let sheet = sheet(
            &["Name", "Roll No", "Father Name", "Mother Name", "Sex", "BranchName", "SemesterNumber"],
            &[
                &["Ishan Roy", "22CS040", "Amit", "Rita", "M", "Computer Science", "3"],
                &["Ishaan Roy", "22cs040", "Amit", "Rita", "M", "Computer Science", "3"],
            ],
        );
        let outcome = reconcile(&sheet, ImportKind::Students, &fx.index, DuplicatePolicy::Allow);
        assert_eq!(outcome.accepted.len(), 1);
        let AcceptedRecord::Student { student, .. } = &outcome.accepted[0] else {
            panic!("expected a student row");
        };
        assert_eq!(student.name, "Ishaan Roy");
        assert_eq!(
            outcome.rejected[0].reason,
            RejectReason::Superseded {
                key: "22CS040".to_string(),
                by_line: outcome.accepted[0].line(),
            }
        );
    }

    #[test]
    fn existing_subject_codes_are_duplicates_for_subject_import() {
        let fx = fixture();
        let sheet = sheet(
            &["Name", "SubjectCode", "Type", "BranchName", "SemesterNumber"],
            &[
                &["Database Management", "dbms", "THEORY", "Computer Science", "3"],
                &["Database Lab", "DBMS", "PRACTICAL", "Computer Science", "4"],
            ],
        );
        let outcome = reconcile(&sheet, ImportKind::Subjects, &fx.index, DuplicatePolicy::Allow);
        assert_eq!(outcome.accepted.len(), 1);
        assert!(matches!(
            outcome.rejected[0].reason,
            RejectReason::Duplicate { .. }
        ));
    }
}
