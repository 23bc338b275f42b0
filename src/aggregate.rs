//! Groups a student's results by semester and computes the totals printed on documents.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::grading::{self, Division, Grade, PassFail};
use crate::models::{ResultRecord, Student, Subject};
use crate::store::RecordStore;
use crate::verification::SESSIONAL_MAX;

/// Which semesters of a record a document covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "semester")]
pub enum RecordScope {
    All,
    Semester(i32),
    UpToSemester(i32),
}

impl RecordScope {
    pub fn includes(self, semester: i32) -> bool {
        match self {
            RecordScope::All => true,
            RecordScope::Semester(number) => semester == number,
            RecordScope::UpToSemester(number) => semester <= number,
        }
    }
}

/// Abbreviation built from the initials of each word, e.g. "Data Base Systems" -> "DBS".
pub fn derive_subject_code(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().find(|ch| ch.is_alphanumeric()))
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn subject_code(subject: &Subject) -> String {
    match subject.subject_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => code.to_string(),
        _ => derive_subject_code(&subject.name),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectLine {
    pub result_id: Uuid,
    pub subject_id: Uuid,
    pub subject_name: String,
    pub subject_code: String,
    pub sessional_mark: Option<f64>,
    pub end_term_mark: f64,
    pub obtained_marks: f64,
    pub max_marks: f64,
    pub overall_mark: f64,
    pub grade: Grade,
}

impl SubjectLine {
    fn new(result: &ResultRecord, subject: &Subject) -> Self {
        let sessional_max = result.sessional_mark.map_or(0.0, |_| SESSIONAL_MAX);
        Self {
            result_id: result.id,
            subject_id: subject.id,
            subject_name: subject.name.clone(),
            subject_code: subject_code(subject),
            sessional_mark: result.sessional_mark,
            end_term_mark: result.end_term_mark,
            obtained_marks: result.obtained_marks(),
            max_marks: sessional_max + f64::from(subject.max_marks.max(0)),
            overall_mark: result.overall_mark,
            grade: result.grade(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Totals {
    pub total_marks: f64,
    pub total_max_marks: f64,
    pub percentage: f64,
    pub outcome: PassFail,
    pub division: Division,
}

impl Totals {
    pub fn new(total_marks: f64, total_max_marks: f64) -> Self {
        let percentage = if total_max_marks > 0.0 {
            total_marks / total_max_marks * 100.0
        } else {
            0.0
        };
        Self {
            total_marks,
            total_max_marks,
            percentage,
            outcome: grading::pass_fail(percentage),
            division: grading::division(percentage),
        }
    }

    fn from_lines(lines: &[SubjectLine]) -> Self {
        let (marks, max) = lines.iter().fold((0.0, 0.0), |(marks, max), line| {
            (marks + line.obtained_marks, max + line.max_marks)
        });
        Self::new(marks, max)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SemesterGroup {
    pub number: i32,
    pub lines: Vec<SubjectLine>,
    /// Subjects beyond the template's column cap; excluded from the table and totals.
    pub dropped: Vec<SubjectLine>,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum DataQualityFinding {
    MissingSubject { result_id: Uuid, subject_id: Uuid },
    MissingSemester { result_id: Uuid, subject_id: Uuid },
    SubjectsDropped { semester: i32, dropped: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedRecord {
    pub student: Student,
    pub scope: RecordScope,
    pub semesters: BTreeMap<i32, SemesterGroup>,
    pub totals: Totals,
    pub findings: Vec<DataQualityFinding>,
}

impl AggregatedRecord {
    pub fn is_empty(&self) -> bool {
        self.semesters.is_empty()
    }

    pub fn latest_semester(&self) -> Option<i32> {
        self.semesters.keys().next_back().copied()
    }
}

/// Builds the grouped view. `semester_numbers` maps semester ids to their ordinal level.
pub fn aggregate_record(
    student: Student,
    rows: Vec<(ResultRecord, Option<Subject>)>,
    semester_numbers: &HashMap<Uuid, i32>,
    scope: RecordScope,
    subject_cap: usize,
) -> AggregatedRecord {
    let mut findings = Vec::new();
    let mut grouped: BTreeMap<i32, Vec<SubjectLine>> = BTreeMap::new();

    for (result, subject) in rows {
        let Some(subject) = subject else {
            findings.push(DataQualityFinding::MissingSubject {
                result_id: result.id,
                subject_id: result.subject_id,
            });
            continue;
        };
        let Some(number) = subject
            .semester_id
            .and_then(|id| semester_numbers.get(&id).copied())
        else {
            findings.push(DataQualityFinding::MissingSemester {
                result_id: result.id,
                subject_id: subject.id,
            });
            continue;
        };
        if !scope.includes(number) {
            continue;
        }
        grouped
            .entry(number)
            .or_default()
            .push(SubjectLine::new(&result, &subject));
    }

    let mut semesters = BTreeMap::new();
    for (number, mut lines) in grouped {
        lines.sort_by(|a, b| {
            a.subject_code
                .cmp(&b.subject_code)
                .then_with(|| a.subject_name.cmp(&b.subject_name))
        });
        let dropped = if lines.len() > subject_cap {
            lines.split_off(subject_cap)
        } else {
            Vec::new()
        };
        if !dropped.is_empty() {
            findings.push(DataQualityFinding::SubjectsDropped {
                semester: number,
                dropped: dropped.len(),
            });
        }
        let totals = Totals::from_lines(&lines);
        semesters.insert(
            number,
            SemesterGroup {
                number,
                lines,
                dropped,
                totals,
            },
        );
    }

    let (marks, max) = semesters.values().fold((0.0, 0.0), |(marks, max), group| {
        (
            marks + group.totals.total_marks,
            max + group.totals.total_max_marks,
        )
    });

    AggregatedRecord {
        student,
        scope,
        semesters,
        totals: Totals::new(marks, max),
        findings,
    }
}

#[derive(Clone)]
pub struct RecordAggregator {
    store: Arc<dyn RecordStore>,
}

impl RecordAggregator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Aggregates a student's record. `visible_subjects` restricts which results take part;
    /// `None` includes every subject.
    pub async fn aggregate(
        &self,
        student_id: Uuid,
        scope: RecordScope,
        subject_cap: usize,
        visible_subjects: Option<&HashSet<Uuid>>,
    ) -> ServiceResult<AggregatedRecord> {
        let student = self
            .store
            .get_student(student_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("student", student_id))?;
        let mut rows = self.store.results_with_subjects(student_id).await?;
        if let Some(visible) = visible_subjects {
            rows.retain(|(result, _)| visible.contains(&result.subject_id));
        }
        let semester_numbers: HashMap<Uuid, i32> = self
            .store
            .list_semesters()
            .await?
            .into_iter()
            .map(|semester| (semester.id, semester.number))
            .collect();

        let record = aggregate_record(student, rows, &semester_numbers, scope, subject_cap);
        for finding in &record.findings {
            warn!(student_id = %student_id, ?finding, "data quality finding while aggregating record");
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;

    fn student() -> Student {
        let created = NaiveDate::from_ymd_opt(2021, 8, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Student {
            id: Uuid::new_v4(),
            name: "Asha Verma".to_string(),
            father_name: "Ravi Verma".to_string(),
            mother_name: "Meena Verma".to_string(),
            username: "21CS014".to_string(),
            sex: "female".to_string(),
            branch_id: Uuid::new_v4(),
            semester_id: Uuid::new_v4(),
            created_at: created,
            updated_at: created,
        }
    }

    fn subject(name: &str, code: Option<&str>, semester_id: Option<Uuid>) -> Subject {
        let now = Utc::now().naive_utc();
        Subject {
            id: Uuid::new_v4(),
            name: name.to_string(),
            subject_code: code.map(str::to_string),
            kind: "THEORY".to_string(),
            semester_id,
            branch_id: Uuid::new_v4(),
            max_marks: 100,
            created_at: now,
            updated_at: now,
        }
    }

    fn result(student: &Student, subject: &Subject, sessional: f64, end_term: f64) -> ResultRecord {
        let now = Utc::now().naive_utc();
        let overall = (sessional + end_term) / 150.0 * 100.0;
        ResultRecord {
            id: Uuid::new_v4(),
            student_id: student.id,
            subject_id: subject.id,
            teacher_id: Uuid::new_v4(),
            sessional_mark: Some(sessional),
            end_term_mark: end_term,
            overall_mark: overall,
            grade: grading::grade(overall).as_str().to_string(),
            status: "unverified".to_string(),
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn derives_codes_from_initials() {
        assert_eq!(derive_subject_code("Data Base Management Systems"), "DBMS");
        assert_eq!(derive_subject_code("  engineering   mathematics-II "), "EM");
        assert_eq!(derive_subject_code("Lab & Workshop"), "LW");
        assert_eq!(derive_subject_code(""), "");
        assert_eq!(
            derive_subject_code("Operating Systems"),
            derive_subject_code("Operating Systems")
        );
    }

    #[test]
    fn explicit_code_preferred_over_derived() {
        let with_code = subject("Operating Systems", Some("CS-301"), None);
        let blank_code = subject("Operating Systems", Some("  "), None);
        assert_eq!(subject_code(&with_code), "CS-301");
        assert_eq!(subject_code(&blank_code), "OS");
    }

    #[test]
    fn empty_record_has_zero_percentages() {
        let record = aggregate_record(student(), Vec::new(), &HashMap::new(), RecordScope::All, 8);
        assert!(record.is_empty());
        assert_eq!(record.totals.percentage, 0.0);
        assert_eq!(record.totals.total_max_marks, 0.0);
        assert_eq!(record.totals.outcome, PassFail::Fail);
    }

    #[test]
    fn groups_by_semester_and_computes_percentages() {
        let student = student();
        let sem1 = Uuid::new_v4();
        let sem2 = Uuid::new_v4();
        let numbers = HashMap::from([(sem1, 1), (sem2, 2)]);

        let mut rows = Vec::new();
        for name in ["Physics", "Chemistry", "Mathematics"] {
            let subj = subject(name, None, Some(sem2));
            rows.push((result(&student, &subj, 20.0, 40.0), Some(subj)));
        }
        for name in ["Electronics", "Drawing", "Workshop"] {
            let subj = subject(name, None, Some(sem1));
            rows.push((result(&student, &subj, 35.0, 70.0), Some(subj)));
        }

        let record = aggregate_record(student, rows, &numbers, RecordScope::All, 8);
        let keys: Vec<i32> = record.semesters.keys().copied().collect();
        assert_eq!(keys, vec![1, 2]);
        assert!((record.semesters[&1].totals.percentage - 70.0).abs() < 1e-9);
        assert!((record.semesters[&2].totals.percentage - 40.0).abs() < 1e-9);
        assert!((record.totals.percentage - 55.0).abs() < 1e-9);
        assert_eq!(record.totals.total_max_marks, 900.0);
    }

    #[test]
    fn results_without_semester_are_reported_not_fatal() {
        let student = student();
        let orphan = subject("Elective", None, None);
        let unknown = subject("Seminar", None, Some(Uuid::new_v4()));
        let rows = vec![
            (result(&student, &orphan, 10.0, 10.0), Some(orphan.clone())),
            (result(&student, &unknown, 10.0, 10.0), Some(unknown)),
            (result(&student, &orphan, 10.0, 10.0), None),
        ];

        let record = aggregate_record(student, rows, &HashMap::new(), RecordScope::All, 8);
        assert!(record.is_empty());
        assert_eq!(record.findings.len(), 3);
        assert!(matches!(
            record.findings[2],
            DataQualityFinding::MissingSubject { .. }
        ));
    }

    // Boundary: subjects past the cap are dropped from the table, never wrapped.
    #[test]
    fn subjects_beyond_cap_are_dropped() {
        let student = student();
        let sem = Uuid::new_v4();
        let numbers = HashMap::from([(sem, 3)]);
        let rows = (0..10)
            .map(|idx| {
                let subj = subject(
                    &format!("Subject {idx}"),
                    Some(format!("S{idx:02}").as_str()),
                    Some(sem),
                );
                (result(&student, &subj, 25.0, 50.0), Some(subj))
            })
            .collect();

        let record = aggregate_record(student, rows, &numbers, RecordScope::All, 9);
        let group = &record.semesters[&3];
        assert_eq!(group.lines.len(), 9);
        assert_eq!(group.dropped.len(), 1);
        assert_eq!(group.dropped[0].subject_code, "S09");
        assert_eq!(group.totals.total_max_marks, 9.0 * 150.0);
        assert_eq!(
            record.findings,
            vec![DataQualityFinding::SubjectsDropped {
                semester: 3,
                dropped: 1
            }]
        );
    }

    #[test]
    fn scope_limits_semesters() {
        let student = student();
        let sem1 = Uuid::new_v4();
        let sem2 = Uuid::new_v4();
        let numbers = HashMap::from([(sem1, 1), (sem2, 2)]);
        let s1 = subject("Physics", None, Some(sem1));
        let s2 = subject("Chemistry", None, Some(sem2));
        let rows = vec![
            (result(&student, &s1, 30.0, 60.0), Some(s1)),
            (result(&student, &s2, 30.0, 60.0), Some(s2)),
        ];

        let record = aggregate_record(student, rows, &numbers, RecordScope::Semester(2), 8);
        assert_eq!(record.semesters.len(), 1);
        assert!(record.semesters.contains_key(&2));
        assert!(record.findings.is_empty());
    }
}
