//! Certificate templates: static wording plus an optional marks-table region.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::phrases::Phrases;
use super::DocumentContext;
use crate::aggregate::RecordScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Character,
    Migration,
    Marksheet,
    Diploma,
    Transcript,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::Character,
        DocumentKind::Migration,
        DocumentKind::Marksheet,
        DocumentKind::Diploma,
        DocumentKind::Transcript,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Character => "character",
            DocumentKind::Migration => "migration",
            DocumentKind::Marksheet => "marksheet",
            DocumentKind::Diploma => "diploma",
            DocumentKind::Transcript => "transcript",
        }
    }

    /// Most subject columns one semester table can hold.
    pub fn subject_cap(self) -> usize {
        match self {
            DocumentKind::Transcript => 8,
            _ => 9,
        }
    }

    /// Record scope for a document, optionally pinned to a semester.
    pub fn scope(self, semester: Option<i32>) -> RecordScope {
        match (self, semester) {
            (DocumentKind::Marksheet, Some(number)) => RecordScope::Semester(number),
            (DocumentKind::Transcript, Some(number)) => RecordScope::UpToSemester(number),
            _ => RecordScope::All,
        }
    }

    pub fn template(self) -> Template {
        match self {
            DocumentKind::Character => Template {
                kind: self,
                title: "Character Certificate",
                body: TemplateBody::TextOnly,
            },
            DocumentKind::Migration => Template {
                kind: self,
                title: "Migration Certificate",
                body: TemplateBody::TextOnly,
            },
            DocumentKind::Diploma => Template {
                kind: self,
                title: "Diploma",
                body: TemplateBody::TextOnly,
            },
            DocumentKind::Marksheet => Template {
                kind: self,
                title: "Statement of Marks",
                body: TemplateBody::MarksTable,
            },
            DocumentKind::Transcript => Template {
                kind: self,
                title: "Transcript of Academic Record",
                body: TemplateBody::MarksTable,
            },
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown document kind `{0}`")]
pub struct UnknownDocumentKind(pub String);

impl FromStr for DocumentKind {
    type Err = UnknownDocumentKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DocumentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownDocumentKind(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateBody {
    TextOnly,
    /// Per-semester marks tables followed by a subject-abbreviation appendix.
    MarksTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub kind: DocumentKind,
    pub title: &'static str,
    pub body: TemplateBody,
}

impl Template {
    pub fn has_table(&self) -> bool {
        self.body == TemplateBody::MarksTable
    }
}

fn titled_name(phrases: &Phrases, name: &str) -> String {
    format!("{} {}", phrases.title, name).trim().to_string()
}

/// Labelled student details printed above a marks table.
pub fn detail_lines(ctx: &DocumentContext) -> Vec<(&'static str, String)> {
    let student = &ctx.record.student;
    vec![
        ("Name", student.name.clone()),
        ("Roll No.", student.username.clone()),
        ("Father's Name", student.father_name.clone()),
        ("Mother's Name", student.mother_name.clone()),
        ("Branch", ctx.branch_label()),
        ("Session", ctx.session_label()),
    ]
}

/// Body paragraphs of a text-only certificate, in print order.
pub fn paragraphs(kind: DocumentKind, ctx: &DocumentContext, phrases: &Phrases) -> Vec<String> {
    let student = &ctx.record.student;
    let name = titled_name(phrases, &student.name);
    let institution = &ctx.institution_name;
    let session = ctx.session_label();

    match kind {
        DocumentKind::Character => vec![
            format!(
                "This is to certify that {name}, {} {}, bearing Roll No. {}, was a bonafide student of {institution} in the {} branch during the session {session}.",
                phrases.relation,
                student.father_name,
                student.username,
                ctx.branch_label(),
            ),
            format!(
                "To the best of our knowledge {} {} of good moral character and took no part in any activity prejudicial to discipline during {} stay at the institution.",
                phrases.pronoun, phrases.is, phrases.possessive,
            ),
            format!(
                "We wish {} every success in {} future endeavours.",
                name, phrases.possessive,
            ),
        ],
        DocumentKind::Migration => vec![
            format!(
                "This is to certify that {name}, {} {}, Roll No. {}, has been a student of {institution} in the {} branch during the session {session}.",
                phrases.relation,
                student.father_name,
                student.username,
                ctx.branch_label(),
            ),
            format!(
                "The institution has no objection to {} migration to any other recognised institution. {} {} cleared all dues of this institution.",
                phrases.possessive,
                phrases.pronoun_capitalized(),
                phrases.has,
            ),
        ],
        DocumentKind::Diploma => {
            let totals = &ctx.record.totals;
            vec![
                format!(
                    "This is to certify that {name}, {} {} and {}, Roll No. {}, has completed the prescribed course of study in {} at {institution} during the session {session}.",
                    phrases.relation,
                    student.father_name,
                    student.mother_name,
                    student.username,
                    ctx.branch_label(),
                ),
                format!(
                    "{} {} secured {:.0} out of {:.0} marks ({:.2}%) and {} placed in the {}.",
                    phrases.pronoun_capitalized(),
                    phrases.has,
                    totals.total_marks,
                    totals.total_max_marks,
                    totals.percentage,
                    phrases.is,
                    totals.division.label(),
                ),
            ]
        }
        DocumentKind::Marksheet | DocumentKind::Transcript => Vec::new(),
    }
}
