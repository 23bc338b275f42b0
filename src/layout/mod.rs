//! Document layout: turns an aggregated record into positioned blocks on normalized pages.
//!
//! Coordinates are fractions of the page, `x` from the left edge and `y` from the top edge.
//! Pages are numbered from zero.

pub mod phrases;
pub mod table;
pub mod templates;

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::aggregate::{AggregatedRecord, SemesterGroup, Totals};
use phrases::{PhrasePolicy, Phrases};
use table::{next_page_after, roman, stack_units, StackFrame, TableGeometry};
pub use templates::{DocumentKind, Template, TemplateBody, UnknownDocumentKind};

const POINTS_PER_MM: f64 = 72.0 / 25.4;

#[derive(Debug, Clone)]
pub struct LayoutConfig {
    pub institution_name: String,
    pub program_years: i32,
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub margin_x: f64,
    pub table_width: f64,
    pub first_column_width: f64,
    pub last_column_width: f64,
    pub appendix_code_width: f64,
    pub row_height: f64,
    pub table_spacing: f64,
    pub content_top: f64,
    pub continuation_top: f64,
    pub page_bottom: f64,
    pub body_size: f64,
}

impl LayoutConfig {
    pub fn new(institution_name: impl Into<String>, program_years: i32) -> Self {
        Self {
            institution_name: institution_name.into(),
            program_years,
            ..Self::default()
        }
    }

    fn page_width_pt(&self) -> f64 {
        self.page_width_mm * POINTS_PER_MM
    }

    fn page_height_pt(&self) -> f64 {
        self.page_height_mm * POINTS_PER_MM
    }

    /// Normalized height of one text line at `size` points.
    fn line_height(&self, size: f64) -> f64 {
        size * 1.45 / self.page_height_pt()
    }

    /// Rough characters per line for `width` at `size` points, assuming an average glyph
    /// advance of half the font size.
    fn chars_per_line(&self, width: f64, size: f64) -> usize {
        ((width * self.page_width_pt()) / (size * 0.5)).floor().max(1.0) as usize
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            institution_name: "Institute of Technology".to_string(),
            program_years: 4,
            page_width_mm: 210.0,
            page_height_mm: 297.0,
            margin_x: 0.06,
            table_width: 0.88,
            first_column_width: 0.12,
            last_column_width: 0.14,
            appendix_code_width: 0.16,
            row_height: 0.03,
            table_spacing: 0.02,
            content_top: 0.14,
            continuation_top: 0.08,
            page_bottom: 0.92,
            body_size: 11.0,
        }
    }
}

/// Everything a template needs besides the layout settings.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub record: AggregatedRecord,
    pub branch_name: Option<String>,
    pub institution_name: String,
    pub program_years: i32,
    pub issued_on: NaiveDate,
}

impl DocumentContext {
    pub fn branch_label(&self) -> String {
        self.branch_name.clone().unwrap_or_else(|| "-".to_string())
    }

    /// Enrollment year to expected completion year, e.g. `2021-2025`.
    pub fn session_label(&self) -> String {
        let start = self.record.student.created_at.year();
        format!("{}-{}", start, start + self.program_years)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextStyle {
    pub size: f64,
    pub bold: bool,
    pub align: Align,
}

impl TextStyle {
    fn body(size: f64) -> Self {
        Self {
            size,
            bold: false,
            align: Align::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockContent {
    Text { text: String, style: TextStyle },
    /// A bordered table cell.
    Cell { text: String, header: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionedBlock {
    pub page: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub content: BlockContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSection {
    Summary,
    Appendix,
}

/// One atomic table as placed on a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRegion {
    pub section: RegionSection,
    pub semester: i32,
    pub page: usize,
    pub y: f64,
    pub height: f64,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentLayout {
    pub kind: DocumentKind,
    pub title: String,
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub page_count: usize,
    pub blocks: Vec<PositionedBlock>,
    pub regions: Vec<TableRegion>,
}

impl DocumentLayout {
    pub fn blocks_on_page(&self, page: usize) -> impl Iterator<Item = &PositionedBlock> {
        self.blocks.iter().filter(move |block| block.page == page)
    }

    pub fn regions_in(&self, section: RegionSection) -> impl Iterator<Item = &TableRegion> {
        self.regions
            .iter()
            .filter(move |region| region.section == section)
    }
}

/// A run of blocks laid out relative to its own top edge, placed as one unit.
#[derive(Default)]
struct Unit {
    height: f64,
    blocks: Vec<(f64, f64, f64, f64, BlockContent)>,
    region: Option<(RegionSection, i32, usize, usize)>,
}

impl Unit {
    fn push(&mut self, x: f64, dy: f64, width: f64, height: f64, content: BlockContent) {
        self.height = self.height.max(dy + height);
        self.blocks.push((x, dy, width, height, content));
    }
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn format_marks(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn summary_text(totals: &Totals) -> String {
    format!(
        "{}/{} {:.2}% {}",
        format_marks(totals.total_marks),
        format_marks(totals.total_max_marks),
        totals.percentage,
        totals.outcome.as_str(),
    )
}

pub struct LayoutEngine {
    config: LayoutConfig,
    phrases: Arc<dyn PhrasePolicy>,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig, phrases: Arc<dyn PhrasePolicy>) -> Self {
        Self { config, phrases }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn context(
        &self,
        record: AggregatedRecord,
        branch_name: Option<String>,
        issued_on: NaiveDate,
    ) -> DocumentContext {
        DocumentContext {
            record,
            branch_name,
            institution_name: self.config.institution_name.clone(),
            program_years: self.config.program_years,
            issued_on,
        }
    }

    pub fn layout(&self, kind: DocumentKind, ctx: &DocumentContext) -> DocumentLayout {
        let template = kind.template();
        let phrases = self.phrases.phrases(ctx.record.student.sex());
        let cfg = &self.config;

        let mut blocks = self.page_header(&template, ctx);
        let mut regions = Vec::new();

        let body = match template.body {
            TemplateBody::TextOnly => self.text_units(kind, ctx, &phrases),
            TemplateBody::MarksTable => self.table_units(ctx),
        };
        let mut units = body;
        units.push(self.signature_unit(ctx));

        let heights: Vec<f64> = units.iter().map(|unit| unit.height).collect();
        let frame = StackFrame {
            first_page: 0,
            start_y: cfg.content_top,
            continuation_top: cfg.continuation_top,
            bottom: cfg.page_bottom,
            spacing: cfg.table_spacing,
        };
        let placements = stack_units(&heights, frame);
        for (unit, placement) in units.into_iter().zip(&placements) {
            place(unit, placement.page, placement.y, &mut blocks, &mut regions);
        }

        if template.has_table() && !ctx.record.is_empty() {
            let appendix_page = next_page_after(&placements, 1);
            self.appendix(ctx, appendix_page, &mut blocks, &mut regions);
        }

        let page_count = blocks
            .iter()
            .map(|block| block.page + 1)
            .max()
            .unwrap_or(1);
        for page in 0..page_count {
            blocks.push(PositionedBlock {
                page,
                x: cfg.margin_x,
                y: cfg.page_bottom + 0.03,
                width: cfg.table_width,
                height: cfg.line_height(9.0),
                content: BlockContent::Text {
                    text: format!("Page {} of {}", page + 1, page_count),
                    style: TextStyle {
                        size: 9.0,
                        bold: false,
                        align: Align::Center,
                    },
                },
            });
        }

        DocumentLayout {
            kind,
            title: template.title.to_string(),
            page_width_mm: cfg.page_width_mm,
            page_height_mm: cfg.page_height_mm,
            page_count,
            blocks,
            regions,
        }
    }

    fn page_header(&self, template: &Template, ctx: &DocumentContext) -> Vec<PositionedBlock> {
        let cfg = &self.config;
        let centered = |page, y, size, text: String| PositionedBlock {
            page,
            x: cfg.margin_x,
            y,
            width: cfg.table_width,
            height: cfg.line_height(size),
            content: BlockContent::Text {
                text,
                style: TextStyle {
                    size,
                    bold: true,
                    align: Align::Center,
                },
            },
        };
        vec![
            centered(0, 0.04, 16.0, ctx.institution_name.clone()),
            centered(0, 0.085, 13.0, template.title.to_string()),
        ]
    }

    fn text_units(&self, kind: DocumentKind, ctx: &DocumentContext, phrases: &Phrases) -> Vec<Unit> {
        let cfg = &self.config;
        let size = cfg.body_size;
        let line_height = cfg.line_height(size);
        let max_chars = cfg.chars_per_line(cfg.table_width, size);

        templates::paragraphs(kind, ctx, phrases)
            .into_iter()
            .map(|paragraph| {
                let mut unit = Unit::default();
                for (idx, line) in wrap_text(&paragraph, max_chars).into_iter().enumerate() {
                    unit.push(
                        cfg.margin_x,
                        idx as f64 * line_height,
                        cfg.table_width,
                        line_height,
                        BlockContent::Text {
                            text: line,
                            style: TextStyle::body(size),
                        },
                    );
                }
                unit
            })
            .collect()
    }

    fn table_units(&self, ctx: &DocumentContext) -> Vec<Unit> {
        let cfg = &self.config;
        let mut units = vec![self.details_unit(ctx)];

        if ctx.record.is_empty() {
            let mut note = Unit::default();
            note.push(
                cfg.margin_x,
                0.0,
                cfg.table_width,
                cfg.row_height,
                BlockContent::Text {
                    text: "No results recorded for the requested semesters.".to_string(),
                    style: TextStyle::body(cfg.body_size),
                },
            );
            units.push(note);
            return units;
        }

        for group in ctx.record.semesters.values() {
            units.push(self.semester_unit(group));
        }

        let mut summary = Unit::default();
        let totals = &ctx.record.totals;
        let label_width = cfg.first_column_width;
        summary.push(
            cfg.margin_x,
            0.0,
            label_width,
            cfg.row_height,
            BlockContent::Cell {
                text: "Overall".to_string(),
                header: true,
            },
        );
        summary.push(
            cfg.margin_x + label_width,
            0.0,
            cfg.table_width - label_width,
            cfg.row_height,
            BlockContent::Cell {
                text: format!("{} ({})", summary_text(totals), totals.division.label()),
                header: false,
            },
        );
        units.push(summary);
        units
    }

    fn details_unit(&self, ctx: &DocumentContext) -> Unit {
        let cfg = &self.config;
        let size = cfg.body_size;
        let line_height = cfg.line_height(size) * 1.2;
        let label_width = 0.22;
        let mut unit = Unit::default();
        for (idx, (label, value)) in templates::detail_lines(ctx).into_iter().enumerate() {
            let dy = idx as f64 * line_height;
            unit.push(
                cfg.margin_x,
                dy,
                label_width,
                line_height,
                BlockContent::Text {
                    text: format!("{label}:"),
                    style: TextStyle {
                        size,
                        bold: true,
                        align: Align::Left,
                    },
                },
            );
            unit.push(
                cfg.margin_x + label_width,
                dy,
                cfg.table_width - label_width,
                line_height,
                BlockContent::Text {
                    text: value,
                    style: TextStyle::body(size),
                },
            );
        }
        unit
    }

    /// Header row of subject codes over a data row of marks; always placed whole.
    fn semester_unit(&self, group: &SemesterGroup) -> Unit {
        let cfg = &self.config;
        let geometry = TableGeometry::new(
            cfg.margin_x,
            cfg.table_width,
            cfg.first_column_width,
            cfg.last_column_width,
            group.lines.len(),
        );
        let spans = geometry.column_spans();
        let row = cfg.row_height;

        let mut header = vec![format!("Semester {}", roman(group.number))];
        header.extend(group.lines.iter().map(|line| line.subject_code.clone()));
        header.push("Total".to_string());

        let mut data = vec!["Marks (Grade)".to_string()];
        data.extend(group.lines.iter().map(|line| {
            format!(
                "{}/{} ({})",
                format_marks(line.obtained_marks),
                format_marks(line.max_marks),
                line.grade
            )
        }));
        data.push(summary_text(&group.totals));

        let mut unit = Unit {
            region: Some((RegionSection::Summary, group.number, 2, spans.len())),
            ..Unit::default()
        };
        for ((x, width), text) in spans.iter().copied().zip(header) {
            unit.push(x, 0.0, width, row, BlockContent::Cell { text, header: true });
        }
        for ((x, width), text) in spans.iter().copied().zip(data) {
            unit.push(x, row, width, row, BlockContent::Cell { text, header: false });
        }
        unit
    }

    fn signature_unit(&self, ctx: &DocumentContext) -> Unit {
        let cfg = &self.config;
        let size = cfg.body_size;
        let line_height = cfg.line_height(size);
        let half = cfg.table_width / 2.0;
        let mut unit = Unit::default();
        unit.push(
            cfg.margin_x,
            line_height * 2.0,
            half,
            line_height,
            BlockContent::Text {
                text: format!("Date: {}", ctx.issued_on.format("%d-%m-%Y")),
                style: TextStyle::body(size),
            },
        );
        unit.push(
            cfg.margin_x + half,
            line_height * 2.0,
            half,
            line_height,
            BlockContent::Text {
                text: "Registrar".to_string(),
                style: TextStyle {
                    size,
                    bold: true,
                    align: Align::Right,
                },
            },
        );
        unit
    }

    /// Subject abbreviation tables, one atomic unit per semester, starting on `first_page`.
    fn appendix(
        &self,
        ctx: &DocumentContext,
        first_page: usize,
        blocks: &mut Vec<PositionedBlock>,
        regions: &mut Vec<TableRegion>,
    ) {
        let cfg = &self.config;
        let row = cfg.row_height;
        let heading_height = cfg.line_height(13.0);
        blocks.push(PositionedBlock {
            page: first_page,
            x: cfg.margin_x,
            y: cfg.continuation_top,
            width: cfg.table_width,
            height: heading_height,
            content: BlockContent::Text {
                text: "Subject Abbreviations".to_string(),
                style: TextStyle {
                    size: 13.0,
                    bold: true,
                    align: Align::Center,
                },
            },
        });

        let code_width = cfg.appendix_code_width;
        let name_width = cfg.table_width - code_width;
        let units: Vec<Unit> = ctx
            .record
            .semesters
            .values()
            .map(|group| {
                let mut unit = Unit {
                    region: Some((RegionSection::Appendix, group.number, group.lines.len() + 1, 2)),
                    ..Unit::default()
                };
                unit.push(
                    cfg.margin_x,
                    0.0,
                    cfg.table_width,
                    row,
                    BlockContent::Cell {
                        text: format!("Semester {}", roman(group.number)),
                        header: true,
                    },
                );
                for (idx, line) in group.lines.iter().enumerate() {
                    let dy = (idx + 1) as f64 * row;
                    unit.push(
                        cfg.margin_x,
                        dy,
                        code_width,
                        row,
                        BlockContent::Cell {
                            text: line.subject_code.clone(),
                            header: false,
                        },
                    );
                    unit.push(
                        cfg.margin_x + code_width,
                        dy,
                        name_width,
                        row,
                        BlockContent::Cell {
                            text: line.subject_name.clone(),
                            header: false,
                        },
                    );
                }
                unit
            })
            .collect();

        let heights: Vec<f64> = units.iter().map(|unit| unit.height).collect();
        let frame = StackFrame {
            first_page,
            start_y: cfg.continuation_top + heading_height + cfg.table_spacing,
            continuation_top: cfg.continuation_top,
            bottom: cfg.page_bottom,
            spacing: cfg.table_spacing,
        };
        let placements = stack_units(&heights, frame);
        for (unit, placement) in units.into_iter().zip(&placements) {
            place(unit, placement.page, placement.y, blocks, regions);
        }
    }
}

fn place(
    unit: Unit,
    page: usize,
    y: f64,
    blocks: &mut Vec<PositionedBlock>,
    regions: &mut Vec<TableRegion>,
) {
    if let Some((section, semester, rows, columns)) = unit.region {
        regions.push(TableRegion {
            section,
            semester,
            page,
            y,
            height: unit.height,
            rows,
            columns,
        });
    }
    blocks.extend(
        unit.blocks
            .into_iter()
            .map(|(x, dy, width, height, content)| PositionedBlock {
                page,
                x,
                y: y + dy,
                width,
                height,
                content,
            }),
    );
}
