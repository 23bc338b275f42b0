use std::panic;

use pdfium_render::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::layout::{Align, BlockContent, DocumentLayout, PositionedBlock};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to initialize PDFium")]
    Init,
    #[error("pdf rendering failed: {0}")]
    Backend(String),
}

impl From<PdfiumError> for RenderError {
    fn from(value: PdfiumError) -> Self {
        RenderError::Backend(value.to_string())
    }
}

/// Turns a computed layout into document bytes. Implementations are synchronous and are
/// expected to run on a blocking thread.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, layout: &DocumentLayout) -> Result<Vec<u8>, RenderError>;

    fn content_type(&self) -> &'static str;

    fn extension(&self) -> &'static str;
}

const CELL_TEXT_SIZE: f32 = 8.0;
const CELL_PADDING: f32 = 3.0;

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    pub fn new() -> Self {
        Self
    }
}

/// Maps normalized layout coordinates onto a page measured in points, origin bottom-left.
struct PageFrame {
    width: f32,
    height: f32,
}

impl PageFrame {
    fn left(&self, block: &PositionedBlock) -> f32 {
        block.x as f32 * self.width
    }

    fn right(&self, block: &PositionedBlock) -> f32 {
        (block.x + block.width) as f32 * self.width
    }

    fn top(&self, block: &PositionedBlock) -> f32 {
        self.height - block.y as f32 * self.height
    }

    fn bottom(&self, block: &PositionedBlock) -> f32 {
        self.height - (block.y + block.height) as f32 * self.height
    }
}

fn approx_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

fn fit_text(text: &str, width: f32, size: f32) -> String {
    let max_chars = ((width - 2.0 * CELL_PADDING) / (size * 0.5)).floor().max(1.0) as usize;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut fitted: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    fitted.push('.');
    fitted
}

impl DocumentRenderer for PdfiumRenderer {
    fn render(&self, layout: &DocumentLayout) -> Result<Vec<u8>, RenderError> {
        let pdfium = panic::catch_unwind(|| Pdfium::default()).map_err(|_| RenderError::Init)?;
        let mut document = pdfium.create_new_pdf()?;
        let regular = document.fonts_mut().helvetica();
        let bold = document.fonts_mut().helvetica_bold();

        let frame = PageFrame {
            width: PdfPoints::from_mm(layout.page_width_mm as f32).value,
            height: PdfPoints::from_mm(layout.page_height_mm as f32).value,
        };
        let black = PdfColor::new(0, 0, 0, 255);
        let shade = PdfColor::new(230, 230, 230, 255);

        for index in 0..layout.page_count {
            let mut page = document.pages_mut().create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::new(frame.width),
                PdfPoints::new(frame.height),
            ))?;

            for block in layout.blocks_on_page(index) {
                match &block.content {
                    BlockContent::Text { text, style } => {
                        let size = style.size as f32;
                        let left = frame.left(block);
                        let width = frame.right(block) - left;
                        let x = match style.align {
                            Align::Left => left,
                            Align::Center => left + (width - approx_text_width(text, size)) / 2.0,
                            Align::Right => left + width - approx_text_width(text, size),
                        };
                        let font = if style.bold { bold } else { regular };
                        page.objects_mut().create_text_object(
                            PdfPoints::new(x.max(0.0)),
                            PdfPoints::new(frame.bottom(block)),
                            text,
                            font,
                            PdfPoints::new(size),
                        )?;
                    }
                    BlockContent::Cell { text, header } => {
                        let rect = PdfRect::new_from_values(
                            frame.bottom(block),
                            frame.left(block),
                            frame.top(block),
                            frame.right(block),
                        );
                        let fill = header.then_some(shade);
                        page.objects_mut().create_path_object_rect(
                            rect,
                            Some(black),
                            Some(PdfPoints::new(0.5)),
                            fill,
                        )?;
                        let width = frame.right(block) - frame.left(block);
                        let height = frame.top(block) - frame.bottom(block);
                        page.objects_mut().create_text_object(
                            PdfPoints::new(frame.left(block) + CELL_PADDING),
                            PdfPoints::new(frame.bottom(block) + (height - CELL_TEXT_SIZE) / 2.0),
                            fit_text(text, width, CELL_TEXT_SIZE),
                            if *header { bold } else { regular },
                            PdfPoints::new(CELL_TEXT_SIZE),
                        )?;
                    }
                }
            }
        }

        let bytes = document.save_to_bytes()?;
        debug!(
            kind = %layout.kind,
            pages = layout.page_count,
            size = bytes.len(),
            "rendered document"
        );
        Ok(bytes)
    }

    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn extension(&self) -> &'static str {
        "pdf"
    }
}
