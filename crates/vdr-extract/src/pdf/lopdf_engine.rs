//! PDF engine backed by lopdf
//!
//! Text comes from lopdf's own extraction; tables come from the ruled-line
//! finder in `tables`, so borderless tables are not detected.

use lopdf::{Document, ObjectId};

use super::tables::find_tables;
use super::{PdfDocument, PdfEngine, RawPage};
use crate::error::{Error, Result};

/// Pure-Rust PDF engine
#[derive(Debug, Clone, Default)]
pub struct LopdfEngine;

impl LopdfEngine {
    pub fn new() -> Self {
        Self
    }

    fn load(data: &[u8]) -> Result<Document> {
        if data.is_empty() {
            return Err(Error::InvalidPdf("empty document".to_string()));
        }
        Document::load_mem(data).map_err(|e| Error::InvalidPdf(e.to_string()))
    }
}

struct LopdfDocument {
    doc: Document,
    /// Page numbers and object ids in reading order
    pages: Vec<(u32, ObjectId)>,
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn extract_page(&self, position: u32) -> Result<RawPage> {
        let (page_no, page_id) = self
            .pages
            .get(position as usize)
            .copied()
            .ok_or_else(|| Error::Pdf(format!("page position {} out of range", position)))?;

        let text = self
            .doc
            .extract_text(&[page_no])
            .map_err(|e| Error::Pdf(format!("extract text of page {}: {}", page_no, e)))?;

        let tables = find_tables(&self.doc, page_id)
            .map_err(|e| Error::Pdf(format!("detect tables on page {}: {}", page_no, e)))?;

        Ok(RawPage {
            text: text.trim_end().to_string(),
            tables,
        })
    }
}

impl PdfEngine for LopdfEngine {
    fn name(&self) -> &str {
        "lopdf_text"
    }

    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfDocument>> {
        let doc = Self::load(data)?;
        // get_pages is a BTreeMap keyed by page number, already ordered
        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        Ok(Box::new(LopdfDocument { doc, pages }))
    }

    fn slice_pages(&self, data: &[u8], start: u32, end: u32) -> Result<Vec<u8>> {
        let mut doc = Self::load(data)?;
        let total = doc.get_pages().len() as u32;
        if start == 0 || start > end || end > total {
            return Err(Error::Pdf(format!(
                "page range {}-{} outside document of {} pages",
                start, end, total
            )));
        }

        let drop: Vec<u32> = (1..=total).filter(|p| *p < start || *p > end).collect();
        if !drop.is_empty() {
            doc.delete_pages(&drop);
            doc.prune_objects();
        }
        doc.compress();

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| Error::Pdf(format!("write sliced PDF: {}", e)))?;
        Ok(out)
    }
}

/// Build a small PDF with one text line per page
#[cfg(test)]
pub(crate) fn sample_pdf(page_texts: &[&str]) -> Vec<u8> {
    let contents: Vec<String> = page_texts
        .iter()
        .map(|text| format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text))
        .collect();
    pdf_from_contents(&contents)
}

/// Build a PDF with one raw content stream per page and Helvetica as `/F1`
#[cfg(test)]
pub(crate) fn pdf_from_contents(contents: &[String]) -> Vec<u8> {
    use lopdf::{dictionary, Object, Stream};

    let mut doc = Document::with_version("1.4");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::new();
    for content in contents {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.clone().into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}
