//! In-memory PDF fixtures shared by unit and integration tests.

use lopdf::{dictionary, Document, Object, Stream};

/// A document with `num_pages` blank pages.
pub fn blank_pdf(num_pages: u32) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for _ in 0..num_pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => num_pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// [`blank_pdf`] serialised to bytes.
pub fn blank_pdf_bytes(num_pages: u32) -> Vec<u8> {
    let mut doc = blank_pdf(num_pages);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("in-memory save");
    buf
}
