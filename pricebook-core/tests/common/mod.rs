//! Builds small, structurally valid PDFs for tests.
//!
//! Object layout: 1 catalog, 2 page tree, 3 font, then per page `i` the page
//! dictionary `4 + 2i` and its content stream `5 + 2i`. An optional form
//! XObject follows the pages. Resources live on the page tree node and are
//! inherited by every page.
#![allow(dead_code)]

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Classic `xref` table and `trailer`.
    XrefTable,
    /// PDF 1.5 cross-reference stream, non-stream objects packed in an object stream.
    XrefStream,
}

#[derive(Debug, Clone)]
pub struct Fixture {
    pages: Vec<String>,
    compress: bool,
    layout: Layout,
    form: Option<String>,
    raw_filter: Option<String>,
}

impl Fixture {
    pub fn new<S: AsRef<str>>(pages: &[S]) -> Self {
        Fixture {
            pages: pages.iter().map(|p| p.as_ref().to_string()).collect(),
            compress: false,
            layout: Layout::XrefTable,
            form: None,
            raw_filter: None,
        }
    }

    /// FlateDecode every content stream.
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn with_xref_stream(mut self) -> Self {
        self.layout = Layout::XrefStream;
        self
    }

    /// Add a form XObject `/Fm1`, declared in the inherited page-tree resources.
    pub fn with_form(mut self, content: &str) -> Self {
        self.form = Some(content.to_string());
        self
    }

    /// Declare `filter` on content streams without encoding the data.
    pub fn with_raw_filter(mut self, filter: &str) -> Self {
        self.raw_filter = Some(filter.to_string());
        self
    }

    pub fn content_obj(page: usize) -> u32 {
        5 + 2 * page as u32
    }

    fn form_obj(&self) -> u32 {
        4 + 2 * self.pages.len() as u32
    }

    pub fn build(&self) -> Vec<u8> {
        let n = self.pages.len() as u32;
        let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
        let xobject = if self.form.is_some() {
            format!(" /XObject << /Fm1 {} 0 R >>", self.form_obj())
        } else {
            String::new()
        };

        let mut plain: Vec<(u32, String)> = vec![
            (1, "<< /Type /Catalog /Pages 2 0 R >>".to_string()),
            (
                2,
                format!(
                    "<< /Type /Pages /Kids [{}] /Count {} \
                     /Resources << /Font << /F1 3 0 R >>{} >> >>",
                    kids.join(" "),
                    n,
                    xobject
                ),
            ),
            (
                3,
                "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
            ),
        ];
        for i in 0..n {
            plain.push((
                4 + 2 * i,
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R >>",
                    5 + 2 * i
                ),
            ));
        }

        let mut streams: Vec<(u32, String, Vec<u8>)> = Vec::new();
        for (i, content) in self.pages.iter().enumerate() {
            let (dict, data) = self.encode(content.as_bytes());
            streams.push((Self::content_obj(i), dict, data));
        }
        if let Some(form) = &self.form {
            let (dict, data) = self.encode(form.as_bytes());
            streams.push((
                self.form_obj(),
                format!("/Type /XObject /Subtype /Form /BBox [0 0 612 792] {dict}"),
                data,
            ));
        }

        let mut out = ObjectWriter::new();
        match self.layout {
            Layout::XrefTable => {
                for (num, body) in &plain {
                    out.object(*num, body.as_bytes());
                }
                for (num, dict, data) in &streams {
                    out.stream(*num, dict, data);
                }
                out.finish_with_table(1)
            }
            Layout::XrefStream => {
                let objstm_num = self.form_obj() + 1;
                for (num, dict, data) in &streams {
                    out.stream(*num, dict, data);
                }
                out.object_stream(objstm_num, &plain);
                out.finish_with_xref_stream(objstm_num + 1, 1)
            }
        }
    }

    fn encode(&self, data: &[u8]) -> (String, Vec<u8>) {
        if let Some(filter) = &self.raw_filter {
            (format!("/Filter /{filter}"), data.to_vec())
        } else if self.compress {
            ("/Filter /FlateDecode".to_string(), deflate(data))
        } else {
            (String::new(), data.to_vec())
        }
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Escape text for a PDF literal string.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '(' | ')' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// One text object with each line one leading below the previous.
pub fn lines_page(lines: &[&str]) -> String {
    let mut s = String::from("BT /F1 10 Tf 14 TL 72 760 Td\n");
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            s.push_str("T*\n");
        }
        s.push_str(&format!("({}) Tj\n", escape(line)));
    }
    s.push_str("ET\n");
    s
}

/// One text object per table cell, cells of a row sharing a baseline. Rows
/// start below the block written by [`lines_page`] for a short heading.
pub fn table_page(rows: &[[&str; 3]]) -> String {
    let mut s = String::new();
    for (i, [code, description, price]) in rows.iter().enumerate() {
        let y = 700 - 16 * i as i32;
        s.push_str(&format!(
            "BT /F1 10 Tf 1 0 0 1 72 {y} Tm ({}) Tj ET\n\
             BT /F1 10 Tf 1 0 0 1 150 {y} Tm ({}) Tj ET\n\
             BT /F1 10 Tf 1 0 0 1 480 {y} Tm ({}) Tj ET\n",
            escape(code),
            escape(description),
            escape(price),
        ));
    }
    s
}

/// Append an incremental update that replaces object `num` with a new
/// content stream holding `content`.
pub fn append_update(mut base: Vec<u8>, num: u32, content: &str) -> Vec<u8> {
    let prev = startxref_of(&base);
    let size = xref_size_of(&base).max(num + 1);

    let offset = base.len();
    base.extend_from_slice(
        format!("{num} 0 obj\n<< /Length {} >>\nstream\n", content.len()).as_bytes(),
    );
    base.extend_from_slice(content.as_bytes());
    base.extend_from_slice(b"\nendstream\nendobj\n");

    let xref_offset = base.len();
    base.extend_from_slice(format!("xref\n0 1\n0000000000 65535 f\r\n{num} 1\n").as_bytes());
    base.extend_from_slice(format!("{offset:010} 00000 n\r\n").as_bytes());
    base.extend_from_slice(
        format!(
            "trailer\n<< /Size {size} /Root 1 0 R /Prev {prev} >>\nstartxref\n{xref_offset}\n%%EOF\n"
        )
        .as_bytes(),
    );
    base
}

fn startxref_of(pdf: &[u8]) -> usize {
    let text = String::from_utf8_lossy(pdf);
    let pos = text.rfind("startxref").unwrap();
    text[pos + 9..]
        .split_whitespace()
        .next()
        .unwrap()
        .parse()
        .unwrap()
}

fn xref_size_of(pdf: &[u8]) -> u32 {
    let text = String::from_utf8_lossy(pdf);
    let pos = text.rfind("/Size ").unwrap();
    text[pos + 6..]
        .split_whitespace()
        .next()
        .unwrap()
        .parse()
        .unwrap()
}

/// Serializes indirect objects while tracking byte offsets for the xref.
struct ObjectWriter {
    buf: Vec<u8>,
    /// (object number, xref entry type, field 2, field 3)
    entries: Vec<(u32, u8, u32, u16)>,
}

impl ObjectWriter {
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n");
        ObjectWriter {
            buf,
            entries: Vec::new(),
        }
    }

    fn object(&mut self, num: u32, body: &[u8]) {
        self.entries.push((num, 1, self.buf.len() as u32, 0));
        self.buf
            .extend_from_slice(format!("{num} 0 obj\n").as_bytes());
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, num: u32, dict: &str, data: &[u8]) {
        let mut body =
            format!("<< {dict} /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.object(num, &body);
    }

    fn object_stream(&mut self, num: u32, objects: &[(u32, String)]) {
        let mut header = String::new();
        let mut body = String::new();
        for (index, (obj_num, text)) in objects.iter().enumerate() {
            header.push_str(&format!("{obj_num} {} ", body.len()));
            body.push_str(text);
            body.push('\n');
            self.entries.push((*obj_num, 2, num, index as u16));
        }
        let data = deflate(format!("{header}{body}").as_bytes());
        let dict = format!(
            "/Type /ObjStm /N {} /First {} /Filter /FlateDecode",
            objects.len(),
            header.len()
        );
        self.stream(num, &dict, &data);
    }

    fn finish_with_table(mut self, root: u32) -> Vec<u8> {
        self.entries.sort_by_key(|e| e.0);
        let size = self.entries.last().map(|e| e.0 + 1).unwrap_or(1);
        let xref_offset = self.buf.len();
        self.buf
            .extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f\r\n").as_bytes());
        for num in 1..size {
            match self.entries.iter().find(|e| e.0 == num) {
                Some(&(_, _, offset, _)) => self
                    .buf
                    .extend_from_slice(format!("{offset:010} 00000 n\r\n").as_bytes()),
                None => self.buf.extend_from_slice(b"0000000000 00000 f\r\n"),
            }
        }
        self.buf.extend_from_slice(
            format!(
                "trailer\n<< /Size {size} /Root {root} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
            )
            .as_bytes(),
        );
        self.buf
    }

    fn finish_with_xref_stream(mut self, num: u32, root: u32) -> Vec<u8> {
        let xref_offset = self.buf.len();
        self.entries.push((num, 1, xref_offset as u32, 0));
        self.entries.sort_by_key(|e| e.0);
        let size = num + 1;

        // Rows of /W [1 4 2], PNG "Up" predicted.
        const COLUMNS: usize = 7;
        let mut raw = Vec::new();
        let mut prev = [0u8; COLUMNS];
        for obj in 0..size {
            let mut row = [0u8; COLUMNS];
            match self.entries.iter().find(|e| e.0 == obj) {
                Some(&(_, kind, field2, field3)) => {
                    row[0] = kind;
                    row[1..5].copy_from_slice(&field2.to_be_bytes());
                    row[5..7].copy_from_slice(&field3.to_be_bytes());
                }
                None => row[5..7].copy_from_slice(&u16::MAX.to_be_bytes()),
            }
            raw.push(2);
            for i in 0..COLUMNS {
                raw.push(row[i].wrapping_sub(prev[i]));
            }
            prev = row;
        }

        let data = deflate(&raw);
        let dict = format!(
            "/Type /XRef /Size {size} /W [1 4 2] /Root {root} 0 R \
             /Filter /FlateDecode /DecodeParms << /Predictor 12 /Columns {COLUMNS} >>"
        );
        let mut body = format!("<< {dict} /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\nendstream");
        self.buf
            .extend_from_slice(format!("{num} 0 obj\n").as_bytes());
        self.buf.extend_from_slice(&body);
        self.buf.extend_from_slice(b"\nendobj\n");
        self.buf.extend_from_slice(
            format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes(),
        );
        self.buf
    }
}
