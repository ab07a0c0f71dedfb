//! Minimal price book PDFs for driving the binary: one font, one content
//! stream per page, classic xref table.
#![allow(dead_code)]

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

pub struct Fixture {
    pages: Vec<String>,
    compress: bool,
}

impl Fixture {
    pub fn new<S: AsRef<str>>(pages: &[S]) -> Self {
        Fixture {
            pages: pages.iter().map(|p| p.as_ref().to_string()).collect(),
            compress: false,
        }
    }

    /// FlateDecode every content stream.
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let n = self.pages.len();
        let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();

        let mut objects: Vec<Vec<u8>> = vec![
            b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {n} /Resources << /Font << /F1 3 0 R >> >> >>",
                kids.join(" ")
            )
            .into_bytes(),
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec(),
        ];
        for (i, content) in self.pages.iter().enumerate() {
            objects.push(
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R >>",
                    5 + 2 * i
                )
                .into_bytes(),
            );
            let (filter, data) = if self.compress {
                (" /Filter /FlateDecode", deflate(content.as_bytes()))
            } else {
                ("", content.as_bytes().to_vec())
            };
            let mut stream = format!("<<{filter} /Length {} >>\nstream\n", data.len()).into_bytes();
            stream.extend_from_slice(&data);
            stream.extend_from_slice(b"\nendstream");
            objects.push(stream);
        }

        let mut buf = b"%PDF-1.7\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(buf.len());
            buf.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
            buf.extend_from_slice(body);
            buf.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = buf.len();
        let size = objects.len() + 1;
        buf.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f\r\n").as_bytes());
        for offset in offsets {
            buf.extend_from_slice(format!("{offset:010} 00000 n\r\n").as_bytes());
        }
        buf.extend_from_slice(
            format!("trailer\n<< /Size {size} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n")
                .as_bytes(),
        );
        buf
    }
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn escape(text: &str) -> String {
    text.chars()
        .flat_map(|c| match c {
            '(' | ')' | '\\' => vec!['\\', c],
            _ => vec![c],
        })
        .collect()
}

/// Lines one leading apart in a single text object.
pub fn lines_page(lines: &[&str]) -> String {
    let body: Vec<String> = lines
        .iter()
        .map(|line| format!("({}) Tj", escape(line)))
        .collect();
    format!("BT /F1 10 Tf 14 TL 72 760 Td\n{}\nET\n", body.join("\nT*\n"))
}

/// Table rows of code, description and price cells sharing a baseline.
pub fn table_page(rows: &[[&str; 3]]) -> String {
    let mut s = String::new();
    for (i, cells) in rows.iter().enumerate() {
        let y = 700 - 16 * i as i32;
        for (x, cell) in [72, 150, 480].iter().zip(cells) {
            s.push_str(&format!(
                "BT /F1 10 Tf 1 0 0 1 {x} {y} Tm ({}) Tj ET\n",
                escape(cell)
            ));
        }
    }
    s
}
