//! Text recovery from page content streams.
//!
//! Only the text-showing and positioning operators are interpreted. Lines
//! are rebuilt from vertical movement of the text origin: fragments that
//! land on the same baseline are joined, anything else starts a new line.

use std::collections::HashMap;

use crate::error::{PricebookError, Result};
use crate::lexer::{self, Lexer, Token};
use crate::objects::PdfObject;
use crate::reader::PdfReader;

/// Baselines closer than this (in user-space units) share a line.
const LINE_TOLERANCE: f64 = 2.0;
/// `TJ` displacements wider than this many thousandths of an em read as a space.
const TJ_SPACE_THRESHOLD: f64 = 200.0;
const MAX_FORM_DEPTH: usize = 8;

/// Decoded page content ready for text extraction.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    /// The page's content streams, decoded and concatenated.
    pub content: Vec<u8>,
    /// Form XObjects by resource name, decoded.
    pub forms: HashMap<String, Vec<u8>>,
}

/// Lines recovered from one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub lines: Vec<String>,
    /// Number of text-showing operators (`Tj`, `TJ`, `'`, `"`) executed.
    pub text_operators: usize,
}

/// Plain text of a whole document, page by page, in content-stream order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedText {
    pub pages: Vec<Vec<String>>,
}

impl ExtractedText {
    /// All lines of all pages in document order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().flatten().map(String::as_str)
    }

    pub fn line_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }
}

/// Extract the text lines of every page.
///
/// Fails with [`PricebookError::EmptyDocument`] when not a single page shows
/// any text, which is what a scanned, image-only PDF looks like.
pub fn extract_text(reader: &PdfReader) -> Result<ExtractedText> {
    let mut pages = Vec::with_capacity(reader.page_count());
    let mut text_operators = 0;
    for index in 0..reader.page_count() {
        let content = reader.page_content(index)?;
        let page = extract_page_text(&content);
        tracing::debug!(
            page = index + 1,
            lines = page.lines.len(),
            text_operators = page.text_operators,
            "extracted page text"
        );
        text_operators += page.text_operators;
        pages.push(page.lines);
    }
    if text_operators == 0 {
        return Err(PricebookError::EmptyDocument);
    }
    Ok(ExtractedText { pages })
}

/// Interpret one page's content stream and rebuild its text lines.
pub fn extract_page_text(page: &PageContent) -> PageText {
    let mut state = TextState::new(&page.forms);
    state.run(&page.content, 0);
    state.finish()
}

// ── Text state machine ─────────────────────────────────────────────────────────

/// Affine matrix `[a b c d e f]` in PDF's row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f64, ty: f64) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`: apply `self`, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }
}

struct TextState<'f> {
    forms: &'f HashMap<String, Vec<u8>>,
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    leading: f64,
    /// A positioning operator ran since the last fragment was placed.
    moved: bool,
    /// `T*`, `'` or `"` ran: the next fragment starts a new line regardless of position.
    force_break: bool,
    line_y: Option<f64>,
    current: String,
    lines: Vec<String>,
    text_operators: usize,
}

impl<'f> TextState<'f> {
    fn new(forms: &'f HashMap<String, Vec<u8>>) -> Self {
        TextState {
            forms,
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            leading: 0.0,
            moved: false,
            force_break: false,
            line_y: None,
            current: String::new(),
            lines: Vec::new(),
            text_operators: 0,
        }
    }

    fn run(&mut self, content: &[u8], depth: usize) {
        let mut lexer = Lexer::new(content);
        let mut operands: Vec<PdfObject> = Vec::new();
        loop {
            let mut ahead = lexer;
            let Some(token) = ahead.next_token() else {
                break;
            };
            match token {
                Token::Keyword(op) if !matches!(op, b"true" | b"false" | b"null") => {
                    lexer = ahead;
                    if op == b"BI" {
                        skip_inline_image(&mut lexer);
                    } else {
                        self.apply(op, &operands, depth);
                    }
                    operands.clear();
                }
                _ => match lexer::parse_object(&mut lexer) {
                    Some(obj) => operands.push(obj),
                    // Stray `]` or `>>`: the lexer already moved past it.
                    None => operands.clear(),
                },
            }
        }
    }

    fn apply(&mut self, op: &[u8], operands: &[PdfObject], depth: usize) {
        match op {
            b"q" => self.ctm_stack.push(self.ctm),
            b"Q" => {
                if let Some(m) = self.ctm_stack.pop() {
                    self.ctm = m;
                }
            }
            b"cm" => {
                if let Some(m) = numbers::<6>(operands) {
                    self.ctm = Matrix(m).then(&self.ctm);
                }
            }
            b"BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
                self.moved = true;
            }
            b"TL" => {
                if let Some([leading]) = numbers::<1>(operands) {
                    self.leading = leading;
                }
            }
            b"Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    self.move_line(tx, ty);
                }
            }
            b"TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    self.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            b"Tm" => {
                if let Some(m) = numbers::<6>(operands) {
                    self.line_matrix = Matrix(m);
                    self.text_matrix = self.line_matrix;
                    self.moved = true;
                }
            }
            b"T*" => self.next_line(),
            b"Tj" => {
                if let Some(PdfObject::String(s)) = operands.last() {
                    self.show(s);
                }
            }
            b"'" | b"\"" => {
                self.next_line();
                if let Some(PdfObject::String(s)) = operands.last() {
                    self.show(s);
                }
            }
            b"TJ" => {
                if let Some(PdfObject::Array(items)) = operands.last() {
                    self.show_array(items);
                }
            }
            b"Do" => {
                let forms = self.forms;
                if let Some(form) = operands
                    .last()
                    .and_then(PdfObject::as_name)
                    .and_then(|name| forms.get(name))
                {
                    if depth < MAX_FORM_DEPTH {
                        let saved = self.ctm;
                        let stack_len = self.ctm_stack.len();
                        self.run(form, depth + 1);
                        self.ctm_stack.truncate(stack_len);
                        self.ctm = saved;
                    }
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
        self.moved = true;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
        self.force_break = true;
    }

    fn show(&mut self, bytes: &[u8]) {
        self.text_operators += 1;
        self.place_fragment();
        self.current.push_str(&decode_text(bytes));
    }

    fn show_array(&mut self, items: &[PdfObject]) {
        self.text_operators += 1;
        self.place_fragment();
        for item in items {
            match item {
                PdfObject::String(s) => self.current.push_str(&decode_text(s)),
                other => {
                    let Some(adjust) = other.as_f64() else {
                        continue;
                    };
                    // Negative adjustments move the next glyph to the right.
                    if -adjust > TJ_SPACE_THRESHOLD {
                        self.push_separator();
                    }
                }
            }
        }
    }

    /// Decide whether the next fragment continues the current line, and
    /// separate it from the previous fragment when the origin jumped.
    fn place_fragment(&mut self) {
        let y = self.text_matrix.then(&self.ctm).0[5];
        let off_baseline = self
            .line_y
            .is_some_and(|line_y| (line_y - y).abs() > LINE_TOLERANCE);
        if self.force_break || off_baseline {
            self.break_line();
        } else if self.moved {
            self.push_separator();
        }
        self.line_y.get_or_insert(y);
        self.moved = false;
        self.force_break = false;
    }

    fn push_separator(&mut self) {
        if !self.current.is_empty() && !self.current.ends_with(' ') {
            self.current.push(' ');
        }
    }

    fn break_line(&mut self) {
        let line = std::mem::take(&mut self.current);
        let line = line.trim();
        if !line.is_empty() {
            self.lines.push(line.to_string());
        }
        self.line_y = None;
    }

    fn finish(mut self) -> PageText {
        self.break_line();
        PageText {
            lines: self.lines,
            text_operators: self.text_operators,
        }
    }
}

/// The last `N` operands as numbers, if they all are.
fn numbers<const N: usize>(operands: &[PdfObject]) -> Option<[f64; N]> {
    let tail = operands.get(operands.len().checked_sub(N)?..)?;
    let mut out = [0.0; N];
    for (slot, obj) in out.iter_mut().zip(tail) {
        *slot = obj.as_f64()?;
    }
    Some(out)
}

/// Skip an inline image (`BI ... ID <binary> EI`); `BI` is already consumed.
fn skip_inline_image(lexer: &mut Lexer<'_>) {
    loop {
        match lexer.next_token() {
            Some(Token::Keyword(b"ID")) => break,
            Some(_) => {}
            None => return,
        }
    }
    // One whitespace byte separates `ID` from the image data.
    lexer.advance(1);
    let rest = lexer.rest();
    let end = (0..rest.len().saturating_sub(1)).find(|&i| {
        &rest[i..i + 2] == b"EI"
            && (i == 0 || lexer::is_whitespace(rest[i - 1]))
            && rest.get(i + 2).map_or(true, |&b| lexer::is_whitespace(b))
    });
    match end {
        Some(i) => lexer.advance(i + 2),
        None => lexer.advance(rest.len()),
    }
}

/// Map string bytes to text using WinAnsiEncoding, the encoding of the
/// standard Latin fonts. Control characters become spaces.
fn decode_text(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x00..=0x1F | 0x7F => ' ',
            0x80 => '€',
            0x85 => '…',
            0x91 => '‘',
            0x92 => '’',
            0x93 => '“',
            0x94 => '”',
            0x95 => '•',
            0x96 => '–',
            0x97 => '—',
            0x99 => '™',
            _ => char::from(b),
        })
        .collect()
}
