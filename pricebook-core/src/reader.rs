use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::content::PageContent;
use crate::error::{PdfReadError, PricebookError};
use crate::filters::decode_stream;
use crate::lexer::{self, Lexer, Token};
use crate::objects::{Dictionary, ObjId, PdfObject};

/// Reference chains longer than this are treated as cycles.
const MAX_REF_DEPTH: usize = 32;
/// Nesting limit for form XObjects referenced from page resources.
const MAX_FORM_DEPTH: usize = 8;

// ── Cross-reference data ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XrefEntry {
    /// Object number is free (deleted) in the newest revision.
    Free,
    /// Byte offset of an uncompressed indirect object.
    Offset(usize),
    /// Object `index` inside the object stream numbered `stream`.
    Compressed { stream: u32, index: usize },
}

type XrefTable = HashMap<u32, XrefEntry>;

/// One xref table or xref stream plus its trailer dictionary.
struct XrefSection {
    entries: Vec<(u32, XrefEntry)>,
    trailer: Dictionary,
}

/// A leaf of the page tree with its effective (possibly inherited) resources.
#[derive(Debug, Clone)]
struct PageNode {
    id: ObjId,
    dict: Dictionary,
    resources: Option<Dictionary>,
}

// ── Public API ─────────────────────────────────────────────────────────────────

/// Reads an existing PDF file.
///
/// `PdfReader` parses the cross-reference data (classic tables and PDF 1.5
/// xref streams, following `/Prev` chains) and walks the page tree once at
/// construction. Objects are resolved on demand from the retained bytes, so
/// page content is only decoded when it is asked for.
pub struct PdfReader {
    data: Vec<u8>,
    xref: XrefTable,
    version: String,
    pages: Vec<PageNode>,
}

impl PdfReader {
    /// Open a PDF from a file path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PricebookError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| PricebookError::ReadInput {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(data)?)
    }

    /// Parse a PDF from raw bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, PdfReadError> {
        let version = parse_version(&data)?;
        let xref_offset = find_startxref(&data)?;
        let (xref, trailer) = load_xref_chain(&data, xref_offset)?;
        let root = trailer
            .get("Root")
            .and_then(PdfObject::as_reference)
            .ok_or(PdfReadError::MalformedTrailer)?;

        let mut reader = PdfReader {
            data,
            xref,
            version,
            pages: Vec::new(),
        };
        reader.pages = reader.collect_pages(root)?;
        tracing::debug!(
            version = %reader.version,
            objects = reader.xref.len(),
            pages = reader.pages.len(),
            "parsed PDF structure"
        );
        Ok(reader)
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// PDF version string (e.g. `"1.7"`).
    pub fn pdf_version(&self) -> &str {
        &self.version
    }

    /// Resolve an indirect object by id.
    pub fn resolve(&self, id: ObjId) -> Result<PdfObject, PdfReadError> {
        match self.xref.get(&id.0) {
            Some(XrefEntry::Offset(offset)) => {
                if *offset >= self.data.len() {
                    return Err(PdfReadError::UnresolvableObject(id.0));
                }
                let (found, obj) = parse_indirect_at(&self.data, *offset, Some(&self.xref))
                    .ok_or(PdfReadError::MalformedObject(id.0))?;
                if found.0 != id.0 {
                    return Err(PdfReadError::UnresolvableObject(id.0));
                }
                Ok(obj)
            }
            Some(XrefEntry::Compressed { stream, index }) => {
                self.resolve_compressed(id.0, *stream, *index)
            }
            Some(XrefEntry::Free) | None => Err(PdfReadError::UnresolvableObject(id.0)),
        }
    }

    /// Follow references until a direct object is reached.
    pub fn deref(&self, obj: &PdfObject) -> Result<PdfObject, PdfReadError> {
        let mut current = obj.clone();
        for _ in 0..MAX_REF_DEPTH {
            if let PdfObject::Reference(id) = current {
                current = self.resolve(id)?;
            } else {
                return Ok(current);
            }
        }
        let num = current.as_reference().map(|id| id.0).unwrap_or(0);
        Err(PdfReadError::UnresolvableObject(num))
    }

    /// Decoded content streams of page `index` (zero-based), concatenated in
    /// order, plus the form XObjects reachable from its resources.
    pub fn page_content(&self, index: usize) -> Result<PageContent, PdfReadError> {
        let page = self
            .pages
            .get(index)
            .ok_or(PdfReadError::MalformedPageTree)?;

        let mut content = Vec::new();
        if let Some(contents) = page.dict.get("Contents") {
            match self.deref(contents)? {
                PdfObject::Array(parts) => {
                    for part in &parts {
                        self.append_stream(part, page.id, &mut content)?;
                    }
                }
                stream @ PdfObject::Stream(..) => {
                    self.append_stream(&stream, page.id, &mut content)?
                }
                PdfObject::Null => {}
                _ => return Err(PdfReadError::MalformedObject(page.id.0)),
            }
        }

        let mut forms = HashMap::new();
        if let Some(resources) = &page.resources {
            self.collect_forms(resources, &mut forms, 0)?;
        }
        Ok(PageContent { content, forms })
    }

    fn append_stream(
        &self,
        obj: &PdfObject,
        page: ObjId,
        out: &mut Vec<u8>,
    ) -> Result<(), PdfReadError> {
        match self.deref(obj)? {
            PdfObject::Stream(dict, raw) => {
                if !out.is_empty() {
                    out.push(b'\n');
                }
                out.extend_from_slice(&decode_stream(&dict, &raw)?);
                Ok(())
            }
            _ => Err(PdfReadError::MalformedObject(page.0)),
        }
    }

    /// Gather `/Subtype /Form` XObjects by resource name, descending into
    /// nested form resources. The first definition of a name wins.
    fn collect_forms(
        &self,
        resources: &Dictionary,
        forms: &mut HashMap<String, Vec<u8>>,
        depth: usize,
    ) -> Result<(), PdfReadError> {
        if depth >= MAX_FORM_DEPTH {
            return Ok(());
        }
        let Some(xobjects) = resources.get("XObject") else {
            return Ok(());
        };
        let xobjects = self.deref(xobjects)?;
        let Some(xobjects) = xobjects.as_dict() else {
            return Ok(());
        };

        for (name, value) in xobjects.iter() {
            if forms.contains_key(name) {
                continue;
            }
            let PdfObject::Stream(dict, raw) = self.deref(value)? else {
                continue;
            };
            if dict.get_name("Subtype") != Some("Form") {
                continue;
            }
            forms.insert(name.clone(), decode_stream(&dict, &raw)?);
            if let Some(inner) = dict.get("Resources") {
                if let Some(inner) = self.deref(inner)?.as_dict() {
                    self.collect_forms(inner, forms, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_compressed(
        &self,
        num: u32,
        stream: u32,
        index: usize,
    ) -> Result<PdfObject, PdfReadError> {
        let container = match self.xref.get(&stream) {
            Some(XrefEntry::Offset(_)) => self.resolve(ObjId(stream, 0))?,
            _ => return Err(PdfReadError::UnresolvableObject(num)),
        };
        let PdfObject::Stream(dict, raw) = container else {
            return Err(PdfReadError::MalformedObject(stream));
        };
        if dict.get_name("Type") != Some("ObjStm") {
            return Err(PdfReadError::MalformedObject(stream));
        }
        let first = dict
            .get_i64("First")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(PdfReadError::MalformedObject(stream))?;
        let count = dict
            .get_i64("N")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(PdfReadError::MalformedObject(stream))?;

        let body = decode_stream(&dict, &raw)?;
        let mut header = Lexer::new(&body[..first.min(body.len())]);
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            match (header.next_token(), header.next_token()) {
                (Some(Token::Integer(n)), Some(Token::Integer(off))) => {
                    offsets.push((n, off));
                }
                _ => return Err(PdfReadError::MalformedObject(stream)),
            }
        }

        // The xref index is a hint; fall back to a search by object number.
        let (_, relative) = offsets
            .get(index)
            .filter(|(n, _)| *n == i64::from(num))
            .or_else(|| offsets.iter().find(|(n, _)| *n == i64::from(num)))
            .ok_or(PdfReadError::UnresolvableObject(num))?;
        let start = usize::try_from(*relative)
            .ok()
            .and_then(|r| r.checked_add(first))
            .ok_or(PdfReadError::MalformedObject(stream))?;

        let mut lexer = Lexer::at(&body, start);
        lexer::parse_object(&mut lexer).ok_or(PdfReadError::MalformedObject(num))
    }

    /// Walk the catalog → pages chain and collect page leaves in order.
    fn collect_pages(&self, catalog_id: ObjId) -> Result<Vec<PageNode>, PdfReadError> {
        let catalog = self.resolve(catalog_id)?;
        let catalog = catalog.as_dict().ok_or(PdfReadError::MalformedTrailer)?;
        let pages_ref = catalog
            .get("Pages")
            .and_then(PdfObject::as_reference)
            .ok_or(PdfReadError::MalformedPageTree)?;

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.walk_page_tree(pages_ref, None, &mut visited, &mut pages)?;
        Ok(pages)
    }

    fn walk_page_tree(
        &self,
        id: ObjId,
        inherited: Option<&Dictionary>,
        visited: &mut HashSet<ObjId>,
        out: &mut Vec<PageNode>,
    ) -> Result<(), PdfReadError> {
        if !visited.insert(id) {
            return Err(PdfReadError::MalformedPageTree);
        }
        let PdfObject::Dictionary(dict) = self.resolve(id)? else {
            return Err(PdfReadError::MalformedPageTree);
        };

        let resources = match dict.get("Resources") {
            Some(res) => self.deref(res)?.as_dict().cloned(),
            None => None,
        }
        .or_else(|| inherited.cloned());

        let is_tree_node = match dict.get_name("Type") {
            Some("Pages") => true,
            Some("Page") => false,
            _ => dict.get("Kids").is_some(),
        };

        if !is_tree_node {
            out.push(PageNode {
                id,
                dict,
                resources,
            });
            return Ok(());
        }

        let kids = dict.get("Kids").ok_or(PdfReadError::MalformedPageTree)?;
        let kids = self.deref(kids)?;
        let kids = kids.as_array().ok_or(PdfReadError::MalformedPageTree)?;
        for kid in kids {
            let kid = kid.as_reference().ok_or(PdfReadError::MalformedPageTree)?;
            self.walk_page_tree(kid, resources.as_ref(), visited, out)?;
        }
        Ok(())
    }
}

// ── Internal parsing ───────────────────────────────────────────────────────────

/// Extract the PDF version from the `%PDF-x.y` header.
fn parse_version(data: &[u8]) -> Result<String, PdfReadError> {
    if data.len() < 8 || !data.starts_with(b"%PDF-") {
        return Err(PdfReadError::NotAPdf);
    }
    // Version is the characters after "%PDF-" up to the first whitespace.
    let rest = &data[5..];
    let end = rest
        .iter()
        .position(|&b| lexer::is_whitespace(b))
        .unwrap_or(rest.len());
    let version = std::str::from_utf8(&rest[..end])
        .map(|s| s.to_string())
        .map_err(|_| PdfReadError::NotAPdf)?;
    Ok(version)
}

/// Scan backward from the end of the file to find the `startxref` offset.
///
/// PDF 32000-1 places `startxref\n{offset}\n%%EOF` near the end of the file.
/// We search within the last 1024 bytes to handle comments or trailing whitespace.
fn find_startxref(data: &[u8]) -> Result<usize, PdfReadError> {
    let search_start = data.len().saturating_sub(1024);
    let tail = &data[search_start..];

    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or(PdfReadError::StartxrefNotFound)?;

    let mut lexer = Lexer::at(tail, pos + keyword.len());
    let offset = match lexer.next_token() {
        Some(Token::Integer(n)) => usize::try_from(n).map_err(|_| PdfReadError::StartxrefNotFound)?,
        _ => return Err(PdfReadError::StartxrefNotFound),
    };

    if offset >= data.len() {
        return Err(PdfReadError::StartxrefNotFound);
    }

    Ok(offset)
}

/// Load the newest xref section and every older one reachable through
/// `/Prev` (and `/XRefStm` in hybrid files). Entries from newer sections
/// shadow older ones; the newest trailer is returned.
fn load_xref_chain(data: &[u8], start: usize) -> Result<(XrefTable, Dictionary), PdfReadError> {
    let mut xref = XrefTable::new();
    let mut trailer: Option<Dictionary> = None;
    let mut visited = HashSet::new();
    let mut pending = vec![start];

    while let Some(offset) = pending.pop() {
        if !visited.insert(offset) {
            continue;
        }
        let section = load_xref_section(data, offset)?;
        for (num, entry) in section.entries {
            xref.entry(num).or_insert(entry);
        }

        // Pushed last, popped first: a hybrid file's xref stream overrides
        // its own table before older revisions are consulted.
        for key in ["Prev", "XRefStm"] {
            if let Some(next) = section.trailer.get_i64(key) {
                let next = usize::try_from(next).map_err(|_| PdfReadError::MalformedXref)?;
                if next >= data.len() {
                    return Err(PdfReadError::MalformedXref);
                }
                pending.push(next);
            }
        }
        if trailer.is_none() {
            trailer = Some(section.trailer);
        }
    }

    let trailer = trailer.ok_or(PdfReadError::MalformedTrailer)?;
    Ok((xref, trailer))
}

fn load_xref_section(data: &[u8], offset: usize) -> Result<XrefSection, PdfReadError> {
    let mut lexer = Lexer::at(data, offset);
    match lexer.next_token() {
        Some(Token::Keyword(b"xref")) => parse_xref_table(lexer),
        Some(Token::Integer(_)) => parse_xref_stream(data, offset),
        _ => Err(PdfReadError::MalformedXref),
    }
}

/// Parse a classic xref table (the `xref` keyword already consumed) and the
/// trailer dictionary that follows it.
///
/// Each subsection has a header line `{first_obj} {count}` followed by
/// entries `{offset:010} {gen:05} {n|f}`.
fn parse_xref_table(mut lexer: Lexer<'_>) -> Result<XrefSection, PdfReadError> {
    let mut entries = Vec::new();
    loop {
        let mut ahead = lexer;
        match ahead.next_token() {
            Some(Token::Keyword(b"trailer")) => {
                lexer = ahead;
                break;
            }
            Some(Token::Integer(first)) => {
                let Some(Token::Integer(count)) = ahead.next_token() else {
                    return Err(PdfReadError::MalformedXref);
                };
                lexer = ahead;
                for i in 0..count {
                    let (Some(Token::Integer(offset)), Some(Token::Integer(_)), Some(Token::Keyword(kind))) =
                        (lexer.next_token(), lexer.next_token(), lexer.next_token())
                    else {
                        return Err(PdfReadError::MalformedXref);
                    };
                    let num = u32::try_from(first + i).map_err(|_| PdfReadError::MalformedXref)?;
                    let entry = match kind {
                        b"n" => XrefEntry::Offset(
                            usize::try_from(offset).map_err(|_| PdfReadError::MalformedXref)?,
                        ),
                        b"f" => XrefEntry::Free,
                        _ => return Err(PdfReadError::MalformedXref),
                    };
                    if num > 0 {
                        entries.push((num, entry));
                    }
                }
            }
            _ => return Err(PdfReadError::MalformedXref),
        }
    }

    match lexer::parse_object(&mut lexer) {
        Some(PdfObject::Dictionary(trailer)) => Ok(XrefSection { entries, trailer }),
        _ => Err(PdfReadError::MalformedTrailer),
    }
}

/// Parse a PDF 1.5 cross-reference stream (`/Type /XRef`).
fn parse_xref_stream(data: &[u8], offset: usize) -> Result<XrefSection, PdfReadError> {
    let (_, obj) = parse_indirect_at(data, offset, None).ok_or(PdfReadError::MalformedXref)?;
    let PdfObject::Stream(dict, raw) = obj else {
        return Err(PdfReadError::MalformedXref);
    };
    if dict.get_name("Type") != Some("XRef") {
        return Err(PdfReadError::MalformedXref);
    }
    let body = decode_stream(&dict, &raw)?;

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(PdfObject::as_array)
        .map(|w| {
            w.iter()
                .filter_map(|v| v.as_i64().and_then(|n| usize::try_from(n).ok()))
                .collect()
        })
        .unwrap_or_default();
    if widths.len() != 3 {
        return Err(PdfReadError::MalformedXref);
    }
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(PdfReadError::MalformedXref);
    }

    let size = dict.get_i64("Size").ok_or(PdfReadError::MalformedXref)?;
    let ranges: Vec<(i64, i64)> = match dict.get("Index").and_then(PdfObject::as_array) {
        Some(index) => index
            .chunks_exact(2)
            .filter_map(|pair| Some((pair[0].as_i64()?, pair[1].as_i64()?)))
            .collect(),
        None => vec![(0, size)],
    };

    let mut rows = body.chunks_exact(row_len);
    let mut entries = Vec::new();
    'ranges: for (first, count) in ranges {
        for i in 0..count {
            let Some(row) = rows.next() else {
                break 'ranges;
            };
            let (kind, rest) = row.split_at(widths[0]);
            let (field2, field3) = rest.split_at(widths[1]);
            // A zero-width type field defaults to type 1.
            let kind = if widths[0] == 0 { 1 } else { read_be(kind) };
            let field2 = read_be(field2);
            let field3 = read_be(field3);

            let entry = match kind {
                0 => XrefEntry::Free,
                1 => XrefEntry::Offset(field2 as usize),
                2 => XrefEntry::Compressed {
                    stream: field2 as u32,
                    index: field3 as usize,
                },
                _ => continue,
            };
            let num = u32::try_from(first + i).map_err(|_| PdfReadError::MalformedXref)?;
            if num > 0 {
                entries.push((num, entry));
            }
        }
    }

    Ok(XrefSection {
        entries,
        trailer: dict,
    })
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| acc << 8 | u64::from(b))
}

/// Parse the indirect object `N G obj ... ` at `offset`, including a stream
/// body when the dictionary is followed by `stream`.
///
/// `xref` is used to resolve an indirect `/Length`; without it (or when the
/// declared length does not land on `endstream`) the body is delimited by
/// searching for the `endstream` keyword.
fn parse_indirect_at(
    data: &[u8],
    offset: usize,
    xref: Option<&XrefTable>,
) -> Option<(ObjId, PdfObject)> {
    let mut lexer = Lexer::at(data, offset);
    let id = lexer::parse_object_header(&mut lexer)?;
    let obj = lexer::parse_object(&mut lexer)?;

    let PdfObject::Dictionary(dict) = obj else {
        return Some((id, obj));
    };
    let mut ahead = lexer;
    if !matches!(ahead.next_token(), Some(Token::Keyword(b"stream"))) {
        return Some((id, PdfObject::Dictionary(dict)));
    }
    ahead.skip_stream_eol();
    let start = ahead.position();
    let length = declared_length(&dict, data, xref);
    let body = stream_body(data, start, length).to_vec();
    Some((id, PdfObject::Stream(dict, body)))
}

fn declared_length(dict: &Dictionary, data: &[u8], xref: Option<&XrefTable>) -> Option<usize> {
    match dict.get("Length")? {
        PdfObject::Integer(n) => usize::try_from(*n).ok(),
        PdfObject::Reference(id) => match xref?.get(&id.0)? {
            XrefEntry::Offset(offset) => match parse_indirect_at(data, *offset, None)? {
                (_, PdfObject::Integer(n)) => usize::try_from(n).ok(),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn stream_body(data: &[u8], start: usize, length: Option<usize>) -> &[u8] {
    if let Some(end) = length
        .and_then(|len| start.checked_add(len))
        .filter(|&end| end <= data.len())
    {
        let mut after = Lexer::at(data, end);
        if matches!(after.next_token(), Some(Token::Keyword(b"endstream"))) {
            return &data[start..end];
        }
    }

    let rest = &data[start.min(data.len())..];
    let keyword = b"endstream";
    let end = rest
        .windows(keyword.len())
        .position(|w| w == keyword)
        .unwrap_or(rest.len());
    let body = &rest[..end];
    body.strip_suffix(b"\r\n")
        .or_else(|| body.strip_suffix(b"\n"))
        .or_else(|| body.strip_suffix(b"\r"))
        .unwrap_or(body)
}
