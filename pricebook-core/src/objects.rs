/// Object identifier: (object_number, generation_number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(pub u32, pub u16);

/// A parsed PDF object per PDF 32000-1:2008 Section 7.3.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// PDF name object (stored without the leading `/`).
    Name(String),
    /// Literal or hexadecimal string, already unescaped to raw bytes.
    String(Vec<u8>),
    Array(Vec<PdfObject>),
    Dictionary(Dictionary),
    /// Stream dictionary plus the raw (still encoded) stream body.
    Stream(Dictionary, Vec<u8>),
    Reference(ObjId),
}

impl PdfObject {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value of an integer or real operand.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PdfObject::Integer(n) => Some(*n as f64),
            PdfObject::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PdfObject]> {
        match self {
            PdfObject::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The dictionary of a plain dictionary or of a stream.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            PdfObject::Dictionary(d) | PdfObject::Stream(d, _) => Some(d),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjId> {
        match self {
            PdfObject::Reference(id) => Some(*id),
            _ => None,
        }
    }
}

/// Key-value pairs of a PDF dictionary. Keeps source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(Vec<(String, PdfObject)>);

impl Dictionary {
    pub fn new() -> Self {
        Dictionary(Vec::new())
    }

    /// Insert a key, replacing an earlier entry with the same name.
    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) {
        let key = key.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PdfObject::as_name)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(PdfObject::as_i64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PdfObject)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, PdfObject)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (String, PdfObject)>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}
