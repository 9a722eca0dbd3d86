use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

/// What the analysis service is asked to read.
#[derive(Debug, Clone, Copy)]
pub enum AnalyzeRequest<'a> {
    Url(&'a str),
    Bytes {
        bytes: &'a [u8],
        content_type: &'a str,
    },
}

/// Owned analysis input derived from a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisTarget {
    Url(String),
    Bytes { bytes: Vec<u8>, content_type: String },
}

impl AnalysisTarget {
    pub fn describe(&self) -> String {
        match self {
            AnalysisTarget::Url(url) => url.clone(),
            AnalysisTarget::Bytes { bytes, content_type } => {
                format!("<{} bytes of {}>", bytes.len(), content_type)
            }
        }
    }
}

/// Typed field value as reported by the document-understanding service.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Date(NaiveDate),
    Time(String),
    Number(f64),
    Integer(i64),
    Currency { amount: f64, code: Option<String> },
    /// Any other value type, kept as the service's text content
    Other(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) | FieldValue::Time(s) | FieldValue::Other(s) => f.write_str(s),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Currency { amount, .. } => write!(f, "{}", amount),
        }
    }
}

/// One result document of a completed analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzedDocument {
    pub doc_type: Option<String>,
    pub fields: HashMap<String, FieldValue>,
}

impl AnalyzedDocument {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }
}
