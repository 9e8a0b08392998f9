use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Response format requested through the `format` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFormat {
    #[default]
    Json,
    Plain,
    Xml,
}

impl ListFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListFormat::Json => "json",
            ListFormat::Plain => "plain",
            ListFormat::Xml => "xml",
        }
    }
}

/// Query parameters for account and container listings.
///
/// `prefix`, `delimiter` and `path` only apply to object listings and are
/// dropped when listing containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub format: ListFormat,
    pub limit: Option<u32>,
    pub marker: Option<String>,
    pub end_marker: Option<String>,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub path: Option<String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: ListFormat) -> Self {
        self.format = format;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn end_marker(mut self, end_marker: impl Into<String>) -> Self {
        self.end_marker = Some(end_marker.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Query pairs in the order Swift documents them. `format` is always sent.
    pub fn query_pairs(&self, object_filters: bool) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("format", self.format.as_str().to_string())];
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        let mut push = |key: &'static str, value: &Option<String>| {
            if let Some(v) = value.as_ref().filter(|v| !v.is_empty()) {
                pairs.push((key, v.clone()));
            }
        };
        push("marker", &self.marker);
        push("end_marker", &self.end_marker);
        if object_filters {
            push("prefix", &self.prefix);
            push("delimiter", &self.delimiter);
            push("path", &self.path);
        }
        pairs
    }
}

/// One entry of an account listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// One entry of a container listing. With a `delimiter`, Swift rolls up
/// common prefixes into `{"subdir": ...}` pseudo-entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectEntry {
    Object(ObjectInfo),
    Subdir { subdir: String },
}

impl ObjectEntry {
    pub fn name(&self) -> &str {
        match self {
            ObjectEntry::Object(info) => &info.name,
            ObjectEntry::Subdir { subdir } => subdir,
        }
    }
}

/// A listing body: parsed entries for JSON, the raw text otherwise
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing<T> {
    Parsed(Vec<T>),
    Raw(String),
}

impl<T: DeserializeOwned> Listing<T> {
    /// Parse a response body according to the format that was requested.
    /// An empty body (204 No Content) is an empty listing.
    pub fn parse(format: ListFormat, body: String) -> Result<Self, serde_json::Error> {
        match format {
            ListFormat::Json if body.trim().is_empty() => Ok(Listing::Parsed(Vec::new())),
            ListFormat::Json => serde_json::from_str(&body).map(Listing::Parsed),
            ListFormat::Plain | ListFormat::Xml => Ok(Listing::Raw(body)),
        }
    }
}

impl<T> Listing<T> {
    pub fn entries(&self) -> Option<&[T]> {
        match self {
            Listing::Parsed(entries) => Some(entries),
            Listing::Raw(_) => None,
        }
    }

    pub fn into_entries(self) -> Option<Vec<T>> {
        match self {
            Listing::Parsed(entries) => Some(entries),
            Listing::Raw(_) => None,
        }
    }

    /// Non-empty lines of a plain listing
    pub fn lines(&self) -> Vec<&str> {
        match self {
            Listing::Parsed(_) => Vec::new(),
            Listing::Raw(body) => body.lines().filter(|l| !l.is_empty()).collect(),
        }
    }
}
