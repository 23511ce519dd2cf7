use std::collections::BTreeMap;

/// Free-form, site-specific key/value data attached to records and results.
pub type Extra = BTreeMap<String, String>;

/// One metadata hit returned by a search source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetadataRecord {
    /// Item identifier as reported by the source, e.g. `ABC-123`.
    pub number: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub title: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub cover_url: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub release_date: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub source: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Vec::is_empty")
    )]
    pub tags: Vec<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "BTreeMap::is_empty")
    )]
    pub extra: Extra,
}

impl MetadataRecord {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Ordered records returned by a search, with incremental pagination state.
///
/// `offset` is the offset of the next page to request, i.e. the number of
/// records consumed from the source so far. Pages are appended, never
/// replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResultSet {
    pub records: Vec<MetadataRecord>,
    pub has_more: bool,
    pub offset: usize,
}

impl ResultSet {
    pub fn new(records: Vec<MetadataRecord>, has_more: bool) -> Self {
        let offset = records.len();
        Self {
            records,
            has_more,
            offset,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&MetadataRecord> {
        self.records.first()
    }

    pub fn next_offset(&self) -> usize {
        self.offset
    }

    pub fn append_page(
        &mut self,
        records: Vec<MetadataRecord>,
        has_more: bool,
    ) {
        self.offset += records.len();
        self.records.extend(records);
        self.has_more = has_more;
    }
}
