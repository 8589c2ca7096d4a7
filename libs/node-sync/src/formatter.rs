//! Translation of raw child names into connection-ready endpoints.

use tracing::debug;

/// Ordered, scheme-prefixed endpoints produced from one fetch.
///
/// Handed to the consumer by value; nothing keeps a copy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointSet(Vec<String>);

impl EndpointSet {
    /// number of endpoints
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// true if no endpoints were produced
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// iterate over endpoints in fetch order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// take the endpoints
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<EndpointSet> for Vec<String> {
    fn from(set: EndpointSet) -> Self {
        set.into_inner()
    }
}

/// Prefixes every raw child name with the transport scheme.
///
/// Names that are empty or whitespace-only are dropped; everything else is
/// passed through untouched and in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSetFormatter {
    scheme: String,
}

impl NodeSetFormatter {
    /// Create a formatter for `scheme`, ex. "tcp://"
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
        }
    }

    /// The configured scheme
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Format one fetch's children
    pub fn format<I, T>(&self, children: I) -> EndpointSet
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        EndpointSet(
            children
                .into_iter()
                .filter_map(|name| {
                    let name = name.as_ref();
                    if name.trim().is_empty() {
                        debug!(?name, "skipping empty child name");
                        None
                    } else {
                        Some(format!("{}{}", self.scheme, name))
                    }
                })
                .collect(),
        )
    }
}
