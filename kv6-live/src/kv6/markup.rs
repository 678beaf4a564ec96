//! Owned, normalized XML tree.
//!
//! KV6 payloads are small and loosely structured, so we parse them once into
//! a simple owned tree with normalized names and do all field lookups
//! against that. Normalization strips namespace prefixes and rewrites
//! dash-separated names to underscores (`rd-x` becomes `rd_x`) at every
//! depth.

/// An element with its normalized name, trimmed text and child elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Concatenated direct text content, trimmed; `None` if blank.
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    /// Parse a document and return its normalized root element.
    pub fn parse_document(text: &str) -> Result<Element, roxmltree::Error> {
        let doc = roxmltree::Document::parse(text)?;
        Ok(Self::from_node(doc.root_element()))
    }

    fn from_node(node: roxmltree::Node<'_, '_>) -> Element {
        let text: String = node
            .children()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect();
        let text = text.trim();

        Element {
            name: normalize_name(node.tag_name().name()),
            text: (!text.is_empty()).then(|| text.to_string()),
            children: node
                .children()
                .filter(|n| n.is_element())
                .map(Self::from_node)
                .collect(),
        }
    }

    /// First child with the given (normalized) name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child with the given name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.text.as_deref())
    }
}

/// Rewrite a tag name into the form used for lookups.
pub fn normalize_name(name: &str) -> String {
    let local = name.rsplit(':').next().unwrap_or(name);
    local.replace('-', "_")
}
