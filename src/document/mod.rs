//! XML documents and the path-expression query port.
//!
//! Documents are parsed with `roxmltree` into a read-only tree. Expressions
//! from the mapping descriptor are evaluated against nodes of that tree by
//! an [`Evaluator`], which resolves prefixes through the descriptor's
//! [`Namespaces`].

pub mod eval;
pub mod xpath;

use roxmltree::{Attribute, Document, Node, ParsingOptions};

pub use eval::Evaluator;
pub use xpath::{Expression, XPathError};

/// Errors raised while reading an input document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("malformed XML: {0}")]
    Parse(#[from] roxmltree::Error),
}

/// Parse document text into a tree. DTDs are accepted but not applied.
pub fn parse_document(text: &str) -> Result<Document<'_>, DocumentError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Ok(Document::parse_with_options(text, options)?)
}

/// Prefix to URI bindings applied to every expression of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    bindings: Vec<(String, String)>,
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `prefix` to `uri`. Rebinding a prefix replaces its URI.
    pub fn bind(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let prefix = prefix.into();
        let uri = uri.into();
        match self.bindings.iter_mut().find(|(p, _)| *p == prefix) {
            Some(binding) => binding.1 = uri,
            None => self.bindings.push((prefix, uri)),
        }
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(_, u)| u == uri)
            .map(|(prefix, _)| prefix.as_str())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

/// One item selected by an expression: a tree node or an attribute of an
/// element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Item<'a, 'input> {
    Node(Node<'a, 'input>),
    Attribute { owner: Node<'a, 'input>, index: usize },
}

impl<'a, 'input> Item<'a, 'input> {
    pub fn node(&self) -> Option<Node<'a, 'input>> {
        match self {
            Item::Node(node) => Some(*node),
            Item::Attribute { .. } => None,
        }
    }

    pub fn attribute(&self) -> Option<Attribute<'a, 'input>> {
        match self {
            Item::Attribute { owner, index } => owner.attributes().nth(*index),
            Item::Node(_) => None,
        }
    }

    pub fn is_element(&self) -> bool {
        self.node().map_or(false, |node| node.is_element())
    }

    /// The document root of the tree this item belongs to.
    pub fn root(&self) -> Node<'a, 'input> {
        match self {
            Item::Node(node) => node.document().root(),
            Item::Attribute { owner, .. } => owner.document().root(),
        }
    }

    /// Sort key giving document order; attributes follow their element.
    pub fn order_key(&self) -> (u32, usize) {
        match self {
            Item::Node(node) => (node.id().get(), 0),
            Item::Attribute { owner, index } => (owner.id().get(), index + 1),
        }
    }

    /// The item's own scalar value: an attribute's value or the content
    /// of a text node. Elements have none.
    pub fn own_value(&self) -> Option<String> {
        match self {
            Item::Attribute { .. } => self.attribute().map(|attr| attr.value().to_string()),
            Item::Node(node) if node.is_text() => node.text().map(str::to_string),
            Item::Node(_) => None,
        }
    }

    /// Value of an unqualified attribute on an element item.
    pub fn attribute_value(&self, name: &str) -> Option<String> {
        match self {
            Item::Node(node) if node.is_element() => node.attribute(name).map(str::to_string),
            _ => None,
        }
    }

    /// XPath string-value: concatenated descendant text for elements.
    pub fn string_value(&self) -> String {
        match self {
            Item::Attribute { .. } => self
                .attribute()
                .map(|attr| attr.value().to_string())
                .unwrap_or_default(),
            Item::Node(node) if node.is_text() || node.is_comment() => {
                node.text().unwrap_or_default().to_string()
            }
            Item::Node(node) => node
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect(),
        }
    }

    /// Text of every non-blank descendant text node, in document order.
    pub fn text_leaves(&self) -> Vec<String> {
        match self {
            Item::Node(node) => node
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .filter(|text| !text.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Item::Attribute { .. } => vec![self.string_value()],
        }
    }
}

/// Sort items into document order and drop duplicates.
pub fn document_order(items: &mut Vec<Item<'_, '_>>) {
    items.sort_by_key(|item| item.order_key());
    items.dedup_by_key(|item| item.order_key());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_reports_malformed_xml() {
        assert!(parse_document("<a><b></a>").is_err());
        let doc = parse_document("<!DOCTYPE a><a/>").unwrap();
        assert_eq!(doc.root_element().tag_name().name(), "a");
    }

    #[test]
    fn test_namespaces_bind_and_resolve() {
        let mut ns = Namespaces::new();
        ns.bind("cda", "urn:hl7-org:v3");
        ns.bind("sdtc", "urn:hl7-org:sdtc");
        ns.bind("cda", "urn:other");

        assert_eq!(ns.len(), 2);
        assert_eq!(ns.resolve("cda"), Some("urn:other"));
        assert_eq!(ns.prefix_for("urn:hl7-org:sdtc"), Some("sdtc"));
        assert_eq!(ns.resolve("xsi"), None);
    }

    #[test]
    fn test_item_values() {
        let doc = parse_document(r#"<a code="X">one<b>two</b>  <c/></a>"#).unwrap();
        let root = doc.root_element();
        let element = Item::Node(root);
        let attribute = Item::Attribute { owner: root, index: 0 };
        let text = Item::Node(root.first_child().unwrap());

        assert_eq!(element.own_value(), None);
        assert_eq!(attribute.own_value().as_deref(), Some("X"));
        assert_eq!(text.own_value().as_deref(), Some("one"));
        assert_eq!(element.attribute_value("code").as_deref(), Some("X"));
        assert_eq!(element.string_value(), "onetwo  ");
        assert_eq!(element.text_leaves(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_document_order_dedups() {
        let doc = parse_document(r#"<a x="1"><b/><c/></a>"#).unwrap();
        let a = doc.root_element();
        let b = a.first_child().unwrap();
        let c = a.last_child().unwrap();

        let mut items = vec![
            Item::Node(c),
            Item::Attribute { owner: a, index: 0 },
            Item::Node(b),
            Item::Node(c),
            Item::Node(a),
        ];
        document_order(&mut items);

        assert_eq!(
            items,
            vec![
                Item::Node(a),
                Item::Attribute { owner: a, index: 0 },
                Item::Node(b),
                Item::Node(c),
            ]
        );
    }
}
