//! Validation against the subset of XML Schema used by the platform
//! configuration schema.
//!
//! Supported: one global `xs:element`, nested `xs:complexType` holding an
//! `xs:sequence` or `xs:all` of elements, `minOccurs`/`maxOccurs` (including
//! `unbounded`) and `xs:attribute` with `use="required"`. Child order is not
//! enforced.

use std::collections::HashMap;

use xmltree::{Element, XMLNode};

use crate::domain::FirmwareError;

/// Reject documents that declare a DTD or entities before they reach the
/// parser.
pub fn reject_dtd(text: &str) -> Result<(), FirmwareError> {
    let upper = text.to_ascii_uppercase();
    if upper.contains("<!DOCTYPE") || upper.contains("<!ENTITY") {
        return Err(validation_error(
            "DTDs and entity declarations are forbidden",
        ));
    }
    Ok(())
}

pub(crate) fn validation_error(detail: impl std::fmt::Display) -> FirmwareError {
    FirmwareError::InvalidConfiguration(format!("XML validation error: {}", detail))
}

fn schema_error(detail: impl std::fmt::Display) -> FirmwareError {
    FirmwareError::InvalidConfiguration(format!("Error with Schema file: {}", detail))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeDecl {
    name: String,
    required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Content {
    Simple,
    Complex(Vec<ElementDecl>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ElementDecl {
    name: String,
    min_occurs: u32,
    /// `None` means unbounded.
    max_occurs: Option<u32>,
    attributes: Vec<AttributeDecl>,
    content: Content,
}

/// A compiled schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    root: ElementDecl,
}

impl Schema {
    /// Compile a schema from its XSD text.
    pub fn parse(text: &str) -> Result<Self, FirmwareError> {
        reject_dtd(text)?;
        let doc = Element::parse(text.as_bytes()).map_err(schema_error)?;
        if doc.name != "schema" {
            return Err(schema_error(format!(
                "root element is <{}>, expected <schema>",
                doc.name
            )));
        }

        let root = child_elements(&doc)
            .find(|child| child.name == "element")
            .ok_or_else(|| schema_error("no global element declaration"))?;
        Ok(Self {
            root: parse_element_decl(root)?,
        })
    }

    /// Name of the document element this schema describes.
    pub fn root_name(&self) -> &str {
        &self.root.name
    }

    /// Check `doc` against the schema.
    pub fn validate(&self, doc: &Element) -> Result<(), FirmwareError> {
        if doc.name != self.root.name {
            return Err(validation_error(format!(
                "unexpected root element <{}>, expected <{}>",
                doc.name, self.root.name
            )));
        }
        validate_element(doc, &self.root)
    }
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}

fn parse_occurs(value: Option<&String>, attr: &str) -> Result<Option<u32>, FirmwareError> {
    match value.map(|v| v.trim()) {
        None => Ok(Some(1)),
        Some("unbounded") => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| schema_error(format!("invalid {} value '{}'", attr, raw))),
    }
}

fn parse_element_decl(decl: &Element) -> Result<ElementDecl, FirmwareError> {
    let name = decl
        .attributes
        .get("name")
        .cloned()
        .ok_or_else(|| schema_error("element declaration without a name"))?;
    let min_occurs = parse_occurs(decl.attributes.get("minOccurs"), "minOccurs")?
        .ok_or_else(|| schema_error("minOccurs cannot be unbounded"))?;
    let max_occurs = parse_occurs(decl.attributes.get("maxOccurs"), "maxOccurs")?;

    let mut attributes = Vec::new();
    let mut content = Content::Simple;

    for child in child_elements(decl) {
        match child.name.as_str() {
            "annotation" | "simpleType" => {}
            "complexType" => {
                let mut children = Vec::new();
                for part in child_elements(child) {
                    match part.name.as_str() {
                        "annotation" => {}
                        "sequence" | "all" => {
                            for item in child_elements(part) {
                                if item.name != "element" {
                                    return Err(schema_error(format!(
                                        "unsupported construct <{}> in <{}>",
                                        item.name, part.name
                                    )));
                                }
                                children.push(parse_element_decl(item)?);
                            }
                        }
                        "attribute" => attributes.push(parse_attribute_decl(part)?),
                        other => {
                            return Err(schema_error(format!(
                                "unsupported construct <{}> in complexType",
                                other
                            )))
                        }
                    }
                }
                content = Content::Complex(children);
            }
            other => {
                return Err(schema_error(format!(
                    "unsupported construct <{}> in element {}",
                    other, name
                )))
            }
        }
    }

    Ok(ElementDecl {
        name,
        min_occurs,
        max_occurs,
        attributes,
        content,
    })
}

fn parse_attribute_decl(decl: &Element) -> Result<AttributeDecl, FirmwareError> {
    let name = decl
        .attributes
        .get("name")
        .cloned()
        .ok_or_else(|| schema_error("attribute declaration without a name"))?;
    let required = decl.attributes.get("use").map(String::as_str) == Some("required");
    Ok(AttributeDecl { name, required })
}

fn validate_element(element: &Element, decl: &ElementDecl) -> Result<(), FirmwareError> {
    for attr in element.attributes.keys() {
        if !decl.attributes.iter().any(|a| &a.name == attr) {
            return Err(validation_error(format!(
                "attribute '{}' not allowed on <{}>",
                attr, element.name
            )));
        }
    }
    for required in decl.attributes.iter().filter(|a| a.required) {
        if !element.attributes.contains_key(&required.name) {
            return Err(validation_error(format!(
                "missing required attribute '{}' on <{}>",
                required.name, element.name
            )));
        }
    }

    match &decl.content {
        Content::Simple => {
            if let Some(child) = child_elements(element).next() {
                return Err(validation_error(format!(
                    "<{}> cannot contain element <{}>",
                    element.name, child.name
                )));
            }
            Ok(())
        }
        Content::Complex(children) => {
            let has_text = element.children.iter().any(|node| match node {
                XMLNode::Text(text) | XMLNode::CData(text) => !text.trim().is_empty(),
                _ => false,
            });
            if has_text {
                return Err(validation_error(format!(
                    "<{}> cannot contain character data",
                    element.name
                )));
            }

            let mut counts: HashMap<&str, u32> = HashMap::new();
            for child in child_elements(element) {
                let child_decl = children
                    .iter()
                    .find(|d| d.name == child.name)
                    .ok_or_else(|| {
                        validation_error(format!(
                            "unexpected element <{}> in <{}>",
                            child.name, element.name
                        ))
                    })?;
                *counts.entry(child_decl.name.as_str()).or_default() += 1;
                validate_element(child, child_decl)?;
            }

            for child_decl in children {
                let seen = counts.get(child_decl.name.as_str()).copied().unwrap_or(0);
                if seen < child_decl.min_occurs {
                    return Err(validation_error(format!(
                        "<{}> requires at least {} <{}>, found {}",
                        element.name, child_decl.min_occurs, child_decl.name, seen
                    )));
                }
                if let Some(max) = child_decl.max_occurs {
                    if seen > max {
                        return Err(validation_error(format!(
                            "<{}> allows at most {} <{}>, found {}",
                            element.name, max, child_decl.name, seen
                        )));
                    }
                }
            }
            Ok(())
        }
    }
}
