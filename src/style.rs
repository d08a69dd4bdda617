//! `<Styles>` documents: selector plus template setter.
//!
//! Templates are marked as style content when loaded, so nothing a style
//! merges into an instance is ever written back out with that instance.

use crate::error::{Diagnostic, Diagnostics};
use crate::loader::InstanceLoader;
use crate::name::NameClassifier;
use crate::query::{parse_query, print_query, Query};
use crate::repr::AttSetterRepr;
use crate::xml::{XmlDocument, XmlElement};

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceStyle {
    pub query: Query,
    pub setter: AttSetterRepr,
}

impl InstanceStyle {
    /// Load one `<Style ref.Path="...">` element. Returns `None` when the
    /// path is missing or does not parse.
    pub fn load_from_xml(
        resource: &str,
        xml: &XmlElement,
        classifier: &dyn NameClassifier,
        errors: &mut Diagnostics,
    ) -> Option<Self> {
        let Some(path) = xml.attribute("ref.Path") else {
            errors.push(Diagnostic::new(
                resource,
                xml.range.start,
                "Missing attribute \"ref.Path\" in <Style>.",
            ));
            return None;
        };

        let query = match parse_query(&path.value) {
            Ok(query) => query,
            Err(err) => {
                errors.push(Diagnostic::new(
                    resource,
                    path.value_range.start.shifted(err.offset),
                    err.message,
                ));
                return None;
            }
        };

        let mut setter = AttSetterRepr::default();
        InstanceLoader::new(resource, classifier, errors).fill_att_setter(&mut setter, xml);
        setter.mark_from_style();
        Some(Self { query, setter })
    }

    /// `<Style>` with the selector. The template is style content and
    /// therefore emits nothing.
    pub fn save_to_xml(&self) -> XmlElement {
        let mut xml = XmlElement::new("Style");
        xml.push_attribute("ref.Path", print_query(&self.query));
        self.setter.fill_xml(&mut xml);
        xml
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceStyleContext {
    pub styles: Vec<InstanceStyle>,
}

impl InstanceStyleContext {
    pub fn load_from_xml(
        resource: &str,
        xml: &XmlDocument,
        classifier: &dyn NameClassifier,
        errors: &mut Diagnostics,
    ) -> Self {
        let mut context = Self::default();
        let root = &xml.root;
        if root.name != "Styles" {
            errors.push(Diagnostic::new(
                resource,
                root.range.start,
                "The root element of instance styles should be \"Styles\".",
            ));
            return context;
        }

        for element in root.elements() {
            if element.name == "Style" {
                if let Some(style) =
                    InstanceStyle::load_from_xml(resource, element, classifier, errors)
                {
                    context.styles.push(style);
                }
            } else {
                errors.push(Diagnostic::new(
                    resource,
                    element.range.start,
                    format!("Unknown element in <Styles>: \"{}\".", element.name),
                ));
            }
        }
        log::debug!("{}: loaded {} style(s)", resource, context.styles.len());
        context
    }

    pub fn save_to_xml(&self) -> XmlDocument {
        let mut xml = XmlElement::new("Styles");
        for style in &self.styles {
            xml.push_element(style.save_to_xml());
        }
        XmlDocument::new(xml)
    }
}
