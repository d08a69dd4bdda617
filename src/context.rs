//! The `<Instance>` document model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Diagnostic, Diagnostics};
use crate::loader::InstanceLoader;
use crate::name::NameClassifier;
use crate::query::{execute_query, resolve_mut};
use crate::repr::ConstructorRepr;
use crate::resource::{parse_resource_url, Resource, ResourceResolver};
use crate::style::InstanceStyle;
use crate::xml::{TextPos, XmlCData, XmlDocument, XmlElement, XmlNode, CDATA_OPENER_LEN};

/// Namespace patterns used when an instance declares no bare `xmlns`.
pub const DEFAULT_NAMESPACES: &[&str] = &[
    "presentation::controls::Gui*",
    "presentation::elements::Gui*Element",
    "presentation::compositions::Gui*Composition",
    "presentation::compositions::Gui*",
    "presentation::templates::Gui*",
    "system::*",
    "system::reflection::*",
    "presentation::*",
    "presentation::Gui*",
    "presentation::controls::*",
    "presentation::controls::list::*",
    "presentation::controls::tree::*",
    "presentation::elements::*",
    "presentation::elements::Gui*",
    "presentation::elements::text::*",
    "presentation::compositions::*",
    "presentation::templates::*",
];

/// One `prefix*postfix` pattern of a namespace declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceNamespace {
    pub prefix: String,
    pub postfix: String,
}

impl InstanceNamespace {
    /// Split on the first `*`; without one the whole pattern is the prefix.
    pub fn parse(pattern: &str) -> Self {
        match pattern.split_once('*') {
            Some((prefix, postfix)) => Self {
                prefix: prefix.to_string(),
                postfix: postfix.to_string(),
            },
            None => Self {
                prefix: pattern.to_string(),
                postfix: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    /// Empty for the bare `xmlns`.
    pub name: String,
    pub att_position: TextPos,
    pub namespaces: Vec<InstanceNamespace>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceParameter {
    pub name: String,
    pub class_name: String,
    pub tag_position: TextPos,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceContext {
    pub code_behind: bool,
    pub class_name: String,
    pub class_position: TextPos,
    pub style_paths: Vec<String>,
    pub style_position: TextPos,
    pub namespaces: BTreeMap<String, NamespaceInfo>,
    pub parameters: Vec<InstanceParameter>,
    pub member_script: String,
    pub member_position: TextPos,
    pub instance: ConstructorRepr,
    /// Set by the first [`InstanceContext::apply_styles`] call.
    #[serde(skip)]
    pub applied_styles: bool,
    pub tag_position: TextPos,
}

fn split_by_semicolon(value: &str) -> impl Iterator<Item = &str> {
    value.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// The CDATA section of a `ref.Members` element, if that is its only child.
fn members_cdata(element: &XmlElement) -> Option<&XmlCData> {
    match element.children.as_slice() {
        [XmlNode::CData(cdata)] => Some(cdata),
        _ => None,
    }
}

impl InstanceContext {
    /// Load an `<Instance>` document. Returns `None` when the root is not
    /// `Instance` or no root constructor could be loaded.
    pub fn load_from_xml(
        resource: &str,
        xml: &XmlDocument,
        classifier: &dyn NameClassifier,
        errors: &mut Diagnostics,
    ) -> Option<Self> {
        let root = &xml.root;
        if root.name != "Instance" {
            log::debug!("{}: root element <{}> is not <Instance>", resource, root.name);
            return None;
        }

        let mut context = InstanceContext {
            tag_position: root.range.start,
            ..Self::default()
        };

        if let Some(att) = root.attribute("ref.CodeBehind") {
            context.code_behind = att.value == "true";
        }
        if let Some(att) = root.attribute("ref.Class") {
            context.class_name = att.value.clone();
            context.class_position = att.range.start;
        }
        if let Some(att) = root.attribute("ref.Styles") {
            context.style_paths = split_by_semicolon(&att.value).map(str::to_string).collect();
            context.style_position = att.range.start;
        }

        context.load_namespaces(root);

        let mut loader = InstanceLoader::new(resource, classifier, errors);
        let mut instance = None;
        for element in root.elements() {
            match element.name.as_str() {
                "ref.Parameter" => match (element.attribute("Name"), element.attribute("Class")) {
                    (Some(name), Some(class)) => context.parameters.push(InstanceParameter {
                        name: name.value.clone(),
                        class_name: class.value.clone(),
                        tag_position: element.range.start,
                    }),
                    _ => loader.error(
                        element.name_range.start,
                        "ref.Parameter requires the following attributes existing at the same time: Name, Class.",
                    ),
                },
                "ref.Members" => match members_cdata(element) {
                    Some(cdata) => {
                        context.member_script = cdata.content.clone();
                        context.member_position = cdata.range.start.shifted(CDATA_OPENER_LEN);
                    }
                    None => loader.error(
                        element.range.start,
                        "Script should be contained in a CDATA section.",
                    ),
                },
                _ if instance.is_none() => instance = loader.load_ctor(element),
                _ => {}
            }
        }

        context.instance = instance?;
        log::debug!(
            "{}: loaded instance \"{}\" with root <{}>",
            resource,
            context.class_name,
            context.instance.qualified_name()
        );
        Some(context)
    }

    fn load_namespaces(&mut self, root: &XmlElement) {
        let default_namespaces = DEFAULT_NAMESPACES.join(";");
        let mut declarations: Vec<(String, TextPos, &str)> = Vec::new();
        for att in &root.attributes {
            let key = if att.name == "xmlns" {
                ""
            } else if let Some(key) = att.name.strip_prefix("xmlns:") {
                key
            } else {
                continue;
            };
            declarations.push((key.to_string(), att.range.start, att.value.as_str()));
        }

        if root.attribute("xmlns").is_none() {
            declarations.push((String::new(), TextPos::default(), default_namespaces.as_str()));
        }

        for (key, position, value) in declarations {
            let info = self
                .namespaces
                .entry(key.clone())
                .or_insert_with(|| NamespaceInfo {
                    name: key,
                    att_position: position,
                    namespaces: Vec::new(),
                });
            info.namespaces
                .extend(split_by_semicolon(value).map(InstanceNamespace::parse));
        }
    }

    /// The markup form of this context. Style content is left out.
    pub fn save_to_xml(&self) -> XmlDocument {
        let mut xml = XmlElement::new("Instance");
        xml.push_attribute("ref.CodeBehind", if self.code_behind { "true" } else { "false" });
        xml.push_attribute("ref.Class", self.class_name.as_str());

        for (key, info) in &self.namespaces {
            let name = if key.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{}", key)
            };
            let value = info
                .namespaces
                .iter()
                .map(|ns| format!("{}*{}", ns.prefix, ns.postfix))
                .collect::<Vec<_>>()
                .join(";");
            xml.push_attribute(name, value);
        }

        for parameter in &self.parameters {
            let mut element = XmlElement::new("ref.Parameter");
            element.push_attribute("Name", parameter.name.as_str());
            element.push_attribute("Class", parameter.class_name.as_str());
            xml.push_element(element);
        }

        if !self.member_script.is_empty() {
            let mut element = XmlElement::new("ref.Members");
            element.push_cdata(self.member_script.as_str());
            xml.push_element(element);
        }

        if !self.style_paths.is_empty() {
            xml.push_attribute("ref.Styles", self.style_paths.join(";"));
        }

        self.instance.fill_xml(&mut xml);
        XmlDocument::new(xml)
    }

    /// Merge every style named by `ref.Styles` into the tree. Runs once per
    /// context; later calls do nothing and return `false`.
    pub fn apply_styles(
        &mut self,
        resource: &str,
        resolver: &dyn ResourceResolver,
        errors: &mut Diagnostics,
    ) -> bool {
        if self.applied_styles {
            return false;
        }
        self.applied_styles = true;

        let mut styles: Vec<&InstanceStyle> = Vec::new();
        for uri in &self.style_paths {
            let Some((protocol, path)) = parse_resource_url(uri) else {
                errors.push(Diagnostic::new(
                    resource,
                    self.style_position,
                    format!("Invalid path in attribute \"ref.Styles\": \"{}\".", uri),
                ));
                continue;
            };
            match resolver.resolve_resource(&protocol, &path) {
                Some(Resource::Styles(style_context)) => styles.extend(style_context.styles.iter()),
                _ => errors.push(Diagnostic::new(
                    resource,
                    self.style_position,
                    format!(
                        "Failed to find the style referred in attribute \"ref.Styles\": \"{}\".",
                        uri
                    ),
                )),
            }
        }

        for style in styles {
            let matches = execute_query(&style.query, &self.instance);
            log::debug!(
                "{}: style \"{}\" matched {} constructor(s)",
                resource,
                style.query,
                matches.len()
            );
            for path in matches {
                if let Some(ctor) = resolve_mut(&mut self.instance, &path) {
                    ctor.setter.attach(style.setter.clone());
                }
            }
        }
        true
    }
}
