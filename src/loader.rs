//! Markup ingestion: turns markup elements into representation nodes.
//!
//! Loading is best effort. Every problem becomes a [`Diagnostic`] and the
//! offending construct is dropped while its siblings keep loading.

use crate::error::{Diagnostic, Diagnostics};
use crate::name::{ElementName, NameClassifier, NameKind};
use crate::repr::{
    AttSetterRepr, ConstructorRepr, EnvVarMap, EnvVarValue, EventHandlerMap, EventValue,
    InstanceName, SetterMap, SetterValue, TextRepr, ValueRepr, SET_BINDING,
};
use crate::xml::{TextPos, XmlElement, XmlNode, CDATA_OPENER_LEN};

/// A child element together with its classified name (`None` when the name
/// did not parse; that has already been reported).
type ClassifiedChild<'x> = (&'x XmlElement, Option<ElementName>);

pub struct InstanceLoader<'a> {
    resource: &'a str,
    classifier: &'a dyn NameClassifier,
    errors: &'a mut Diagnostics,
}

impl<'a> InstanceLoader<'a> {
    pub fn new(
        resource: &'a str,
        classifier: &'a dyn NameClassifier,
        errors: &'a mut Diagnostics,
    ) -> Self {
        Self {
            resource,
            classifier,
            errors,
        }
    }

    pub fn resource(&self) -> &str {
        self.resource
    }

    pub(crate) fn error(&mut self, position: TextPos, message: impl Into<String>) {
        self.errors.push(Diagnostic::new(self.resource, position, message));
    }

    fn classify(&mut self, raw: &str, position: TextPos) -> Option<ElementName> {
        match self.classifier.classify(raw) {
            Ok(name) => Some(name),
            Err(message) => {
                self.error(position, message);
                None
            }
        }
    }

    fn classify_children<'x>(&mut self, xml: &'x XmlElement) -> Vec<ClassifiedChild<'x>> {
        xml.elements()
            .map(|element| {
                let name = self.classify(&element.name, element.name_range.start);
                (element, name)
            })
            .collect()
    }

    // ─── Constructors ────────────────────────────────────────────────────────

    /// Load an element as a constructor. Returns `None` (with a diagnostic)
    /// when the element name is not a constructor name.
    pub fn load_ctor(&mut self, xml: &XmlElement) -> Option<ConstructorRepr> {
        let name = self.classify(&xml.name, xml.name_range.start)?;
        if !name.is_ctor_name() {
            self.error(
                xml.name_range.start,
                format!("Wrong constructor name \"{}\".", xml.name),
            );
            return None;
        }

        let mut ctor = ConstructorRepr::new(name.namespace, name.name);
        // Malformed attribute names are reported by fill_att_setter.
        for att in &xml.attributes {
            if let Ok(att_name) = self.classifier.classify(&att.name) {
                if att_name.is_reference_attribute_name() && att_name.name == "Style" {
                    ctor.style_name = Some(att.value.clone());
                }
            }
        }

        self.fill_att_setter(&mut ctor.setter, xml);
        log::trace!("loaded constructor <{}>", xml.name);
        Some(ctor)
    }

    // ─── Attribute setters ───────────────────────────────────────────────────

    /// Fill `setter` from the attributes and children of `xml`.
    pub fn fill_att_setter(&mut self, setter: &mut AttSetterRepr, xml: &XmlElement) {
        setter.tag_position = xml.range.start;

        for att in &xml.attributes {
            let Some(name) = self.classify(&att.name, att.name_range.start) else {
                continue;
            };

            match name.attribute_kind() {
                NameKind::ReferenceAttribute => {
                    if name.name == "Name" {
                        setter.instance_name = Some(InstanceName {
                            name: att.value.clone(),
                            from_style: false,
                        });
                    }
                }
                NameKind::EnvironmentAttribute => {
                    if setter.environment_variables.contains_key(&name.name) {
                        self.error(
                            att.name_range.start,
                            format!("Duplicated environment variable \"{}\".", name.name),
                        );
                    } else {
                        setter.environment_variables.insert(
                            name.name,
                            EnvVarValue {
                                value: att.value.clone(),
                                from_style: false,
                                att_position: att.range.start,
                                value_position: att.value_range.start,
                            },
                        );
                    }
                }
                NameKind::PropertyAttribute => {
                    if setter.setters.contains_key(&name.name) {
                        self.error(
                            att.name_range.start,
                            format!("Duplicated property \"{}\".", name.name),
                        );
                    } else {
                        setter.setters.insert(
                            name.name,
                            SetterValue {
                                binding: name.binding,
                                values: vec![ValueRepr::Text(TextRepr {
                                    text: att.value.clone(),
                                    from_style: false,
                                    tag_position: att.value_range.start,
                                })],
                                att_position: att.range.start,
                            },
                        );
                    }
                }
                NameKind::EventAttribute => {
                    if setter.event_handlers.contains_key(&name.name) {
                        self.error(
                            att.name_range.start,
                            format!("Duplicated event \"{}\".", name.name),
                        );
                    } else {
                        setter.event_handlers.insert(
                            name.name,
                            EventValue {
                                binding: name.binding,
                                value: att.value.clone(),
                                from_style: false,
                                att_position: att.range.start,
                                value_position: att.value_range.start,
                            },
                        );
                    }
                }
                _ => {
                    self.error(
                        att.name_range.start,
                        format!("Unknown attribute name: \"{}\".", att.name),
                    );
                }
            }
        }

        let children = self.classify_children(xml);
        self.collect_attributes(&mut setter.setters, xml, &children);
        self.collect_events(&mut setter.event_handlers, &children);
        self.collect_environment_variables(&mut setter.environment_variables, &children);
    }

    /// Default content: one text/CDATA child becomes a text value, otherwise
    /// every constructor child becomes a value in document order.
    fn collect_default_attributes(
        &mut self,
        values: &mut Vec<ValueRepr>,
        xml: &XmlElement,
        children: &[ClassifiedChild<'_>],
    ) {
        match xml.children.as_slice() {
            [XmlNode::Text(text)] => values.push(ValueRepr::Text(TextRepr {
                text: text.content.clone(),
                from_style: false,
                tag_position: text.range.start,
            })),
            [XmlNode::CData(cdata)] => values.push(ValueRepr::Text(TextRepr {
                text: cdata.content.clone(),
                from_style: false,
                tag_position: cdata.range.start.shifted(CDATA_OPENER_LEN),
            })),
            _ => {}
        }

        for (element, name) in children {
            let Some(name) = name else { continue };
            if name.is_ctor_name() {
                if let Some(ctor) = self.load_ctor(element) {
                    values.push(ValueRepr::Constructor(ctor));
                }
            } else if name.element_kind() == NameKind::Unrecognized {
                self.error(
                    element.name_range.start,
                    format!("Unknown element name: \"{}\".", element.name),
                );
            }
        }
    }

    fn collect_attributes(
        &mut self,
        setters: &mut SetterMap,
        xml: &XmlElement,
        children: &[ClassifiedChild<'_>],
    ) {
        let mut default_value = SetterValue {
            att_position: xml.range.start,
            ..SetterValue::default()
        };
        self.collect_default_attributes(&mut default_value.values, xml, children);
        if !default_value.values.is_empty() {
            setters.insert(String::new(), default_value);
        }

        for (element, name) in children {
            let Some(name) = name.as_ref().filter(|n| n.is_property_element_name()) else {
                continue;
            };
            if setters.contains_key(&name.name) {
                self.error(
                    element.name_range.start,
                    format!("Duplicated property \"{}\".", name.name),
                );
                continue;
            }

            let mut value = SetterValue {
                binding: name.binding.clone(),
                values: Vec::new(),
                att_position: element.range.start,
            };
            if name.binding.as_deref() == Some(SET_BINDING) {
                // The element is a complete nested setter.
                let mut nested = AttSetterRepr::default();
                self.fill_att_setter(&mut nested, element);
                value.values.push(ValueRepr::AttSetter(nested));
            } else {
                let grandchildren = self.classify_children(element);
                self.collect_default_attributes(&mut value.values, element, &grandchildren);
            }

            if !value.values.is_empty() {
                setters.insert(name.name.clone(), value);
            }
        }
    }

    fn collect_events(&mut self, events: &mut EventHandlerMap, children: &[ClassifiedChild<'_>]) {
        for (element, name) in children {
            let Some(name) = name.as_ref().filter(|n| n.is_event_element_name()) else {
                continue;
            };
            if events.contains_key(&name.name) {
                self.error(
                    element.name_range.start,
                    format!("Duplicated event \"{}\".", name.name),
                );
                continue;
            }

            match element.children.as_slice() {
                [XmlNode::Text(text)] => {
                    events.insert(
                        name.name.clone(),
                        EventValue {
                            binding: name.binding.clone(),
                            value: text.content.clone(),
                            from_style: false,
                            att_position: element.range.start,
                            value_position: text.range.start,
                        },
                    );
                    if text.range.is_multiline() {
                        self.error(
                            element.range.start,
                            "Multiple lines script should be contained in a CDATA section.",
                        );
                    }
                }
                [XmlNode::CData(cdata)] => {
                    events.insert(
                        name.name.clone(),
                        EventValue {
                            binding: name.binding.clone(),
                            value: cdata.content.clone(),
                            from_style: false,
                            att_position: element.range.start,
                            value_position: cdata.range.start.shifted(CDATA_OPENER_LEN),
                        },
                    );
                }
                _ => {
                    self.error(
                        element.range.start,
                        "Event script should be contained in a text or CDATA section.",
                    );
                }
            }
        }
    }

    /// `env.X` elements holding one text or CDATA child.
    fn collect_environment_variables(
        &mut self,
        env_vars: &mut EnvVarMap,
        children: &[ClassifiedChild<'_>],
    ) {
        for (element, name) in children {
            let Some(name) = name.as_ref().filter(|n| n.is_environment_element_name()) else {
                continue;
            };
            if env_vars.contains_key(&name.name) {
                self.error(
                    element.name_range.start,
                    format!("Duplicated environment variable \"{}\".", name.name),
                );
                continue;
            }

            let (value, value_position) = match element.children.as_slice() {
                [XmlNode::Text(text)] => (text.content.clone(), text.range.start),
                [XmlNode::CData(cdata)] => (
                    cdata.content.clone(),
                    cdata.range.start.shifted(CDATA_OPENER_LEN),
                ),
                [] => (String::new(), element.range.end),
                _ => {
                    self.error(
                        element.range.start,
                        "Environment variable should be contained in a text or CDATA section.",
                    );
                    continue;
                }
            };
            env_vars.insert(
                name.name.clone(),
                EnvVarValue {
                    value,
                    from_style: false,
                    att_position: element.range.start,
                    value_position,
                },
            );
        }
    }
}
