//! Representation tree produced by ingestion.
//!
//! Every value is owned by its parent, so `Clone` is always a deep copy and
//! a clone never shares state with its source. `from_style` marks content
//! that a style merged in; such content is skipped by [`ValueRepr::fill_xml`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::xml::{TextPos, XmlElement};

/// Binding used by property elements whose value is a nested setter.
pub const SET_BINDING: &str = "set";

pub type SetterMap = BTreeMap<String, SetterValue>;
pub type EventHandlerMap = BTreeMap<String, EventValue>;
pub type EnvVarMap = BTreeMap<String, EnvVarValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ValueRepr {
    Text(TextRepr),
    AttSetter(AttSetterRepr),
    Constructor(ConstructorRepr),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRepr {
    pub text: String,
    pub from_style: bool,
    pub tag_position: TextPos,
}

/// Values assigned to one property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetterValue {
    /// `None` for a plain value.
    pub binding: Option<String>,
    pub values: Vec<ValueRepr>,
    pub att_position: TextPos,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventValue {
    pub binding: Option<String>,
    pub value: String,
    pub from_style: bool,
    pub att_position: TextPos,
    pub value_position: TextPos,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvVarValue {
    pub value: String,
    pub from_style: bool,
    pub att_position: TextPos,
    pub value_position: TextPos,
}

/// The `ref.Name` of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceName {
    pub name: String,
    pub from_style: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttSetterRepr {
    pub setters: SetterMap,
    pub event_handlers: EventHandlerMap,
    pub environment_variables: EnvVarMap,
    pub instance_name: Option<InstanceName>,
    pub from_style: bool,
    pub tag_position: TextPos,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstructorRepr {
    pub type_namespace: Option<String>,
    pub type_name: String,
    /// `ref.Style` on the constructor element.
    pub style_name: Option<String>,
    #[serde(flatten)]
    pub setter: AttSetterRepr,
}

// ─── Provenance ──────────────────────────────────────────────────────────────

impl ValueRepr {
    pub fn from_style(&self) -> bool {
        match self {
            ValueRepr::Text(t) => t.from_style,
            ValueRepr::AttSetter(s) => s.from_style,
            ValueRepr::Constructor(c) => c.setter.from_style,
        }
    }

    pub fn mark_from_style(&mut self) {
        match self {
            ValueRepr::Text(t) => t.from_style = true,
            ValueRepr::AttSetter(s) => s.mark_from_style(),
            ValueRepr::Constructor(c) => c.setter.mark_from_style(),
        }
    }

    pub fn as_text(&self) -> Option<&TextRepr> {
        match self {
            ValueRepr::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_constructor(&self) -> Option<&ConstructorRepr> {
        match self {
            ValueRepr::Constructor(c) => Some(c),
            _ => None,
        }
    }

    /// The setter maps of a container value; `None` for text.
    pub fn as_att_setter(&self) -> Option<&AttSetterRepr> {
        match self {
            ValueRepr::Text(_) => None,
            ValueRepr::AttSetter(s) => Some(s),
            ValueRepr::Constructor(c) => Some(&c.setter),
        }
    }
}

impl AttSetterRepr {
    /// Flag this node and everything below it as style content.
    pub fn mark_from_style(&mut self) {
        self.from_style = true;
        for setter in self.setters.values_mut() {
            for value in &mut setter.values {
                value.mark_from_style();
            }
        }
        for event in self.event_handlers.values_mut() {
            event.from_style = true;
        }
        for env in self.environment_variables.values_mut() {
            env.from_style = true;
        }
        if let Some(name) = &mut self.instance_name {
            name.from_style = true;
        }
    }

    /// Attach entries of `template` that `self` does not have yet. Existing
    /// names win; nothing is merged inside an existing entry.
    pub fn attach(&mut self, template: AttSetterRepr) {
        for (name, value) in template.setters {
            if self.setters.contains_key(&name) {
                log::trace!("attach: property \"{}\" already set, skipped", name);
            } else {
                self.setters.insert(name, value);
            }
        }
        for (name, value) in template.event_handlers {
            self.event_handlers.entry(name).or_insert(value);
        }
        for (name, value) in template.environment_variables {
            self.environment_variables.entry(name).or_insert(value);
        }
        if self.instance_name.is_none() {
            self.instance_name = template.instance_name;
        }
    }
}

impl ConstructorRepr {
    pub fn new(type_namespace: Option<String>, type_name: impl Into<String>) -> Self {
        Self {
            type_namespace,
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// `ns:Type` or `Type`.
    pub fn qualified_name(&self) -> String {
        match &self.type_namespace {
            Some(ns) => format!("{}:{}", ns, self.type_name),
            None => self.type_name.clone(),
        }
    }

    pub fn instance_name(&self) -> Option<&str> {
        self.setter.instance_name.as_ref().map(|n| n.name.as_str())
    }
}

// ─── Markup emission ─────────────────────────────────────────────────────────

fn with_binding(name: String, binding: &Option<String>) -> String {
    match binding {
        Some(binding) => format!("{}-{}", name, binding),
        None => name,
    }
}

impl ValueRepr {
    /// Append the markup form of this value to `xml`. Style content emits
    /// nothing.
    pub fn fill_xml(&self, xml: &mut XmlElement) {
        match self {
            ValueRepr::Text(t) => t.fill_xml(xml),
            ValueRepr::AttSetter(s) => s.fill_xml(xml),
            ValueRepr::Constructor(c) => c.fill_xml(xml),
        }
    }
}

impl TextRepr {
    pub fn fill_xml(&self, xml: &mut XmlElement) {
        if !self.from_style {
            xml.push_content(&self.text);
        }
    }
}

impl AttSetterRepr {
    pub fn fill_xml(&self, xml: &mut XmlElement) {
        if self.from_style {
            return;
        }

        if let Some(name) = self.instance_name.as_ref().filter(|n| !n.from_style) {
            xml.push_attribute("ref.Name", name.name.as_str());
        }

        for (key, setter) in &self.setters {
            let values: Vec<&ValueRepr> =
                setter.values.iter().filter(|v| !v.from_style()).collect();
            if values.is_empty() {
                continue;
            }

            if key.is_empty() {
                for value in values {
                    value.fill_xml(xml);
                }
                continue;
            }

            let contains_element = values.iter().any(|v| v.as_text().is_none());
            match values.as_slice() {
                [ValueRepr::Text(text)] => {
                    xml.push_attribute(
                        with_binding(key.clone(), &setter.binding),
                        text.text.as_str(),
                    );
                }
                _ => {
                    let mut prop =
                        XmlElement::new(with_binding(format!("att.{}", key), &setter.binding));
                    for value in &values {
                        if !contains_element || value.as_text().is_none() {
                            value.fill_xml(&mut prop);
                        }
                    }
                    xml.push_element(prop);
                }
            }
        }

        for (key, event) in self.event_handlers.iter().filter(|(_, e)| !e.from_style) {
            let mut element = XmlElement::new(with_binding(format!("ev.{}", key), &event.binding));
            element.push_cdata(event.value.as_str());
            xml.push_element(element);
        }

        for (key, env) in self.environment_variables.iter().filter(|(_, e)| !e.from_style) {
            let mut element = XmlElement::new(format!("env.{}", key));
            element.push_content(&env.value);
            xml.push_element(element);
        }
    }
}

impl ConstructorRepr {
    pub fn fill_xml(&self, xml: &mut XmlElement) {
        if self.setter.from_style {
            return;
        }
        let mut element = XmlElement::new(self.qualified_name());
        if let Some(style) = &self.style_name {
            element.push_attribute("ref.Style", style.as_str());
        }
        self.setter.fill_xml(&mut element);
        xml.push_element(element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlNode;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> ValueRepr {
        ValueRepr::Text(TextRepr {
            text: s.to_string(),
            ..TextRepr::default()
        })
    }

    fn setter(values: Vec<ValueRepr>) -> SetterValue {
        SetterValue {
            values,
            ..SetterValue::default()
        }
    }

    fn button() -> ConstructorRepr {
        let mut ctor = ConstructorRepr::new(None, "Button");
        ctor.setter.setters.insert("Text".to_string(), setter(vec![text("OK")]));
        ctor.setter.event_handlers.insert(
            "Clicked".to_string(),
            EventValue {
                value: "close();".to_string(),
                ..EventValue::default()
            },
        );
        ctor
    }

    #[test]
    fn test_clone_is_independent() {
        let source = button();
        let mut copy = source.clone();
        copy.setter.setters.insert("Enabled".to_string(), setter(vec![text("false")]));
        copy.setter.event_handlers.clear();
        copy.setter
            .environment_variables
            .insert("Theme".to_string(), EnvVarValue::default());
        if let Some(ValueRepr::Text(t)) = copy
            .setter
            .setters
            .get_mut("Text")
            .and_then(|s| s.values.first_mut())
        {
            t.text = "Cancel".to_string();
        }

        assert_eq!(source, button());
        assert_ne!(source, copy);
    }

    #[test]
    fn test_fill_xml_attribute_and_event() {
        let mut root = XmlElement::new("Instance");
        button().fill_xml(&mut root);

        let element = root.elements().next().unwrap();
        assert_eq!(element.name, "Button");
        assert_eq!(element.attribute("Text").unwrap().value, "OK");
        let event = element.elements().next().unwrap();
        assert_eq!(event.name, "ev.Clicked");
        assert!(matches!(&event.children[..], [XmlNode::CData(c)] if c.content == "close();"));
    }

    #[test]
    fn test_fill_xml_binding_and_property_element() {
        let mut ctor = ConstructorRepr::new(Some("x".to_string()), "Window");
        ctor.style_name = Some("Dark".to_string());
        ctor.setter.setters.insert(
            "Title".to_string(),
            SetterValue {
                binding: Some("bind".to_string()),
                values: vec![text("self.Title")],
                ..SetterValue::default()
            },
        );
        ctor.setter.setters.insert(
            "Content".to_string(),
            setter(vec![ValueRepr::Constructor(button())]),
        );
        ctor.setter.environment_variables.insert(
            "Theme".to_string(),
            EnvVarValue {
                value: "dark".to_string(),
                ..EnvVarValue::default()
            },
        );

        let mut root = XmlElement::new("Instance");
        ctor.fill_xml(&mut root);
        let window = root.elements().next().unwrap();
        assert_eq!(window.name, "x:Window");
        assert_eq!(window.attribute("ref.Style").unwrap().value, "Dark");
        assert_eq!(window.attribute("Title-bind").unwrap().value, "self.Title");

        let names: Vec<&str> = window.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["att.Content", "env.Theme"]);
        let content = window.elements().next().unwrap();
        assert_eq!(content.elements().next().unwrap().name, "Button");
    }

    #[test]
    fn test_default_content_emits_inline() {
        let mut ctor = ConstructorRepr::new(None, "Label");
        ctor.setter.setters.insert(String::new(), setter(vec![text("Hello")]));
        let mut root = XmlElement::new("Instance");
        ctor.fill_xml(&mut root);
        let label = root.elements().next().unwrap();
        assert!(matches!(&label.children[..], [XmlNode::Text(t)] if t.content == "Hello"));
    }

    #[test]
    fn test_style_content_is_not_emitted() {
        let mut ctor = button();
        let mut injected = setter(vec![text("Hello")]);
        injected.values[0].mark_from_style();
        ctor.setter.setters.insert(String::new(), injected);

        let mut styled = AttSetterRepr::default();
        styled.event_handlers.insert("GotFocus".to_string(), EventValue::default());
        styled.instance_name = Some(InstanceName {
            name: "styled".to_string(),
            from_style: false,
        });
        styled.mark_from_style();
        ctor.setter.attach(styled);

        let mut root = XmlElement::new("Instance");
        ctor.fill_xml(&mut root);
        let element = root.elements().next().unwrap();
        assert!(element.attribute("ref.Name").is_none());
        assert!(element.children.iter().all(|n| !matches!(n, XmlNode::Text(_))));
        let events: Vec<&str> = element.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(events, vec!["ev.Clicked"]);
    }

    #[test]
    fn test_mark_from_style_is_recursive() {
        let mut value = ValueRepr::Constructor(ConstructorRepr {
            setter: AttSetterRepr {
                setters: [(
                    "Content".to_string(),
                    setter(vec![ValueRepr::Constructor(button())]),
                )]
                .into_iter()
                .collect(),
                ..AttSetterRepr::default()
            },
            ..ConstructorRepr::new(None, "Panel")
        });
        value.mark_from_style();

        let inner = value.as_att_setter().unwrap().setters["Content"].values[0]
            .as_constructor()
            .unwrap();
        assert!(inner.setter.from_style);
        assert!(inner.setter.setters["Text"].values[0].from_style());
        assert!(inner.setter.event_handlers["Clicked"].from_style);
    }

    #[test]
    fn test_attach_keeps_existing_entries() {
        let mut target = button();
        let mut template = AttSetterRepr::default();
        template.setters.insert("Text".to_string(), setter(vec![text("Styled")]));
        template.setters.insert("Font".to_string(), setter(vec![text("Bold")]));
        target.setter.attach(template);

        assert_eq!(target.setter.setters["Text"].values[0].as_text().unwrap().text, "OK");
        assert_eq!(target.setter.setters["Font"].values[0].as_text().unwrap().text, "Bold");
    }
}
