use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// A markup name split into its parts: `[namespace:][category.]name[-binding]`.
///
/// The same name can mean different things on an element and on an
/// attribute (`Text` is a constructor as an element and a property as an
/// attribute), so the predicates below are asked by the caller that knows
/// the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementName {
    pub namespace: Option<String>,
    pub category: Option<String>,
    pub name: String,
    pub binding: Option<String>,
}

/// What a name means where it was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Constructor,
    PropertyElement,
    EventElement,
    EnvironmentElement,
    ReferenceAttribute,
    EnvironmentAttribute,
    PropertyAttribute,
    EventAttribute,
    Unrecognized,
}

impl ElementName {
    fn category_is(&self, category: &str) -> bool {
        self.category.as_deref() == Some(category)
    }

    pub fn is_ctor_name(&self) -> bool {
        self.category.is_none() && self.binding.is_none()
    }

    pub fn is_reference_attribute_name(&self) -> bool {
        self.namespace.is_none() && self.category_is("ref") && self.binding.is_none()
    }

    pub fn is_environment_attribute_name(&self) -> bool {
        self.namespace.is_none() && self.category_is("env") && self.binding.is_none()
    }

    pub fn is_property_attribute_name(&self) -> bool {
        self.namespace.is_none() && self.category.is_none()
    }

    pub fn is_property_element_name(&self) -> bool {
        self.namespace.is_none() && self.category_is("att")
    }

    pub fn is_event_attribute_name(&self) -> bool {
        self.namespace.is_none() && self.category_is("ev")
    }

    pub fn is_event_element_name(&self) -> bool {
        self.namespace.is_none() && self.category_is("ev")
    }

    /// `env.X` as an element, the form environment entries are saved in.
    pub fn is_environment_element_name(&self) -> bool {
        self.is_environment_attribute_name()
    }

    /// Classification of this name used as an element tag.
    pub fn element_kind(&self) -> NameKind {
        if self.is_ctor_name() {
            NameKind::Constructor
        } else if self.is_property_element_name() {
            NameKind::PropertyElement
        } else if self.is_event_element_name() {
            NameKind::EventElement
        } else if self.is_environment_element_name() {
            NameKind::EnvironmentElement
        } else {
            NameKind::Unrecognized
        }
    }

    /// Classification of this name used as an attribute.
    pub fn attribute_kind(&self) -> NameKind {
        if self.is_reference_attribute_name() {
            NameKind::ReferenceAttribute
        } else if self.is_environment_attribute_name() {
            NameKind::EnvironmentAttribute
        } else if self.is_property_attribute_name() {
            NameKind::PropertyAttribute
        } else if self.is_event_attribute_name() {
            NameKind::EventAttribute
        } else {
            NameKind::Unrecognized
        }
    }
}

impl fmt::Display for ElementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{}:", ns)?;
        }
        if let Some(category) = &self.category {
            write!(f, "{}.", category)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(binding) = &self.binding {
            write!(f, "-{}", binding)?;
        }
        Ok(())
    }
}

/// Splits raw markup names. Errors are messages; the caller attaches the
/// position of the name.
pub trait NameClassifier {
    fn classify(&self, raw: &str) -> Result<ElementName, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNameClassifier;

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:([A-Za-z_][A-Za-z0-9_]*):)?(?:([A-Za-z_][A-Za-z0-9_]*)\.)?([A-Za-z_][A-Za-z0-9_]*)(?:-([A-Za-z_][A-Za-z0-9_]*))?$",
        )
        .unwrap()
    })
}

impl NameClassifier for DefaultNameClassifier {
    fn classify(&self, raw: &str) -> Result<ElementName, String> {
        let caps = name_regex().captures(raw).ok_or_else(|| {
            format!(
                "Invalid name \"{}\": expected [namespace:][category.]name[-binding].",
                raw
            )
        })?;
        let part = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
        Ok(ElementName {
            namespace: part(1),
            category: part(2),
            name: part(3).unwrap_or_default(),
            binding: part(4),
        })
    }
}
