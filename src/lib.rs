//! # Instance Markup
//!
//! Loader, serializer and style engine for XML GUI instance documents.
//!
//! ## Features
//! - Markup names classified as constructors, properties, events and references
//! - Best-effort loading: every problem becomes a [`Diagnostic`], loading goes on
//! - Lossless save of everything that came from the document itself
//! - Styles: a selector query plus a template merged into matching nodes;
//!   merged content is never saved back
//!
//! ## Example
//! ```ignore
//! use instance_markup::{parse_instance, parse_styles, Resource, ResourceStore};
//!
//! let mut errors = Vec::new();
//! let styles = parse_styles(
//!     "styles.xml",
//!     r#"<Styles><Style ref.Path="//Button" Font="Bold"/></Styles>"#,
//!     &mut errors,
//! )?;
//! let mut store = ResourceStore::new();
//! store.insert("res://Styles", Resource::Styles(styles));
//!
//! let mut context = parse_instance(
//!     "main.xml",
//!     r#"<Instance ref.Class="Demo" ref.Styles="res://Styles"><Button Text="OK"/></Instance>"#,
//!     &mut errors,
//! )?
//! .expect("instance");
//! context.apply_styles("main.xml", &store, &mut errors);
//! let xml = context.save_to_xml().to_xml_string()?;
//! ```

pub mod context;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod name;
pub mod query;
pub mod repr;
pub mod resource;
pub mod style;
pub mod xml;

// --- Core types ---
pub use context::{InstanceContext, InstanceNamespace, InstanceParameter, NamespaceInfo};
pub use error::{Diagnostic, Diagnostics, InstanceError, InstanceResult, QueryError};
pub use name::{DefaultNameClassifier, ElementName, NameClassifier, NameKind};
pub use repr::{
    AttSetterRepr, ConstructorRepr, EnvVarValue, EventValue, InstanceName, SetterValue, TextRepr,
    ValueRepr,
};
pub use style::{InstanceStyle, InstanceStyleContext};

// --- Collaborators ---
pub use manifest::Manifest;
pub use query::{execute_query, parse_query, print_query, NodePath, Query};
pub use resource::{parse_resource_url, Resource, ResourceResolver, ResourceStore};
pub use xml::{parse_xml, TextPos, XmlDocument};

/// Parse and load an `<Instance>` document with the default name classifier.
///
/// Malformed markup is an error. A well-formed document that yields no
/// instance gives `Ok(None)` and one extra diagnostic saying why.
pub fn parse_instance(
    resource: &str,
    text: &str,
    errors: &mut Diagnostics,
) -> InstanceResult<Option<InstanceContext>> {
    let doc = parse_xml(text)?;
    let context = InstanceContext::load_from_xml(resource, &doc, &DefaultNameClassifier, errors);
    if context.is_none() {
        let message = if doc.root.name == "Instance" {
            "No root constructor found in <Instance>.".to_string()
        } else {
            format!(
                "The root element of an instance should be \"Instance\", found \"{}\".",
                doc.root.name
            )
        };
        errors.push(Diagnostic::new(resource, doc.root.range.start, message));
    }
    Ok(context)
}

/// Parse and load a `<Styles>` document with the default name classifier.
pub fn parse_styles(
    resource: &str,
    text: &str,
    errors: &mut Diagnostics,
) -> InstanceResult<InstanceStyleContext> {
    let doc = parse_xml(text)?;
    Ok(InstanceStyleContext::load_from_xml(
        resource,
        &doc,
        &DefaultNameClassifier,
        errors,
    ))
}
