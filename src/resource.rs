//! Resource URLs and the lookup seam used by style application.

use std::collections::HashMap;

use crate::context::InstanceContext;
use crate::style::InstanceStyleContext;

/// Split `protocol://path`. The protocol is lower-cased; both parts must be
/// non-empty.
pub fn parse_resource_url(uri: &str) -> Option<(String, String)> {
    let (protocol, path) = uri.split_once("://")?;
    if protocol.is_empty() || path.is_empty() {
        return None;
    }
    Some((protocol.to_ascii_lowercase(), path.to_string()))
}

#[derive(Debug, Clone)]
pub enum Resource {
    Instance(InstanceContext),
    Styles(InstanceStyleContext),
}

impl Resource {
    pub fn as_styles(&self) -> Option<&InstanceStyleContext> {
        match self {
            Resource::Styles(styles) => Some(styles),
            Resource::Instance(_) => None,
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceContext> {
        match self {
            Resource::Instance(instance) => Some(instance),
            Resource::Styles(_) => None,
        }
    }
}

/// Looks up resources by protocol and path. Lookups take `&self`, so one
/// resolver can serve several contexts.
pub trait ResourceResolver {
    fn resolve_resource(&self, protocol: &str, path: &str) -> Option<&Resource>;
}

/// In-memory resolver.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
    resources: HashMap<(String, String), Resource>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resource` under `uri`. Returns `false` (and stores nothing)
    /// when `uri` is not a resource URL.
    pub fn insert(&mut self, uri: &str, resource: Resource) -> bool {
        match parse_resource_url(uri) {
            Some(key) => {
                log::debug!("registered resource {}", uri);
                self.resources.insert(key, resource);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, uri: &str) -> Option<&Resource> {
        let (protocol, path) = parse_resource_url(uri)?;
        self.resolve_resource(&protocol, &path)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceResolver for ResourceStore {
    fn resolve_resource(&self, protocol: &str, path: &str) -> Option<&Resource> {
        self.resources
            .get(&(protocol.to_ascii_lowercase(), path.to_string()))
    }
}
