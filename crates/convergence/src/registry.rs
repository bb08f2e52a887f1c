//! Resource registry - ordered storage of declarations
//!
//! Declaration order is the default execution order, so the registry is a
//! vector first and an index second.

use crate::error::{Error, Result};
use crate::resource::{ResourceDeclaration, ResourceId};
use crate::spec::ResourceType;
use std::collections::HashMap;

/// Declared resources for one run, unique by (type, name)
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: Vec<ResourceDeclaration>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration, preserving declaration order
    pub fn register(&mut self, decl: ResourceDeclaration) -> Result<()> {
        let id = decl.id();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateResource { resource: id });
        }
        self.index.insert(id, self.resources.len());
        self.resources.push(decl);
        Ok(())
    }

    /// Find a declaration by identity
    pub fn lookup(&self, id: &ResourceId) -> Result<&ResourceDeclaration> {
        self.position(id)
            .and_then(|idx| self.resources.get(idx))
            .ok_or_else(|| Error::ResourceNotFound {
                resource: id.clone(),
            })
    }

    /// Find a declaration by its type and name parts
    pub fn lookup_parts(&self, rtype: ResourceType, name: &str) -> Result<&ResourceDeclaration> {
        self.lookup(&ResourceId::new(rtype, name))
    }

    /// Position of a resource in declaration order
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, idx: usize) -> Option<&ResourceDeclaration> {
        self.resources.get(idx)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Declarations in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &ResourceDeclaration> {
        self.resources.iter()
    }
}
