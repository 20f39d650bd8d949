// src/core/environment.rs

//! # Build Environment
//!
//! A hierarchical store of properties, items and task outputs. Every level may
//! delegate lookups to a parent; writes always land in the local level, so a
//! child never mutates its parent. Parents are shared read-only through `Arc`,
//! which lets one ancestor (global properties) back every project build.
//!
//! Lookup rules:
//! - properties and outputs: local first, then the parent chain; absence is
//!   the empty string (or `None` from the `try_` accessors);
//! - items are keyed by `(type, include)`. Enumeration yields the parent's
//!   items in their order with local replacements substituted in place, then
//!   the local-only items. Local removals hide inherited entries.

use crate::models::ProjectItem;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ItemKey {
    item_type: String,
    include: String,
}

impl ItemKey {
    fn new(item_type: &str, include: &str) -> Self {
        Self {
            item_type: item_type.to_string(),
            include: include.to_string(),
        }
    }

    fn of(item: &ProjectItem) -> Self {
        Self::new(&item.item_type, &item.include)
    }
}

/// Local item storage: insertion-ordered entries plus an index by key.
#[derive(Debug, Default, Clone)]
struct ItemStore {
    entries: Vec<ProjectItem>,
    index: HashMap<ItemKey, usize>,
    /// Keys removed at this level; hides entries inherited from the parent.
    removed: HashSet<ItemKey>,
}

impl ItemStore {
    fn get(&self, key: &ItemKey) -> Option<&ProjectItem> {
        self.index.get(key).and_then(|&i| self.entries.get(i))
    }

    fn insert(&mut self, item: ProjectItem) {
        let key = ItemKey::of(&item);
        self.removed.remove(&key);
        match self.index.get(&key).copied() {
            Some(i) => {
                if let Some(slot) = self.entries.get_mut(i) {
                    *slot = item;
                }
            }
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(item);
            }
        }
    }

    fn remove(&mut self, key: &ItemKey) {
        if self.index.remove(key).is_some() {
            self.entries.retain(|item| &ItemKey::of(item) != key);
            self.reindex();
        }
        self.removed.insert(key.clone());
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, item)| (ItemKey::of(item), i))
            .collect();
    }
}

#[derive(Debug, Default, Clone)]
pub struct BuildEnvironment {
    parent: Option<Arc<BuildEnvironment>>,
    properties: HashMap<String, String>,
    items: ItemStore,
    outputs: HashMap<String, String>,
}

impl BuildEnvironment {
    /// A root environment with no parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// A child level delegating lookups to `parent`.
    pub fn with_parent(parent: Arc<Self>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    pub fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    // --- Properties ---

    pub fn try_property(&self, name: &str) -> Option<&str> {
        match self.properties.get(name) {
            Some(value) => Some(value.as_str()),
            None => self.parent.as_ref().and_then(|p| p.try_property(name)),
        }
    }

    /// The property value, or the empty string when it is undefined at every level.
    pub fn property(&self, name: &str) -> String {
        self.try_property(name).unwrap_or_default().to_string()
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    // --- Items ---

    /// Looks up one item by type and include.
    pub fn item(&self, item_type: &str, include: &str) -> Option<&ProjectItem> {
        let key = ItemKey::new(item_type, include);
        if let Some(item) = self.items.get(&key) {
            return Some(item);
        }
        if self.items.removed.contains(&key) {
            return None;
        }
        self.parent
            .as_ref()
            .and_then(|p| p.item(item_type, include))
    }

    /// Enumerates the visible items of `item_type`, parent items first.
    pub fn items(&self, item_type: &str) -> Vec<ProjectItem> {
        let inherited = self
            .parent
            .as_ref()
            .map(|p| p.items(item_type))
            .unwrap_or_default();

        let mut result = Vec::with_capacity(inherited.len());
        let mut substituted = HashSet::new();
        for item in inherited {
            let key = ItemKey::of(&item);
            if self.items.removed.contains(&key) {
                continue;
            }
            match self.items.get(&key) {
                Some(local) => {
                    result.push(local.clone());
                    substituted.insert(key);
                }
                None => result.push(item),
            }
        }
        result.extend(
            self.items
                .entries
                .iter()
                .filter(|i| i.item_type == item_type && !substituted.contains(&ItemKey::of(i)))
                .cloned(),
        );
        result
    }

    /// Adds or replaces (same type and include) an item at this level.
    pub fn add_item(&mut self, item: ProjectItem) {
        self.items.insert(item);
    }

    /// Removes an item from the visible set without touching the parent.
    pub fn remove_item(&mut self, item_type: &str, include: &str) {
        self.items.remove(&ItemKey::new(item_type, include));
    }

    // --- Outputs ---

    pub fn output(&self, name: &str) -> Option<&str> {
        match self.outputs.get(name) {
            Some(value) => Some(value.as_str()),
            None => self.parent.as_ref().and_then(|p| p.output(name)),
        }
    }

    pub fn set_output(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.outputs.insert(name.into(), value.into());
    }
}
