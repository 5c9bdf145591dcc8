//! Named-tag registry.
//!
//! Maps `(section, tag)` name pairs to stable numeric ids. Sections are
//! allocated sequentially when they are registered, starting at
//! [`VENDOR_SECTION_BASE`]. Every tag in a section shares that section's
//! 16-bit offset space, so a tag id is `(section_base << 16) | offset`.
//!
//! The registry is built once at startup and handed to the pipeline builder;
//! blocks resolve their property ids once at construction.

use crate::error::{BpsError, Result};
use crate::types::BlockType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// First section base handed out by the registry.
pub const VENDOR_SECTION_BASE: u16 = 0x8000;

/// Maximum number of tags in one section (16-bit offset space).
pub const MAX_TAGS_PER_SECTION: usize = 1 << 16;

/// Tag names registered for every block section in the standard registry.
pub const BLOCK_TAGS: [&str; 3] = ["firmware", "enable", "roi"];

/// Numeric tag id: high 16 bits = section base, low 16 bits = offset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagId(pub u32);

impl TagId {
    pub fn new(section_base: u16, offset: u16) -> Self {
        Self(((section_base as u32) << 16) | offset as u32)
    }

    #[inline]
    pub fn section(self) -> u16 {
        (self.0 >> 16) as u16
    }

    #[inline]
    pub fn offset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagId(0x{:08X})", self.0)
    }
}

#[derive(Debug, Clone)]
struct TagSection {
    name: String,
    base: u16,
    tags: Vec<String>,
}

/// Registry of named tag sections.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    sections: Vec<TagSection>,
    by_name: HashMap<String, usize>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Registry with one `org.bps.<block>` section per block type.
    pub fn with_block_sections() -> Result<Self> {
        let mut registry = Self::new();
        for block in BlockType::all() {
            registry.register_section(&Self::block_section_name(*block), &BLOCK_TAGS)?;
        }
        Ok(registry)
    }

    /// Section name used for a block's standard tags
    pub fn block_section_name(block: BlockType) -> String {
        format!("org.bps.{}", block.name().to_ascii_lowercase())
    }

    /// Register a section and its tags. Returns the allocated section base.
    pub fn register_section(&mut self, name: &str, tags: &[&str]) -> Result<u16> {
        if self.by_name.contains_key(name) {
            return Err(BpsError::Config(format!(
                "tag section '{}' registered twice",
                name
            )));
        }
        if tags.len() > MAX_TAGS_PER_SECTION {
            return Err(BpsError::Config(format!(
                "tag section '{}' has {} tags, limit is {}",
                name,
                tags.len(),
                MAX_TAGS_PER_SECTION
            )));
        }
        let base = VENDOR_SECTION_BASE as usize + self.sections.len();
        let base = u16::try_from(base).map_err(|_| {
            BpsError::Config(format!("no section base left for '{}'", name))
        })?;

        self.by_name.insert(name.to_string(), self.sections.len());
        self.sections.push(TagSection {
            name: name.to_string(),
            base,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        });
        tracing::debug!("Registered tag section {} at base 0x{:04X}", name, base);
        Ok(base)
    }

    /// Resolve a `(section, tag)` pair to its numeric id
    pub fn resolve(&self, section: &str, tag: &str) -> Option<TagId> {
        let section = &self.sections[*self.by_name.get(section)?];
        let offset = section.tags.iter().position(|t| t == tag)?;
        Some(TagId::new(section.base, offset as u16))
    }

    /// Reverse lookup, for diagnostics
    pub fn tag_name(&self, id: TagId) -> Option<(&str, &str)> {
        let index = id.section().checked_sub(VENDOR_SECTION_BASE)? as usize;
        let section = self.sections.get(index)?;
        let tag = section.tags.get(id.offset() as usize)?;
        Some((section.name.as_str(), tag.as_str()))
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}
