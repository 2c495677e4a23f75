//! Files made of `[tag]` blocks of key/value pairs

use std::path::{Path, PathBuf};

use remedy_host::io;
use tracing::debug;

use super::lines::{self, Line};
use crate::data::{FlatData, Intent, KvData, Separator, TaggedData};
use crate::store::{ConfigStore, Reconciliation};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct Block {
    tag: String,
    /// Original header text, `None` for blocks created by a fix
    header: Option<String>,
    lines: Vec<Line>,
}

impl Block {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            header: None,
            lines: Vec::new(),
        }
    }
}

/// A tagged configuration file.
///
/// Comments and blank lines before the first header form a preamble; an
/// entry there is a parse error.
#[derive(Debug, Clone)]
pub struct TagConfStore {
    path: PathBuf,
    separator: Separator,
    preamble: Vec<Line>,
    blocks: Vec<Block>,
    existed: bool,
}

impl TagConfStore {
    /// Load `path`; a missing file is an empty store.
    pub fn load(path: &Path, separator: Separator) -> Result<Self> {
        let text = io::read_text_optional(path).map_err(|source| Error::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        let existed = text.is_some();
        let mut store = Self::parse(path, text.as_deref().unwrap_or(""), separator)?;
        store.existed = existed;
        debug!(path = %path.display(), tags = store.blocks.len(), existed, "Loaded tagconf store");
        Ok(store)
    }

    pub fn parse(path: &Path, text: &str, separator: Separator) -> Result<Self> {
        let mut preamble = Vec::new();
        let mut blocks: Vec<Block> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            if let Some(inner) = trimmed.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
                let tag = inner.trim();
                if tag.is_empty() {
                    return Err(Error::parse(path, idx + 1, "empty tag name"));
                }
                blocks.push(Block {
                    tag: tag.to_string(),
                    header: Some(raw.to_string()),
                    lines: Vec::new(),
                });
                continue;
            }

            let line = if lines::is_ignorable(trimmed) {
                Line::Verbatim(raw.to_string())
            } else {
                let (key, value) = separator.split(trimmed).ok_or_else(|| {
                    Error::parse(
                        path,
                        idx + 1,
                        format!("expected {}", separator.join("key", "value")),
                    )
                })?;
                Line::parsed(key, value, raw)
            };

            match blocks.last_mut() {
                Some(block) => block.lines.push(line),
                None if matches!(line, Line::Verbatim(_)) => preamble.push(line),
                None => {
                    return Err(Error::parse(path, idx + 1, "entry outside of any [tag]"));
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            separator,
            preamble,
            blocks,
            existed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn existed(&self) -> bool {
        self.existed
    }

    /// Tags in file order, repeats included.
    pub fn tags(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.tag.as_str()).collect()
    }

    /// Values of `key` across every block named `tag`.
    pub fn values(&self, tag: &str, key: &str) -> Vec<&str> {
        self.blocks_named(tag)
            .flat_map(|b| lines::values(&b.lines, key))
            .collect()
    }

    fn blocks_named<'a, 't>(&'a self, tag: &'t str) -> impl Iterator<Item = &'a Block> + use<'a, 't> {
        self.blocks.iter().filter(move |b| b.tag == tag)
    }

    /// Repeated tags plus keys repeated within one tag, across the file.
    fn duplicate_count(&self) -> usize {
        let mut tags: Vec<&str> = Vec::new();
        let mut repeated_tags: Vec<&str> = Vec::new();
        for block in &self.blocks {
            if tags.contains(&block.tag.as_str()) {
                if !repeated_tags.contains(&block.tag.as_str()) {
                    repeated_tags.push(&block.tag);
                }
            } else {
                tags.push(&block.tag);
            }
        }
        let keys: usize = tags
            .iter()
            .map(|tag| {
                let combined: Vec<Line> = self
                    .blocks_named(tag)
                    .flat_map(|b| b.lines.iter().cloned())
                    .collect();
                lines::duplicate_keys(&combined).len()
            })
            .sum();
        repeated_tags.len() + keys
    }

    /// Fold every later block named `tag` into the first one.
    fn merge_blocks(&mut self, tag: &str) -> Option<usize> {
        let first = self.blocks.iter().position(|b| b.tag == tag)?;
        let mut idx = first + 1;
        while idx < self.blocks.len() {
            if self.blocks[idx].tag == tag {
                let later = self.blocks.remove(idx);
                self.blocks[first].lines.extend(later.lines);
            } else {
                idx += 1;
            }
        }
        Some(first)
    }

    fn append_block(&mut self, tag: &str) -> usize {
        let has_blocks = !self.blocks.is_empty();
        let tail = match self.blocks.last_mut() {
            Some(block) => &mut block.lines,
            None => &mut self.preamble,
        };
        let needs_gap = match tail.last() {
            Some(Line::Verbatim(text)) => !text.trim().is_empty(),
            Some(Line::Entry { .. }) => true,
            None => has_blocks,
        };
        if needs_gap {
            tail.push(Line::Verbatim(String::new()));
        }
        self.blocks.push(Block::new(tag));
        self.blocks.len() - 1
    }
}

impl ConfigStore for TagConfStore {
    fn reconcile(&mut self, desired: &KvData, intent: Intent) -> Result<Reconciliation> {
        let desired = desired
            .as_tagged()
            .ok_or_else(|| Error::Validation("tagconf data must be tagged".into()))?;

        let mut fixes = TaggedData::new();
        let mut removes = TaggedData::new();
        let mut duplicates = Vec::new();

        for (tag, inner) in desired {
            let blocks: Vec<&Block> = self.blocks_named(tag).collect();
            match intent {
                Intent::Present if blocks.is_empty() => {
                    fixes.insert(tag.clone(), inner.clone());
                }
                Intent::Present if blocks.len() > 1 => {
                    duplicates.push(format!("[{tag}]"));
                    fixes.insert(tag.clone(), inner.clone());
                }
                Intent::NotPresent if blocks.is_empty() => {}
                Intent::NotPresent if inner.is_empty() => {
                    removes.insert(tag.clone(), FlatData::new());
                }
                _ => {
                    let combined: Vec<Line> =
                        blocks.iter().flat_map(|b| b.lines.iter().cloned()).collect();
                    let (fix, remove, dups) = lines::check_flat(&combined, inner, intent);
                    duplicates.extend(dups.into_iter().map(|k| format!("[{tag}] {k}")));
                    if !fix.is_empty() {
                        fixes.insert(tag.clone(), fix);
                    }
                    if !remove.is_empty() {
                        removes.insert(tag.clone(), remove);
                    }
                }
            }
        }

        Ok(Reconciliation::new(
            KvData::Tagged(fixes),
            KvData::Tagged(removes),
            duplicates,
        )
        .with_duplicate_count(self.duplicate_count()))
    }

    fn apply(&mut self, fixables: &KvData, removables: &KvData) -> Result<bool> {
        if let Some(fixes) = fixables.as_tagged() {
            for (tag, inner) in fixes {
                let idx = match self.merge_blocks(tag) {
                    Some(idx) => idx,
                    None => self.append_block(tag),
                };
                let block = &mut self.blocks[idx];
                lines::apply_flat(&mut block.lines, inner, &FlatData::new(), |l| {
                    lines::after_last_entry(l, 0)
                });
            }
        }

        if let Some(removes) = removables.as_tagged() {
            for (tag, inner) in removes {
                if inner.is_empty() {
                    self.blocks.retain(|b| &b.tag != tag);
                    continue;
                }
                for block in self.blocks.iter_mut().filter(|b| &b.tag == tag) {
                    for (key, value) in inner {
                        lines::remove_value(&mut block.lines, key, value);
                    }
                }
            }
        }
        Ok(true)
    }

    fn render(&self) -> Option<String> {
        let mut out = String::new();
        for line in &self.preamble {
            out.push_str(&line.render(self.separator));
            out.push('\n');
        }
        for block in &self.blocks {
            match &block.header {
                Some(header) => out.push_str(header),
                None => {
                    out.push('[');
                    out.push_str(&block.tag);
                    out.push(']');
                }
            }
            out.push('\n');
            for line in &block.lines {
                out.push_str(&line.render(self.separator));
                out.push('\n');
            }
        }
        Some(out)
    }
}
