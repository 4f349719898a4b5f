use std::collections::HashSet;

use tracing::{debug, warn};

use crate::catalog::Tag;

pub const DEFAULT_MAX_TOKENS: usize = 75;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Tag budget exceeded: at most {limit} tags can be selected")]
    BudgetExceeded { limit: usize },
    #[error("Tag '{name}' is locked; unlock it first")]
    TagLocked { tag_id: String, name: String },
    #[error("Tag {0} is not in the selection")]
    NotFound(String),
    #[error("Reorder must list every selected tag exactly once")]
    InvalidOrder,
}

impl SelectionError {
    fn locked(tag: &Tag) -> Self {
        SelectionError::TagLocked {
            tag_id: tag.id.clone(),
            name: tag.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { id: String },
    Removed { id: String },
    Replaced { id: String, replaced_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaceOutcome {
    pub kept_locked: usize,
    pub dropped_conflicts: usize,
    pub truncated: usize,
}

impl ReplaceOutcome {
    pub fn budget_exceeded(&self) -> bool {
        self.truncated > 0
    }
}

/// Ordered tag selection with lock and budget invariants.
#[derive(Debug, Clone)]
pub struct TagSelection {
    tags: Vec<Tag>,
    max_tokens: usize,
}

impl Default for TagSelection {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS)
    }
}

impl TagSelection {
    pub fn new(max_tokens: usize) -> Self {
        TagSelection {
            tags: Vec::new(),
            max_tokens: max_tokens.max(1),
        }
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn get(&self, tag_id: &str) -> Option<&Tag> {
        self.tags.iter().find(|tag| tag.id == tag_id)
    }

    pub fn contains(&self, tag_id: &str) -> bool {
        self.get(tag_id).is_some()
    }

    pub fn locked_tags(&self) -> Vec<Tag> {
        self.tags.iter().filter(|tag| tag.is_locked).cloned().collect()
    }

    fn position(&self, tag_id: &str) -> Option<usize> {
        self.tags.iter().position(|tag| tag.id == tag_id)
    }

    fn ensure_room(&self) -> Result<(), SelectionError> {
        if self.tags.len() >= self.max_tokens {
            warn!("Tag budget of {} reached", self.max_tokens);
            return Err(SelectionError::BudgetExceeded {
                limit: self.max_tokens,
            });
        }
        Ok(())
    }

    // Stable: locked first, otherwise prior order.
    fn resort(&mut self) {
        self.tags.sort_by_key(|tag| !tag.is_locked);
    }

    /// Picks a tag: multi-selection tags always append a fresh instance,
    /// others toggle, replacing an unlocked occupant of the same slot.
    pub fn add(&mut self, tag: &Tag) -> Result<AddOutcome, SelectionError> {
        if tag.allow_multiple_selections {
            self.ensure_room()?;
            let instance = tag.instantiate();
            let id = instance.id.clone();
            self.tags.push(instance);
            self.resort();
            return Ok(AddOutcome::Added { id });
        }

        if let Some(index) = self.position(&tag.id) {
            if self.tags[index].is_locked {
                return Err(SelectionError::locked(&self.tags[index]));
            }
            let removed = self.tags.remove(index);
            self.resort();
            return Ok(AddOutcome::Removed { id: removed.id });
        }

        let mut fresh = tag.clone();
        fresh.is_locked = false;

        if fresh.is_exclusive() {
            let occupant = self
                .tags
                .iter()
                .position(|existing| existing.is_exclusive() && existing.slot_key() == fresh.slot_key());
            if let Some(index) = occupant {
                if self.tags[index].is_locked {
                    return Err(SelectionError::locked(&self.tags[index]));
                }
                let replaced = self.tags.remove(index);
                debug!("Replacing {} with {} in the same slot", replaced.name, fresh.name);
                let id = fresh.id.clone();
                self.tags.push(fresh);
                self.resort();
                return Ok(AddOutcome::Replaced {
                    id,
                    replaced_id: replaced.id,
                });
            }
        }

        self.ensure_room()?;
        let id = fresh.id.clone();
        self.tags.push(fresh);
        self.resort();
        Ok(AddOutcome::Added { id })
    }

    pub fn remove(&mut self, tag_id: &str) -> Result<Tag, SelectionError> {
        let index = self
            .position(tag_id)
            .ok_or_else(|| SelectionError::NotFound(tag_id.to_string()))?;
        if self.tags[index].is_locked {
            return Err(SelectionError::locked(&self.tags[index]));
        }
        let removed = self.tags.remove(index);
        self.resort();
        Ok(removed)
    }

    /// Flips the lock flag and returns the new state.
    pub fn toggle_lock(&mut self, tag_id: &str) -> Result<bool, SelectionError> {
        let index = self
            .position(tag_id)
            .ok_or_else(|| SelectionError::NotFound(tag_id.to_string()))?;
        let tag = &mut self.tags[index];
        tag.is_locked = !tag.is_locked;
        let locked = tag.is_locked;
        self.resort();
        Ok(locked)
    }

    pub fn unlock_all(&mut self) {
        for tag in &mut self.tags {
            tag.is_locked = false;
        }
    }

    /// Applies a drag-and-drop order. `order` must be a permutation of the current ids.
    pub fn reorder(&mut self, order: &[String]) -> Result<(), SelectionError> {
        if order.len() != self.tags.len() {
            return Err(SelectionError::InvalidOrder);
        }
        let unique: HashSet<&str> = order.iter().map(String::as_str).collect();
        if unique.len() != order.len() {
            return Err(SelectionError::InvalidOrder);
        }

        let mut reordered = Vec::with_capacity(order.len());
        for id in order {
            let tag = self.get(id).ok_or(SelectionError::InvalidOrder)?;
            reordered.push(tag.clone());
        }
        self.tags = reordered;
        self.resort();
        Ok(())
    }

    /// Bulk replacement. With `keep_locked`, current locked tags are carried
    /// forward ahead of `new_tags`. Conflicting and over-budget tags are dropped.
    pub fn replace_all(&mut self, new_tags: Vec<Tag>, keep_locked: bool) -> ReplaceOutcome {
        let carried = if keep_locked {
            self.locked_tags()
        } else {
            Vec::new()
        };
        let mut outcome = ReplaceOutcome {
            kept_locked: carried.len(),
            ..ReplaceOutcome::default()
        };

        let mut result: Vec<Tag> = Vec::with_capacity(carried.len() + new_tags.len());
        for tag in carried.into_iter().chain(new_tags) {
            let duplicate_id = result.iter().any(|existing| existing.id == tag.id);
            let slot_taken = tag.is_exclusive()
                && result
                    .iter()
                    .any(|existing| existing.is_exclusive() && existing.slot_key() == tag.slot_key());
            if duplicate_id || slot_taken {
                outcome.dropped_conflicts += 1;
                continue;
            }
            result.push(tag);
        }

        result.sort_by_key(|tag| !tag.is_locked);
        if result.len() > self.max_tokens {
            outcome.truncated = result.len() - self.max_tokens;
            warn!(
                "Bulk replace truncated {} tag(s) to stay within the budget of {}",
                outcome.truncated, self.max_tokens
            );
            result.truncate(self.max_tokens);
        }
        self.tags = result;
        outcome
    }

    pub fn clear(&mut self, keep_locked: bool) -> ReplaceOutcome {
        self.replace_all(Vec::new(), keep_locked)
    }
}
