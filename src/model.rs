//! Domain types for checklists and their items, plus id minting.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named collection of checklist items.
///
/// The `id` is a slug derived from the title when the checklist is created
/// and never changes afterwards; only the `title` is editable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    /// Slug identifier, unique within the collection.
    pub id: String,
    /// Display title.
    pub title: String,
}

/// A titled, checkable task belonging to exactly one checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    /// Unique item identifier (client UUID or server-assigned).
    pub id: String,
    /// Owning checklist. Never reassigned after creation.
    pub checklist_id: String,
    /// Display title.
    pub title: String,
    /// Completion flag. `false` on creation and after a reset.
    pub checked: bool,
}

impl Checklist {
    /// Build a checklist whose id is minted from `title`, disambiguated
    /// against the ids for which `taken` returns `true`.
    pub fn with_slug(title: impl Into<String>, taken: impl Fn(&str) -> bool) -> Self {
        let title = title.into();
        let id = unique_slug(&title, taken, now_millis());
        Self { id, title }
    }
}

impl ChecklistItem {
    /// Build a fresh unchecked item with a random UUID v4 id.
    pub fn new(checklist_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            checklist_id: checklist_id.into(),
            title: title.into(),
            checked: false,
        }
    }

    /// Returns a copy with `checked` flipped.
    pub fn toggled(&self) -> Self {
        Self {
            checked: !self.checked,
            ..self.clone()
        }
    }
}

/// Lowercase `title` and replace every run of whitespace with a single `-`.
///
/// # Examples
///
/// ```
/// use quicklists::slugify;
///
/// assert_eq!(slugify("Weekly  Groceries"), "weekly-groceries");
/// assert_eq!(slugify("Packing"), "packing");
/// ```
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_whitespace = false;
    for ch in title.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
        } else {
            slug.extend(ch.to_lowercase());
            in_whitespace = false;
        }
    }
    slug
}

/// Mint a slug for `title` that `taken` does not report as in use.
///
/// When the plain slug collides, the Unix time in milliseconds is appended.
/// If that candidate is taken too, the suffix is incremented until free.
pub fn unique_slug(title: &str, taken: impl Fn(&str) -> bool, now_millis: u128) -> String {
    let slug = slugify(title);
    if !taken(&slug) {
        return slug;
    }

    let mut suffix = now_millis;
    loop {
        let candidate = format!("{slug}{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
