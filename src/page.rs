//! Page model and the collaborator contracts the render core depends on.
//!
//! Pages live in a store addressed by title/path; templates and links hold
//! lookup keys into it rather than direct references, so the page graph can
//! be cyclic without the renderer ever chasing object cycles.

use crate::pov::Viewer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use thiserror::Error;

/// Knower sets keyed by secret codename; the out-of-band sidecar that
/// round-trips with a page body.
pub type KnowerMap = BTreeMap<String, BTreeSet<String>>;

/// Collaborator failures. These are the only errors that ever reach a render
/// caller; markup content degrades instead of erroring.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed page metadata in {path}: {source}")]
    Metadata {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("malformed knower sidecar in {path}: {source}")]
    Sidecar {
        path: String,
        source: serde_json::Error,
    },
}

/// Blob-store record for a page's attached upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub url: String,
    pub mimetype: String,
    pub size: u64,
}

/// A wiki page as the store hands it to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Stable store id.
    pub id: String,

    /// Full title including any namespace prefix (`Template:Infobox`).
    pub title: String,

    /// URL path the page is served under.
    pub path: String,

    #[serde(default)]
    pub body: String,

    /// Attached upload, present on `File:` pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,

    /// Pages the loremaster keeps to themselves; excluded from every other
    /// viewer's lookups.
    #[serde(default)]
    pub loremaster_only: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl Page {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Page {
        let title = title.into();
        Page {
            id: title_to_path(&title),
            path: title_to_path(&title),
            title,
            body: body.into(),
            file: None,
            loremaster_only: false,
            updated: None,
        }
    }

    /// Namespace prefix of the title, if any (`Template`, `Category`, `File`).
    pub fn namespace(&self) -> Option<&str> {
        self.title.split_once(':').map(|(ns, _)| ns)
    }

    pub fn visible_to(&self, viewer: &Viewer) -> bool {
        !self.loremaster_only || viewer.is_loremaster()
    }
}

/// Transliterate a title into a stable URL path.
pub fn title_to_path(title: &str) -> String {
    let mut path = deunicode::deunicode(title.trim()).replace(' ', "_");
    path.retain(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'));
    if path.is_empty() {
        path = "Untitled".to_string();
    }
    path
}

/// Result of a category listing.
#[derive(Debug, Clone, Default)]
pub struct CategoryMembers {
    pub pages: Vec<Page>,
    pub subcategories: Vec<Page>,
}

/// Page-lookup collaborator. Implementations enforce viewer scoping: a page
/// the viewer's clearance excludes resolves as absent.
pub trait PageStore {
    fn find_by_title(&self, title: &str, viewer: &Viewer) -> Result<Option<Page>, StoreError>;

    fn find_by_path(&self, path: &str, viewer: &Viewer) -> Result<Option<Page>, StoreError>;

    /// Pages and subcategories tagged `[[Category:...]]` with the given
    /// category title, filtered by viewer clearance.
    fn find_category_members(
        &self,
        category_title: &str,
        viewer: &Viewer,
    ) -> Result<CategoryMembers, StoreError>;

    /// Every page the viewer may see. Used for textual usage scans.
    fn pages(&self, viewer: &Viewer) -> Result<Vec<Page>, StoreError>;

    /// The knower sidecar for a page.
    fn load_knowers(&self, page_id: &str) -> Result<KnowerMap, StoreError>;

    /// Merge `update` into the stored sidecar by set union per codename.
    /// Union semantics make concurrent reveals commute; a racing save can
    /// never drop a knower.
    fn merge_knowers(&self, page_id: &str, update: &KnowerMap) -> Result<(), StoreError>;
}

/// Set-union merge of knower maps, the only write operation the render core
/// performs.
pub fn merge_knower_maps(into: &mut KnowerMap, update: &KnowerMap) {
    for (codename, ids) in update {
        into.entry(codename.clone())
            .or_default()
            .extend(ids.iter().cloned());
    }
}

/// In-memory store used by tests and embedding applications.
#[derive(Default)]
pub struct MemoryStore {
    pages: Vec<Page>,
    knowers: Mutex<HashMap<String, KnowerMap>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn with_pages(pages: Vec<Page>) -> MemoryStore {
        MemoryStore {
            pages,
            knowers: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&mut self, page: Page) {
        self.pages.push(page);
    }
}

impl PageStore for MemoryStore {
    fn find_by_title(&self, title: &str, viewer: &Viewer) -> Result<Option<Page>, StoreError> {
        Ok(self
            .pages
            .iter()
            .find(|p| p.title.eq_ignore_ascii_case(title.trim()) && p.visible_to(viewer))
            .cloned())
    }

    fn find_by_path(&self, path: &str, viewer: &Viewer) -> Result<Option<Page>, StoreError> {
        Ok(self
            .pages
            .iter()
            .find(|p| p.path == path && p.visible_to(viewer))
            .cloned())
    }

    fn find_category_members(
        &self,
        category_title: &str,
        viewer: &Viewer,
    ) -> Result<CategoryMembers, StoreError> {
        let name = category_title
            .trim()
            .strip_prefix("Category:")
            .unwrap_or(category_title.trim());
        let tag = format!("[[Category:{}]]", name);
        let mut members = CategoryMembers::default();
        for page in self.pages.iter().filter(|p| p.visible_to(viewer)) {
            if !page.body.contains(&tag) {
                continue;
            }
            if page.namespace() == Some("Category") {
                members.subcategories.push(page.clone());
            } else {
                members.pages.push(page.clone());
            }
        }
        Ok(members)
    }

    fn pages(&self, viewer: &Viewer) -> Result<Vec<Page>, StoreError> {
        Ok(self
            .pages
            .iter()
            .filter(|p| p.visible_to(viewer))
            .cloned()
            .collect())
    }

    fn load_knowers(&self, page_id: &str) -> Result<KnowerMap, StoreError> {
        Ok(self
            .knowers
            .lock()
            .unwrap()
            .get(page_id)
            .cloned()
            .unwrap_or_default())
    }

    fn merge_knowers(&self, page_id: &str, update: &KnowerMap) -> Result<(), StoreError> {
        let mut guard = self.knowers.lock().unwrap();
        let entry = guard.entry(page_id.to_string()).or_default();
        merge_knower_maps(entry, update);
        Ok(())
    }
}
