//! Directory-backed page store for the CLI.
//!
//! Layout under the wiki root:
//!
//! ```text
//! pages/{slug}.wiki          YAML frontmatter + raw body
//! pages/{slug}.secrets.json  knower sidecar (codename -> identity set)
//! ```
//!
//! Upload URLs are content-bucketed MediaWiki-style from the md5 of the file
//! name: `/files/{h0}/{h0}{h1}/Name.ext`.

use crate::page::{
    CategoryMembers, FileInfo, KnowerMap, Page, PageStore, StoreError, merge_knower_maps,
    title_to_path,
};
use crate::pov::Viewer;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;
use walkdir::WalkDir;

/// Frontmatter block stored at the top of every `.wiki` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct PageMeta {
    title: String,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    loremaster_only: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<FileMeta>,

    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<String>,
}

/// Upload metadata as authored in frontmatter. The serving URL is derived,
/// not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileMeta {
    name: String,
    mimetype: String,
    size: u64,
}

pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> DirStore {
        DirStore { root: root.into() }
    }

    fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    fn page_file(&self, slug: &str) -> PathBuf {
        self.pages_dir().join(format!("{}.wiki", slug))
    }

    fn sidecar_file(&self, slug: &str) -> PathBuf {
        self.pages_dir().join(format!("{}.secrets.json", slug))
    }

    fn load_all(&self) -> Result<Vec<Page>, StoreError> {
        let dir = self.pages_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries: Vec<_> = WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "wiki")
            })
            .collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        let mut pages = Vec::with_capacity(entries.len());
        for entry in entries {
            pages.push(self.load_page(entry.path())?);
        }
        Ok(pages)
    }

    fn load_page(&self, path: &Path) -> Result<Page, StoreError> {
        let text = fs::read_to_string(path)?;
        let slug = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
            .to_string();

        let (meta, body) = match split_frontmatter(&text) {
            Some((yaml, body)) => {
                let meta: PageMeta =
                    serde_yaml::from_str(&yaml).map_err(|source| StoreError::Metadata {
                        path: path.display().to_string(),
                        source,
                    })?;
                (meta, body.to_string())
            }
            None => (PageMeta::default(), text),
        };

        let title = if meta.title.is_empty() {
            slug.replace('_', " ")
        } else {
            meta.title
        };

        Ok(Page {
            id: slug.clone(),
            path: slug,
            title,
            body,
            file: meta.file.map(|f| FileInfo {
                url: file_url(&f.name),
                mimetype: f.mimetype,
                size: f.size,
            }),
            loremaster_only: meta.loremaster_only,
            updated: meta.updated,
        })
    }

    /// Write a page's frontmatter and body, stamping the update time and
    /// pruning sidecar entries whose codename no longer appears in the body.
    pub fn save_page(&self, page: &Page) -> Result<(), StoreError> {
        fs::create_dir_all(self.pages_dir())?;

        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let updated = OffsetDateTime::now_utc()
            .format(&format)
            .unwrap_or_default();

        let meta = PageMeta {
            title: page.title.clone(),
            loremaster_only: page.loremaster_only,
            // the derived URL always ends in the upload's name.
            file: page.file.as_ref().map(|f| FileMeta {
                name: f.url.rsplit('/').next().unwrap_or_default().to_string(),
                mimetype: f.mimetype.clone(),
                size: f.size,
            }),
            updated: Some(updated),
        };
        let yaml = serde_yaml::to_string(&meta).unwrap_or_default();

        let mut out = String::with_capacity(yaml.len() + page.body.len() + 16);
        out.push_str("---\n");
        out.push_str(&yaml);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("---\n");
        out.push_str(&page.body);
        fs::write(self.page_file(&page.id), out)?;

        // prune stale sidecar entries.
        let live = crate::codename::codenames_in(&page.body);
        let sidecar = self.sidecar_file(&page.id);
        if sidecar.exists() {
            let mut knowers = self.read_sidecar(&sidecar)?;
            knowers.retain(|codename, _| live.contains(codename));
            self.write_sidecar(&sidecar, &knowers)?;
        }
        Ok(())
    }

    fn read_sidecar(&self, path: &Path) -> Result<KnowerMap, StoreError> {
        if !path.exists() {
            return Ok(KnowerMap::new());
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| StoreError::Sidecar {
            path: path.display().to_string(),
            source,
        })
    }

    fn write_sidecar(&self, path: &Path, knowers: &KnowerMap) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(knowers).map_err(|source| StoreError::Sidecar {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl PageStore for DirStore {
    fn find_by_title(&self, title: &str, viewer: &Viewer) -> Result<Option<Page>, StoreError> {
        // titles and slugs are interchangeable lookup keys.
        let slug = title_to_path(title);
        Ok(self.load_all()?.into_iter().find(|p| {
            (p.title.eq_ignore_ascii_case(title.trim()) || p.id.eq_ignore_ascii_case(&slug))
                && p.visible_to(viewer)
        }))
    }

    fn find_by_path(&self, path: &str, viewer: &Viewer) -> Result<Option<Page>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|p| p.path == path && p.visible_to(viewer)))
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
        for page in self.load_all()?.into_iter().filter(|p| p.visible_to(viewer)) {
            if !page.body.contains(&tag) {
                continue;
            }
            if page.namespace() == Some("Category") {
                members.subcategories.push(page);
            } else {
                members.pages.push(page);
            }
        }
        Ok(members)
    }

    fn pages(&self, viewer: &Viewer) -> Result<Vec<Page>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|p| p.visible_to(viewer))
            .collect())
    }

    fn load_knowers(&self, page_id: &str) -> Result<KnowerMap, StoreError> {
        self.read_sidecar(&self.sidecar_file(page_id))
    }

    fn merge_knowers(&self, page_id: &str, update: &KnowerMap) -> Result<(), StoreError> {
        fs::create_dir_all(self.pages_dir())?;
        let path = self.sidecar_file(page_id);
        let mut knowers = self.read_sidecar(&path)?;
        merge_knower_maps(&mut knowers, update);
        self.write_sidecar(&path, &knowers)
    }
}

/// Content-bucketed serving URL for an upload.
pub fn file_url(name: &str) -> String {
    let digest = format!("{:x}", md5::compute(name.as_bytes()));
    let h0 = &digest[0..1];
    let h01 = &digest[0..2];
    format!("/files/{}/{}/{}", h0, h01, title_to_path(name))
}

/// Split a leading `---` YAML frontmatter block from the body.
fn split_frontmatter(text: &str) -> Option<(String, &str)> {
    let rest = text.strip_prefix("---\n").or_else(|| text.strip_prefix("---\r\n"))?;
    let mut pos = 0usize;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "---" {
            let yaml = rest[..pos].to_string();
            return Some((yaml, &rest[pos + line.len()..]));
        }
        pos += line.len();
    }
    None
}
