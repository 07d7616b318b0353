//! ZIP archive codec for article bundles
//!
//! Layout, one directory per article:
//!
//! ```text
//! <dir>/metadata.json   canonical metadata
//! <dir>/article.md      raw Markdown
//! <dir>/assets/<file>   binary assets
//! ```
//!
//! A single bundle may also sit at the archive root. Everything here is
//! synchronous; async callers run it on `spawn_blocking`.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::{Component, Path};

use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, ServiceError};
use crate::models::{slugify, Article, ArticleMetadata};

pub const METADATA_FILE: &str = "metadata.json";
pub const CONTENT_FILE: &str = "article.md";
pub const ASSETS_DIR: &str = "assets";

/// One binary asset inside a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleAsset {
    pub name: String,
    pub data: Vec<u8>,
}

/// Raw files of one article directory inside an archive
#[derive(Debug, Clone, Default)]
pub struct ArticleBundle {
    /// Top-level directory name; `None` for a bundle at the archive root
    pub dir: Option<String>,
    pub metadata: Option<Vec<u8>>,
    pub content: Option<Vec<u8>>,
    pub assets: Vec<BundleAsset>,
}

/// A bundle decoded into an article
#[derive(Debug, Clone)]
pub struct ParsedBundle {
    pub article: Article,
    pub assets: Vec<BundleAsset>,
    /// Title as written in `metadata.json`, if it had one
    pub declared_title: Option<String>,
}

impl ArticleBundle {
    /// Name used in log lines
    pub fn label(&self) -> String {
        self.dir.clone().unwrap_or_else(|| "<root>".to_string())
    }

    /// Decodes the bundle. The slug comes from the title, else from the
    /// directory name, else a generated `article-xxxxxxxx`.
    pub fn into_article(self) -> std::result::Result<ParsedBundle, String> {
        let metadata_bytes = self.metadata.ok_or_else(|| format!("missing {}", METADATA_FILE))?;
        let content_bytes = self.content.ok_or_else(|| format!("missing {}", CONTENT_FILE))?;

        let mut metadata: ArticleMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| format!("invalid {}: {}", METADATA_FILE, e))?;
        let content = String::from_utf8(content_bytes)
            .map_err(|_| format!("{} is not valid UTF-8", CONTENT_FILE))?;

        let declared_title = Some(metadata.title.trim().to_string()).filter(|t| !t.is_empty());

        let mut slug = declared_title.as_deref().map(slugify).unwrap_or_default();
        if slug.is_empty() {
            slug = self.dir.as_deref().map(slugify).unwrap_or_default();
        }
        if slug.is_empty() {
            let id = uuid::Uuid::new_v4().simple().to_string();
            slug = format!("article-{}", &id[..8]);
        }

        if declared_title.is_none() {
            metadata.title = first_heading(&content)
                .or_else(|| self.dir.clone())
                .unwrap_or_else(|| slug.clone());
        }

        let mut assets = self.assets;
        assets.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ParsedBundle {
            article: Article {
                slug,
                metadata,
                content,
                assets: assets.iter().map(|a| a.name.clone()).collect(),
            },
            assets,
            declared_title,
        })
    }
}

fn first_heading(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

/// True for a plain file name: no separators, no `..`, not hidden
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains('/')
        && !name.contains('\\')
        && name != ".."
}

/// Splits an archive into per-article bundles. Entries with unsafe paths or
/// unexpected locations are logged and ignored.
pub fn read_bundles(data: &[u8]) -> Result<Vec<ArticleBundle>> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut bundles: BTreeMap<Option<String>, ArticleBundle> = BTreeMap::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let raw_name = file.name().to_string();
        let Some(path) = file.enclosed_name() else {
            warn!(entry = %raw_name, "Unsafe path in archive, skipping");
            continue;
        };

        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.iter().any(|p| p.starts_with('.') || p == "__MACOSX") {
            continue;
        }

        let (dir, rest) = match parts.as_slice() {
            [file_name] => (None, vec![file_name.as_str()]),
            // Assets of a bundle sitting at the archive root
            [assets, name] if assets == ASSETS_DIR => (None, vec![ASSETS_DIR, name.as_str()]),
            [dir, rest @ ..] if !rest.is_empty() => {
                (Some(dir.clone()), rest.iter().map(String::as_str).collect())
            }
            _ => continue,
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| ServiceError::Archive(format!("failed to read {}: {}", raw_name, e)))?;

        let bundle = bundles.entry(dir.clone()).or_insert_with(|| ArticleBundle {
            dir,
            ..Default::default()
        });
        match rest.as_slice() {
            [METADATA_FILE] => bundle.metadata = Some(data),
            [CONTENT_FILE] => bundle.content = Some(data),
            [ASSETS_DIR, name] => bundle.assets.push(BundleAsset {
                name: name.to_string(),
                data,
            }),
            _ => warn!(entry = %raw_name, "Unexpected file in archive, skipping"),
        }
    }

    Ok(bundles.into_values().collect())
}

/// Writes articles and their assets into a ZIP archive, one directory per slug
pub fn write_archive(entries: &[(Article, Vec<BundleAsset>)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (article, assets) in entries {
        let dir = Path::new(&article.slug);
        let metadata = serde_json::to_vec_pretty(&article.metadata)?;

        writer.start_file(zip_path(dir, METADATA_FILE), options)?;
        write_all(&mut writer, &metadata)?;

        writer.start_file(zip_path(dir, CONTENT_FILE), options)?;
        write_all(&mut writer, article.content.as_bytes())?;

        for asset in assets {
            if !is_safe_file_name(&asset.name) {
                warn!(slug = %article.slug, asset = %asset.name, "Unsafe asset name, not exported");
                continue;
            }
            writer.start_file(format!("{}/{}/{}", article.slug, ASSETS_DIR, asset.name), options)?;
            write_all(&mut writer, &asset.data)?;
        }
    }

    Ok(writer.finish()?.into_inner())
}

fn zip_path(dir: &Path, file: &str) -> String {
    // ZIP entry names always use forward slashes
    format!("{}/{}", dir.to_string_lossy(), file)
}

fn write_all<W: Write>(writer: &mut W, data: &[u8]) -> Result<()> {
    writer
        .write_all(data)
        .map_err(|e| ServiceError::Archive(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_article() -> Article {
        let mut article = Article::new("react-hooks-explained", "React Hooks Explained", "# Hooks\n\nBody.");
        article.metadata.summary = "All about hooks".to_string();
        article.metadata.tags.insert("react".to_string());
        article.metadata.publish_date = "2024-02-01".to_string();
        article.metadata.reading_time = 7;
        article.metadata.featured = true;
        article.metadata.seo.keywords = vec!["hooks".to_string()];
        article.assets = vec!["diagram.png".to_string()];
        article
    }

    fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in files {
            writer.start_file(name.to_string(), options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_write_then_read_preserves_metadata_and_content() {
        let article = sample_article();
        let asset = BundleAsset {
            name: "diagram.png".to_string(),
            data: vec![0x89, b'P', b'N', b'G'],
        };
        let bytes = write_archive(&[(article.clone(), vec![asset.clone()])]).unwrap();

        let bundles = read_bundles(&bytes).unwrap();
        assert_eq!(bundles.len(), 1);
        let parsed = bundles.into_iter().next().unwrap().into_article().unwrap();
        assert_eq!(parsed.article.metadata, article.metadata);
        assert_eq!(parsed.article.content, article.content);
        assert_eq!(parsed.assets, vec![asset]);
        assert_eq!(parsed.declared_title.as_deref(), Some("React Hooks Explained"));
    }

    #[test]
    fn test_slug_falls_back_to_directory_then_generated() {
        let bytes = zip_of(&[
            ("My Notes/metadata.json", b"{}"),
            ("My Notes/article.md", b"# From Heading\n"),
            ("metadata.json", b"{\"title\": \"\"}"),
            ("article.md", b"no heading"),
        ]);
        let mut parsed: Vec<_> = read_bundles(&bytes)
            .unwrap()
            .into_iter()
            .map(|b| b.into_article().unwrap())
            .collect();
        parsed.sort_by(|a, b| a.article.slug.cmp(&b.article.slug));

        assert!(parsed[0].article.slug.starts_with("article-"));
        assert_eq!(parsed[0].article.slug.len(), "article-".len() + 8);
        assert!(parsed[0].declared_title.is_none());

        assert_eq!(parsed[1].article.slug, "my-notes");
        assert_eq!(parsed[1].article.metadata.title, "From Heading");
    }

    #[test]
    fn test_root_bundle_keeps_its_assets() {
        let bytes = zip_of(&[
            ("metadata.json", b"{\"title\": \"Root Article\"}"),
            ("article.md", b"body"),
            ("assets/pic.png", b"png-bytes"),
        ]);
        let bundles = read_bundles(&bytes).unwrap();
        assert_eq!(bundles.len(), 1);
        assert!(bundles[0].dir.is_none());

        let parsed = bundles.into_iter().next().unwrap().into_article().unwrap();
        assert_eq!(parsed.article.slug, "root-article");
        assert_eq!(parsed.article.assets, ["pic.png"]);
        assert_eq!(parsed.assets[0].data, b"png-bytes");
    }

    #[test]
    fn test_malformed_bundles_are_reported_per_bundle() {
        let bytes = zip_of(&[
            ("good/metadata.json", b"{\"title\": \"Good\"}"),
            ("good/article.md", b"ok"),
            ("broken/metadata.json", b"{not json"),
            ("broken/article.md", b"ok"),
            ("headless/article.md", b"no metadata"),
        ]);
        let results: Vec<_> = read_bundles(&bytes)
            .unwrap()
            .into_iter()
            .map(|b| (b.label(), b.into_article()))
            .collect();
        assert_eq!(results.len(), 3);
        for (label, result) in results {
            match label.as_str() {
                "good" => assert_eq!(result.unwrap().article.slug, "good"),
                "broken" => assert!(result.unwrap_err().contains("invalid metadata.json")),
                "headless" => assert!(result.unwrap_err().contains("missing metadata.json")),
                other => panic!("unexpected bundle {}", other),
            }
        }
    }

    #[test]
    fn test_not_a_zip_is_an_archive_error() {
        let err = read_bundles(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, ServiceError::Archive(_)));
    }

    #[test]
    fn test_safe_file_names() {
        assert!(is_safe_file_name("cover.jpg"));
        assert!(!is_safe_file_name("../cover.jpg"));
        assert!(!is_safe_file_name("a/b.png"));
        assert!(!is_safe_file_name(".hidden"));
        assert!(!is_safe_file_name(""));
    }
}
