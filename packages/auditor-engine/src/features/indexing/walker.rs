//! Repository walk: language detection, exclusions, path normalization.

use std::path::PathBuf;

use walkdir::WalkDir;

use crate::config::AuditConfig;
use crate::errors::Result;
use crate::shared::models::Language;
use crate::shared::utils::paths::relative_to;

/// One candidate source file.
#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub abs: PathBuf,
    /// Forward-slash path relative to the repository root.
    pub rel: String,
    pub language: Language,
}

/// Walk the repository and return supported source files in deterministic
/// (sorted) order.
pub fn walk_repository(config: &AuditConfig) -> Result<Vec<WalkedFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(&config.root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative_to(&config.root, entry.path());
        if is_excluded(config, &rel) {
            continue;
        }
        let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let Some(language) = Language::from_extension(ext) else {
            continue;
        };
        files.push(WalkedFile {
            abs: entry.path().to_path_buf(),
            rel,
            language,
        });
    }

    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

fn is_excluded(config: &AuditConfig, rel: &str) -> bool {
    config.exclude_patterns.iter().any(|pattern| {
        let trimmed = pattern.trim_end_matches('/');
        // Directory patterns match at the path start or any segment
        // boundary; plain patterns are substring matches.
        rel.starts_with(&format!("{}/", trimmed))
            || rel.contains(&format!("/{}/", trimmed))
            || (!pattern.ends_with('/') && rel.contains(pattern.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_filters_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("app")).expect("mkdir");
        std::fs::create_dir_all(root.join("node_modules/pkg")).expect("mkdir");
        std::fs::write(root.join("app/b.py"), "x = 1\n").expect("write");
        std::fs::write(root.join("app/a.ts"), "const x = 1;\n").expect("write");
        std::fs::write(root.join("app/readme.md"), "# doc\n").expect("write");
        std::fs::write(root.join("node_modules/pkg/index.js"), "x\n").expect("write");

        let config = crate::config::AuditConfig::for_root(root);
        let files = walk_repository(&config).expect("walk");
        let rels: Vec<&str> = files.iter().map(|f| f.rel.as_str()).collect();
        assert_eq!(rels, vec!["app/a.ts", "app/b.py"]);
        assert_eq!(files[0].language, Language::TypeScript);
        assert_eq!(files[1].language, Language::Python);
    }
}
