//! Module/alias path resolution.
//!
//! Import targets must match symbol file paths across language
//! conventions: TypeScript qualifier suffixes (`auth.guard.ts`), `@` path
//! aliases, Node implicit `index`, Python dotted modules. The matcher is
//! a qualifier-aware suffix check with a boundary requirement so `auth`
//! never matches `unauth`.

/// Framework qualifier suffixes stripped before matching.
const QUALIFIERS: &[&str] = &[
    ".guard",
    ".service",
    ".controller",
    ".interceptor",
    ".middleware",
    ".module",
    ".entity",
    ".dto",
    ".resolver",
    ".strategy",
    ".pipe",
    ".component",
    ".directive",
];

const EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".py"];

fn clean_path(path: &str) -> String {
    let mut p = path.replace('\\', "/").to_lowercase();
    for ext in EXTENSIONS {
        if let Some(stripped) = p.strip_suffix(ext) {
            p = stripped.to_string();
            break;
        }
    }
    for qualifier in QUALIFIERS {
        if let Some(stripped) = p.strip_suffix(qualifier) {
            p = stripped.to_string();
            break;
        }
    }
    p
}

fn suffix_matches(symbol: &str, fingerprint: &str) -> bool {
    if !symbol.ends_with(fingerprint) {
        return false;
    }
    let boundary = symbol.len() - fingerprint.len();
    boundary == 0 || symbol.as_bytes()[boundary - 1] == b'/'
}

/// Check whether an import path resolves to a symbol file path.
pub fn path_matches(import_package: &str, symbol_path: &str) -> bool {
    if import_package.is_empty() || symbol_path.is_empty() {
        return false;
    }

    let mut clean_import = clean_path(import_package);
    let clean_symbol = clean_path(symbol_path);

    // TypeScript path aliases: "@controllers/auth" -> "controllers/auth".
    if let Some(stripped) = clean_import.strip_prefix('@') {
        clean_import = stripped.to_string();
    }

    let parts: Vec<&str> = clean_import
        .split('/')
        .filter(|p| !matches!(*p, "." | ".." | ""))
        .collect();
    if parts.is_empty() {
        return false;
    }
    let fingerprint = parts.join("/");

    if suffix_matches(&clean_symbol, &fingerprint) {
        return true;
    }

    // Node implicit index: './models' must match 'src/models/index.ts'.
    if let Some(without_index) = clean_symbol.strip_suffix("/index") {
        if suffix_matches(without_index, &fingerprint) {
            return true;
        }
    }

    false
}

/// Resolve an import against candidate file paths. Tie-breaks: shortest
/// remaining path first, then lexicographic.
pub fn resolve_import<'a, I>(import_package: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut matches: Vec<&str> = candidates
        .into_iter()
        .filter(|candidate| path_matches(import_package, candidate))
        .collect();
    matches.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    matches.first().map(|m| m.to_string())
}
