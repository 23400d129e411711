use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

use super::error::{CatalogError, CatalogResult};

lazy_static! {
    static ref UNSAFE_CHARS_RE: Regex = Regex::new(r"[^A-Za-z0-9_.-]").unwrap();
    static ref UNDERSCORE_RUN_RE: Regex = Regex::new(r"_+").unwrap();
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts are dropped, whitespace becomes `_`, anything outside
/// `[A-Za-z0-9_.-]` is removed and leading dots are stripped so the result
/// can never be hidden or climb out of the uploads directory.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let spaced: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let cleaned = UNSAFE_CHARS_RE.replace_all(&spaced, "");
    let cleaned = UNDERSCORE_RUN_RE.replace_all(&cleaned, "_");
    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// Validate an upload name against the allow-list and return its sanitized
/// form.
pub fn accept_upload(raw: &str, allowed: &BTreeSet<String>) -> CatalogResult<String> {
    let name = sanitize_filename(raw);
    if name.is_empty() {
        return Err(CatalogError::invalid(format!(
            "filename '{}' has no usable characters",
            raw
        )));
    }

    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => {
            return Err(CatalogError::invalid(format!(
                "filename '{}' has no extension",
                raw
            )))
        }
    };

    if !allowed.contains(&ext) {
        return Err(CatalogError::invalid(format!(
            "file type '.{}' is not accepted",
            ext
        )));
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> BTreeSet<String> {
        ["csv", "h5ad", "pdf"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(r"C:\Users\me\my data.csv"), "my_data.csv");
        assert_eq!(sanitize_filename(".hidden.csv"), "hidden.csv");
    }

    #[test]
    fn test_accept_upload_checks_extension_case_insensitively() {
        assert_eq!(accept_upload("Counts.CSV", &allowed()).unwrap(), "Counts.CSV");
        assert!(accept_upload("script.sh", &allowed()).is_err());
        assert!(accept_upload("noext", &allowed()).is_err());
        assert!(accept_upload("///", &allowed()).is_err());
    }
}
