use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::Error;

/// Destination for one source directory, as an ordered list of path
/// segments relative to the destination root. Recomputed on every
/// evaluation, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDestination {
    pub segments: Vec<String>,
}

impl ResolvedDestination {
    pub fn join(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in &self.segments {
            path.push(segment);
        }
        path
    }
}

/// Resolve a directive's text into destination segments:
/// `[year?] + directive components + [drive suffix?]`.
///
/// With the year prefix enabled, the first run of exactly four digits in
/// [1900, 2099] becomes a standalone leading segment; the directive text
/// itself is kept whole after it. No year found is not an error.
pub fn resolve(directive: &str, config: &AppConfig) -> Result<ResolvedDestination, Error> {
    let directive = directive.trim();
    if directive.is_empty() {
        return Err(Error::Directive("empty directive".to_string()));
    }

    let mut segments: Vec<String> = Vec::new();

    if config.enable_year_prefix {
        if let Some(year) = extract_year(directive) {
            segments.push(year.to_string());
        }
    }

    for component in directive.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(component.to_string()),
        }
    }

    if config.enable_drive_suffix && !config.drive_suffix.is_empty() {
        segments.push(config.drive_suffix.clone());
    }

    Ok(ResolvedDestination { segments })
}

/// First run of exactly four digits forming a year in [1900, 2099].
/// Longer digit runs are not years; later runs are only considered when
/// earlier ones fall outside the window.
fn extract_year(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i - start == 4 {
                if let Ok(year) = text[start..i].parse::<u32>() {
                    if (1900..=2099).contains(&year) {
                        return Some(&text[start..i]);
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(year_prefix: bool, drive_suffix: bool) -> AppConfig {
        AppConfig {
            enable_year_prefix: year_prefix,
            enable_drive_suffix: drive_suffix,
            drive_suffix: "incoming".to_string(),
            ..AppConfig::default()
        }
    }

    fn segments(directive: &str, config: &AppConfig) -> Vec<String> {
        resolve(directive, config).unwrap().segments
    }

    #[test]
    fn test_empty_directive_is_rejected() {
        assert!(resolve("", &config(false, false)).is_err());
        assert!(resolve("   \n", &config(false, false)).is_err());
    }

    #[test]
    fn test_plain_directive_with_suffix() {
        assert_eq!(
            segments("documents/work", &config(false, true)),
            vec!["documents", "work", "incoming"]
        );
    }

    #[test]
    fn test_year_prefix_keeps_directive_whole() {
        assert_eq!(
            segments("Project/2025/Client/Campaign", &config(true, true)),
            vec!["2025", "Project", "2025", "Client", "Campaign", "incoming"]
        );
    }

    #[test]
    fn test_no_year_found_omits_prefix() {
        assert_eq!(
            segments("documents/work", &config(true, false)),
            vec!["documents", "work"]
        );
    }

    #[test]
    fn test_year_window_edges() {
        assert_eq!(extract_year("shoot_1900"), Some("1900"));
        assert_eq!(extract_year("shoot_2099"), Some("2099"));
        assert_eq!(extract_year("shoot_1899"), None);
        assert_eq!(extract_year("shoot_2100"), None);
    }

    #[test]
    fn test_five_digit_run_is_not_a_year() {
        assert_eq!(extract_year("clip_20250"), None);
        // ...but a valid run later in the text still matches.
        assert_eq!(extract_year("clip_20250/2024"), Some("2024"));
    }

    #[test]
    fn test_first_valid_year_wins() {
        assert_eq!(extract_year("2021/archive/2024"), Some("2021"));
        // An out-of-window run does not stop the scan.
        assert_eq!(extract_year("1234/archive/2024"), Some("2024"));
    }

    #[test]
    fn test_directive_normalization() {
        assert_eq!(
            segments("./documents//work/", &config(false, false)),
            vec!["documents", "work"]
        );
        assert_eq!(
            segments("documents/tmp/../work", &config(false, false)),
            vec!["documents", "work"]
        );
    }

    #[test]
    fn test_join_builds_destination_path() {
        let resolved = resolve("documents/work", &config(false, true)).unwrap();
        assert_eq!(
            resolved.join(Path::new("/dest")),
            PathBuf::from("/dest/documents/work/incoming")
        );
    }
}
