//! Version tokens inside file names.
//!
//! A version token is a `.v<digits>` segment that sits between two dots of the
//! final path component, e.g. `style.v12.css`. Only the final path component
//! is ever inspected or rewritten, so dotted directory names are left alone.

/// Where the version token is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Right after the base name: `app.min.js` → `app.v3.min.js`.
    #[default]
    Leading,
    /// Right before the final extension: `app.min.js` → `app.min.v3.js`.
    Trailing,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Placement::Leading => "leading",
            Placement::Trailing => "trailing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "leading" | "start" | "basename" => Some(Placement::Leading),
            "trailing" | "end" | "extension" => Some(Placement::Trailing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token {
    /// Byte offset of the dot opening the token.
    start: usize,
    /// Byte offset of the dot closing the token.
    end: usize,
    version: u64,
}

/// Insert `.v<version>` into `filename`.
///
/// Returns the name unchanged when `version` is `None` or when the final path
/// component has no dot to anchor the token on.
pub fn versioned_name(filename: &str, version: Option<u64>, placement: Placement) -> String {
    let Some(version) = version else {
        return filename.to_string();
    };
    let (dir, base) = split_dir(filename);
    let anchor = match placement {
        Placement::Leading => base.find('.'),
        Placement::Trailing => base.rfind('.'),
    };
    let Some(anchor) = anchor else {
        return filename.to_string();
    };
    format!("{dir}{}.v{version}{}", &base[..anchor], &base[anchor..])
}

/// Version number carried by `filename`, if any.
pub fn extract_version(filename: &str) -> Option<u64> {
    let (_, base) = split_dir(filename);
    find_token(base).map(|token| token.version)
}

/// `filename` with its version token removed.
pub fn clean_name(filename: &str) -> String {
    let (dir, base) = split_dir(filename);
    match find_token(base) {
        Some(token) => format!("{dir}{}{}", &base[..token.start], &base[token.end..]),
        None => filename.to_string(),
    }
}

/// Counter variable implied by a file name: its last extension, or the whole
/// name when it has none.
pub fn infer_variable(filename: &str) -> &str {
    let (_, base) = split_dir(filename);
    match base.rfind('.') {
        Some(idx) => &base[idx + 1..],
        None => base,
    }
}

fn split_dir(filename: &str) -> (&str, &str) {
    match filename.rfind(['/', '\\']) {
        Some(idx) => filename.split_at(idx + 1),
        None => ("", filename),
    }
}

fn find_token(base: &str) -> Option<Token> {
    let dots: Vec<usize> = base.match_indices('.').map(|(idx, _)| idx).collect();
    dots.windows(2).find_map(|pair| {
        let (start, end) = (pair[0], pair[1]);
        parse_token(&base[start + 1..end]).map(|version| Token {
            start,
            end,
            version,
        })
    })
}

fn parse_token(segment: &str) -> Option<u64> {
    let digits = segment.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn leading_placement_follows_base_name() {
        assert_eq!(
            versioned_name("style.css", Some(12), Placement::Leading),
            "style.v12.css"
        );
        assert_eq!(
            versioned_name("app.min.js", Some(3), Placement::Leading),
            "app.v3.min.js"
        );
    }

    #[test]
    fn trailing_placement_precedes_extension() {
        assert_eq!(
            versioned_name("style.css", Some(12), Placement::Trailing),
            "style.v12.css"
        );
        assert_eq!(
            versioned_name("app.min.js", Some(3), Placement::Trailing),
            "app.min.v3.js"
        );
    }

    #[test]
    fn missing_version_leaves_name_alone() {
        assert_eq!(versioned_name("style.css", None, Placement::Leading), "style.css");
    }

    #[test]
    fn names_without_extension_are_not_stamped() {
        assert_eq!(versioned_name("Makefile", Some(2), Placement::Leading), "Makefile");
        assert_eq!(versioned_name("Makefile", Some(2), Placement::Trailing), "Makefile");
    }

    #[test]
    fn only_the_final_component_is_rewritten() {
        assert_eq!(
            versioned_name("build.out/css/site.css", Some(4), Placement::Leading),
            "build.out/css/site.v4.css"
        );
        assert_eq!(clean_name("build.out/css/site.v4.css"), "build.out/css/site.css");
        assert_eq!(extract_version("build.v9/site.css"), None);
    }

    #[test]
    fn extracts_versions() {
        assert_eq!(extract_version("style.v12.css"), Some(12));
        assert_eq!(extract_version("app.min.v3.js"), Some(3));
        assert_eq!(extract_version(".v7.env"), Some(7));
    }

    #[test]
    fn parse_misses_are_absent() {
        for name in [
            "style.css",
            "style.vendor.css",
            "style.v.css",
            "style.v12x.css",
            "style.v12",
            "v12.css",
            "Makefile",
        ] {
            assert_eq!(extract_version(name), None, "{name}");
            assert_eq!(clean_name(name), name);
        }
    }

    #[test]
    fn clean_name_strips_token_in_either_position() {
        assert_eq!(clean_name("style.v12.css"), "style.css");
        assert_eq!(clean_name("app.v3.min.js"), "app.min.js");
        assert_eq!(clean_name("app.min.v3.js"), "app.min.js");
    }

    #[test]
    fn clean_name_recovers_original_for_both_placements() {
        let names = [
            "style.css",
            "app.min.js",
            "a.b.c.d",
            ".env",
            "trailing.",
            "double..dot",
            "assets/app.bundle.js",
            "weird.v1",
            "Makefile",
        ];
        for name in names {
            for placement in [Placement::Leading, Placement::Trailing] {
                for version in [1, 7, 42, 1_000_000] {
                    let stamped = versioned_name(name, Some(version), placement);
                    assert_eq!(clean_name(&stamped), name, "{stamped}");
                }
            }
        }
    }

    #[test]
    fn infers_variable_from_last_extension() {
        assert_eq!(infer_variable("style.css"), "css");
        assert_eq!(infer_variable("dist/app.min.js"), "js");
        assert_eq!(infer_variable("Makefile"), "Makefile");
    }

    #[test]
    fn placement_parses_aliases() {
        assert_eq!(Placement::parse("END"), Some(Placement::Trailing));
        assert_eq!(Placement::parse("leading"), Some(Placement::Leading));
        assert_eq!(Placement::parse("middle"), None);
    }
}
