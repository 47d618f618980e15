/*++

Licensed under the Apache-2.0 license.

File Name:

   ini.rs

Abstract:

    File contains a minimal scanner for the section-based key/value
    format the vendor manifests use.

--*/

use rkimage_types::{ImageError, ImageResult};

/// One `[SECTION]` and its key/value pairs, in file order.
pub struct Section {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    /// Case-insensitive key lookup; first match wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Parsed manifest text. Section names are matched exactly, keys
/// case-insensitively; `#` and `;` start comment lines.
pub struct Ini {
    sections: Vec<Section>,
}

impl Ini {
    pub fn parse(text: &str) -> ImageResult<Self> {
        let mut sections: Vec<Section> = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| {
                    ImageError::Config(format!("line {}: unterminated section header", lineno + 1))
                })?;
                sections.push(Section {
                    name: name.trim().to_string(),
                    entries: Vec::new(),
                });
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ImageError::Config(format!(
                    "line {}: expected KEY=VALUE, got {line:?}",
                    lineno + 1
                )));
            };
            let Some(section) = sections.last_mut() else {
                return Err(ImageError::Config(format!(
                    "line {}: key/value pair before any section",
                    lineno + 1
                )));
            };
            section
                .entries
                .push((key.trim().to_string(), value.trim().to_string()));
        }
        Ok(Self { sections })
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Look up `key` in `section`, failing with a config error naming the
    /// missing piece.
    pub fn require(&self, section: &str, key: &str) -> ImageResult<&str> {
        let sec = self
            .section(section)
            .ok_or_else(|| ImageError::Config(format!("missing required section [{section}]")))?;
        sec.get(key)
            .ok_or_else(|| ImageError::Config(format!("[{section}] is missing {key}=")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_and_comments() {
        let ini = Ini::parse(
            "# leading comment\n[A]\nKey=va\n; other comment\n[B]\nKEY = vb \n",
        )
        .unwrap();
        assert_eq!(ini.section("A").unwrap().get("Key"), Some("va"));
        // Keys are case-insensitive, values trimmed.
        assert_eq!(ini.section("B").unwrap().get("key"), Some("vb"));
        assert!(ini.section("a").is_none());
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(
            Ini::parse("stray=pair\n"),
            Err(ImageError::Config(_))
        ));
        assert!(matches!(
            Ini::parse("[A]\nno separator here\n"),
            Err(ImageError::Config(_))
        ));
        assert!(matches!(
            Ini::parse("[Unterminated\n"),
            Err(ImageError::Config(_))
        ));
    }

    #[test]
    fn test_require_reports_what_is_missing() {
        let ini = Ini::parse("[OUTPUT]\nPATH=x.img\n").unwrap();
        assert_eq!(ini.require("OUTPUT", "PATH").unwrap(), "x.img");
        let err = ini.require("VERSION", "MAJOR").unwrap_err();
        assert!(err.to_string().contains("VERSION"));
        let err = ini.require("OUTPUT", "NAME").unwrap_err();
        assert!(err.to_string().contains("NAME"));
    }
}
