/// Output format of a template or block. It decides how echoed values are
/// escaped and which whitespace filter `{spaceless}` installs.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ContentType {
    #[default]
    Html,
    Xhtml,
    Xml,
    Js,
    Css,
    Text,
}

impl ContentType {
    pub const fn is_html(self) -> bool {
        matches!(self, Self::Html | Self::Xhtml)
    }

    /// Name used inside compiled code, e.g. `'html'`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Xhtml => "xhtml",
            Self::Xml => "xml",
            Self::Js => "js",
            Self::Css => "css",
            Self::Text => "text",
        }
    }

    /// Upper-case name used in warnings.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Html => "HTML",
            Self::Xhtml => "XHTML",
            Self::Xml => "XML",
            Self::Js => "JS",
            Self::Css => "CSS",
            Self::Text => "TEXT",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "html" => Some(Self::Html),
            "xhtml" => Some(Self::Xhtml),
            "xml" => Some(Self::Xml),
            "js" | "javascript" => Some(Self::Js),
            "css" => Some(Self::Css),
            "text" | "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-wide settings.
///
/// With the `serde` feature enabled the configuration can be loaded from any
/// serde format; missing fields fall back to [`EngineConfig::default`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineConfig {
    /// Content type templates are compiled and rendered with.
    pub content_type: ContentType,
    /// How deep include/extends/import chains may nest before rendering fails.
    pub max_depth: usize,
    /// Report reads of undefined variables as warnings.
    pub notice_undefined: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            content_type: ContentType::Html,
            max_depth: 64,
            notice_undefined: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_content_type_names() {
        assert_eq!(ContentType::from_name("HTML"), Some(ContentType::Html));
        assert_eq!(ContentType::from_name("javascript"), Some(ContentType::Js));
        assert_eq!(ContentType::from_name("pdf"), None);
        assert_eq!(ContentType::Xhtml.label(), "XHTML");
        assert!(ContentType::Xhtml.is_html());
        assert!(!ContentType::Xml.is_html());
    }
}
