use url::Url;

/// Directory used for categories whose id sanitizes to nothing
const FALLBACK_DIRECTORY: &str = "uncategorized";

/// One category of the gallery, in the order the site lists it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    /// Raw identifier, e.g. the `galerie` query value
    pub id: String,

    /// Human-readable label as shown by the site
    pub label: String,

    /// First page of the category
    pub landing_url: Url,
}

impl Category {
    pub fn new(id: impl Into<String>, label: impl Into<String>, landing_url: Url) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            landing_url,
        }
    }

    /// Name of the category's directory under `images/`
    pub fn directory_name(&self) -> String {
        let sanitized = sanitize_filename::sanitize(self.id.trim());
        if sanitized.trim().is_empty() {
            FALLBACK_DIRECTORY.to_string()
        } else {
            sanitized
        }
    }
}
