/// Storage collaborator for image answers. Uploading and retention live in
/// a separate system; this service only turns the stored references
/// carried by image answers into serving URLs for the review UI.
pub trait FileStorage: Send + Sync {
    fn url_for(&self, stored_name: &str) -> String;
}

/// Files served from a fixed base URL (a static uploads mount or a CDN
/// prefix).
pub struct BaseUrlStorage {
    base_url: String,
}

impl BaseUrlStorage {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl FileStorage for BaseUrlStorage {
    fn url_for(&self, stored_name: &str) -> String {
        format!("{}/{}", self.base_url, stored_name.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_and_name_without_doubled_slashes() {
        let storage = BaseUrlStorage::new("/uploads/".to_string());
        assert_eq!(storage.url_for("abc.png"), "/uploads/abc.png");
        assert_eq!(storage.url_for("/abc.png"), "/uploads/abc.png");

        let cdn = BaseUrlStorage::new("https://cdn.example.com/files".to_string());
        assert_eq!(
            cdn.url_for("2024/abc.png"),
            "https://cdn.example.com/files/2024/abc.png"
        );
    }
}
