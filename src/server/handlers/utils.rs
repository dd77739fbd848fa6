use std::path::Path;

use crate::ingest::loader::FileType;

/// Strips any directory part from an uploaded file name and checks that the
/// extension is one the loader understands.
pub fn sanitize_upload_name(raw: &str) -> Option<String> {
    let normalized = raw.replace('\\', "/");
    let name = Path::new(&normalized).file_name()?.to_str()?.trim();

    if name.is_empty() || name.starts_with('.') {
        return None;
    }
    FileType::from_path(Path::new(name))?;
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_file_name() {
        assert_eq!(sanitize_upload_name("manual.pdf").as_deref(), Some("manual.pdf"));
        assert_eq!(sanitize_upload_name("../../etc/specs.csv").as_deref(), Some("specs.csv"));
        assert_eq!(sanitize_upload_name("C:\\docs\\Leaf.TXT").as_deref(), Some("Leaf.TXT"));
    }

    #[test]
    fn rejects_unsupported_or_hidden_names() {
        assert_eq!(sanitize_upload_name("photo.jpg"), None);
        assert_eq!(sanitize_upload_name(".hidden.txt"), None);
        assert_eq!(sanitize_upload_name("../"), None);
        assert_eq!(sanitize_upload_name(""), None);
    }
}
