use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::errors::AppError;

/// Resolve an artifact reference to inline base64 image data.
///
/// Accepts a readable file path, a `data:image/...;base64,` URL, or bare
/// base64. Resolution happens exactly once, at pipeline entry, before any
/// provider call; anything unrecognizable is rejected here.
pub fn resolve_artifact(reference: &str) -> Result<Arc<str>, AppError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(AppError::InvalidArtifact(
            "empty artifact reference".to_string(),
        ));
    }

    if Path::new(reference).exists() {
        let bytes = std::fs::read(reference).map_err(|e| {
            AppError::InvalidArtifact(format!("failed to read artifact file: {e}"))
        })?;
        return Ok(BASE64.encode(bytes).into());
    }

    let inline = strip_data_url_prefix(reference);
    if looks_like_base64(inline) {
        return Ok(inline.into());
    }

    Err(AppError::InvalidArtifact(
        "reference is neither a readable file path nor inline base64 image data".to_string(),
    ))
}

fn strip_data_url_prefix(reference: &str) -> &str {
    reference
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, data)| data)
        .unwrap_or(reference)
}

fn looks_like_base64(data: &str) -> bool {
    !data.is_empty()
        && data
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        && BASE64.decode(data).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_bare_base64() {
        let encoded = BASE64.encode(b"fake image bytes");
        let resolved = resolve_artifact(&encoded).unwrap();
        assert_eq!(&*resolved, encoded.as_str());
    }

    #[test]
    fn test_resolves_data_url() {
        let encoded = BASE64.encode(b"fake image bytes");
        let data_url = format!("data:image/png;base64,{encoded}");
        let resolved = resolve_artifact(&data_url).unwrap();
        assert_eq!(&*resolved, encoded.as_str());
    }

    #[test]
    fn test_resolves_file_path() {
        let path = std::env::temp_dir().join(format!("artifact-{}.png", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"fake image bytes").unwrap();

        let resolved = resolve_artifact(path.to_str().unwrap()).unwrap();
        assert_eq!(&*resolved, BASE64.encode(b"fake image bytes").as_str());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_rejects_garbage() {
        let err = resolve_artifact("definitely not ~~ an artifact").unwrap_err();
        assert!(matches!(err, AppError::InvalidArtifact(_)));

        let err = resolve_artifact("").unwrap_err();
        assert!(matches!(err, AppError::InvalidArtifact(_)));
    }

    #[test]
    fn test_rejects_missing_path_that_is_not_base64() {
        let err = resolve_artifact("/no/such/file_here.png").unwrap_err();
        assert!(matches!(err, AppError::InvalidArtifact(_)));
    }
}
