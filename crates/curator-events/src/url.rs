//! Absolute URLs handed to queue consumers.

use curator_core::models::{EntityId, FileRecord};
use curator_core::AppError;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Components encoded in a derivative destination URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationParts {
    pub node_id: EntityId,
    pub media_type: String,
    pub term_id: EntityId,
}

#[derive(Debug, Clone)]
pub struct UrlGenerator {
    base: Url,
}

impl UrlGenerator {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let trimmed = base_url.trim_end_matches('/');
        let base = Url::parse(trimmed).map_err(|e| {
            AppError::Configuration(format!("Invalid base URL '{}': {}", base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(AppError::Configuration(format!(
                "Base URL '{}' cannot carry a path",
                base_url
            )));
        }
        Ok(Self { base })
    }

    fn base_str(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    fn join(&self, segments: &[&str]) -> String {
        let mut out = self.base_str().to_string();
        for segment in segments {
            out.push('/');
            out.extend(utf8_percent_encode(segment, SEGMENT));
        }
        out
    }

    /// Fetchable URL of a stored file: `{base}/files/{scheme}/{path}`.
    pub fn download_url(&self, file: &FileRecord) -> Result<String, AppError> {
        let (scheme, target) = file.scheme_and_target().ok_or_else(|| {
            AppError::Configuration(format!(
                "File {} has no stream wrapper scheme in '{}'",
                file.id, file.uri
            ))
        })?;
        let mut segments = vec!["files", scheme];
        segments.extend(target.split('/').filter(|s| !s.is_empty()));
        Ok(self.join(&segments))
    }

    /// Callback a derivative service PUTs its result to.
    pub fn destination_uri(&self, node_id: EntityId, media_type: &str, term_id: EntityId) -> String {
        self.join(&[
            "node",
            &node_id.to_string(),
            "media",
            media_type,
            "term",
            &term_id.to_string(),
        ])
    }

    pub fn parse_destination_uri(&self, uri: &str) -> Result<DestinationParts, AppError> {
        let invalid = || AppError::InvalidInput(format!("Not a derivative destination: {}", uri));

        let parsed = Url::parse(uri).map_err(|_| invalid())?;
        if parsed.origin() != self.base.origin() {
            return Err(invalid());
        }
        let base_path = self.base.path().trim_end_matches('/');
        let rest = parsed
            .path()
            .strip_prefix(base_path)
            .ok_or_else(invalid)?;

        let segments: Vec<&str> = rest.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["node", nid, "media", media_type, "term", tid] => Ok(DestinationParts {
                node_id: nid.parse().map_err(|_| invalid())?,
                media_type: percent_decode_str(media_type)
                    .decode_utf8()
                    .map_err(|_| invalid())?
                    .into_owned(),
                term_id: tid.parse().map_err(|_| invalid())?,
            }),
            _ => Err(invalid()),
        }
    }
}
