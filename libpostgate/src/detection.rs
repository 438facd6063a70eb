//! Post type detection and media ambiguity validation
//!
//! Both use the same total order over media fields, highest first:
//! `media[]` → `document` → `audio` → `video` → `cover`. Richer media wins,
//! and since detection and the ambiguity gate share the order they never
//! disagree about precedence.

use crate::error::ValidationError;
use crate::types::{PostRequest, PostType};

/// Single-value media fields in priority order, with the type each implies
pub const MEDIA_PRIORITY: [(&str, PostType); 4] = [
    ("document", PostType::Document),
    ("audio", PostType::Audio),
    ("video", PostType::Video),
    ("cover", PostType::Image),
];

/// Compute the effective post type of a request
///
/// An explicit non-AUTO type is returned unchanged, without checking it
/// against the populated fields.
pub fn detect_type(request: &PostRequest) -> PostType {
    if request.post_type != PostType::Auto {
        return request.post_type;
    }

    if request.has_album() {
        return PostType::Album;
    }

    MEDIA_PRIORITY
        .iter()
        .find(|(field, _)| request.media_field(field).is_some())
        .map(|(_, post_type)| *post_type)
        .unwrap_or(PostType::Post)
}

/// Reject requests that populate two single-value media fields at once
///
/// Only applies to AUTO requests, and a non-empty `media[]` bypasses the
/// check entirely. Pairs are scanned in priority order and only the first
/// conflicting pair is reported.
pub fn validate_media_ambiguity(request: &PostRequest) -> Result<(), ValidationError> {
    if request.post_type != PostType::Auto || request.has_album() {
        return Ok(());
    }

    for (i, &(first, _)) in MEDIA_PRIORITY.iter().enumerate() {
        if request.media_field(first).is_none() {
            continue;
        }
        for &(second, _) in &MEDIA_PRIORITY[i + 1..] {
            if request.media_field(second).is_some() {
                return Err(ValidationError::AmbiguousMedia { first, second });
            }
        }
    }

    Ok(())
}

/// A request needs a non-blank body or at least one populated media field
pub fn validate_content(request: &PostRequest) -> Result<(), ValidationError> {
    let has_media = request.has_album()
        || MEDIA_PRIORITY
            .iter()
            .any(|(field, _)| request.media_field(field).is_some());

    if request.body_text().is_none() && !has_media {
        return Err(ValidationError::MissingContent);
    }
    Ok(())
}
