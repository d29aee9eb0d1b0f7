//! Karma assigned to an upload at creation time.

use crate::models::upload::MediaKind;

const BASE_KARMA: i64 = 10;
const LINK_BASE_KARMA: i64 = 5;
const FIRST_UPLOAD_BONUS: i64 = 5;
const DESCRIPTION_BONUS: i64 = 5;
const MOTION_BONUS: i64 = 10;

/// Score a new upload.
///
/// Links start from a lower base; videos and GIFs earn a motion bonus.
/// Bonuses are additive, so their order does not matter.
pub fn calculate_karma(kind: MediaKind, has_description: bool, is_first_upload: bool) -> i64 {
    let mut karma = match kind {
        MediaKind::Link => LINK_BASE_KARMA,
        _ => BASE_KARMA,
    };
    if is_first_upload {
        karma += FIRST_UPLOAD_BONUS;
    }
    if has_description {
        karma += DESCRIPTION_BONUS;
    }
    if matches!(kind, MediaKind::Video | MediaKind::Gif) {
        karma += MOTION_BONUS;
    }
    karma
}
