//! Keyword filter for mislabeled x-ray content in mod and resource pack
//! search results.

use crate::marketplace::{ContentType, Platform, SearchHit};

/// CurseForge project ids known to be x-ray packs listed under the wrong
/// class.
const CURSEFORGE_BLOCKLIST: [&str; 3] = ["268615", "608933", "442340"];

fn contains_xray_keywords(text: &str) -> bool {
    let text = text.to_lowercase();
    (text.contains("xray") || text.contains("x-ray"))
        && (text.contains("ultimate") || text.contains("reloaded") || text.contains("pack"))
}

fn is_blocked(hit: &SearchHit) -> bool {
    if contains_xray_keywords(&hit.title) || contains_xray_keywords(&hit.description) {
        return true;
    }
    hit.platform == Platform::CurseForge && CURSEFORGE_BLOCKLIST.contains(&hit.id.as_str())
}

/// Drop blocked hits from a mod or resource pack result page. Modpack
/// searches pass through untouched.
pub fn retain_clean_hits(content_type: ContentType, hits: &mut Vec<SearchHit>) {
    if content_type == ContentType::Modpack {
        return;
    }
    hits.retain(|hit| {
        let blocked = is_blocked(hit);
        if blocked {
            log::debug!("Filtered blocked search hit: {} ({})", hit.title, hit.id);
        }
        !blocked
    });
}
