//! Video page URL handling: id extraction, canonical form, embedded start time.

use crate::timecode::{is_valid_timecode, seconds_to_timecode};
use url::Url;

const CANONICAL_WATCH_URL: &str = "https://www.youtube.com/watch?v=";

fn host_of(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_ascii_lowercase())
}

fn is_youtube_host(host: &str) -> bool {
    host == "youtube.com" || host.ends_with(".youtube.com")
}

fn is_short_link_host(host: &str) -> bool {
    host == "youtu.be" || host == "www.youtu.be"
}

pub fn is_youtube_url(raw: &str) -> bool {
    Url::parse(raw.trim())
        .ok()
        .and_then(|u| host_of(&u))
        .map(|h| is_youtube_host(&h) || is_short_link_host(&h))
        .unwrap_or(false)
}

/// Video id from `watch?v=`, `/shorts/<id>` and `youtu.be/<id>` links.
pub fn extract_video_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = host_of(&url)?;

    let id = if is_youtube_host(&host) {
        if let Some(rest) = url.path().strip_prefix("/shorts/") {
            rest.split('/').next().map(str::to_string)
        } else {
            url.query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned())
        }
    } else if is_short_link_host(&host) {
        url.path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_string)
    } else {
        None
    };

    id.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Drops playlist, tracking and timestamp parameters from recognised video
/// links. Anything else passes through trimmed.
pub fn normalize_video_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if !is_youtube_url(trimmed) {
        return trimmed.to_string();
    }
    match extract_video_id(trimmed) {
        Some(id) => format!("{CANONICAL_WATCH_URL}{id}"),
        None => trimmed.to_string(),
    }
}

/// Start offset carried in a `t=` or `start=` query parameter, as a timecode.
pub fn url_start_time(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let value = url
        .query_pairs()
        .find(|(k, _)| k == "t" || k == "start")
        .map(|(_, v)| v.into_owned())?;
    let seconds = parse_offset_seconds(&value)?;
    // Offsets past 99:59:59 have no timecode form.
    Some(seconds_to_timecode(seconds as f64)).filter(|t| is_valid_timecode(t))
}

/// `90`, `90s`, `1m30s`, `1h2m3s`.
fn parse_offset_seconds(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(plain) = value.parse::<u64>() {
        return Some(plain);
    }

    let mut total = 0_u64;
    let mut digits = String::new();
    for ch in value.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let n: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match ch {
            'h' | 'H' => 3600,
            'm' | 'M' => 60,
            's' | 'S' => 1,
            _ => return None,
        };
        total = total.checked_add(n.checked_mul(unit)?)?;
    }
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}
