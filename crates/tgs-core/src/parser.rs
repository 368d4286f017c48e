//! Story URL parsing.
//!
//! Recognized shapes (any scheme or none, `t.me`/`telegram.me` with an
//! optional `www.`, host matched case-insensitively):
//!
//! * `t.me/<username>/s/<id>`
//! * `t.me/c/<channel>/<id>`
//! * `t.me/<username>/<id>` (must end the string)

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{is_username, PeerRef, StoryId};

const HOST: &str = r"(?:^|[/\s])(?:www\.)?(?:t|telegram)\.me/";
const END: &str = r"(?:[/?#\s]|$)";

struct Patterns {
    channel: Regex,
    story: Regex,
    bare: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        channel: Regex::new(&format!(r"(?i){HOST}c/(\d+)/(\d+){END}")).expect("valid regex"),
        story: Regex::new(&format!(r"(?i){HOST}@?(\w+)/s/(\d+){END}")).expect("valid regex"),
        bare: Regex::new(&format!(r"(?i){HOST}@?(\w+)/(\d+)/?$")).expect("valid regex"),
    })
}

/// Extract `(peer, story id)` from a story link. `None` when nothing matches.
pub fn parse_url(text: &str) -> Option<(PeerRef, StoryId)> {
    let text = text.trim();
    let p = patterns();

    if let Some(caps) = p.channel.captures(text) {
        let raw: i64 = caps[1].parse().ok()?;
        let id: i64 = caps[2].parse().ok()?;
        return Some((PeerRef::channel(raw)?, StoryId(id)));
    }

    for re in [&p.story, &p.bare] {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let name = &caps[1];
        if !is_username(name) {
            continue;
        }
        let id: i64 = caps[2].parse().ok()?;
        return Some((PeerRef::Username(name.to_string()), StoryId(id)));
    }

    None
}
