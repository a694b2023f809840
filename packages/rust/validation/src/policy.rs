//! Trust policy: which links and which text are good enough to store.
//!
//! Everything here is a pure predicate. The domain blocklist lives only in this
//! module; the validator and the storage read filter both call
//! [`is_trusted_link`].

use url::Url;

/// Minimum trimmed length of a title.
pub const MIN_TITLE_LEN: usize = 10;

/// Minimum trimmed length of an organization name.
pub const MIN_ORGANIZATION_LEN: usize = 3;

/// Minimum trimmed length of a description.
pub const MIN_DESCRIPTION_LEN: usize = 50;

/// Hosts that never serve a direct application page. Subdomains match too.
const BLOCKED_DOMAINS: &[&str] = &[
    // Aggregators
    "scholarships.com",
    "fastweb.com",
    "scholarshipportal.com",
    "scholars4dev.com",
    "scholarshipdb.net",
    "wemakescholars.com",
    "internationalscholarships.com",
    "studyportals.com",
    "mastersportal.com",
    "phdportal.com",
    "opportunitydesk.org",
    "opportunitiesforafricans.com",
    "afterschoolafrica.com",
    "scholarshipsads.com",
    "youthop.com",
    "bold.org",
    "niche.com",
    "unigo.com",
    // Social networks
    "facebook.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "instagram.com",
    "tiktok.com",
    "youtube.com",
    "reddit.com",
    "quora.com",
    "t.me",
    "whatsapp.com",
    // Blogging platforms
    "medium.com",
    "blogspot.com",
    "wordpress.com",
    "substack.com",
    "tumblr.com",
    "wixsite.com",
    // Sandbox / test domains
    "example.com",
    "example.org",
    "example.net",
    "test.com",
    "localhost",
];

/// Whether `url` is acceptable as a direct application link.
///
/// Rejects non-http(s) schemes, hostless or unparseable URLs, blocklisted hosts
/// (exact or subdomain, ignoring case, a trailing root dot and a leading
/// `www.`), and `.pdf` paths.
pub fn is_trusted_link(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    // A fully qualified name ("medium.com.") resolves like the bare one.
    let host = host.strip_suffix('.').unwrap_or(&host);
    let host = host.strip_prefix("www.").unwrap_or(host);

    if is_blocked_host(host) {
        return false;
    }

    !parsed.path().to_ascii_lowercase().ends_with(".pdf")
}

fn is_blocked_host(host: &str) -> bool {
    BLOCKED_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Whether `text` has at least `min_len` characters once trimmed.
pub fn is_substantive(text: &str, min_len: usize) -> bool {
    text.trim().chars().count() >= min_len
}

/// Applies the per-field floors. Returns the first field that falls short.
pub fn thin_field(title: &str, organization: &str, description: &str) -> Option<&'static str> {
    if !is_substantive(title, MIN_TITLE_LEN) {
        Some("title")
    } else if !is_substantive(organization, MIN_ORGANIZATION_LEN) {
        Some("organization")
    } else if !is_substantive(description, MIN_DESCRIPTION_LEN) {
        Some("description")
    } else {
        None
    }
}
