//! User-agent based bot classification
//!
//! Runs before anything else on the hit path, so it only looks at request
//! headers and does no allocation beyond lowercasing the user agent.

use axum::http::{header, HeaderMap};

/// Backend bot categories. Codes start at 160; 150..=159 belong to the
/// tracking snippet's own client-side detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotKind {
    /// User agent contains a URL, which browsers never do
    Link,
    /// HTTP library or command-line tool
    ClientLibrary,
    /// Known crawler, headless browser or monitoring service
    KnownBot,
    /// Generic "bot", "crawler", "spider" wording
    Boty,
    /// Implausibly short user agent
    Short,
    NoUserAgent,
}

impl BotKind {
    pub const fn code(self) -> i64 {
        match self {
            BotKind::Link => 160,
            BotKind::ClientLibrary => 161,
            BotKind::KnownBot => 162,
            BotKind::Boty => 163,
            BotKind::Short => 164,
            BotKind::NoUserAgent => 165,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotClass {
    /// Nothing matched; the client's own signal is trusted
    NoBot,
    /// Browser speculative preload, never counted
    Prefetch,
    Bot(BotKind),
}

impl BotClass {
    /// The bot category when the classification is positive
    pub fn kind(self) -> Option<BotKind> {
        match self {
            BotClass::Bot(kind) => Some(kind),
            _ => None,
        }
    }
}

pub trait BotClassifier: Send + Sync {
    fn classify(&self, headers: &HeaderMap) -> BotClass;
}

const PREFETCH_HEADERS: [&str; 4] = ["purpose", "x-purpose", "sec-purpose", "x-moz"];

const MIN_USER_AGENT_LEN: usize = 10;

const CLIENT_LIBRARIES: &[&str] = &[
    "aiohttp/",
    "apache-httpclient/",
    "axios/",
    "curl/",
    "go-http-client/",
    "guzzlehttp/",
    "httpie/",
    "java/",
    "libwww-perl/",
    "node-fetch",
    "okhttp/",
    "php/",
    "python-requests/",
    "python-urllib/",
    "reqwest/",
    "ruby",
    "wget/",
];

const KNOWN_BOTS: &[&str] = &[
    "adsbot-google",
    "bingpreview",
    "chrome-lighthouse",
    "facebookexternalhit",
    "gtmetrix",
    "headlesschrome",
    "lighthouse",
    "mediapartners-google",
    "phantomjs",
    "pingdom",
    "prerender",
    "slurp",
    "uptimerobot",
    "whatsapp",
];

const BOTY_WORDS: &[&str] = &["bot", "crawl", "spider", "scrape", "archiver"];

/// Header based classifier in the spirit of the usual `isbot` rule sets
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAgentClassifier;

impl UserAgentClassifier {
    pub fn new() -> Self {
        Self
    }

    fn is_prefetch(headers: &HeaderMap) -> bool {
        PREFETCH_HEADERS.iter().any(|name| {
            headers
                .get(*name)
                .and_then(|h| h.to_str().ok())
                .map(|v| {
                    let v = v.to_ascii_lowercase();
                    v.contains("prefetch") || v.contains("preview")
                })
                .unwrap_or(false)
        })
    }

    /// Classify a raw user agent string
    pub fn classify_user_agent(user_agent: &str) -> BotClass {
        let ua = user_agent.trim();
        if ua.is_empty() {
            return BotClass::Bot(BotKind::NoUserAgent);
        }
        if ua.len() < MIN_USER_AGENT_LEN {
            return BotClass::Bot(BotKind::Short);
        }

        let ua = ua.to_ascii_lowercase();

        if ua.contains("http://") || ua.contains("https://") || ua.contains("www.") {
            return BotClass::Bot(BotKind::Link);
        }
        if CLIENT_LIBRARIES.iter().any(|lib| ua.starts_with(lib)) {
            return BotClass::Bot(BotKind::ClientLibrary);
        }
        if KNOWN_BOTS.iter().any(|bot| ua.contains(bot)) {
            return BotClass::Bot(BotKind::KnownBot);
        }
        if BOTY_WORDS.iter().any(|w| ua.contains(w)) {
            return BotClass::Bot(BotKind::Boty);
        }

        BotClass::NoBot
    }
}

impl BotClassifier for UserAgentClassifier {
    fn classify(&self, headers: &HeaderMap) -> BotClass {
        if Self::is_prefetch(headers) {
            return BotClass::Prefetch;
        }

        let ua = headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("");

        Self::classify_user_agent(ua)
    }
}
