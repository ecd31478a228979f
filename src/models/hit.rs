use chrono::{DateTime, Duration, Utc};
use serde::{de, Deserialize, Deserializer};

use super::site::SiteId;
use super::validate::{ValidationError, Validator};

/// Hard limit on the path length in bytes
pub const MAX_PATH_LEN: usize = 2048;

/// Client bot codes in this range are never valid; they indicate a broken
/// tracking snippet rather than a bot.
pub const RESERVED_BOT_CODES: std::ops::RangeInclusive<i64> = 1..=149;

const MAX_TITLE_LEN: usize = 1024;
const MAX_REF_LEN: usize = 2048;
const MAX_QUERY_LEN: usize = 2048;
const MAX_SIZE_ENTRIES: usize = 3;

/// A single pageview or event, assembled per request
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    site: SiteId,
    pub remote_addr: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub path: String,
    pub title: String,
    pub referrer: String,
    pub query: String,
    pub event: bool,
    pub size: Vec<f64>,
    /// 0 = unknown, >= 150 = bot category
    pub bot: i64,
    pub location: Option<String>,
    pub language: Option<String>,
}

/// Fields the tracking snippet may send, either as query parameters or as
/// a JSON body. Unrecognized keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HitPayload {
    #[serde(default, rename = "p", alias = "path")]
    pub path: Option<String>,
    #[serde(default, rename = "t", alias = "title")]
    pub title: Option<String>,
    #[serde(default, rename = "r", alias = "ref")]
    pub referrer: Option<String>,
    #[serde(default, rename = "q", alias = "query")]
    pub query: Option<String>,
    #[serde(
        default,
        rename = "e",
        alias = "event",
        deserialize_with = "deserialize_flag"
    )]
    pub event: Option<bool>,
    #[serde(
        default,
        rename = "s",
        alias = "size",
        deserialize_with = "deserialize_size"
    )]
    pub size: Option<Vec<f64>>,
    #[serde(default, rename = "b", alias = "bot")]
    pub bot: Option<i64>,
}

impl Hit {
    /// Start a hit bound to `site`; the site can't be changed afterwards.
    pub fn new(
        site: SiteId,
        remote_addr: String,
        user_agent: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            site,
            remote_addr,
            user_agent,
            created_at,
            path: String::new(),
            title: String::new(),
            referrer: String::new(),
            query: String::new(),
            event: false,
            size: Vec::new(),
            bot: 0,
            location: None,
            language: None,
        }
    }

    pub fn site(&self) -> SiteId {
        self.site
    }

    /// Apply client-supplied values on top of what the server computed.
    ///
    /// | field                                   | source |
    /// |-----------------------------------------|--------|
    /// | site, remote_addr, user_agent           | server |
    /// | created_at, location, language          | server |
    /// | path, title, referrer, query, event     | client |
    /// | size, bot                               | client |
    ///
    /// Client fields replace the current value only when present.
    pub fn merge(&mut self, payload: HitPayload) {
        if let Some(path) = payload.path {
            self.path = path;
        }
        if let Some(title) = payload.title {
            self.title = title;
        }
        if let Some(referrer) = payload.referrer {
            self.referrer = referrer;
        }
        if let Some(query) = payload.query {
            self.query = query;
        }
        if let Some(event) = payload.event {
            self.event = event;
        }
        if let Some(size) = payload.size {
            self.size = size;
        }
        if let Some(bot) = payload.bot {
            self.bot = bot;
        }
    }

    /// Check the assembled hit. `strict` also requires every field that
    /// must be present before the hit can be stored.
    pub fn validate(&self, strict: bool) -> Result<(), ValidationError> {
        let mut v = Validator::new();

        if self.site <= 0 {
            v.append("site", "must be set");
        }

        if strict {
            v.required("remote_addr", &self.remote_addr);
            v.required("path", &self.path);
            if self.created_at > Utc::now() + Duration::seconds(60) {
                v.append("created_at", "in the future");
            }
        }

        v.length("path", &self.path, 0, MAX_PATH_LEN);
        v.printable("path", &self.path);
        v.length("title", &self.title, 0, MAX_TITLE_LEN);
        v.length("ref", &self.referrer, 0, MAX_REF_LEN);
        v.length("query", &self.query, 0, MAX_QUERY_LEN);

        if self.bot != 0 && self.bot < 150 {
            v.append("bot", format!("invalid value {}", self.bot));
        }

        if self.size.len() > MAX_SIZE_ENTRIES {
            v.append("size", format!("at most {MAX_SIZE_ENTRIES} values"));
        } else if self.size.iter().any(|s| !s.is_finite() || *s < 0.0) {
            v.append("size", "must be finite non-negative numbers");
        }

        v.error()
    }
}

impl HitPayload {
    /// Field-wise overlay: values in `top` win over values in `self`.
    pub fn overlay(self, top: HitPayload) -> HitPayload {
        HitPayload {
            path: top.path.or(self.path),
            title: top.title.or(self.title),
            referrer: top.referrer.or(self.referrer),
            query: top.query.or(self.query),
            event: top.event.or(self.event),
            size: top.size.or(self.size),
            bot: top.bot.or(self.bot),
        }
    }

    pub fn path_len(&self) -> usize {
        self.path.as_deref().map_or(0, str::len)
    }

    /// The client bot code, if it falls in the reserved range
    pub fn reserved_bot(&self) -> Option<i64> {
        self.bot.filter(|b| RESERVED_BOT_CODES.contains(b))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagInput {
    Bool(bool),
    Int(i64),
    Text(String),
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<FlagInput>::deserialize(deserializer)? {
        None => Ok(None),
        Some(FlagInput::Bool(b)) => Ok(Some(b)),
        Some(FlagInput::Int(0)) => Ok(Some(false)),
        Some(FlagInput::Int(1)) => Ok(Some(true)),
        Some(FlagInput::Int(n)) => Err(de::Error::custom(format!("invalid flag value {n}"))),
        Some(FlagInput::Text(s)) => match s.to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "off" | "no" => Ok(Some(false)),
            "1" | "true" | "on" | "yes" => Ok(Some(true)),
            other => Err(de::Error::custom(format!("invalid flag value {other:?}"))),
        },
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeInput {
    List(Vec<f64>),
    Csv(String),
}

/// Screen size as `[width, height, scale]` or the comma-separated form
/// used in query strings.
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<SizeInput>::deserialize(deserializer)? {
        None => Ok(None),
        Some(SizeInput::List(list)) => Ok(Some(list)),
        Some(SizeInput::Csv(s)) if s.is_empty() => Ok(Some(Vec::new())),
        Some(SizeInput::Csv(s)) => s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid size {s:?}: {e}"))),
    }
}
