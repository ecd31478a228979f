//! `Accept-Language` parsing
//!
//! Only the base language of the highest weighted tag is kept, and only
//! when it is known with confidence.

use axum::http::{header, HeaderMap};
use isolang::Language;

/// How certain the base language of a tag is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    No,
    Low,
    High,
    Exact,
}

/// Most likely language for a region, as ISO 639-1
const LIKELY_BY_REGION: &[(&str, &str)] = &[
    ("419", "es"),
    ("AR", "es"),
    ("AT", "de"),
    ("AU", "en"),
    ("BE", "nl"),
    ("BR", "pt"),
    ("CA", "en"),
    ("CH", "de"),
    ("CN", "zh"),
    ("CO", "es"),
    ("CZ", "cs"),
    ("DE", "de"),
    ("DK", "da"),
    ("EG", "ar"),
    ("ES", "es"),
    ("FI", "fi"),
    ("FR", "fr"),
    ("GB", "en"),
    ("GR", "el"),
    ("HK", "zh"),
    ("ID", "id"),
    ("IE", "en"),
    ("IL", "he"),
    ("IN", "hi"),
    ("IR", "fa"),
    ("IT", "it"),
    ("JP", "ja"),
    ("KR", "ko"),
    ("MX", "es"),
    ("NL", "nl"),
    ("NO", "nb"),
    ("NZ", "en"),
    ("PL", "pl"),
    ("PT", "pt"),
    ("RU", "ru"),
    ("SA", "ar"),
    ("SE", "sv"),
    ("TH", "th"),
    ("TR", "tr"),
    ("TW", "zh"),
    ("UA", "uk"),
    ("US", "en"),
    ("VN", "vi"),
];

/// Most likely language for a script, as ISO 639-1
const LIKELY_BY_SCRIPT: &[(&str, &str)] = &[
    ("arab", "ar"),
    ("armn", "hy"),
    ("beng", "bn"),
    ("cyrl", "ru"),
    ("deva", "hi"),
    ("geor", "ka"),
    ("grek", "el"),
    ("hang", "ko"),
    ("hans", "zh"),
    ("hant", "zh"),
    ("hebr", "he"),
    ("hira", "ja"),
    ("jpan", "ja"),
    ("kana", "ja"),
    ("kore", "ko"),
    ("latn", "en"),
    ("thai", "th"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct LanguageTag {
    pub tag: String,
    pub weight: f32,
}

impl LanguageTag {
    /// Base language of the tag and how sure we are about it.
    ///
    /// An explicit language subtag is `Exact`. For `und` the language is
    /// inferred from a region or script subtag with `High` confidence;
    /// a bare `und` or `*` is `Low`.
    pub fn base(&self) -> (Option<Language>, Confidence) {
        let mut subtags = self.tag.split(['-', '_']);
        let primary = subtags.next().unwrap_or("").to_ascii_lowercase();

        match primary.as_str() {
            "und" => match infer_language(subtags) {
                Some(lang) => (Some(lang), Confidence::High),
                None => (None, Confidence::Low),
            },
            "" | "*" => (None, Confidence::Low),
            p if p.len() == 2 => match Language::from_639_1(p) {
                Some(lang) => (Some(lang), Confidence::Exact),
                None => (None, Confidence::No),
            },
            p if p.len() == 3 => match Language::from_639_3(p) {
                Some(lang) => (Some(lang), Confidence::Exact),
                None => (None, Confidence::No),
            },
            _ => (None, Confidence::No),
        }
    }
}

/// Likely language from the subtags after `und`; a region wins over a script
fn infer_language<'a>(subtags: impl Iterator<Item = &'a str>) -> Option<Language> {
    let mut region = None;
    let mut script = None;

    for subtag in subtags {
        let is_alpha = subtag.bytes().all(|b| b.is_ascii_alphabetic());
        let is_digit = subtag.bytes().all(|b| b.is_ascii_digit());
        match subtag.len() {
            2 if is_alpha && region.is_none() => region = Some(subtag.to_ascii_uppercase()),
            3 if is_digit && region.is_none() => region = Some(subtag.to_string()),
            4 if is_alpha && script.is_none() => script = Some(subtag.to_ascii_lowercase()),
            _ => {}
        }
    }

    let likely = |table: &[(&str, &'static str)], key: Option<String>| {
        let key = key?;
        table
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, code)| Language::from_639_1(code))
    };

    likely(LIKELY_BY_REGION, region).or_else(|| likely(LIKELY_BY_SCRIPT, script))
}

/// Parse an `Accept-Language` value into tags ordered by weight, highest
/// first. Entries with `q=0` are dropped and equal weights keep their
/// header order. A malformed or out-of-range weight invalidates the whole
/// header.
pub fn parse_accept_language(value: &str) -> Option<Vec<LanguageTag>> {
    let mut tags = Vec::new();

    for entry in value.split(',') {
        let mut parts = entry.split(';');
        let tag = parts.next().unwrap_or("").trim();
        if tag.is_empty() {
            continue;
        }

        let mut weight = 1.0_f32;
        for param in parts {
            let param = param.trim();
            if let Some(q) = param.strip_prefix("q=").or_else(|| param.strip_prefix("Q=")) {
                weight = q
                    .trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|w| (0.0..=1.0).contains(w))?;
            }
        }
        if weight == 0.0 {
            continue;
        }

        tags.push(LanguageTag {
            tag: tag.to_string(),
            weight,
        });
    }

    tags.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    Some(tags)
}

/// ISO 639-3 code of the preferred language, if it is known with `Exact`
/// or `High` confidence.
pub fn preferred_language(headers: &HeaderMap) -> Option<String> {
    let value = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|h| h.to_str().ok())?;

    let first = parse_accept_language(value)?.into_iter().next()?;
    match first.base() {
        (Some(lang), Confidence::Exact | Confidence::High) => Some(lang.to_639_3().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_parse_orders_by_weight() {
        let tags = parse_accept_language("fr;q=0.5, en-GB, de;q=0.8").unwrap();
        let order: Vec<&str> = tags.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(order, ["en-GB", "de", "fr"]);
    }

    #[test]
    fn test_parse_keeps_order_for_equal_weights() {
        let tags = parse_accept_language("nl, en").unwrap();
        assert_eq!(tags[0].tag, "nl");
        assert_eq!(tags[1].tag, "en");
    }

    #[test]
    fn test_parse_drops_zero_weights() {
        let tags = parse_accept_language("en;q=0, es;q=0.3").unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].tag, "es");
    }

    #[test]
    fn test_malformed_weight_rejects_header() {
        assert!(parse_accept_language("en;q=abc, fr").is_none());
        assert!(parse_accept_language("de;q=2, es;q=0.3").is_none());
        assert_eq!(preferred_language(&accept("en;q=abc, fr")), None);
    }

    #[test]
    fn test_base_confidence() {
        let tag = |t: &str| LanguageTag {
            tag: t.to_string(),
            weight: 1.0,
        };

        assert_eq!(tag("en-GB").base().1, Confidence::Exact);
        assert_eq!(tag("nld").base().1, Confidence::Exact);
        assert_eq!(tag("*").base().1, Confidence::Low);
        assert_eq!(tag("und").base().1, Confidence::Low);
        assert_eq!(tag("und-US").base(), (Some(Language::Eng), Confidence::High));
        assert_eq!(tag("und-Hant").base(), (Some(Language::Zho), Confidence::High));
        assert_eq!(tag("und-Cyrl-UA").base().0, Some(Language::Ukr));
        assert_eq!(tag("und-ZZ").base().1, Confidence::Low);
        assert_eq!(tag("qq").base().1, Confidence::No);
    }

    #[test]
    fn test_preferred_language() {
        assert_eq!(preferred_language(&accept("en-GB")).as_deref(), Some("eng"));
        assert_eq!(
            preferred_language(&accept("nl-NL,nl;q=0.9,en;q=0.8")).as_deref(),
            Some("nld")
        );
        assert_eq!(preferred_language(&accept("und-US")).as_deref(), Some("eng"));
        assert_eq!(preferred_language(&accept("und-Hant")).as_deref(), Some("zho"));
        assert_eq!(preferred_language(&accept("und")), None);
        assert_eq!(preferred_language(&accept("*")), None);
        assert_eq!(preferred_language(&accept("")), None);
        assert_eq!(preferred_language(&HeaderMap::new()), None);
    }
}
