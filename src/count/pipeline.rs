//! Hit ingestion: from one beacon request to a stored hit or a rejection
//!
//! Stages run strictly in order and any of them may end the request:
//!
//! 1. bot classification (prefetch requests stop here)
//! 2. client IP resolution
//! 3. IP ignore list
//! 4. location and language enrichment, when the site collects them
//! 5. payload decoding, reserved bot code and path length checks
//! 6. merge onto the hit, backend bot override
//! 7. strict validation
//! 8. hand-off to the sink

use axum::extract::Query;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, trace};

use super::error::HitError;
use super::response::pixel;
use crate::analytics::geoip::country_only;
use crate::analytics::{
    extract_client_ip, preferred_language, BotClass, BotClassifier, Geolocator, HitSink,
};
use crate::models::{Hit, HitPayload, Site, MAX_PATH_LEN};

/// The parts of an HTTP request the pipeline looks at
#[derive(Debug, Clone, Copy)]
pub struct BeaconRequest<'a> {
    /// Peer address of the connection
    pub connection_addr: &'a str,
    pub headers: &'a HeaderMap,
    pub uri: &'a Uri,
    pub body: &'a [u8],
}

/// Terminal outcomes that aren't rejections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The hit was handed to the sink
    Recorded,
    /// Speculative browser preload; nothing was looked at
    Prefetch,
    /// The client IP matched the site's ignore list
    Ignored { rule: String },
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Recorded | Outcome::Prefetch => StatusCode::OK,
            Outcome::Ignored { .. } => StatusCode::ACCEPTED,
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match &self {
            Outcome::Ignored { rule } => pixel(
                self.status(),
                Some(&format!("ignored because {rule:?} is in the IP ignore list")),
            ),
            _ => pixel(self.status(), None),
        }
    }
}

/// The ingestion pipeline and its collaborators. Holds no per-request
/// state; one instance serves every request.
pub struct Pipeline {
    classifier: Arc<dyn BotClassifier>,
    geolocator: Arc<dyn Geolocator>,
    sink: Arc<dyn HitSink>,
}

impl Pipeline {
    pub fn new(
        classifier: Arc<dyn BotClassifier>,
        geolocator: Arc<dyn Geolocator>,
        sink: Arc<dyn HitSink>,
    ) -> Self {
        Self {
            classifier,
            geolocator,
            sink,
        }
    }

    /// Run one request through every stage for `site`
    pub fn process(&self, site: &Site, req: &BeaconRequest<'_>) -> Result<Outcome, HitError> {
        let bot = self.classifier.classify(req.headers);
        if bot == BotClass::Prefetch {
            return Ok(Outcome::Prefetch);
        }

        let client_ip = extract_client_ip(req.headers, req.connection_addr);

        if let Some(rule) = site.settings.ignored_ip(&client_ip) {
            debug!(site = site.id, ip = %client_ip, "hit from ignored IP");
            return Ok(Outcome::Ignored {
                rule: rule.to_string(),
            });
        }

        let user_agent = req
            .headers
            .get(header::USER_AGENT)
            .map(|h| String::from_utf8_lossy(h.as_bytes()).into_owned())
            .unwrap_or_default();

        let mut hit = Hit::new(site.id, client_ip, user_agent, Utc::now());

        let collect = site.settings.collect;
        if collect.location {
            hit.location = self.geolocator.lookup(&hit.remote_addr).map(|loc| {
                if collect.location_region {
                    loc
                } else {
                    country_only(&loc).to_string()
                }
            });
        }
        if collect.language {
            hit.language = preferred_language(req.headers);
        }

        let payload = decode_payload(req.uri, req.body)?;
        if let Some(code) = payload.reserved_bot() {
            return Err(HitError::InvalidBotCode(code));
        }
        if payload.path_len() > MAX_PATH_LEN {
            return Err(HitError::OversizedPath(payload.path_len()));
        }
        hit.merge(payload);

        // The backend only ever overrides a positive detection; a client
        // claiming "not a bot" is otherwise taken at its word.
        if let Some(kind) = bot.kind() {
            hit.bot = kind.code();
        }

        hit.validate(true)?;

        trace!(site = site.id, path = %hit.path, bot = hit.bot, "hit recorded");
        self.sink.append(hit);
        Ok(Outcome::Recorded)
    }
}

/// Decode query parameters, then overlay a JSON body if there is one.
///
/// GET requests normally carry everything in the query string; an empty
/// body is not an error.
fn decode_payload(uri: &Uri, body: &[u8]) -> Result<HitPayload, HitError> {
    let from_query = match uri.query() {
        Some(q) if !q.is_empty() => Query::<HitPayload>::try_from_uri(uri)
            .map(|Query(p)| p)
            .map_err(|e| HitError::BodyDecode(e.body_text()))?,
        _ => HitPayload::default(),
    };

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(from_query);
    }

    let from_body: HitPayload =
        serde_json::from_slice(body).map_err(|e| HitError::BodyDecode(e.to_string()))?;

    Ok(from_query.overlay(from_body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{BotKind, UserAgentClassifier};
    use crate::count::response::DIAGNOSTIC_HEADER;
    use crate::models::{Collect, SiteSettings};
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const FIREFOX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

    #[derive(Default)]
    struct RecordingSink {
        hits: Mutex<Vec<Hit>>,
    }

    impl RecordingSink {
        fn hits(&self) -> Vec<Hit> {
            self.hits.lock().unwrap().clone()
        }
    }

    impl HitSink for RecordingSink {
        fn append(&self, hit: Hit) {
            self.hits.lock().unwrap().push(hit);
        }
    }

    /// Returns a fixed location and counts how often it was asked
    #[derive(Default)]
    struct SpyGeolocator {
        calls: AtomicUsize,
        last_ip: Mutex<Option<String>>,
    }

    impl Geolocator for SpyGeolocator {
        fn lookup(&self, ip: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_ip.lock().unwrap() = Some(ip.to_string());
            Some("US-CA".to_string())
        }
    }

    struct FixedClassifier(BotClass);

    impl BotClassifier for FixedClassifier {
        fn classify(&self, _headers: &HeaderMap) -> BotClass {
            self.0
        }
    }

    struct Harness {
        pipeline: Pipeline,
        sink: Arc<RecordingSink>,
        geo: Arc<SpyGeolocator>,
    }

    fn harness_with(classifier: Arc<dyn BotClassifier>) -> Harness {
        let sink = Arc::new(RecordingSink::default());
        let geo = Arc::new(SpyGeolocator::default());
        let pipeline = Pipeline::new(classifier, geo.clone(), sink.clone());
        Harness {
            pipeline,
            sink,
            geo,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(UserAgentClassifier::new()))
    }

    fn site(settings: SiteSettings) -> Site {
        Site {
            id: 7,
            host: "stats.example.com".to_string(),
            settings,
            created_at: 0,
        }
    }

    fn browser_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(FIREFOX));
        headers
    }

    fn run(h: &Harness, site: &Site, headers: &HeaderMap, uri: &str, body: &str) -> Result<Outcome, HitError> {
        let uri: Uri = uri.parse().unwrap();
        h.pipeline.process(
            site,
            &BeaconRequest {
                connection_addr: "192.0.2.10",
                headers,
                uri: &uri,
                body: body.as_bytes(),
            },
        )
    }

    #[test]
    fn test_records_hit_from_json_body() {
        let h = harness();
        let site = site(SiteSettings::default());

        let outcome = run(&h, &site, &browser_headers(), "/count", r#"{"p": "/docs", "t": "Docs"}"#).unwrap();

        assert_eq!(outcome, Outcome::Recorded);
        let hits = h.sink.hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].site(), 7);
        assert_eq!(hits[0].path, "/docs");
        assert_eq!(hits[0].title, "Docs");
        assert_eq!(hits[0].remote_addr, "192.0.2.10");
        assert_eq!(hits[0].user_agent, FIREFOX);
        assert_eq!(hits[0].bot, 0);
    }

    #[test]
    fn test_records_hit_from_query_string() {
        let h = harness();
        let site = site(SiteSettings::default());

        let outcome = run(&h, &site, &browser_headers(), "/count?p=%2Fblog&r=https%3A%2F%2Fref.test&s=1920,1080,1&e=false", "").unwrap();

        assert_eq!(outcome, Outcome::Recorded);
        let hit = &h.sink.hits()[0];
        assert_eq!(hit.path, "/blog");
        assert_eq!(hit.referrer, "https://ref.test");
        assert_eq!(hit.size, vec![1920.0, 1080.0, 1.0]);
        assert!(!hit.event);
    }

    #[test]
    fn test_body_overrides_query() {
        let h = harness();
        let site = site(SiteSettings::default());

        run(&h, &site, &browser_headers(), "/count?p=%2Fquery&t=Q", r#"{"p": "/body"}"#).unwrap();

        let hit = &h.sink.hits()[0];
        assert_eq!(hit.path, "/body");
        assert_eq!(hit.title, "Q");
    }

    #[test]
    fn test_prefetch_skips_everything() {
        let h = harness();
        let site = site(SiteSettings {
            ignore_ips: vec!["192.0.2.10".to_string()],
            collect: Collect::default(),
        });
        let mut headers = browser_headers();
        headers.insert("purpose", HeaderValue::from_static("prefetch"));

        // Even an undecodable body isn't looked at
        let outcome = run(&h, &site, &headers, "/count", "{not json").unwrap();

        assert_eq!(outcome, Outcome::Prefetch);
        assert_eq!(h.geo.calls.load(Ordering::SeqCst), 0);
        assert!(h.sink.hits().is_empty());
    }

    #[test]
    fn test_ignored_ip() {
        let h = harness();
        let site = site(SiteSettings {
            ignore_ips: vec!["198.51.100.1".to_string()],
            collect: Collect::default(),
        });
        let mut headers = browser_headers();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1, 198.51.100.1"));

        let outcome = run(&h, &site, &headers, "/count", r#"{"p": "/"}"#).unwrap();

        assert_eq!(
            outcome,
            Outcome::Ignored {
                rule: "198.51.100.1".to_string()
            }
        );
        assert_eq!(outcome.status(), StatusCode::ACCEPTED);
        assert_eq!(h.geo.calls.load(Ordering::SeqCst), 0);
        assert!(h.sink.hits().is_empty());
    }

    #[test]
    fn test_reserved_bot_codes_rejected() {
        let h = harness();
        let site = site(SiteSettings::default());

        for code in [1, 42, 149] {
            let body = format!(r#"{{"p": "/", "b": {code}}}"#);
            let err = run(&h, &site, &browser_headers(), "/count", &body).unwrap_err();
            assert!(matches!(err, HitError::InvalidBotCode(c) if c == code));
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        assert!(h.sink.hits().is_empty());
    }

    #[test]
    fn test_accepted_bot_codes() {
        let h = harness();
        let site = site(SiteSettings::default());

        for code in [0, 150, 153, 1000] {
            let body = format!(r#"{{"p": "/", "b": {code}}}"#);
            assert_eq!(
                run(&h, &site, &browser_headers(), "/count", &body).unwrap(),
                Outcome::Recorded
            );
        }

        let codes: Vec<i64> = h.sink.hits().iter().map(|hit| hit.bot).collect();
        assert_eq!(codes, [0, 150, 153, 1000]);
    }

    #[test]
    fn test_oversized_path() {
        let h = harness();
        let site = site(SiteSettings::default());
        let body = format!(r#"{{"p": "/{}"}}"#, "a".repeat(2048));

        let err = run(&h, &site, &browser_headers(), "/count", &body).unwrap_err();

        assert!(matches!(err, HitError::OversizedPath(2049)));
        assert_eq!(err.status(), StatusCode::URI_TOO_LONG);
        assert!(h.sink.hits().is_empty());
    }

    #[test]
    fn test_path_at_limit_is_accepted() {
        let h = harness();
        let site = site(SiteSettings::default());
        let body = format!(r#"{{"p": "/{}"}}"#, "a".repeat(2047));

        assert_eq!(
            run(&h, &site, &browser_headers(), "/count", &body).unwrap(),
            Outcome::Recorded
        );
    }

    #[test]
    fn test_decode_error() {
        let h = harness();
        let site = site(SiteSettings::default());

        let err = run(&h, &site, &browser_headers(), "/count", r#"{"p": 12"#).unwrap_err();
        assert!(matches!(err, HitError::BodyDecode(_)));
        assert!(err.to_string().starts_with("error decoding parameters: "));

        let err = run(&h, &site, &browser_headers(), "/count?b=abc", "").unwrap_err();
        assert!(matches!(err, HitError::BodyDecode(_)));
    }

    #[test]
    fn test_validation_error() {
        let h = harness();
        let site = site(SiteSettings::default());

        let err = run(&h, &site, &browser_headers(), "/count", r#"{"t": "no path"}"#).unwrap_err();

        match err {
            HitError::Validation(e) => assert!(e.has("path")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(h.sink.hits().is_empty());
    }

    #[test]
    fn test_backend_bot_overrides_client() {
        let h = harness_with(Arc::new(FixedClassifier(BotClass::Bot(BotKind::KnownBot))));
        let site = site(SiteSettings::default());

        run(&h, &site, &browser_headers(), "/count", r#"{"p": "/"}"#).unwrap();
        run(&h, &site, &browser_headers(), "/count", r#"{"p": "/", "b": 0}"#).unwrap();
        run(&h, &site, &browser_headers(), "/count", r#"{"p": "/", "b": 151}"#).unwrap();

        for hit in h.sink.hits() {
            assert_eq!(hit.bot, BotKind::KnownBot.code());
        }
    }

    #[test]
    fn test_reserved_code_rejected_even_when_backend_detects_bot() {
        let h = harness_with(Arc::new(FixedClassifier(BotClass::Bot(BotKind::Boty))));
        let site = site(SiteSettings::default());

        let err = run(&h, &site, &browser_headers(), "/count", r#"{"p": "/", "b": 3}"#).unwrap_err();
        assert!(matches!(err, HitError::InvalidBotCode(3)));
    }

    #[test]
    fn test_client_not_a_bot_trusted_when_backend_inconclusive() {
        let h = harness_with(Arc::new(FixedClassifier(BotClass::NoBot)));
        let site = site(SiteSettings::default());

        run(&h, &site, &browser_headers(), "/count", r#"{"p": "/", "b": 0}"#).unwrap();
        assert_eq!(h.sink.hits()[0].bot, 0);
    }

    #[test]
    fn test_enrichment_enabled() {
        let h = harness();
        let site = site(SiteSettings::default());
        let mut headers = browser_headers();
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.9"));

        run(&h, &site, &headers, "/count", r#"{"p": "/"}"#).unwrap();

        let hit = &h.sink.hits()[0];
        assert_eq!(hit.location.as_deref(), Some("US-CA"));
        assert_eq!(hit.language.as_deref(), Some("eng"));
        assert_eq!(h.geo.last_ip.lock().unwrap().as_deref(), Some("192.0.2.10"));
    }

    #[test]
    fn test_enrichment_disabled() {
        let h = harness();
        let site = site(SiteSettings {
            ignore_ips: vec![],
            collect: Collect {
                location: false,
                location_region: true,
                language: false,
            },
        });
        let mut headers = browser_headers();
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB"));

        run(&h, &site, &headers, "/count", r#"{"p": "/"}"#).unwrap();

        let hit = &h.sink.hits()[0];
        assert_eq!(hit.location, None);
        assert_eq!(hit.language, None);
        assert_eq!(h.geo.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_location_without_region() {
        let h = harness();
        let site = site(SiteSettings {
            ignore_ips: vec![],
            collect: Collect {
                location: true,
                location_region: false,
                language: true,
            },
        });

        run(&h, &site, &browser_headers(), "/count", r#"{"p": "/"}"#).unwrap();
        assert_eq!(h.sink.hits()[0].location.as_deref(), Some("US"));
    }

    #[test]
    fn test_client_cannot_set_server_fields() {
        let h = harness();
        let site = site(SiteSettings::default());

        run(
            &h,
            &site,
            &browser_headers(),
            "/count",
            r#"{"p": "/", "site": 1, "location": "NL", "language": "fra", "remote_addr": "1.1.1.1"}"#,
        )
        .unwrap();

        let hit = &h.sink.hits()[0];
        assert_eq!(hit.site(), 7);
        assert_eq!(hit.location.as_deref(), Some("US-CA"));
        assert_eq!(hit.language, None);
        assert_eq!(hit.remote_addr, "192.0.2.10");
    }

    #[test]
    fn test_outcome_responses() {
        let ignored = Outcome::Ignored {
            rule: "10.0.0.1".to_string(),
        }
        .into_response();
        assert_eq!(ignored.status(), StatusCode::ACCEPTED);
        assert_eq!(
            ignored.headers()[DIAGNOSTIC_HEADER],
            "ignored because \"10.0.0.1\" is in the IP ignore list"
        );

        let recorded = Outcome::Recorded.into_response();
        assert_eq!(recorded.status(), StatusCode::OK);
        assert!(recorded.headers().get(DIAGNOSTIC_HEADER).is_none());

        let prefetch = Outcome::Prefetch.into_response();
        assert_eq!(prefetch.status(), StatusCode::OK);
        assert!(prefetch.headers().get(DIAGNOSTIC_HEADER).is_none());
    }

    #[test]
    fn test_long_user_agent_is_recorded() {
        let h = harness();
        let site = site(SiteSettings::default());

        // In-app browsers append long app tokens to the Chrome UA
        let ua = format!(
            "Mozilla/5.0 (Linux; Android 14; Pixel 8 Build/AP2A.240805.005; wv) \
             AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/127.0.6533.103 \
             Mobile Safari/537.36 [FB_IAB/FB4A;FBAV/478.0.0.41.86;{}]",
            "FBDM/{density=2.625,width=1080,height=2400};".repeat(8)
        );
        assert!(ua.len() > 512);

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_str(&ua).unwrap());

        let outcome = run(&h, &site, &headers, "/count", r#"{"p": "/"}"#).unwrap();

        assert_eq!(outcome, Outcome::Recorded);
        assert_eq!(h.sink.hits()[0].user_agent, ua);
    }
}
