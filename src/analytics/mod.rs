//! Hit enrichment and collection
//!
//! Everything the pixel handler consults besides site settings: bot
//! classification, client IP extraction, geolocation, language detection,
//! and the in-memory sink validated hits are handed to.

pub mod bot;
pub mod geoip;
pub mod ip_extractor;
pub mod language;
pub mod memstore;

// Re-export commonly used types
pub use bot::{BotClass, BotClassifier, BotKind, UserAgentClassifier};
pub use geoip::{GeoIpService, Geolocator, NoopGeolocator};
pub use ip_extractor::extract_client_ip;
pub use language::preferred_language;
pub use memstore::{HitSink, MemStore};
