pub mod hit;
pub mod site;
pub mod validate;

pub use hit::{Hit, HitPayload, MAX_PATH_LEN};
pub use site::{Collect, Site, SiteId, SiteSettings};
pub use validate::{ValidationError, Validator};
