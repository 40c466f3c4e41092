//! Database models, one file per aggregate, re-exported at `crate::db::models`.

pub mod engagement;
pub mod grant;
pub mod privacy;
pub mod record;
pub mod resident;

pub use self::engagement::*;
pub use self::grant::*;
pub use self::privacy::*;
pub use self::record::*;
pub use self::resident::*;
