pub mod engagement;
pub mod grants;
pub mod privacy_settings;
pub mod record;
pub mod resident;

pub use engagement::EngagementRepository;
pub use grants::GrantRepository;
pub use privacy_settings::PrivacySettingsRepository;
pub use record::RecordRepository;
pub use resident::ResidentRepository;
