pub mod auth;
pub mod engagement;
pub mod init;
pub mod invite_graph;
pub mod privacy;
pub mod profiles;
pub mod records;
pub mod recurrence;
pub mod rsvp_client;
pub mod series;
pub mod sync_bus;
pub mod visibility;
