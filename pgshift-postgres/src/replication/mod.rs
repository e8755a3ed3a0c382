pub mod naming;
pub mod publication;
pub mod role;
pub mod subscription;

pub use naming::{
    MAX_OBJECT_NAME_LENGTH, NamingError, PUBLICATION_PREFIX, SUBSCRIPTION_PREFIX,
    publication_name, session_started_at, subscription_lookup_pattern, subscription_name, unique_session_name,
};
