pub(crate) mod health;
pub(crate) mod responses;
pub(crate) mod templates;
pub(crate) mod users;
