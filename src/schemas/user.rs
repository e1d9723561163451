use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::User;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UserCreate {
    #[validate(length(min = 3, max = 64, message = "username must be 3-64 characters"))]
    pub(crate) username: String,
    #[serde(default)]
    #[serde(alias = "fullName")]
    #[validate(length(max = 200, message = "full_name is too long"))]
    pub(crate) full_name: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters long"))]
    pub(crate) password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserLogin {
    pub(crate) username: String,
    pub(crate) password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) is_admin: bool,
    pub(crate) is_active: bool,
    pub(crate) completed_all: bool,
    pub(crate) completed_at: Option<String>,
    pub(crate) total_score: i64,
    pub(crate) total_time: f64,
    pub(crate) created_at: String,
}

impl UserResponse {
    pub(crate) fn from_db(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            is_admin: user.is_admin,
            is_active: user.is_active,
            completed_all: user.completed_all,
            completed_at: user.completed_at.map(format_primitive),
            total_score: user.total_score,
            total_time: user.total_time,
            created_at: format_primitive(user.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_payload_is_validated() {
        let ok: UserCreate = serde_json::from_value(serde_json::json!({
            "username": "student1",
            "fullName": "Ada Student",
            "password": "long-enough"
        }))
        .expect("payload");
        assert!(ok.validate().is_ok());
        assert_eq!(ok.full_name, "Ada Student");

        let short = UserCreate {
            username: "ab".to_string(),
            full_name: String::new(),
            password: "short".to_string(),
        };
        let errors = short.validate().expect_err("invalid");
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("password"));
    }
}
