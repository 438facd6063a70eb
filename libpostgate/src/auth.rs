//! Credential shape validation
//!
//! Validators only check that the merged auth map has the fields a platform
//! needs, in the right shape. They never contact the platform.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

use crate::types::AuthMap;

static BOT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+:[A-Za-z0-9_-]+$").expect("valid regex"));
static CHAT_USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@[A-Za-z][A-Za-z0-9_]{3,31}$").expect("valid regex"));
static CHAT_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+$").expect("valid regex"));

/// Checks a credential map and returns every problem found
pub trait AuthValidator: Send + Sync {
    fn validate(&self, auth: &AuthMap) -> Vec<String>;
}

impl<F> AuthValidator for F
where
    F: Fn(&AuthMap) -> Vec<String> + Send + Sync,
{
    fn validate(&self, auth: &AuthMap) -> Vec<String> {
        self(auth)
    }
}

/// Name-keyed set of credential validators
#[derive(Clone, Default)]
pub struct AuthValidatorRegistry {
    validators: HashMap<String, Arc<dyn AuthValidator>>,
}

impl AuthValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with validators for the built-in platforms
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("telegram", Arc::new(validate_telegram_auth));
        registry
    }

    pub fn register(&mut self, platform: &str, validator: Arc<dyn AuthValidator>) {
        self.validators.insert(platform.to_lowercase(), validator);
    }

    /// Validate `auth` for `platform`
    ///
    /// Returns `None` when no validator is registered, so the caller can skip
    /// the check, and `Some` with the (possibly empty) error list otherwise.
    pub fn validate(&self, platform: &str, auth: &AuthMap) -> Option<Vec<String>> {
        self.validators
            .get(&platform.to_lowercase())
            .map(|validator| validator.validate(auth))
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.validators.contains_key(&platform.to_lowercase())
    }
}

impl std::fmt::Debug for AuthValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.validators.keys().collect();
        names.sort();
        f.debug_struct("AuthValidatorRegistry")
            .field("validators", &names)
            .finish()
    }
}

/// Telegram bot credentials: `bot_token` and `chat_id`
pub fn validate_telegram_auth(auth: &AuthMap) -> Vec<String> {
    let mut errors = Vec::new();

    match auth.get("bot_token") {
        None | Some(Value::Null) => errors.push("bot_token is required".to_string()),
        Some(Value::String(token)) if BOT_TOKEN.is_match(token.trim()) => {}
        Some(_) => errors.push("bot_token must look like '<bot id>:<secret>'".to_string()),
    }

    match auth.get("chat_id") {
        None | Some(Value::Null) => errors.push("chat_id is required".to_string()),
        Some(Value::Number(n)) if n.is_i64() => {}
        Some(Value::String(chat))
            if CHAT_NUMERIC.is_match(chat.trim()) || CHAT_USERNAME.is_match(chat.trim()) => {}
        Some(_) => errors.push(
            "chat_id must be a numeric id or a public @username".to_string(),
        ),
    }

    errors
}
