//! Display projection of the provider identity payload

use super::ProviderUser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Label used when no name can be derived at all
pub const FALLBACK_DISPLAY_NAME: &str = "User";

/// Normalized user derived from the active session
///
/// Always recomputed from a `ProviderUser`; never edited in place.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub email_confirmed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub metadata: Map<String, Value>,
}

impl AuthUser {
    /// Project a provider identity payload
    #[must_use]
    pub fn from_provider(user: &ProviderUser) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: resolve_display_name(user),
            first_name: non_blank(user.first_name.as_deref())
                .or_else(|| user.metadata_str("first_name"))
                .map(String::from),
            last_name: non_blank(user.last_name.as_deref())
                .or_else(|| user.metadata_str("last_name"))
                .map(String::from),
            phone: non_blank(user.phone.as_deref())
                .or_else(|| user.metadata_str("phone"))
                .map(String::from),
            avatar_url: user.metadata_str("avatar_url").map(String::from),
            email_confirmed: user.email_confirmed_at.is_some(),
            created_at: user.created_at,
            metadata: user.user_metadata.clone(),
        }
    }
}

/// Merge a possibly partial identity payload into an existing one
///
/// Present fields replace, absent fields are kept and metadata maps are
/// merged key by key.
#[must_use]
pub fn merge_identity(current: &ProviderUser, incoming: &ProviderUser) -> ProviderUser {
    let mut merged = current.clone();

    if !incoming.id.is_empty() {
        merged.id.clone_from(&incoming.id);
    }
    merge_option(&mut merged.email, &incoming.email);
    merge_option(&mut merged.phone, &incoming.phone);
    merge_option(&mut merged.full_name, &incoming.full_name);
    merge_option(&mut merged.first_name, &incoming.first_name);
    merge_option(&mut merged.last_name, &incoming.last_name);
    merge_option(&mut merged.created_at, &incoming.created_at);
    merge_option(&mut merged.email_confirmed_at, &incoming.email_confirmed_at);

    for (key, value) in &incoming.user_metadata {
        merged.user_metadata.insert(key.clone(), value.clone());
    }
    for (key, value) in &incoming.app_metadata {
        merged.app_metadata.insert(key.clone(), value.clone());
    }

    merged
}

fn merge_option<T: Clone>(target: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        target.clone_from(incoming);
    }
}

/// Resolve the display name of a user
///
/// Order: explicit full name, explicit first+last, metadata full name,
/// metadata first+last, metadata name, email local part, fallback label.
#[must_use]
pub fn resolve_display_name(user: &ProviderUser) -> String {
    if let Some(full_name) = non_blank(user.full_name.as_deref()) {
        return full_name.to_string();
    }

    if let Some(name) = join_names(user.first_name.as_deref(), user.last_name.as_deref()) {
        return name;
    }

    if let Some(full_name) = user.metadata_str("full_name") {
        return full_name.to_string();
    }

    if let Some(name) = join_names(
        user.metadata_str("first_name"),
        user.metadata_str("last_name"),
    ) {
        return name;
    }

    if let Some(name) = user.metadata_str("name") {
        return name.to_string();
    }

    if let Some(local_part) = user
        .email
        .as_deref()
        .and_then(|email| email.split('@').next())
        .and_then(|local| non_blank(Some(local)))
    {
        return local_part.to_string();
    }

    FALLBACK_DISPLAY_NAME.to_string()
}

fn join_names(first: Option<&str>, last: Option<&str>) -> Option<String> {
    match (non_blank(first), non_blank(last)) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        _ => None,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
