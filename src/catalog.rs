//! Avatar and voice catalog: static samples, search, and filtering.
//!
//! The sample avatars double as the fallback set shown when the provider's
//! avatar list cannot be fetched.

use serde::{Deserialize, Serialize};

use crate::provider::ProviderGateway;

/// An avatar offered by the video provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Avatar {
    #[serde(alias = "avatar_id")]
    pub id: String,
    #[serde(alias = "avatar_name")]
    pub name: String,
    #[serde(default, alias = "preview_image_url")]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethnicity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Avatar {
    /// All descriptive labels of this avatar: explicit tags plus gender,
    /// style and ethnicity.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .map(String::as_str)
            .chain(self.gender.as_deref())
            .chain(self.style.as_deref())
            .chain(self.ethnicity.as_deref())
    }

    fn has_label(&self, wanted: &str) -> bool {
        self.labels().any(|label| label.eq_ignore_ascii_case(wanted))
    }
}

/// A synthesis voice.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
}

/// The built-in avatar set.
pub fn sample_avatars() -> Vec<Avatar> {
    (0..12)
        .map(|i| {
            let number = i + 1;
            let (gender, folder) = if i % 2 == 0 {
                ("Female", "women")
            } else {
                ("Male", "men")
            };
            let style = if i % 3 == 0 { "Professional" } else { "Casual" };
            let third = if i % 4 == 0 { "Diverse" } else { "Corporate" };
            Avatar {
                id: format!("avatar-{number}"),
                name: format!("Avatar {number}"),
                image_url: format!("https://randomuser.me/api/portraits/{folder}/{number}.jpg"),
                gender: None,
                style: None,
                ethnicity: None,
                age_range: None,
                tags: vec![style.to_string(), gender.to_string(), third.to_string()],
            }
        })
        .collect()
}

const SAMPLE_VOICES: &[Voice] = &[
    Voice { id: "voice-1", name: "Sarah", category: "friendly" },
    Voice { id: "voice-2", name: "Michael", category: "friendly" },
    Voice { id: "voice-3", name: "Emma", category: "professional" },
    Voice { id: "voice-4", name: "David", category: "professional" },
    Voice { id: "voice-5", name: "Jessica", category: "enthusiastic" },
    Voice { id: "voice-6", name: "John", category: "enthusiastic" },
    Voice { id: "voice-7", name: "Lisa", category: "authoritative" },
    Voice { id: "voice-8", name: "Robert", category: "authoritative" },
];

/// The built-in voice set.
pub fn sample_voices() -> &'static [Voice] {
    SAMPLE_VOICES
}

/// Distinct voice categories in first-seen order.
pub fn voice_categories() -> Vec<&'static str> {
    let mut categories: Vec<&'static str> = Vec::new();
    for voice in SAMPLE_VOICES {
        if !categories.contains(&voice.category) {
            categories.push(voice.category);
        }
    }
    categories
}

/// Look up a built-in voice by id.
pub fn find_voice(id: &str) -> Option<&'static Voice> {
    SAMPLE_VOICES.iter().find(|v| v.id == id)
}

/// Search and filter criteria for the avatar gallery.
///
/// A filter value of `"Any"` (any case) is treated as unset.
#[derive(Debug, Clone, Default)]
pub struct AvatarFilter {
    pub query: Option<String>,
    pub gender: Option<String>,
    pub style: Option<String>,
    pub ethnicity: Option<String>,
    pub age_range: Option<String>,
}

impl AvatarFilter {
    /// Number of category filters in effect (search excluded).
    pub fn active_count(&self) -> usize {
        [&self.gender, &self.style, &self.ethnicity, &self.age_range]
            .into_iter()
            .filter(|f| active(f).is_some())
            .count()
    }

    pub fn matches(&self, avatar: &Avatar) -> bool {
        if let Some(query) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            if !avatar.name.to_lowercase().contains(&query.to_lowercase()) {
                return false;
            }
        }

        for wanted in [&self.gender, &self.style, &self.ethnicity]
            .into_iter()
            .filter_map(active)
        {
            if !avatar.has_label(wanted) {
                return false;
            }
        }

        // Avatars without age data are not excluded by an age filter.
        if let (Some(wanted), Some(age)) = (active(&self.age_range), avatar.age_range.as_deref()) {
            if !age.eq_ignore_ascii_case(wanted) {
                return false;
            }
        }

        true
    }

    pub fn apply<'a>(&self, avatars: &'a [Avatar]) -> Vec<&'a Avatar> {
        avatars.iter().filter(|a| self.matches(a)).collect()
    }
}

fn active(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("any"))
}

/// Fetch avatars from the provider, falling back to the sample set when the
/// provider is unavailable or returns nothing.
pub async fn avatars_or_samples(gateway: &dyn ProviderGateway) -> Vec<Avatar> {
    match gateway.list_avatars().await {
        Ok(avatars) if !avatars.is_empty() => avatars,
        Ok(_) => {
            log::info!("Provider returned no avatars, using sample set");
            sample_avatars()
        }
        Err(e) => {
            log::warn!("Failed to fetch avatars, using sample set: {}", e);
            sample_avatars()
        }
    }
}
