#![warn(clippy::nursery, clippy::pedantic)]

//! Contains common functions and structures used by multiple projects

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
pub use url::Url;

pub const API_ENDPOINT: &str = "api";
pub const PASTES_ENDPOINT: &str = "pastes";
pub const VIEW_ENDPOINT: &str = "p";

/// Longest time-to-live a paste may be created with, in seconds (7 days).
pub const MAX_TTL_SECONDS: u32 = 604_800;
/// Largest view limit a paste may be created with.
pub const MAX_VIEWS: u32 = 100;

/// Length of a paste id. 21 symbols from a 64 symbol alphabet gives 126 bits
/// of entropy.
pub const ID_LENGTH: usize = 21;
/// URL-safe alphabet paste ids are drawn from.
pub const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Whether `id` has the shape of a paste id.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LENGTH && id.bytes().all(|b| ID_ALPHABET.contains(&b))
}

/// Body of `POST /api/pastes`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CreatePaste {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_views: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CreatedPaste {
    pub id: String,
    pub url: Url,
}

/// What is left of a paste's limits after a successful read.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    pub remaining_views: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Display for Limits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.remaining_views {
            Some(0) => write!(f, "This was the last view; the paste is gone now.")?,
            Some(1) => write!(f, "This paste can be viewed 1 more time.")?,
            Some(n) => write!(f, "This paste can be viewed {} more times.", n)?,
            None => write!(f, "This paste has no view limit.")?,
        }

        match self.expires_at {
            Some(time) => write!(
                f,
                " {}",
                time.format("It will expire on %A, %B %-d, %Y at %T %Z.")
            ),
            None => write!(f, " It will not expire."),
        }
    }
}

/// Body of a successful `GET /api/pastes/{id}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PasteView {
    pub content: String,
    #[serde(flatten)]
    pub limits: Limits,
}

/// Body of every non-2xx API response.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Reasons a paste can no longer be read. These are the `error` values of a
/// 404 response.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gone {
    NotFound,
    Expired,
    ViewLimitReached,
}

impl Gone {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::ViewLimitReached => "view_limit_reached",
        }
    }
}

impl Display for Gone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "This paste does not exist."),
            Self::Expired => write!(f, "This paste has expired."),
            Self::ViewLimitReached => write!(f, "This paste has reached its view limit."),
        }
    }
}

impl FromStr for Gone {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_found" => Ok(Self::NotFound),
            "expired" => Ok(Self::Expired),
            "view_limit_reached" => Ok(Self::ViewLimitReached),
            _ => Err(()),
        }
    }
}

/// The human-facing link to a paste, `{base}/p/{id}`.
#[must_use]
pub fn view_url(base: &Url, id: &str) -> Url {
    with_segments(base, &[VIEW_ENDPOINT, id])
}

/// The JSON API location of a paste, `{base}/api/pastes/{id}`.
#[must_use]
pub fn api_url(base: &Url, id: &str) -> Url {
    with_segments(base, &[API_ENDPOINT, PASTES_ENDPOINT, id])
}

/// The JSON API location pastes are created at, `{base}/api/pastes`.
#[must_use]
pub fn create_url(base: &Url) -> Url {
    with_segments(base, &[API_ENDPOINT, PASTES_ENDPOINT])
}

fn with_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    // Only cannot-be-a-base urls (`mailto:` and friends) fail here; there is
    // nothing sensible to append to those.
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// A link to a paste, split into the instance it lives on and its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasteUrl {
    pub base: Url,
    pub id: String,
}

impl PasteUrl {
    #[must_use]
    pub fn api_url(&self) -> Url {
        api_url(&self.base, &self.id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsePasteUrlError {
    #[error("The provided url was bad")]
    BadUrl,
    #[error("The url does not point at a paste")]
    NotAPaste,
    #[error("The paste id is malformed")]
    BadId,
}

impl FromStr for PasteUrl {
    type Err = ParsePasteUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut url = Url::from_str(s).map_err(|_| ParsePasteUrlError::BadUrl)?;
        let segments: Vec<String> = url
            .path_segments()
            .ok_or(ParsePasteUrlError::BadUrl)?
            .filter(|segment| !segment.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        let (prefix, id) = match segments.as_slice() {
            [prefix @ .., api, pastes, id] if api == API_ENDPOINT && pastes == PASTES_ENDPOINT => {
                (prefix, id)
            }
            [prefix @ .., view, id] if view == VIEW_ENDPOINT => (prefix, id),
            _ => return Err(ParsePasteUrlError::NotAPaste),
        };

        if !is_valid_id(id) {
            return Err(ParsePasteUrlError::BadId);
        }

        url.set_path(&prefix.join("/"));
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self {
            base: url,
            id: id.clone(),
        })
    }
}
