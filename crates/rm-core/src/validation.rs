//! Input validation and sanitizing shared by all services.

use url::Url;

use crate::error::{MarketError, Result};
use crate::models::{ListingDraft, ListingPatch, Product};

pub const USERNAME_MIN: usize = 4;
pub const USERNAME_MAX: usize = 20;
pub const PASSWORD_MIN: usize = 6;
pub const PASSWORD_MAX: usize = 128;
pub const BIO_MAX: usize = 500;
pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 2000;
pub const PRICE_MAX: i64 = 10_000_000;
pub const REASON_MIN: usize = 5;
pub const REASON_MAX: usize = 1000;
pub const MESSAGE_MAX: usize = 1000;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "avif"];

/// Escapes HTML so stored text can be rendered verbatim.
pub fn sanitize(raw: &str) -> String {
    html_escape::encode_safe(raw).to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub fn username(name: &str) -> Result<()> {
    let len = char_len(name);
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(MarketError::validation(
            "username",
            format!("must be {USERNAME_MIN}-{USERNAME_MAX} characters"),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MarketError::validation(
            "username",
            "only letters, digits and underscore are allowed",
        ));
    }
    Ok(())
}

pub fn password(pw: &str) -> Result<()> {
    let len = char_len(pw);
    if len < PASSWORD_MIN {
        return Err(MarketError::TooShort {
            field: "password",
            min: PASSWORD_MIN,
        });
    }
    if len > PASSWORD_MAX {
        return Err(MarketError::TooLong {
            field: "password",
            max: PASSWORD_MAX,
        });
    }
    Ok(())
}

/// Normalizes an optional bio: blank input means "no bio".
pub fn bio(text: Option<&str>) -> Result<Option<String>> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if char_len(text) > BIO_MAX {
        return Err(MarketError::TooLong {
            field: "bio",
            max: BIO_MAX,
        });
    }
    Ok(Some(text.to_string()))
}

fn required_text(field: &'static str, value: &str, max: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MarketError::validation(field, "must not be empty"));
    }
    if char_len(trimmed) > max {
        return Err(MarketError::validation(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn price(value: i64) -> Result<u64> {
    if !(0..=PRICE_MAX).contains(&value) {
        return Err(MarketError::validation(
            "price",
            format!("must be between 0 and {PRICE_MAX}"),
        ));
    }
    Ok(value as u64)
}

pub fn image_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let url = Url::parse(raw)
        .map_err(|e| MarketError::validation("imageUrl", format!("not a valid URL ({e})")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(MarketError::validation("imageUrl", "must be an http(s) URL"));
    }
    let path = url.path().to_ascii_lowercase();
    let has_image_ext = path
        .rsplit_once('.')
        .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext));
    if !has_image_ext {
        return Err(MarketError::validation(
            "imageUrl",
            format!("must point to an image ({})", IMAGE_EXTENSIONS.join(", ")),
        ));
    }
    Ok(raw.to_string())
}

/// Listing fields after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFields {
    pub title: String,
    pub description: String,
    pub price: u64,
    pub image_url: String,
}

pub fn listing(draft: &ListingDraft) -> Result<ListingFields> {
    Ok(ListingFields {
        title: required_text("title", &draft.title, TITLE_MAX)?,
        description: required_text("description", &draft.description, DESCRIPTION_MAX)?,
        price: price(draft.price)?,
        image_url: image_url(&draft.image_url)?,
    })
}

/// Merges `patch` over `current` and validates the result as a whole.
pub fn patched_listing(current: &Product, patch: &ListingPatch) -> Result<ListingFields> {
    let draft = ListingDraft {
        title: patch.title.clone().unwrap_or_else(|| current.title.clone()),
        description: patch
            .description
            .clone()
            .unwrap_or_else(|| current.description.clone()),
        price: patch.price.unwrap_or(current.price as i64),
        image_url: patch
            .image_url
            .clone()
            .unwrap_or_else(|| current.image_url.clone()),
    };
    listing(&draft)
}

pub fn report_reason(reason: &str) -> Result<String> {
    let trimmed = reason.trim();
    let len = char_len(trimmed);
    if len < REASON_MIN {
        return Err(MarketError::TooShort {
            field: "reason",
            min: REASON_MIN,
        });
    }
    if len > REASON_MAX {
        return Err(MarketError::TooLong {
            field: "reason",
            max: REASON_MAX,
        });
    }
    Ok(trimmed.to_string())
}

/// Validates and sanitizes a chat message body.
pub fn message_body(body: &str) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(MarketError::validation("message", "must not be empty"));
    }
    if char_len(trimmed) > MESSAGE_MAX {
        return Err(MarketError::TooLong {
            field: "message",
            max: MESSAGE_MAX,
        });
    }
    Ok(sanitize(trimmed))
}
