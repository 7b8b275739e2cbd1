//! Extraction pipeline: shared prompt, JSON recovery, and field normalization.
//!
//! Providers return free-form text that *should* be JSON but routinely arrives
//! wrapped in markdown fences or prose. [`recover_json`] digs the object out,
//! and [`normalize`] turns the loosely-typed result into a [`CardRecord`].

mod normalize;
mod recover;

pub use normalize::{normalize, normalize_with_regions, CardRecord, DEFAULT_PHONE_REGIONS};
pub use recover::recover_json;

/// Extraction prompt shared by every vision provider. Never mutated.
pub const PROMPT: &str = "You are an expert OCR and business card parser. Extract ONLY the following fields as JSON:\n\
- 'name': Full name\n\
- 'title': Job title\n\
- 'company': Legal company name\n\
- 'address': Full postal address (if present)\n\
- 'phoneNumbers': List of full international phone numbers (if any)\n\
- 'email': Email address (if present)\n\
- 'website': Official website (if present)\n\n\
Rules:\n\
- ONLY include a field if its value is present and valid.\n\
- NEVER output null, empty string, or empty array.\n\
- Return ONLY valid JSON. No markdown, no explanations.";
