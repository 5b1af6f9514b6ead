//! Field normalization for provider account profiles.

// crates.io
use time::{format_description::BorrowedFormatItem, macros::format_description};
// self
use crate::{_prelude::*, sync::SyncError};

const PROVIDER_DATE: &[BorrowedFormatItem<'_>] =
	format_description!("[day padding:none]/[month padding:none]/[year]");

/// Parses a provider birth date in `dd/mm/yyyy` form.
///
/// Only ASCII digits and slashes are accepted, so signed components never reach the parser.
pub fn birth_date(raw: &str) -> Result<Date, SyncError> {
	let raw = raw.trim();
	let invalid = || SyncError::InvalidBirthDate { raw: raw.to_owned() };

	if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit() || b == b'/') {
		return Err(invalid());
	}

	Date::parse(raw, PROVIDER_DATE).map_err(|_| invalid())
}

/// Trims and lowercases an email address; blanks become `None`.
pub fn email(raw: Option<&str>) -> Option<String> {
	raw.map(str::trim).filter(|value| !value.is_empty()).map(str::to_lowercase)
}

/// Formats a phone number as `+<country code><number>` using digits only.
pub fn phone(country_code: Option<&str>, number: &str) -> Option<String> {
	let digits = |value: &str| value.chars().filter(char::is_ascii_digit).collect::<String>();
	let number = digits(number);

	if number.is_empty() {
		return None;
	}

	let country = country_code.map(digits).unwrap_or_default();

	Some(format!("+{country}{number}"))
}

/// Trims a free-text field; blanks become `None`.
pub fn text(raw: Option<&str>) -> Option<String> {
	raw.map(str::trim).filter(|value| !value.is_empty()).map(str::to_owned)
}

/// Parses a minor-unit balance written as a JSON string.
pub fn minor_units(raw: &str) -> Option<i64> {
	raw.trim().parse().ok()
}
