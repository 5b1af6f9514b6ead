//! Lookup from provider method code and direction to ledger operation code.

// self
use crate::{_prelude::*, error::ConfigError, ingest::Direction};

/// One row of the operation-code table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCodeRule {
	/// Provider payment method code.
	pub method_code: String,
	/// Transfer direction.
	pub direction: Direction,
	/// Ledger operation code to record.
	pub operation_code: String,
}

/// Operation-code table keyed by normalized method code and direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationCodeMap(HashMap<(String, Direction), String>);
impl OperationCodeMap {
	/// Builds the table, rejecting keys defined twice.
	pub fn from_rules<I>(rules: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = OperationCodeRule>,
	{
		let mut map = HashMap::new();

		for rule in rules {
			let key = (normalize(&rule.method_code), rule.direction);

			if map.contains_key(&key) {
				return Err(ConfigError::DuplicateOperationCode {
					method_code: rule.method_code,
					direction: rule.direction.as_str(),
				});
			}

			map.insert(key, rule.operation_code);
		}

		Ok(Self(map))
	}

	/// Looks up the operation code; method codes compare case-insensitively.
	pub fn resolve(&self, method_code: &str, direction: Direction) -> Option<&str> {
		self.0.get(&(normalize(method_code), direction)).map(String::as_str)
	}

	/// Number of mappings.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Whether the table is empty.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

fn normalize(method_code: &str) -> String {
	method_code.trim().to_ascii_uppercase()
}
