//! Resilient payment-provider client: single-flight OAuth tokens, a rate-limited dispatch queue,
//! persisted retries for failed calls, and idempotent transaction/account ingestion into the
//! ledger.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod auth;
pub mod calllog;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod ingest;
pub mod obs;
pub mod queue;
pub mod store;
pub mod sync;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use rust_decimal::Decimal;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Date, Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use rust_decimal;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, rust_decimal_macros as _};
