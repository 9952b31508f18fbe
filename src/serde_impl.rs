//! Serde serialization support for identifier types.
//!
//! Fixed-width identifiers ([`Address`], [`CiphertextHandle`], [`TxHash`]) are
//! serialized as their boundary rendering: a lowercase hex string with a `0x`
//! prefix. Deserialization accepts either case and checks the exact width.
//!
//! # Example
//!
//! ```rust
//! use progress_ledger::Address;
//!
//! let addr = Address::from_bytes([0x11; 20]);
//! let json = serde_json::to_string(&addr).unwrap();
//! assert_eq!(json, format!("\"0x{}\"", "11".repeat(20)));
//! let back: Address = serde_json::from_str(&json).unwrap();
//! assert_eq!(back, addr);
//! ```

use core::str::FromStr;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{Address, CiphertextHandle, TxHash};

fn from_hex_str<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    T::from_str(&raw).map_err(de::Error::custom)
}

macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                from_hex_str(deserializer)
            }
        }
    };
}

hex_serde!(Address);
hex_serde!(CiphertextHandle);
hex_serde!(TxHash);
