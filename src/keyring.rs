// src/keyring.rs
//! Wallet accounts and the keyring taxonomy used to filter them

use serde::{Deserialize, Serialize};
use std::fmt;

/// How an account's key material is held
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyringType {
    Hd,
    SimpleKeyPair,
    WatchAddress,
    Gnosis,
    Ledger,
    Trezor,
    OneKey,
    Keystone,
    WalletConnect,
    CoboArgus,
    Coinbase,
    /// Any type string this crate does not know about
    Other(String),
}

impl KeyringType {
    pub fn as_str(&self) -> &str {
        match self {
            KeyringType::Hd => "HD Key Tree",
            KeyringType::SimpleKeyPair => "Simple Key Pair",
            KeyringType::WatchAddress => "Watch Address",
            KeyringType::Gnosis => "Gnosis",
            KeyringType::Ledger => "Ledger Hardware",
            KeyringType::Trezor => "Trezor Hardware",
            KeyringType::OneKey => "Onekey Hardware",
            KeyringType::Keystone => "QR Hardware Wallet Device",
            KeyringType::WalletConnect => "WalletConnect",
            KeyringType::CoboArgus => "CoboArgus",
            KeyringType::Coinbase => "Coinbase",
            KeyringType::Other(s) => s,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "HD Key Tree" => KeyringType::Hd,
            "Simple Key Pair" => KeyringType::SimpleKeyPair,
            "Watch Address" => KeyringType::WatchAddress,
            "Gnosis" => KeyringType::Gnosis,
            "Ledger Hardware" => KeyringType::Ledger,
            "Trezor Hardware" => KeyringType::Trezor,
            "Onekey Hardware" => KeyringType::OneKey,
            "QR Hardware Wallet Device" => KeyringType::Keystone,
            "WalletConnect" => KeyringType::WalletConnect,
            "CoboArgus" => KeyringType::CoboArgus,
            "Coinbase" => KeyringType::Coinbase,
            other => KeyringType::Other(other.to_string()),
        }
    }

    pub fn is_watch_only(&self) -> bool {
        matches!(self, KeyringType::WatchAddress)
    }

    pub fn is_multisig(&self) -> bool {
        matches!(self, KeyringType::Gnosis)
    }

    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            KeyringType::Ledger | KeyringType::Trezor | KeyringType::OneKey | KeyringType::Keystone
        )
    }
}

impl fmt::Display for KeyringType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for KeyringType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for KeyringType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(KeyringType::parse(&raw))
    }
}

/// A wallet account as listed by the keyring service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    #[serde(rename = "type")]
    pub keyring_type: KeyringType,
    pub brand_name: Option<String>,
}

impl Account {
    pub fn new(address: impl Into<String>, keyring_type: KeyringType) -> Self {
        Self {
            address: address.into(),
            keyring_type,
            brand_name: None,
        }
    }

    pub fn with_brand(mut self, brand_name: impl Into<String>) -> Self {
        self.brand_name = Some(brand_name.into());
        self
    }

    /// Accounts we can sign for and that hold their own approvals.
    /// Watch-only and Gnosis accounts never contribute to counts.
    pub fn is_alert_eligible(&self) -> bool {
        !self.keyring_type.is_watch_only() && !self.keyring_type.is_multisig()
    }
}

/// Case-insensitive address plus matching type and brand
pub fn is_same_account(a: &Account, b: &Account) -> bool {
    a.address.eq_ignore_ascii_case(&b.address)
        && a.keyring_type == b.keyring_type
        && a.brand_name == b.brand_name
}

/// Drop repeated identities, keeping the first occurrence
pub fn unique_accounts(accounts: &[Account]) -> Vec<Account> {
    let mut out: Vec<Account> = Vec::with_capacity(accounts.len());
    for account in accounts {
        if !out.iter().any(|seen| is_same_account(seen, account)) {
            out.push(account.clone());
        }
    }
    out
}

/// The filter both the counter and the alert aggregator apply
pub fn eligible_accounts(accounts: &[Account]) -> Vec<Account> {
    unique_accounts(accounts)
        .into_iter()
        .filter(Account::is_alert_eligible)
        .collect()
}
