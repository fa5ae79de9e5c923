use crate::config::MediaField;
use alloy::primitives::U256;
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::{
    fmt,
    str::FromStr,
};

/// ERC-721 token id. Parses decimal or `0x`-prefixed hex.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TokenId(U256);

impl TokenId {
    pub fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl From<u64> for TokenId {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl FromStr for TokenId {
    type Err = color_eyre::eyre::Report;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => U256::from_str_radix(hex, 16),
            None => U256::from_str_radix(trimmed, 10),
        };
        parsed
            .map(Self)
            .map_err(|e| eyre!("invalid token id '{raw}': {e}"))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MediaRef {
    pub raw: Option<String>,
    pub gateway: Option<String>,
}

impl MediaRef {
    pub fn url(&self, field: MediaField) -> Option<&str> {
        match field {
            MediaField::Raw => self.raw.as_deref(),
            MediaField::Gateway => self.gateway.as_deref(),
        }
        .filter(|url| !url.is_empty())
    }
}

/// Indexed NFT snapshot. Never mutated after it is fetched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OwnedNft {
    pub token_id: TokenId,
    pub title: String,
    pub contract_address: String,
    pub media: Vec<MediaRef>,
    /// `name` from the token's raw metadata, when the indexer returned it.
    pub metadata_name: Option<String>,
}

impl OwnedNft {
    pub fn display_name(&self) -> &str {
        if !self.title.trim().is_empty() {
            return &self.title;
        }
        self.metadata_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Unnamed Alchemon")
    }

    pub fn media_url(&self, field: MediaField) -> Option<&str> {
        self.media.first().and_then(|media| media.url(field))
    }

    pub fn belongs_to(&self, contract: &str) -> bool {
        self.contract_address.eq_ignore_ascii_case(contract)
    }
}

/// A contract deployed by some owner, as reported by the indexer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContractSummary {
    pub address: String,
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn nft(title: &str, metadata_name: Option<&str>) -> OwnedNft {
        OwnedNft {
            token_id: TokenId::from(1),
            title: title.to_string(),
            contract_address: "0xAbC".to_string(),
            media: vec![MediaRef {
                raw: Some("ipfs://raw".into()),
                gateway: Some(String::new()),
            }],
            metadata_name: metadata_name.map(str::to_string),
        }
    }

    #[test]
    fn token_id__parses_decimal_and_hex() {
        assert_eq!("42".parse::<TokenId>().unwrap(), TokenId::from(42));
        assert_eq!(
            "0x000000000000000000000000000000000000000000000000000000000000002a"
                .parse::<TokenId>()
                .unwrap(),
            TokenId::from(42)
        );
        assert!("none".parse::<TokenId>().is_err());
    }

    #[test]
    fn display_name__falls_back_to_metadata_name() {
        assert_eq!(nft("Alchemon #1", Some("meta")).display_name(), "Alchemon #1");
        assert_eq!(nft("", Some("meta")).display_name(), "meta");
        assert_eq!(nft(" ", None).display_name(), "Unnamed Alchemon");
    }

    #[test]
    fn media_url__treats_empty_url_as_missing() {
        let nft = nft("a", None);
        assert_eq!(nft.media_url(MediaField::Raw), Some("ipfs://raw"));
        assert_eq!(nft.media_url(MediaField::Gateway), None);
    }

    #[test]
    fn belongs_to__ignores_ascii_case() {
        assert!(nft("a", None).belongs_to("0xabc"));
        assert!(!nft("a", None).belongs_to("0xabd"));
    }
}
