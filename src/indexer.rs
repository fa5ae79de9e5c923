use crate::{
    config::Chain,
    nft::{
        ContractSummary,
        MediaRef,
        OwnedNft,
        TokenId,
    },
};
use alloy::primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    de::DeserializeOwned,
};
use std::fmt;
use tracing::warn;

/// Lookups against an external NFT indexing service.
pub trait NftIndexer: Send + Sync {
    fn nfts_for_owner(
        &self,
        owner: &Address,
    ) -> impl Future<Output = Result<Vec<OwnedNft>>> + Send;

    fn nfts_for_contract(
        &self,
        contract: &str,
    ) -> impl Future<Output = Result<Vec<OwnedNft>>> + Send;

    fn contracts_for_owner(
        &self,
        owner: &Address,
    ) -> impl Future<Output = Result<Vec<ContractSummary>>> + Send;
}

/// Client for the Alchemy NFT API (v2 REST endpoints).
#[derive(Clone)]
pub struct AlchemyClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl AlchemyClient {
    pub fn new(chain: Chain, api_key: Option<String>) -> Result<Self> {
        let base_url = format!("https://{}.g.alchemy.com/nft/v2", chain.alchemy_network());
        Self::with_base_url(base_url, api_key)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for NFT indexer")?;
        Ok(Self {
            base_url,
            api_key,
            http,
        })
    }

    fn endpoint(&self, method: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| eyre!("no NFT API key configured"))?;
        Ok(format!("{}/{key}/{method}", self.base_url))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.endpoint(method)?;
        let res = self
            .http
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .wrap_err("NFT indexer request failed")?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .wrap_err("failed to read NFT indexer response body")?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(eyre!("NFT indexer rejected the API key ({status})"));
        }
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            return Err(eyre!("NFT indexer responded with {status} to {method}: {body}"));
        }
        serde_json::from_slice(&bytes)
            .wrap_err_with(|| format!("invalid NFT indexer payload for {method}"))
    }
}

impl NftIndexer for AlchemyClient {
    async fn nfts_for_owner(&self, owner: &Address) -> Result<Vec<OwnedNft>> {
        let dto: OwnedNftsDto = self
            .get_json(
                "getNFTs",
                &[
                    ("owner", owner.to_string()),
                    ("withMetadata", "true".to_string()),
                ],
            )
            .await?;
        Ok(convert_nfts(dto.owned_nfts))
    }

    async fn nfts_for_contract(&self, contract: &str) -> Result<Vec<OwnedNft>> {
        let dto: CollectionDto = self
            .get_json(
                "getNFTsForCollection",
                &[
                    ("contractAddress", contract.to_string()),
                    ("withMetadata", "true".to_string()),
                ],
            )
            .await?;
        Ok(convert_nfts(dto.nfts))
    }

    async fn contracts_for_owner(&self, owner: &Address) -> Result<Vec<ContractSummary>> {
        let dto: ContractsForOwnerDto = self
            .get_json("getContractsForOwner", &[("owner", owner.to_string())])
            .await?;
        Ok(dto.contracts.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for AlchemyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}

/// Drops entries whose token id cannot be parsed instead of failing the page.
fn convert_nfts(dtos: Vec<NftDto>) -> Vec<OwnedNft> {
    dtos.into_iter()
        .filter_map(|dto| match OwnedNft::try_from(dto) {
            Ok(nft) => Some(nft),
            Err(err) => {
                warn!(?err, "skipping NFT with unreadable token id");
                None
            }
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedNftsDto {
    #[serde(default)]
    owned_nfts: Vec<NftDto>,
}

#[derive(Deserialize)]
struct CollectionDto {
    #[serde(default)]
    nfts: Vec<NftDto>,
}

#[derive(Deserialize)]
struct ContractsForOwnerDto {
    #[serde(default)]
    contracts: Vec<OwnerContractDto>,
}

#[derive(Deserialize)]
struct NftDto {
    contract: ContractRefDto,
    id: NftIdDto,
    #[serde(default)]
    title: String,
    #[serde(default)]
    media: Vec<MediaDto>,
    #[serde(default)]
    metadata: Option<RawMetadataDto>,
}

#[derive(Deserialize)]
struct ContractRefDto {
    address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NftIdDto {
    token_id: String,
}

#[derive(Deserialize)]
struct MediaDto {
    #[serde(default)]
    raw: Option<String>,
    #[serde(default)]
    gateway: Option<String>,
}

#[derive(Deserialize)]
struct RawMetadataDto {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct OwnerContractDto {
    address: String,
    #[serde(default)]
    name: Option<String>,
}

impl TryFrom<NftDto> for OwnedNft {
    type Error = color_eyre::eyre::Report;

    fn try_from(dto: NftDto) -> Result<Self> {
        Ok(OwnedNft {
            token_id: dto.id.token_id.parse::<TokenId>()?,
            title: dto.title,
            contract_address: dto.contract.address,
            media: dto
                .media
                .into_iter()
                .map(|media| MediaRef {
                    raw: media.raw,
                    gateway: media.gateway,
                })
                .collect(),
            metadata_name: dto.metadata.and_then(|metadata| metadata.name),
        })
    }
}

impl From<OwnerContractDto> for ContractSummary {
    fn from(dto: OwnerContractDto) -> Self {
        ContractSummary {
            address: dto.address,
            name: dto.name,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    const OWNED_PAYLOAD: &str = r#"{
        "ownedNfts": [
            {
                "contract": { "address": "0xabcdef0000000000000000000000000000000001" },
                "id": {
                    "tokenId": "0x0000000000000000000000000000000000000000000000000000000000000007",
                    "tokenMetadata": { "tokenType": "ERC721" }
                },
                "title": "Alchemon #7",
                "description": "",
                "media": [
                    { "raw": "ipfs://Qm7", "gateway": "https://ipfs.io/ipfs/Qm7" }
                ],
                "metadata": { "name": "Alchemon #7", "image": "ipfs://Qm7" }
            },
            {
                "contract": { "address": "0x0000000000000000000000000000000000000002" },
                "id": { "tokenId": "not-a-number" },
                "title": "broken"
            }
        ],
        "totalCount": 2,
        "blockHash": "0x01"
    }"#;

    #[test]
    fn convert_nfts__maps_indexer_fields_and_skips_unparseable_ids() {
        // given
        let dto: OwnedNftsDto = serde_json::from_str(OWNED_PAYLOAD).unwrap();

        // when
        let nfts = convert_nfts(dto.owned_nfts);

        // then
        assert_eq!(
            nfts,
            vec![OwnedNft {
                token_id: TokenId::from(7),
                title: "Alchemon #7".to_string(),
                contract_address: "0xabcdef0000000000000000000000000000000001"
                    .to_string(),
                media: vec![MediaRef {
                    raw: Some("ipfs://Qm7".to_string()),
                    gateway: Some("https://ipfs.io/ipfs/Qm7".to_string()),
                }],
                metadata_name: Some("Alchemon #7".to_string()),
            }]
        );
    }

    #[test]
    fn collection_payload__tolerates_missing_optional_fields() {
        let payload = r#"{
            "nfts": [
                { "contract": { "address": "0x01" }, "id": { "tokenId": "3" } }
            ],
            "nextToken": "0x04"
        }"#;
        let dto: CollectionDto = serde_json::from_str(payload).unwrap();
        let nfts = convert_nfts(dto.nfts);
        assert_eq!(nfts.len(), 1);
        assert_eq!(nfts[0].token_id, TokenId::from(3));
        assert!(nfts[0].media.is_empty());
        assert_eq!(nfts[0].display_name(), "Unnamed Alchemon");
    }

    #[test]
    fn contracts_payload__maps_address_and_name() {
        let payload = r#"{
            "contracts": [
                { "address": "0xfeed", "name": "Side Project", "totalBalance": 3 },
                { "address": "0xbeef" }
            ],
            "totalCount": 2
        }"#;
        let dto: ContractsForOwnerDto = serde_json::from_str(payload).unwrap();
        let contracts: Vec<ContractSummary> =
            dto.contracts.into_iter().map(Into::into).collect();
        assert_eq!(
            contracts,
            vec![
                ContractSummary {
                    address: "0xfeed".into(),
                    name: Some("Side Project".into()),
                },
                ContractSummary {
                    address: "0xbeef".into(),
                    name: None,
                },
            ]
        );
    }

    #[test]
    fn endpoint__embeds_api_key_in_path() {
        let client = AlchemyClient::new(Chain::Goerli, Some("demo".into())).unwrap();
        assert_eq!(
            client.endpoint("getNFTs").unwrap(),
            "https://eth-goerli.g.alchemy.com/nft/v2/demo/getNFTs"
        );
    }

    #[tokio::test]
    async fn nfts_for_owner__fails_without_api_key() {
        let client = AlchemyClient::new(Chain::Goerli, None).unwrap();
        let owner = Address::repeat_byte(0x11);
        let err = client.nfts_for_owner(&owner).await.unwrap_err();
        assert!(err.to_string().contains("no NFT API key"));
    }
}
