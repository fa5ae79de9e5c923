use crate::{
    indexer::NftIndexer,
    nft::{
        ContractSummary,
        OwnedNft,
    },
};
use alloy::primitives::Address;
use tracing::{
    debug,
    warn,
};

pub const SAMPLE_COUNT: usize = 3;

/// Game NFTs as seen through the indexer. Every lookup degrades to an empty
/// list on failure so pages always render.
#[derive(Clone)]
pub struct OwnershipView<I> {
    indexer: I,
    contract: String,
}

impl<I: NftIndexer> OwnershipView<I> {
    pub fn new(indexer: I, contract: impl Into<String>) -> Self {
        Self {
            indexer,
            contract: contract.into(),
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Parent pool for breeding: the owner's NFTs minted by the game contract.
    pub async fn load_owned(&self, owner: Option<Address>) -> Vec<OwnedNft> {
        let Some(owner) = owner else {
            debug!("no wallet address yet; skipping owned NFT lookup");
            return Vec::new();
        };
        match self.indexer.nfts_for_owner(&owner).await {
            Ok(nfts) => filter_to_contract(nfts, &self.contract),
            Err(err) => {
                warn!(?err, %owner, "owned NFT lookup failed");
                Vec::new()
            }
        }
    }

    pub async fn load_samples(&self, limit: usize) -> Vec<OwnedNft> {
        match self.indexer.nfts_for_contract(&self.contract).await {
            Ok(mut nfts) => {
                nfts.truncate(limit);
                nfts
            }
            Err(err) => {
                warn!(?err, contract = %self.contract, "sample NFT lookup failed");
                Vec::new()
            }
        }
    }

    /// Contracts deployed by the connected owner.
    pub async fn load_creator_contracts(
        &self,
        owner: Option<Address>,
    ) -> Vec<ContractSummary> {
        let Some(owner) = owner else {
            return Vec::new();
        };
        match self.indexer.contracts_for_owner(&owner).await {
            Ok(contracts) => contracts,
            Err(err) => {
                warn!(?err, %owner, "creator contract lookup failed");
                Vec::new()
            }
        }
    }
}

pub fn filter_to_contract(nfts: Vec<OwnedNft>, contract: &str) -> Vec<OwnedNft> {
    nfts.into_iter()
        .filter(|nft| nft.belongs_to(contract))
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        nft::TokenId,
        test_helpers::FakeIndexer,
    };
    use proptest::prelude::*;

    fn nft(id: u64, contract: &str) -> OwnedNft {
        OwnedNft {
            token_id: TokenId::from(id),
            title: format!("Alchemon #{id}"),
            contract_address: contract.to_string(),
            media: Vec::new(),
            metadata_name: None,
        }
    }

    #[tokio::test]
    async fn load_owned__keeps_only_game_contract_nfts() {
        // given
        let indexer =
            FakeIndexer::default().owning(vec![nft(1, "0xGAME"), nft(2, "0xOTHER")]);
        let view = OwnershipView::new(indexer, "0xGAME");

        // when
        let pool = view.load_owned(Some(Address::repeat_byte(1))).await;

        // then
        assert_eq!(pool, vec![nft(1, "0xGAME")]);
    }

    #[tokio::test]
    async fn load_owned__matches_contract_case_insensitively() {
        let indexer =
            FakeIndexer::default().owning(vec![nft(5, "0xabcdef"), nft(6, "0xABCDEF")]);
        let view = OwnershipView::new(indexer, "0xAbCdEf");
        let pool = view.load_owned(Some(Address::repeat_byte(1))).await;
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn load_owned__skips_lookup_without_address() {
        // given
        let indexer = FakeIndexer::default().owning(vec![nft(1, "0xGAME")]);
        let view = OwnershipView::new(indexer.clone(), "0xGAME");

        // when
        let pool = view.load_owned(None).await;

        // then
        assert!(pool.is_empty());
        assert!(indexer.owner_calls().is_empty());
    }

    #[tokio::test]
    async fn load_owned__degrades_to_empty_pool_on_fetch_failure() {
        let view = OwnershipView::new(FakeIndexer::default(), "0xGAME");
        let pool = view.load_owned(Some(Address::repeat_byte(1))).await;
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn load_samples__returns_first_entries_of_collection() {
        let indexer = FakeIndexer::default()
            .with_collection((1..=5).map(|id| nft(id, "0xGAME")).collect());
        let view = OwnershipView::new(indexer, "0xGAME");
        let samples = view.load_samples(SAMPLE_COUNT).await;
        let ids: Vec<_> = samples.iter().map(|n| n.token_id).collect();
        assert_eq!(ids, vec![TokenId::from(1), TokenId::from(2), TokenId::from(3)]);
    }

    #[tokio::test]
    async fn load_creator_contracts__lists_owner_deployments() {
        let indexer = FakeIndexer::default().with_contracts(vec![ContractSummary {
            address: "0xfeed".into(),
            name: Some("Side Project".into()),
        }]);
        let view = OwnershipView::new(indexer, "0xGAME");
        let contracts = view.load_creator_contracts(Some(Address::repeat_byte(2))).await;
        assert_eq!(contracts.len(), 1);
        assert!(view.load_creator_contracts(None).await.is_empty());
    }

    #[tokio::test]
    async fn load_creator_contracts__degrades_to_empty_list() {
        let view = OwnershipView::new(FakeIndexer::default(), "0xGAME");
        assert!(
            view.load_creator_contracts(Some(Address::repeat_byte(2)))
                .await
                .is_empty()
        );
    }

    proptest! {
        #[test]
        fn filter_to_contract__is_stable_and_case_insensitive(
            entries in proptest::collection::vec((0u64..50, any::<bool>(), any::<bool>()), 0..20)
        ) {
            let nfts: Vec<OwnedNft> = entries
                .iter()
                .map(|(id, is_game, upper)| {
                    let contract = match (is_game, upper) {
                        (true, true) => "0xABCDEF",
                        (true, false) => "0xabcdef",
                        (false, _) => "0x123456",
                    };
                    nft(*id, contract)
                })
                .collect();

            let once = filter_to_contract(nfts.clone(), "0xAbCdEf");
            let twice = filter_to_contract(nfts.clone(), "0xAbCdEf");

            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(filter_to_contract(once.clone(), "0xabcdef"), once.clone());
            let expected = entries.iter().filter(|(_, is_game, _)| *is_game).count();
            prop_assert_eq!(once.len(), expected);
        }
    }
}
