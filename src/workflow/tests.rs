#![allow(non_snake_case)]
use super::*;
use crate::{
    session::NavRequest,
    test_helpers::{
        FakeSigningProvider,
        RecordingNavigator,
    },
};
use proptest::prelude::*;
use std::sync::Arc;
use tokio::sync::Notify;

type Events = mpsc::UnboundedReceiver<WorkflowEvent>;

fn breeding(
    provider: FakeSigningProvider,
) -> (
    TxWorkflow<Breeding, FakeSigningProvider, RecordingNavigator>,
    RecordingNavigator,
    Events,
) {
    let navigator = RecordingNavigator::default();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let workflow =
        TxWorkflow::new(Breeding, provider, navigator.clone(), Chain::Goerli, events_tx);
    (workflow, navigator, events_rx)
}

fn drain(events: &mut Events) -> Vec<WorkflowEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn states(events: &mut Events) -> Vec<TxState> {
    drain(events)
        .into_iter()
        .filter_map(|event| match event {
            WorkflowEvent::State(state) => Some(state),
            WorkflowEvent::Rejected(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn submit__same_parent_twice_is_rejected_before_any_call() {
    // given
    let provider = FakeSigningProvider::connected();
    let (mut workflow, navigator, mut events) = breeding(provider.clone());

    // when
    let result = workflow.submit(ParentSelection::from_form("1", "1")).await;

    // then
    assert!(matches!(result, Err(WorkflowError::PreconditionNotMet(_))));
    assert_eq!(workflow.state(), &TxState::Idle);
    assert!(provider.calls().is_empty());
    assert!(navigator.requests().is_empty());
    assert!(matches!(
        drain(&mut events).as_slice(),
        [WorkflowEvent::Rejected(WorkflowError::PreconditionNotMet(_))]
    ));
}

#[tokio::test]
async fn submit__missing_parent_is_rejected() {
    let provider = FakeSigningProvider::connected();
    let (mut workflow, _, _events) = breeding(provider.clone());
    let result = workflow
        .submit(ParentSelection::from_form(NO_PARENT, "2"))
        .await;
    assert!(matches!(result, Err(WorkflowError::PreconditionNotMet(_))));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn submit__signer_failure_ends_failed_without_navigation() {
    // given
    let provider = FakeSigningProvider::connected().failing_signer("user rejected");
    let (mut workflow, navigator, mut events) = breeding(provider.clone());

    // when
    let result = workflow.submit(ParentSelection::from_form("1", "2")).await;

    // then
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::TransactionFailed {
            stage: TxStage::Signer,
            ..
        }
    ));
    assert_eq!(workflow.state(), &TxState::Failed { error: err.clone() });
    assert_eq!(
        states(&mut events),
        vec![TxState::Submitting, TxState::Failed { error: err }]
    );
    assert!(provider.calls().is_empty());
    assert!(navigator.requests().is_empty());
}

#[tokio::test]
async fn submit__confirmed_breed_navigates_to_dashboard_once() {
    // given
    let provider = FakeSigningProvider::connected();
    let (mut workflow, navigator, mut events) = breeding(provider.clone());

    // when
    let receipt = workflow
        .submit(ParentSelection::from_form("1", "2"))
        .await
        .unwrap();

    // then
    let tx_hash = receipt.tx_hash;
    assert_eq!(workflow.state(), &TxState::Confirmed { tx_hash });
    assert_eq!(
        states(&mut events),
        vec![
            TxState::Submitting,
            TxState::Mining { tx_hash },
            TxState::Confirmed { tx_hash },
        ]
    );
    assert_eq!(
        provider.calls(),
        vec![ContractCall::new(
            BREED_METHOD,
            vec![U256::from(1u64), U256::from(2u64)]
        )]
    );
    assert_eq!(
        navigator.requests(),
        vec![NavRequest::Replace(Route::Dashboard)]
    );
}

#[tokio::test]
async fn submit__reverted_transaction_fails_at_confirmation() {
    let provider = FakeSigningProvider::connected().reverting();
    let (mut workflow, navigator, mut events) = breeding(provider);

    let err = workflow
        .submit(ParentSelection::from_form("3", "4"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::TransactionFailed {
            stage: TxStage::Confirmation,
            ..
        }
    ));
    let seen = states(&mut events);
    assert!(matches!(seen[1], TxState::Mining { .. }));
    assert!(matches!(seen[2], TxState::Failed { .. }));
    assert!(navigator.requests().is_empty());
}

#[tokio::test]
async fn submit__call_failure_skips_mining() {
    let provider = FakeSigningProvider::connected().failing_call("insufficient funds");
    let (mut workflow, _, mut events) = breeding(provider);

    let err = workflow
        .submit(ParentSelection::from_form("3", "4"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::TransactionFailed {
            stage: TxStage::Submission,
            ..
        }
    ));
    assert_eq!(states(&mut events).len(), 2);
}

#[tokio::test]
async fn submit__without_provider_leaves_state_untouched() {
    // given
    let provider = FakeSigningProvider::connected().without_endpoint();
    let (mut workflow, _, mut events) = breeding(provider.clone());

    // when
    let result = workflow.submit(ParentSelection::from_form("1", "2")).await;

    // then
    assert!(matches!(result, Err(WorkflowError::ProviderUnavailable(_))));
    assert_eq!(workflow.state(), &TxState::Idle);
    assert!(states(&mut events).is_empty());
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn submit__without_wallet_address_is_a_precondition_failure() {
    let provider = FakeSigningProvider::connected().without_account();
    let (mut workflow, _, _events) = breeding(provider);
    let result = workflow.submit(ParentSelection::from_form("1", "2")).await;
    assert!(matches!(result, Err(WorkflowError::PreconditionNotMet(_))));
    assert_eq!(workflow.state(), &TxState::Idle);
}

#[tokio::test]
async fn submit__after_failure_resets_through_idle() {
    // given
    let provider = FakeSigningProvider::connected().failing_signer("no");
    let (mut workflow, _, mut events) = breeding(provider);
    let _ = workflow.submit(ParentSelection::from_form("1", "2")).await;
    drain(&mut events);

    // when
    let _ = workflow.submit(ParentSelection::from_form("1", "2")).await;

    // then
    let seen = states(&mut events);
    assert_eq!(seen[0], TxState::Idle);
    assert_eq!(seen[1], TxState::Submitting);
}

#[tokio::test]
async fn submit__abandoned_workflow_finishes_without_navigation() {
    // given
    let (mut workflow, navigator, events) = breeding(FakeSigningProvider::connected());
    drop(events);

    // when
    let result = workflow.submit(ParentSelection::from_form("5", "6")).await;

    // then
    assert!(result.is_ok());
    assert!(matches!(workflow.state(), TxState::Confirmed { .. }));
    assert!(navigator.requests().is_empty());
}

#[tokio::test]
async fn genesis_mint__pays_price_and_pushes_home_with_event() {
    // given
    let provider = FakeSigningProvider::connected();
    let navigator = RecordingNavigator::default();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let price = U256::from(5_000_000_000_000_000u64);
    let mut workflow = TxWorkflow::new(
        GenesisMint { count: 2, price },
        provider.clone(),
        navigator.clone(),
        Chain::Goerli,
        events_tx,
    );

    // when
    workflow.submit(()).await.unwrap();

    // then
    assert_eq!(
        provider.calls(),
        vec![
            ContractCall::new(MINT_GENESIS_METHOD, vec![U256::from(2u64)])
                .with_value(U256::from(10_000_000_000_000_000u64))
        ]
    );
    assert_eq!(
        navigator.requests(),
        vec![NavRequest::Push(Route::Home, Some(PageEvent::Minted))]
    );
}

#[tokio::test]
async fn spawned_workflow__rejects_submit_while_mining() {
    // given
    let gate = Arc::new(Notify::new());
    let provider = FakeSigningProvider::connected().gated(gate.clone());
    let navigator = RecordingNavigator::default();
    let (handle, mut events) =
        spawn_workflow(Breeding, provider.clone(), navigator.clone(), Chain::Goerli);

    // when
    handle.submit(ParentSelection::from_form("1", "2")).unwrap();
    assert_eq!(events.recv().await, Some(WorkflowEvent::State(TxState::Submitting)));
    assert!(matches!(
        events.recv().await,
        Some(WorkflowEvent::State(TxState::Mining { .. }))
    ));
    handle.submit(ParentSelection::from_form("3", "4")).unwrap();
    assert_eq!(
        events.recv().await,
        Some(WorkflowEvent::Rejected(WorkflowError::Busy))
    );
    gate.notify_one();

    // then
    assert!(matches!(
        events.recv().await,
        Some(WorkflowEvent::State(TxState::Confirmed { .. }))
    ));
    assert_eq!(provider.calls().len(), 1);
    assert_eq!(
        navigator.requests(),
        vec![NavRequest::Replace(Route::Dashboard)]
    );
    handle.shutdown();
    handle.join().await.unwrap();
}

#[test]
fn tx_state__terminal_states_only_reachable_through_submitting() {
    let hash = TxHash::repeat_byte(1);
    let failed = TxState::Failed {
        error: WorkflowError::Busy,
    };
    let confirmed = TxState::Confirmed { tx_hash: hash };
    let mining = TxState::Mining { tx_hash: hash };

    assert!(!TxState::Idle.can_transition_to(&failed));
    assert!(!TxState::Idle.can_transition_to(&confirmed));
    assert!(!TxState::Idle.can_transition_to(&mining));
    assert!(!TxState::Submitting.can_transition_to(&confirmed));
    assert!(TxState::Submitting.can_transition_to(&failed));
    assert!(mining.can_transition_to(&confirmed));
    assert!(mining.can_transition_to(&failed));
    for terminal in [&failed, &confirmed] {
        assert!(terminal.can_transition_to(&TxState::Idle));
        assert!(!terminal.can_transition_to(&TxState::Submitting));
        assert!(terminal.is_terminal());
    }
    assert!(TxState::Submitting.is_busy());
    assert!(mining.is_busy());
}

#[test]
fn parent_selection__from_form_treats_sentinel_and_garbage_as_unset() {
    assert_eq!(ParentSelection::from_form(NO_PARENT, "").parent1, None);
    assert_eq!(ParentSelection::from_form("abc", "").parent1, None);
    assert_eq!(
        ParentSelection::from_form(" 7 ", "0x08"),
        ParentSelection::new(TokenId::from(7), TokenId::from(8))
    );
}

proptest! {
    #[test]
    fn breeding_prepare__accepts_exactly_distinct_pairs(a in 0u64..20, b in 0u64..20) {
        let selection = ParentSelection::new(TokenId::from(a), TokenId::from(b));
        let prepared = Breeding.prepare(selection);
        if a == b {
            prop_assert!(matches!(prepared, Err(WorkflowError::PreconditionNotMet(_))));
        } else {
            let call = prepared.unwrap();
            prop_assert_eq!(call.method, BREED_METHOD);
            prop_assert_eq!(call.args, vec![U256::from(a), U256::from(b)]);
            prop_assert_eq!(call.value, None);
        }
    }
}
