//! End-to-end flows over an in-process network: issuance, transfer,
//! settlement and the ways each of them can be refused.

use std::sync::Arc;
use std::time::Duration;

use iou_node::flow::{FlowContext, FlowError, ProposalCheck};
use iou_node::metrics::NodeMetrics;
use iou_node::services::SessionError;
use iou_node::{Network, Node};
use iou_protocol::{
    Amount, Currency, IouState, LedgerTransaction, SignedTransaction, UniqueIdentifier,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn amount(s: &str) -> Amount {
    s.parse().unwrap()
}

fn network() -> Network {
    Network::new(Arc::new(NodeMetrics::new().unwrap()))
}

struct Fixture {
    network: Network,
    lender: Arc<Node>,
    borrower: Arc<Node>,
}

impl Fixture {
    fn new() -> Self {
        let network = network();
        let lender = network.add_node("Lender").unwrap();
        let borrower = network.add_node("Borrower").unwrap();
        Self {
            network,
            lender,
            borrower,
        }
    }

    /// Issue an IOU of `face` owed by the borrower to the lender.
    async fn issue(&self, face: &str) -> UniqueIdentifier {
        let iou = IouState::new(
            amount(face),
            self.lender.identity().clone(),
            self.borrower.identity().clone(),
        );
        let linear_id = iou.linear_id.clone();
        self.borrower.issue_iou(iou).await.unwrap();
        linear_id
    }

    fn usd_balance(node: &Node) -> u64 {
        node.vault().cash_balance(&Currency::USD).unwrap().quantity
    }
}

// ---------------------------------------------------------------------------
// Issuance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn issued_iou_is_recorded_by_both_parties() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;

    for node in [&f.lender, &f.borrower] {
        let iou = node.iou(&linear_id).expect("IOU in vault");
        assert_eq!(iou.amount, amount("100.00 USD"));
        assert_eq!(iou.paid, amount("0.00 USD"));
        assert_eq!(node.ious().len(), 1);
    }
    // No inputs, so nothing to notarise.
    assert_eq!(f.network.notary().committed_count(), 0);
}

#[tokio::test]
async fn outsider_cannot_issue_between_others() {
    let f = Fixture::new();
    let outsider = f.network.add_node("Outsider").unwrap();
    let iou = IouState::new(
        amount("100.00 USD"),
        f.lender.identity().clone(),
        f.borrower.identity().clone(),
    );

    match outsider.issue_iou(iou).await {
        Err(FlowError::UnauthorizedInitiator { initiator, .. }) => {
            assert_eq!(initiator, "Outsider")
        }
        other => panic!("expected UnauthorizedInitiator, got {:?}", other),
    }
    assert!(f.lender.ious().is_empty());
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transfer_moves_the_iou_to_the_new_lender() {
    let f = Fixture::new();
    let new_lender = f.network.add_node("NewLender").unwrap();
    let linear_id = f.issue("100.00 USD").await;

    f.lender
        .transfer_iou(linear_id.clone(), new_lender.identity().clone())
        .await
        .unwrap();

    assert!(f.lender.iou(&linear_id).is_none());
    let held = new_lender.iou(&linear_id).expect("new lender holds the IOU");
    assert_eq!(held.lender, *new_lender.identity());
    assert_eq!(
        f.borrower.iou(&linear_id).map(|iou| iou.lender),
        Some(new_lender.identity().clone())
    );
    assert_eq!(f.network.notary().committed_count(), 1);
}

#[tokio::test]
async fn borrower_cannot_transfer() {
    let f = Fixture::new();
    let new_lender = f.network.add_node("NewLender").unwrap();
    let linear_id = f.issue("100.00 USD").await;

    match f
        .borrower
        .transfer_iou(linear_id, new_lender.identity().clone())
        .await
    {
        Err(FlowError::UnauthorizedInitiator { role, .. }) => assert_eq!(role, "lender"),
        other => panic!("expected UnauthorizedInitiator, got {:?}", other),
    }
}

#[tokio::test]
async fn transferred_iou_settles_with_the_new_lender() {
    let f = Fixture::new();
    let new_lender = f.network.add_node("NewLender").unwrap();
    let linear_id = f.issue("100.00 USD").await;
    f.lender
        .transfer_iou(linear_id.clone(), new_lender.identity().clone())
        .await
        .unwrap();
    f.borrower.self_issue_cash(amount("100.00 USD")).await.unwrap();

    f.borrower
        .settle_iou(linear_id.clone(), amount("25.00 USD"))
        .await
        .unwrap();

    assert_eq!(Fixture::usd_balance(&new_lender), 2_500);
    assert_eq!(Fixture::usd_balance(&f.lender), 0);
    assert_eq!(
        new_lender.iou(&linear_id).map(|iou| iou.paid),
        Some(amount("25.00 USD"))
    );
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_settlement_leaves_a_successor() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;
    f.borrower.self_issue_cash(amount("50.00 USD")).await.unwrap();
    let before = f.lender.vault().query_iou_by_linear_id(&linear_id).unwrap();

    let stx = f
        .borrower
        .settle_iou(linear_id.clone(), amount("40.00 USD"))
        .await
        .unwrap();

    for node in [&f.lender, &f.borrower] {
        let iou = node.iou(&linear_id).expect("successor in vault");
        assert_eq!(iou.paid, amount("40.00 USD"));
        assert_eq!(iou.outstanding().unwrap(), amount("60.00 USD"));
        assert!(node.vault().is_consumed(&before.reference));
        assert!(node.vault().transaction(&stx.id()).is_some());
    }
    assert_eq!(Fixture::usd_balance(&f.lender), 4_000);
    assert_eq!(Fixture::usd_balance(&f.borrower), 1_000);
    assert_eq!(f.network.notary().consumed_by(&before.reference), Some(stx.id()));
}

#[tokio::test]
async fn full_settlement_removes_the_iou() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;
    f.borrower.self_issue_cash(amount("120.00 USD")).await.unwrap();

    f.borrower
        .settle_iou(linear_id.clone(), amount("100.00 USD"))
        .await
        .unwrap();

    assert!(f.lender.iou(&linear_id).is_none());
    assert!(f.borrower.iou(&linear_id).is_none());
    assert_eq!(Fixture::usd_balance(&f.lender), 10_000);
    assert_eq!(Fixture::usd_balance(&f.borrower), 2_000);
}

#[tokio::test]
async fn settlement_in_two_payments() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;
    f.borrower.self_issue_cash(amount("100.00 USD")).await.unwrap();

    f.borrower
        .settle_iou(linear_id.clone(), amount("40.00 USD"))
        .await
        .unwrap();
    f.borrower
        .settle_iou(linear_id.clone(), amount("60.00 USD"))
        .await
        .unwrap();

    assert!(f.lender.iou(&linear_id).is_none());
    assert_eq!(Fixture::usd_balance(&f.lender), 10_000);
    assert_eq!(Fixture::usd_balance(&f.borrower), 0);
}

#[tokio::test]
async fn over_settlement_is_refused_before_signing() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;
    f.borrower.self_issue_cash(amount("200.00 USD")).await.unwrap();
    let recorded = f.lender.vault().transaction_count();

    match f
        .borrower
        .settle_iou(linear_id.clone(), amount("150.00 USD"))
        .await
    {
        Err(FlowError::OverSettlement {
            requested,
            outstanding,
        }) => {
            assert_eq!(requested, amount("150.00 USD"));
            assert_eq!(outstanding, amount("100.00 USD"));
        }
        other => panic!("expected OverSettlement, got {:?}", other),
    }
    assert_eq!(f.lender.vault().transaction_count(), recorded);
    assert_eq!(Fixture::usd_balance(&f.borrower), 20_000);
}

#[tokio::test]
async fn currency_mismatch_is_reported_first() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;

    // No GBP held and far more than outstanding: the currency still wins.
    match f
        .borrower
        .settle_iou(linear_id, amount("500.00 GBP"))
        .await
    {
        Err(FlowError::CurrencyMismatch { expected, found }) => {
            assert_eq!(expected, Currency::USD);
            assert_eq!(found, Currency::GBP);
        }
        other => panic!("expected CurrencyMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn insufficient_funds_is_reported_before_over_settlement() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;
    f.borrower.self_issue_cash(amount("10.00 USD")).await.unwrap();

    match f
        .borrower
        .settle_iou(linear_id, amount("150.00 USD"))
        .await
    {
        Err(FlowError::InsufficientFunds {
            requested,
            available,
        }) => {
            assert_eq!(requested, amount("150.00 USD"));
            assert_eq!(available, amount("10.00 USD"));
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
}

#[tokio::test]
async fn only_the_borrower_may_settle() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;
    f.lender.self_issue_cash(amount("100.00 USD")).await.unwrap();

    match f.lender.settle_iou(linear_id, amount("10.00 USD")).await {
        Err(FlowError::UnauthorizedInitiator { initiator, role }) => {
            assert_eq!(initiator, "Lender");
            assert_eq!(role, "borrower");
        }
        other => panic!("expected UnauthorizedInitiator, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_linear_id_is_not_found() {
    let f = Fixture::new();
    let missing = UniqueIdentifier::new();

    assert_eq!(
        f.borrower
            .settle_iou(missing.clone(), amount("1.00 USD"))
            .await
            .unwrap_err(),
        FlowError::NotFound(missing)
    );
}

// ---------------------------------------------------------------------------
// Concurrency and failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_settlements_commit_exactly_once() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;
    f.borrower.self_issue_cash(amount("50.00 USD")).await.unwrap();
    f.borrower.self_issue_cash(amount("50.00 USD")).await.unwrap();

    let (a, b) = tokio::join!(
        f.borrower.settle_iou(linear_id.clone(), amount("30.00 USD")),
        f.borrower.settle_iou(linear_id.clone(), amount("30.00 USD")),
    );

    let (winner, loser) = match (a, b) {
        (Ok(stx), Err(e)) | (Err(e), Ok(stx)) => (stx, e),
        other => panic!("expected one success and one failure, got {:?}", other),
    };
    match loser {
        FlowError::CommitConflict { consumed_by, .. } => assert_eq!(consumed_by, winner.id()),
        other => panic!("expected CommitConflict, got {:?}", other),
    }

    assert_eq!(
        f.lender.iou(&linear_id).map(|iou| iou.paid),
        Some(amount("30.00 USD"))
    );
    assert_eq!(Fixture::usd_balance(&f.lender), 3_000);
    assert_eq!(Fixture::usd_balance(&f.borrower), 7_000);
    assert_eq!(
        f.borrower
            .vault()
            .spendable_balance(&Currency::USD, uuid::Uuid::new_v4())
            .unwrap(),
        amount("70.00 USD")
    );
}

#[tokio::test]
async fn rejected_proposal_releases_reserved_cash() {
    struct FrozenSettlements;

    impl ProposalCheck for FrozenSettlements {
        fn check(
            &self,
            _ctx: &FlowContext,
            _stx: &SignedTransaction,
            ltx: &LedgerTransaction,
        ) -> Result<(), String> {
            if ltx.iou_inputs().is_empty() {
                Ok(())
            } else {
                Err("settlements are frozen".into())
            }
        }
    }

    let network = network();
    let lender = network
        .add_node_with_check("Lender", Arc::new(FrozenSettlements))
        .unwrap();
    let borrower = network.add_node("Borrower").unwrap();
    let iou = IouState::new(
        amount("100.00 USD"),
        lender.identity().clone(),
        borrower.identity().clone(),
    );
    let linear_id = iou.linear_id.clone();
    borrower.issue_iou(iou).await.unwrap();
    borrower.self_issue_cash(amount("50.00 USD")).await.unwrap();

    match borrower.settle_iou(linear_id.clone(), amount("40.00 USD")).await {
        Err(FlowError::CounterpartyRejected {
            counterparty,
            reason,
        }) => {
            assert_eq!(counterparty, "Lender");
            assert!(reason.contains("settlements are frozen"), "{reason}");
        }
        other => panic!("expected CounterpartyRejected, got {:?}", other),
    }

    // Nothing committed and every state is spendable again.
    assert_eq!(network.notary().committed_count(), 0);
    assert_eq!(
        borrower.iou(&linear_id).map(|iou| iou.paid),
        Some(amount("0.00 USD"))
    );
    assert_eq!(
        borrower
            .vault()
            .spendable_balance(&Currency::USD, uuid::Uuid::new_v4())
            .unwrap(),
        amount("50.00 USD")
    );
}

#[tokio::test]
async fn silent_counterparty_times_out() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;
    f.borrower.self_issue_cash(amount("50.00 USD")).await.unwrap();

    // Take over the lender's inbox and never answer.
    let _inbox = f.network.messaging().register(f.lender.identity());
    f.network.set_session_timeout(Duration::from_millis(200));

    match f
        .borrower
        .settle_iou(linear_id.clone(), amount("40.00 USD"))
        .await
    {
        Err(FlowError::Session(SessionError::TimedOut {
            counterparty,
            timeout_ms,
        })) => {
            assert_eq!(counterparty, "Lender");
            assert_eq!(timeout_ms, 200);
        }
        other => panic!("expected a session timeout, got {:?}", other),
    }

    let iou = f.borrower.vault().query_iou_by_linear_id(&linear_id).unwrap();
    assert!(!f.borrower.vault().is_consumed(&iou.reference));
    assert_eq!(f.network.notary().consumed_by(&iou.reference), None);
    assert_eq!(Fixture::usd_balance(&f.borrower), 5_000);
}

#[tokio::test]
async fn flows_are_counted_in_metrics() {
    let f = Fixture::new();
    let linear_id = f.issue("100.00 USD").await;
    f.borrower.self_issue_cash(amount("50.00 USD")).await.unwrap();
    f.borrower
        .settle_iou(linear_id, amount("40.00 USD"))
        .await
        .unwrap();

    let text = f.network.metrics().encode().unwrap();
    assert!(text.contains("iou_flows_completed_total"));
    assert!(text.contains("flow=\"settle\""));
    assert!(text.contains("node=\"Borrower\""));
}
