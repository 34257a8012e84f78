//! # IOU State
//!
//! One obligation: `borrower` owes `lender` the `amount`, of which `paid` has
//! already been settled. Each transition produces a new version with the
//! same `linear_id`; a fully paid IOU has no successor at all.
//!
//! The helpers here only build candidate versions. Whether a version is an
//! acceptable successor is decided by the IOU contract.

use serde::{Deserialize, Serialize};

use super::UniqueIdentifier;
use crate::crypto::PublicKey;
use crate::identity::Party;
use crate::transaction::types::{Amount, AmountError};

/// A versioned IOU record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IouState {
    /// Face value. Positive at issuance, never changes afterwards.
    pub amount: Amount,
    pub lender: Party,
    pub borrower: Party,
    /// Cumulative settled amount, same currency as `amount`.
    pub paid: Amount,
    pub linear_id: UniqueIdentifier,
}

impl IouState {
    /// A fresh IOU with nothing paid and a new linear id.
    pub fn new(amount: Amount, lender: Party, borrower: Party) -> Self {
        let paid = Amount::zero(amount.currency.clone());
        Self {
            amount,
            lender,
            borrower,
            paid,
            linear_id: UniqueIdentifier::new(),
        }
    }

    /// `amount - paid`.
    pub fn outstanding(&self) -> Result<Amount, AmountError> {
        self.amount.checked_sub(&self.paid)
    }

    /// Successor version with `paid` increased by `amount`.
    pub fn pay(&self, amount: &Amount) -> Result<IouState, AmountError> {
        Ok(IouState {
            paid: self.paid.checked_add(amount)?,
            ..self.clone()
        })
    }

    /// Successor version owed to `new_lender`. Everything else is kept.
    pub fn with_new_lender(&self, new_lender: Party) -> IouState {
        IouState {
            lender: new_lender,
            ..self.clone()
        }
    }

    /// Lender and borrower keys, lender first.
    pub fn participants(&self) -> Vec<PublicKey> {
        vec![
            self.lender.owning_key.clone(),
            self.borrower.owning_key.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::transaction::types::Currency;

    fn party(name: &str) -> Party {
        Party::new(name, Keypair::generate().public_key())
    }

    fn usd(q: u64) -> Amount {
        Amount::new(q, Currency::USD)
    }

    #[test]
    fn new_iou_has_nothing_paid() {
        let iou = IouState::new(usd(100), party("Lender"), party("Borrower"));
        assert_eq!(iou.paid, usd(0));
        assert_eq!(iou.outstanding().unwrap(), usd(100));
    }

    #[test]
    fn pay_keeps_identity_and_terms() {
        let iou = IouState::new(usd(100), party("Lender"), party("Borrower"));
        let next = iou.pay(&usd(40)).unwrap();
        assert_eq!(next.paid, usd(40));
        assert_eq!(next.outstanding().unwrap(), usd(60));
        assert_eq!(next.linear_id, iou.linear_id);
        assert_eq!(next.lender, iou.lender);
        assert_eq!(next.amount, iou.amount);
    }

    #[test]
    fn pay_in_wrong_currency_fails() {
        let iou = IouState::new(usd(100), party("Lender"), party("Borrower"));
        assert!(iou.pay(&Amount::new(40, Currency::GBP)).is_err());
    }

    #[test]
    fn with_new_lender_changes_only_lender() {
        let iou = IouState::new(usd(100), party("Lender"), party("Borrower"));
        let l2 = party("Lender2");
        let next = iou.with_new_lender(l2.clone());
        assert_eq!(next.lender, l2);
        assert_eq!(next.with_new_lender(iou.lender.clone()), iou);
    }

    #[test]
    fn participants_are_lender_and_borrower() {
        let lender = party("Lender");
        let borrower = party("Borrower");
        let iou = IouState::new(usd(1), lender.clone(), borrower.clone());
        assert_eq!(
            iou.participants(),
            vec![lender.owning_key, borrower.owning_key]
        );
    }
}
