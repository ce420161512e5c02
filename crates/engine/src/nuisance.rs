//! Incoming nuisance bookkeeping.
//!
//! Nuisance announced by an opponent is *visible* until that opponent's chain
//! ends and they activate it, at which point it becomes *active* and drops on
//! the next opportunity. Outgoing nuisance cancels active first, then visible
//! opponent by opponent in ascending id order.

use std::collections::BTreeMap;

use puyo_versus_core::calculate_nuisance;
use puyo_versus_types::ParticipantId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NuisanceLedger {
    visible: BTreeMap<ParticipantId, u32>,
    active: u32,
    leftover: f64,
}

impl NuisanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record nuisance announced by `from`.
    pub fn receive(&mut self, from: ParticipantId, amount: u32) {
        if amount > 0 {
            *self.visible.entry(from).or_default() += amount;
        }
    }

    /// Promote everything `from` announced to active.
    pub fn activate(&mut self, from: ParticipantId) -> u32 {
        let amount = self.visible.remove(&from).unwrap_or(0);
        self.active += amount;
        amount
    }

    /// Cancel `outgoing` against pending nuisance. Returns what is left to send.
    pub fn cancel(&mut self, outgoing: u32) -> u32 {
        let mut remaining = outgoing;

        let from_active = remaining.min(self.active);
        self.active -= from_active;
        remaining -= from_active;

        for amount in self.visible.values_mut() {
            if remaining == 0 {
                break;
            }
            let cancelled = remaining.min(*amount);
            *amount -= cancelled;
            remaining -= cancelled;
        }
        self.visible.retain(|_, amount| *amount > 0);

        remaining
    }

    /// Convert a score gain to whole nuisance, carrying the fraction.
    pub fn convert(&mut self, score: u32, target_points: u32) -> u32 {
        let (sent, leftover) = calculate_nuisance(score, target_points, self.leftover);
        self.leftover = leftover;
        sent
    }

    /// Remove `amount` from active after it has been dropped.
    pub fn consume_active(&mut self, amount: u32) {
        self.active = self.active.saturating_sub(amount);
    }

    pub fn active(&self) -> u32 {
        self.active
    }

    pub fn visible(&self) -> &BTreeMap<ParticipantId, u32> {
        &self.visible
    }

    pub fn leftover(&self) -> f64 {
        self.leftover
    }

    /// Active plus every visible amount.
    pub fn total(&self) -> u32 {
        self.active + self.visible.values().sum::<u32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_order_active_then_ascending_ids() {
        let mut ledger = NuisanceLedger::new();
        ledger.receive(7, 5);
        ledger.receive(3, 4);
        ledger.receive(7, 1);
        ledger.activate(7);
        ledger.receive(7, 2);
        assert_eq!(ledger.active(), 6);
        assert_eq!(ledger.total(), 12);

        assert_eq!(ledger.cancel(9), 0);
        assert_eq!(ledger.active(), 0);
        // 3 cancelled from participant 3 first.
        assert_eq!(ledger.visible().get(&3), Some(&1));
        assert_eq!(ledger.visible().get(&7), Some(&2));

        assert_eq!(ledger.cancel(10), 7);
        assert_eq!(ledger.total(), 0);
        assert!(ledger.visible().is_empty());
    }

    #[test]
    fn test_convert_keeps_leftover() {
        let mut ledger = NuisanceLedger::new();
        assert_eq!(ledger.convert(35, 70), 0);
        assert!((ledger.leftover() - 0.5).abs() < 1e-12);
        assert_eq!(ledger.convert(35, 70), 1);
        assert!(ledger.leftover().abs() < 1e-12);
    }
}
