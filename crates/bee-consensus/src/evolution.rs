//! Evolution (equity carve-out) payee rotation, driven by SPORK_18 / SPORK_20 payloads.

use bee_core::{Amount, Script, Transaction};
use log::warn;

/// Payload syntax: `[entry,entry,...]`. The opening bracket must precede the closing one.
pub fn is_valid_rotation(payload: &str) -> bool {
    match (payload.find('['), payload.rfind(']')) {
        (Some(open), Some(close)) => open < close,
        _ => false,
    }
}

/// Entries between the brackets, trimmed, empties dropped.
pub fn parse_rotation(payload: &str) -> Vec<String> {
    let (open, close) = match (payload.find('['), payload.rfind(']')) {
        (Some(open), Some(close)) if open < close => (open, close),
        _ => return Vec::new(),
    };
    payload[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvolutionSchedule {
    payees: Vec<String>,
    disabled_nodes: Vec<String>,
}

impl EvolutionSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_payees(&mut self, payload: &str) {
        self.payees = parse_rotation(payload);
    }

    pub fn set_disabled_nodes(&mut self, payload: &str) {
        self.disabled_nodes = parse_rotation(payload);
    }

    pub fn payees(&self) -> &[String] {
        &self.payees
    }

    pub fn is_empty(&self) -> bool {
        self.payees.is_empty()
    }

    pub fn payee_address(&self, height: u32) -> Option<&str> {
        if self.payees.is_empty() {
            return None;
        }
        Some(&self.payees[height as usize % self.payees.len()])
    }

    /// Scheduled payout script; `None` when the rotation is empty or the
    /// scheduled entry is not a valid address.
    pub fn payee_script(&self, height: u32) -> Option<Script> {
        let address = self.payee_address(height)?;
        match Script::from_address(address) {
            Ok(script) => Some(script),
            Err(e) => {
                warn!(target: "spork", "evolution payee {} at height {} unusable: {}", address, height, e);
                None
            }
        }
    }

    pub fn disabled_node(&self, height: u32) -> Option<&str> {
        if self.disabled_nodes.is_empty() {
            return None;
        }
        Some(&self.disabled_nodes[height as usize % self.disabled_nodes.len()])
    }

    /// An empty rotation demands nothing; otherwise some output must pay the
    /// scheduled address exactly `amount`.
    pub fn is_transaction_valid(&self, tx: &Transaction, height: u32, amount: Amount) -> bool {
        if self.payees.is_empty() {
            return true;
        }
        match self.payee_script(height) {
            Some(script) => tx.pays(&script, amount),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bee_core::{TxOut, COIN};
    use bee_crypto::key_id_to_address;

    #[test]
    fn test_rotation_syntax() {
        assert!(is_valid_rotation("[a,b]"));
        assert!(is_valid_rotation("[]"));
        assert!(!is_valid_rotation("a,b"));
        assert!(!is_valid_rotation("]a["));
        assert_eq!(parse_rotation("[ a , b,,c ]"), vec!["a", "b", "c"]);
        assert!(parse_rotation("[]").is_empty());
        assert!(parse_rotation("nothing").is_empty());
    }

    #[test]
    fn test_payee_rotates_by_height() {
        let mut schedule = EvolutionSchedule::new();
        assert_eq!(schedule.payee_address(5), None);
        schedule.set_payees("[x,y,z]");
        assert_eq!(schedule.payee_address(0), Some("x"));
        assert_eq!(schedule.payee_address(4), Some("y"));
        assert_eq!(schedule.payee_address(8), Some("z"));
    }

    #[test]
    fn test_disabled_node_uses_its_own_rotation() {
        let mut schedule = EvolutionSchedule::new();
        schedule.set_payees("[x,y,z]");
        schedule.set_disabled_nodes("[n1,n2]");
        assert_eq!(schedule.disabled_node(3), Some("n2"));
        assert_eq!(schedule.disabled_node(4), Some("n1"));
    }

    #[test]
    fn test_transaction_validity() {
        let addr = key_id_to_address(&[3u8; 20]);
        let script = Script::from_address(&addr).unwrap();
        let mut schedule = EvolutionSchedule::new();

        let tx = Transaction::new(vec![TxOut::new(COIN, script.clone())]);
        assert!(schedule.is_transaction_valid(&tx, 10, 5 * COIN));

        schedule.set_payees(&format!("[{}]", addr));
        assert!(schedule.is_transaction_valid(&tx, 10, COIN));
        assert!(!schedule.is_transaction_valid(&tx, 10, 2 * COIN));

        schedule.set_payees("[not-an-address]");
        assert!(!schedule.is_transaction_valid(&tx, 10, COIN));
    }
}
