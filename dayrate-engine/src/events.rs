use dayrate_ledger::{AccrualMarker, LedgerEntry, TermDepositContract};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceMutatedEvent {
    pub entry: LedgerEntry,
    pub new_balance: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferCompletedEvent {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccrualCompletedEvent {
    pub marker: AccrualMarker,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractSignedEvent {
    pub contract: TermDepositContract,
}

/// Notifications emitted after a money movement has committed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BankEvent {
    BalanceMutated(BalanceMutatedEvent),
    TransferCompleted(TransferCompletedEvent),
    AccrualCompleted(AccrualCompletedEvent),
    ContractSigned(ContractSignedEvent),
}

pub struct EventBus {
    sender: broadcast::Sender<BankEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }

    /// Having no subscribers is not an error.
    pub fn publish(&self, event: BankEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

pub struct EventStream {
    receiver: broadcast::Receiver<BankEvent>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Result<BankEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}
