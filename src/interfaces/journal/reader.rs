use crate::domain::account::AccountStatus;
use crate::domain::event::ProviderEvent;
use crate::domain::payment::ReleaseCondition;
use crate::domain::payout::{PayoutDetails, PayoutMethod};
use crate::error::{Result, SettlementError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

/// One replayable operation. Payments are addressed by provider session id,
/// payout requests by a reference local to the journal.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    Webhook {
        event: ProviderEvent,
    },
    ConfirmCondition {
        session_id: String,
        condition: ReleaseCondition,
    },
    Release {
        session_id: String,
        actor: String,
    },
    Refund {
        session_id: String,
        actor: String,
    },
    SetRate {
        rate: Decimal,
        reason: String,
        actor: String,
    },
    SetAccountStatus {
        landlord_id: String,
        status: AccountStatus,
    },
    PayoutRequest {
        reference: String,
        landlord_id: String,
        amount: Decimal,
        method: PayoutMethod,
        details: PayoutDetails,
    },
    PayoutApprove {
        reference: String,
        actor: String,
    },
    PayoutReject {
        reference: String,
        reason: String,
    },
    PayoutProcess {
        reference: String,
    },
}

/// Reads journal entries from a JSON-lines source.
///
/// Blank lines are skipped. Each remaining line yields its own `Result`, so
/// one malformed line does not end the stream.
pub struct JournalReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> JournalReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    pub fn entries(self) -> impl Iterator<Item = Result<JournalEntry>> {
        self.reader.lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str::<JournalEntry>(&line).map_err(SettlementError::from)),
            Err(e) => Some(Err(SettlementError::from(e))),
        })
    }
}
