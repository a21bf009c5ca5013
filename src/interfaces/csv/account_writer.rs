use crate::domain::account::{AccountStatus, LandlordAccount};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One report line. Amounts are printed in minor units without trailing zeros.
#[derive(Debug, Serialize)]
struct AccountRow<'a> {
    landlord: &'a str,
    gross: String,
    commission: String,
    net: String,
    available: String,
    pending: String,
    payouts: String,
    kyc_verified: bool,
    status: AccountStatus,
}

impl<'a> From<&'a LandlordAccount> for AccountRow<'a> {
    fn from(account: &'a LandlordAccount) -> Self {
        Self {
            landlord: &account.landlord_id,
            gross: account.total_gross_earnings.to_string(),
            commission: account.total_commission_paid.to_string(),
            net: account.total_net_earnings.to_string(),
            available: account.available_balance.to_string(),
            pending: account.pending_balance.to_string(),
            payouts: account.total_payouts.to_string(),
            kyc_verified: account.kyc_verified,
            status: account.status,
        }
    }
}

/// Writes landlord account summaries as CSV.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the header followed by one row per account, then flushes.
    ///
    /// An empty iterator still produces the header.
    pub fn write_accounts<'a, I>(&mut self, accounts: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a LandlordAccount>,
    {
        let mut wrote_any = false;
        for account in accounts {
            self.writer.serialize(AccountRow::from(account))?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "landlord",
                "gross",
                "commission",
                "net",
                "available",
                "pending",
                "payouts",
                "kyc_verified",
                "status",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{BalanceBucket, EarningsCredit};
    use crate::domain::money::Money;
    use chrono::Utc;

    fn render(accounts: &[LandlordAccount]) -> String {
        let mut buffer = Vec::new();
        AccountWriter::new(&mut buffer)
            .write_accounts(accounts)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_writes_header_and_rows() {
        let now = Utc::now();
        let mut account = LandlordAccount::new("landlord-1", now);
        account.credit(
            EarningsCredit {
                gross: Money::from(100000),
                commission: Money::from(10000),
                net: Money::from(90000),
            },
            BalanceBucket::Available,
            now,
        );
        account.kyc_verified = true;

        let output = render(&[account]);
        let mut lines = output.lines();
        assert_eq!(
            lines.next(),
            Some("landlord,gross,commission,net,available,pending,payouts,kyc_verified,status")
        );
        assert_eq!(
            lines.next(),
            Some("landlord-1,100000,10000,90000,90000,0,0,true,active")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_empty_report_has_header() {
        assert_eq!(
            render(&[]),
            "landlord,gross,commission,net,available,pending,payouts,kyc_verified,status\n"
        );
    }
}
