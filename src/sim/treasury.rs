use std::collections::BTreeMap;

use serde_json::json;

use crate::error::HandlerError;
use crate::model::{Account, LogEntry, Mutation, TickId, WorldState};

use super::context::HandlerContext;
use super::handler::{Domain, HandlerOutput, TickHandler};

/// Sweeps accrued taxes into treasuries and pays role salaries once per
/// season. Payments move coin between accounts; the only mint and sink is
/// the external account the tax sweep draws from.
pub struct TreasuryHandler;

pub const NAME: &str = "treasury";

impl TickHandler for TreasuryHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn reads(&self) -> &'static [Domain] {
        &[
            Domain::Calendar,
            Domain::TaxCollections,
            Domain::Roles,
            Domain::Treasuries,
            Domain::Wallets,
            Domain::SalaryPayments,
        ]
    }

    fn writes(&self) -> &'static [Domain] {
        &[
            Domain::Treasuries,
            Domain::Wallets,
            Domain::TaxCollections,
            Domain::SalaryPayments,
        ]
    }

    fn after(&self) -> &'static [&'static str] {
        &[super::elections::NAME]
    }

    fn handle(
        &self,
        tick: TickId,
        world: &WorldState,
        _ctx: &HandlerContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let mut output = HandlerOutput::new();
        // Deltas staged in this output, per treasury. Affordability has to
        // account for them or two salaries could both claim the same coin.
        let mut staged: BTreeMap<Account, i64> = BTreeMap::new();

        sweep_taxes(tick, world, &mut staged, &mut output);
        pay_salaries(tick, world, &mut staged, &mut output);
        Ok(output)
    }
}

fn sweep_taxes(
    tick: TickId,
    world: &WorldState,
    staged: &mut BTreeMap<Account, i64>,
    output: &mut HandlerOutput,
) {
    for tax in world.tax_collections.values() {
        if tax.collected {
            continue;
        }
        let account = Account::Treasury {
            location: tax.location,
        };
        if world.balance(&account).is_none() {
            tracing::warn!(collection = tax.id, location = %tax.location, "no treasury for accrued tax");
            continue;
        }
        output.mutations.push(Mutation::MarkTaxCollected {
            collection_id: tax.id,
        });
        output.mutations.push(Mutation::AdjustBalance {
            account: Account::External,
            delta: -tax.amount,
        });
        output.mutations.push(Mutation::AdjustBalance {
            account,
            delta: tax.amount,
        });
        *staged.entry(account).or_insert(0) += tax.amount;
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!("{} coin in taxes collected for {}", tax.amount, tax.location),
            json!({ "type": "tax_collected", "collection_id": tax.id, "amount": tax.amount }),
        ));
    }
}

fn pay_salaries(
    tick: TickId,
    world: &WorldState,
    staged: &mut BTreeMap<Account, i64>,
    output: &mut HandlerOutput,
) {
    let period = salary_period(world);
    for role in world.roles.values() {
        if !role.active || role.salary <= 0 {
            continue;
        }
        let Some(holder) = role.holder_npc_id else {
            continue;
        };
        if world.salary_paid(role.id, period) {
            continue;
        }
        let account = Account::Treasury {
            location: role.location,
        };
        let Some(balance) = world.balance(&account) else {
            tracing::warn!(role = role.id, location = %role.location, "no treasury to pay salary from");
            continue;
        };
        let available = balance + staged.get(&account).copied().unwrap_or(0);
        if available < role.salary && !world.allows_negative(&account) {
            output.log.push(LogEntry::with_data(
                tick,
                NAME,
                format!(
                    "{} cannot afford the {}'s salary of {}",
                    role.location, role.title, role.salary
                ),
                json!({ "type": "salary_skipped", "role_id": role.id, "period": period }),
            ));
            continue;
        }
        output.mutations.push(Mutation::AdjustBalance {
            account,
            delta: -role.salary,
        });
        output.mutations.push(Mutation::AdjustBalance {
            account: Account::Wallet {
                holder_npc_id: holder,
            },
            delta: role.salary,
        });
        output.mutations.push(Mutation::RecordSalaryPayment {
            role_id: role.id,
            period,
            amount: role.salary,
        });
        *staged.entry(account).or_insert(0) -= role.salary;
        output.log.push(LogEntry::with_data(
            tick,
            NAME,
            format!("{} paid {} coin for the season", role.title, role.salary),
            json!({ "type": "salary_paid", "role_id": role.id, "period": period, "amount": role.salary }),
        ));
    }
}

/// Salaries are due once per season. The period key is derived from the
/// date, so however many ticks fall inside a season, the payment ledger
/// admits one payment for it.
pub fn salary_period(world: &WorldState) -> u64 {
    world.date.year() as u64 * crate::model::calendar::SEASONS_PER_YEAR as u64
        + world.date.season().index() as u64
}
